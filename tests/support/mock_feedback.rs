use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tungstenite::Message;

/// Websocket sink that records every text frame it receives.
pub struct MockFeedbackServer {
    url: String,
    frames: Arc<Mutex<Vec<String>>>,
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl MockFeedbackServer {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock feedback listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock feedback address")?;

        let frames = Arc::new(Mutex::new(Vec::new()));
        let stop = CancellationToken::new();

        let accept_frames = frames.clone();
        let accept_stop = stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((stream, _peer)) = accepted else { break };
                        let frames = accept_frames.clone();
                        let stop = accept_stop.clone();
                        tokio::spawn(async move {
                            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                                return;
                            };
                            let (_write, mut read) = ws.split();
                            loop {
                                tokio::select! {
                                    frame = read.next() => match frame {
                                        Some(Ok(Message::Text(text))) => {
                                            frames.lock().unwrap().push(text.to_string());
                                        }
                                        Some(Ok(Message::Close(_))) | None => break,
                                        Some(Ok(_)) => {}
                                        Some(Err(_)) => break,
                                    },
                                    _ = stop.cancelled() => break,
                                }
                            }
                        });
                    }
                    _ = accept_stop.cancelled() => break,
                }
            }
        });

        Ok(Self {
            url: format!("ws://{addr}"),
            frames,
            stop,
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
