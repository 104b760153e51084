use crate::controller::auth::build_auth_headers;
use anyhow::{anyhow, bail, Context, Result};
use hyper::client::HttpConnector;
use hyper::header::HeaderMap;
use hyper::{Body, Client, Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use serde::Deserialize;

/// Controller connection parameters as supplied by the invocation or a
/// worker-mode workload bundle.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct ControllerParams {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

fn default_verify_ssl() -> bool {
    true
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            username: None,
            password: None,
            verify_ssl: true,
        }
    }
}

impl ControllerParams {
    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.token.is_some()
    }
}

/// Remote configuration reported by the controller probe.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerInfo {
    pub version: String,
}

/// Explicit client for the remote controller.
///
/// Constructed from the run's parameters and passed to whatever needs it;
/// callers release it through [`ControllerClient::close_session`] on every
/// exit path rather than leaking pooled connections past the run.
pub struct ControllerClient {
    base_url: String,
    headers: HeaderMap,
    http: Client<HttpsConnector<HttpConnector>, Body>,
}

impl ControllerClient {
    pub fn new(params: &ControllerParams) -> Result<Self> {
        let url = params
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("controller url is required to build a client"))?;
        let base_url = url.trim_end_matches('/').to_owned();
        let headers = build_auth_headers(
            params.token.as_deref(),
            params.username.as_deref(),
            params.password.as_deref(),
        )?;

        let mut tls = native_tls::TlsConnector::builder();
        if !params.verify_ssl {
            tls.danger_accept_invalid_certs(true);
            tls.danger_accept_invalid_hostnames(true);
        }
        let tls = tls.build().context("failed to build TLS connector")?;

        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        let https = HttpsConnector::from((connector, tokio_native_tls::TlsConnector::from(tls)));
        let http = Client::builder().build::<_, Body>(https);

        Ok(Self {
            base_url,
            headers,
            http,
        })
    }

    /// Fetches the controller's configuration endpoint, used at startup as
    /// the reachability probe and version report.
    pub async fn get_config(&self) -> Result<ControllerInfo> {
        let uri = format!("{}/api/v2/config/", self.base_url);
        let mut request = Request::builder()
            .method(Method::GET)
            .uri(&uri)
            .body(Body::empty())
            .context("failed to build controller request")?;
        request.headers_mut().extend(self.headers.clone());

        let response = self
            .http
            .request(request)
            .await
            .with_context(|| format!("controller unreachable at {uri}"))?;

        if response.status() != StatusCode::OK {
            bail!("controller config probe returned {}", response.status());
        }

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .context("failed to read controller response")?;
        serde_json::from_slice(&body).context("controller config response was not valid JSON")
    }

    /// Releases the session. Idempotent; dropping the client tears down its
    /// connection pool, so this exists to make the release explicit on
    /// every shutdown path.
    pub async fn close_session(self) {
        tracing::debug!(controller = %self.base_url, "controller session closed");
    }
}

impl std::fmt::Debug for ControllerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &!self.headers.is_empty())
            .finish_non_exhaustive()
    }
}
