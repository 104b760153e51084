//! Authorization header construction for the controller HTTP client.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION};

/// Builds the Authorization header for the configured credentials: a token
/// wins over username/password, and no credentials yields no header.
pub(crate) fn build_auth_headers(
    token: Option<&str>,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("failed to build Authorization header")?;
        headers.insert(AUTHORIZATION, value);
    } else if let (Some(user), Some(password)) = (username, password) {
        let credentials = format!("{user}:{password}");
        let encoded = BASE64_STANDARD.encode(credentials);
        let value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .context("failed to build Authorization header")?;
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}
