mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result, bail};
use reqwest::header::{CONTENT_TYPE, HeaderValue};

/// POSTs `body` to `url` and returns the response body.
///
/// Non-success statuses are turned into errors carrying the response text.
pub async fn post_bytes<C: HttpClient>(
    client: &C,
    url: &str,
    content_type: &'static str,
    body: String,
) -> Result<Vec<u8>> {
    let mut req = reqwest::Request::new(reqwest::Method::POST, url.parse()?);
    req.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    *req.body_mut() = Some(body.into());

    let resp = client
        .execute(req)
        .await
        .with_context(|| format!("request to {url} failed"))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        bail!("{url} returned status {status}: {text}");
    }

    Ok(resp.bytes().await?.to_vec())
}
