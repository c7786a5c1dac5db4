use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport seam for outbound requests to the announcement API.
///
/// Production code uses [`super::BasicClient`]; wrappers can add headers or
/// retries by implementing this trait around an inner client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
