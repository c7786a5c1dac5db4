use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::announcement::RawAnnouncement;
use crate::fetch::{BasicClient, HttpClient, post_bytes};
use crate::services::announcement_source::{AnnouncementSource, ArrivalQuery};

const SCHEMA_VERSION: &str = "1.9";
const WINDOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

#[derive(Deserialize, Default)]
struct ApiResponse {
    #[serde(rename = "RESPONSE", default)]
    response: ResponseBody,
}

#[derive(Deserialize, Default)]
struct ResponseBody {
    #[serde(rename = "RESULT", default)]
    result: Vec<QueryResult>,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(rename = "TrainAnnouncement", default)]
    train_announcement: Vec<Value>,
    #[serde(rename = "ERROR")]
    error: Option<Value>,
}

pub struct TrafikverketClient<C = BasicClient> {
    http: C,
    api_url: String,
    api_key: String,
}

impl TrafikverketClient<BasicClient> {
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = BasicClient::with_timeout(timeout).context("Failed to build HTTP client")?;
        Ok(Self::with_client(http, api_url, api_key))
    }
}

impl<C: HttpClient> TrafikverketClient<C> {
    pub fn with_client(http: C, api_url: &str, api_key: &str) -> Self {
        Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Builds the XML query body for `query`, authenticated with `api_key`.
pub fn build_request(api_key: &str, query: &ArrivalQuery) -> String {
    format!(
        r#"<REQUEST>
  <LOGIN authenticationkey="{key}"/>
  <QUERY objecttype="TrainAnnouncement" schemaversion="{SCHEMA_VERSION}">
    <FILTER>
      <AND>
        <EQ name="LocationSignature" value="{location}"/>
        <EQ name="ActivityType" value="{activity}"/>
        <AND>
          <GTE name="AdvertisedTimeAtLocation" value="{start}"/>
          <LT name="AdvertisedTimeAtLocation" value="{end}"/>
        </AND>
      </AND>
    </FILTER>
  </QUERY>
</REQUEST>"#,
        key = escape_attr(api_key),
        location = escape_attr(&query.location_signature),
        activity = query.activity_type.wire_name(),
        start = query.start.format(WINDOW_FORMAT),
        end = query.end.format(WINDOW_FORMAT),
    )
}

/// Extracts announcements from a response body.
///
/// Announcements from every result set are concatenated. A result carrying an
/// `ERROR` object fails the whole response; single announcements that do not
/// decode are skipped.
pub fn parse_response(bytes: &[u8]) -> Result<Vec<RawAnnouncement>> {
    let parsed: ApiResponse =
        serde_json::from_slice(bytes).context("Failed to parse announcement response")?;

    let mut announcements = Vec::new();
    for result in parsed.response.result {
        if let Some(error) = result.error {
            bail!("API reported an error: {error}");
        }

        for item in result.train_announcement {
            match serde_json::from_value::<RawAnnouncement>(item) {
                Ok(a) => announcements.push(a),
                Err(e) => warn!(error = %e, "Skipping announcement that failed to decode"),
            }
        }
    }

    Ok(announcements)
}

#[async_trait]
impl<C: HttpClient> AnnouncementSource for TrafikverketClient<C> {
    #[tracing::instrument(
        skip(self, query),
        fields(location = %query.location_signature, start = %query.start, end = %query.end)
    )]
    async fn fetch_announcements(&self, query: &ArrivalQuery) -> Result<Vec<RawAnnouncement>> {
        let body = build_request(&self.api_key, query);
        debug!(bytes = body.len(), "Posting announcement query");

        let bytes = post_bytes(&self.http, &self.api_url, CONTENT_TYPE, body).await?;
        let announcements = parse_response(&bytes)?;

        info!(count = announcements.len(), "Fetched train announcements");
        Ok(announcements)
    }
}
