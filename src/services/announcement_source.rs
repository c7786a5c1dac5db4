//! Trait and types for fetching arrival announcements at one station.

use anyhow::Result;
use chrono::NaiveDateTime;

use crate::announcement::RawAnnouncement;

/// Kind of station activity an announcement refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    Arrival,
    Departure,
}

impl ActivityType {
    /// Value used by the upstream API (Swedish).
    pub fn wire_name(self) -> &'static str {
        match self {
            ActivityType::Arrival => "Ankomst",
            ActivityType::Departure => "Avgang",
        }
    }
}

/// Announcements advertised at `location_signature` within `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalQuery {
    pub location_signature: String,
    pub activity_type: ActivityType,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ArrivalQuery {
    /// Arrivals in the window `[now - hours_back, now + hours_ahead)`.
    pub fn around(location_signature: &str, now: NaiveDateTime, hours_back: i64, hours_ahead: i64) -> Self {
        Self {
            location_signature: location_signature.to_string(),
            activity_type: ActivityType::Arrival,
            start: now - chrono::TimeDelta::hours(hours_back),
            end: now + chrono::TimeDelta::hours(hours_ahead),
        }
    }
}

/// Abstraction over an announcement provider (e.g., Trafikverket).
#[async_trait::async_trait]
pub trait AnnouncementSource: Send + Sync {
    /// Returns every announcement matching `query`. Any network, status or
    /// decoding failure is reported as an error.
    async fn fetch_announcements(&self, query: &ArrivalQuery) -> Result<Vec<RawAnnouncement>>;
}

#[async_trait::async_trait]
impl<T: AnnouncementSource + ?Sized> AnnouncementSource for std::sync::Arc<T> {
    async fn fetch_announcements(&self, query: &ArrivalQuery) -> Result<Vec<RawAnnouncement>> {
        (**self).fetch_announcements(query).await
    }
}
