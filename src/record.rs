//! Normalized per-train delay records.
//!
//! A [`NormalizedRecord`] is built once per update cycle by the classifier and
//! never mutated afterwards. Field order matches the CSV column order of both the
//! snapshot and the history log.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Delay magnitude (in minutes) above which a train counts as late or early.
pub const DELAY_THRESHOLD_MINUTES: i64 = 2;

/// Description written for canceled trains instead of their deviation text.
pub const CANCELED_DESCRIPTION: &str = "CANCELED";

/// CSV header, in the same order as the fields of [`NormalizedRecord`].
pub const CSV_HEADERS: [&str; 16] = [
    "ActivityId",
    "AdvertisedTrainIdent",
    "AdvertisedTimeAtLocation",
    "EstimatedTimeAtLocation",
    "TimeAtLocation",
    "DelayMinutes",
    "DelayStatus",
    "IsCanceled",
    "IsReplaced",
    "DeviationDescription",
    "FromLocation",
    "TrackAtLocation",
    "ProductDescription",
    "OperationalTrainNumber",
    "LastUpdated",
    "DataFreshness",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelayStatus {
    OnTime,
    Delayed,
    Early,
    /// The advertised time is missing or unparseable.
    NoSchedule,
    /// Neither an actual nor an estimated time is usable.
    NoEstimate,
}

/// Coarse position of an announcement relative to the time it was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataFreshness {
    Arrived,
    Overdue,
    Imminent,
    Upcoming,
    Scheduled,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NormalizedRecord {
    pub activity_id: String,
    pub advertised_train_ident: String,
    #[serde(rename = "AdvertisedTimeAtLocation")]
    pub advertised_time: Option<NaiveDateTime>,
    #[serde(rename = "EstimatedTimeAtLocation")]
    pub estimated_time: Option<NaiveDateTime>,
    #[serde(rename = "TimeAtLocation")]
    pub actual_time: Option<NaiveDateTime>,
    pub delay_minutes: Option<i64>,
    pub delay_status: DelayStatus,
    pub is_canceled: bool,
    pub is_replaced: bool,
    pub deviation_description: String,
    pub from_location: String,
    pub track_at_location: String,
    pub product_description: String,
    pub operational_train_number: String,
    pub last_updated: NaiveDateTime,
    pub data_freshness: DataFreshness,
}

impl NormalizedRecord {
    /// A record is significant when it is late or early by more than the
    /// threshold, canceled, or replaced. Only significant records go to history.
    pub fn is_significant(&self) -> bool {
        self.delay_minutes
            .is_some_and(|d| d.abs() > DELAY_THRESHOLD_MINUTES)
            || self.is_canceled
            || self.is_replaced
    }
}
