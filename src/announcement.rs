//! Raw `TrainAnnouncement` records as delivered by the upstream API.
//!
//! Scalar fields are optional strings. The nested fields (`FromLocation`,
//! `ProductInformation`, `Deviation`) are kept as untyped JSON and decoded on
//! demand, since upstream sends them either as a JSON list of objects or as a
//! string holding such a list.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawAnnouncement {
    pub activity_id: Option<String>,
    pub advertised_train_ident: Option<String>,
    pub advertised_time_at_location: Option<String>,
    pub estimated_time_at_location: Option<String>,
    pub time_at_location: Option<String>,
    pub canceled: Option<bool>,
    pub track_at_location: Option<String>,
    pub operational_train_number: Option<String>,
    pub from_location: Option<Value>,
    pub product_information: Option<Value>,
    pub deviation: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationRef {
    #[serde(rename = "LocationName")]
    pub location_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DescribedEntry {
    #[serde(rename = "Description")]
    pub description: Option<String>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed nested list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a list, found {0}")]
    NotAList(&'static str),
}

/// Decodes a nested list field.
///
/// Absent, `null` and empty-string values decode to an empty list. Entries that
/// do not decode as `T` (e.g. bare strings inside the list) are skipped.
pub fn decode_list<T: DeserializeOwned>(value: Option<&Value>) -> Result<Vec<T>, DecodeError> {
    let items: Vec<Value> = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(s)) => serde_json::from_str(s)?,
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(_)) => return Err(DecodeError::NotAList("object")),
        Some(Value::Bool(_)) => return Err(DecodeError::NotAList("bool")),
        Some(Value::Number(_)) => return Err(DecodeError::NotAList("number")),
    };

    let decoded = items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping nested entry that failed to decode");
                None
            }
        })
        .collect();
    Ok(decoded)
}

/// Renders a nested field back to text, used as the fallback description when
/// deviation decoding fails.
pub fn raw_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl RawAnnouncement {
    pub fn is_canceled(&self) -> bool {
        self.canceled.unwrap_or(false)
    }

    pub fn from_locations(&self) -> Result<Vec<LocationRef>, DecodeError> {
        decode_list(self.from_location.as_ref())
    }

    pub fn products(&self) -> Result<Vec<DescribedEntry>, DecodeError> {
        decode_list(self.product_information.as_ref())
    }

    pub fn deviations(&self) -> Result<Vec<DescribedEntry>, DecodeError> {
        decode_list(self.deviation.as_ref())
    }
}
