//! Turns one [`RawAnnouncement`] into a [`NormalizedRecord`].
//!
//! Everything here is pure: the only input besides the announcement is the
//! processing time `now`, which is also stamped as the record's `LastUpdated`.
//! Malformed fields never abort classification; they degrade to absent or
//! empty values.

use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

use crate::announcement::{DescribedEntry, RawAnnouncement, raw_text};
use crate::record::{
    CANCELED_DESCRIPTION, DELAY_THRESHOLD_MINUTES, DataFreshness, DelayStatus, NormalizedRecord,
};

/// Offsets upstream appends to local timestamps. They are stripped, not applied.
const LOCAL_OFFSETS: [&str; 2] = ["+02:00", "+01:00"];

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Lowercase fragments marking a train as replaced ("replaces", "bus").
const REPLACEMENT_KEYWORDS: [&str; 2] = ["ersätter", "buss"];

const IMMINENT_MINUTES: i64 = 30;
const UPCOMING_MINUTES: i64 = 120;

/// Parses an upstream timestamp into naive local time.
///
/// A trailing `+02:00`/`+01:00` offset is removed without conversion and any
/// fractional seconds are dropped. Returns `None` for empty or unparseable input.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let without_offset = LOCAL_OFFSETS
        .iter()
        .find_map(|offset| value.strip_suffix(offset))
        .unwrap_or(value);
    let whole_seconds = without_offset.split('.').next().unwrap_or(without_offset);

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(whole_seconds, fmt).ok())
}

fn parse_field(value: Option<&str>) -> Option<NaiveDateTime> {
    value.and_then(parse_timestamp)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Maps a delay in minutes onto a status.
///
/// | Delay        | Status  |
/// |--------------|---------|
/// | > 2          | DELAYED |
/// | < -2         | EARLY   |
/// | -2 ..= 2     | ON_TIME |
pub fn delay_status(delay_minutes: i64) -> DelayStatus {
    match delay_minutes {
        d if d > DELAY_THRESHOLD_MINUTES => DelayStatus::Delayed,
        d if d < -DELAY_THRESHOLD_MINUTES => DelayStatus::Early,
        _ => DelayStatus::OnTime,
    }
}

/// Computes the delay against the advertised time.
///
/// The actual time wins over the estimate whenever its raw text is non-empty,
/// even if that text turns out not to parse.
pub fn compute_delay(
    advertised: Option<&str>,
    estimated: Option<&str>,
    actual: Option<&str>,
) -> (Option<i64>, DelayStatus) {
    let Some(advertised) = parse_field(advertised) else {
        return (None, DelayStatus::NoSchedule);
    };

    let comparison = non_empty(actual).or(estimated);
    let Some(comparison) = parse_field(comparison) else {
        return (None, DelayStatus::NoEstimate);
    };

    // Integer division truncates toward zero.
    let delay = (comparison - advertised).num_seconds() / 60;
    (Some(delay), delay_status(delay))
}

/// Returns `(is_replaced, description)` for a record's deviation field.
pub fn extract_deviation(raw: &RawAnnouncement) -> (bool, String) {
    if raw.is_canceled() {
        return (false, CANCELED_DESCRIPTION.to_string());
    }

    match raw.deviations() {
        Ok(entries) => describe_deviations(&entries),
        Err(e) => {
            debug!(error = %e, "Deviation field did not decode, keeping raw text");
            (false, raw_text(raw.deviation.as_ref()))
        }
    }
}

fn describe_deviations(entries: &[DescribedEntry]) -> (bool, String) {
    let descriptions: Vec<&str> = entries
        .iter()
        .filter_map(|e| e.description.as_deref())
        .collect();

    let is_replaced = descriptions.iter().any(|d| is_replacement(d));
    (is_replaced, descriptions.join("; "))
}

fn is_replacement(description: &str) -> bool {
    let lower = description.to_lowercase();
    REPLACEMENT_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn first_location_name(raw: &RawAnnouncement) -> String {
    raw.from_locations()
        .ok()
        .and_then(|locations| locations.into_iter().next())
        .and_then(|l| l.location_name)
        .unwrap_or_default()
}

fn first_product_description(raw: &RawAnnouncement) -> String {
    raw.products()
        .ok()
        .and_then(|products| products.into_iter().next())
        .and_then(|p| p.description)
        .unwrap_or_default()
}

/// Buckets an announcement by how far its advertised time lies from `now`.
///
/// | Condition                      | Bucket    |
/// |--------------------------------|-----------|
/// | no advertised time             | UNKNOWN   |
/// | arrived (actual time reported) | ARRIVED   |
/// | < 0 min until arrival          | OVERDUE   |
/// | < 30 min                       | IMMINENT  |
/// | < 120 min                      | UPCOMING  |
/// | otherwise                      | SCHEDULED |
pub fn freshness(
    advertised: Option<NaiveDateTime>,
    has_arrived: bool,
    now: NaiveDateTime,
) -> DataFreshness {
    let Some(advertised) = advertised else {
        return DataFreshness::Unknown;
    };
    if has_arrived {
        return DataFreshness::Arrived;
    }

    match advertised - now {
        t if t < TimeDelta::zero() => DataFreshness::Overdue,
        t if t < TimeDelta::minutes(IMMINENT_MINUTES) => DataFreshness::Imminent,
        t if t < TimeDelta::minutes(UPCOMING_MINUTES) => DataFreshness::Upcoming,
        _ => DataFreshness::Scheduled,
    }
}

/// Classifies a single announcement as seen at `now`.
pub fn classify(raw: &RawAnnouncement, now: NaiveDateTime) -> NormalizedRecord {
    let advertised_raw = raw.advertised_time_at_location.as_deref();
    let estimated_raw = raw.estimated_time_at_location.as_deref();
    let actual_raw = raw.time_at_location.as_deref();

    let advertised_time = parse_field(advertised_raw);
    let (delay_minutes, delay_status) = compute_delay(advertised_raw, estimated_raw, actual_raw);
    let (is_replaced, deviation_description) = extract_deviation(raw);

    NormalizedRecord {
        activity_id: raw.activity_id.clone().unwrap_or_default(),
        advertised_train_ident: raw.advertised_train_ident.clone().unwrap_or_default(),
        advertised_time,
        estimated_time: parse_field(estimated_raw),
        actual_time: parse_field(actual_raw),
        delay_minutes,
        delay_status,
        is_canceled: raw.is_canceled(),
        is_replaced,
        deviation_description,
        from_location: first_location_name(raw),
        track_at_location: raw.track_at_location.clone().unwrap_or_default(),
        product_description: first_product_description(raw),
        operational_train_number: raw.operational_train_number.clone().unwrap_or_default(),
        last_updated: now,
        data_freshness: freshness(advertised_time, non_empty(actual_raw).is_some(), now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::at;
    use serde_json::json;

    fn announcement(advertised: &str, estimated: &str, actual: &str) -> RawAnnouncement {
        RawAnnouncement {
            activity_id: Some("1500adde-f7a6-9b9e-08d9-c8f4a1b8e0f1".to_string()),
            advertised_train_ident: Some("3021".to_string()),
            advertised_time_at_location: Some(advertised.to_string()),
            estimated_time_at_location: Some(estimated.to_string()),
            time_at_location: Some(actual.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_timestamp_strips_offset_without_converting() {
        assert_eq!(parse_timestamp("2025-03-14T12:05:00.000+01:00"), Some(at(12, 5)));
        assert_eq!(parse_timestamp("2025-03-14T12:05:00+02:00"), Some(at(12, 5)));
    }

    #[test]
    fn test_parse_timestamp_truncates_fraction() {
        assert_eq!(parse_timestamp("2025-03-14T12:05:00.734"), Some(at(12, 5)));
        assert_eq!(parse_timestamp("2025-03-14 12:05:00"), Some(at(12, 5)));
        assert_eq!(parse_timestamp("2025-03-14T12:05"), Some(at(12, 5)));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("tomorrow"), None);
        assert_eq!(parse_timestamp("2025-13-40T12:00:00"), None);
    }

    #[test]
    fn test_missing_advertised_time_is_no_schedule() {
        let raw = announcement("", "2025-03-14T12:05:00", "");
        let record = classify(&raw, at(11, 0));
        assert_eq!(record.delay_status, DelayStatus::NoSchedule);
        assert_eq!(record.delay_minutes, None);
        assert_eq!(record.data_freshness, DataFreshness::Unknown);

        let unparseable = announcement("soon", "", "2025-03-14T12:05:00");
        let record = classify(&unparseable, at(11, 0));
        assert_eq!(record.delay_status, DelayStatus::NoSchedule);
        // UNKNOWN wins over ARRIVED when there is no schedule to compare against.
        assert_eq!(record.data_freshness, DataFreshness::Unknown);
    }

    #[test]
    fn test_missing_estimate_is_no_estimate() {
        let raw = announcement("2025-03-14T12:00:00", "", "");
        let record = classify(&raw, at(11, 0));
        assert_eq!(record.delay_status, DelayStatus::NoEstimate);
        assert_eq!(record.delay_minutes, None);

        let raw = RawAnnouncement {
            advertised_time_at_location: Some("2025-03-14T12:00:00".to_string()),
            ..Default::default()
        };
        assert_eq!(classify(&raw, at(11, 0)).delay_status, DelayStatus::NoEstimate);
    }

    #[test]
    fn test_unparseable_actual_does_not_fall_back_to_estimate() {
        let (delay, status) =
            compute_delay(Some("2025-03-14T12:00:00"), Some("2025-03-14T12:10:00"), Some("n/a"));
        assert_eq!(delay, None);
        assert_eq!(status, DelayStatus::NoEstimate);
    }

    #[test]
    fn test_delay_boundaries() {
        let advertised = Some("2025-03-14T12:00:00");

        let (delay, status) = compute_delay(advertised, None, Some("2025-03-14T12:02:00"));
        assert_eq!((delay, status), (Some(2), DelayStatus::OnTime));

        let (delay, status) = compute_delay(advertised, None, Some("2025-03-14T12:03:00"));
        assert_eq!((delay, status), (Some(3), DelayStatus::Delayed));

        let (delay, status) = compute_delay(advertised, None, Some("2025-03-14T11:57:00"));
        assert_eq!((delay, status), (Some(-3), DelayStatus::Early));

        let (delay, status) = compute_delay(advertised, None, Some("2025-03-14T11:58:00"));
        assert_eq!((delay, status), (Some(-2), DelayStatus::OnTime));
    }

    #[test]
    fn test_delay_truncates_toward_zero() {
        let advertised = Some("2025-03-14T12:00:00");
        let (delay, _) = compute_delay(advertised, None, Some("2025-03-14T12:03:59"));
        assert_eq!(delay, Some(3));
        let (delay, _) = compute_delay(advertised, None, Some("2025-03-14T11:58:30"));
        assert_eq!(delay, Some(-1));
    }

    #[test]
    fn test_actual_time_preferred_over_estimate() {
        let (delay, _) = compute_delay(
            Some("2025-03-14T12:00:00"),
            Some("2025-03-14T12:20:00"),
            Some("2025-03-14T12:04:00"),
        );
        assert_eq!(delay, Some(4));

        let (delay, _) = compute_delay(Some("2025-03-14T12:00:00"), Some("2025-03-14T12:20:00"), None);
        assert_eq!(delay, Some(20));
    }

    #[test]
    fn test_canceled_short_circuits_deviation() {
        let raw = RawAnnouncement {
            canceled: Some(true),
            deviation: Some(json!([{"Description": "Buss ersätter tåg"}])),
            ..Default::default()
        };
        let record = classify(&raw, at(11, 0));
        assert!(record.is_canceled);
        assert!(!record.is_replaced);
        assert_eq!(record.deviation_description, "CANCELED");
    }

    #[test]
    fn test_replacement_keywords_any_case() {
        for text in ["Buss ersätter tåg", "BUSS ERSÄTTER TÅG", "ersätter tåg 3021", "Ersättningsbuss"] {
            let raw = RawAnnouncement {
                deviation: Some(json!([{"Description": text}])),
                ..Default::default()
            };
            let (replaced, description) = extract_deviation(&raw);
            assert!(replaced, "{text} should mark the train as replaced");
            assert_eq!(description, text);
        }
    }

    #[test]
    fn test_deviation_descriptions_joined() {
        let raw = RawAnnouncement {
            deviation: Some(json!([
                {"Code": "ANA027", "Description": "Spårändrat"},
                {"Code": "ANA088"},
                {"Description": "Inställd mellan Alingsås och Göteborg C"}
            ])),
            ..Default::default()
        };
        let (replaced, description) = extract_deviation(&raw);
        assert!(!replaced);
        assert_eq!(description, "Spårändrat; Inställd mellan Alingsås och Göteborg C");
    }

    #[test]
    fn test_malformed_deviation_falls_back_to_raw_text() {
        let raw = RawAnnouncement {
            deviation: Some(json!("Buss ersätter tåg (unstructured)")),
            ..Default::default()
        };
        let (replaced, description) = extract_deviation(&raw);
        assert!(!replaced);
        assert_eq!(description, "Buss ersätter tåg (unstructured)");
    }

    #[test]
    fn test_deviation_ignores_non_object_entries() {
        let raw = RawAnnouncement {
            deviation: Some(json!(["Spårändrat", {"Description": "Buss ersätter tåg"}])),
            ..Default::default()
        };
        let (replaced, description) = extract_deviation(&raw);
        assert!(replaced);
        assert_eq!(description, "Buss ersätter tåg");
    }

    #[test]
    fn test_nested_fields_extracted() {
        let raw = RawAnnouncement {
            from_location: Some(json!([{"LocationName": "Sk", "Priority": 1, "Order": 0}])),
            product_information: Some(json!(r#"[{"Code": "PNA054", "Description": "Västtågen"}]"#)),
            ..Default::default()
        };
        let record = classify(&raw, at(11, 0));
        assert_eq!(record.from_location, "Sk");
        assert_eq!(record.product_description, "Västtågen");
    }

    #[test]
    fn test_malformed_nested_fields_are_empty() {
        let raw = RawAnnouncement {
            from_location: Some(json!("[{'LocationName': 'Sk'")),
            product_information: Some(json!({"Description": "not a list"})),
            ..Default::default()
        };
        let record = classify(&raw, at(11, 0));
        assert_eq!(record.from_location, "");
        assert_eq!(record.product_description, "");
    }

    #[test]
    fn test_freshness_buckets() {
        let now = at(12, 0);
        assert_eq!(freshness(Some(at(11, 59)), false, now), DataFreshness::Overdue);
        assert_eq!(freshness(Some(at(12, 0)), false, now), DataFreshness::Imminent);
        assert_eq!(freshness(Some(at(12, 29)), false, now), DataFreshness::Imminent);
        assert_eq!(freshness(Some(at(12, 30)), false, now), DataFreshness::Upcoming);
        assert_eq!(freshness(Some(at(13, 59)), false, now), DataFreshness::Upcoming);
        assert_eq!(freshness(Some(at(14, 0)), false, now), DataFreshness::Scheduled);
        assert_eq!(freshness(None, true, now), DataFreshness::Unknown);
    }

    #[test]
    fn test_actual_time_means_arrived() {
        let overdue = announcement("2025-03-14T11:00:00", "", "2025-03-14T11:05:00");
        assert_eq!(classify(&overdue, at(11, 30)).data_freshness, DataFreshness::Arrived);

        let early = announcement("2025-03-14T15:00:00", "", "2025-03-14T11:05:00");
        assert_eq!(classify(&early, at(11, 30)).data_freshness, DataFreshness::Arrived);
    }

    #[test]
    fn test_classification_is_repeatable() {
        let raw = RawAnnouncement {
            deviation: Some(json!([{"Description": "Buss ersätter tåg"}])),
            from_location: Some(json!([{"LocationName": "Hr"}])),
            ..announcement("2025-03-14T12:00:00", "2025-03-14T12:07:00", "")
        };
        let now = at(11, 45);
        assert_eq!(classify(&raw, now), classify(&raw, now));
    }

    #[test]
    fn test_classify_full_record() {
        let raw = RawAnnouncement {
            track_at_location: Some("7".to_string()),
            operational_train_number: Some("3021".to_string()),
            ..announcement("2025-03-14T12:00:00.000+01:00", "2025-03-14T12:10:00.000+01:00", "")
        };
        let now = at(11, 45);
        let record = classify(&raw, now);

        assert_eq!(record.advertised_train_ident, "3021");
        assert_eq!(record.advertised_time, Some(at(12, 0)));
        assert_eq!(record.estimated_time, Some(at(12, 10)));
        assert_eq!(record.actual_time, None);
        assert_eq!(record.delay_minutes, Some(10));
        assert_eq!(record.delay_status, DelayStatus::Delayed);
        assert_eq!(record.track_at_location, "7");
        assert_eq!(record.last_updated, now);
        assert_eq!(record.data_freshness, DataFreshness::Imminent);
        assert!(record.is_significant());
    }
}
