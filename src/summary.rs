use chrono::NaiveDateTime;
use serde::Serialize;

use crate::record::{DelayStatus, NormalizedRecord};

/// Aggregate view over one snapshot.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_trains: usize,
    pub delayed_trains: usize,
    pub early_trains: usize,
    pub canceled_trains: usize,
    pub replaced_trains: usize,

    /// Mean of every known delay, `None` when no record has one.
    pub average_delay: Option<f64>,
    pub max_delay: Option<i64>,

    pub last_updated: Option<NaiveDateTime>,
}

impl Summary {
    pub fn from_records(records: &[NormalizedRecord], last_updated: Option<NaiveDateTime>) -> Self {
        let mut s = Summary {
            total_trains: records.len(),
            last_updated,
            ..Default::default()
        };

        let mut delays = Vec::new();

        for r in records {
            match r.delay_status {
                DelayStatus::Delayed => s.delayed_trains += 1,
                DelayStatus::Early => s.early_trains += 1,
                _ => {}
            }

            if r.is_canceled {
                s.canceled_trains += 1;
            }

            if r.is_replaced {
                s.replaced_trains += 1;
            }

            if let Some(d) = r.delay_minutes {
                delays.push(d);
            }
        }

        s.average_delay = mean(&delays);
        s.max_delay = delays.iter().copied().max();
        s
    }
}

/// Arithmetic mean, `None` for empty input.
pub fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
}
