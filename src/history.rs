//! Bandwidth and traffic history lines
//!
//! `read-history 2012-01-01 03:51:44 (900 s) 4345856,261120,7591936,1748992`

use std::collections::BTreeMap;

use crate::error::{DocumentParseError, ErrorContext};
use crate::meta::Item;
use crate::validate;

//
// External dependencies
//
use chrono::{offset::TimeZone, DateTime, Utc};

/// A history of byte counts over fixed-length intervals.
///
/// `values` maps the end of each interval to its value; the last value ends
/// at `end`, every earlier one `interval` seconds before its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandwidthHistory {
    pub end: DateTime<Utc>,
    /// Interval length in seconds
    pub interval: u64,
    pub values: BTreeMap<DateTime<Utc>, u64>,
}

impl BandwidthHistory {
    pub(crate) fn from_item(item: &Item<'_>) -> Result<BandwidthHistory, DocumentParseError> {
        let (end, interval, rest) =
            validate::timestamp_interval(item.get_argument()?).context(item)?;
        let raw_values = validate::histogram(rest, validate::non_negative).context(item)?;

        let interval_ms = i64::try_from(interval)
            .ok()
            .and_then(|i| i.checked_mul(1000))
            .ok_or_else(|| DocumentParseError::invalid(item, "interval too large"))?;
        let count = raw_values.len() as i64;
        let mut values = BTreeMap::new();
        for (i, value) in raw_values.into_iter().enumerate() {
            let steps = count - 1 - i as i64;
            let stamp = steps
                .checked_mul(interval_ms)
                .and_then(|back| end.timestamp_millis().checked_sub(back))
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .ok_or_else(|| DocumentParseError::invalid(item, "history reaches out of range"))?;
            values.insert(stamp, value);
        }

        Ok(BandwidthHistory {
            end,
            interval,
            values,
        })
    }
}
