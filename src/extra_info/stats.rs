//! Statistics blocks of extra-info descriptors.
//!
//! Every statistics group is introduced by a line with its measurement
//! period (`*-stats-end YYYY-MM-DD HH:MM:SS (NSEC s)`). The period line is
//! mandatory as soon as any member of the group is present; all member
//! lines are optional.

use std::collections::BTreeMap;

use crate::error::{DocumentParseError, ErrorContext};
use crate::meta::Item;
use crate::validate::{self, FieldResult};

//
// External dependencies
//
use chrono::{DateTime, Utc};

/// A statistics group together with its measurement period
#[derive(Debug, Clone, PartialEq)]
pub struct StatsGroup<M> {
    /// End of the measurement period
    pub end: DateTime<Utc>,
    /// Length of the measurement period in seconds
    pub interval: u64,
    pub values: M,
}

/// Histogram keyed by country code, port, response status and the like
pub type Counts = BTreeMap<String, u64>;

/// `dirreq-*` lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirreqStats {
    pub v2_ips: Option<Counts>,
    pub v3_ips: Option<Counts>,
    pub v2_reqs: Option<Counts>,
    pub v3_reqs: Option<Counts>,
    /// Percentages
    pub v2_share: Option<f64>,
    pub v3_share: Option<f64>,
    pub v2_resp: Option<Counts>,
    pub v3_resp: Option<Counts>,
    pub v2_direct_dl: Option<Counts>,
    pub v3_direct_dl: Option<Counts>,
    pub v2_tunneled_dl: Option<Counts>,
    pub v3_tunneled_dl: Option<Counts>,
}

/// `entry-ips`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryStats {
    pub ips: Option<Counts>,
}

/// `cell-*` lines, one value per decile of circuits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellStats {
    pub processed_cells: Option<Vec<u64>>,
    pub queued_cells: Option<Vec<f64>>,
    pub time_in_queue: Option<Vec<u64>>,
    pub circuits_per_decile: Option<u64>,
}

/// `exit-*` lines, keyed by port or `other`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitStats {
    pub kibibytes_written: Option<Counts>,
    pub kibibytes_read: Option<Counts>,
    pub streams_opened: Option<Counts>,
}

/// `bridge-*` lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeStats {
    pub ips: Option<Counts>,
    pub ip_versions: Option<Counts>,
    pub ip_transports: Option<Counts>,
}

/// `hidserv-*` lines of one onion service protocol version
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HidservStats {
    pub rend_relayed_cells: Option<ObfuscatedValue>,
    pub dir_onions_seen: Option<ObfuscatedValue>,
}

/// A statistic reported with added noise, and the noise parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ObfuscatedValue {
    pub value: f64,
    /// e.g. `delta_f`, `epsilon`, `bin_size`
    pub parameters: BTreeMap<String, f64>,
}

/// The pre-`dirreq` `geoip-start-time` / `geoip-client-origins` pair
#[derive(Debug, Clone, PartialEq)]
pub struct GeoipStats {
    pub start_time: DateTime<Utc>,
    pub client_origins: Option<Counts>,
}

/// `conn-bi-direct`: connections by their read/write behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnBiDirect {
    pub end: DateTime<Utc>,
    pub interval: u64,
    pub below: u64,
    pub read: u64,
    pub write: u64,
    pub both: u64,
}

/// `padding-counts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddingCounts {
    pub end: DateTime<Utc>,
    pub interval: u64,
    pub counts: BTreeMap<String, u64>,
}

/// A statistics group that is being collected
#[derive(Debug)]
pub(super) struct PartialGroup<M> {
    end_keyword: &'static str,
    period: Option<(DateTime<Utc>, u64)>,
    has_members: bool,
    values: M,
}

impl<M: Default> PartialGroup<M> {
    pub fn new(end_keyword: &'static str) -> Self {
        PartialGroup {
            end_keyword,
            period: None,
            has_members: false,
            values: M::default(),
        }
    }

    /// Record the `*-stats-end` line
    pub fn period(&mut self, item: &Item<'_>) -> Result<(), DocumentParseError> {
        let (end, interval, rest) =
            validate::timestamp_interval(item.get_argument()?).context(item)?;
        if !rest.is_empty() {
            return Err(DocumentParseError::invalid(item, "trailing data after interval"));
        }
        self.period = Some((end, interval));
        Ok(())
    }

    /// Access the member values, marking the group as used
    pub fn values(&mut self) -> &mut M {
        self.has_members = true;
        &mut self.values
    }

    /// The completed group; fails if members lack their period line
    pub fn finish(self) -> Result<Option<StatsGroup<M>>, DocumentParseError> {
        match self.period {
            Some((end, interval)) => Ok(Some(StatsGroup {
                end,
                interval,
                values: self.values,
            })),
            None if self.has_members => Err(DocumentParseError::missing(self.end_keyword)),
            None => Ok(None),
        }
    }
}

/// `key=count,...` with keys checked by `key`; empty arguments are an empty map
pub(super) fn counts(
    item: &Item<'_>,
    key: impl Fn(&str) -> FieldResult<String>,
) -> Result<Counts, DocumentParseError> {
    validate::key_values(item.argument_or_empty(), key, validate::non_negative).context(item)
}

pub(super) fn country_counts(item: &Item<'_>) -> Result<Counts, DocumentParseError> {
    counts(item, validate::country_code)
}

pub(super) fn port_counts(item: &Item<'_>) -> Result<Counts, DocumentParseError> {
    counts(item, validate::port_key)
}

pub(super) fn keyed_counts(item: &Item<'_>) -> Result<Counts, DocumentParseError> {
    counts(item, validate::any_key)
}

/// Comma-separated integers, one per decile
pub(super) fn integer_list(item: &Item<'_>) -> Result<Vec<u64>, DocumentParseError> {
    validate::histogram(item.argument_or_empty(), validate::non_negative).context(item)
}

/// Comma-separated two-decimal numbers, one per decile
pub(super) fn decimal_list(item: &Item<'_>) -> Result<Vec<f64>, DocumentParseError> {
    validate::histogram(item.argument_or_empty(), validate::decimal2).context(item)
}

pub(super) fn share(item: &Item<'_>) -> Result<f64, DocumentParseError> {
    validate::percentage(item.args_exact(1)?[0]).context(item)
}

pub(super) fn single_count(item: &Item<'_>) -> Result<u64, DocumentParseError> {
    validate::uint(item.args_exact(1)?[0]).context(item)
}

/// `value key=value ...`
pub(super) fn obfuscated(item: &Item<'_>) -> Result<ObfuscatedValue, DocumentParseError> {
    let args = item.args();
    let (value, params) = args
        .split_first()
        .ok_or_else(|| DocumentParseError::args_missing(item))?;
    let mut parameters = BTreeMap::new();
    for param in params {
        let (k, v) = validate::split_pair(param).context(item)?;
        parameters.insert(k.to_string(), validate::decimal(v).context(item)?);
    }
    Ok(ObfuscatedValue {
        value: validate::decimal(value).context(item)?,
        parameters,
    })
}

/// `geoip-start-time YYYY-MM-DD HH:MM:SS`
pub(super) fn start_time(item: &Item<'_>) -> Result<DateTime<Utc>, DocumentParseError> {
    validate::timestamp(item.get_argument()?).context(item)
}

/// `conn-bi-direct YYYY-MM-DD HH:MM:SS (NSEC s) BELOW,READ,WRITE,BOTH`
pub(super) fn conn_bi_direct(item: &Item<'_>) -> Result<ConnBiDirect, DocumentParseError> {
    let (end, interval, rest) = validate::timestamp_interval(item.get_argument()?).context(item)?;
    match validate::histogram(rest, validate::non_negative).context(item)?[..] {
        [below, read, write, both] => Ok(ConnBiDirect {
            end,
            interval,
            below,
            read,
            write,
            both,
        }),
        _ => Err(DocumentParseError::invalid(item, "expected four connection counts")),
    }
}

/// `padding-counts YYYY-MM-DD HH:MM:SS (NSEC s) key=val key=val ...`
pub(super) fn padding_counts(item: &Item<'_>) -> Result<PaddingCounts, DocumentParseError> {
    let (end, interval, rest) = validate::timestamp_interval(item.get_argument()?).context(item)?;
    let mut counts = BTreeMap::new();
    for token in rest.split(validate::is_ws).filter(|t| !t.is_empty()) {
        let (k, v) = validate::split_pair(token).context(item)?;
        counts.insert(k.to_string(), validate::non_negative(v).context(item)?);
    }
    Ok(PaddingCounts {
        end,
        interval,
        counts,
    })
}
