//! Tor extra-info descriptor documents
//!
//! Extra-info descriptors carry a relay's (or sanitized bridge's) traffic
//! histories and statistics. Apart from the `extra-info` and `published`
//! lines everything is optional; statistics are grouped behind their
//! `*-stats-end` lines, see [`stats`].

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::descriptor::digest_from_raw;
use crate::error::{DocumentParseError, ErrorContext};
use crate::grammar::{self, Diagnostics, Keyword, KeywordSet, Occurrence, Sections};
use crate::history::BandwidthHistory;
use crate::meta::{Document, Fingerprint, Item};
use crate::options::ParseOptions;
use crate::split;
use crate::validate;

pub mod stats;
use stats::PartialGroup;
pub use stats::{
    BridgeStats, CellStats, ConnBiDirect, Counts, DirreqStats, EntryStats, ExitStats, GeoipStats,
    HidservStats, ObfuscatedValue, PaddingCounts, StatsGroup,
};

//
// External dependencies
//
use chrono::{DateTime, Utc};
use log::debug;
use strum::{EnumString, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Header,
    Body,
    Signature,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
enum Kw {
    ExtraInfo,
    #[strum(serialize = "identity-ed25519")]
    IdentityEd25519,
    #[strum(serialize = "master-key-ed25519")]
    MasterKeyEd25519,
    Published,
    ReadHistory,
    WriteHistory,
    DirreqReadHistory,
    DirreqWriteHistory,
    GeoipDbDigest,
    #[strum(serialize = "geoip6-db-digest")]
    Geoip6DbDigest,
    Transport,
    GeoipStartTime,
    GeoipClientOrigins,
    DirreqStatsEnd,
    #[strum(serialize = "dirreq-v2-ips")]
    DirreqV2Ips,
    #[strum(serialize = "dirreq-v3-ips")]
    DirreqV3Ips,
    #[strum(serialize = "dirreq-v2-reqs")]
    DirreqV2Reqs,
    #[strum(serialize = "dirreq-v3-reqs")]
    DirreqV3Reqs,
    #[strum(serialize = "dirreq-v2-share")]
    DirreqV2Share,
    #[strum(serialize = "dirreq-v3-share")]
    DirreqV3Share,
    #[strum(serialize = "dirreq-v2-resp")]
    DirreqV2Resp,
    #[strum(serialize = "dirreq-v3-resp")]
    DirreqV3Resp,
    #[strum(serialize = "dirreq-v2-direct-dl")]
    DirreqV2DirectDl,
    #[strum(serialize = "dirreq-v3-direct-dl")]
    DirreqV3DirectDl,
    #[strum(serialize = "dirreq-v2-tunneled-dl")]
    DirreqV2TunneledDl,
    #[strum(serialize = "dirreq-v3-tunneled-dl")]
    DirreqV3TunneledDl,
    EntryStatsEnd,
    EntryIps,
    CellStatsEnd,
    CellProcessedCells,
    CellQueuedCells,
    CellTimeInQueue,
    CellCircuitsPerDecile,
    ExitStatsEnd,
    ExitKibibytesWritten,
    ExitKibibytesRead,
    ExitStreamsOpened,
    BridgeStatsEnd,
    BridgeIps,
    BridgeIpVersions,
    BridgeIpTransports,
    HidservStatsEnd,
    HidservRendRelayedCells,
    HidservDirOnionsSeen,
    #[strum(serialize = "hidserv-v3-stats-end")]
    HidservV3StatsEnd,
    #[strum(serialize = "hidserv-rend-v3-relayed-cells")]
    HidservRendV3RelayedCells,
    #[strum(serialize = "hidserv-dir-v3-onions-seen")]
    HidservDirV3OnionsSeen,
    ConnBiDirect,
    PaddingCounts,
    RouterDigest,
    #[strum(serialize = "router-digest-sha256")]
    RouterDigestSha256,
    #[strum(serialize = "router-sig-ed25519")]
    RouterSigEd25519,
    RouterSignature,
}

impl Keyword for Kw {
    fn bit(self) -> u32 {
        self as u32
    }
}

impl Kw {
    fn rule(self) -> (Section, Occurrence) {
        match self {
            Kw::ExtraInfo => (Section::Header, Occurrence::ExactlyOnce),
            Kw::Published => (Section::Body, Occurrence::ExactlyOnce),
            Kw::Transport => (Section::Body, Occurrence::AnyNumber),
            Kw::RouterSigEd25519 | Kw::RouterSignature => {
                (Section::Signature, Occurrence::AtMostOnce)
            }
            _ => (Section::Body, Occurrence::AtMostOnce),
        }
    }

    fn has_object(self) -> bool {
        matches!(self, Kw::IdentityEd25519 | Kw::RouterSignature)
    }
}

const MANDATORY: &[Kw] = &[Kw::ExtraInfo, Kw::Published];

/// A pluggable transport offered by a bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    pub name: String,
    /// `address:port`, removed in sanitized descriptors
    pub address: Option<String>,
    pub arguments: Vec<String>,
}

/// A relay (or sanitized bridge) extra-info descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraInfoDescriptor {
    pub annotations: Vec<String>,
    pub nickname: String,
    pub fingerprint: Fingerprint,
    pub published: DateTime<Utc>,
    pub identity_ed25519: Option<Vec<u8>>,
    pub master_key_ed25519: Option<String>,
    pub read_history: Option<BandwidthHistory>,
    pub write_history: Option<BandwidthHistory>,
    pub dirreq_read_history: Option<BandwidthHistory>,
    pub dirreq_write_history: Option<BandwidthHistory>,
    pub geoip_db_digest: Option<Fingerprint>,
    pub geoip6_db_digest: Option<Fingerprint>,
    pub transports: Vec<Transport>,
    pub geoip_stats: Option<GeoipStats>,
    pub dirreq_stats: Option<StatsGroup<DirreqStats>>,
    pub entry_stats: Option<StatsGroup<EntryStats>>,
    pub cell_stats: Option<StatsGroup<CellStats>>,
    pub exit_stats: Option<StatsGroup<ExitStats>>,
    pub bridge_stats: Option<StatsGroup<BridgeStats>>,
    pub hidserv_stats: Option<StatsGroup<HidservStats>>,
    pub hidserv_v3_stats: Option<StatsGroup<HidservStats>>,
    pub conn_bi_direct: Option<ConnBiDirect>,
    pub padding_counts: Option<PaddingCounts>,
    pub router_digest_sha256: Option<String>,
    pub router_sig_ed25519: Option<String>,
    pub router_signature: Option<Vec<u8>>,
    /// SHA-1 digest of the signed part, or the `router-digest` of a bridge
    pub digest: Option<Fingerprint>,
    pub unrecognized_lines: Vec<String>,
}

/// Statistics groups that are being collected
struct Statistics {
    geoip_start_time: Option<DateTime<Utc>>,
    geoip_client_origins: Option<Counts>,
    dirreq: PartialGroup<DirreqStats>,
    entry: PartialGroup<EntryStats>,
    cell: PartialGroup<CellStats>,
    exit: PartialGroup<ExitStats>,
    bridge: PartialGroup<BridgeStats>,
    hidserv: PartialGroup<HidservStats>,
    hidserv_v3: PartialGroup<HidservStats>,
}

impl Default for Statistics {
    fn default() -> Self {
        Statistics {
            geoip_start_time: None,
            geoip_client_origins: None,
            dirreq: PartialGroup::new(Kw::DirreqStatsEnd.name()),
            entry: PartialGroup::new(Kw::EntryStatsEnd.name()),
            cell: PartialGroup::new(Kw::CellStatsEnd.name()),
            exit: PartialGroup::new(Kw::ExitStatsEnd.name()),
            bridge: PartialGroup::new(Kw::BridgeStatsEnd.name()),
            hidserv: PartialGroup::new(Kw::HidservStatsEnd.name()),
            hidserv_v3: PartialGroup::new(Kw::HidservV3StatsEnd.name()),
        }
    }
}

impl Statistics {
    /// Handle a statistics line; returns `false` for other keywords
    fn parse_item(&mut self, kw: Kw, item: &Item<'_>) -> Result<bool, DocumentParseError> {
        match kw {
            Kw::GeoipStartTime => self.geoip_start_time = Some(stats::start_time(item)?),
            Kw::GeoipClientOrigins => {
                self.geoip_client_origins = Some(stats::country_counts(item)?)
            }

            Kw::DirreqStatsEnd => self.dirreq.period(item)?,
            Kw::DirreqV2Ips => self.dirreq.values().v2_ips = Some(stats::country_counts(item)?),
            Kw::DirreqV3Ips => self.dirreq.values().v3_ips = Some(stats::country_counts(item)?),
            Kw::DirreqV2Reqs => self.dirreq.values().v2_reqs = Some(stats::country_counts(item)?),
            Kw::DirreqV3Reqs => self.dirreq.values().v3_reqs = Some(stats::country_counts(item)?),
            Kw::DirreqV2Share => self.dirreq.values().v2_share = Some(stats::share(item)?),
            Kw::DirreqV3Share => self.dirreq.values().v3_share = Some(stats::share(item)?),
            Kw::DirreqV2Resp => self.dirreq.values().v2_resp = Some(stats::keyed_counts(item)?),
            Kw::DirreqV3Resp => self.dirreq.values().v3_resp = Some(stats::keyed_counts(item)?),
            Kw::DirreqV2DirectDl => {
                self.dirreq.values().v2_direct_dl = Some(stats::keyed_counts(item)?)
            }
            Kw::DirreqV3DirectDl => {
                self.dirreq.values().v3_direct_dl = Some(stats::keyed_counts(item)?)
            }
            Kw::DirreqV2TunneledDl => {
                self.dirreq.values().v2_tunneled_dl = Some(stats::keyed_counts(item)?)
            }
            Kw::DirreqV3TunneledDl => {
                self.dirreq.values().v3_tunneled_dl = Some(stats::keyed_counts(item)?)
            }

            Kw::EntryStatsEnd => self.entry.period(item)?,
            Kw::EntryIps => self.entry.values().ips = Some(stats::country_counts(item)?),

            Kw::CellStatsEnd => self.cell.period(item)?,
            Kw::CellProcessedCells => {
                self.cell.values().processed_cells = Some(stats::integer_list(item)?)
            }
            Kw::CellQueuedCells => {
                self.cell.values().queued_cells = Some(stats::decimal_list(item)?)
            }
            Kw::CellTimeInQueue => {
                self.cell.values().time_in_queue = Some(stats::integer_list(item)?)
            }
            Kw::CellCircuitsPerDecile => {
                self.cell.values().circuits_per_decile = Some(stats::single_count(item)?)
            }

            Kw::ExitStatsEnd => self.exit.period(item)?,
            Kw::ExitKibibytesWritten => {
                self.exit.values().kibibytes_written = Some(stats::port_counts(item)?)
            }
            Kw::ExitKibibytesRead => {
                self.exit.values().kibibytes_read = Some(stats::port_counts(item)?)
            }
            Kw::ExitStreamsOpened => {
                self.exit.values().streams_opened = Some(stats::port_counts(item)?)
            }

            Kw::BridgeStatsEnd => self.bridge.period(item)?,
            Kw::BridgeIps => self.bridge.values().ips = Some(stats::country_counts(item)?),
            Kw::BridgeIpVersions => {
                self.bridge.values().ip_versions = Some(stats::keyed_counts(item)?)
            }
            Kw::BridgeIpTransports => {
                self.bridge.values().ip_transports = Some(stats::keyed_counts(item)?)
            }

            Kw::HidservStatsEnd => self.hidserv.period(item)?,
            Kw::HidservRendRelayedCells => {
                self.hidserv.values().rend_relayed_cells = Some(stats::obfuscated(item)?)
            }
            Kw::HidservDirOnionsSeen => {
                self.hidserv.values().dir_onions_seen = Some(stats::obfuscated(item)?)
            }
            Kw::HidservV3StatsEnd => self.hidserv_v3.period(item)?,
            Kw::HidservRendV3RelayedCells => {
                self.hidserv_v3.values().rend_relayed_cells = Some(stats::obfuscated(item)?)
            }
            Kw::HidservDirV3OnionsSeen => {
                self.hidserv_v3.values().dir_onions_seen = Some(stats::obfuscated(item)?)
            }

            _ => return Ok(false),
        }
        Ok(true)
    }

    fn geoip(&self) -> Result<Option<GeoipStats>, DocumentParseError> {
        match (self.geoip_start_time, &self.geoip_client_origins) {
            (Some(start_time), origins) => Ok(Some(GeoipStats {
                start_time,
                client_origins: origins.clone(),
            })),
            (None, Some(_)) => Err(DocumentParseError::missing(Kw::GeoipStartTime.name())),
            (None, None) => Ok(None),
        }
    }
}

/// Everything outside the statistics groups
#[derive(Default)]
struct Body {
    published: Option<DateTime<Utc>>,
    identity_ed25519: Option<Vec<u8>>,
    master_key_ed25519: Option<String>,
    read_history: Option<BandwidthHistory>,
    write_history: Option<BandwidthHistory>,
    dirreq_read_history: Option<BandwidthHistory>,
    dirreq_write_history: Option<BandwidthHistory>,
    geoip_db_digest: Option<Fingerprint>,
    geoip6_db_digest: Option<Fingerprint>,
    transports: Vec<Transport>,
    conn_bi_direct: Option<ConnBiDirect>,
    padding_counts: Option<PaddingCounts>,
    router_digest: Option<Fingerprint>,
    router_digest_sha256: Option<String>,
    router_sig_ed25519: Option<String>,
    router_signature: Option<Vec<u8>>,
}

impl Body {
    fn parse_item(&mut self, kw: Kw, item: &Item<'_>) -> Result<(), DocumentParseError> {
        match kw {
            Kw::Published => {
                self.published = Some(validate::timestamp(item.get_argument()?).context(item)?)
            }
            Kw::IdentityEd25519 => {
                item.no_arguments()?;
                self.identity_ed25519 = Some(item.object_bytes()?);
            }
            Kw::MasterKeyEd25519 => {
                self.master_key_ed25519 =
                    Some(validate::base64_key(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::ReadHistory => self.read_history = Some(BandwidthHistory::from_item(item)?),
            Kw::WriteHistory => self.write_history = Some(BandwidthHistory::from_item(item)?),
            Kw::DirreqReadHistory => {
                self.dirreq_read_history = Some(BandwidthHistory::from_item(item)?)
            }
            Kw::DirreqWriteHistory => {
                self.dirreq_write_history = Some(BandwidthHistory::from_item(item)?)
            }
            Kw::GeoipDbDigest => {
                self.geoip_db_digest =
                    Some(Fingerprint::from_str_hex(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::Geoip6DbDigest => {
                self.geoip6_db_digest =
                    Some(Fingerprint::from_str_hex(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::Transport => self.transports.push(parse_transport(item)?),
            Kw::ConnBiDirect => self.conn_bi_direct = Some(stats::conn_bi_direct(item)?),
            Kw::PaddingCounts => self.padding_counts = Some(stats::padding_counts(item)?),
            Kw::RouterDigest => {
                self.router_digest =
                    Some(Fingerprint::from_str_hex(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::RouterDigestSha256 => {
                let digest = item.args_exact(1)?[0];
                validate::base64_bytes(digest, 32).context(item)?;
                self.router_digest_sha256 = Some(digest.to_string());
            }
            Kw::RouterSigEd25519 => {
                let sig = item.args_exact(1)?[0];
                validate::base64_bytes(sig, 64).context(item)?;
                self.router_sig_ed25519 = Some(sig.to_string());
            }
            Kw::RouterSignature => {
                item.no_arguments()?;
                self.router_signature = Some(item.object_bytes()?);
            }
            _ => return Err(DocumentParseError::unexpected(item)),
        }
        Ok(())
    }
}

/// `transport name [address:port] [arguments]`
fn parse_transport(item: &Item<'_>) -> Result<Transport, DocumentParseError> {
    let args = item.args();
    let (name, rest) = args
        .split_first()
        .ok_or_else(|| DocumentParseError::args_missing(item))?;
    let (address, arguments) = match rest.split_first() {
        Some((address, arguments)) if address.contains(':') => {
            (Some(address.to_string()), arguments)
        }
        _ => (None, rest),
    };
    Ok(Transport {
        name: name.to_string(),
        address,
        arguments: arguments.iter().map(|a| a.to_string()).collect(),
    })
}

/// `extra-info nickname fingerprint`
fn parse_extra_info_line(item: &Item<'_>) -> Result<(String, Fingerprint), DocumentParseError> {
    let args = item.args_exact(2)?;
    Ok((
        validate::nickname(args[0]).context(item)?,
        Fingerprint::from_str_hex(args[1]).context(item)?,
    ))
}

impl ExtraInfoDescriptor {
    /// Parse a single extra-info descriptor from raw bytes.
    pub fn from_bytes(
        raw: &[u8],
        options: &ParseOptions,
    ) -> Result<ExtraInfoDescriptor, DocumentParseError> {
        let doc = Document::parse(raw)?;
        Self::from_doc(&doc, options)
    }

    /// Parse several concatenated extra-info descriptors.
    pub fn many_from_bytes(
        raw: &[u8],
        options: &ParseOptions,
    ) -> Result<Vec<ExtraInfoDescriptor>, DocumentParseError> {
        split::split_at_keyword(raw, Kw::ExtraInfo.name())?
            .into_iter()
            .map(|record| Self::from_bytes(record.raw, options))
            .collect()
    }

    pub(crate) fn from_doc(
        doc: &Document<'_>,
        options: &ParseOptions,
    ) -> Result<ExtraInfoDescriptor, DocumentParseError> {
        grammar::expect_first(&doc.items, Kw::ExtraInfo)?;

        let mut diagnostics = Diagnostics::new(options);
        let mut sections = Sections::new(Section::Header);
        let mut seen = KeywordSet::default();
        let mut header: Option<(String, Fingerprint)> = None;
        let mut body = Body::default();
        let mut statistics = Statistics::default();

        for item in doc.items.iter() {
            let kw = match Kw::from_str(item.keyword) {
                Ok(kw) => kw,
                Err(_) => {
                    diagnostics.unrecognized(item)?;
                    continue;
                }
            };
            let (section, occurrence) = kw.rule();
            if sections.advance(section, item)?.is_some() && section == Section::Signature {
                seen.require(MANDATORY)?;
            }
            seen.record(kw, occurrence, item)?;
            item.expect_object(kw.has_object())?;

            match kw {
                Kw::ExtraInfo => header = Some(parse_extra_info_line(item)?),
                _ if statistics.parse_item(kw, item)? => {}
                _ => body.parse_item(kw, item)?,
            }
            if kw == Kw::RouterSignature {
                sections.advance(Section::End, item)?;
            }
        }

        seen.require(MANDATORY)?;
        let (nickname, fingerprint) =
            header.ok_or_else(|| DocumentParseError::missing(Kw::ExtraInfo.name()))?;
        let published = body
            .published
            .ok_or_else(|| DocumentParseError::missing(Kw::Published.name()))?;

        let digest = match (body.router_digest, &body.router_signature) {
            (Some(digest), _) => Some(digest),
            (None, Some(_)) => doc
                .get_raw_content_until("\nrouter-signature\n")
                .map(digest_from_raw),
            (None, None) => None,
        };

        debug!("parsed extra-info descriptor of {} published {}", nickname, published);

        Ok(ExtraInfoDescriptor {
            annotations: doc.annotations(),
            nickname,
            fingerprint,
            published,
            identity_ed25519: body.identity_ed25519,
            master_key_ed25519: body.master_key_ed25519,
            read_history: body.read_history,
            write_history: body.write_history,
            dirreq_read_history: body.dirreq_read_history,
            dirreq_write_history: body.dirreq_write_history,
            geoip_db_digest: body.geoip_db_digest,
            geoip6_db_digest: body.geoip6_db_digest,
            transports: body.transports,
            geoip_stats: statistics.geoip()?,
            dirreq_stats: statistics.dirreq.finish()?,
            entry_stats: statistics.entry.finish()?,
            cell_stats: statistics.cell.finish()?,
            exit_stats: statistics.exit.finish()?,
            bridge_stats: statistics.bridge.finish()?,
            hidserv_stats: statistics.hidserv.finish()?,
            hidserv_v3_stats: statistics.hidserv_v3.finish()?,
            conn_bi_direct: body.conn_bi_direct,
            padding_counts: body.padding_counts,
            router_digest_sha256: body.router_digest_sha256,
            router_sig_ed25519: body.router_sig_ed25519,
            router_signature: body.router_signature,
            digest,
            unrecognized_lines: diagnostics.into_lines(),
        })
    }

    /// Countries with directory requests in the dirreq statistics, if any
    pub fn dirreq_v3_countries(&self) -> Option<&BTreeMap<String, u64>> {
        self.dirreq_stats.as_ref()?.values.v3_reqs.as_ref()
    }
}

impl FromStr for ExtraInfoDescriptor {
    type Err = DocumentParseError;

    /// Parse with default (lenient) options
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes(), &ParseOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "extra-info Unnamed 920B5C4A2B5D30FB6C6C4C5E0D3A6F5B9D1C4B2A\n\
                          published 2012-05-05 17:03:50\n";
    const SIGNATURE: &str =
        "router-signature\n-----BEGIN SIGNATURE-----\nAAAA\n-----END SIGNATURE-----\n";

    fn descriptor(extra: &str) -> String {
        format!("{}{}{}", HEADER, extra, SIGNATURE)
    }

    fn parse(raw: &str) -> Result<ExtraInfoDescriptor, DocumentParseError> {
        ExtraInfoDescriptor::from_bytes(raw.as_bytes(), &ParseOptions::strict())
    }

    #[test]
    fn minimal_descriptor() {
        let desc = parse(&descriptor("")).unwrap();
        assert_eq!(desc.nickname, "Unnamed");
        assert_eq!(
            desc.fingerprint.to_string(),
            "920B5C4A2B5D30FB6C6C4C5E0D3A6F5B9D1C4B2A"
        );
        assert!(desc.dirreq_stats.is_none());
        assert!(desc.transports.is_empty());
        let raw = descriptor("");
        let end = raw.find("\nrouter-signature\n").unwrap() + "\nrouter-signature\n".len();
        assert_eq!(desc.digest, Some(digest_from_raw(&raw[..end])));
    }

    #[test]
    fn extra_info_must_come_first() {
        let raw = format!("published 2012-05-05 17:03:50\n{}", descriptor(""));
        assert!(matches!(
            parse(&raw).unwrap_err(),
            DocumentParseError::WrongFirstKeyword { .. }
        ));
    }

    #[test]
    fn published_is_mandatory() {
        let raw = "extra-info Unnamed 920B5C4A2B5D30FB6C6C4C5E0D3A6F5B9D1C4B2A\n";
        assert_eq!(
            parse(raw).unwrap_err(),
            DocumentParseError::missing("published")
        );
    }

    #[test]
    fn dirreq_statistics() {
        let desc = parse(&descriptor(
            "dirreq-stats-end 2012-05-03 12:07:50 (86400 s)\n\
             dirreq-v3-ips us=16,de=8\n\
             dirreq-v3-reqs us=24,de=16\n\
             dirreq-v3-share 0.37%\n\
             dirreq-v3-resp ok=16,not-enough-sigs=0,unavailable=0\n\
             dirreq-v3-direct-dl complete=0,timeout=0,running=0\n\
             dirreq-v3-tunneled-dl complete=12,timeout=0,running=0,min=1234\n",
        ))
        .unwrap();
        let dirreq = desc.dirreq_stats.as_ref().unwrap();
        assert_eq!(dirreq.interval, 86400);
        assert_eq!(dirreq.values.v3_share, Some(0.37));
        assert_eq!(dirreq.values.v3_resp.as_ref().unwrap()["ok"], 16);
        assert_eq!(dirreq.values.v3_tunneled_dl.as_ref().unwrap()["min"], 1234);
        assert_eq!(desc.dirreq_v3_countries().unwrap()["de"], 16);
    }

    #[test]
    fn stats_need_their_end_line() {
        assert_eq!(
            parse(&descriptor("dirreq-v3-ips us=16\n")).unwrap_err(),
            DocumentParseError::missing("dirreq-stats-end")
        );
        assert_eq!(
            parse(&descriptor("cell-circuits-per-decile 7\n")).unwrap_err(),
            DocumentParseError::missing("cell-stats-end")
        );
        assert_eq!(
            parse(&descriptor("geoip-client-origins de=8\n")).unwrap_err(),
            DocumentParseError::missing("geoip-start-time")
        );
    }

    #[test]
    fn end_line_alone_is_an_empty_group() {
        let desc = parse(&descriptor("entry-stats-end 2012-05-03 12:07:50 (86400 s)\n")).unwrap();
        assert_eq!(desc.entry_stats.unwrap().values, EntryStats::default());
    }

    #[test]
    fn cell_exit_and_hidserv_statistics() {
        let desc = parse(&descriptor(
            "cell-stats-end 2012-05-03 12:07:50 (86400 s)\n\
             cell-processed-cells 2,0,0\n\
             cell-queued-cells 0.10,0.00,0.00\n\
             cell-time-in-queue 1,0,0\n\
             cell-circuits-per-decile 7\n\
             exit-stats-end 2012-05-03 12:07:50 (86400 s)\n\
             exit-kibibytes-written 80=115533759,443=1777,other=2\n\
             exit-kibibytes-read 80=100,other=3\n\
             exit-streams-opened 80=3,other=4\n\
             hidserv-stats-end 2012-05-03 12:07:50 (86400 s)\n\
             hidserv-rend-relayed-cells 3 delta_f=2048 epsilon=0.30 bin_size=1024\n\
             hidserv-dir-onions-seen -1 delta_f=8 epsilon=0.30 bin_size=8\n",
        ))
        .unwrap();
        let cell = desc.cell_stats.unwrap().values;
        assert_eq!(cell.queued_cells, Some(vec![0.10, 0.0, 0.0]));
        assert_eq!(cell.circuits_per_decile, Some(7));
        let exit = desc.exit_stats.unwrap().values;
        assert_eq!(exit.kibibytes_written.unwrap()["443"], 1777);
        let hidserv = desc.hidserv_stats.unwrap().values;
        assert_eq!(hidserv.dir_onions_seen.unwrap().value, -1.0);
        assert!(desc.hidserv_v3_stats.is_none());
    }

    #[test]
    fn bridge_descriptor() {
        let raw = "extra-info ec2bridgercc7f31fe 0B5DB56F7AB85B3F2CFF27B3F9DBD9B43A5DC8E0\n\
                   published 2012-06-08 02:21:27\n\
                   transport obfs4\n\
                   transport obfs3 10.0.0.1:1234 iat-mode=0\n\
                   bridge-stats-end 2012-06-07 06:33:53 (86400 s)\n\
                   bridge-ips cn=16,ir=16\n\
                   bridge-ip-versions v4=16,v6=8\n\
                   bridge-ip-transports <OR>=8,obfs4=8\n\
                   router-digest 00343A8024F70E214728F0C5AF7ACE0C1508F073\n";
        let desc = parse(raw).unwrap();
        assert_eq!(desc.transports.len(), 2);
        assert_eq!(desc.transports[1].address.as_deref(), Some("10.0.0.1:1234"));
        assert_eq!(desc.transports[1].arguments, vec!["iat-mode=0"]);
        let bridge = desc.bridge_stats.unwrap().values;
        assert_eq!(bridge.ip_versions.unwrap()["v6"], 8);
        assert_eq!(bridge.ip_transports.unwrap()["<OR>"], 8);
        assert_eq!(
            desc.digest.unwrap().to_string(),
            "00343A8024F70E214728F0C5AF7ACE0C1508F073"
        );
    }

    #[test]
    fn histories() {
        let desc = parse(&descriptor(
            "write-history 2012-05-05 17:02:45 (900 s) 1,2,3\n\
             dirreq-read-history 2012-05-05 17:02:45 (900 s) 4\n\
             geoip-db-digest 00343A8024F70E214728F0C5AF7ACE0C1508F073\n",
        ))
        .unwrap();
        assert_eq!(desc.write_history.unwrap().values.len(), 3);
        assert_eq!(desc.dirreq_read_history.unwrap().values.len(), 1);
        assert!(desc.geoip_db_digest.is_some());
    }

    #[test]
    fn duplicate_stats_lines_fail() {
        let raw = descriptor(
            "entry-stats-end 2012-05-03 12:07:50 (86400 s)\nentry-ips de=1\nentry-ips de=2\n",
        );
        assert!(matches!(
            parse(&raw).unwrap_err(),
            DocumentParseError::DuplicateKeyword { .. }
        ));
    }

    #[test]
    fn conn_and_padding() {
        let desc = parse(&descriptor(
            "conn-bi-direct 2012-05-03 12:07:50 (86400 s) 277,1,2,3\n\
             padding-counts 2017-05-17 11:02:58 (86400 s) bin-size=10000 write-drop=0\n",
        ))
        .unwrap();
        assert_eq!(desc.conn_bi_direct.unwrap().below, 277);
        assert_eq!(desc.padding_counts.unwrap().counts["bin-size"], 10000);
    }

    #[test]
    fn lenient_keeps_unrecognized_lines() {
        let raw = descriptor("unrecognized-line 1\n");
        assert!(parse(&raw).is_err());
        let desc = ExtraInfoDescriptor::from_bytes(raw.as_bytes(), &ParseOptions::lenient()).unwrap();
        assert_eq!(desc.unrecognized_lines, vec!["unrecognized-line 1"]);
    }

    #[test]
    fn many_descriptors() {
        let raw = format!(
            "@type extra-info 1.0\n{}@type extra-info 1.0\n{}",
            descriptor(""),
            descriptor("")
        );
        let descs =
            ExtraInfoDescriptor::many_from_bytes(raw.as_bytes(), &ParseOptions::strict()).unwrap();
        assert_eq!(descs.len(), 2);
    }
}
