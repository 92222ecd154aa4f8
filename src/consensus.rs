//! Tor consensus documents

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::descriptor::ExitPolicyType;
use crate::error::{DocumentParseError, FieldError};
use crate::meta::{Document, Fingerprint};
use crate::network_status::{
    self, DirSourceEntry, DirectorySignature, Flavor, Header, Kw, NetworkStatusEntry,
    SharedRandValue,
};
use crate::options::ParseOptions;
use crate::validate;

//
// External dependencies
//
use chrono::{DateTime, Utc};
use strum::{EnumString, IntoStaticStr};

/// A relay flag in the consensus
#[derive(Debug, Clone, Copy, EnumString, IntoStaticStr, PartialEq, Eq, PartialOrd, Ord)]
pub enum Flag {
    Authority,
    BadExit,
    Exit,
    Fast,
    Guard,
    HSDir,
    MiddleOnly,
    Named,
    Unnamed,
    NoEdConsensus,
    Running,
    Stable,
    StaleDesc,
    Sybil,
    V2Dir,
    Valid,
}

/// A range of supported protocol versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedProtocolVersion {
    versions: Vec<u8>,
}

impl SupportedProtocolVersion {
    pub fn supports(&self, v: u8) -> bool {
        self.versions.contains(&v)
    }

    pub fn versions(&self) -> &[u8] {
        &self.versions
    }
}

impl fmt::Display for SupportedProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut last_version: Option<u8> = None;
        let mut range_end = None;
        for v in self.versions.iter().copied() {
            match last_version {
                Some(last) if last.checked_add(1) == Some(v) => {
                    if range_end.is_none() {
                        write!(f, "-")?;
                    }
                    range_end = Some(v);
                }
                Some(_) => {
                    if let Some(x) = range_end.take() {
                        write!(f, "{}", x)?;
                    }
                    write!(f, ",{}", v)?;
                }
                // first element
                None => write!(f, "{}", v)?,
            }
            last_version = Some(v);
        }
        if let Some(x) = range_end.take() {
            write!(f, "{}", x)?;
        }
        Ok(())
    }
}

impl FromStr for SupportedProtocolVersion {
    type Err = FieldError;

    /// Parse from "3", "2-5" or a comma-separated list of these.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let version = |v: &str| {
            validate::uint(v)
                .ok()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| FieldError::new(format!("invalid protocol version '{}'", v)))
        };
        let mut versions = Vec::new();
        if s.is_empty() {
            return Ok(SupportedProtocolVersion { versions });
        }
        for component in validate::comma_list(s)? {
            match component.split_once('-') {
                Some((min, max)) => {
                    let (min, max) = (version(min)?, version(max)?);
                    if min > max {
                        return Err(FieldError::new(format!(
                            "empty version range '{}'",
                            component
                        )));
                    }
                    versions.extend(min..=max);
                }
                None => versions.push(version(component)?),
            }
        }
        versions.sort_unstable();
        versions.dedup();
        Ok(SupportedProtocolVersion { versions })
    }
}

/// Exit port entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicyEntry {
    SinglePort(u16),
    PortRange { min: u16, max: u16 },
}

impl ExitPolicyEntry {
    pub fn contains(&self, port: u16) -> bool {
        match *self {
            ExitPolicyEntry::SinglePort(x) => x == port,
            ExitPolicyEntry::PortRange { min, max } => min <= port && port <= max,
        }
    }
}

impl FromStr for ExitPolicyEntry {
    type Err = FieldError;

    /// Parse from "3" or "2-5".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((min, max)) => {
                let (min, max) = (validate::port(min)?, validate::port(max)?);
                if min > max {
                    return Err(FieldError::new(format!("empty port range '{}'", s)));
                }
                Ok(ExitPolicyEntry::PortRange { min, max })
            }
            None => Ok(ExitPolicyEntry::SinglePort(validate::port(s)?)),
        }
    }
}

impl fmt::Display for ExitPolicyEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExitPolicyEntry::SinglePort(x) => write!(f, "{}", x),
            ExitPolicyEntry::PortRange { min: x, max: y } => write!(f, "{}-{}", x, y),
        }
    }
}

/// A relay's condensed exit policy (ports for "most" target IP addresses)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondensedExitPolicy {
    pub policy_type: ExitPolicyType,
    pub entries: Vec<ExitPolicyEntry>,
}

impl CondensedExitPolicy {
    /// Whether the listed ports are accepted by this summary
    pub fn allows_port(&self, port: u16) -> bool {
        let listed = self.entries.iter().any(|entry| entry.contains(port));
        match self.policy_type {
            ExitPolicyType::Accept => listed,
            ExitPolicyType::Reject => !listed,
        }
    }
}

impl FromStr for CondensedExitPolicy {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cmd, ports) = s
            .split_once(validate::is_ws)
            .ok_or_else(|| FieldError::new(format!("malformed exit policy '{}'", s)))?;
        let policy_type = cmd.parse::<ExitPolicyType>().map_err(|e| FieldError::new(e))?;
        let entries = validate::comma_list(ports.trim())?
            .into_iter()
            .map(|x| x.parse::<ExitPolicyEntry>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CondensedExitPolicy {
            policy_type,
            entries,
        })
    }
}

impl fmt::Display for CondensedExitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}",
            match self.policy_type {
                ExitPolicyType::Accept => "accept",
                ExitPolicyType::Reject => "reject",
            },
            self.entries
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(",")
        )
    }
}

/// A parsed consensus document ("network status"), of either flavor.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub annotations: Vec<String>,
    /// [`Flavor::Ns`] or [`Flavor::Microdesc`]
    pub flavor: Flavor,
    pub consensus_method: u32,
    pub valid_after: DateTime<Utc>,
    pub fresh_until: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub vote_seconds: u64,
    pub dist_seconds: u64,
    pub client_versions: Vec<String>,
    pub server_versions: Vec<String>,
    pub packages: Vec<String>,
    pub known_flags: BTreeSet<String>,
    pub recommended_client_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub recommended_relay_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub required_client_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub required_relay_protocols: BTreeMap<String, SupportedProtocolVersion>,
    /// `params`; empty if the line is absent or lists nothing
    pub params: BTreeMap<String, i32>,
    pub shared_rand_previous_value: Option<SharedRandValue>,
    pub shared_rand_current_value: Option<SharedRandValue>,
    pub dir_sources: Vec<DirSourceEntry>,
    /// Status entries keyed by relay identity
    pub relays: BTreeMap<Fingerprint, NetworkStatusEntry>,
    pub directory_footer: bool,
    pub weights: Option<BTreeMap<String, i32>>,
    pub signatures: Vec<DirectorySignature>,
    pub unrecognized_lines: Vec<String>,
}

impl Consensus {
    /// Parse a consensus document of either flavor from raw bytes.
    pub fn from_bytes(raw: &[u8], options: &ParseOptions) -> Result<Consensus, DocumentParseError> {
        let doc = Document::parse(raw)?;
        Self::from_doc(&doc, options)
    }

    /// Parse a consensus document from an already-parsed Tor meta document
    pub(crate) fn from_doc(
        doc: &Document<'_>,
        options: &ParseOptions,
    ) -> Result<Consensus, DocumentParseError> {
        let status = network_status::parse(doc, options, &[Flavor::Ns, Flavor::Microdesc])?;
        let header: Header = status.header;
        let (vote_seconds, dist_seconds) = Header::required(header.voting_delay, Kw::VotingDelay)?;

        Ok(Consensus {
            annotations: status.annotations,
            flavor: status.flavor,
            consensus_method: Header::required(header.consensus_method, Kw::ConsensusMethod)?,
            valid_after: Header::required(header.valid_after, Kw::ValidAfter)?,
            fresh_until: Header::required(header.fresh_until, Kw::FreshUntil)?,
            valid_until: Header::required(header.valid_until, Kw::ValidUntil)?,
            vote_seconds,
            dist_seconds,
            client_versions: header.client_versions,
            server_versions: header.server_versions,
            packages: header.packages,
            known_flags: header.known_flags,
            recommended_client_protocols: header.recommended_client_protocols,
            recommended_relay_protocols: header.recommended_relay_protocols,
            required_client_protocols: header.required_client_protocols,
            required_relay_protocols: header.required_relay_protocols,
            params: header.params,
            shared_rand_previous_value: header.shared_rand_previous_value,
            shared_rand_current_value: header.shared_rand_current_value,
            dir_sources: status.authorities,
            relays: status.entries,
            directory_footer: status.directory_footer,
            weights: status.bandwidth_weights,
            signatures: status.signatures,
            unrecognized_lines: status.unrecognized_lines,
        })
    }
}

impl FromStr for Consensus {
    type Err = DocumentParseError;

    /// Parse with default (lenient) options
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes(), &ParseOptions::default())
    }
}
