//! Tor network-status votes
//!
//! A vote shares the grammar of a consensus, but is published by a single
//! authority: it carries that authority's `dir-source` line, its key
//! certificate and per-relay lines (`id`, repeated `m`) a consensus lacks.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::consensus::SupportedProtocolVersion;
use crate::error::DocumentParseError;
use crate::grammar::Keyword;
use crate::meta::{Document, Fingerprint};
use crate::network_status::{
    self, DirSourceEntry, DirectorySignature, Flavor, Header, KeyCertificate, Kw,
    NetworkStatusEntry, SharedRandCommit, SharedRandValue,
};
use crate::options::ParseOptions;

//
// External dependencies
//
use chrono::{DateTime, Utc};

/// A parsed vote document
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    pub annotations: Vec<String>,
    pub consensus_methods: Vec<u32>,
    pub published: DateTime<Utc>,
    pub valid_after: DateTime<Utc>,
    pub fresh_until: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub vote_seconds: u64,
    pub dist_seconds: u64,
    pub client_versions: Vec<String>,
    pub server_versions: Vec<String>,
    pub packages: Vec<String>,
    pub known_flags: BTreeSet<String>,
    /// `flag-thresholds`; percentages are stored without their `%` sign
    pub flag_thresholds: BTreeMap<String, f64>,
    pub recommended_client_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub recommended_relay_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub required_client_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub required_relay_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub params: BTreeMap<String, i32>,
    pub bandwidth_file_headers: BTreeMap<String, String>,
    pub bandwidth_file_digests: BTreeMap<String, String>,
    /// The voting authority
    pub authority: DirSourceEntry,
    pub shared_rand_participate: bool,
    pub shared_rand_commits: Vec<SharedRandCommit>,
    pub shared_rand_previous_value: Option<SharedRandValue>,
    pub shared_rand_current_value: Option<SharedRandValue>,
    pub key_certificate: KeyCertificate,
    pub entries: BTreeMap<Fingerprint, NetworkStatusEntry>,
    pub directory_footer: bool,
    pub signatures: Vec<DirectorySignature>,
    pub unrecognized_lines: Vec<String>,
}

impl Vote {
    pub fn from_bytes(raw: &[u8], options: &ParseOptions) -> Result<Vote, DocumentParseError> {
        let doc = Document::parse(raw)?;
        Self::from_doc(&doc, options)
    }

    pub(crate) fn from_doc(
        doc: &Document<'_>,
        options: &ParseOptions,
    ) -> Result<Vote, DocumentParseError> {
        let mut status = network_status::parse(doc, options, &[Flavor::Vote])?;
        let header: Header = status.header;
        let (vote_seconds, dist_seconds) = Header::required(header.voting_delay, Kw::VotingDelay)?;
        // exactly one dir-source is enforced by the grammar
        let authority = status
            .authorities
            .pop()
            .ok_or_else(|| DocumentParseError::missing(Kw::DirSource.name()))?;
        let key_certificate = status
            .key_certificate
            .ok_or_else(|| DocumentParseError::missing(Kw::DirKeyCertification.name()))?;

        Ok(Vote {
            annotations: status.annotations,
            consensus_methods: header.consensus_methods,
            published: Header::required(header.published, Kw::Published)?,
            valid_after: Header::required(header.valid_after, Kw::ValidAfter)?,
            fresh_until: Header::required(header.fresh_until, Kw::FreshUntil)?,
            valid_until: Header::required(header.valid_until, Kw::ValidUntil)?,
            vote_seconds,
            dist_seconds,
            client_versions: header.client_versions,
            server_versions: header.server_versions,
            packages: header.packages,
            known_flags: header.known_flags,
            flag_thresholds: header.flag_thresholds,
            recommended_client_protocols: header.recommended_client_protocols,
            recommended_relay_protocols: header.recommended_relay_protocols,
            required_client_protocols: header.required_client_protocols,
            required_relay_protocols: header.required_relay_protocols,
            params: header.params,
            bandwidth_file_headers: header.bandwidth_file_headers,
            bandwidth_file_digests: header.bandwidth_file_digests,
            authority,
            shared_rand_participate: header.shared_rand_participate,
            shared_rand_commits: header.shared_rand_commits,
            shared_rand_previous_value: header.shared_rand_previous_value,
            shared_rand_current_value: header.shared_rand_current_value,
            key_certificate,
            entries: status.entries,
            directory_footer: status.directory_footer,
            signatures: status.signatures,
            unrecognized_lines: status.unrecognized_lines,
        })
    }
}

impl FromStr for Vote {
    type Err = DocumentParseError;

    /// Parse with default (lenient) options
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes(), &ParseOptions::default())
    }
}
