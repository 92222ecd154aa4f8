//! The network-status grammar shared by consensuses and votes.
//!
//! A network-status document consists of five sections: a header, the
//! authority section (`dir-source` groups, and the key certificate in a
//! vote), the router status entries (`r` groups), a footer and the
//! signatures. [`Flavor`] selects which keywords are legal and which are
//! mandatory.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::consensus::SupportedProtocolVersion;
use crate::descriptor::parse_proto;
use crate::error::{DocumentParseError, ErrorContext};
use crate::grammar::{self, Diagnostics, Keyword, KeywordSet, Occurrence, Sections};
use crate::meta::{Document, Fingerprint, Item};
use crate::options::ParseOptions;
use crate::validate;

mod entry;
pub use entry::NetworkStatusEntry;
use entry::EntryGroup;

//
// External dependencies
//
use chrono::{DateTime, Utc};
use log::debug;
use strum::{EnumString, IntoStaticStr};

/// The kind of network-status document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// A full consensus (`network-status-version 3`)
    Ns,
    /// A microdescriptor consensus (`network-status-version 3 microdesc`)
    Microdesc,
    /// A single authority's vote
    Vote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Header,
    Authorities,
    Entries,
    Footer,
    Signatures,
}

/// Which group of lines a keyword's cardinality refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Document,
    Authority,
    Entry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum Kw {
    NetworkStatusVersion,
    VoteStatus,
    ConsensusMethods,
    ConsensusMethod,
    Published,
    ValidAfter,
    FreshUntil,
    ValidUntil,
    VotingDelay,
    ClientVersions,
    ServerVersions,
    Package,
    KnownFlags,
    FlagThresholds,
    RecommendedClientProtocols,
    RecommendedRelayProtocols,
    RequiredClientProtocols,
    RequiredRelayProtocols,
    Params,
    SharedRandParticipate,
    SharedRandCommit,
    SharedRandPreviousValue,
    SharedRandCurrentValue,
    BandwidthFileHeaders,
    BandwidthFileDigest,
    DirSource,
    Contact,
    VoteDigest,
    DirKeyCertificateVersion,
    DirAddress,
    Fingerprint,
    LegacyDirKey,
    DirKeyPublished,
    DirKeyExpires,
    DirIdentityKey,
    DirSigningKey,
    DirKeyCrosscert,
    DirKeyCertification,
    R,
    A,
    S,
    V,
    Pr,
    W,
    P,
    M,
    Id,
    DirectoryFooter,
    BandwidthWeights,
    DirectorySignature,
}

impl Keyword for Kw {
    fn bit(self) -> u32 {
        self as u32
    }
}

impl Kw {
    /// Section and cardinality of a keyword, or `None` if it is not part of
    /// the flavor's grammar
    fn rule(self, flavor: Flavor) -> Option<(Section, Occurrence)> {
        use Occurrence::*;
        let vote = flavor == Flavor::Vote;
        let rule = match self {
            Kw::NetworkStatusVersion
            | Kw::VoteStatus
            | Kw::ValidAfter
            | Kw::FreshUntil
            | Kw::ValidUntil
            | Kw::VotingDelay
            | Kw::KnownFlags => (Section::Header, ExactlyOnce),
            Kw::ConsensusMethod if !vote => (Section::Header, ExactlyOnce),
            Kw::ConsensusMethods | Kw::Published if vote => (Section::Header, ExactlyOnce),
            Kw::FlagThresholds | Kw::BandwidthFileHeaders | Kw::BandwidthFileDigest if vote => {
                (Section::Header, AtMostOnce)
            }
            Kw::ClientVersions
            | Kw::ServerVersions
            | Kw::RecommendedClientProtocols
            | Kw::RecommendedRelayProtocols
            | Kw::RequiredClientProtocols
            | Kw::RequiredRelayProtocols
            | Kw::Params => (Section::Header, AtMostOnce),
            Kw::Package => (Section::Header, AnyNumber),
            Kw::SharedRandPreviousValue | Kw::SharedRandCurrentValue if vote => {
                (Section::Authorities, AtMostOnce)
            }
            Kw::SharedRandPreviousValue | Kw::SharedRandCurrentValue => {
                (Section::Header, AtMostOnce)
            }
            Kw::SharedRandParticipate if vote => (Section::Authorities, AtMostOnce),
            Kw::SharedRandCommit if vote => (Section::Authorities, AnyNumber),
            Kw::DirSource if vote => (Section::Authorities, ExactlyOnce),
            Kw::DirSource => (Section::Authorities, AnyNumber),
            Kw::Contact => (Section::Authorities, AtMostOnce),
            Kw::VoteDigest if !vote => (Section::Authorities, AtMostOnce),
            Kw::DirKeyCertificateVersion
            | Kw::Fingerprint
            | Kw::DirKeyPublished
            | Kw::DirKeyExpires
            | Kw::DirIdentityKey
            | Kw::DirSigningKey
            | Kw::DirKeyCertification
                if vote =>
            {
                (Section::Authorities, ExactlyOnce)
            }
            Kw::DirAddress | Kw::LegacyDirKey | Kw::DirKeyCrosscert if vote => {
                (Section::Authorities, AtMostOnce)
            }
            Kw::R | Kw::A => (Section::Entries, AnyNumber),
            Kw::S => (Section::Entries, ExactlyOnce),
            Kw::V | Kw::Pr | Kw::W | Kw::P => (Section::Entries, AtMostOnce),
            Kw::M if vote => (Section::Entries, AnyNumber),
            Kw::M if flavor == Flavor::Microdesc => (Section::Entries, ExactlyOnce),
            Kw::Id if vote => (Section::Entries, AtMostOnce),
            Kw::DirectoryFooter => (Section::Footer, AtMostOnce),
            Kw::BandwidthWeights if !vote => (Section::Footer, AtMostOnce),
            Kw::DirectorySignature => (Section::Signatures, AnyNumber),
            _ => return None,
        };
        Some(rule)
    }

    fn scope(self) -> Scope {
        match self {
            Kw::Contact | Kw::VoteDigest => Scope::Authority,
            Kw::A | Kw::S | Kw::V | Kw::Pr | Kw::W | Kw::P | Kw::M | Kw::Id => Scope::Entry,
            _ => Scope::Document,
        }
    }

    fn has_object(self) -> bool {
        matches!(
            self,
            Kw::DirIdentityKey
                | Kw::DirSigningKey
                | Kw::DirKeyCrosscert
                | Kw::DirKeyCertification
                | Kw::DirectorySignature
        )
    }

    fn mandatory(flavor: Flavor) -> &'static [Kw] {
        match flavor {
            Flavor::Vote => &[
                Kw::NetworkStatusVersion,
                Kw::VoteStatus,
                Kw::ConsensusMethods,
                Kw::Published,
                Kw::ValidAfter,
                Kw::FreshUntil,
                Kw::ValidUntil,
                Kw::VotingDelay,
                Kw::KnownFlags,
                Kw::DirSource,
                Kw::DirKeyCertificateVersion,
                Kw::Fingerprint,
                Kw::DirKeyPublished,
                Kw::DirKeyExpires,
                Kw::DirIdentityKey,
                Kw::DirSigningKey,
                Kw::DirKeyCertification,
                Kw::DirectorySignature,
            ],
            Flavor::Ns | Flavor::Microdesc => &[
                Kw::NetworkStatusVersion,
                Kw::VoteStatus,
                Kw::ConsensusMethod,
                Kw::ValidAfter,
                Kw::FreshUntil,
                Kw::ValidUntil,
                Kw::VotingDelay,
                Kw::KnownFlags,
                Kw::DirectorySignature,
            ],
        }
    }
}

/// A directory authority as listed in a `dir-source` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSourceEntry {
    pub nickname: String,
    pub identity: Fingerprint,
    pub hostname: String,
    pub address: Ipv4Addr,
    pub dir_port: u16,
    pub or_port: u16,
    pub contact: Option<String>,
    /// Digest of the authority's vote; only in consensuses, and absent for
    /// legacy entries
    pub vote_digest: Option<Fingerprint>,
    /// Entry for a legacy identity key (nickname ends with `-legacy`)
    pub is_legacy: bool,
}

/// A `directory-signature` with its opaque signature block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySignature {
    /// Digest algorithm, absent for the implicit `sha1`
    pub algorithm: Option<String>,
    pub identity: Fingerprint,
    pub signing_key_digest: Fingerprint,
    /// The signature block, BEGIN and END markers included
    pub signature: Vec<u8>,
}

/// `shared-rand-previous-value` / `shared-rand-current-value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedRandValue {
    pub num_reveals: u32,
    pub value: String,
}

/// `shared-rand-commit Version AlgName Identity Commit [Reveal]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedRandCommit {
    pub version: u32,
    pub algorithm: String,
    pub identity: Fingerprint,
    pub commit: String,
    pub reveal: Option<String>,
}

/// The authority key certificate embedded in a vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCertificate {
    pub version: u32,
    pub address: Option<(Ipv4Addr, u16)>,
    pub fingerprint: Fingerprint,
    pub legacy_dir_key: Option<Fingerprint>,
    pub published: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub identity_key: Vec<u8>,
    pub signing_key: Vec<u8>,
    pub crosscert: Option<Vec<u8>>,
    pub certification: Vec<u8>,
}

/// Header fields of either flavor
#[derive(Debug, Default)]
pub(crate) struct Header {
    pub vote_status: String,
    pub consensus_methods: Vec<u32>,
    pub consensus_method: Option<u32>,
    pub published: Option<DateTime<Utc>>,
    pub valid_after: Option<DateTime<Utc>>,
    pub fresh_until: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub voting_delay: Option<(u64, u64)>,
    pub client_versions: Vec<String>,
    pub server_versions: Vec<String>,
    pub packages: Vec<String>,
    pub known_flags: BTreeSet<String>,
    pub flag_thresholds: BTreeMap<String, f64>,
    pub recommended_client_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub recommended_relay_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub required_client_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub required_relay_protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub params: BTreeMap<String, i32>,
    pub shared_rand_participate: bool,
    pub shared_rand_commits: Vec<SharedRandCommit>,
    pub shared_rand_previous_value: Option<SharedRandValue>,
    pub shared_rand_current_value: Option<SharedRandValue>,
    pub bandwidth_file_headers: BTreeMap<String, String>,
    pub bandwidth_file_digests: BTreeMap<String, String>,
}

impl Header {
    /// A mandatory value, present whenever the keyword was seen
    pub fn required<T: Copy>(value: Option<T>, kw: Kw) -> Result<T, DocumentParseError> {
        value.ok_or_else(|| DocumentParseError::missing(kw.name()))
    }
}

#[derive(Debug, Default)]
struct KeyCertificateParts {
    version: Option<u32>,
    address: Option<(Ipv4Addr, u16)>,
    fingerprint: Option<Fingerprint>,
    legacy_dir_key: Option<Fingerprint>,
    published: Option<DateTime<Utc>>,
    expires: Option<DateTime<Utc>>,
    identity_key: Option<Vec<u8>>,
    signing_key: Option<Vec<u8>>,
    crosscert: Option<Vec<u8>>,
    certification: Option<Vec<u8>>,
}

impl KeyCertificateParts {
    fn build(self) -> Option<KeyCertificate> {
        Some(KeyCertificate {
            version: self.version?,
            address: self.address,
            fingerprint: self.fingerprint?,
            legacy_dir_key: self.legacy_dir_key,
            published: self.published?,
            expires: self.expires?,
            identity_key: self.identity_key?,
            signing_key: self.signing_key?,
            crosscert: self.crosscert,
            certification: self.certification?,
        })
    }
}

/// An open `dir-source` group
struct AuthorityGroup {
    entry: DirSourceEntry,
    line: usize,
    seen: KeywordSet,
}

/// A fully parsed network-status document of either flavor
#[derive(Debug)]
pub(crate) struct NetworkStatus {
    pub flavor: Flavor,
    pub annotations: Vec<String>,
    pub header: Header,
    pub authorities: Vec<DirSourceEntry>,
    pub key_certificate: Option<KeyCertificate>,
    pub entries: BTreeMap<Fingerprint, NetworkStatusEntry>,
    pub directory_footer: bool,
    pub bandwidth_weights: Option<BTreeMap<String, i32>>,
    pub signatures: Vec<DirectorySignature>,
    pub unrecognized_lines: Vec<String>,
}

/// Determine the flavor from the `network-status-version` and `vote-status` lines
fn detect_flavor(doc: &Document<'_>) -> Result<Flavor, DocumentParseError> {
    grammar::expect_first(&doc.items, Kw::NetworkStatusVersion)?;
    let version_item = &doc.items[0];
    let microdesc = match version_item.args()[..] {
        ["3"] => false,
        ["3", "microdesc"] => true,
        _ => {
            return Err(DocumentParseError::invalid(
                version_item,
                "unsupported network-status version",
            ))
        }
    };
    let status_item = doc
        .items
        .iter()
        .find(|item| item.keyword == Kw::VoteStatus.name())
        .ok_or_else(|| DocumentParseError::missing(Kw::VoteStatus.name()))?;
    match (status_item.args_exact(1)?[0], microdesc) {
        ("consensus", false) => Ok(Flavor::Ns),
        ("consensus", true) => Ok(Flavor::Microdesc),
        ("vote", false) => Ok(Flavor::Vote),
        ("vote", true) => Err(DocumentParseError::invalid(
            status_item,
            "votes have no microdesc flavor",
        )),
        (other, _) => Err(DocumentParseError::invalid(
            status_item,
            format!("unknown vote-status '{}'", other),
        )),
    }
}

/// Parse a consensus or a vote, requiring one of the `accepted` flavors
pub(crate) fn parse(
    doc: &Document<'_>,
    options: &ParseOptions,
    accepted: &[Flavor],
) -> Result<NetworkStatus, DocumentParseError> {
    let flavor = detect_flavor(doc)?;
    if !accepted.contains(&flavor) {
        return Err(DocumentParseError::document(format!(
            "expected {:?} network status, found {:?}",
            accepted, flavor
        )));
    }
    let mut parser = Parser::new(flavor, options);
    for item in doc.items.iter() {
        parser.item(item)?;
    }
    let mut status = parser.finish()?;
    status.annotations = doc.annotations();
    debug!(
        "parsed {:?} network status with {} entries",
        status.flavor,
        status.entries.len()
    );
    Ok(status)
}

/// The section state machine of a network-status document
struct Parser {
    flavor: Flavor,
    diagnostics: Diagnostics,
    sections: Sections<Section>,
    seen: KeywordSet,
    header: Header,
    authority: Option<AuthorityGroup>,
    authorities: Vec<DirSourceEntry>,
    key_certificate: KeyCertificateParts,
    entry: Option<EntryGroup>,
    entries: BTreeMap<Fingerprint, NetworkStatusEntry>,
    directory_footer: bool,
    bandwidth_weights: Option<BTreeMap<String, i32>>,
    signatures: Vec<DirectorySignature>,
}

impl Parser {
    fn new(flavor: Flavor, options: &ParseOptions) -> Self {
        Parser {
            flavor,
            diagnostics: Diagnostics::new(options),
            sections: Sections::new(Section::Header),
            seen: KeywordSet::default(),
            header: Header::default(),
            authority: None,
            authorities: Vec::new(),
            key_certificate: KeyCertificateParts::default(),
            entry: None,
            entries: BTreeMap::new(),
            directory_footer: false,
            bandwidth_weights: None,
            signatures: Vec::new(),
        }
    }

    fn item(&mut self, item: &Item<'_>) -> Result<(), DocumentParseError> {
        let (kw, (section, occurrence)) = match Kw::from_str(item.keyword)
            .ok()
            .and_then(|kw| kw.rule(self.flavor).map(|rule| (kw, rule)))
        {
            Some(found) => found,
            None => return self.diagnostics.unrecognized(item),
        };

        if let Some(left) = self.sections.advance(section, item)? {
            self.leave(left)?;
        }
        item.expect_object(kw.has_object())?;

        match kw.scope() {
            Scope::Document => self.seen.record(kw, occurrence, item)?,
            Scope::Authority => {
                let group = self
                    .authority
                    .as_mut()
                    .ok_or_else(|| DocumentParseError::unexpected(item))?;
                group.seen.record(kw, occurrence, item)?;
                self.seen.insert(kw);
            }
            Scope::Entry => {
                let group = self
                    .entry
                    .as_mut()
                    .ok_or_else(|| DocumentParseError::unexpected(item))?;
                group.seen.record(kw, occurrence, item)?;
                self.seen.insert(kw);
            }
        }

        match section {
            Section::Header => self.header_item(kw, item),
            Section::Authorities => self.authority_item(kw, item),
            Section::Entries => self.entry_item(kw, item),
            Section::Footer => self.footer_item(kw, item),
            Section::Signatures => {
                self.signatures.push(parse_signature(item)?);
                Ok(())
            }
        }
    }

    /// Close the open group of the section that was left
    fn leave(&mut self, left: Section) -> Result<(), DocumentParseError> {
        match left {
            Section::Authorities => self.close_authority(),
            Section::Entries => self.close_entry(),
            _ => Ok(()),
        }
    }

    fn close_authority(&mut self) -> Result<(), DocumentParseError> {
        if let Some(group) = self.authority.take() {
            if self.flavor != Flavor::Vote
                && !group.entry.is_legacy
                && group.entry.vote_digest.is_none()
            {
                return Err(DocumentParseError::InvalidItem {
                    line: group.line,
                    keyword: Kw::DirSource.name().to_string(),
                    reason: "dir-source without vote-digest".to_string(),
                });
            }
            self.authorities.push(group.entry);
        }
        Ok(())
    }

    fn close_entry(&mut self) -> Result<(), DocumentParseError> {
        if let Some(group) = self.entry.take() {
            let line = group.line;
            let entry = group.finish(self.flavor)?;
            if self.entries.contains_key(&entry.fingerprint) {
                return Err(DocumentParseError::InvalidItem {
                    line,
                    keyword: Kw::R.name().to_string(),
                    reason: format!("duplicate fingerprint {}", entry.fingerprint),
                });
            }
            self.entries.insert(entry.fingerprint, entry);
        }
        Ok(())
    }

    fn header_item(&mut self, kw: Kw, item: &Item<'_>) -> Result<(), DocumentParseError> {
        let header = &mut self.header;
        match kw {
            // validated in detect_flavor
            Kw::NetworkStatusVersion => {}
            Kw::VoteStatus => header.vote_status = item.args_exact(1)?[0].to_string(),
            Kw::ConsensusMethods => {
                header.consensus_methods = item
                    .args()
                    .into_iter()
                    .map(validate::uint32)
                    .collect::<Result<Vec<_>, _>>()
                    .context(item)?;
                if header.consensus_methods.is_empty() {
                    return Err(DocumentParseError::args_missing(item));
                }
            }
            Kw::ConsensusMethod => {
                header.consensus_method =
                    Some(validate::uint32(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::Published => header.published = Some(timestamp(item)?),
            Kw::ValidAfter => header.valid_after = Some(timestamp(item)?),
            Kw::FreshUntil => header.fresh_until = Some(timestamp(item)?),
            Kw::ValidUntil => header.valid_until = Some(timestamp(item)?),
            Kw::VotingDelay => {
                let args = item.args_exact(2)?;
                header.voting_delay = Some((
                    validate::uint(args[0]).context(item)?,
                    validate::uint(args[1]).context(item)?,
                ));
            }
            Kw::ClientVersions => header.client_versions = versions(item)?,
            Kw::ServerVersions => header.server_versions = versions(item)?,
            Kw::Package => {
                // package name version url digesttype=digest...
                if item.args().len() < 4 {
                    return Err(DocumentParseError::args_missing(item));
                }
                header.packages.push(item.get_argument()?.to_string());
            }
            Kw::KnownFlags => {
                header.known_flags = item.args().into_iter().map(String::from).collect()
            }
            Kw::FlagThresholds => {
                for token in item.args() {
                    let (key, value) = validate::split_pair(token).context(item)?;
                    let value = match value.strip_suffix('%') {
                        Some(_) => validate::percentage(value),
                        None => validate::decimal(value),
                    }
                    .context(item)?;
                    header.flag_thresholds.insert(key.to_string(), value);
                }
            }
            Kw::RecommendedClientProtocols => {
                header.recommended_client_protocols = parse_proto(item)?
            }
            Kw::RecommendedRelayProtocols => header.recommended_relay_protocols = parse_proto(item)?,
            Kw::RequiredClientProtocols => header.required_client_protocols = parse_proto(item)?,
            Kw::RequiredRelayProtocols => header.required_relay_protocols = parse_proto(item)?,
            Kw::Params => header.params = validate::int32_params(item.args()).context(item)?,
            Kw::SharedRandPreviousValue => {
                header.shared_rand_previous_value = Some(shared_rand_value(item)?)
            }
            Kw::SharedRandCurrentValue => {
                header.shared_rand_current_value = Some(shared_rand_value(item)?)
            }
            Kw::BandwidthFileHeaders => {
                header.bandwidth_file_headers = string_pairs(item)?;
            }
            Kw::BandwidthFileDigest => {
                header.bandwidth_file_digests = string_pairs(item)?;
                if header.bandwidth_file_digests.is_empty() {
                    return Err(DocumentParseError::args_missing(item));
                }
            }
            _ => return Err(DocumentParseError::unexpected(item)),
        }
        Ok(())
    }

    fn authority_item(&mut self, kw: Kw, item: &Item<'_>) -> Result<(), DocumentParseError> {
        match kw {
            Kw::DirSource => {
                self.close_authority()?;
                self.authority = Some(AuthorityGroup {
                    entry: parse_dir_source(item)?,
                    line: item.line_no,
                    seen: KeywordSet::default(),
                });
            }
            Kw::Contact => {
                if let Some(group) = self.authority.as_mut() {
                    group.entry.contact = Some(item.argument_or_empty().to_string());
                }
            }
            Kw::VoteDigest => {
                let digest = Fingerprint::from_str_hex(item.args_exact(1)?[0]).context(item)?;
                if let Some(group) = self.authority.as_mut() {
                    group.entry.vote_digest = Some(digest);
                }
            }
            Kw::SharedRandParticipate => {
                item.no_arguments()?;
                self.header.shared_rand_participate = true;
            }
            Kw::SharedRandCommit => self.header.shared_rand_commits.push(shared_rand_commit(item)?),
            Kw::SharedRandPreviousValue => {
                self.header.shared_rand_previous_value = Some(shared_rand_value(item)?)
            }
            Kw::SharedRandCurrentValue => {
                self.header.shared_rand_current_value = Some(shared_rand_value(item)?)
            }
            Kw::DirKeyCertificateVersion => {
                self.key_certificate.version = Some(validate::uint32(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::DirAddress => {
                let arg = item.args_exact(1)?[0];
                let (ip, port) = arg
                    .split_once(':')
                    .ok_or_else(|| DocumentParseError::invalid(item, "missing port"))?;
                self.key_certificate.address = Some((
                    validate::ipv4(ip).context(item)?,
                    validate::port(port).context(item)?,
                ));
            }
            Kw::Fingerprint => {
                self.key_certificate.fingerprint =
                    Some(Fingerprint::from_str_hex(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::LegacyDirKey => {
                self.key_certificate.legacy_dir_key =
                    Some(Fingerprint::from_str_hex(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::DirKeyPublished => self.key_certificate.published = Some(timestamp(item)?),
            Kw::DirKeyExpires => self.key_certificate.expires = Some(timestamp(item)?),
            Kw::DirIdentityKey => self.key_certificate.identity_key = Some(object_only(item)?),
            Kw::DirSigningKey => self.key_certificate.signing_key = Some(object_only(item)?),
            Kw::DirKeyCrosscert => self.key_certificate.crosscert = Some(object_only(item)?),
            Kw::DirKeyCertification => self.key_certificate.certification = Some(object_only(item)?),
            _ => return Err(DocumentParseError::unexpected(item)),
        }
        Ok(())
    }

    fn entry_item(&mut self, kw: Kw, item: &Item<'_>) -> Result<(), DocumentParseError> {
        if kw == Kw::R {
            self.close_entry()?;
            self.entry = Some(EntryGroup::start(item, self.flavor)?);
            return Ok(());
        }
        match self.entry.as_mut() {
            Some(group) => group.add(kw, item, self.flavor),
            None => Err(DocumentParseError::unexpected(item)),
        }
    }

    fn footer_item(&mut self, kw: Kw, item: &Item<'_>) -> Result<(), DocumentParseError> {
        match kw {
            Kw::DirectoryFooter => {
                item.no_arguments()?;
                self.directory_footer = true;
            }
            Kw::BandwidthWeights => {
                self.bandwidth_weights = Some(validate::int32_params(item.args()).context(item)?)
            }
            _ => return Err(DocumentParseError::unexpected(item)),
        }
        Ok(())
    }

    fn finish(mut self) -> Result<NetworkStatus, DocumentParseError> {
        self.close_authority()?;
        self.close_entry()?;
        self.seen.require(Kw::mandatory(self.flavor))?;

        let key_certificate = match self.flavor {
            Flavor::Vote => Some(
                self.key_certificate
                    .build()
                    .ok_or_else(|| DocumentParseError::missing(Kw::DirKeyCertification.name()))?,
            ),
            Flavor::Ns | Flavor::Microdesc => None,
        };

        Ok(NetworkStatus {
            flavor: self.flavor,
            annotations: Vec::new(),
            header: self.header,
            authorities: self.authorities,
            key_certificate,
            entries: self.entries,
            directory_footer: self.directory_footer,
            bandwidth_weights: self.bandwidth_weights,
            signatures: self.signatures,
            unrecognized_lines: self.diagnostics.into_lines(),
        })
    }
}

fn timestamp(item: &Item<'_>) -> Result<DateTime<Utc>, DocumentParseError> {
    validate::timestamp(item.get_argument()?).context(item)
}

fn object_only(item: &Item<'_>) -> Result<Vec<u8>, DocumentParseError> {
    item.no_arguments()?;
    item.object_bytes()
}

/// Comma-separated version list, possibly empty
fn versions(item: &Item<'_>) -> Result<Vec<String>, DocumentParseError> {
    match item.arguments {
        None => Ok(Vec::new()),
        Some(list) => Ok(validate::comma_list(list)
            .context(item)?
            .into_iter()
            .map(String::from)
            .collect()),
    }
}

/// Space-separated `key=value` tokens with arbitrary values
fn string_pairs(item: &Item<'_>) -> Result<BTreeMap<String, String>, DocumentParseError> {
    let mut pairs = BTreeMap::new();
    for token in item.args() {
        let (key, value) = token
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| DocumentParseError::invalid(item, format!("'{}' is not key=value", token)))?;
        pairs.insert(key.to_string(), value.to_string());
    }
    Ok(pairs)
}

fn shared_rand_value(item: &Item<'_>) -> Result<SharedRandValue, DocumentParseError> {
    let args = item.args_exact(2)?;
    Ok(SharedRandValue {
        num_reveals: validate::uint32(args[0]).context(item)?,
        value: validate::base64_key(args[1]).context(item)?,
    })
}

fn shared_rand_commit(item: &Item<'_>) -> Result<SharedRandCommit, DocumentParseError> {
    let args = item.args();
    if !(4..=5).contains(&args.len()) {
        return Err(DocumentParseError::args_missing(item));
    }
    Ok(SharedRandCommit {
        version: validate::uint32(args[0]).context(item)?,
        algorithm: args[1].to_string(),
        identity: Fingerprint::from_str_hex(args[2]).context(item)?,
        commit: args[3].to_string(),
        reveal: args.get(4).map(|r| r.to_string()),
    })
}

/// `dir-source nickname identity hostname address DirPort ORPort`
fn parse_dir_source(item: &Item<'_>) -> Result<DirSourceEntry, DocumentParseError> {
    let args = item.args_exact(6)?;
    let (name, is_legacy) = match args[0].strip_suffix("-legacy") {
        Some(name) => (name, true),
        None => (args[0], false),
    };
    validate::nickname(name).context(item)?;
    Ok(DirSourceEntry {
        nickname: args[0].to_string(),
        identity: Fingerprint::from_str_hex(args[1]).context(item)?,
        hostname: args[2].to_string(),
        address: validate::ipv4(args[3]).context(item)?,
        dir_port: validate::port(args[4]).context(item)?,
        or_port: validate::port(args[5]).context(item)?,
        contact: None,
        vote_digest: None,
        is_legacy,
    })
}

/// `directory-signature [algorithm] identity signing-key-digest`
fn parse_signature(item: &Item<'_>) -> Result<DirectorySignature, DocumentParseError> {
    let args = item.args();
    let (algorithm, identity, signing_key) = match args[..] {
        [identity, signing_key] => (None, identity, signing_key),
        [algorithm, identity, signing_key] => (Some(algorithm.to_string()), identity, signing_key),
        _ => return Err(DocumentParseError::args_missing(item)),
    };
    Ok(DirectorySignature {
        algorithm,
        identity: Fingerprint::from_str_hex(identity).context(item)?,
        signing_key_digest: Fingerprint::from_str_hex(signing_key).context(item)?,
        signature: item.object_bytes()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNATURE: &str = "directory-signature 0232AF901C31A04EE9848595AF9BB7620D4C5B2E 6C3A2B1A2B04B20C0C5A4A7F6E9D9A3BA5E6C1D1\n-----BEGIN SIGNATURE-----\nAAAA\n-----END SIGNATURE-----\n";

    fn consensus_doc(entries: &str) -> String {
        format!(
            "network-status-version 3\n\
             vote-status consensus\n\
             consensus-method 28\n\
             valid-after 2019-06-01 00:00:00\n\
             fresh-until 2019-06-01 01:00:00\n\
             valid-until 2019-06-01 03:00:00\n\
             voting-delay 300 300\n\
             known-flags Exit Fast Guard Running Stable Valid\n\
             dir-source tor26 14C131DFC5C6F93646BE72FA1401C02A8DF2E8B4 86.59.21.38 86.59.21.38 80 443\n\
             contact Peter Palfrader\n\
             vote-digest 9EDB1B8A3F6DF6EF2F4AFDB0C0D5D7B6B5ECAF13\n\
             {}directory-footer\n\
             bandwidth-weights Wbd=0 Wee=10000\n\
             {}",
            entries, SIGNATURE
        )
    }

    fn parse_str(raw: &str) -> Result<NetworkStatus, DocumentParseError> {
        let doc = Document::parse(raw.as_bytes())?;
        parse(&doc, &ParseOptions::strict(), &[Flavor::Ns, Flavor::Microdesc])
    }

    #[test]
    fn sections_and_groups() {
        let status = parse_str(&consensus_doc(
            "r seele AAoQ1DAR6kkoo19hBAX5K0QztNw bOzQ0RNlBtVY9a6RHG3b0f6CX7g 2019-05-31 23:13:53 67.161.31.147 9001 0\ns Running Valid\n",
        ))
        .unwrap();
        assert_eq!(status.flavor, Flavor::Ns);
        assert_eq!(status.authorities.len(), 1);
        assert_eq!(status.authorities[0].contact.as_deref(), Some("Peter Palfrader"));
        assert_eq!(status.entries.len(), 1);
        assert!(status.directory_footer);
        assert_eq!(status.bandwidth_weights.unwrap()["Wee"], 10000);
        assert_eq!(status.signatures.len(), 1);
        assert_eq!(status.signatures[0].algorithm, None);
    }

    #[test]
    fn vote_digest_required_for_non_legacy_sources() {
        let raw = consensus_doc("").replace(
            "vote-digest 9EDB1B8A3F6DF6EF2F4AFDB0C0D5D7B6B5ECAF13\n",
            "",
        );
        assert!(parse_str(&raw).is_err());
    }

    #[test]
    fn legacy_dir_source() {
        let raw = consensus_doc("").replace(
            "vote-digest 9EDB1B8A3F6DF6EF2F4AFDB0C0D5D7B6B5ECAF13\n",
            "vote-digest 9EDB1B8A3F6DF6EF2F4AFDB0C0D5D7B6B5ECAF13\ndir-source dannenberg-legacy 0232AF901C31A04EE9848595AF9BB7620D4C5B2E dannenberg.torauth.de 193.23.244.244 80 443\n",
        );
        let status = parse_str(&raw).unwrap();
        assert_eq!(status.authorities.len(), 2);
        assert!(!status.authorities[0].is_legacy);
        assert!(status.authorities[1].is_legacy);
    }

    #[test]
    fn duplicate_contact_in_group() {
        let raw = consensus_doc("").replace("contact Peter Palfrader\n", "contact a\ncontact b\n");
        assert!(matches!(
            parse_str(&raw).unwrap_err(),
            DocumentParseError::DuplicateKeyword { .. }
        ));
    }

    #[test]
    fn entry_lines_need_an_r_line() {
        let raw = consensus_doc("s Running\n");
        assert!(matches!(
            parse_str(&raw).unwrap_err(),
            DocumentParseError::UnexpectedKeyword { .. }
        ));
    }

    #[test]
    fn no_body_lines_after_footer() {
        let raw = consensus_doc("").replace(
            "bandwidth-weights Wbd=0 Wee=10000\n",
            "bandwidth-weights Wbd=0 Wee=10000\nknown-flags Exit\n",
        );
        assert!(matches!(
            parse_str(&raw).unwrap_err(),
            DocumentParseError::UnexpectedKeyword { .. }
        ));
    }

    #[test]
    fn signature_with_algorithm() {
        let raw = consensus_doc("").replace(
            "directory-signature 0232",
            "directory-signature sha256 0232",
        );
        let status = parse_str(&raw).unwrap();
        assert_eq!(status.signatures[0].algorithm.as_deref(), Some("sha256"));
    }

    #[test]
    fn missing_signature() {
        let raw = consensus_doc("").replace(SIGNATURE, "");
        assert_eq!(
            parse_str(&raw).unwrap_err(),
            DocumentParseError::missing("directory-signature")
        );
    }

    #[test]
    fn votes_are_not_consensuses() {
        let raw = consensus_doc("").replace("vote-status consensus", "vote-status vote");
        assert!(matches!(
            parse_str(&raw).unwrap_err(),
            DocumentParseError::InvalidDocument { .. }
        ));
    }

    #[test]
    fn flavor_detection() {
        let raw = consensus_doc("").replace(
            "network-status-version 3\n",
            "network-status-version 3 microdesc\n",
        );
        assert_eq!(parse_str(&raw).unwrap().flavor, Flavor::Microdesc);
        let raw = consensus_doc("").replace(
            "network-status-version 3\n",
            "network-status-version 2\n",
        );
        assert!(parse_str(&raw).is_err());
    }
}
