//! Tor server descriptor documents

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::consensus::SupportedProtocolVersion;
use crate::error::{DocumentParseError, ErrorContext};
use crate::grammar::{self, Diagnostics, Keyword, KeywordSet, Occurrence, Sections};
use crate::history::BandwidthHistory;
use crate::meta::{Document, Fingerprint, Item};
use crate::options::ParseOptions;
use crate::split;
use crate::validate;

mod exit;
pub use exit::{
    DescriptorExitPolicy, DescriptorExitPolicyIPv6, DescriptorExitPolicyRule, ExitPolicyAddress,
    ExitPolicyPort, ExitPolicyType, ExitPortRange,
};

//
// External dependencies
//
use chrono::{DateTime, Utc};
use log::debug;
use sha1::{Digest, Sha1};
use strum::{EnumString, IntoStaticStr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FamilyMember {
    Fingerprint(Fingerprint),
    Nickname(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrAddress {
    pub ip: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Header,
    Body,
    Signature,
    /// Nothing recognized may follow `router-signature`
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
enum Kw {
    Router,
    #[strum(serialize = "identity-ed25519")]
    IdentityEd25519,
    #[strum(serialize = "master-key-ed25519")]
    MasterKeyEd25519,
    Bandwidth,
    Platform,
    Proto,
    Protocols,
    Published,
    Fingerprint,
    Hibernating,
    Uptime,
    OnionKey,
    OnionKeyCrosscert,
    NtorOnionKey,
    NtorOnionKeyCrosscert,
    SigningKey,
    Accept,
    Reject,
    #[strum(serialize = "ipv6-policy")]
    Ipv6Policy,
    OverloadGeneral,
    Contact,
    BridgeDistributionRequest,
    Family,
    ReadHistory,
    WriteHistory,
    Eventdns,
    CachesExtraInfo,
    ExtraInfoDigest,
    HiddenServiceDir,
    AllowSingleHopExits,
    OrAddress,
    TunnelledDirServer,
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
            Kw::Router => (Section::Header, Occurrence::ExactlyOnce),
            Kw::Bandwidth | Kw::Published => (Section::Body, Occurrence::ExactlyOnce),
            Kw::Accept | Kw::Reject | Kw::OrAddress => (Section::Body, Occurrence::AnyNumber),
            Kw::RouterSigEd25519 | Kw::RouterSignature => {
                (Section::Signature, Occurrence::AtMostOnce)
            }
            _ => (Section::Body, Occurrence::AtMostOnce),
        }
    }

    fn has_object(self) -> bool {
        matches!(
            self,
            Kw::IdentityEd25519
                | Kw::OnionKey
                | Kw::OnionKeyCrosscert
                | Kw::NtorOnionKeyCrosscert
                | Kw::SigningKey
                | Kw::RouterSignature
        )
    }
}

const MANDATORY: &[Kw] = &[Kw::Router, Kw::Bandwidth, Kw::Published];

/// A relay (or sanitized bridge) server descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerDescriptor {
    /// `@` annotations preceding the descriptor
    pub annotations: Vec<String>,
    pub nickname: String,
    pub address: Ipv4Addr,
    pub or_port: u16,
    pub socks_port: u16,
    pub dir_port: u16,
    /// Additional addresses from `or-address` lines
    pub or_addresses: Vec<OrAddress>,
    pub bandwidth_avg: u64,
    pub bandwidth_burst: u64,
    pub bandwidth_observed: u64,
    pub platform: Option<String>,
    pub proto: BTreeMap<String, SupportedProtocolVersion>,
    /// From the legacy `protocols Link .. Circuit ..` line
    pub link_protocol_versions: Vec<u32>,
    pub circuit_protocol_versions: Vec<u32>,
    pub published: DateTime<Utc>,
    pub fingerprint: Option<Fingerprint>,
    pub hibernating: bool,
    pub uptime: Option<u64>,
    pub onion_key: Option<Vec<u8>>,
    pub onion_key_crosscert: Option<Vec<u8>>,
    pub ntor_onion_key: Option<String>,
    pub ntor_onion_key_crosscert_sign: Option<bool>,
    pub ntor_onion_key_crosscert: Option<Vec<u8>>,
    pub signing_key: Option<Vec<u8>>,
    pub identity_ed25519: Option<Vec<u8>>,
    pub master_key_ed25519: Option<String>,
    pub exit_policy: DescriptorExitPolicy,
    pub ipv6_policy: DescriptorExitPolicyIPv6,
    pub overload_general: Option<DateTime<Utc>>,
    pub contact: Option<String>,
    pub bridge_distribution_request: Option<String>,
    pub family_members: Vec<FamilyMember>,
    pub read_history: Option<BandwidthHistory>,
    pub write_history: Option<BandwidthHistory>,
    pub uses_enhanced_dns_logic: bool,
    pub caches_extra_info: bool,
    pub extra_info_digest: Option<Fingerprint>,
    pub extra_info_digest_sha256: Option<String>,
    pub hidden_service_dir_versions: Option<Vec<u32>>,
    pub allow_single_hop_exits: bool,
    pub tunnelled_dir_server: bool,
    pub router_digest_sha256: Option<String>,
    pub router_sig_ed25519: Option<String>,
    pub router_signature: Option<Vec<u8>>,
    /// SHA-1 digest of the signed part, or the `router-digest` of a bridge
    pub digest: Option<Fingerprint>,
    pub unrecognized_lines: Vec<String>,
}

/// Fields of the `router` line
struct RouterLine {
    nickname: String,
    address: Ipv4Addr,
    or_port: u16,
    socks_port: u16,
    dir_port: u16,
}

impl RouterLine {
    // nickname address ORPort SOCKSPort DirPort
    fn parse(item: &Item<'_>) -> Result<RouterLine, DocumentParseError> {
        let args = item.args_exact(5)?;
        Ok(RouterLine {
            nickname: validate::nickname(args[0]).context(item)?,
            address: validate::ipv4(args[1]).context(item)?,
            or_port: validate::port(args[2]).context(item)?,
            socks_port: validate::port(args[3]).context(item)?,
            dir_port: validate::port(args[4]).context(item)?,
        })
    }
}

/// Everything between the `router` line and the signature section
#[derive(Default)]
struct Body {
    or_addresses: Vec<OrAddress>,
    bandwidth: Option<(u64, u64, u64)>,
    platform: Option<String>,
    proto: BTreeMap<String, SupportedProtocolVersion>,
    protocols: Option<(Vec<u32>, Vec<u32>)>,
    published: Option<DateTime<Utc>>,
    fingerprint: Option<Fingerprint>,
    hibernating: bool,
    uptime: Option<u64>,
    onion_key: Option<Vec<u8>>,
    onion_key_crosscert: Option<Vec<u8>>,
    ntor_onion_key: Option<String>,
    ntor_onion_key_crosscert: Option<(bool, Vec<u8>)>,
    signing_key: Option<Vec<u8>>,
    identity_ed25519: Option<Vec<u8>>,
    master_key_ed25519: Option<String>,
    exit_policy: DescriptorExitPolicy,
    ipv6_policy: Option<DescriptorExitPolicyIPv6>,
    overload_general: Option<DateTime<Utc>>,
    contact: Option<String>,
    bridge_distribution_request: Option<String>,
    family_members: Vec<FamilyMember>,
    read_history: Option<BandwidthHistory>,
    write_history: Option<BandwidthHistory>,
    eventdns: bool,
    caches_extra_info: bool,
    extra_info_digest: Option<(Fingerprint, Option<String>)>,
    hidden_service_dir: Option<Vec<u32>>,
    allow_single_hop_exits: bool,
    tunnelled_dir_server: bool,
    router_digest: Option<Fingerprint>,
    router_digest_sha256: Option<String>,
}

impl Body {
    fn parse_item(&mut self, kw: Kw, item: &Item<'_>) -> Result<(), DocumentParseError> {
        match kw {
            Kw::Bandwidth => {
                let args = item.args_exact(3)?;
                // bandwidth-avg bandwidth-burst bandwidth-observed
                self.bandwidth = Some((
                    validate::uint(args[0]).context(item)?,
                    validate::uint(args[1]).context(item)?,
                    validate::uint(args[2]).context(item)?,
                ));
            }
            Kw::Platform => self.platform = Some(item.argument_or_empty().to_string()),
            Kw::Proto => self.proto = parse_proto(item)?,
            Kw::Protocols => self.protocols = Some(parse_protocols(item)?),
            Kw::Published => {
                self.published = Some(validate::timestamp(item.get_argument()?).context(item)?)
            }
            Kw::Fingerprint => {
                let args = item.args_exact(10)?;
                if args.iter().any(|group| group.len() != 4) {
                    return Err(DocumentParseError::invalid(
                        item,
                        "fingerprint must consist of ten groups of four hex digits",
                    ));
                }
                self.fingerprint = Some(Fingerprint::from_str_hex(&args.concat()).context(item)?);
            }
            Kw::Hibernating => {
                self.hibernating = validate::bool_flag(item.args_exact(1)?[0]).context(item)?
            }
            Kw::Uptime => self.uptime = Some(validate::uint(item.args_exact(1)?[0]).context(item)?),
            Kw::OnionKey => self.onion_key = Some(keyless_object(item)?),
            Kw::OnionKeyCrosscert => self.onion_key_crosscert = Some(keyless_object(item)?),
            Kw::SigningKey => self.signing_key = Some(keyless_object(item)?),
            Kw::IdentityEd25519 => self.identity_ed25519 = Some(keyless_object(item)?),
            Kw::NtorOnionKey => {
                self.ntor_onion_key =
                    Some(validate::base64_key(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::NtorOnionKeyCrosscert => {
                let sign = validate::bool_flag(item.args_exact(1)?[0]).context(item)?;
                self.ntor_onion_key_crosscert = Some((sign, item.object_bytes()?));
            }
            Kw::MasterKeyEd25519 => {
                self.master_key_ed25519 =
                    Some(validate::base64_key(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::Accept => self
                .exit_policy
                .add_rule(exit::parse_exit_policy_rule(item, ExitPolicyType::Accept)?),
            Kw::Reject => self
                .exit_policy
                .add_rule(exit::parse_exit_policy_rule(item, ExitPolicyType::Reject)?),
            Kw::Ipv6Policy => self.ipv6_policy = Some(exit::parse_kw_ipv6_policy(item)?),
            Kw::OverloadGeneral => {
                let args = item.args_exact(3)?;
                validate::uint(args[0]).context(item)?;
                self.overload_general =
                    Some(validate::timestamp_parts(args[1], args[2]).context(item)?);
            }
            Kw::Contact => self.contact = Some(item.argument_or_empty().to_string()),
            Kw::BridgeDistributionRequest => {
                self.bridge_distribution_request = Some(item.args_exact(1)?[0].to_string())
            }
            Kw::Family => self.family_members = parse_family(item)?,
            Kw::ReadHistory => self.read_history = Some(BandwidthHistory::from_item(item)?),
            Kw::WriteHistory => self.write_history = Some(BandwidthHistory::from_item(item)?),
            Kw::Eventdns => {
                self.eventdns = validate::bool_flag(item.args_exact(1)?[0]).context(item)?
            }
            Kw::CachesExtraInfo => {
                item.no_arguments()?;
                self.caches_extra_info = true;
            }
            Kw::AllowSingleHopExits => {
                item.no_arguments()?;
                self.allow_single_hop_exits = true;
            }
            Kw::TunnelledDirServer => {
                item.no_arguments()?;
                self.tunnelled_dir_server = true;
            }
            Kw::ExtraInfoDigest => {
                let args = item.args();
                let (sha1, sha256) = match args[..] {
                    [sha1] => (sha1, None),
                    [sha1, sha256] => {
                        validate::base64_bytes(sha256, 32).context(item)?;
                        (sha1, Some(sha256.to_string()))
                    }
                    _ => return Err(DocumentParseError::args_missing(item)),
                };
                self.extra_info_digest = Some((Fingerprint::from_str_hex(sha1).context(item)?, sha256));
            }
            Kw::HiddenServiceDir => {
                let versions = item
                    .args()
                    .into_iter()
                    .map(validate::uint32)
                    .collect::<Result<Vec<_>, _>>()
                    .context(item)?;
                self.hidden_service_dir = Some(if versions.is_empty() { vec![2] } else { versions });
            }
            Kw::OrAddress => self.or_addresses.push(parse_or_address(item)?),
            Kw::RouterDigest => {
                self.router_digest =
                    Some(Fingerprint::from_str_hex(item.args_exact(1)?[0]).context(item)?)
            }
            Kw::RouterDigestSha256 => {
                let digest = item.args_exact(1)?[0];
                validate::base64_bytes(digest, 32).context(item)?;
                self.router_digest_sha256 = Some(digest.to_string());
            }
            Kw::Router | Kw::RouterSigEd25519 | Kw::RouterSignature => {
                return Err(DocumentParseError::unexpected(item))
            }
        }
        Ok(())
    }
}

/// Signature section: `router-sig-ed25519` and `router-signature`
#[derive(Default)]
struct SignatureSection {
    router_sig_ed25519: Option<String>,
    router_signature: Option<Vec<u8>>,
}

/// A keyword without arguments that carries a crypto object
fn keyless_object(item: &Item<'_>) -> Result<Vec<u8>, DocumentParseError> {
    item.no_arguments()?;
    item.object_bytes()
}

/// `proto Cons=1-2 Desc=1-2 Link=1-5`
pub(crate) fn parse_proto(
    item: &Item<'_>,
) -> Result<BTreeMap<String, SupportedProtocolVersion>, DocumentParseError> {
    let mut protocols = BTreeMap::new();
    for token in item.args() {
        let (name, versions) = validate::split_pair(token).context(item)?;
        let versions = versions.parse::<SupportedProtocolVersion>().context(item)?;
        protocols.insert(name.to_string(), versions);
    }
    Ok(protocols)
}

/// `protocols Link 1 2 Circuit 1`
fn parse_protocols(item: &Item<'_>) -> Result<(Vec<u32>, Vec<u32>), DocumentParseError> {
    let args = item.args();
    let circuit_at = args
        .iter()
        .position(|&a| a == "Circuit")
        .ok_or_else(|| DocumentParseError::invalid(item, "missing 'Circuit'"))?;
    if args.first() != Some(&"Link") {
        return Err(DocumentParseError::invalid(item, "missing 'Link'"));
    }
    let numbers = |tokens: &[&str]| {
        tokens
            .iter()
            .map(|t| validate::uint32(t))
            .collect::<Result<Vec<_>, _>>()
            .context(item)
    };
    Ok((numbers(&args[1..circuit_at])?, numbers(&args[circuit_at + 1..])?))
}

/// `family $FINGERPRINT[=~]nick nickname ...`
fn parse_family(item: &Item<'_>) -> Result<Vec<FamilyMember>, DocumentParseError> {
    item.args()
        .into_iter()
        .map(|x| match x.strip_prefix('$') {
            Some(fp) => {
                let hex = fp.split(|c: char| c == '=' || c == '~').next().unwrap_or(fp);
                Ok(FamilyMember::Fingerprint(
                    Fingerprint::from_str_hex(hex).context(item)?,
                ))
            }
            None => Ok(FamilyMember::Nickname(validate::nickname(x).context(item)?)),
        })
        .collect()
}

/// `or-address 1.2.3.4:9001` or `or-address [::1]:9001`
pub(crate) fn parse_or_address(item: &Item<'_>) -> Result<OrAddress, DocumentParseError> {
    let arg = item.args_exact(1)?[0];
    let (ip_str, port_str) = arg
        .rsplit_once(':')
        .ok_or_else(|| DocumentParseError::invalid(item, "missing port"))?;
    let ip = match ip_str.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        Some(v6) => v6.parse::<std::net::Ipv6Addr>().map(IpAddr::V6),
        None => ip_str.parse::<Ipv4Addr>().map(IpAddr::V4),
    }
    .map_err(|_| DocumentParseError::invalid(item, format!("invalid address '{}'", ip_str)))?;
    Ok(OrAddress {
        ip,
        port: validate::port(port_str).context(item)?,
    })
}

fn check_policy_present(seen: &KeywordSet) -> Result<(), DocumentParseError> {
    if !seen.contains(Kw::Accept) && !seen.contains(Kw::Reject) {
        return Err(DocumentParseError::missing("accept/reject"));
    }
    Ok(())
}

impl ServerDescriptor {
    /// Parse a single descriptor document from raw bytes.
    pub fn from_bytes(
        raw: &[u8],
        options: &ParseOptions,
    ) -> Result<ServerDescriptor, DocumentParseError> {
        let doc = Document::parse(raw)?;
        Self::from_doc(&doc, options)
    }

    /// Parse several descriptor documents all contained in one byte stream.
    pub fn many_from_bytes(
        raw: &[u8],
        options: &ParseOptions,
    ) -> Result<Vec<ServerDescriptor>, DocumentParseError> {
        split::split_at_keyword(raw, Kw::Router.name())?
            .into_iter()
            .map(|record| Self::from_bytes(record.raw, options))
            .collect()
    }

    /// Parse a descriptor document from an already tokenized document
    pub(crate) fn from_doc(
        doc: &Document<'_>,
        options: &ParseOptions,
    ) -> Result<ServerDescriptor, DocumentParseError> {
        grammar::expect_first(&doc.items, Kw::Router)?;

        let mut diagnostics = Diagnostics::new(options);
        let mut sections = Sections::new(Section::Header);
        let mut seen = KeywordSet::default();
        let mut router: Option<RouterLine> = None;
        let mut body = Body::default();
        let mut signature = SignatureSection::default();

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
                check_policy_present(&seen)?;
            }
            seen.record(kw, occurrence, item)?;
            item.expect_object(kw.has_object())?;

            match kw {
                Kw::Router => router = Some(RouterLine::parse(item)?),
                Kw::RouterSigEd25519 => {
                    let sig = item.args_exact(1)?[0];
                    validate::base64_bytes(sig, 64).context(item)?;
                    signature.router_sig_ed25519 = Some(sig.to_string());
                }
                Kw::RouterSignature => {
                    signature.router_signature = Some(keyless_object(item)?);
                    sections.advance(Section::End, item)?;
                }
                _ => body.parse_item(kw, item)?,
            }
        }

        seen.require(MANDATORY)?;
        check_policy_present(&seen)?;
        let router = router.ok_or_else(|| DocumentParseError::missing(Kw::Router.name()))?;
        let (bandwidth_avg, bandwidth_burst, bandwidth_observed) = body
            .bandwidth
            .ok_or_else(|| DocumentParseError::missing(Kw::Bandwidth.name()))?;
        let published = body
            .published
            .ok_or_else(|| DocumentParseError::missing(Kw::Published.name()))?;

        let digest = match (body.router_digest, &signature.router_signature) {
            (Some(digest), _) => Some(digest),
            (None, Some(_)) => doc
                .get_raw_content_until("\nrouter-signature\n")
                .map(digest_from_raw),
            (None, None) => None,
        };
        let (link_protocol_versions, circuit_protocol_versions) =
            body.protocols.unwrap_or_default();
        let (extra_info_digest, extra_info_digest_sha256) = match body.extra_info_digest {
            Some((sha1, sha256)) => (Some(sha1), sha256),
            None => (None, None),
        };
        let (ntor_onion_key_crosscert_sign, ntor_onion_key_crosscert) =
            match body.ntor_onion_key_crosscert {
                Some((sign, cert)) => (Some(sign), Some(cert)),
                None => (None, None),
            };

        debug!(
            "parsed server descriptor of {} published {}",
            router.nickname, published
        );

        Ok(ServerDescriptor {
            annotations: doc.annotations(),
            nickname: router.nickname,
            address: router.address,
            or_port: router.or_port,
            socks_port: router.socks_port,
            dir_port: router.dir_port,
            or_addresses: body.or_addresses,
            bandwidth_avg,
            bandwidth_burst,
            bandwidth_observed,
            platform: body.platform,
            proto: body.proto,
            link_protocol_versions,
            circuit_protocol_versions,
            published,
            fingerprint: body.fingerprint,
            hibernating: body.hibernating,
            uptime: body.uptime,
            onion_key: body.onion_key,
            onion_key_crosscert: body.onion_key_crosscert,
            ntor_onion_key: body.ntor_onion_key,
            ntor_onion_key_crosscert_sign,
            ntor_onion_key_crosscert,
            signing_key: body.signing_key,
            identity_ed25519: body.identity_ed25519,
            master_key_ed25519: body.master_key_ed25519,
            exit_policy: body.exit_policy,
            ipv6_policy: body.ipv6_policy.unwrap_or_default(),
            overload_general: body.overload_general,
            contact: body.contact,
            bridge_distribution_request: body.bridge_distribution_request,
            family_members: body.family_members,
            read_history: body.read_history,
            write_history: body.write_history,
            uses_enhanced_dns_logic: body.eventdns,
            caches_extra_info: body.caches_extra_info,
            extra_info_digest,
            extra_info_digest_sha256,
            hidden_service_dir_versions: body.hidden_service_dir,
            allow_single_hop_exits: body.allow_single_hop_exits,
            tunnelled_dir_server: body.tunnelled_dir_server,
            router_digest_sha256: body.router_digest_sha256,
            router_sig_ed25519: signature.router_sig_ed25519,
            router_signature: signature.router_signature,
            digest,
            unrecognized_lines: diagnostics.into_lines(),
        })
    }
}

impl FromStr for ServerDescriptor {
    type Err = DocumentParseError;

    /// Parse with default (lenient) options
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes(), &ParseOptions::default())
    }
}

/// Compute a descriptor's digest given the extracted raw content
pub fn digest_from_raw<R: AsRef<[u8]>>(raw: R) -> Fingerprint {
    let raw = raw.as_ref();
    let mut hasher = Sha1::new();
    hasher.update(raw);
    let result = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&result);
    Fingerprint::from_u8(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTER: &str = "router saberrider2008 94.134.192.243 9001 0 0\n";
    const SIGNATURE: &str = "router-signature\n-----BEGIN SIGNATURE-----\nAAAA\n-----END SIGNATURE-----\n";

    fn minimal(extra: &str) -> String {
        format!(
            "{}bandwidth 76800 102400 58012\npublished 2012-03-01 17:15:27\n{}reject *:*\n{}",
            ROUTER, extra, SIGNATURE
        )
    }

    fn parse(raw: &str) -> Result<ServerDescriptor, DocumentParseError> {
        ServerDescriptor::from_bytes(raw.as_bytes(), &ParseOptions::strict())
    }

    #[test]
    fn minimal_descriptor() {
        let desc = parse(&minimal("")).unwrap();
        assert_eq!(desc.nickname, "saberrider2008");
        assert_eq!(desc.address, Ipv4Addr::new(94, 134, 192, 243));
        assert_eq!(desc.or_port, 9001);
        assert_eq!(desc.bandwidth_observed, 58012);
        assert_eq!(desc.exit_policy.rules.len(), 1);
        assert_eq!(desc.ipv6_policy, DescriptorExitPolicyIPv6::default());
        assert!(desc.router_signature.is_some());
        assert!(desc.digest.is_some());
        assert!(desc.unrecognized_lines.is_empty());
    }

    #[test]
    fn digest_covers_router_to_signature_keyword() {
        let raw = minimal("");
        let desc = parse(&raw).unwrap();
        let end = raw.find("\nrouter-signature\n").unwrap() + "\nrouter-signature\n".len();
        assert_eq!(desc.digest, Some(digest_from_raw(&raw[..end])));
    }

    #[test]
    fn fingerprint_groups() {
        let desc = parse(&minimal(
            "opt fingerprint D873 3048 FC8E C910 2466 AD8F 3098 622B F1BF 71FD\n",
        ))
        .unwrap();
        assert_eq!(
            desc.fingerprint.unwrap().to_string(),
            "D8733048FC8EC9102466AD8F3098622BF1BF71FD"
        );
        assert!(parse(&minimal(
            "fingerprint D8733048FC8EC9102466AD8F3098622BF1BF71FD\n"
        ))
        .is_err());
    }

    #[test]
    fn router_must_come_first() {
        let raw = format!("published 2012-03-01 17:15:27\n{}", minimal(""));
        assert!(matches!(
            parse(&raw).unwrap_err(),
            DocumentParseError::WrongFirstKeyword { .. }
        ));
    }

    #[test]
    fn duplicate_lines_fail() {
        assert!(matches!(
            parse(&minimal("platform Tor 0.2.2.35\nplatform Tor 0.2.2.35\n")).unwrap_err(),
            DocumentParseError::DuplicateKeyword { .. }
        ));
        assert!(parse(&minimal("published 2012-03-01 17:15:27\n")).is_err());
    }

    #[test]
    fn missing_mandatory_lines() {
        let raw = format!("{}published 2012-03-01 17:15:27\nreject *:*\n", ROUTER);
        assert_eq!(
            parse(&raw).unwrap_err(),
            DocumentParseError::missing("bandwidth")
        );
        let raw = format!(
            "{}bandwidth 1 2 3\npublished 2012-03-01 17:15:27\n{}",
            ROUTER, SIGNATURE
        );
        assert_eq!(
            parse(&raw).unwrap_err(),
            DocumentParseError::missing("accept/reject")
        );
    }

    #[test]
    fn nothing_recognized_after_signature() {
        let raw = format!("{}contact someone\n", minimal(""));
        assert!(matches!(
            parse(&raw).unwrap_err(),
            DocumentParseError::UnexpectedKeyword { .. }
        ));
    }

    #[test]
    fn lenient_keeps_unrecognized_lines() {
        let raw = minimal("unrecognized-line 1\n");
        assert!(matches!(
            parse(&raw).unwrap_err(),
            DocumentParseError::UnrecognizedLine { .. }
        ));
        let desc = ServerDescriptor::from_bytes(raw.as_bytes(), &ParseOptions::lenient()).unwrap();
        assert_eq!(desc.unrecognized_lines, vec!["unrecognized-line 1"]);
    }

    #[test]
    fn unrecognized_crypto_block_is_kept_verbatim() {
        let raw = minimal("future-key\n-----BEGIN KEY-----\nAAAA\n-----END KEY-----\n");
        let desc = ServerDescriptor::from_bytes(raw.as_bytes(), &ParseOptions::lenient()).unwrap();
        assert_eq!(
            desc.unrecognized_lines,
            vec![
                "future-key",
                "-----BEGIN KEY-----",
                "AAAA",
                "-----END KEY-----"
            ]
        );
    }

    #[test]
    fn histories_and_family() {
        let desc = parse(&minimal(
            "read-history 2012-03-01 17:15:27 (900 s) 1,2,3\nfamily $D8733048FC8EC9102466AD8F3098622BF1BF71FD~x other\n",
        ))
        .unwrap();
        assert_eq!(desc.read_history.unwrap().values.len(), 3);
        assert_eq!(desc.family_members.len(), 2);
        assert_eq!(
            desc.family_members[1],
            FamilyMember::Nickname("other".to_string())
        );
    }

    #[test]
    fn or_addresses_and_protocols() {
        let desc = parse(&minimal(
            "or-address [2001:db8::1]:9001\nor-address 10.0.0.1:443\nprotocols Link 1 2 Circuit 1\nproto Link=1-4 Relay=1-2\n",
        ))
        .unwrap();
        assert_eq!(desc.or_addresses.len(), 2);
        assert_eq!(desc.or_addresses[1].port, 443);
        assert_eq!(desc.link_protocol_versions, vec![1, 2]);
        assert_eq!(desc.circuit_protocol_versions, vec![1]);
        assert!(desc.proto["Link"].supports(3));
    }

    #[test]
    fn crypto_objects_are_enforced() {
        assert!(matches!(
            parse(&minimal("onion-key\n")).unwrap_err(),
            DocumentParseError::ObjectMissing { .. }
        ));
        let desc = parse(&minimal(
            "onion-key\n-----BEGIN RSA PUBLIC KEY-----\nMIGJ\n-----END RSA PUBLIC KEY-----\n",
        ))
        .unwrap();
        assert!(desc.onion_key.unwrap().starts_with(b"-----BEGIN RSA PUBLIC KEY-----"));
    }

    #[test]
    fn bridge_router_digest() {
        let raw = format!(
            "{}bandwidth 1 2 3\npublished 2012-03-01 17:15:27\nreject *:*\nrouter-digest 00343A8024F70E214728F0C5AF7ACE0C1508F073\n",
            ROUTER
        );
        let desc = parse(&raw).unwrap();
        assert_eq!(
            desc.digest.unwrap().to_string(),
            "00343A8024F70E214728F0C5AF7ACE0C1508F073"
        );
    }

    #[test]
    fn many_descriptors() {
        let raw = format!(
            "@type server-descriptor 1.0\n{}@type server-descriptor 1.0\n{}",
            minimal(""),
            minimal("")
        );
        let descs = ServerDescriptor::many_from_bytes(raw.as_bytes(), &ParseOptions::strict()).unwrap();
        assert_eq!(descs.len(), 2);
        assert_eq!(descs[1].annotations, vec!["@type server-descriptor 1.0"]);
    }
}
