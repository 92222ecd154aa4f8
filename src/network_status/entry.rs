//! Router status entries: the `r` line and the lines belonging to it

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use super::{Flavor, Kw};
use crate::consensus::{CondensedExitPolicy, Flag, SupportedProtocolVersion};
use crate::descriptor::{parse_or_address, parse_proto, OrAddress};
use crate::error::{DocumentParseError, ErrorContext};
use crate::grammar::{Keyword, KeywordSet};
use crate::meta::{Fingerprint, Item};
use crate::validate;

//
// External dependencies
//
use chrono::{DateTime, Utc};

/// A relay entry within a consensus or vote, containing only these sparse
/// information instead of the full server descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkStatusEntry {
    pub nickname: String,
    /// Identity, decoded from base64
    pub fingerprint: Fingerprint,
    /// Server descriptor digest; microdesc consensuses have none
    pub descriptor_digest: Option<Fingerprint>,
    pub published: DateTime<Utc>,
    pub address: Ipv4Addr,
    pub or_port: u16,
    pub dir_port: u16,
    /// Additional addresses from `a` lines
    pub or_addresses: Vec<OrAddress>,
    pub flags: BTreeSet<String>,
    pub version: Option<String>,
    pub protocols: BTreeMap<String, SupportedProtocolVersion>,
    pub bandwidth: Option<u64>,
    pub measured: Option<u64>,
    pub unmeasured: bool,
    pub exit_policy: Option<CondensedExitPolicy>,
    /// Microdescriptor digests from `m` lines
    pub microdescriptor_digests: Vec<String>,
    /// ed25519 identity from a vote's `id` line, `None` for `id ed25519 none`
    pub ed25519_id: Option<String>,
}

impl NetworkStatusEntry {
    pub fn has_flag(&self, flag: Flag) -> bool {
        let name: &'static str = flag.into();
        self.flags.contains(name)
    }
}

/// An `r` line and everything collected for it so far
pub(super) struct EntryGroup {
    pub(super) line: usize,
    pub(super) seen: KeywordSet,
    entry: NetworkStatusEntry,
}

impl EntryGroup {
    /// Open a group from its `r` line.
    ///
    /// `r nickname identity digest YYYY-MM-DD HH:MM:SS address ORPort DirPort`;
    /// the digest is absent in microdesc consensuses.
    pub(super) fn start(item: &Item<'_>, flavor: Flavor) -> Result<EntryGroup, DocumentParseError> {
        let args = match flavor {
            Flavor::Microdesc => item.args_exact(7)?,
            Flavor::Ns | Flavor::Vote => item.args_exact(8)?,
        };
        let (descriptor_digest, rest) = match flavor {
            Flavor::Microdesc => (None, &args[2..]),
            Flavor::Ns | Flavor::Vote => (
                Some(Fingerprint::from_str_b64(args[2]).context(item)?),
                &args[3..],
            ),
        };
        let entry = NetworkStatusEntry {
            nickname: validate::nickname(args[0]).context(item)?,
            fingerprint: Fingerprint::from_str_b64(args[1]).context(item)?,
            descriptor_digest,
            published: validate::timestamp_parts(rest[0], rest[1]).context(item)?,
            address: validate::ipv4(rest[2]).context(item)?,
            or_port: validate::port(rest[3]).context(item)?,
            dir_port: validate::port(rest[4]).context(item)?,
            or_addresses: Vec::new(),
            flags: BTreeSet::new(),
            version: None,
            protocols: BTreeMap::new(),
            bandwidth: None,
            measured: None,
            unmeasured: false,
            exit_policy: None,
            microdescriptor_digests: Vec::new(),
            ed25519_id: None,
        };
        Ok(EntryGroup {
            line: item.line_no,
            seen: KeywordSet::default(),
            entry,
        })
    }

    pub(super) fn add(
        &mut self,
        kw: Kw,
        item: &Item<'_>,
        flavor: Flavor,
    ) -> Result<(), DocumentParseError> {
        let entry = &mut self.entry;
        match kw {
            Kw::A => entry.or_addresses.push(parse_or_address(item)?),
            Kw::S => entry.flags = item.args().into_iter().map(String::from).collect(),
            Kw::V => entry.version = Some(item.argument_or_empty().to_string()),
            Kw::Pr => entry.protocols = parse_proto(item)?,
            Kw::W => {
                for token in item.args() {
                    let (key, value) = validate::split_pair(token).context(item)?;
                    match key {
                        "Bandwidth" => entry.bandwidth = Some(validate::uint(value).context(item)?),
                        "Measured" => entry.measured = Some(validate::uint(value).context(item)?),
                        "Unmeasured" => {
                            entry.unmeasured = validate::bool_flag(value).context(item)?
                        }
                        // unknown keys are ignored
                        _ => {}
                    }
                }
                if entry.bandwidth.is_none() {
                    return Err(DocumentParseError::invalid(item, "missing Bandwidth="));
                }
            }
            Kw::P => {
                entry.exit_policy = Some(
                    item.get_argument()?
                        .parse::<CondensedExitPolicy>()
                        .context(item)?,
                )
            }
            Kw::M if flavor == Flavor::Vote => {
                // m consensus-methods digesttype=digest ...
                let args = item.args();
                if args.len() < 2 {
                    return Err(DocumentParseError::args_missing(item));
                }
                for method in validate::comma_list(args[0]).context(item)? {
                    validate::uint32(method).context(item)?;
                }
                for digest in &args[1..] {
                    validate::split_pair(digest).context(item)?;
                    entry.microdescriptor_digests.push(digest.to_string());
                }
            }
            Kw::M => {
                let digest = item.args_exact(1)?[0];
                validate::base64_bytes(digest, 32).context(item)?;
                entry.microdescriptor_digests.push(digest.to_string());
            }
            Kw::Id => {
                let args = item.args_exact(2)?;
                if args[0] != "ed25519" {
                    return Err(DocumentParseError::invalid(item, "unknown key type"));
                }
                entry.ed25519_id = match args[1] {
                    "none" => None,
                    key => Some(validate::base64_key(key).context(item)?),
                };
            }
            _ => return Err(DocumentParseError::unexpected(item)),
        }
        Ok(())
    }

    /// Close the group, checking its mandatory lines
    pub(super) fn finish(self, flavor: Flavor) -> Result<NetworkStatusEntry, DocumentParseError> {
        let mandatory: &[Kw] = match flavor {
            Flavor::Microdesc => &[Kw::S, Kw::M],
            Flavor::Ns | Flavor::Vote => &[Kw::S],
        };
        if let Some(kw) = mandatory.iter().find(|&&kw| !self.seen.contains(kw)) {
            return Err(DocumentParseError::InvalidItem {
                line: self.line,
                keyword: Kw::R.name().to_string(),
                reason: format!("status entry lacks its '{}' line", kw.name()),
            });
        }
        Ok(self.entry)
    }
}
