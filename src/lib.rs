//! A parser for Tor docs.
//!
//! This crate implements parsing and validation of Tor directory documents as
//! specified in
//! [dir-spec](https://gitlab.torproject.org/tpo/core/torspec/-/blob/main/dir-spec.txt):
//! server descriptors (`@type server-descriptor`), extra-info descriptors
//! (`@type extra-info`), consensuses of both flavors
//! (`@type network-status-consensus-3`, `@type network-status-microdesc-consensus-3`),
//! votes (`@type network-status-vote-3`) and torperf measurement results
//! (`@type torperf`).
//!
//! Every parser takes [`ParseOptions`]. Lines with unknown keywords are
//! collected on the parsed document by default and rejected with
//! [`ParseOptions::strict`]; known keywords are always validated fully.
//! Signatures are kept as opaque text and never verified.

pub mod consensus;
#[doc(inline)]
pub use consensus::Consensus;

pub mod descriptor;
#[doc(inline)]
pub use descriptor::ServerDescriptor;

pub mod extra_info;
#[doc(inline)]
pub use extra_info::ExtraInfoDescriptor;

pub mod vote;
#[doc(inline)]
pub use vote::Vote;

pub mod torperf;
#[doc(inline)]
pub use torperf::TorperfResult;

pub mod network_status;
pub use network_status::{Flavor, NetworkStatusEntry};

pub mod error;
pub use error::DocumentParseError;

pub mod history;
pub use history::BandwidthHistory;

mod options;
pub use options::ParseOptions;

pub mod split;
pub use split::{RawRecord, TypeAnnotation};

mod grammar;
mod meta;
mod validate;

pub use meta::Fingerprint;

//
// External dependencies
//
use log::debug;

/// Parse a single server descriptor, relay or sanitized bridge
pub fn parse_server_descriptor(
    raw: &[u8],
    options: &ParseOptions,
) -> Result<ServerDescriptor, DocumentParseError> {
    ServerDescriptor::from_bytes(raw, options)
}

/// Parse a single extra-info descriptor
pub fn parse_extra_info_descriptor(
    raw: &[u8],
    options: &ParseOptions,
) -> Result<ExtraInfoDescriptor, DocumentParseError> {
    ExtraInfoDescriptor::from_bytes(raw, options)
}

/// Parse a consensus of either flavor
pub fn parse_consensus(raw: &[u8], options: &ParseOptions) -> Result<Consensus, DocumentParseError> {
    Consensus::from_bytes(raw, options)
}

/// Parse a vote, including its embedded key certificate
pub fn parse_vote(raw: &[u8], options: &ParseOptions) -> Result<Vote, DocumentParseError> {
    Vote::from_bytes(raw, options)
}

/// Parse a stream of torperf records, failing on the first malformed one.
///
/// Use [`torperf::records`] to skip over malformed records instead.
pub fn parse_torperf_stream(
    raw: &[u8],
    options: &ParseOptions,
) -> Result<Vec<TorperfResult>, DocumentParseError> {
    torperf::parse_torperf_stream(raw, options)
}

/// Any document recognized by its `@type` annotation
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedDocument {
    ServerDescriptor(Box<ServerDescriptor>),
    ExtraInfoDescriptor(Box<ExtraInfoDescriptor>),
    Consensus(Box<Consensus>),
    Vote(Box<Vote>),
    Torperf(Vec<TorperfResult>),
}

/// The document types this crate can dispatch to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentType {
    ServerDescriptor,
    ExtraInfo,
    Consensus,
    Vote,
    Torperf,
}

impl DocumentType {
    /// Map a `@type` name to the parser for it
    fn from_annotation(name: &str) -> Option<DocumentType> {
        match name {
            "server-descriptor" | "bridge-server-descriptor" => Some(DocumentType::ServerDescriptor),
            "extra-info" | "bridge-extra-info" => Some(DocumentType::ExtraInfo),
            "network-status-consensus-3" | "network-status-microdesc-consensus-3" => {
                Some(DocumentType::Consensus)
            }
            "network-status-vote-3" => Some(DocumentType::Vote),
            "torperf" => Some(DocumentType::Torperf),
            _ => None,
        }
    }
}

/// Parse a stream of annotated documents, choosing each document's parser by
/// its `@type` annotation.
///
/// Records without a `@type` annotation or with an unknown type fail.
pub fn parse_annotated(
    raw: &[u8],
    options: &ParseOptions,
) -> Result<Vec<ParsedDocument>, DocumentParseError> {
    split::split_annotated(raw)?
        .into_iter()
        .map(|record| {
            let annotation = record
                .type_annotation()
                .ok_or_else(|| DocumentParseError::document("record lacks a @type annotation"))?
                .map_err(DocumentParseError::document)?;
            let doc_type = DocumentType::from_annotation(&annotation.name).ok_or_else(|| {
                DocumentParseError::document(format!("unsupported document type '{}'", annotation.name))
            })?;
            debug!("parsing {} {}.{}", annotation.name, annotation.major, annotation.minor);
            Ok(match doc_type {
                DocumentType::ServerDescriptor => ParsedDocument::ServerDescriptor(Box::new(
                    ServerDescriptor::from_bytes(record.raw, options)?,
                )),
                DocumentType::ExtraInfo => ParsedDocument::ExtraInfoDescriptor(Box::new(
                    ExtraInfoDescriptor::from_bytes(record.raw, options)?,
                )),
                DocumentType::Consensus => {
                    ParsedDocument::Consensus(Box::new(Consensus::from_bytes(record.raw, options)?))
                }
                DocumentType::Vote => {
                    ParsedDocument::Vote(Box::new(Vote::from_bytes(record.raw, options)?))
                }
                DocumentType::Torperf => {
                    ParsedDocument::Torperf(torperf::parse_torperf_stream(record.raw, options)?)
                }
            })
        })
        .collect()
}
