//! Torperf measurement results
//!
//! A torperf stream holds one measurement per line, each a list of
//! space-separated `KEY=value` tokens, optionally preceded by a single
//! `@type torperf 1.x` annotation. Every record is parsed on its own; a
//! malformed record does not affect its neighbours when iterating with
//! [`records`].

use std::collections::BTreeMap;

use crate::error::{DocumentParseError, FieldError};
use crate::grammar::Diagnostics;
use crate::meta::{printable, Fingerprint, Lines};
use crate::options::ParseOptions;
use crate::split::TypeAnnotation;
use crate::validate::{self, FieldResult};

//
// External dependencies
//
use log::debug;
use phf::phf_map;

/// The value shape of a known torperf field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    Count,
    /// Decimal seconds since the epoch, stored as milliseconds
    Timestamp,
    Flag,
    Decimal,
    /// Comma-separated `$fingerprint`s
    Path,
    /// Comma-separated decimal seconds
    Durations,
}

static FIELDS: phf::Map<&'static str, FieldKind> = phf_map! {
    "SOURCE" => FieldKind::Text,
    "FILESIZE" => FieldKind::Count,
    "START" => FieldKind::Timestamp,
    "SOCKET" => FieldKind::Timestamp,
    "CONNECT" => FieldKind::Timestamp,
    "NEGOTIATE" => FieldKind::Timestamp,
    "REQUEST" => FieldKind::Timestamp,
    "RESPONSE" => FieldKind::Timestamp,
    "DATAREQUEST" => FieldKind::Timestamp,
    "DATARESPONSE" => FieldKind::Timestamp,
    "DATACOMPLETE" => FieldKind::Timestamp,
    "WRITEBYTES" => FieldKind::Count,
    "READBYTES" => FieldKind::Count,
    "DIDTIMEOUT" => FieldKind::Flag,
    "LAUNCH" => FieldKind::Timestamp,
    "USED_AT" => FieldKind::Timestamp,
    "PATH" => FieldKind::Path,
    "BUILDTIMES" => FieldKind::Durations,
    "TIMEOUT" => FieldKind::Count,
    "QUANTILE" => FieldKind::Decimal,
    "CIRC_ID" => FieldKind::Count,
    "USED_BY" => FieldKind::Count,
    "ENDPOINTLOCAL" => FieldKind::Text,
    "ENDPOINTPROXY" => FieldKind::Text,
    "ENDPOINTREMOTE" => FieldKind::Text,
    "HOSTNAMELOCAL" => FieldKind::Text,
    "HOSTNAMEREMOTE" => FieldKind::Text,
    "SOURCEADDRESS" => FieldKind::Text,
    "ERRORCODE" => FieldKind::Text,
};

const MANDATORY: &[&str] = &[
    "SOURCE",
    "FILESIZE",
    "START",
    "SOCKET",
    "CONNECT",
    "NEGOTIATE",
    "REQUEST",
    "RESPONSE",
    "DATAREQUEST",
    "DATARESPONSE",
    "DATACOMPLETE",
    "WRITEBYTES",
    "READBYTES",
];

const PERCENTILE_PREFIX: &str = "DATAPERC";

/// A single torperf measurement.
///
/// All timestamps are milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct TorperfResult {
    pub annotations: Vec<String>,
    /// All recognized fields with their raw values
    pub fields: BTreeMap<String, String>,
    pub source: String,
    pub file_size: u64,
    pub start_millis: i64,
    pub socket_millis: i64,
    pub connect_millis: i64,
    pub negotiate_millis: i64,
    pub request_millis: i64,
    pub response_millis: i64,
    pub data_request_millis: i64,
    pub data_response_millis: i64,
    pub data_complete_millis: i64,
    pub write_bytes: u64,
    pub read_bytes: u64,
    pub did_timeout: Option<bool>,
    /// `DATAPERCnn` fields: percentile of received bytes → time
    pub data_percentiles: BTreeMap<u32, i64>,
    pub launch_millis: Option<i64>,
    pub used_at_millis: Option<i64>,
    pub path: Option<Vec<Fingerprint>>,
    /// Cumulative circuit build times in milliseconds
    pub build_times: Option<Vec<i64>>,
    pub timeout: Option<u64>,
    pub quantile: Option<f64>,
    pub circ_id: Option<u64>,
    pub used_by: Option<u64>,
    /// Unknown `KEY=value` tokens, in original order
    pub unrecognized_lines: Vec<String>,
}

/// Decimal seconds (`1338357901.42`) as milliseconds; extra digits are cut off
fn millis(s: &str) -> FieldResult<i64> {
    let (secs, frac) = s.split_once('.').unwrap_or((s, ""));
    if !frac.chars().all(|c| c.is_ascii_digit()) || (s.contains('.') && frac.is_empty()) {
        return Err(FieldError::new(format!("'{}' is not a decimal timestamp", s)));
    }
    let secs = i64::try_from(validate::uint(secs)?)
        .map_err(|_| FieldError::new(format!("'{}' is out of range", s)))?;
    let frac_ms = format!("{:0<3}", &frac[..frac.len().min(3)]);
    let frac_ms: i64 = frac_ms
        .parse()
        .map_err(|_| FieldError::new(format!("'{}' is not a decimal timestamp", s)))?;
    secs.checked_mul(1000)
        .and_then(|ms| ms.checked_add(frac_ms))
        .ok_or_else(|| FieldError::new(format!("'{}' is out of range", s)))
}

fn path(s: &str) -> FieldResult<Vec<Fingerprint>> {
    validate::comma_list(s)?
        .into_iter()
        .map(|hop| {
            let hex = hop
                .strip_prefix('$')
                .ok_or_else(|| FieldError::new(format!("'{}' is not a $fingerprint", hop)))?;
            Fingerprint::from_str_hex(hex)
        })
        .collect()
}

fn durations(s: &str) -> FieldResult<Vec<i64>> {
    validate::histogram(s, millis)
}

/// Key-value fields of one record, checked and typed
#[derive(Default)]
struct Fields {
    raw: BTreeMap<String, String>,
    millis: BTreeMap<&'static str, i64>,
    counts: BTreeMap<&'static str, u64>,
    did_timeout: Option<bool>,
    quantile: Option<f64>,
    path: Option<Vec<Fingerprint>>,
    build_times: Option<Vec<i64>>,
    percentiles: BTreeMap<u32, i64>,
}

impl Fields {
    fn add(&mut self, key: &'static str, kind: FieldKind, value: &str) -> FieldResult<()> {
        match kind {
            FieldKind::Text => {}
            FieldKind::Count => {
                self.counts.insert(key, validate::non_negative(value)?);
            }
            FieldKind::Timestamp => {
                self.millis.insert(key, millis(value)?);
            }
            FieldKind::Flag => self.did_timeout = Some(validate::bool_flag(value)?),
            FieldKind::Decimal => self.quantile = Some(validate::decimal(value)?),
            FieldKind::Path => self.path = Some(path(value)?),
            FieldKind::Durations => self.build_times = Some(durations(value)?),
        }
        Ok(())
    }

    fn timestamp(&self, key: &str) -> i64 {
        self.millis.get(key).copied().unwrap_or_default()
    }

    fn count(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or_default()
    }
}

impl TorperfResult {
    /// Parse exactly one record, optionally preceded by an annotation
    pub fn from_bytes(raw: &[u8], options: &ParseOptions) -> Result<TorperfResult, DocumentParseError> {
        let mut iter = records(raw, options);
        let result = iter.next().ok_or(DocumentParseError::Empty)??;
        if iter.next().is_some() {
            return Err(DocumentParseError::document(
                "expected a single torperf record",
            ));
        }
        Ok(result)
    }

    /// Parse a single record line.
    ///
    /// `line_no` is used in error messages only.
    fn parse_line(
        line: &str,
        line_no: usize,
        annotations: Vec<String>,
        options: &ParseOptions,
    ) -> Result<TorperfResult, DocumentParseError> {
        let mut diagnostics = Diagnostics::new(options);
        let mut fields = Fields::default();
        let invalid = |keyword: &str, reason: String| DocumentParseError::InvalidItem {
            line: line_no,
            keyword: keyword.to_string(),
            reason,
        };

        for token in line.split(validate::is_ws).filter(|t| !t.is_empty()) {
            let (key, value) = match token.split_once('=') {
                Some(pair) => pair,
                None => {
                    diagnostics.unrecognized_text(line_no, vec![token.to_string()])?;
                    continue;
                }
            };
            if fields.raw.contains_key(key) {
                return Err(DocumentParseError::DuplicateKeyword {
                    line: line_no,
                    keyword: key.to_string(),
                });
            }
            if let Some(percent) = key.strip_prefix(PERCENTILE_PREFIX) {
                let percent = validate::uint32(percent).map_err(|e| invalid(key, e.0))?;
                let ms = millis(value).map_err(|e| invalid(key, e.0))?;
                fields.percentiles.insert(percent, ms);
            } else if let Some((&name, &kind)) = FIELDS.get_entry(key) {
                fields.add(name, kind, value).map_err(|e| invalid(key, e.0))?;
            } else {
                diagnostics.unrecognized_text(line_no, vec![token.to_string()])?;
                continue;
            }
            fields.raw.insert(key.to_string(), value.to_string());
        }

        if let Some(missing) = MANDATORY.iter().find(|&&k| !fields.raw.contains_key(k)) {
            return Err(DocumentParseError::missing(*missing));
        }

        Ok(TorperfResult {
            annotations,
            source: fields.raw["SOURCE"].clone(),
            file_size: fields.count("FILESIZE"),
            start_millis: fields.timestamp("START"),
            socket_millis: fields.timestamp("SOCKET"),
            connect_millis: fields.timestamp("CONNECT"),
            negotiate_millis: fields.timestamp("NEGOTIATE"),
            request_millis: fields.timestamp("REQUEST"),
            response_millis: fields.timestamp("RESPONSE"),
            data_request_millis: fields.timestamp("DATAREQUEST"),
            data_response_millis: fields.timestamp("DATARESPONSE"),
            data_complete_millis: fields.timestamp("DATACOMPLETE"),
            write_bytes: fields.count("WRITEBYTES"),
            read_bytes: fields.count("READBYTES"),
            did_timeout: fields.did_timeout,
            launch_millis: fields.millis.get("LAUNCH").copied(),
            used_at_millis: fields.millis.get("USED_AT").copied(),
            timeout: fields.counts.get("TIMEOUT").copied(),
            circ_id: fields.counts.get("CIRC_ID").copied(),
            used_by: fields.counts.get("USED_BY").copied(),
            quantile: fields.quantile,
            path: fields.path,
            build_times: fields.build_times,
            data_percentiles: fields.percentiles,
            fields: fields.raw,
            unrecognized_lines: diagnostics.into_lines(),
        })
    }
}

/// Iterator over the records of a torperf stream, see [`records`]
#[derive(Debug, Clone)]
pub struct Records<'a> {
    raw: &'a [u8],
    lines: Lines<'a>,
    options: &'a ParseOptions,
    done: bool,
}

impl<'a> Records<'a> {
    fn fail(&mut self, err: DocumentParseError) -> Option<Result<TorperfResult, DocumentParseError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<TorperfResult, DocumentParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut annotation: Option<String> = None;
        while let Some((line_no, offset, bytes)) = self.lines.next() {
            if bytes.is_empty() {
                if self.raw[offset..].iter().all(|&b| b == b'\n') {
                    break;
                }
                return self.fail(DocumentParseError::EmptyLine { line: line_no });
            }
            let line = match printable(bytes, line_no) {
                Ok(line) => line,
                // the line is the annotated record; following records are still available
                Err(err) => return Some(Err(err)),
            };
            if line.starts_with('@') {
                if annotation.is_some() {
                    return self.fail(DocumentParseError::MisplacedAnnotation { line: line_no });
                }
                if let Err(err) = line.parse::<TypeAnnotation>() {
                    return self.fail(DocumentParseError::InvalidItem {
                        line: line_no,
                        keyword: "@type".to_string(),
                        reason: err.0,
                    });
                }
                annotation = Some(line.to_string());
                continue;
            }
            return Some(TorperfResult::parse_line(
                line,
                line_no,
                annotation.into_iter().collect(),
                self.options,
            ));
        }
        if annotation.is_some() {
            return self.fail(DocumentParseError::document(
                "annotation is not followed by a torperf record",
            ));
        }
        self.done = true;
        None
    }
}

/// Iterate over the records of a torperf stream, one result per record
pub fn records<'a>(raw: &'a [u8], options: &'a ParseOptions) -> Records<'a> {
    Records {
        raw,
        lines: Lines::new(raw),
        options,
        done: false,
    }
}

/// Parse all records of a torperf stream, failing on the first bad one
pub fn parse_torperf_stream(
    raw: &[u8],
    options: &ParseOptions,
) -> Result<Vec<TorperfResult>, DocumentParseError> {
    let results = records(raw, options).collect::<Result<Vec<_>, _>>()?;
    debug!("parsed {} torperf records", results.len());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = "BUILDTIMES=0.49,0.79,1.10 CIRC_ID=9 CONNECT=1338357901.42 \
        DATACOMPLETE=1338357904.42 DATAPERC10=1338357902.5 DATAPERC90=1338357904.1 \
        DATAREQUEST=1338357901.99 DATARESPONSE=1338357902.26 DIDTIMEOUT=0 \
        FILESIZE=51200 LAUNCH=1338357893.12 NEGOTIATE=1338357901.52 \
        PATH=$0011BD2485AD45D984EC4159C88FC066E5E3300E,$1C1F34A8F37D1D2A54E1C2E8B4B1A1C2F7FBA4BC \
        QUANTILE=0.800000 READBYTES=51442 REQUEST=1338357901.99 RESPONSE=1338357902.25 \
        SOCKET=1338357901.41 SOURCE=moria START=1338357901.4 TIMEOUT=1500 USED_AT=1338357904.43 \
        USED_BY=18 WRITEBYTES=75";

    fn parse(raw: &str) -> Result<Vec<TorperfResult>, DocumentParseError> {
        parse_torperf_stream(raw.as_bytes(), &ParseOptions::strict())
    }

    #[test]
    fn full_record() {
        let results = parse(&format!("@type torperf 1.0\n{}\n", RECORD)).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.annotations, vec!["@type torperf 1.0"]);
        assert_eq!(r.source, "moria");
        assert_eq!(r.file_size, 51200);
        assert_eq!(r.start_millis, 1338357901400);
        assert_eq!(r.connect_millis, 1338357901420);
        assert_eq!(r.data_percentiles[&10], 1338357902500);
        assert_eq!(r.data_percentiles.len(), 2);
        assert_eq!(r.did_timeout, Some(false));
        assert_eq!(r.build_times, Some(vec![490, 790, 1100]));
        assert_eq!(r.path.as_ref().unwrap().len(), 2);
        assert_eq!(r.used_by, Some(18));
        assert_eq!(r.fields["QUANTILE"], "0.800000");
    }

    #[test]
    fn millisecond_conversion() {
        assert_eq!(millis("1338357901").unwrap(), 1338357901000);
        assert_eq!(millis("1338357901.4").unwrap(), 1338357901400);
        assert_eq!(millis("1338357901.123456").unwrap(), 1338357901123);
        assert!(millis("1338357901.").is_err());
        assert!(millis("-1.0").is_err());
        assert!(millis("1.2.3").is_err());
    }

    #[test]
    fn annotation_attaches_to_next_record_only() {
        let raw = format!("@type torperf 1.0\n{}\n{}\n", RECORD, RECORD);
        let results = parse(&raw).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].annotations.len(), 1);
        assert!(results[1].annotations.is_empty());
    }

    #[test]
    fn bad_record_fails_alone() {
        let bad = RECORD.replace("FILESIZE=51200", "FILESIZE=fifty");
        let raw = format!("{}\n{}\n", bad, RECORD);
        let options = ParseOptions::strict();
        let results: Vec<_> = records(raw.as_bytes(), &options).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
        assert!(parse(&raw).is_err());
    }

    #[test]
    fn mandatory_fields() {
        let raw = RECORD.replace("READBYTES=51442 ", "");
        assert_eq!(
            parse(&raw).unwrap_err(),
            DocumentParseError::missing("READBYTES")
        );
    }

    #[test]
    fn duplicate_fields() {
        let raw = format!("{} SOURCE=torperf", RECORD);
        assert!(matches!(
            parse(&raw).unwrap_err(),
            DocumentParseError::DuplicateKeyword { .. }
        ));
    }

    #[test]
    fn unknown_fields() {
        let raw = format!("{} PARTIAL10240=1338357902.17", RECORD);
        assert!(parse(&raw).is_err());
        let results = parse_torperf_stream(raw.as_bytes(), &ParseOptions::lenient()).unwrap();
        assert_eq!(results[0].unrecognized_lines, vec!["PARTIAL10240=1338357902.17"]);
    }

    #[test]
    fn single_record() {
        let options = ParseOptions::strict();
        let r = TorperfResult::from_bytes(RECORD.as_bytes(), &options).unwrap();
        assert_eq!(r.source, "moria");
        let two = format!("{}\n{}\n", RECORD, RECORD);
        assert!(TorperfResult::from_bytes(two.as_bytes(), &options).is_err());
        assert_eq!(
            TorperfResult::from_bytes(b"", &options).unwrap_err(),
            DocumentParseError::Empty
        );
    }

    #[test]
    fn annotations_per_record() {
        let raw = format!("@type torperf 1.0\n@type torperf 1.0\n{}\n", RECORD);
        assert!(matches!(
            parse(&raw).unwrap_err(),
            DocumentParseError::MisplacedAnnotation { .. }
        ));
        assert!(parse("@type torperf 1.0\n").is_err());
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn annotations_must_be_type_lines() {
        for annotation in ["@garbage", "@type torperf", "@type torperf 1", "@source moria"] {
            let raw = format!("{}\n{}\n", annotation, RECORD);
            assert!(matches!(
                parse(&raw).unwrap_err(),
                DocumentParseError::InvalidItem { line: 1, .. }
            ));
        }
    }

    #[test]
    fn annotation_stays_with_unreadable_record() {
        let raw = format!("@type torperf 1.0\nSOURCE=m\u{e9}\n{}\n", RECORD);
        let options = ParseOptions::strict();
        let results: Vec<_> = records(raw.as_bytes(), &options).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Err(DocumentParseError::NonAscii { line: 2, .. })
        ));
        assert!(results[1].as_ref().unwrap().annotations.is_empty());
    }

    #[test]
    fn percentile_labels_are_numeric() {
        for key in ["DATAPERCx", "DATAPERC", "DATAPERC-5"] {
            let raw = format!("{} {}=1338357903.1", RECORD, key);
            assert!(matches!(
                parse(&raw).unwrap_err(),
                DocumentParseError::InvalidItem { .. }
            ));
        }
    }
}
