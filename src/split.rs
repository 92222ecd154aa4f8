//! Splitting byte streams that contain several concatenated documents.
//!
//! Annotation lines (starting with `@`) always belong to the record that
//! follows them.

use crate::error::{DocumentParseError, FieldError};
use crate::meta::{printable, Lines};
use crate::validate;

/// A single record located within a larger byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord<'a> {
    /// Leading annotation lines, without line feeds
    pub annotations: Vec<&'a str>,
    /// The complete record, annotations included
    pub raw: &'a [u8],
    /// The record without its annotations
    pub body: &'a [u8],
}

impl<'a> RawRecord<'a> {
    /// The first `@type` annotation, if any
    pub fn type_annotation(&self) -> Option<Result<TypeAnnotation, FieldError>> {
        self.annotations
            .iter()
            .find(|a| a.starts_with("@type "))
            .map(|a| a.parse())
    }
}

/// `@type <name> <major>.<minor>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub name: String,
    pub major: u32,
    pub minor: u32,
}

impl std::str::FromStr for TypeAnnotation {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FieldError::new(format!("'{}' is not a type annotation", s));
        let rest = s.strip_prefix("@type").ok_or_else(invalid)?;
        let parts: Vec<&str> = rest.split(validate::is_ws).filter(|p| !p.is_empty()).collect();
        match parts[..] {
            [name, version] => {
                let (major, minor) = version.split_once('.').ok_or_else(invalid)?;
                Ok(TypeAnnotation {
                    name: name.to_string(),
                    major: validate::uint32(major)?,
                    minor: validate::uint32(minor)?,
                })
            }
            _ => Err(invalid()),
        }
    }
}

fn starts_with_keyword(line: &[u8], keyword: &str) -> bool {
    let keyword = keyword.as_bytes();
    line.starts_with(keyword)
        && matches!(line.get(keyword.len()), None | Some(b' ') | Some(b'\t'))
}

fn split_by<'a>(
    raw: &'a [u8],
    starts_record: impl Fn(&[u8]) -> bool,
) -> Result<Vec<RawRecord<'a>>, DocumentParseError> {
    let mut records = Vec::new();
    let mut annotations = Vec::new();
    // (start of record, start of body)
    let mut start: Option<usize> = None;
    let mut body: Option<usize> = None;

    for (line_no, offset, line) in Lines::new(raw) {
        let is_annotation = line.first() == Some(&b'@');
        let begins_new = is_annotation || starts_record(line);
        if begins_new {
            if let (Some(s), Some(b)) = (start, body) {
                records.push(RawRecord {
                    annotations: std::mem::take(&mut annotations),
                    raw: &raw[s..offset],
                    body: &raw[b..offset],
                });
                start = None;
                body = None;
            }
        }
        if start.is_none() {
            start = Some(offset);
        }
        if is_annotation && body.is_none() {
            annotations.push(printable(line, line_no)?);
        } else if body.is_none() {
            body = Some(offset);
        }
    }

    match (start, body) {
        (Some(s), Some(b)) => records.push(RawRecord {
            annotations,
            raw: &raw[s..],
            body: &raw[b..],
        }),
        (Some(_), None) => {
            return Err(DocumentParseError::document(
                "annotation is not followed by a document",
            ))
        }
        _ => {}
    }
    Ok(records)
}

/// Split a stream in which every record starts with a line with `keyword`,
/// e.g. `router` for concatenated server descriptors.
pub fn split_at_keyword<'a>(
    raw: &'a [u8],
    keyword: &str,
) -> Result<Vec<RawRecord<'a>>, DocumentParseError> {
    split_by(raw, |line| starts_with_keyword(line, keyword))
}

/// Split a stream in which only annotation lines separate records
pub fn split_annotated(raw: &[u8]) -> Result<Vec<RawRecord<'_>>, DocumentParseError> {
    split_by(raw, |_| false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_keyword() {
        let raw = b"@type server-descriptor 1.0\nrouter a\nx\nrouter b\ny\n";
        let records = split_at_keyword(raw, "router").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].annotations, vec!["@type server-descriptor 1.0"]);
        assert_eq!(records[0].body, b"router a\nx\n");
        assert_eq!(records[0].raw, b"@type server-descriptor 1.0\nrouter a\nx\n");
        assert!(records[1].annotations.is_empty());
        assert_eq!(records[1].body, b"router b\ny\n");
    }

    #[test]
    fn keyword_must_be_whole_token() {
        let raw = b"router a\nrouter-signature\nrouter b\n";
        assert_eq!(split_at_keyword(raw, "router").unwrap().len(), 2);
    }

    #[test]
    fn annotations_attach_to_following_record() {
        let raw = b"@type a 1.0\nfirst\n@type b 1.0\n@extra\nsecond\n";
        let records = split_annotated(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].annotations, vec!["@type b 1.0", "@extra"]);
        assert_eq!(records[1].body, b"second\n");
        let annotation = records[1].type_annotation().unwrap().unwrap();
        assert_eq!(annotation.name, "b");
        assert_eq!((annotation.major, annotation.minor), (1, 0));
    }

    #[test]
    fn dangling_annotation_fails() {
        assert!(split_annotated(b"first\n@type a 1.0\n").is_err());
    }

    #[test]
    fn type_annotations() {
        assert!("@type torperf 1.0".parse::<TypeAnnotation>().is_ok());
        assert!("@type torperf".parse::<TypeAnnotation>().is_err());
        assert!("@type torperf one".parse::<TypeAnnotation>().is_err());
        assert!("@source x".parse::<TypeAnnotation>().is_err());
    }
}
