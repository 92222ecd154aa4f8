//! Generic structure of Tor documents: lines, items and crypto objects.
//!
//! Every document type shares the same meta format. A document is a sequence
//! of lines separated by `\n`; every line starts with a keyword followed by
//! optional arguments, and a line may be followed by a crypto object
//! (`-----BEGIN FOO-----` ... `-----END FOO-----`) whose content is opaque.
//! Leading lines starting with `@` (annotations) or `#` are not part of the
//! grammar.

use std::fmt;
use std::str::FromStr;

use crate::error::{DocumentParseError, FieldError};
use crate::validate;

//
// External dependencies
//
use log::trace;
use memchr::memchr;
use nom::{
    bytes::complete::{tag, take_till1},
    character::complete::space1,
    combinator::{opt, rest},
    sequence::{preceded, terminated},
    IResult,
};

const BEGIN_MARKER: &str = "-----BEGIN ";
const END_MARKER: &str = "-----END ";
const MARKER_TAIL: &str = "-----";

/// A 160-bit identity fingerprint or digest.
///
/// Displayed (and used as a map key) in its canonical form of 40 uppercase
/// hexadecimal characters, regardless of whether it was read from hex or
/// from unpadded base64.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    /// Parse from 40 hexadecimal characters (any case)
    pub fn from_str_hex(s: &str) -> Result<Fingerprint, FieldError> {
        validate::hex_digest(s).map(Fingerprint)
    }

    /// Parse from the unpadded base64 encoding of 20 bytes
    pub fn from_str_b64(s: &str) -> Result<Fingerprint, FieldError> {
        validate::base64_digest(s).map(Fingerprint)
    }

    pub(crate) fn from_u8(bytes: [u8; 20]) -> Fingerprint {
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// The canonical uppercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::from_str_hex(s)
    }
}

/// Iterator over the `\n`-separated lines of a byte stream.
///
/// Yields `(line number, byte offset, line)`; line numbers start at 1. A
/// final line feed does not produce an extra empty line.
#[derive(Debug, Clone)]
pub(crate) struct Lines<'a> {
    raw: &'a [u8],
    pos: usize,
    line_no: usize,
}

impl<'a> Lines<'a> {
    pub(crate) fn new(raw: &'a [u8]) -> Self {
        Lines {
            raw,
            pos: 0,
            line_no: 0,
        }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = (usize, usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.raw.len() {
            return None;
        }
        let start = self.pos;
        let end = memchr(b'\n', &self.raw[start..])
            .map(|i| start + i)
            .unwrap_or(self.raw.len());
        self.pos = end + 1;
        self.line_no += 1;
        Some((self.line_no, start, &self.raw[start..end]))
    }
}

/// Check that a line only contains printable ASCII (or tabs) and view it as text.
pub(crate) fn printable(line: &[u8], line_no: usize) -> Result<&str, DocumentParseError> {
    if let Some(&byte) = line
        .iter()
        .find(|&&b| !(b == b'\t' || (0x20..=0x7e).contains(&b)))
    {
        return Err(DocumentParseError::NonAscii {
            line: line_no,
            byte,
        });
    }
    std::str::from_utf8(line).map_err(|_| DocumentParseError::NonAscii {
        line: line_no,
        byte: 0,
    })
}

/// `true` if the remaining input consists of line feeds only
fn only_newlines(raw: &[u8]) -> bool {
    raw.iter().all(|&b| b == b'\n')
}

/// An opaque crypto object attached to an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Object<'a> {
    pub label: String,
    /// Line number of the BEGIN marker
    pub line_no: usize,
    /// The block from the BEGIN marker through the END marker, without the
    /// final line feed
    pub raw: &'a [u8],
}

impl<'a> Object<'a> {
    pub fn lines(&self) -> impl Iterator<Item = &'a [u8]> {
        let raw: &'a [u8] = self.raw;
        raw.split(|&b| b == b'\n')
    }
}

/// A single keyword line of a document, with its optional object
#[derive(Debug, Clone)]
pub(crate) struct Item<'a> {
    pub keyword: &'a str,
    pub arguments: Option<&'a str>,
    /// The verbatim line
    pub line: &'a str,
    pub line_no: usize,
    /// Byte offset of the line within the document
    pub offset: usize,
    pub object: Option<Object<'a>>,
}

impl<'a> Item<'a> {
    /// Whitespace-separated argument tokens (possibly none)
    pub fn args(&self) -> Vec<&'a str> {
        self.arguments
            .map(|a| a.split(validate::is_ws).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Argument tokens, requiring exactly `n` of them
    pub fn args_exact(&self, n: usize) -> Result<Vec<&'a str>, DocumentParseError> {
        let args = self.args();
        if args.len() != n {
            return Err(DocumentParseError::args_missing(self));
        }
        Ok(args)
    }

    /// The whole argument text, which must not be empty
    pub fn get_argument(&self) -> Result<&'a str, DocumentParseError> {
        match self.arguments {
            Some(a) if !a.is_empty() => Ok(a),
            _ => Err(DocumentParseError::args_missing(self)),
        }
    }

    /// The whole argument text, or "" if there is none
    pub fn argument_or_empty(&self) -> &'a str {
        self.arguments.unwrap_or("")
    }

    /// Require that the item has no arguments at all
    pub fn no_arguments(&self) -> Result<(), DocumentParseError> {
        match self.arguments {
            None => Ok(()),
            Some(_) => Err(DocumentParseError::args_missing(self)),
        }
    }

    /// The bytes of the attached crypto object
    pub fn object_bytes(&self) -> Result<Vec<u8>, DocumentParseError> {
        self.object
            .as_ref()
            .map(|object| object.raw.to_vec())
            .ok_or_else(|| DocumentParseError::ObjectMissing {
                line: self.line_no,
                keyword: self.keyword.to_string(),
            })
    }

    /// Enforce whether this item carries an object
    pub fn expect_object(&self, wanted: bool) -> Result<(), DocumentParseError> {
        match (wanted, self.object.is_some()) {
            (true, false) => Err(DocumentParseError::ObjectMissing {
                line: self.line_no,
                keyword: self.keyword.to_string(),
            }),
            (false, true) => Err(DocumentParseError::UnexpectedObject {
                line: self.line_no,
                keyword: self.keyword.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// The verbatim lines making up this item, object included.
    ///
    /// Object lines must be valid UTF-8 to be kept as text.
    pub fn raw_lines(&self) -> Result<Vec<String>, DocumentParseError> {
        let mut lines = vec![self.line.to_string()];
        if let Some(object) = &self.object {
            for (line_no, line) in (object.line_no..).zip(object.lines()) {
                let text = std::str::from_utf8(line).map_err(|e| DocumentParseError::NonAscii {
                    line: line_no,
                    byte: line[e.valid_up_to()],
                })?;
                lines.push(text.to_string());
            }
        }
        Ok(lines)
    }
}

/// keyword [WS arguments], with an optional leading `opt` marker
fn item_line(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    let (input, _) = opt(terminated(tag("opt"), space1))(input)?;
    let (input, keyword) = take_till1(validate::is_ws)(input)?;
    let (input, arguments) = opt(preceded(space1, rest))(input)?;
    Ok((input, (keyword, arguments)))
}

/// Crypto object that is still being read
struct OpenObject {
    start_line: usize,
    start_offset: usize,
    label: String,
}

/// A tokenized Tor document
#[derive(Debug, Clone)]
pub(crate) struct Document<'a> {
    raw: &'a [u8],
    pub annotations: Vec<&'a str>,
    pub items: Vec<Item<'a>>,
}

impl<'a> Document<'a> {
    /// Tokenize a single document.
    ///
    /// Fails on any byte outside printable ASCII that is not inside a crypto
    /// object, on annotations after the first keyword line, and on crypto
    /// objects that are not properly delimited.
    pub fn parse(raw: &'a [u8]) -> Result<Document<'a>, DocumentParseError> {
        let mut annotations = Vec::new();
        let mut items: Vec<Item<'a>> = Vec::new();
        let mut open: Option<OpenObject> = None;

        for (line_no, offset, bytes) in Lines::new(raw) {
            if let Some(object) = open.take() {
                if bytes.starts_with(END_MARKER.as_bytes())
                    && bytes.ends_with(MARKER_TAIL.as_bytes())
                    && bytes.len() >= END_MARKER.len() + MARKER_TAIL.len()
                {
                    let found = &bytes[END_MARKER.len()..bytes.len() - MARKER_TAIL.len()];
                    if found != object.label.as_bytes() {
                        return Err(DocumentParseError::MismatchedObject {
                            line: line_no,
                            label: object.label,
                            found: String::from_utf8_lossy(found).into_owned(),
                        });
                    }
                    // an open object always follows an item
                    if let Some(item) = items.last_mut() {
                        item.object = Some(Object {
                            label: object.label,
                            line_no: object.start_line,
                            raw: &raw[object.start_offset..offset + bytes.len()],
                        });
                    }
                } else {
                    open = Some(object);
                }
                continue;
            }

            let line = printable(bytes, line_no)?;

            if line.starts_with(BEGIN_MARKER)
                && line.ends_with(MARKER_TAIL)
                && line.len() >= BEGIN_MARKER.len() + MARKER_TAIL.len()
            {
                match items.last() {
                    Some(item) if item.object.is_none() => {}
                    _ => return Err(DocumentParseError::OrphanObject { line: line_no }),
                }
                open = Some(OpenObject {
                    start_line: line_no,
                    start_offset: offset,
                    label: line[BEGIN_MARKER.len()..line.len() - MARKER_TAIL.len()].to_string(),
                });
                continue;
            }

            if line.is_empty() {
                if only_newlines(&raw[offset..]) {
                    break;
                }
                return Err(DocumentParseError::EmptyLine { line: line_no });
            }

            if line.starts_with('@') || line.starts_with('#') {
                if !items.is_empty() {
                    return Err(DocumentParseError::MisplacedAnnotation { line: line_no });
                }
                if line.starts_with('@') {
                    annotations.push(line);
                } else {
                    trace!("skipping comment line {}", line_no);
                }
                continue;
            }

            let (_, (keyword, arguments)) =
                item_line(line).map_err(|_| DocumentParseError::MalformedLine { line: line_no })?;
            let arguments = arguments.map(str::trim_end).filter(|a| !a.is_empty());
            items.push(Item {
                keyword,
                arguments,
                line,
                line_no,
                offset,
                object: None,
            });
        }

        if let Some(object) = open {
            return Err(DocumentParseError::UnterminatedObject {
                line: object.start_line,
                label: object.label,
            });
        }
        if items.is_empty() {
            return Err(DocumentParseError::Empty);
        }

        Ok(Document {
            raw,
            annotations,
            items,
        })
    }

    /// The raw bytes from the first keyword line up to and including the
    /// first occurrence of `end` after it.
    pub fn get_raw_content_until(&self, end: &str) -> Option<&'a [u8]> {
        let start = self.items.first()?.offset;
        let found = memchr::memmem::find(&self.raw[start..], end.as_bytes())?;
        Some(&self.raw[start..start + found + end.len()])
    }

    pub fn annotations(&self) -> Vec<String> {
        self.annotations.iter().map(|a| a.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_opt_prefix() {
        let doc = Document::parse(b"opt fingerprint AAAA BBBB\nopt\n").unwrap();
        assert_eq!(doc.items[0].keyword, "fingerprint");
        assert_eq!(doc.items[0].args(), vec!["AAAA", "BBBB"]);
        assert_eq!(doc.items[1].keyword, "opt");
        assert_eq!(doc.items[1].arguments, None);
    }

    #[test]
    fn tabs_separate_arguments() {
        let doc = Document::parse(b"published\t2012-01-01 00:00:00\n").unwrap();
        assert_eq!(doc.items[0].keyword, "published");
        assert_eq!(doc.items[0].args(), vec!["2012-01-01", "00:00:00"]);
    }

    #[test]
    fn leading_annotations_are_collected() {
        let doc = Document::parse(b"@type server-descriptor 1.0\n# note\nrouter a\n").unwrap();
        assert_eq!(doc.annotations, vec!["@type server-descriptor 1.0"]);
        assert_eq!(doc.items.len(), 1);
    }

    #[test]
    fn annotation_after_start_fails() {
        let err = Document::parse(b"router a\n@type x 1.0\n").unwrap_err();
        assert_eq!(err, DocumentParseError::MisplacedAnnotation { line: 2 });
    }

    #[test]
    fn captures_crypto_object_verbatim() {
        let raw = b"signing-key\n-----BEGIN RSA PUBLIC KEY-----\nMIGJ\n-----END RSA PUBLIC KEY-----\nx\n";
        let doc = Document::parse(raw).unwrap();
        let object = doc.items[0].object.as_ref().unwrap();
        assert_eq!(object.label, "RSA PUBLIC KEY");
        assert_eq!(
            object.raw,
            b"-----BEGIN RSA PUBLIC KEY-----\nMIGJ\n-----END RSA PUBLIC KEY-----"
        );
        assert_eq!(doc.items[1].keyword, "x");
    }

    #[test]
    fn object_bytes_are_not_reencoded() {
        let raw = b"k\n-----BEGIN SIGNATURE-----\nAB\xff\xfeCD\n-----END SIGNATURE-----\n";
        let doc = Document::parse(raw).unwrap();
        let bytes = doc.items[0].object_bytes().unwrap();
        assert_eq!(
            bytes,
            b"-----BEGIN SIGNATURE-----\nAB\xff\xfeCD\n-----END SIGNATURE-----".to_vec()
        );
        assert_eq!(
            doc.items[0].raw_lines().unwrap_err(),
            DocumentParseError::NonAscii { line: 3, byte: 0xff }
        );
    }

    #[test]
    fn non_ascii_inside_object_is_tolerated() {
        let raw = "k\n-----BEGIN SIGNATURE-----\n\u{e9}\n-----END SIGNATURE-----\n";
        assert!(Document::parse(raw.as_bytes()).is_ok());
    }

    #[test]
    fn non_ascii_outside_object_fails() {
        let err = Document::parse("contact J\u{fc}rgen\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DocumentParseError::NonAscii { line: 1, .. }));
        let err = Document::parse(b"a b\r\n").unwrap_err();
        assert_eq!(err, DocumentParseError::NonAscii { line: 1, byte: 0x0d });
    }

    #[test]
    fn unterminated_object_fails() {
        let err = Document::parse(b"k\n-----BEGIN SIGNATURE-----\nabc\n").unwrap_err();
        assert!(matches!(err, DocumentParseError::UnterminatedObject { line: 2, .. }));
    }

    #[test]
    fn mismatched_object_fails() {
        let raw = b"k\n-----BEGIN SIGNATURE-----\n-----END RSA PUBLIC KEY-----\n";
        assert!(matches!(
            Document::parse(raw).unwrap_err(),
            DocumentParseError::MismatchedObject { .. }
        ));
    }

    #[test]
    fn orphan_object_fails() {
        let raw = b"-----BEGIN SIGNATURE-----\n-----END SIGNATURE-----\n";
        assert_eq!(
            Document::parse(raw).unwrap_err(),
            DocumentParseError::OrphanObject { line: 1 }
        );
    }

    #[test]
    fn empty_lines() {
        assert!(Document::parse(b"a\n\n\n").is_ok());
        assert_eq!(
            Document::parse(b"a\n\nb\n").unwrap_err(),
            DocumentParseError::EmptyLine { line: 2 }
        );
        assert_eq!(
            Document::parse(b"@type x 1.0\n").unwrap_err(),
            DocumentParseError::Empty
        );
    }

    #[test]
    fn leading_whitespace_is_malformed() {
        assert_eq!(
            Document::parse(b" a\n").unwrap_err(),
            DocumentParseError::MalformedLine { line: 1 }
        );
    }

    #[test]
    fn raw_content_until() {
        let doc = Document::parse(b"@a\nrouter x\nrouter-signature\nrest\n").unwrap();
        assert_eq!(
            doc.get_raw_content_until("\nrouter-signature\n").unwrap(),
            b"router x\nrouter-signature\n"
        );
    }

    #[test]
    fn fingerprint_forms_agree() {
        let b64 = Fingerprint::from_str_b64("ADQ6gCT3DiFHKPDFr3rODBUI8HM").unwrap();
        let hex = Fingerprint::from_str_hex("00343a8024f70e214728f0c5af7ace0c1508f073").unwrap();
        assert_eq!(b64, hex);
        assert_eq!(b64.to_string(), "00343A8024F70E214728F0C5AF7ACE0C1508F073");
    }
}
