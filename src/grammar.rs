//! Keyword bookkeeping shared by the document state machines.
//!
//! Each document type declares its keywords as a fieldless enum; every
//! keyword belongs to exactly one section and has an [`Occurrence`]. The
//! helpers here enforce section order, "-once" cardinality and presence, and
//! collect unrecognized lines.

use std::fmt::Debug;

use crate::error::DocumentParseError;
use crate::meta::Item;
use crate::options::ParseOptions;

//
// External dependencies
//
use log::trace;

/// How often a keyword may appear within its scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Occurrence {
    ExactlyOnce,
    AtMostOnce,
    AnyNumber,
}

/// A document keyword that can be tracked in a [`KeywordSet`]
pub(crate) trait Keyword: Copy + Into<&'static str> {
    /// Position of the keyword in its enum, below 128
    fn bit(self) -> u32;

    fn name(self) -> &'static str {
        self.into()
    }
}

/// Set of keywords seen so far, as a bitset
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct KeywordSet(u128);

impl KeywordSet {
    pub fn contains<K: Keyword>(&self, keyword: K) -> bool {
        self.0 & (1u128 << keyword.bit()) != 0
    }

    /// Insert the keyword, returning `false` if it was already present
    pub fn insert<K: Keyword>(&mut self, keyword: K) -> bool {
        let fresh = !self.contains(keyword);
        self.0 |= 1u128 << keyword.bit();
        fresh
    }

    /// Record one occurrence of `keyword`, failing on a repeated "-once" keyword
    pub fn record<K: Keyword>(
        &mut self,
        keyword: K,
        occurrence: Occurrence,
        item: &Item<'_>,
    ) -> Result<(), DocumentParseError> {
        if !self.insert(keyword) && occurrence != Occurrence::AnyNumber {
            return Err(DocumentParseError::duplicate(item));
        }
        Ok(())
    }

    /// Fail with the first keyword in `mandatory` that was never seen
    pub fn require<K: Keyword>(&self, mandatory: &[K]) -> Result<(), DocumentParseError> {
        match mandatory.iter().find(|&&k| !self.contains(k)) {
            Some(k) => Err(DocumentParseError::missing(k.name())),
            None => Ok(()),
        }
    }
}

/// The current section of a document; sections only ever move forward
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sections<S> {
    current: S,
}

impl<S: Copy + Ord + Debug> Sections<S> {
    pub fn new(first: S) -> Self {
        Sections { current: first }
    }

    /// Move to `target`, which must not lie before the current section.
    ///
    /// Returns the section that was left, if any.
    pub fn advance(&mut self, target: S, item: &Item<'_>) -> Result<Option<S>, DocumentParseError> {
        if target < self.current {
            return Err(DocumentParseError::unexpected(item));
        }
        if target == self.current {
            return Ok(None);
        }
        let left = self.current;
        self.current = target;
        Ok(Some(left))
    }
}

/// Check that the document starts with its version keyword
pub(crate) fn expect_first<K: Keyword>(items: &[Item<'_>], first: K) -> Result<(), DocumentParseError> {
    match items.first() {
        Some(item) if item.keyword == first.name() => Ok(()),
        Some(item) => Err(DocumentParseError::WrongFirstKeyword {
            line: item.line_no,
            expected: first.name().to_string(),
            found: item.keyword.to_string(),
        }),
        None => Err(DocumentParseError::Empty),
    }
}

/// Collects unrecognized lines, or rejects them in strict mode
#[derive(Debug, Clone)]
pub(crate) struct Diagnostics {
    fail_on_unrecognized: bool,
    lines: Vec<String>,
}

impl Diagnostics {
    pub fn new(options: &ParseOptions) -> Self {
        Diagnostics {
            fail_on_unrecognized: options.fail_on_unrecognized,
            lines: Vec::new(),
        }
    }

    /// Handle an item whose keyword is not part of the grammar
    pub fn unrecognized(&mut self, item: &Item<'_>) -> Result<(), DocumentParseError> {
        if self.fail_on_unrecognized {
            return self.unrecognized_text(item.line_no, vec![item.line.to_string()]);
        }
        self.unrecognized_text(item.line_no, item.raw_lines()?)
    }

    /// Handle unrecognized content that is not a keyword line
    pub fn unrecognized_text(
        &mut self,
        line: usize,
        lines: Vec<String>,
    ) -> Result<(), DocumentParseError> {
        if self.fail_on_unrecognized {
            return Err(DocumentParseError::UnrecognizedLine {
                line,
                content: lines.into_iter().next().unwrap_or_default(),
            });
        }
        trace!("keeping unrecognized line {}", line);
        self.lines.extend(lines);
        Ok(())
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Document;
    use strum::{EnumString, IntoStaticStr};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
    #[strum(serialize_all = "kebab-case")]
    enum Kw {
        Alpha,
        Beta,
    }

    impl Keyword for Kw {
        fn bit(self) -> u32 {
            self as u32
        }
    }

    #[test]
    fn cardinality() {
        let doc = Document::parse(b"alpha\nalpha\n").unwrap();
        let mut seen = KeywordSet::default();
        seen.record(Kw::Alpha, Occurrence::AtMostOnce, &doc.items[0]).unwrap();
        assert!(seen.record(Kw::Alpha, Occurrence::AtMostOnce, &doc.items[1]).is_err());
        seen.record(Kw::Alpha, Occurrence::AnyNumber, &doc.items[1]).unwrap();
        assert_eq!(
            seen.require(&[Kw::Alpha, Kw::Beta]).unwrap_err(),
            DocumentParseError::missing("beta")
        );
    }

    #[test]
    fn sections_only_move_forward() {
        let doc = Document::parse(b"alpha\n").unwrap();
        let mut sections = Sections::new(1);
        assert_eq!(sections.advance(1, &doc.items[0]).unwrap(), None);
        assert_eq!(sections.advance(3, &doc.items[0]).unwrap(), Some(1));
        assert!(sections.advance(2, &doc.items[0]).is_err());
    }

    #[test]
    fn strict_and_lenient() {
        let doc = Document::parse(b"unrecognized-line 1\n").unwrap();
        let mut lenient = Diagnostics::new(&ParseOptions::lenient());
        lenient.unrecognized(&doc.items[0]).unwrap();
        assert_eq!(lenient.into_lines(), vec!["unrecognized-line 1"]);
        let mut strict = Diagnostics::new(&ParseOptions::strict());
        assert!(strict.unrecognized(&doc.items[0]).is_err());
    }
}
