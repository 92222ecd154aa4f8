//! Parser configuration

/// Options controlling how documents are parsed.
///
/// The only knob is what happens to lines whose keyword is not part of the
/// document's grammar. Recognized keywords are always validated fully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Fail on the first unrecognized line instead of collecting it
    pub fail_on_unrecognized: bool,
}

impl ParseOptions {
    /// Fail on unrecognized lines
    pub fn strict() -> ParseOptions {
        ParseOptions {
            fail_on_unrecognized: true,
        }
    }

    /// Collect unrecognized lines on the parsed document (the default)
    pub fn lenient() -> ParseOptions {
        ParseOptions {
            fail_on_unrecognized: false,
        }
    }

    pub fn fail_on_unrecognized(mut self, fail: bool) -> ParseOptions {
        self.fail_on_unrecognized = fail;
        self
    }
}
