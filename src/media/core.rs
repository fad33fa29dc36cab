use std::fmt;

/// RFC 7230 `tchar`: the bytes allowed in types, subtypes, parameter names,
/// and unquoted parameter values.
#[inline]
fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

/// RFC 7230 `qdtext` (plus `obs-text`): the bytes allowed inside a quoted
/// parameter value without escaping.
#[inline]
fn is_qdtext(b: u8) -> bool {
    matches!(b, b'\t' | b' ' | 0x21 | 0x23..=0x5B | 0x5D..=0x7E | 0x80..=0xFF)
}

/// Structured parse failure for a media range header value.
///
/// Mid-input failures carry the byte position and the byte itself so the
/// exact failure can be reconstructed for logging and tests; end-of-input
/// failures carry a named category instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidHeaderFormat {
    /// A byte that is not valid in the current grammar position.
    UnexpectedByte {
        /// Zero-based byte offset of the offending byte.
        position: usize,
        /// The offending byte value.
        byte: u8,
    },
    /// Input ended before a complete `type/subtype` pair.
    NoSubtype,
    /// Input ended in trailing whitespace after a complete element.
    EndedWithWhitespace,
    /// Input ended in the middle of a parameter name or value.
    UnterminatedParameter,
}

impl fmt::Display for InvalidHeaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidHeaderFormat::UnexpectedByte { position, byte } => {
                write!(
                    f,
                    "unexpected byte 0x{byte:02X} at position {position} in media range"
                )
            }
            InvalidHeaderFormat::NoSubtype => write!(f, "media range ended without a subtype"),
            InvalidHeaderFormat::EndedWithWhitespace => {
                write!(f, "media range ended with whitespace")
            }
            InvalidHeaderFormat::UnterminatedParameter => {
                write!(f, "media range ended inside a parameter")
            }
        }
    }
}

impl std::error::Error for InvalidHeaderFormat {}

/// One parsed media range: `type/subtype` plus its parameters.
///
/// Type, subtype, and parameter names are normalized to ASCII lowercase at
/// parse time; parameter values keep their case. Parameters preserve
/// declaration order and duplicate names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRange {
    /// Primary type, possibly `*`.
    pub main_type: String,
    /// Subtype, possibly `*`.
    pub subtype: String,
    /// Parameters in declaration order, duplicates kept.
    pub parameters: Vec<(String, String)>,
}

impl MediaRange {
    /// Whether this range covers the (lowercased) candidate media type.
    ///
    /// Tries the three prefix forms from most to least general: a full
    /// wildcard range covers anything, `type/*` covers any candidate starting
    /// with `type/`, and a concrete range requires the candidate to equal
    /// `type/subtype` or continue with space, tab, or `;`.
    fn covers(&self, candidate: &str) -> bool {
        if self.main_type == "*" {
            return true;
        }
        if self.subtype == "*" {
            let mut prefix = String::with_capacity(self.main_type.len() + 1);
            prefix.push_str(&self.main_type);
            prefix.push('/');
            return candidate.len() > prefix.len() && candidate.starts_with(&prefix);
        }
        let mut prefix =
            String::with_capacity(self.main_type.len() + self.subtype.len() + 1);
        prefix.push_str(&self.main_type);
        prefix.push('/');
        prefix.push_str(&self.subtype);
        match candidate.strip_prefix(prefix.as_str()) {
            Some("") => true,
            Some(rest) => matches!(rest.as_bytes()[0], b' ' | b'\t' | b';'),
            None => false,
        }
    }
}

impl fmt::Display for MediaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}

/// Parser states. One state per grammar position; every byte moves the
/// machine exactly one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    TypeHead,
    TypeTail,
    SubtypeHead,
    SubtypeTail,
    SpaceAfterSubtype,
    SpaceBeforeParamName,
    ParamNameTail,
    ParamValueHead,
    UnquotedValueTail,
    QuotedValueBody,
    QuotedValueEscapedSymbol,
    QuotedValueTail,
    SpaceAfterParamValue,
}

/// An ordered list of parsed media ranges, as carried by an `Accept` header
/// or a consumer's declared range.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaRangeList {
    ranges: Vec<MediaRange>,
}

/// Accumulators threaded through the state machine.
#[derive(Default)]
struct Accumulator {
    main_type: String,
    subtype: String,
    param_name: String,
    param_value: String,
    parameters: Vec<(String, String)>,
    ranges: Vec<MediaRange>,
}

impl Accumulator {
    /// Commit the pending parameter name/value pair and reset both buffers.
    fn complete_parameter(&mut self) {
        self.parameters.push((
            std::mem::take(&mut self.param_name),
            std::mem::take(&mut self.param_value),
        ));
    }

    /// Commit the accumulated range and reset for the next list element.
    fn complete_range(&mut self) {
        self.ranges.push(MediaRange {
            main_type: std::mem::take(&mut self.main_type),
            subtype: std::mem::take(&mut self.subtype),
            parameters: std::mem::take(&mut self.parameters),
        });
    }
}

impl MediaRangeList {
    /// Parse a comma-separated media range list.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHeaderFormat`] with the exact byte position for
    /// mid-input failures, or a named category for end-of-input failures.
    pub fn parse(header: &str) -> Result<Self, InvalidHeaderFormat> {
        use State::*;

        let mut state = TypeHead;
        let mut acc = Accumulator::default();

        for (position, &byte) in header.as_bytes().iter().enumerate() {
            let unexpected = InvalidHeaderFormat::UnexpectedByte { position, byte };
            state = match (state, byte) {
                (TypeHead, b' ' | b'\t') => TypeHead,
                (TypeHead, b) if is_tchar(b) => {
                    acc.main_type.push(b.to_ascii_lowercase() as char);
                    TypeTail
                }
                (TypeTail, b'/') => SubtypeHead,
                (TypeTail, b) if is_tchar(b) => {
                    acc.main_type.push(b.to_ascii_lowercase() as char);
                    TypeTail
                }
                (SubtypeHead, b) if is_tchar(b) => {
                    acc.subtype.push(b.to_ascii_lowercase() as char);
                    SubtypeTail
                }
                (SubtypeTail, b) if is_tchar(b) => {
                    acc.subtype.push(b.to_ascii_lowercase() as char);
                    SubtypeTail
                }
                (SubtypeTail, b';') => SpaceBeforeParamName,
                (SubtypeTail, b',') => {
                    acc.complete_range();
                    TypeHead
                }
                (SubtypeTail, b' ' | b'\t') => SpaceAfterSubtype,
                (SpaceAfterSubtype, b' ' | b'\t') => SpaceAfterSubtype,
                (SpaceAfterSubtype, b';') => SpaceBeforeParamName,
                (SpaceAfterSubtype, b',') => {
                    acc.complete_range();
                    TypeHead
                }
                (SpaceBeforeParamName, b' ' | b'\t') => SpaceBeforeParamName,
                (SpaceBeforeParamName, b) if is_tchar(b) => {
                    acc.param_name.push(b.to_ascii_lowercase() as char);
                    ParamNameTail
                }
                (ParamNameTail, b'=') => ParamValueHead,
                (ParamNameTail, b) if is_tchar(b) => {
                    acc.param_name.push(b.to_ascii_lowercase() as char);
                    ParamNameTail
                }
                (ParamValueHead, b'"') => QuotedValueBody,
                (ParamValueHead, b) if is_tchar(b) => {
                    acc.param_value.push(b as char);
                    UnquotedValueTail
                }
                (UnquotedValueTail, b) if is_tchar(b) => {
                    acc.param_value.push(b as char);
                    UnquotedValueTail
                }
                (UnquotedValueTail, b';') => {
                    acc.complete_parameter();
                    SpaceBeforeParamName
                }
                (UnquotedValueTail, b',') => {
                    acc.complete_parameter();
                    acc.complete_range();
                    TypeHead
                }
                (UnquotedValueTail, b' ' | b'\t') => {
                    acc.complete_parameter();
                    SpaceAfterParamValue
                }
                (QuotedValueBody, b'\\') => QuotedValueEscapedSymbol,
                (QuotedValueBody, b'"') => QuotedValueTail,
                (QuotedValueBody, b) if is_qdtext(b) => {
                    acc.param_value.push(b as char);
                    QuotedValueBody
                }
                (QuotedValueEscapedSymbol, b @ (b'"' | b'\\')) => {
                    acc.param_value.push(b as char);
                    QuotedValueBody
                }
                (QuotedValueTail, b';') => {
                    acc.complete_parameter();
                    SpaceBeforeParamName
                }
                (QuotedValueTail, b',') => {
                    acc.complete_parameter();
                    acc.complete_range();
                    TypeHead
                }
                (QuotedValueTail, b' ' | b'\t') => {
                    acc.complete_parameter();
                    SpaceAfterParamValue
                }
                (SpaceAfterParamValue, b' ' | b'\t') => SpaceAfterParamValue,
                (SpaceAfterParamValue, b';') => SpaceBeforeParamName,
                (SpaceAfterParamValue, b',') => {
                    acc.complete_range();
                    TypeHead
                }
                _ => return Err(unexpected),
            };
        }

        match state {
            SubtypeTail => acc.complete_range(),
            UnquotedValueTail | QuotedValueTail => {
                acc.complete_parameter();
                acc.complete_range();
            }
            TypeHead | TypeTail | SubtypeHead => return Err(InvalidHeaderFormat::NoSubtype),
            SpaceAfterSubtype | SpaceAfterParamValue => {
                return Err(InvalidHeaderFormat::EndedWithWhitespace)
            }
            SpaceBeforeParamName
            | ParamNameTail
            | ParamValueHead
            | QuotedValueBody
            | QuotedValueEscapedSymbol => {
                return Err(InvalidHeaderFormat::UnterminatedParameter)
            }
        }

        Ok(Self { ranges: acc.ranges })
    }

    /// The parsed ranges, in declaration order.
    #[must_use]
    pub fn ranges(&self) -> &[MediaRange] {
        &self.ranges
    }

    /// Whether any parsed range covers the candidate media type.
    ///
    /// The candidate is a concrete `type/subtype`, optionally followed by
    /// `;parameters` (a raw `Content-Type` value qualifies as-is), or a
    /// declared wildcard form such as `application/*` when a consumer's range
    /// is checked against a parsed `Content-Type`. Comparison is ASCII
    /// case-insensitive.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let lowered = candidate.to_ascii_lowercase();
        self.ranges.iter().any(|range| range.covers(&lowered))
    }
}
