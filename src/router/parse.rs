use serde::{Deserialize, Serialize};
use std::fmt;

/// One piece of a route pattern variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    /// Literal text, matched and emitted as-is.
    Literal(String),
    /// A captured variable, optionally constrained by a regex mask.
    Variable {
        /// Capture name.
        name: String,
        /// Regex the value must fully match; `None` means any non-empty
        /// value without `/`.
        mask: Option<String>,
    },
}

/// Pattern syntax failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// `[` / `]` pairs do not balance.
    UnbalancedBrackets,
    /// Optional parts must sit at the end of the pattern.
    OptionalNotTrailing,
    /// An optional part is empty (`[]`).
    EmptyOptional,
    /// `{` / `}` pairs do not balance.
    UnbalancedBraces,
    /// A variable has no name (`{}` or `{:mask}`).
    EmptyVariableName,
    /// A variable name contains a character outside `[A-Za-z0-9_]`.
    InvalidVariableName {
        /// The offending name.
        name: String,
    },
    /// The same variable appears twice in one variant.
    DuplicateVariable {
        /// The repeated name.
        name: String,
    },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::UnbalancedBrackets => write!(f, "unbalanced optional brackets"),
            PatternError::OptionalNotTrailing => {
                write!(f, "optional segments are only allowed at the end of a pattern")
            }
            PatternError::EmptyOptional => write!(f, "empty optional segment"),
            PatternError::UnbalancedBraces => write!(f, "unbalanced variable braces"),
            PatternError::EmptyVariableName => write!(f, "variable has no name"),
            PatternError::InvalidVariableName { name } => {
                write!(f, "invalid variable name '{name}'")
            }
            PatternError::DuplicateVariable { name } => {
                write!(f, "variable '{name}' appears more than once")
            }
        }
    }
}

impl std::error::Error for PatternError {}

/// Split a pattern into its optional-nesting parts.
///
/// `/a[/b[/c]]` yields `["/a", "/b", "/c"]`. Square brackets inside variable
/// masks (`{id:[0-9]+}`) are ignored. Text after a closing bracket is
/// rejected: optional parts only nest at the tail.
fn split_optional_parts(pattern: &str) -> Result<Vec<String>, PatternError> {
    let mut parts = vec![String::new()];
    let mut depth = 0usize;
    let mut brace_depth = 0usize;
    let mut closed = 0usize;

    for c in pattern.chars() {
        match c {
            '{' if closed == 0 => {
                brace_depth += 1;
                parts[depth].push(c);
            }
            '}' if closed == 0 && brace_depth > 0 => {
                brace_depth -= 1;
                parts[depth].push(c);
            }
            '[' if brace_depth == 0 => {
                if closed > 0 {
                    return Err(PatternError::OptionalNotTrailing);
                }
                depth += 1;
                parts.push(String::new());
            }
            ']' if brace_depth == 0 => {
                if depth == 0 || closed >= depth {
                    return Err(PatternError::UnbalancedBrackets);
                }
                closed += 1;
            }
            _ => {
                if closed > 0 {
                    return Err(PatternError::OptionalNotTrailing);
                }
                parts[depth].push(c);
            }
        }
    }

    if closed != depth {
        return Err(PatternError::UnbalancedBrackets);
    }
    if parts.iter().skip(1).any(String::is_empty) {
        return Err(PatternError::EmptyOptional);
    }
    Ok(parts)
}

/// Parse one variant string into segments.
fn parse_segments(variant: &str) -> Result<Vec<Segment>, PatternError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = variant.chars();

    while let Some(c) = chars.next() {
        if c != '{' {
            literal.push(c);
            continue;
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        // Collect up to the matching brace; masks may contain quantifier
        // braces ({2,4}), so the depth counter is required.
        let mut body = String::new();
        let mut depth = 1usize;
        for inner in chars.by_ref() {
            match inner {
                '{' => {
                    depth += 1;
                    body.push(inner);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    body.push(inner);
                }
                _ => body.push(inner),
            }
        }
        if depth != 0 {
            return Err(PatternError::UnbalancedBraces);
        }
        let (name, mask) = match body.split_once(':') {
            Some((name, mask)) => (name.to_string(), Some(mask.to_string())),
            None => (body, None),
        };
        if name.is_empty() {
            return Err(PatternError::EmptyVariableName);
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(PatternError::InvalidVariableName { name });
        }
        segments.push(Segment::Variable { name, mask });
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    let mut names: Vec<&str> = Vec::new();
    for segment in &segments {
        if let Segment::Variable { name, .. } = segment {
            if names.contains(&name.as_str()) {
                return Err(PatternError::DuplicateVariable { name: name.clone() });
            }
            names.push(name);
        }
    }
    Ok(segments)
}

/// Parse a route pattern into its segment-list variants, one per optional
/// nesting level, ordered from fewest segments to most.
pub(crate) fn parse_pattern(pattern: &str) -> Result<Vec<Vec<Segment>>, PatternError> {
    let parts = split_optional_parts(pattern)?;
    let mut variants = Vec::with_capacity(parts.len());
    let mut expanded = String::new();
    for part in &parts {
        expanded.push_str(part);
        variants.push(parse_segments(&expanded)?);
    }
    Ok(variants)
}
