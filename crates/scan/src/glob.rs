//! Glob patterns over object keys.
//!
//! Supported syntax: `*` (any run within one path segment), `**` (any run
//! across segments), `?` (one character within a segment), `[abc]`,
//! `[a-z]`, `[!abc]`/`[^abc]`, and brace alternation `{a,b}` which may be
//! nested and may hold numeric ranges (`{1..3}`, `{01..10}`).

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use regex::Regex;

/// Upper bound on the number of patterns one brace expression may produce.
const MAX_EXPANSIONS: usize = 10_000;

const WILDCARDS: [char; 4] = ['*', '?', '[', '{'];

pub fn has_globs(path: &str) -> bool {
    path.contains(WILDCARDS)
}

/// Expand brace alternation into the list of brace-free patterns it stands
/// for, in order of appearance.
///
/// ```
/// use strata_scan::expand_braces;
///
/// let expanded = expand_braces("logs/{a,b{1..2}}.csv").unwrap();
/// assert_eq!(expanded, ["logs/a.csv", "logs/b1.csv", "logs/b2.csv"]);
/// ```
pub fn expand_braces(pattern: &str) -> Result<Vec<String>> {
    let mut expanded = Vec::new();
    expand_into(pattern, pattern, &mut expanded)?;
    Ok(expanded)
}

fn expand_into(original: &str, pattern: &str, out: &mut Vec<String>) -> Result<()> {
    let Some(open) = pattern.find('{') else {
        if out.len() >= MAX_EXPANSIONS {
            exn::bail!(ErrorKind::InvalidGlob(format!("{original} expands to too many patterns")));
        }
        out.push(pattern.to_string());
        return Ok(());
    };
    let close = matching_brace(pattern, open)
        .ok_or_raise(|| ErrorKind::InvalidGlob(format!("unclosed brace in {original}")))?;
    let (prefix, content, suffix) = (&pattern[..open], &pattern[open + 1..close], &pattern[close + 1..]);
    let alternatives = match numeric_range(original, content)? {
        Some(range) => range,
        None => split_alternatives(content),
    };
    for alternative in alternatives {
        expand_into(original, &format!("{prefix}{alternative}{suffix}"), out)?;
    }
    Ok(())
}

fn matching_brace(pattern: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in pattern.char_indices().skip_while(|(idx, _)| *idx < open) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            },
            _ => {},
        }
    }
    None
}

/// Split brace content on commas that are not nested in inner braces.
fn split_alternatives(content: &str) -> Vec<String> {
    let mut alternatives = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in content.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                alternatives.push(content[start..idx].to_string());
                start = idx + 1;
            },
            _ => {},
        }
    }
    alternatives.push(content[start..].to_string());
    alternatives
}

/// `1..3` or `01..10`. Bounds may be given in either order; a leading zero on
/// either bound pads every number to the longer bound's width.
fn numeric_range(original: &str, content: &str) -> Result<Option<Vec<String>>> {
    let Some((start, end)) = content.split_once("..") else {
        return Ok(None);
    };
    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_number(start) || !is_number(end) {
        return Ok(None);
    }
    let parse = |s: &str| s.parse::<u64>().or_raise(|| ErrorKind::InvalidGlob(format!("range bound {s} in {original}")));
    let (a, b) = (parse(start)?, parse(end)?);
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    if high - low >= MAX_EXPANSIONS as u64 {
        exn::bail!(ErrorKind::InvalidGlob(format!("range {content} in {original} is too large")));
    }
    let padded = |s: &str| s.len() > 1 && s.starts_with('0');
    let width = if padded(start) || padded(end) { start.len().max(end.len()) } else { 0 };
    Ok(Some((low..=high).map(|n| format!("{n:0width$}")).collect()))
}

/// Translate one brace-free glob into an unanchored regex fragment.
fn translate(pattern: &str) -> Result<String> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            },
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let negated = matches!(chars.peek(), Some('!' | '^'));
                if negated {
                    chars.next();
                }
                let mut class = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    class.push(c);
                }
                if !closed || class.is_empty() {
                    exn::bail!(ErrorKind::InvalidGlob(format!("unterminated character class in {pattern}")));
                }
                out.push_str(if negated { "[^/" } else { "[" });
                for c in class.chars() {
                    if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push(']');
            },
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    Ok(out)
}

/// Compile one brace-free glob into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let body = translate(pattern)?;
    Regex::new(&format!("(?s)^{body}$")).or_raise(|| ErrorKind::InvalidGlob(pattern.to_string()))
}

/// The longest literal directory prefix of a pattern: everything up to the
/// last `/` before the first wildcard. Listing this prefix is guaranteed to
/// return every key the pattern can match.
pub(crate) fn listing_prefix(pattern: &str) -> &str {
    let pattern = pattern.strip_prefix('/').unwrap_or(pattern);
    let first_wildcard = pattern.find(WILDCARDS).unwrap_or(pattern.len());
    match pattern[..first_wildcard].rfind('/') {
        Some(idx) => &pattern[..=idx],
        None => "",
    }
}

/// A full glob (braces included) compiled into one regex.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    pattern: String,
    regex: Regex,
}

impl GlobMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let alternatives = expand_braces(pattern)?
            .iter()
            .map(|expanded| translate(expanded))
            .collect::<Result<Vec<_>>>()?;
        let regex = Regex::new(&format!("(?s)^(?:{})$", alternatives.join("|")))
            .or_raise(|| ErrorKind::InvalidGlob(pattern.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
