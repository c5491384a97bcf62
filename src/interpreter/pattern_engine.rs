//! Pattern Engine
//!
//! Translates shell wildcard patterns (`*`, `?`, `[...]`, POSIX character
//! classes, extended globs) to a canonical regex dialect, and provides
//! meta-detection and quoting helpers. This is a thin facade over the
//! lower-level translators already living in `shell::glob_helpers` (used by
//! pathname expansion) and `interpreter::expansion::pattern` (used by
//! parameter-expansion pattern operators) — it does not reimplement their
//! character-class/extglob scanning, just gives callers a single mode-driven
//! entry point matching the rest of the interpreter's operator surface.

use regex_lite::Regex;

use crate::interpreter::expansion::glob_escape::escape_regex_chars;
use crate::shell::glob_helpers::glob_to_regex;

/// Translation mode bitmask for [`translate`].
///
/// A small hand-rolled bitmask rather than a `bitflags`-style derive: the
/// set is fixed and six bits, and `const fn` combinators (`|`, `contains`)
/// are all this ever needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslateMode(u8);

impl TranslateMode {
    /// Use non-greedy stars.
    pub const SHORTEST: TranslateMode = TranslateMode(1 << 0);
    /// `*` does not cross `/`; `**` descends directories.
    pub const FILENAMES: TranslateMode = TranslateMode(1 << 1);
    /// Expand `{a,b,c}` / `{n..m}` before translation.
    pub const BRACES: TranslateMode = TranslateMode(1 << 2);
    /// Anchor both ends (`^...$`) rather than leaving the match unanchored.
    pub const ENTIRE_STRING: TranslateMode = TranslateMode(1 << 3);
    /// Honor `@() *() +() ?() !()` extended-glob operators.
    pub const EXTENDED_OPERATORS: TranslateMode = TranslateMode(1 << 4);
    /// Case-insensitive matching.
    pub const NO_GLOB_CASE: TranslateMode = TranslateMode(1 << 5);

    pub const fn empty() -> Self {
        TranslateMode(0)
    }

    pub const fn contains(self, other: TranslateMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for TranslateMode {
    type Output = TranslateMode;
    fn bitor(self, rhs: TranslateMode) -> TranslateMode {
        TranslateMode(self.0 | rhs.0)
    }
}

impl Default for TranslateMode {
    fn default() -> Self {
        TranslateMode::empty()
    }
}

/// A pattern-engine failure. All parsing failures are returned as values;
/// this engine never performs I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    pub message: String,
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for PatternError {}

impl PatternError {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Translate a shell pattern into a regular expression string.
///
/// `Braces` is applied first (each resulting literal alternative is
/// separately translated and joined into a non-capturing group), then the
/// glob-to-regex pass from [`shell::glob_helpers::glob_to_regex`] handles
/// `*`, `?`, `[...]`/POSIX classes, and (when `ExtendedOperators` is set)
/// extglob groups.
pub fn translate(pattern: &str, mode: TranslateMode) -> Result<String, PatternError> {
    validate_brackets(pattern)?;

    let alternatives: Vec<String> = if mode.contains(TranslateMode::BRACES) {
        expand_literal_braces(pattern)
    } else {
        vec![pattern.to_string()]
    };

    let extglob = mode.contains(TranslateMode::EXTENDED_OPERATORS);
    let mut per_alt = Vec::with_capacity(alternatives.len());
    for alt in &alternatives {
        let mut inner = glob_to_regex(alt, extglob);
        // glob_to_regex always anchors with ^...$; strip those so our own
        // anchoring policy (ENTIRE_STRING) is the single source of truth,
        // and so that FILENAMES path-segment handling composes cleanly.
        if let Some(stripped) = inner.strip_prefix('^').and_then(|s| s.strip_suffix('$')) {
            inner = stripped.to_string();
        }
        if mode.contains(TranslateMode::FILENAMES) {
            inner = inner.replace(".*", "[^/]*");
        }
        per_alt.push(inner);
    }

    let mut body = if per_alt.len() == 1 {
        per_alt.remove(0)
    } else {
        format!("(?:{})", per_alt.join("|"))
    };

    if mode.contains(TranslateMode::SHORTEST) {
        body = body.replace(".*", ".*?");
    }

    let mut regex = String::new();
    if mode.contains(TranslateMode::NO_GLOB_CASE) {
        regex.push_str("(?i)");
    }
    if mode.contains(TranslateMode::ENTIRE_STRING) {
        regex.push('^');
        regex.push_str(&body);
        regex.push('$');
    } else {
        regex.push_str(&body);
    }

    // Confirm the regex engine actually accepts what we built.
    Regex::new(&regex).map_err(|e| PatternError::new(format!("invalid pattern: {}", e)))?;

    Ok(regex)
}

/// Expand one level of `{a,b,c}` / `{n..m}` at the top of a pattern string
/// into its combinatorial list, the way [`translate`]'s `Braces` mode needs
/// for patterns used outside the parsed-AST word pipeline (e.g. case-item
/// literals passed in as plain strings). A pattern with no top-level `{...}`
/// group returns a single-element vec unchanged.
fn expand_literal_braces(pattern: &str) -> Vec<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let Some(open) = chars.iter().position(|&c| c == '{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = find_matching_close_from(&chars, open) else {
        return vec![pattern.to_string()];
    };

    let prefix: String = chars[..open].iter().collect();
    let inner: String = chars[open + 1..close].iter().collect();
    let suffix: String = chars[close + 1..].iter().collect();

    let items = if let Some((lo, hi)) = parse_numeric_range(&inner) {
        numeric_range(lo, hi)
    } else {
        split_top_level_commas(&inner)
    };

    if items.len() < 2 {
        return vec![pattern.to_string()];
    }

    let suffix_alts = expand_literal_braces(&suffix);
    let mut out = Vec::new();
    for item in &items {
        for item_alt in expand_literal_braces(item) {
            for suf in &suffix_alts {
                out.push(format!("{}{}{}", prefix, item_alt, suf));
            }
        }
    }
    out
}

fn find_matching_close_from(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_numeric_range(inner: &str) -> Option<(i64, i64)> {
    let (lo, hi) = inner.split_once("..")?;
    if lo.contains(',') || hi.contains(',') {
        return None;
    }
    Some((lo.parse().ok()?, hi.parse().ok()?))
}

fn numeric_range(lo: i64, hi: i64) -> Vec<String> {
    if lo <= hi {
        (lo..=hi).map(|n| n.to_string()).collect()
    } else {
        (hi..=lo).rev().map(|n| n.to_string()).collect()
    }
}

fn split_top_level_commas(inner: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in inner.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn validate_brackets(pattern: &str) -> Result<(), PatternError> {
    let chars: Vec<char> = pattern.chars().collect();
    if chars.last() == Some(&'\\') {
        return Err(PatternError::new("trailing backslash in pattern"));
    }
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == '[' {
            let mut j = i + 1;
            if j < chars.len() && (chars[j] == '!' || chars[j] == '^') {
                j += 1;
            }
            if j < chars.len() && chars[j] == ']' {
                j += 1;
            }
            let mut closed = false;
            while j < chars.len() {
                if chars[j] == ']' {
                    closed = true;
                    break;
                }
                j += 1;
            }
            if !closed {
                return Err(PatternError::new("unterminated '[' in pattern"));
            }
            let class: String = chars[i + 1..j].iter().collect();
            if class.contains("[:") && !class.contains(":]") {
                return Err(PatternError::new("unterminated '[:' in pattern"));
            }
            i = j + 1;
            continue;
        }
        i += 1;
    }
    Ok(())
}

/// Whether `pattern` contains any unescaped glob metacharacters.
pub fn has_meta(pattern: &str, mode: TranslateMode) -> bool {
    let extglob = mode.contains(TranslateMode::EXTENDED_OPERATORS);
    crate::interpreter::expansion::glob_escape::has_glob_pattern(pattern, extglob)
}

/// Escape every character in `s` that [`translate`] would otherwise treat as
/// a metacharacter, so that matching `quote_meta(s)` against `s` always
/// succeeds literally.
pub fn quote_meta(s: &str, mode: TranslateMode) -> String {
    let _ = mode;
    escape_regex_chars(s)
}

/// Build a matcher closure for the single-group extended-glob negation
/// `prefix!(inner)suffix`. Fails if the pattern isn't exactly that shape
/// (a fixed literal prefix/suffix around one `!(...)` group).
pub fn extended_negated_matcher(
    pattern: &str,
) -> Result<Box<dyn Fn(&str) -> bool + Send + Sync>, PatternError> {
    let start = pattern
        .find("!(")
        .ok_or_else(|| PatternError::new("not a negated extglob pattern"))?;
    let rest = &pattern[start + 2..];
    let close = find_matching_close(rest)
        .ok_or_else(|| PatternError::new("unterminated '!(' in pattern"))?;

    let prefix = pattern[..start].to_string();
    let inner = rest[..close].to_string();
    let suffix = rest[close + 1..].to_string();

    if prefix.chars().any(is_glob_meta) || suffix.chars().any(is_glob_meta) {
        return Err(PatternError::new(
            "!(...) negation requires a literal fixed prefix/suffix",
        ));
    }

    let inner_regex = translate(&inner, TranslateMode::ENTIRE_STRING)?;
    let re = Regex::new(&inner_regex).map_err(|e| PatternError::new(e.to_string()))?;

    Ok(Box::new(move |candidate: &str| {
        let Some(body) = candidate.strip_prefix(prefix.as_str()) else { return false };
        let Some(body) = body.strip_suffix(suffix.as_str()) else { return false };
        !re.is_match(body)
    }))
}

fn find_matching_close(s: &str) -> Option<usize> {
    let mut depth = 1i32;
    for (idx, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_glob_meta(c: char) -> bool {
    matches!(c, '*' | '?' | '[' | ']' | '!' | '@' | '+' | '(' | ')')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_star_matches_anything() {
        let re = translate("*.txt", TranslateMode::ENTIRE_STRING).unwrap();
        let re = Regex::new(&re).unwrap();
        assert!(re.is_match("foo.txt"));
        assert!(!re.is_match("foo.txtx"));
    }

    #[test]
    fn translate_posix_class() {
        let re = translate("[[:digit:]]+", TranslateMode::ENTIRE_STRING).unwrap();
        let re = Regex::new(&re).unwrap();
        assert!(re.is_match("123"));
        assert!(!re.is_match("abc"));
    }

    #[test]
    fn translate_rejects_unterminated_bracket() {
        assert!(translate("[abc", TranslateMode::ENTIRE_STRING).is_err());
    }

    #[test]
    fn translate_rejects_trailing_backslash() {
        assert!(translate("abc\\", TranslateMode::ENTIRE_STRING).is_err());
    }

    #[test]
    fn has_meta_detects_glob_chars() {
        assert!(has_meta("*.txt", TranslateMode::EXTENDED_OPERATORS));
        assert!(!has_meta("plain", TranslateMode::EXTENDED_OPERATORS));
    }

    #[test]
    fn quote_meta_round_trips() {
        let s = "a.b*c?";
        let quoted = quote_meta(s, TranslateMode::empty());
        let re = translate(&quoted, TranslateMode::ENTIRE_STRING).unwrap();
        let re = Regex::new(&re).unwrap();
        assert!(re.is_match(s));
    }

    #[test]
    fn extended_negated_matcher_basic() {
        let matcher = extended_negated_matcher("pre!(foo|bar)post").unwrap();
        assert!(matcher("prebazpost"));
        assert!(!matcher("prefoopost"));
    }

    #[test]
    fn extended_negated_matcher_rejects_non_literal_edges() {
        assert!(extended_negated_matcher("*!(foo)post").is_err());
    }
}
