//! Text sanitizer applied to every piece of model- or narration-derived text before it is
//! placed into a scene program.
//!
//! Output is always non-empty, bounded, and drawn from the profile's allowed ASCII subset,
//! so it never carries a quote, backslash, or control character.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;

pub const DISPLAY_MAX_CHARS: usize = 120;
pub const MATH_MAX_CHARS: usize = 80;

fn whitespace_regex() -> Result<&'static Regex> {
    static WS_RE: OnceCell<Regex> = OnceCell::new();
    WS_RE.get_or_try_init(|| Regex::new(r"\s+").context("failed to compile whitespace regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// On-screen prose: titles, labels, annotations.
    Display,
    /// Expression text rendered by the math typesetter.
    Math,
}

impl Profile {
    pub fn max_chars(self) -> usize {
        match self {
            Profile::Display => DISPLAY_MAX_CHARS,
            Profile::Math => MATH_MAX_CHARS,
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            Profile::Display => "Content",
            Profile::Math => "Step",
        }
    }

    fn allows(self, c: char) -> bool {
        if c.is_ascii_alphanumeric() || c == ' ' {
            return true;
        }
        match self {
            Profile::Display => matches!(
                c,
                '+' | '-' | '=' | '(' | ')' | '[' | ']' | '{' | '}' | '/' | '*' | '.' | ','
                    | '!' | '?' | ':' | ';' | '%' | '^' | '<' | '>'
            ),
            Profile::Math => matches!(
                c,
                '+' | '-' | '=' | '(' | ')' | '[' | ']' | '{' | '}' | '/' | '*' | '.' | ','
                    | '^' | '_' | '<' | '>' | '|' | '!'
            ),
        }
    }
}

/// Common math glyphs the model likes to emit, spelled with allowed ASCII.
fn transliterate(c: char) -> Option<&'static str> {
    Some(match c {
        '²' => "^2",
        '³' => "^3",
        '×' | '·' => "*",
        '÷' => "/",
        '−' | '–' | '—' => "-",
        '≤' => "<=",
        '≥' => ">=",
        '≠' => "!=",
        'π' => "pi",
        '√' => "sqrt",
        _ => return None,
    })
}

/// Sanitizes `raw` with the profile's default length cap.
pub fn sanitize(raw: &str, profile: Profile) -> String {
    sanitize_to(raw, profile, profile.max_chars())
}

fn collapse_whitespace(text: &str) -> String {
    match whitespace_regex() {
        Ok(re) => re.replace_all(text, " ").trim().to_string(),
        Err(_) => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

fn is_script_marker(c: char) -> bool {
    c == '^' || c == '_'
}

/// Drops unmatched braces, empty `{}` groups and `^`/`_` markers with nothing to attach
/// to, so the typesetter always receives a well-formed expression.
fn balance_math(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut keep = vec![true; chars.len()];
    let mut open = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        match c {
            '{' => open.push(i),
            '}' => {
                if open.pop().is_none() {
                    keep[i] = false;
                }
            }
            _ => {}
        }
    }
    for i in open {
        keep[i] = false;
    }

    let mut out: Vec<char> = chars
        .into_iter()
        .zip(keep)
        .filter_map(|(c, kept)| kept.then_some(c))
        .collect();

    loop {
        let before = out.len();
        let mut next = Vec::with_capacity(out.len());
        let mut i = 0;
        while i < out.len() {
            let c = out[i];
            let follower = out.get(i + 1).copied();
            if c == '{' && follower == Some('}') {
                i += 2;
                continue;
            }
            let dangling = match follower {
                None => true,
                Some(f) => f == ' ' || f == '}' || is_script_marker(f),
            };
            if is_script_marker(c) && dangling {
                i += 1;
                continue;
            }
            next.push(c);
            i += 1;
        }
        out = next;
        if out.len() == before {
            break;
        }
    }
    out.into_iter().collect()
}

/// Sanitizes `raw`, truncating the result to at most `max_chars` characters.
pub fn sanitize_to(raw: &str, profile: Profile, max_chars: usize) -> String {
    let max_chars = max_chars.max(1);

    let mut mapped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if profile.allows(c) {
            mapped.push(c);
        } else if let Some(replacement) = transliterate(c) {
            mapped.push_str(replacement);
        } else {
            mapped.push(' ');
        }
    }

    let collapsed = collapse_whitespace(&mapped);
    let truncated: String = collapsed.chars().take(max_chars).collect();
    let result = match profile {
        // Truncation can cut a group in half, so balancing runs last.
        Profile::Math => collapse_whitespace(&balance_math(&truncated)),
        Profile::Display => truncated.trim_end().to_string(),
    };

    if result.is_empty() {
        return profile.placeholder().chars().take(max_chars).collect();
    }
    result
}

/// Shortens narration for on-screen excerpts on a word boundary.
pub fn excerpt(raw: &str, max_words: usize) -> String {
    let words: Vec<&str> = raw.split_whitespace().take(max_words).collect();
    sanitize(&words.join(" "), Profile::Display)
}
