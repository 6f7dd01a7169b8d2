//! Route patterns in path-to-regexp syntax.
//!
//! | Syntax          | Meaning                                              |
//! |-----------------|------------------------------------------------------|
//! | `/users`        | literal text                                         |
//! | `/users/:id`    | named segment, anything up to the next `/`           |
//! | `/:id(\d+)`     | named segment with a custom expression               |
//! | `(.*)`          | unnamed group with a custom expression               |
//! | `/files/*`      | anything, slashes included                           |
//! | `/:a?`, `/:a+`, `/:a*` | optional, one-or-more, zero-or-more segments  |
//! | `\(`            | escaped literal                                      |
//!
//! A `/` or `.` directly before a parameter belongs to it, so `/users/:id?`
//! matches both `/users` and `/users/7`. Matching is case-sensitive, exact
//! (anchored at both ends), and strict: a trailing slash is never implied.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("unbalanced group starting at byte {0}")]
    UnbalancedGroup(usize),

    #[error("empty group at byte {0}")]
    EmptyGroup(usize),

    #[error("dangling escape at end of pattern")]
    DanglingEscape,

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Param {
        prefix: Option<char>,
        expr: Option<String>,
        modifier: Option<char>,
    },
}

/// A compiled route pattern.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::RoutePattern;
///
/// let pattern = RoutePattern::compile("/users/:id").unwrap();
/// assert!(pattern.matches("/users/42"));
/// assert!(!pattern.matches("/users/42/"));
/// assert!(!pattern.matches("/Users/42"));
/// ```
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    regex: Regex,
}

impl RoutePattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] for unbalanced or empty groups, a trailing
    /// `\`, or a custom expression the regex engine rejects.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let tokens = tokenize(pattern)?;
        let regex = Regex::new(&to_regex(&tokens))?;
        Ok(Self {
            source: pattern.to_owned(),
            regex,
        })
    }

    /// Whether `path` matches in full.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn tokenize(pattern: &str) -> Result<Vec<Token>, PatternError> {
    let chars: Vec<(usize, char)> = pattern.char_indices().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let (_, c) = chars[i];

        if c == '\\' {
            let (_, escaped) = *chars.get(i + 1).ok_or(PatternError::DanglingEscape)?;
            literal.push(escaped);
            i += 2;
            continue;
        }

        let (prefix, start) = if (c == '/' || c == '.') && starts_param(&chars, i + 1) {
            (Some(c), i + 1)
        } else if starts_param(&chars, i) {
            (None, i)
        } else {
            literal.push(c);
            i += 1;
            continue;
        };

        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }

        let (expr, mut next) = match chars[start].1 {
            '*' => (Some(".*".to_owned()), start + 1),
            ':' => {
                let mut j = start + 1;
                while j < chars.len() && is_word(chars[j].1) {
                    j += 1;
                }
                if chars.get(j).is_some_and(|&(_, c)| c == '(') {
                    let (expr, end) = read_group(&chars, j)?;
                    (Some(expr), end)
                } else {
                    (None, j)
                }
            }
            _ => {
                let (expr, end) = read_group(&chars, start)?;
                (Some(expr), end)
            }
        };

        let star = chars[start].1 == '*';
        let modifier = match chars.get(next) {
            Some(&(_, m @ ('?' | '+' | '*'))) if !star => {
                next += 1;
                Some(m)
            }
            _ => None,
        };

        tokens.push(Token::Param {
            prefix,
            expr,
            modifier,
        });
        i = next;
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

// `:name`, `(` or `*` at position `i`.
fn starts_param(chars: &[(usize, char)], i: usize) -> bool {
    match chars.get(i) {
        Some((_, ':')) => chars.get(i + 1).is_some_and(|&(_, c)| is_word(c)),
        Some((_, '(')) | Some((_, '*')) => true,
        _ => false,
    }
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// Reads a balanced `( ... )` group starting at `open`; returns its body and the index after `)`.
fn read_group(chars: &[(usize, char)], open: usize) -> Result<(String, usize), PatternError> {
    let mut depth = 0usize;
    let mut body = String::new();
    let mut i = open;

    while i < chars.len() {
        let (_, c) = chars[i];
        match c {
            '\\' => {
                let (_, escaped) = *chars.get(i + 1).ok_or(PatternError::DanglingEscape)?;
                body.push('\\');
                body.push(escaped);
                i += 2;
                continue;
            }
            '(' => {
                depth += 1;
                if depth > 1 {
                    body.push(c);
                }
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    if body.is_empty() {
                        return Err(PatternError::EmptyGroup(chars[open].0));
                    }
                    return Ok((body, i + 1));
                }
                body.push(c);
            }
            _ => body.push(c),
        }
        i += 1;
    }

    Err(PatternError::UnbalancedGroup(chars[open].0))
}

fn to_regex(tokens: &[Token]) -> String {
    let mut out = String::from("^");

    for token in tokens {
        match token {
            Token::Literal(text) => out.push_str(&regex::escape(text)),
            Token::Param {
                prefix,
                expr,
                modifier,
            } => {
                let delimiter = prefix.unwrap_or('/');
                let expr = expr
                    .clone()
                    .unwrap_or_else(|| format!("[^{}]+?", regex::escape(&delimiter.to_string())));
                let prefix = prefix
                    .map(|p| regex::escape(&p.to_string()))
                    .unwrap_or_default();

                let capture = format!("(?:{expr})");
                let body = match modifier {
                    Some('+' | '*') => format!("{capture}(?:{prefix}{capture})*"),
                    _ => capture,
                };
                match modifier {
                    Some('?' | '*') => out.push_str(&format!("(?:{prefix}{body})?")),
                    _ => {
                        out.push_str(&prefix);
                        out.push_str(&body);
                    }
                }
            }
        }
    }

    out.push('$');
    out
}
