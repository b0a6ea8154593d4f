//! Subject parsing.
//!
//! A subject is a dot-separated list of non-empty tokens. Subscription
//! patterns may use `*` for exactly one token and a final `>` for whatever
//! remains, including nothing: `foo.>` matches `foo`, `foo.a` and
//! `foo.a.b`. Published subjects must be literal.

use crate::error::{CoreError, CoreResult};

/// Single-token wildcard.
pub const STAR: &str = "*";
/// Tail wildcard.
pub const GREATER: &str = ">";

/// Splits a subscription pattern into tokens.
///
/// # Errors
///
/// Fails on empty tokens or a `>` that is not the last token.
pub fn pattern_tokens(pattern: &str) -> CoreResult<Vec<&str>> {
    let tokens = split(pattern)?;
    if let Some(pos) = tokens.iter().position(|t| *t == GREATER) {
        if pos != tokens.len() - 1 {
            return Err(CoreError::invalid_argument(format!(
                "'>' must be the last token in {pattern:?}"
            )));
        }
    }
    Ok(tokens)
}

/// Splits a published subject into tokens.
///
/// # Errors
///
/// Fails on empty tokens or any wildcard.
pub fn subject_tokens(subject: &str) -> CoreResult<Vec<&str>> {
    let tokens = split(subject)?;
    if tokens.iter().any(|t| *t == STAR || *t == GREATER) {
        return Err(CoreError::invalid_argument(format!(
            "wildcards are not allowed in published subject {subject:?}"
        )));
    }
    Ok(tokens)
}

fn split(subject: &str) -> CoreResult<Vec<&str>> {
    let tokens: Vec<&str> = subject.split('.').collect();
    if tokens.iter().any(|t| t.is_empty()) {
        return Err(CoreError::invalid_argument(format!("invalid subject {subject:?}")));
    }
    Ok(tokens)
}

/// Returns true if `subject` matches `pattern`.
///
/// Reference matcher used for checks outside the trie.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let (Ok(pattern), Ok(subject)) = (pattern_tokens(pattern), subject_tokens(subject)) else {
        return false;
    };
    let mut i = 0;
    for (pi, p) in pattern.iter().enumerate() {
        if *p == GREATER {
            return pi == pattern.len() - 1;
        }
        match subject.get(i) {
            Some(s) if *p == STAR || p == s => i += 1,
            _ => return false,
        }
    }
    i == subject.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matching() {
        for pattern in ["foo.bar", "foo.*", "foo.>", ">"] {
            assert!(matches(pattern, "foo.bar"), "{pattern} should match");
        }
        for pattern in ["foo", "foo.bar.baz", "bar.foo", "*.foo"] {
            assert!(!matches(pattern, "foo.bar"), "{pattern} should not match");
        }
        assert!(matches("foo.>", "foo"));
        assert!(!matches("foo.>", "bar"));
        assert!(matches("foo.*.baz", "foo.bar.baz"));
    }

    #[test]
    fn invalid_subjects() {
        assert!(pattern_tokens("foo..bar").is_err());
        assert!(pattern_tokens("").is_err());
        assert!(pattern_tokens("foo.>.bar").is_err());
        assert!(subject_tokens("foo.*").is_err());
        assert_eq!(pattern_tokens("a.*.>").unwrap(), vec!["a", "*", ">"]);
    }
}
