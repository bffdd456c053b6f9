//! Wildcard matching for policy actions and resources.
//!
//! `*` matches any run of characters and `?` exactly one. Actions compare
//! case-insensitively (`s3:getobject` is `s3:GetObject`), resources exactly.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Compiled wildcard patterns, keyed by pattern text and case sensitivity.
static COMPILED: Lazy<Mutex<HashMap<(String, bool), Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn glob_to_regex(pattern: &str, case_insensitive: bool) -> String {
    let mut regex = String::from(if case_insensitive { "(?i)^" } else { "^" });
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            _ => regex.push_str(&regex::escape(ch.encode_utf8(&mut literal))),
        }
    }
    regex.push('$');
    regex
}

fn compiled(pattern: &str, case_insensitive: bool) -> Option<Regex> {
    let mut cache = COMPILED.lock().unwrap_or_else(PoisonError::into_inner);
    let key = (pattern.to_string(), case_insensitive);
    if let Some(re) = cache.get(&key) {
        return Some(re.clone());
    }
    match Regex::new(&glob_to_regex(pattern, case_insensitive)) {
        Ok(re) => {
            cache.insert(key, re.clone());
            Some(re)
        }
        Err(e) => {
            warn!(pattern, error = %e, "Policy pattern cannot be compiled; it matches nothing");
            None
        }
    }
}

fn glob_matches(pattern: &str, value: &str, case_insensitive: bool) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains(['*', '?']) {
        return if case_insensitive {
            pattern.eq_ignore_ascii_case(value)
        } else {
            pattern == value
        };
    }
    compiled(pattern, case_insensitive).is_some_and(|re| re.is_match(value))
}

pub fn action_matches(pattern: &str, action: &str) -> bool {
    glob_matches(pattern, action, true)
}

pub fn resource_matches(pattern: &str, resource: &str) -> bool {
    glob_matches(pattern, resource, false)
}

/// True for patterns that cover every action of a service, or everything.
pub fn is_wildcard_action(pattern: &str) -> bool {
    pattern == "*" || pattern.ends_with(":*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_ignore_case() {
        assert!(action_matches("s3:GetObject", "S3:getobject"));
        assert!(action_matches("s3:*", "s3:PutObject"));
        assert!(action_matches("s3:Get*", "s3:GetObjectVersion"));
        assert!(!action_matches("s3:Get*", "s3:PutObject"));
        assert!(!action_matches("textract:*", "s3:GetObject"));
    }

    #[test]
    fn resources_are_case_sensitive() {
        assert!(resource_matches("arn:aws:s3:::docs/*", "arn:aws:s3:::docs/uploads/a.pdf"));
        assert!(!resource_matches("arn:aws:s3:::docs/*", "arn:aws:s3:::Docs/uploads/a.pdf"));
        assert!(!resource_matches("arn:aws:s3:::docs", "arn:aws:s3:::docs/a.pdf"));
        assert!(resource_matches("*", "arn:aws:s3:::anything"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        assert!(resource_matches("arn:aws:s3:::doc?", "arn:aws:s3:::docs"));
        assert!(!resource_matches("arn:aws:s3:::doc?", "arn:aws:s3:::doc"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(resource_matches("arn:aws:s3:::a.b/*", "arn:aws:s3:::a.b/x"));
        assert!(!resource_matches("arn:aws:s3:::a.b/*", "arn:aws:s3:::aXb/x"));
    }

    #[test]
    fn every_metacharacter_is_escaped() {
        let pattern = r"arn:aws:s3:::a+b(c)[d]{e}|^$\\/*";
        assert!(resource_matches(pattern, r"arn:aws:s3:::a+b(c)[d]{e}|^$\\/key"));
        assert!(!resource_matches(pattern, "arn:aws:s3:::aab/key"));
    }

    #[test]
    fn wildcard_patterns_are_compiled_once() {
        assert!(action_matches("textract:Detect*", "textract:DetectDocumentText"));
        assert!(action_matches("textract:Detect*", "TEXTRACT:detectdocumenttext"));
        let cache = COMPILED.lock().unwrap();
        assert!(cache.contains_key(&("textract:Detect*".to_string(), true)));
        assert!(!cache.contains_key(&("textract:Detect*".to_string(), false)));
    }

    #[test]
    fn wildcard_action_detection() {
        assert!(is_wildcard_action("*"));
        assert!(is_wildcard_action("s3:*"));
        assert!(!is_wildcard_action("s3:Get*"));
        assert!(!is_wildcard_action("s3:GetObject"));
    }
}
