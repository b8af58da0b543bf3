use regex::Regex;
use std::sync::OnceLock;

const REDACTED: &str = "***REDACTED***";

const SENSITIVE_KEYWORDS: &[&str] = &[
    "token=", "token:", "token ",
    "password=", "password:", "password ",
    "secret=", "secret:", "secret ",
    "key=", "key:", "key ",
    "credential=", "credential:", "credential ",
    "x-plex-token", "api_key", "apikey",
];

const GENERIC_QUALIFIERS: &[&str] = &[
    "invalid", "missing", "required", "failed", "error", "no", "empty", "bad", "incorrect",
    "expired",
];

struct Patterns {
    hex_run: Regex,
    base64_run: Regex,
    hex_word: Regex,
    base64_word: Regex,
    assignments: Vec<Regex>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).expect("valid sanitizer regex");
        Patterns {
            hex_run: compile(r"[0-9a-fA-F]{20,}"),
            base64_run: compile(r"[A-Za-z0-9+/]{30,}={0,2}"),
            hex_word: compile(r"\b[0-9a-fA-F]{20,}\b"),
            base64_word: compile(r"\b[A-Za-z0-9+/]{30,}={0,2}"),
            assignments: [
                "token", "password", "secret", "key", "credential", "x-plex-token", "api_key",
                "apikey",
            ]
            .iter()
            .map(|word| compile(&format!(r"(?i)({}[=:\s]+)([^\s,;]+)", regex::escape(word))))
            .collect(),
        }
    })
}

/// Heuristic check for credentials embedded in a message.
///
/// Keyword hits such as `token=` count unless used generically
/// ("invalid token", "token expired"). Long hex or base64 runs always count.
pub fn contains_sensitive_data(message: &str) -> bool {
    let lower = message.to_lowercase();

    let keyword_hit = SENSITIVE_KEYWORDS
        .iter()
        .any(|pattern| lower.contains(pattern) && !is_generic_mention(&lower, pattern));
    if keyword_hit {
        return true;
    }

    let patterns = patterns();
    patterns.hex_run.is_match(message) || patterns.base64_run.is_match(message)
}

fn is_generic_mention(lower: &str, pattern: &str) -> bool {
    let word = pattern.trim_end_matches(['=', ':', ' ']);
    GENERIC_QUALIFIERS.iter().any(|qualifier| {
        lower.contains(&format!("{qualifier} {word}")) || lower.contains(&format!("{word} {qualifier}"))
    })
}

/// Masks credential values so the message can be logged.
///
/// Keyword assignments lose their value entirely; long opaque runs keep
/// their first and last four characters.
pub fn sanitize_for_logging(message: &str) -> String {
    if message.is_empty() || !contains_sensitive_data(message) {
        return message.to_string();
    }

    let patterns = patterns();
    let mut result = message.to_string();

    for assignment in &patterns.assignments {
        result = assignment
            .replace_all(&result, format!("${{1}}{REDACTED}").as_str())
            .into_owned();
    }

    result = patterns
        .hex_word
        .replace_all(&result, |caps: &regex::Captures<'_>| mask_middle(&caps[0]))
        .into_owned();
    result = patterns
        .base64_word
        .replace_all(&result, |caps: &regex::Captures<'_>| mask_middle(&caps[0]))
        .into_owned();

    result
}

fn mask_middle(value: &str) -> String {
    if value.len() < 12 {
        return REDACTED.to_string();
    }
    format!("{}...{}", &value[..4], &value[value.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_compiles_and_matches() {
        let patterns = patterns();
        assert_eq!(patterns.assignments.len(), 8);

        let hex = "0123456789abcdef0123456789";
        let base64 = "QUJDREVGR0hJSktMTU5PUFFSU1RVVldYWVo0123";
        assert!(patterns.hex_run.is_match(hex));
        assert!(patterns.hex_word.is_match(&format!("id {hex} end")));
        assert!(patterns.base64_run.is_match(base64));
        assert!(patterns.base64_word.is_match(&format!("blob {base64}")));

        for (pattern, word) in patterns.assignments.iter().zip([
            "token", "password", "secret", "key", "credential", "X-Plex-Token", "API_KEY", "apikey",
        ]) {
            let line = format!("{word}=hunter2");
            let captures = pattern.captures(&line).unwrap();
            assert_eq!(&captures[2], "hunter2", "{word}");
        }
    }

    #[test]
    fn generic_mentions_are_not_sensitive() {
        assert!(!contains_sensitive_data("invalid token"));
        assert!(!contains_sensitive_data("token expired"));
        assert!(!contains_sensitive_data("plex server unreachable"));
    }

    #[test]
    fn detects_assignments_and_opaque_runs() {
        assert!(contains_sensitive_data("X-Plex-Token=abc123"));
        assert!(contains_sensitive_data("password: hunter2"));
        assert!(contains_sensitive_data("got 0123456789abcdef0123456789 back"));
    }

    #[test]
    fn sanitize_redacts_values() {
        let cleaned = sanitize_for_logging("request rejected token=supersecretvalue");
        assert_eq!(cleaned, "request rejected token=***REDACTED***");

        let cleaned = sanitize_for_logging("id 0123456789abcdef0123456789 rejected");
        assert_eq!(cleaned, "id 0123...6789 rejected");
    }

    #[test]
    fn sanitize_leaves_safe_messages_alone() {
        assert_eq!(sanitize_for_logging(""), "");
        assert_eq!(
            sanitize_for_logging("connection refused"),
            "connection refused"
        );
    }

    #[test]
    fn short_values_are_fully_redacted() {
        assert_eq!(mask_middle("short"), REDACTED);
        assert_eq!(mask_middle("abcd1234xyz9876"), "abcd...9876");
    }
}
