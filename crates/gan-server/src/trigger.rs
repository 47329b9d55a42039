//! Audit-trigger heuristic (§4.I.3): decides whether a thought's text is "audit-worthy"
//! before the Request Handler pays for a subprocess call.

use regex::Regex;
use std::sync::LazyLock;

static FENCED_CODE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^```([A-Za-z][A-Za-z0-9_+-]*)\s*$").unwrap()
});

const RECOGNIZED_LANGUAGE_TAGS: &[&str] = &[
    "rust", "rs", "js", "javascript", "ts", "typescript", "py", "python", "go", "java", "c", "cpp",
    "c++", "csharp", "cs", "ruby", "rb", "php", "swift", "kotlin", "scala", "sh", "bash", "shell",
    "sql", "html", "css", "json", "yaml", "yml", "toml",
];

const PROGRAMMING_KEYWORDS: &[&str] = &[
    "function", "fn ", "def ", "class ", "struct ", "impl ", "const ", "let ", "var ", "import ",
    "package ", "interface ", "enum ", "return ", "async fn", "public class", "private ",
];

const DIFF_MARKERS: &[&str] = &["--- ", "+++ ", "@@"];

/// True iff any of: an inline `config` block, a fenced code block tagged with a recognized
/// language, diff markers, or programming-keyword heuristics. Otherwise the Request Handler
/// short-circuits to the non-audit response (§4.I.3).
pub fn is_audit_worthy(thought: &str) -> bool {
    if thought.contains("```config") {
        return true;
    }

    if FENCED_CODE_BLOCK_RE.captures_iter(thought).any(|caps| {
        let tag = caps[1].to_ascii_lowercase();
        RECOGNIZED_LANGUAGE_TAGS.contains(&tag.as_str())
    }) {
        return true;
    }

    if DIFF_MARKERS.iter().any(|marker| thought.contains(marker)) {
        return true;
    }

    PROGRAMMING_KEYWORDS.iter().any(|kw| thought.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_prose_is_not_audit_worthy() {
        assert!(!is_audit_worthy("I think we should refactor the onboarding flow next quarter."));
    }

    #[test]
    fn config_block_triggers_audit() {
        assert!(is_audit_worthy("```config\ntask = \"review\"\n```"));
    }

    #[test]
    fn recognized_language_fence_triggers_audit() {
        assert!(is_audit_worthy("here's my patch:\n```rust\nfn main() {}\n```"));
    }

    #[test]
    fn unrecognized_fence_tag_does_not_trigger() {
        assert!(!is_audit_worthy("```notalanguage\nsome text\n```"));
    }

    #[test]
    fn diff_markers_trigger_audit() {
        let text = "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1,3 +1,4 @@\n+fn added() {}";
        assert!(is_audit_worthy(text));
    }

    #[test]
    fn programming_keywords_trigger_audit_without_fences() {
        assert!(is_audit_worthy("I added a new function called parse_input that returns a Result"));
    }

    #[test]
    fn empty_thought_is_not_audit_worthy() {
        assert!(!is_audit_worthy(""));
    }
}
