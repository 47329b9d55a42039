use regex::Regex;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d{1,3}?[-.\s]?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b").unwrap());
static SSN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CREDIT_CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]*?){13,16}\b").unwrap());
static SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(sk-[a-z0-9]{16,}|ghp_[a-z0-9]{20,}|[a-z0-9]{32,}|Bearer\s+[A-Za-z0-9._-]{10,})\b")
        .unwrap()
});
static HOME_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(/home/[^/\s]+|/Users/[^/\s]+)").unwrap());

/// Replace PII, secret-like strings, and absolute home/user paths with fixed placeholders.
/// Run as the very last step before a [`crate::FeedbackDocument`] is returned so nothing
/// downstream can reintroduce an unsanitized copy.
pub fn sanitize(text: &str) -> String {
    let text = EMAIL_RE.replace_all(text, "[redacted-email]");
    let text = PHONE_RE.replace_all(&text, "[redacted-phone]");
    let text = SSN_RE.replace_all(&text, "[redacted-ssn]");
    let text = CREDIT_CARD_RE.replace_all(&text, "[redacted-card]");
    let text = SECRET_RE.replace_all(&text, "[redacted-secret]");
    let text = HOME_PATH_RE.replace_all(&text, "[redacted-home]");
    text.into_owned()
}
