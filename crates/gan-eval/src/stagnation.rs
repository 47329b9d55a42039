use std::collections::HashSet;
use std::sync::LazyLock;

static WORD_RE: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"\w+").unwrap());

/// Strip `//` line comments and `/* */` block comments. The candidate's language is not
/// known ahead of time, so this is a small best-effort scanner rather than a per-language
/// lexer (out of scope per §1).
fn strip_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'/') {
            while let Some(&next) = chars.peek() {
                if next == '\n' {
                    break;
                }
                chars.next();
            }
            continue;
        }
        if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            while let Some(next) = chars.next() {
                if next == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

fn tokenize(code: &str) -> HashSet<String> {
    let stripped = strip_comments(code);
    WORD_RE.find_iter(&stripped).map(|m| m.as_str().to_string()).collect()
}

/// Normalized Jaccard similarity over comment-stripped, whitespace-collapsed word tokens.
/// Two empty candidates are defined as identical (`1.0`).
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

/// All pairwise similarities within `window`, in the order the pairs are visited.
pub fn pairwise_jaccard(window: &[String]) -> Vec<f64> {
    let mut results = Vec::new();
    for i in 0..window.len() {
        for j in (i + 1)..window.len() {
            results.push(jaccard_similarity(&window[i], &window[j]));
        }
    }
    results
}

/// `true` iff every pairwise similarity in the window is at or above `threshold`. A window
/// of fewer than two candidates can never be judged stagnant.
pub fn is_stagnant(window: &[String], threshold: f64) -> bool {
    if window.len() < 2 {
        return false;
    }
    pairwise_jaccard(window).into_iter().all(|s| s >= threshold)
}
