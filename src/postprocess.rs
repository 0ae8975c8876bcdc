//! Deterministic cleanup of LLM output before it hits the scratch file.
//!
//! Models occasionally ignore the "no fences" instruction and wrap the whole
//! response in a ```markdown block. That wrapper is the only quirk corrected
//! here: anything else is preserved byte-for-byte, because the aggregator
//! concatenates scratch files verbatim and must not second-guess content.

/// Unwrap a response that is entirely enclosed in a single code fence.
///
/// Returns the input unchanged unless the first line opens a fence and the
/// last non-blank line is a bare closing fence.
pub fn strip_wrapping_fence(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.lines().collect();
    let Some(first) = lines.first() else {
        return markdown.to_string();
    };
    if !first.trim_start().starts_with("```") {
        return markdown.to_string();
    }

    let Some(close) = lines.iter().rposition(|l| l.trim() == "```") else {
        return markdown.to_string();
    };
    // The closing fence must be the last non-blank line and distinct from
    // the opener.
    if close == 0 || lines[close + 1..].iter().any(|l| !l.trim().is_empty()) {
        return markdown.to_string();
    }

    let mut inner = lines[1..close].join("\n");
    inner.push('\n');
    inner
}
