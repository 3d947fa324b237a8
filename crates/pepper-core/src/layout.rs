//! Text layout for the glasses surface.
//!
//! Alerts are wrapped on word boundaries for readability; reading fragments
//! are cut on raw character counts so every page fills the same capacity.
//! Both operate on `char`s, never bytes.

/// Soft line length for alert text.
pub const ALERT_MAX_LINE_LENGTH: usize = 30;
/// Maximum number of alert lines before overflow is folded into the last one.
pub const ALERT_MAX_LINES: usize = 3;
/// Characters per full-screen reading fragment.
pub const READING_FRAGMENT_CHARS: usize = 200;

/// Wraps alert text into one to three lines.
///
/// Each line breaks at the last space at or before `max_line_len`, or hard
/// splits at `max_line_len` when there is none. Text left over after the
/// third line is appended to it, so content is never dropped.
pub fn wrap_alert(text: &str, max_line_len: usize) -> Vec<String> {
    let max_line_len = max_line_len.max(1);
    if text.chars().count() <= max_line_len {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::with_capacity(ALERT_MAX_LINES);
    let mut remaining = text.to_string();

    while !remaining.is_empty() && lines.len() < ALERT_MAX_LINES {
        let chars: Vec<char> = remaining.chars().collect();
        if chars.len() <= max_line_len {
            lines.push(std::mem::take(&mut remaining));
            break;
        }

        let split = chars[..=max_line_len]
            .iter()
            .rposition(|c| *c == ' ')
            .filter(|idx| *idx > 0)
            .unwrap_or(max_line_len);

        let head: String = chars[..split].iter().collect();
        let tail: String = chars[split..].iter().collect();
        lines.push(head.trim().to_string());
        remaining = tail.trim().to_string();
    }

    if !remaining.is_empty() {
        if let Some(last) = lines.last_mut() {
            last.push(' ');
            last.push_str(&remaining);
        }
    }

    lines
}

/// Splits long-form content into fragments of at most `max_chars` characters.
///
/// Empty content yields no fragments; joining the fragments reproduces the
/// input exactly.
pub fn paginate(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
