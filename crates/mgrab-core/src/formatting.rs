/// Escape text for inclusion in Telegram HTML messages.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Truncate to at most `max_len` chars, appending an ellipsis when cut.
pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_metacharacters() {
        assert_eq!(
            escape_html(r#"<b>&"fish"</b>"#),
            "&lt;b&gt;&amp;&quot;fish&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn truncate_text_adds_ellipsis() {
        let s = "a".repeat(210);
        let t = truncate_text(&s, 200);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), 203);
        assert_eq!(truncate_text("short", 200), "short");
    }
}
