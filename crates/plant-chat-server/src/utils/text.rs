use unicode_segmentation::UnicodeSegmentation;

/// Truncate text to at most `max_chars` user-perceived characters.
/// Truncated previews end with "..." (counted in the budget).
pub fn preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let graphemes: Vec<&str> = text.graphemes(true).collect();

    if graphemes.len() <= max_chars {
        return text.to_string();
    }

    if max_chars <= 3 {
        return graphemes[..max_chars].concat();
    }

    let mut out = graphemes[..max_chars - 3].concat();
    out.truncate(out.trim_end().len());
    out.push_str("...");
    out
}

/// Count user-perceived characters.
pub fn char_len(text: &str) -> usize {
    text.graphemes(true).count()
}
