/// Pulls the first JSON array out of a model reply: a bare array, a fenced
/// block, or an array embedded in prose.
pub fn extract_json_array(raw: &str) -> Option<String> {
    if raw.trim_start().starts_with('[') {
        return balanced(raw.trim_start(), '[', ']');
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = after_lang[..end].trim();
            if block.starts_with('[') {
                return balanced(block, '[', ']');
            }
        }
    }

    raw.find('[').and_then(|idx| balanced(&raw[idx..], '[', ']'))
}

/// Returns the prefix of `text` (which starts with `open`) up to its matching
/// `close`, ignoring brackets inside string literals.
fn balanced(text: &str, open: char, close: char) -> Option<String> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[..=idx].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
