/// Escapes any `<tag>`-shaped substring in `text` that is not one of the
/// allowed structural tags the caller is about to wrap the content in.
///
/// The memory injector wraps retrieved facts in `<memory>`/`<facts>`/
/// `<goals>` blocks; if a fact's own text contains something that looks
/// like a tag (a user pasted HTML, or a tool echoed XML), it must not be
/// able to forge a closing tag and break out of the block. This is the one
/// shared implementation every ingestion point reuses (spec open question:
/// escape at the injector boundary, not at every write site).
pub fn escape_foreign_tags(text: &str, allowed: &[&str]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }
        match text[i..].find('>') {
            Some(rel_end) if rel_end <= 40 => {
                let tag_body = &text[i + 1..i + rel_end];
                let name = tag_body.trim_start_matches('/').split_whitespace().next().unwrap_or("");
                if allowed.iter().any(|a| a.eq_ignore_ascii_case(name)) {
                    out.push_str(&text[i..i + rel_end + 1]);
                    for _ in 0..rel_end {
                        chars.next();
                    }
                } else {
                    out.push_str("&lt;");
                }
            }
            _ => out.push_str("&lt;"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_unknown_tags() {
        let input = "I live at <home>somewhere</home> and love <script>alert(1)</script>";
        let out = escape_foreign_tags(input, &["memory", "facts", "goals"]);
        assert!(!out.contains("<script>"));
        assert!(out.contains("&lt;script>"));
    }

    #[test]
    fn preserves_allowed_tags() {
        let input = "<facts>fact one</facts>";
        let out = escape_foreign_tags(input, &["facts"]);
        assert_eq!(out, input);
    }
}
