//! Text surgery used by the recovery strategies

use once_cell::sync::Lazy;
use regex::Regex;

/// Opening fence with optional language tag, e.g. ```` ```json ````
static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z0-9_+\-]*").expect("fence pattern is valid"));

pub(crate) fn has_fence(text: &str) -> bool {
    text.contains("```")
}

/// The first `{` sits between an opening fence and its closing fence
pub(crate) fn opens_inside_fence(text: &str) -> bool {
    match text.find('{') {
        Some(start) => text[..start].matches("```").count() % 2 == 1,
        None => false,
    }
}

/// Remove markdown fences and surrounding blank lines
pub(crate) fn strip_fences(text: &str) -> String {
    FENCE.replace_all(text, "").trim().to_string()
}

/// Slice from the first `{` to its matching `}`.
///
/// Braces inside string literals are ignored. Returns `None` when there is
/// no opening brace or it is never closed.
pub(crate) fn extract_balanced(text: &str) -> Option<&str> {
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Lines from the first one starting with `{` through the first one ending with `}`
pub(crate) fn line_window(text: &str) -> Option<String> {
    let mut collected: Vec<&str> = Vec::new();

    for line in text.lines() {
        if collected.is_empty() && !line.trim_start().starts_with('{') {
            continue;
        }

        collected.push(line);
        if line.trim_end().ends_with('}') {
            break;
        }
    }

    if collected.is_empty() {
        None
    } else {
        Some(collected.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_balanced_skips_prose() {
        let text = r#"Sure! {"a": {"b": 1}} and then {"c": 2}"#;
        assert_eq!(extract_balanced(text), Some(r#"{"a": {"b": 1}}"#));
    }

    #[test]
    fn test_extract_balanced_ignores_braces_in_strings() {
        let text = r#"x {"note": "use } and { freely", "q": "say \"}\""} y"#;
        assert_eq!(
            extract_balanced(text),
            Some(r#"{"note": "use } and { freely", "q": "say \"}\""}"#)
        );
    }

    #[test]
    fn test_extract_balanced_unclosed() {
        assert_eq!(extract_balanced(r#"{"a": [1, 2"#), None);
        assert_eq!(extract_balanced("no braces"), None);
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("\n\n```\n{}\n```\n"), "{}");
        assert_eq!(strip_fences("```JSON{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn test_opens_inside_fence() {
        assert!(opens_inside_fence("Result:\n```json\n{\"a\": 1}\n```"));
        assert!(!opens_inside_fence("{\"code\": \"```json\"}"));
        assert!(!opens_inside_fence("```\nnot json\n```\n{\"a\": 1}"));
        assert!(!opens_inside_fence("no braces ```"));
    }

    #[test]
    fn test_line_window() {
        let text = "Result follows\n{\n  \"a\": 1\n}\ntrailing words";
        assert_eq!(line_window(text).as_deref(), Some("{\n  \"a\": 1\n}"));
        assert_eq!(line_window("nothing here"), None);
    }
}
