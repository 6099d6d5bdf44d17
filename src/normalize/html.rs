use std::sync::LazyLock;

use regex::Regex;

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<[^>]+>").expect("valid tag regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Strip tags, decode entities and collapse whitespace runs to one space.
///
/// Tags are removed before entities are decoded so escaped markup such as
/// `&lt;b&gt;` survives as literal text.
pub fn strip_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let without_tags = TAGS.replace_all(text, "");
    let decoded = html_escape::decode_html_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_ok() {
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn strips_tags_and_decodes_entities() {
        let s = "<p>Hello&nbsp;<b>world</b> &amp; friends</p>";
        assert_eq!(strip_html(s), "Hello world & friends");
    }

    #[test]
    fn escaped_markup_survives_as_text() {
        assert_eq!(strip_html("use &lt;b&gt; for bold"), "use <b> for bold");
    }

    #[test]
    fn collapses_whitespace_across_lines() {
        let s = "<div>\n  First\n\n\t<br/>Second   line </div>";
        assert_eq!(strip_html(s), "First Second line");
    }

    #[test]
    fn multiline_tags_are_removed() {
        let s = "<img\n src=\"a.png\"\n alt=\"x\">caption";
        assert_eq!(strip_html(s), "caption");
    }
}
