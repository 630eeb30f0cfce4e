use once_cell::sync::Lazy;
use regex::Regex;

/* ------------------------------- Patterns --------------------------------- */

// One pattern per element; the regex crate has no backreferences to pair tags.
static DROPPED_ELEMENTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["head", "script", "style", "noscript", "title"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("valid regex"))
        .collect()
});
static COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static LINE_BREAKING_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(br|/?p|/?div|/?tr|/?li|/?ul|/?ol|/?table|/?h[1-6]|/?blockquote|/?section|/?article|hr)\b[^>]*>")
        .expect("valid regex")
});
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"));

fn decode_entities(s: &str) -> String {
    let s = NUMERIC_ENTITY.replace_all(s, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x').or_else(|| raw.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });
    s.replace("&nbsp;", " ")
        .replace("&zwnj;", "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&mdash;", "—")
        .replace("&ndash;", "–")
        .replace("&rsquo;", "’")
        .replace("&lsquo;", "‘")
        .replace("&rdquo;", "”")
        .replace("&ldquo;", "“")
        .replace("&hellip;", "…")
        .replace("&amp;", "&")
}

/// Flatten an HTML email body to plain text: scripts/styles dropped, block
/// tags turned into line breaks, blank lines removed, and consecutive
/// duplicate lines collapsed (newsletters repeat headers a lot).
pub fn html_to_text(html: &str) -> String {
    let mut s = html.to_string();
    for re in DROPPED_ELEMENTS.iter() {
        s = re.replace_all(&s, "").into_owned();
    }
    let s = COMMENTS.replace_all(&s, "");
    let s = LINE_BREAKING_TAGS.replace_all(&s, "\n");
    let s = ANY_TAG.replace_all(&s, "");
    let s = decode_entities(&s);

    let mut out: Vec<String> = Vec::new();
    for line in s.lines() {
        // invisible preheader padding shows up as runs of zero-width chars
        let line = line
            .replace(['\u{200b}', '\u{200c}', '\u{200d}', '\u{feff}', '\u{034f}'], "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if line.is_empty() {
            continue;
        }
        if out.last() != Some(&line) {
            out.push(line);
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_scripts_styles_and_tags() {
        let html = r#"<html><head><title>T</title><style>.a{color:red}</style></head>
            <body><script>track()</script><p>Hello <b>world</b></p><img src="pixel.gif"><div>Second</div></body></html>"#;
        assert_eq!(html_to_text(html), "Hello world\nSecond");
    }

    #[test]
    fn block_tags_and_breaks_become_lines() {
        let html = "<h1>Top story</h1>line one<br>line two<br/>line three<ul><li>a</li><li>b</li></ul>";
        assert_eq!(html_to_text(html), "Top story\nline one\nline two\nline three\na\nb");
    }

    #[test]
    fn collapses_consecutive_duplicates_and_blank_lines() {
        let html = "<p>View in browser</p><p>View in browser</p>\n\n\n<p>Body</p><p>View in browser</p>";
        assert_eq!(html_to_text(html), "View in browser\nBody\nView in browser");
    }

    #[test]
    fn decodes_common_entities() {
        let html = "<p>AT&amp;T &lt;3 &quot;deals&quot;&nbsp;&#8212; it&#39;s &#x2019;big&#x2019; &amp;lt;</p>";
        assert_eq!(html_to_text(html), "AT&T <3 \"deals\" — it's ’big’ &lt;");
    }

    #[test]
    fn strips_comments_and_zero_width_padding() {
        let html = "<!-- [if mso]><table><![endif] -->\u{200c}\u{200b} \u{200c}<p>Real text</p>";
        assert_eq!(html_to_text(html), "Real text");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(html_to_text("just text\n  indented  "), "just text\nindented");
    }
}
