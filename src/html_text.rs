//! Markup stripping and entity decoding for HTML mail bodies.

use regex::{Captures, Regex};

pub struct HtmlText {
    script_regex: Regex,
    style_regex: Regex,
    comment_regex: Regex,
    tag_regex: Regex,
    entity_regex: Regex,
    anchor_regex: Regex,
}

impl HtmlText {
    pub fn new() -> Self {
        Self {
            script_regex: Regex::new(r"(?is)<script\b.*?</script\s*>").unwrap(),
            style_regex: Regex::new(r"(?is)<style\b.*?</style\s*>").unwrap(),
            comment_regex: Regex::new(r"(?s)<!--.*?-->").unwrap(),
            tag_regex: Regex::new(r"(?s)<[^>]*>").unwrap(),
            entity_regex: Regex::new(r"&(?:#(\d+)|#[xX]([0-9A-Fa-f]+)|([a-zA-Z][a-zA-Z0-9]*));")
                .unwrap(),
            anchor_regex: Regex::new(
                r#"(?is)<a\b[^>]*?\shref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#,
            )
            .unwrap(),
        }
    }

    /// Visible text of an HTML document. Element boundaries become single
    /// spaces so adjacent words never merge.
    pub fn to_text(&self, html: &str) -> String {
        let text = self.script_regex.replace_all(html, " ");
        let text = self.style_regex.replace_all(&text, " ");
        let text = self.comment_regex.replace_all(&text, " ");
        let text = self.tag_regex.replace_all(&text, " ");
        let text = self.decode_entities(&text);

        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// `href` values of every anchor, in document order. Empty values are kept.
    pub fn anchor_hrefs(&self, html: &str) -> Vec<String> {
        let html = self.comment_regex.replace_all(html, " ");
        self.anchor_regex
            .captures_iter(&html)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
            .map(|m| self.decode_entities(m.as_str().trim()))
            .collect()
    }

    pub fn decode_entities(&self, text: &str) -> String {
        self.entity_regex
            .replace_all(text, |caps: &Captures| {
                let decoded = if let Some(decimal) = caps.get(1) {
                    decimal.as_str().parse::<u32>().ok().and_then(char::from_u32)
                } else if let Some(hex) = caps.get(2) {
                    u32::from_str_radix(hex.as_str(), 16)
                        .ok()
                        .and_then(char::from_u32)
                } else {
                    caps.get(3).and_then(|named| named_entity(named.as_str()))
                };

                match decoded {
                    Some(ch) => ch.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl Default for HtmlText {
    fn default() -> Self {
        Self::new()
    }
}

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "euro" => '€',
        "pound" => '£',
        _ => return None,
    };
    Some(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacent_elements_do_not_merge() {
        let html = HtmlText::new();
        assert_eq!(
            html.to_text("<p>Verify</p><p>your</p><b>account</b>now"),
            "Verify your account now"
        );
    }

    #[test]
    fn test_script_style_and_comments_dropped() {
        let html = HtmlText::new();
        let text = html.to_text(
            "<html><head><style>p { color: red }</style><script>var x = 1;</script></head>\
             <body><!-- hidden --><p>Hello&nbsp;there &amp; welcome</p></body></html>",
        );
        assert_eq!(text, "Hello there & welcome");
    }

    #[test]
    fn test_numeric_entities() {
        let html = HtmlText::new();
        assert_eq!(html.decode_entities("p&#97;yp&#x61;l &unknown;"), "paypal &unknown;");
    }

    #[test]
    fn test_anchor_hrefs() {
        let html = HtmlText::new();
        let hrefs = html.anchor_hrefs(
            r#"<a href="http://a.example/x?a=1&amp;b=2">one</a>
               <A class='btn' HREF='https://b.example'>two</A>
               <a href=http://c.example/>three</a>
               <a name="anchor">no href</a>
               <a href="">empty</a>"#,
        );
        assert_eq!(
            hrefs,
            vec![
                "http://a.example/x?a=1&b=2".to_string(),
                "https://b.example".to_string(),
                "http://c.example/".to_string(),
                String::new(),
            ]
        );
    }
}
