//! Turns a raw email into the single text blob fed to the classifier.
//!
//! Parsing is forgiving: a part that cannot be decoded
//! contributes its raw payload or nothing at all, and only a broken
//! top-level multipart structure makes [`EmailNormalizer::parse`] fail.
//! [`EmailNormalizer::normalize`] never fails; it returns the raw input
//! when the structure cannot be recovered.

use crate::config::NormalizerConfig;
use crate::html_text::HtmlText;
use base64::{engine::general_purpose, Engine as _};
use regex::{Captures, Regex};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MimeError {
    #[error("multipart message without boundary parameter")]
    MissingBoundary,

    #[error("boundary {0:?} never appears in multipart body")]
    BoundaryNotFound(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailHeaders {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub return_path: String,
    pub x_mailer: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedEmail {
    pub headers: EmailHeaders,
    /// Decoded text of every readable leaf, in traversal order.
    pub body_fragments: Vec<String>,
    /// Undecorated HTML of every `text/html` leaf, for link analysis.
    pub html_fragments: Vec<String>,
    multipart: bool,
}

impl ParsedEmail {
    pub fn is_multipart(&self) -> bool {
        self.multipart
    }

    pub fn body_text(&self) -> String {
        if self.multipart {
            self.body_fragments
                .iter()
                .map(|fragment| format!("{}\n", fragment))
                .collect()
        } else {
            self.body_fragments.concat()
        }
    }

    pub fn combined_text(&self) -> String {
        format!(
            "Subject: {}\nFrom: {}\nTo: {}\n\n{}",
            self.headers.subject,
            self.headers.from,
            self.headers.to,
            self.body_text()
        )
    }
}

pub struct EmailNormalizer {
    html: HtmlText,
    encoded_word_regex: Regex,
    encoded_word_gap_regex: Regex,
    max_depth: usize,
}

impl EmailNormalizer {
    pub fn new() -> Self {
        Self::from_config(&NormalizerConfig::default())
    }

    pub fn from_config(config: &NormalizerConfig) -> Self {
        Self {
            html: HtmlText::new(),
            encoded_word_regex: Regex::new(r"=\?([^?\s]+)\?([bBqQ])\?([^?\s]*)\?=").unwrap(),
            encoded_word_gap_regex: Regex::new(r"\?=\s+=\?").unwrap(),
            max_depth: config.max_mime_depth,
        }
    }

    pub fn html(&self) -> &HtmlText {
        &self.html
    }

    /// Combined header + body text. Falls back to `raw` unchanged when the
    /// message structure cannot be parsed.
    pub fn normalize(&self, raw: &str) -> String {
        match self.parse(raw) {
            Ok(parsed) => parsed.combined_text(),
            Err(e) => {
                log::debug!("Structural parse failed ({}), using raw content", e);
                raw.to_string()
            }
        }
    }

    pub fn parse(&self, raw: &str) -> Result<ParsedEmail, MimeError> {
        let (fields, body) = split_entity(raw);
        let mut parsed = ParsedEmail {
            headers: self.extract_headers(&fields),
            ..Default::default()
        };

        let (mime_type, params) = content_type(&fields, "text/plain");

        if mime_type.starts_with("multipart/") {
            let boundary = params
                .get("boundary")
                .filter(|b| !b.is_empty())
                .ok_or(MimeError::MissingBoundary)?;
            let parts = split_parts(body, boundary)?;
            let child_default = child_default_type(&mime_type);

            parsed.multipart = true;
            for part in parts {
                self.walk_part(part, child_default, 1, &mut parsed);
            }
        } else {
            let text = decode_payload(body, &fields, params.get("charset").map(String::as_str));
            if mime_type == "text/html" {
                parsed.html_fragments.push(text.clone());
            }
            parsed.body_fragments.push(text);
        }

        Ok(parsed)
    }

    fn walk_part(&self, raw: &str, default_type: &str, depth: usize, parsed: &mut ParsedEmail) {
        let (fields, body) = split_entity(raw);

        if let Some(disposition) = header_value(&fields, "Content-Disposition") {
            if disposition.to_ascii_lowercase().contains("attachment") {
                return;
            }
        }

        if depth > self.max_depth {
            log::debug!("Skipping MIME part nested {} levels deep", depth);
            return;
        }

        let (mime_type, params) = content_type(&fields, default_type);
        let charset = params.get("charset").map(String::as_str);

        match mime_type.as_str() {
            t if t.starts_with("multipart/") => {
                let Some(boundary) = params.get("boundary").filter(|b| !b.is_empty()) else {
                    log::debug!("Nested {} part without boundary, skipping", t);
                    return;
                };
                match split_parts(body, boundary) {
                    Ok(parts) => {
                        let child_default = child_default_type(t);
                        for part in parts {
                            self.walk_part(part, child_default, depth + 1, parsed);
                        }
                    }
                    Err(e) => log::debug!("Skipping nested part: {}", e),
                }
            }
            "message/rfc822" => {
                let inner = decode_payload(body, &fields, None);
                self.walk_part(&inner, "text/plain", depth + 1, parsed);
            }
            "text/plain" => {
                parsed
                    .body_fragments
                    .push(decode_payload(body, &fields, charset));
            }
            "text/html" => {
                let html = decode_payload(body, &fields, charset);
                parsed.body_fragments.push(self.html.to_text(&html));
                parsed.html_fragments.push(html);
            }
            _ => {}
        }
    }

    fn extract_headers(&self, fields: &[(String, String)]) -> EmailHeaders {
        let get = |name: &str| {
            header_value(fields, name)
                .map(|v| self.decode_encoded_words(v))
                .unwrap_or_default()
        };

        EmailHeaders {
            subject: get("Subject"),
            from: get("From"),
            to: get("To"),
            return_path: get("Return-Path"),
            x_mailer: get("X-Mailer"),
            message_id: get("Message-ID"),
        }
    }

    /// Decodes RFC 2047 encoded-words. Undecodable words are left as-is.
    pub fn decode_encoded_words(&self, value: &str) -> String {
        if !value.contains("=?") {
            return value.to_string();
        }

        let joined = self.encoded_word_gap_regex.replace_all(value, "?==?");
        self.encoded_word_regex
            .replace_all(&joined, |caps: &Captures| {
                let charset = caps[1].split('*').next().unwrap_or_default();
                let text = &caps[3];
                let bytes = if caps[2].eq_ignore_ascii_case("b") {
                    decode_base64(text)
                } else {
                    let text = text.replace('_', " ");
                    quoted_printable::decode(text.as_bytes(), quoted_printable::ParseMode::Robust)
                        .ok()
                };

                match bytes {
                    Some(bytes) => bytes_to_text(&bytes, Some(charset)),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl Default for EmailNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits an entity into its header fields and body. Input that does not
/// start with a header field is all body.
fn split_entity(raw: &str) -> (Vec<(String, String)>, &str) {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut offset = 0;

    while offset < raw.len() {
        let rest = &raw[offset..];
        let (line, next) = match rest.find('\n') {
            Some(pos) => (&rest[..pos], offset + pos + 1),
            None => (rest, raw.len()),
        };
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return (fields, &raw[next..]);
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            match fields.last_mut() {
                Some((_, value)) => {
                    let continuation = line.trim();
                    if !continuation.is_empty() {
                        if !value.is_empty() {
                            value.push(' ');
                        }
                        value.push_str(continuation);
                    }
                }
                None => return (fields, &raw[offset..]),
            }
        } else {
            match parse_field(line) {
                Some(field) => fields.push(field),
                None => return (fields, &raw[offset..]),
            }
        }

        offset = next;
    }

    (fields, "")
}

fn parse_field(line: &str) -> Option<(String, String)> {
    let colon = line.find(':')?;
    let name = &line[..colon];
    if name.is_empty() || !name.bytes().all(|b| (33..=126).contains(&b)) {
        return None;
    }
    Some((name.to_string(), line[colon + 1..].trim().to_string()))
}

fn header_value<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn content_type(fields: &[(String, String)], default_type: &str) -> (String, HashMap<String, String>) {
    match header_value(fields, "Content-Type") {
        Some(value) => {
            let (mime_type, params) = parse_params(value);
            if mime_type.contains('/') {
                (mime_type, params)
            } else {
                ("text/plain".to_string(), params)
            }
        }
        None => (default_type.to_string(), HashMap::new()),
    }
}

fn child_default_type(multipart_type: &str) -> &'static str {
    if multipart_type == "multipart/digest" {
        "message/rfc822"
    } else {
        "text/plain"
    }
}

/// Parses `type/subtype; key=value; key="quoted; value"`. Keys and the
/// type are lowercased.
fn parse_params(value: &str) -> (String, HashMap<String, String>) {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in value.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    segments.push(current);

    let mut iter = segments.into_iter();
    let mime_type = iter.next().unwrap_or_default().trim().to_ascii_lowercase();
    let params = iter
        .filter_map(|segment| {
            let (key, val) = segment.split_once('=')?;
            let val = val.trim();
            let val = val
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(val);
            Some((key.trim().to_ascii_lowercase(), val.to_string()))
        })
        .collect();

    (mime_type, params)
}

/// Splits a multipart body on its boundary delimiters. The preamble and
/// epilogue are dropped; an unterminated final part runs to the end.
fn split_parts<'a>(body: &'a str, boundary: &str) -> Result<Vec<&'a str>, MimeError> {
    let delimiter = format!("--{}", boundary);
    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut found = false;
    let mut offset = 0;

    while offset < body.len() {
        let rest = &body[offset..];
        let (line, next) = match rest.find('\n') {
            Some(pos) => (&rest[..pos], offset + pos + 1),
            None => (rest, body.len()),
        };

        if let Some(after) = line.trim_end().strip_prefix(delimiter.as_str()) {
            if after.is_empty() || after == "--" {
                found = true;
                if let Some(start) = current.take() {
                    parts.push(trim_line_break(&body[start..offset]));
                }
                if after == "--" {
                    return Ok(parts);
                }
                current = Some(next);
            }
        }

        offset = next;
    }

    if !found {
        return Err(MimeError::BoundaryNotFound(boundary.to_string()));
    }
    if let Some(start) = current {
        parts.push(&body[start..]);
    }
    Ok(parts)
}

fn trim_line_break(part: &str) -> &str {
    let part = part.strip_suffix('\n').unwrap_or(part);
    part.strip_suffix('\r').unwrap_or(part)
}

/// Transfer-decodes a payload, falling back to the encoded text when the
/// declared encoding cannot be undone.
fn decode_payload(body: &str, fields: &[(String, String)], charset: Option<&str>) -> String {
    let encoding = header_value(fields, "Content-Transfer-Encoding")
        .map(|e| e.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let decoded = match encoding.as_str() {
        "base64" => decode_base64(body),
        "quoted-printable" => {
            quoted_printable::decode(body.as_bytes(), quoted_printable::ParseMode::Robust).ok()
        }
        _ => return body.to_string(),
    };

    match decoded {
        Some(bytes) => bytes_to_text(&bytes, charset),
        None => {
            log::debug!("Failed to decode {} payload, using raw content", encoding);
            body.to_string()
        }
    }
}

fn decode_base64(text: &str) -> Option<Vec<u8>> {
    let cleaned: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    general_purpose::STANDARD
        .decode(&cleaned)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(cleaned.trim_end_matches('=')))
        .ok()
}

/// Windows-1252 code points for bytes 0x80..=0x9F. The five bytes the code
/// page leaves undefined map to the matching C1 control, as latin-1 does.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

fn bytes_to_text(bytes: &[u8], charset: Option<&str>) -> String {
    let charset = charset.unwrap_or("utf-8").trim().to_ascii_lowercase();
    match charset.as_str() {
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => {
            bytes.iter().map(|&b| b as char).collect()
        }
        "windows-1252" | "cp1252" => bytes
            .iter()
            .map(|&b| match b {
                0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
                _ => b as char,
            })
            .collect(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_headers_and_body() {
        let normalizer = EmailNormalizer::new();
        let combined = normalizer.normalize("Subject: Test\nFrom: a@b.com\nTo: c@d.com\n\nBody");
        assert_eq!(combined, "Subject: Test\nFrom: a@b.com\nTo: c@d.com\n\nBody");
    }

    #[test]
    fn test_empty_input() {
        let normalizer = EmailNormalizer::new();
        assert_eq!(normalizer.normalize(""), "Subject: \nFrom: \nTo: \n\n");
    }

    #[test]
    fn test_text_without_headers_is_body() {
        let normalizer = EmailNormalizer::new();
        assert_eq!(
            normalizer.normalize("just some words\nand more"),
            "Subject: \nFrom: \nTo: \n\njust some words\nand more"
        );
    }

    #[test]
    fn test_all_headers_extracted() {
        let normalizer = EmailNormalizer::new();
        let parsed = normalizer
            .parse(
                "from: Alice <alice@example.com>\r\n\
                 TO: bob@example.com\r\n\
                 Subject: Quarterly\r\n\
                 \treport\r\n\
                 Return-Path: <bounce@example.com>\r\n\
                 X-Mailer: Mailer 1.0\r\n\
                 Message-ID: <1@example.com>\r\n\
                 \r\n\
                 Hello",
            )
            .unwrap();

        assert_eq!(parsed.headers.subject, "Quarterly report");
        assert_eq!(parsed.headers.from, "Alice <alice@example.com>");
        assert_eq!(parsed.headers.to, "bob@example.com");
        assert_eq!(parsed.headers.return_path, "<bounce@example.com>");
        assert_eq!(parsed.headers.x_mailer, "Mailer 1.0");
        assert_eq!(parsed.headers.message_id, "<1@example.com>");
        assert_eq!(parsed.body_text(), "Hello");
    }

    #[test]
    fn test_encoded_word_subject() {
        let normalizer = EmailNormalizer::new();
        let parsed = normalizer
            .parse("Subject: =?utf-8?B?VmVyaWZ5?= =?utf-8?Q?_your_account?=\n\nx")
            .unwrap();
        assert_eq!(parsed.headers.subject, "Verify your account");
    }

    #[test]
    fn test_multipart_traversal() {
        let raw = "Subject: Invoice\n\
                   Content-Type: multipart/mixed; boundary=\"outer\"\n\
                   \n\
                   preamble\n\
                   --outer\n\
                   Content-Type: multipart/alternative; boundary=inner\n\
                   \n\
                   --inner\n\
                   Content-Type: text/plain; charset=utf-8\n\
                   Content-Transfer-Encoding: quoted-printable\n\
                   \n\
                   Pay =3D now\n\
                   --inner\n\
                   Content-Type: text/html\n\
                   Content-Transfer-Encoding: base64\n\
                   \n\
                   PHA+UGF5PC9wPjxwPm5vdzwvcD48YSBocmVmPSJodHRwOi8vYml0Lmx5L3giPmxpbms8L2E+\n\
                   --inner--\n\
                   --outer\n\
                   Content-Type: text/plain\n\
                   Content-Disposition: attachment; filename=\"secret.txt\"\n\
                   \n\
                   attached words\n\
                   --outer--\n\
                   epilogue\n";

        let normalizer = EmailNormalizer::new();
        let parsed = normalizer.parse(raw).unwrap();

        assert!(parsed.is_multipart());
        assert_eq!(parsed.body_fragments, vec!["Pay = now", "Pay now link"]);
        assert_eq!(parsed.html_fragments.len(), 1);
        assert!(parsed.html_fragments[0].contains("http://bit.ly/x"));
        assert_eq!(
            parsed.combined_text(),
            "Subject: Invoice\nFrom: \nTo: \n\nPay = now\nPay now link\n"
        );
    }

    #[test]
    fn test_invalid_base64_part_uses_raw_payload() {
        let raw = "Content-Type: multipart/mixed; boundary=b\n\n\
                   --b\n\
                   Content-Transfer-Encoding: base64\n\
                   \n\
                   not*base64!\n\
                   --b--\n";
        let parsed = EmailNormalizer::new().parse(raw).unwrap();
        assert_eq!(parsed.body_fragments, vec!["not*base64!"]);
    }

    #[test]
    fn test_latin1_charset() {
        let raw = "Content-Type: text/plain; charset=iso-8859-1\n\
                   Content-Transfer-Encoding: quoted-printable\n\
                   \n\
                   caf=E9";
        let parsed = EmailNormalizer::new().parse(raw).unwrap();
        assert_eq!(parsed.body_text(), "café");
    }

    #[test]
    fn test_windows_1252_charset() {
        let raw = "Content-Type: text/plain; charset=windows-1252\n\
                   Content-Transfer-Encoding: quoted-printable\n\
                   \n\
                   =93Pay =8010 now=94 caf=E9";
        let parsed = EmailNormalizer::new().parse(raw).unwrap();
        assert_eq!(parsed.body_text(), "\u{201C}Pay \u{20AC}10 now\u{201D} café");

        assert_eq!(bytes_to_text(&[0x81, 0x9F], Some("CP1252")), "\u{0081}\u{0178}");
        assert_eq!(bytes_to_text(&[0x80], Some("iso-8859-1")), "\u{0080}");
    }

    #[test]
    fn test_single_part_html_not_stripped() {
        let raw = "Content-Type: text/html\n\n<a href=\"http://1.2.3.4/\">x</a>";
        let parsed = EmailNormalizer::new().parse(raw).unwrap();
        assert_eq!(parsed.body_text(), "<a href=\"http://1.2.3.4/\">x</a>");
        assert_eq!(parsed.html_fragments.len(), 1);
    }

    #[test]
    fn test_broken_multipart_falls_back_to_raw() {
        let normalizer = EmailNormalizer::new();

        let no_boundary = "Subject: x\nContent-Type: multipart/mixed\n\nbody";
        assert_eq!(normalizer.parse(no_boundary).unwrap_err(), MimeError::MissingBoundary);
        assert_eq!(normalizer.normalize(no_boundary), no_boundary);

        let missing_delimiter = "Content-Type: multipart/mixed; boundary=zzz\n\nbody";
        assert!(matches!(
            normalizer.parse(missing_delimiter),
            Err(MimeError::BoundaryNotFound(_))
        ));
        assert_eq!(normalizer.normalize(missing_delimiter), missing_delimiter);
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        let depth = 200;
        let mut raw = String::from("Content-Type: multipart/mixed; boundary=b0\n\n");
        for level in 0..depth {
            raw.push_str(&format!(
                "--b{}\nContent-Type: multipart/mixed; boundary=b{}\n\n",
                level,
                level + 1
            ));
        }
        raw.push_str(&format!("--b{}\nContent-Type: text/plain\n\ndeep text\n", depth));

        let normalizer = EmailNormalizer::from_config(&NormalizerConfig { max_mime_depth: 8 });
        let parsed = normalizer.parse(&raw).unwrap();
        assert!(parsed.body_fragments.is_empty());

        let shallow = EmailNormalizer::from_config(&NormalizerConfig { max_mime_depth: 500 });
        let parsed = shallow.parse(&raw).unwrap();
        assert_eq!(parsed.body_fragments, vec!["deep text\n"]);
    }

    #[test]
    fn test_malformed_inputs_never_fail() {
        let normalizer = EmailNormalizer::new();
        let inputs = [
            "\n\n\n",
            ":::\n\n",
            "Content-Type: multipart/mixed; boundary=\"\n\n--",
            "Content-Type: text/plain\nContent-Transfer-Encoding: base64\n\n%%%%",
            "Subject: =?bogus?X?abc?=\n\nbody",
            "\u{0}\u{1}\u{2}binary\u{ff}",
            "Content-Type: multipart/alternative; boundary=x\n\n--x\n--x\n--x--",
        ];

        for input in inputs {
            let first = normalizer.normalize(input);
            let second = normalizer.normalize(input);
            assert_eq!(first, second);
        }
    }
}
