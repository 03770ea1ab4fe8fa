/// Domain string predicates used by the URL heuristics
pub struct DomainUtils;

impl DomainUtils {
    /// Lowercased authority (`userinfo@host:port`) of an absolute URL, as
    /// written. `None` for relative, host-less or unparsable URLs.
    pub fn extract_authority(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        parsed.host_str()?;

        let after_scheme = &url.trim_start()[parsed.scheme().len()..];
        let rest = after_scheme.strip_prefix(':')?.trim_start_matches(['/', '\\']);
        let end = rest.find(['/', '\\', '?', '#']).unwrap_or(rest.len());
        let authority = rest[..end].to_ascii_lowercase();

        if authority.is_empty() {
            None
        } else {
            Some(authority)
        }
    }

    /// Exact match against any entry
    pub fn matches_exactly(domain: &str, domain_list: &[String]) -> bool {
        domain_list.iter().any(|d| domain == d)
    }

    /// Plain string suffix match, e.g. `.xyz`
    pub fn ends_with_any(domain: &str, suffixes: &[String]) -> bool {
        suffixes.iter().any(|s| domain.ends_with(s.as_str()))
    }

    /// Trusted domains the host mentions without actually ending with them,
    /// e.g. `paypal.com.evil.net`.
    pub fn deceptive_brands<'a>(domain: &str, trusted: &'a [String]) -> Vec<&'a str> {
        trusted
            .iter()
            .filter(|t| domain.contains(t.as_str()) && !domain.ends_with(t.as_str()))
            .map(String::as_str)
            .collect()
    }
}
