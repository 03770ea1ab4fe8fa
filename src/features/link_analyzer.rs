use crate::config::UrlHeuristicsConfig;
use crate::domain_utils::DomainUtils;
use crate::html_text::HtmlText;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlRisk {
    IpLiteral,
    UnusualTld,
    Shortener,
    DeceptiveBrand,
}

impl UrlRisk {
    pub fn describe(&self) -> &'static str {
        match self {
            UrlRisk::IpLiteral => "IP address instead of domain name",
            UrlRisk::UnusualTld => "unusual top-level domain",
            UrlRisk::Shortener => "URL shortener",
            UrlRisk::DeceptiveBrand => "trusted brand used as a decoy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousUrl {
    pub url: String,
    pub domain: String,
    pub reasons: Vec<UrlRisk>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlReport {
    pub total_urls: usize,
    pub suspicious_count: usize,
    pub suspicious_domains: Vec<String>,
    pub findings: Vec<SuspiciousUrl>,
}

impl UrlReport {
    pub fn merge(&mut self, other: UrlReport) {
        self.total_urls += other.total_urls;
        self.suspicious_count += other.suspicious_count;
        self.suspicious_domains.extend(other.suspicious_domains);
        self.findings.extend(other.findings);
    }
}

pub struct LinkAnalyzer {
    ip_regex: Regex,
    html: HtmlText,
    unusual_tlds: Vec<String>,
    shorteners: Vec<String>,
    trusted_domains: Vec<String>,
}

impl Default for LinkAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkAnalyzer {
    pub fn new() -> Self {
        Self::from_config(&UrlHeuristicsConfig::default())
    }

    pub fn from_config(config: &UrlHeuristicsConfig) -> Self {
        Self {
            ip_regex: Regex::new(r"^\d+\.\d+\.\d+\.\d+$").unwrap(),
            html: HtmlText::new(),
            unusual_tlds: config.unusual_tlds.clone(),
            shorteners: config.shorteners.clone(),
            trusted_domains: config.trusted_domains.clone(),
        }
    }

    pub fn extract_links(&self, html: &str) -> Vec<String> {
        self.html.anchor_hrefs(html)
    }

    /// Scores each URL by its authority (`userinfo@host:port`), so a brand in
    /// the userinfo is a decoy and a port defeats the IP-literal rule. Empty
    /// and unparsable URLs count toward the total but are never suspicious.
    pub fn analyze(&self, urls: &[String]) -> UrlReport {
        let mut report = UrlReport {
            total_urls: urls.len(),
            ..Default::default()
        };

        for url in urls {
            if url.is_empty() {
                continue;
            }

            let Some(domain) = DomainUtils::extract_authority(url) else {
                log::debug!("Skipping unparsable URL: {}", url);
                continue;
            };

            let reasons = self.check_domain(&domain);
            if !reasons.is_empty() {
                log::debug!("Suspicious URL {} ({:?})", url, reasons);
                report.suspicious_count += 1;
                report.suspicious_domains.push(domain.clone());
                report.findings.push(SuspiciousUrl {
                    url: url.clone(),
                    domain,
                    reasons,
                });
            }
        }

        report
    }

    pub fn analyze_html(&self, html: &str) -> UrlReport {
        self.analyze(&self.extract_links(html))
    }

    pub fn check_domain(&self, domain: &str) -> Vec<UrlRisk> {
        let mut reasons = Vec::new();

        if self.ip_regex.is_match(domain) {
            reasons.push(UrlRisk::IpLiteral);
        }
        if DomainUtils::ends_with_any(domain, &self.unusual_tlds) {
            reasons.push(UrlRisk::UnusualTld);
        }
        if DomainUtils::matches_exactly(domain, &self.shorteners) {
            reasons.push(UrlRisk::Shortener);
        }
        if !DomainUtils::deceptive_brands(domain, &self.trusted_domains).is_empty() {
            reasons.push(UrlRisk::DeceptiveBrand);
        }

        reasons
    }
}

lazy_static! {
    static ref DEFAULT_ANALYZER: LinkAnalyzer = LinkAnalyzer::new();
}

/// Extracts the anchors of an HTML fragment and scores them with the
/// default heuristics.
pub fn analyze_urls(html: &str) -> UrlReport {
    DEFAULT_ANALYZER.analyze_html(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ip_literal() {
        let report = LinkAnalyzer::new().analyze(&urls(&["http://192.168.0.1/x"]));
        assert_eq!(report.total_urls, 1);
        assert_eq!(report.suspicious_count, 1);
        assert_eq!(report.suspicious_domains, vec!["192.168.0.1"]);
        assert_eq!(report.findings[0].reasons, vec![UrlRisk::IpLiteral]);
    }

    #[test]
    fn test_trusted_domain_is_clean() {
        let report = LinkAnalyzer::new().analyze(&urls(&["https://amazon.com/order"]));
        assert_eq!(report.total_urls, 1);
        assert_eq!(report.suspicious_count, 0);
        assert!(report.suspicious_domains.is_empty());
    }

    #[test]
    fn test_deceptive_subdomain_with_unusual_tld() {
        let report =
            LinkAnalyzer::new().analyze(&urls(&["https://amazon.com.phish-amazon.xyz/"]));
        assert_eq!(report.suspicious_count, 1);
        assert_eq!(
            report.findings[0].reasons,
            vec![UrlRisk::UnusualTld, UrlRisk::DeceptiveBrand]
        );
    }

    #[test]
    fn test_shortener() {
        let report = LinkAnalyzer::new().analyze(&urls(&["https://bit.ly/abc"]));
        assert_eq!(report.suspicious_count, 1);
        assert_eq!(report.suspicious_domains, vec!["bit.ly"]);
    }

    #[test]
    fn test_empty_and_malformed_count_toward_total() {
        let report = LinkAnalyzer::new().analyze(&urls(&[
            "",
            "not a url",
            "/relative",
            "https://paypal.com.evil.net/login",
            "https://paypal.com.evil.net/again",
        ]));
        assert_eq!(report.total_urls, 5);
        assert_eq!(report.suspicious_count, 2);
        assert_eq!(
            report.suspicious_domains,
            vec!["paypal.com.evil.net", "paypal.com.evil.net"]
        );
    }

    #[test]
    fn test_host_case_is_normalized() {
        let report = LinkAnalyzer::new().analyze(&urls(&["HTTPS://BIT.LY/ABC"]));
        assert_eq!(report.suspicious_count, 1);
    }

    #[test]
    fn test_analyze_html() {
        let report = analyze_urls(
            r#"<p>Dear customer</p>
               <a href="https://www.paypal.com/signin">PayPal</a>
               <a href="http://10.0.0.7/verify">Verify now</a>
               <a href="https://secure-login.tk">Login</a>"#,
        );
        assert_eq!(report.total_urls, 3);
        assert_eq!(report.suspicious_count, 2);
        assert_eq!(report.suspicious_domains, vec!["10.0.0.7", "secure-login.tk"]);
    }

    #[test]
    fn test_brand_in_userinfo_is_deceptive() {
        let report = LinkAnalyzer::new().analyze(&urls(&["http://paypal.com@evil.net/login"]));
        assert_eq!(report.suspicious_count, 1);
        assert_eq!(report.suspicious_domains, vec!["paypal.com@evil.net"]);
        assert_eq!(report.findings[0].reasons, vec![UrlRisk::DeceptiveBrand]);
    }

    #[test]
    fn test_ip_with_port_is_not_ip_literal() {
        let report = LinkAnalyzer::new().analyze(&urls(&["http://192.168.0.1:8080/x"]));
        assert_eq!(report.total_urls, 1);
        assert_eq!(report.suspicious_count, 0);
    }

    #[test]
    fn test_custom_lists() {
        let analyzer = LinkAnalyzer::from_config(&UrlHeuristicsConfig {
            unusual_tlds: vec![".zip".to_string()],
            shorteners: vec![],
            trusted_domains: vec!["example.org".to_string()],
        });
        assert!(analyzer.check_domain("bit.ly").is_empty());
        assert_eq!(analyzer.check_domain("update.zip"), vec![UrlRisk::UnusualTld]);
        assert_eq!(
            analyzer.check_domain("example.org.attacker.net"),
            vec![UrlRisk::DeceptiveBrand]
        );
    }

    #[test]
    fn test_analyze_urls_matches_default_analyzer() {
        let html = r#"<a href="http://bit.ly/x">a</a><a href="https://example.com/">b</a>"#;
        let expected = LinkAnalyzer::new().analyze_html(html);
        assert_eq!(analyze_urls(html), expected);
        assert_eq!(analyze_urls(html), expected);
        assert_eq!(expected.total_urls, 2);
        assert_eq!(expected.suspicious_domains, vec!["bit.ly"]);
    }
}
