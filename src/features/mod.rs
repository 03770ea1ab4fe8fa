pub mod link_analyzer;

pub use link_analyzer::{analyze_urls, LinkAnalyzer, SuspiciousUrl, UrlReport, UrlRisk};
