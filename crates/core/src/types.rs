//! Shared data model for a crawl: targets, profiles, cookies, network events
//! and the flattened correlated entries written to capture artifacts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

/// One entry from the target list. Immutable during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub index: usize,
    pub url: String,
    pub category: String,
}

impl Target {
    pub fn new(index: usize, url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
            category: category.into(),
        }
    }

    /// Scheme-prefixed form of the target url (`https://` prepended when absent).
    pub fn normalized_url(&self) -> String {
        normalize_url(&self.url)
    }
}

/// Prepend `https://` when the url carries no scheme.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Host component of a url, empty string when unparseable.
pub fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

/// `scheme://host` of a url; visits navigate here first.
pub fn domain_root(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => match u.host_str() {
            Some(host) => format!("{}://{}", u.scheme(), host),
            None => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

/// A persistent per-host browsing identity. The user-data directory under
/// `dir` acts as the browser's cache and cookie store across runs.
#[derive(Debug, Clone)]
pub struct BrowsingProfile {
    pub id: String,
    pub dir: PathBuf,
}

impl BrowsingProfile {
    /// Derive the profile identifier from a url host: `www.` stripped,
    /// every non-alphanumeric byte replaced by `_`.
    pub fn id_for_url(url: &str) -> String {
        let host = host_of(&normalize_url(url));
        let host = host.strip_prefix("www.").unwrap_or(&host);
        host.chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect()
    }

    pub fn user_data_dir(&self) -> PathBuf {
        self.dir.join("user_data")
    }

    pub fn capture_file(&self) -> PathBuf {
        self.dir.join("data.json")
    }
}

/// A browser cookie as enumerated from the jar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, rename = "httpOnly")]
    pub http_only: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl CookieRecord {
    /// Parse one cookie object from a CDP `Network.getCookies` response.
    pub fn from_cdp(value: &Value) -> Option<Self> {
        Some(Self {
            name: value.get("name")?.as_str()?.to_string(),
            value: value
                .get("value")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            domain: value
                .get("domain")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            path: value
                .get("path")
                .and_then(|v| v.as_str())
                .unwrap_or("/")
                .to_string(),
            secure: value.get("secure").and_then(|v| v.as_bool()).unwrap_or(false),
            http_only: value
                .get("httpOnly")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        })
    }

    /// Deduplication identity across enumeration channels.
    pub fn dedup_key(&self) -> (String, String, String) {
        (self.name.clone(), self.domain.clone(), self.path.clone())
    }

    /// Jar-diff identity used by the correlator's before/after snapshots.
    pub fn jar_key(&self) -> String {
        format!("{}:{}", self.name, self.domain)
    }
}

/// One raw performance-log record as streamed from the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfLogEntry {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub timestamp_ms: i64,
}

impl PerfLogEntry {
    /// Parse one JSONL line. Malformed or non-JSON lines yield `None` and
    /// are skipped by callers.
    pub fn from_json_line(line: &str) -> Option<Self> {
        let val: Value = serde_json::from_str(line.trim()).ok()?;
        Some(Self {
            method: val.get("method")?.as_str()?.to_string(),
            params: val.get("params").cloned().unwrap_or(Value::Null),
            timestamp_ms: val
                .get("timestamp_ms")
                .or_else(|| val.get("timestamp"))
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        })
    }
}

/// A reconstructed network request lifecycle. Opened on
/// `Network.requestWillBeSent`, completed on `Network.loadingFinished`;
/// requests that never finish stay open and are excluded from attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub id: String,
    pub url: String,
    pub method: String,
    pub timestamp: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub cookies_set: Vec<CookieRecord>,
}

impl CapturedRequest {
    pub fn host(&self) -> String {
        host_of(&self.url)
    }

    /// Browser-internal urls appear in the raw stream but never in output.
    pub fn is_internal(&self) -> bool {
        self.url.starts_with("chrome://")
            || self.url.starts_with("chrome-extension://")
            || self.url.starts_with("devtools://")
    }
}

/// First/third-party classification of a cookie relative to the visited page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyType {
    #[serde(rename = "first-party")]
    FirstParty,
    #[serde(rename = "third-party")]
    ThirdParty,
    #[serde(rename = "unknown")]
    Unknown,
}

impl PartyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstParty => "first-party",
            Self::ThirdParty => "third-party",
            Self::Unknown => "unknown",
        }
    }
}

/// One flattened correlation fact. Cookie fields are always present; request
/// fields are `None` for cookies no request could be matched to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatedEntry {
    pub cookie_name: String,
    pub cookie_value: String,
    pub cookie_domain: String,
    pub cookie_path: String,
    pub cookie_secure: bool,
    #[serde(rename = "cookie_httpOnly")]
    pub cookie_http_only: bool,
    pub request_url: Option<String>,
    pub request_method: Option<String>,
    pub request_timestamp: Option<String>,
    pub source_url: String,
    pub timestamp: String,
    pub page_title: String,
    pub browser_id: String,
    pub party_type: PartyType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_id_strips_www_and_sanitizes() {
        assert_eq!(BrowsingProfile::id_for_url("https://www.example.com"), "example_com");
        assert_eq!(BrowsingProfile::id_for_url("shop.example.co.uk"), "shop_example_co_uk");
        assert_eq!(BrowsingProfile::id_for_url("https://127.0.0.1:8080"), "127_0_0_1");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
    }

    #[test]
    fn test_domain_root() {
        assert_eq!(
            domain_root("https://shop.example.com/cart?x=1"),
            "https://shop.example.com"
        );
    }

    #[test]
    fn test_cookie_from_cdp_defaults() {
        let c = CookieRecord::from_cdp(&json!({"name": "sid", "value": "abc"})).unwrap();
        assert_eq!(c.path, "/");
        assert!(!c.secure);
        assert_eq!(c.jar_key(), "sid:");
    }

    #[test]
    fn test_perf_log_line_parse() {
        let line = r#"{"method":"Network.loadingFinished","params":{"requestId":"1"},"timestamp_ms":42}"#;
        let entry = PerfLogEntry::from_json_line(line).unwrap();
        assert_eq!(entry.method, "Network.loadingFinished");
        assert_eq!(entry.timestamp_ms, 42);

        assert!(PerfLogEntry::from_json_line("not json at all").is_none());
        assert!(PerfLogEntry::from_json_line(r#"{"params":{}}"#).is_none());
    }

    #[test]
    fn test_internal_request_urls() {
        let mk = |url: &str| CapturedRequest {
            id: "1".into(),
            url: url.into(),
            method: "GET".into(),
            timestamp: String::new(),
            headers: HashMap::new(),
            finished: true,
            cookies_set: vec![],
        };
        assert!(mk("chrome://newtab/").is_internal());
        assert!(mk("chrome-extension://abc/x.js").is_internal());
        assert!(mk("devtools://devtools/page.html").is_internal());
        assert!(!mk("https://example.com").is_internal());
    }

    #[test]
    fn test_party_type_serializes_hyphenated() {
        assert_eq!(
            serde_json::to_string(&PartyType::FirstParty).unwrap(),
            "\"first-party\""
        );
    }
}
