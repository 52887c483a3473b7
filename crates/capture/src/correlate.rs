//! Network event correlation: reconstruct request lifecycles from the raw
//! performance-log stream and decide which request caused each observed
//! cookie to be set.

use async_trait::async_trait;
use crumbtrail_core::{host_of, CapturedRequest, CookieRecord, CorrelatedEntry, PartyType, PerfLogEntry};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Source of cookie-jar snapshots taken while replaying the event stream.
/// The live implementation reads the browser jar over CDP; tests script the
/// sequence. A failed snapshot is reported as an empty jar.
#[async_trait]
pub trait JarProvider: Send {
    async fn snapshot(&mut self) -> Vec<CookieRecord>;
}

/// Replay the performance log in arrival order and reconstruct request
/// lifecycles.
///
/// On `requestWillBeSent` a request is opened and the jar is snapshotted,
/// keyed by request id. On `loadingFinished` for a known open request the
/// jar is snapshotted again and diffed: cookies present now but absent
/// before are attached as that request's `cookies_set`, and the before
/// snapshot is discarded. A cookie claimed by one diff is excluded from
/// later diffs so the earliest-finishing request wins. Entries missing
/// required fields and finish events for unknown request ids are skipped
/// without error.
pub async fn replay(entries: &[PerfLogEntry], jar: &mut dyn JarProvider) -> Vec<CapturedRequest> {
    let mut requests: Vec<CapturedRequest> = Vec::new();
    // Request id -> position in `requests`; insertion order is the arrival
    // order attribution depends on.
    let mut open: HashMap<String, usize> = HashMap::new();
    // Request id -> jar state at request start, keyed by (name, domain).
    let mut cookies_before: HashMap<String, HashMap<String, CookieRecord>> = HashMap::new();
    // Jar keys already claimed by an earlier diff.
    let mut claimed: HashSet<String> = HashSet::new();

    for entry in entries {
        match entry.method.as_str() {
            "Network.requestWillBeSent" => {
                let Some(request_id) = entry.params.get("requestId").and_then(|v| v.as_str())
                else {
                    continue;
                };
                let Some(request) = entry.params.get("request") else {
                    continue;
                };
                let Some(url) = request.get("url").and_then(|v| v.as_str()) else {
                    continue;
                };

                let before: HashMap<String, CookieRecord> = jar
                    .snapshot()
                    .await
                    .into_iter()
                    .map(|c| (c.jar_key(), c))
                    .collect();
                cookies_before.insert(request_id.to_string(), before);

                let headers = request
                    .get("headers")
                    .and_then(|v| v.as_object())
                    .map(|obj| {
                        obj.iter()
                            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();

                open.insert(request_id.to_string(), requests.len());
                requests.push(CapturedRequest {
                    id: request_id.to_string(),
                    url: url.to_string(),
                    method: request
                        .get("method")
                        .and_then(|v| v.as_str())
                        .unwrap_or("GET")
                        .to_string(),
                    timestamp: iso_timestamp(entry.timestamp_ms),
                    headers,
                    finished: false,
                    cookies_set: Vec::new(),
                });
            }
            "Network.loadingFinished" => {
                let Some(request_id) = entry.params.get("requestId").and_then(|v| v.as_str())
                else {
                    continue;
                };
                // Out-of-order or unknown finish events are ignored.
                let Some(&idx) = open.get(request_id) else {
                    continue;
                };
                let Some(before) = cookies_before.remove(request_id) else {
                    continue;
                };

                let now = jar.snapshot().await;
                let new_cookies: Vec<CookieRecord> = now
                    .into_iter()
                    .filter(|c| !before.contains_key(&c.jar_key()))
                    .filter(|c| !claimed.contains(&c.jar_key()))
                    .collect();

                requests[idx].finished = true;
                if !new_cookies.is_empty() {
                    debug!(
                        url = %truncate(&requests[idx].url, 50),
                        count = new_cookies.len(),
                        "Request set cookies"
                    );
                    for c in &new_cookies {
                        claimed.insert(c.jar_key());
                    }
                    requests[idx].cookies_set = new_cookies;
                }
            }
            _ => {}
        }
    }

    let cookies_found: usize = requests.iter().map(|r| r.cookies_set.len()).sum();
    info!(
        requests = requests.len(),
        cookies_set = cookies_found,
        "Replayed network log"
    );
    requests
}

/// Shared per-visit context stamped onto every correlated entry.
#[derive(Debug, Clone)]
pub struct VisitContext {
    pub source_url: String,
    pub page_title: String,
    pub browser_id: String,
    pub timestamp: String,
}

/// Attribute observed cookies to requests and flatten into entries.
///
/// Pass 1 emits one entry per directly-captured cookie (`cookies_set`),
/// walking requests in arrival order. Pass 2 falls back to domain-suffix
/// matching: each still-unattributed cookie is claimed by the earliest
/// finished, cookie-less, non-internal request whose host matches. Pass 3
/// emits every leftover cookie once, with request fields empty. Requests
/// with browser-internal urls never produce entries.
pub fn correlate(
    requests: &[CapturedRequest],
    cookies: &[CookieRecord],
    ctx: &VisitContext,
) -> Vec<CorrelatedEntry> {
    let source_host = host_of(&ctx.source_url);
    let mut entries = Vec::new();
    let mut attributed: HashSet<String> = HashSet::new();

    // Pass 1: direct before/after attribution.
    for request in requests {
        if request.is_internal() {
            continue;
        }
        for cookie in &request.cookies_set {
            if cookie.name.is_empty() || cookie.value.is_empty() {
                continue;
            }
            if !attributed.insert(cookie.jar_key()) {
                continue;
            }
            entries.push(make_entry(cookie, Some(request), ctx, &source_host));
        }
    }

    // Pass 2: heuristic domain matching for requests that captured nothing.
    // Earlier requests get first claim on ambiguous matches.
    for request in requests {
        if request.is_internal() || !request.finished || !request.cookies_set.is_empty() {
            continue;
        }
        let request_host = request.host();
        if request_host.is_empty() {
            continue;
        }
        for cookie in cookies {
            if cookie.name.is_empty() || cookie.value.is_empty() {
                continue;
            }
            if attributed.contains(&cookie.jar_key()) {
                continue;
            }
            let clean = cookie.domain.trim_start_matches('.');
            if clean.is_empty() {
                continue;
            }
            if request_host.ends_with(clean) || clean == request_host || request_host == cookie.domain
            {
                attributed.insert(cookie.jar_key());
                entries.push(make_entry(cookie, Some(request), ctx, &source_host));
            }
        }
    }

    // Pass 3: cookies no request could be matched to.
    for cookie in cookies {
        if cookie.name.is_empty() || cookie.value.is_empty() {
            continue;
        }
        if !attributed.insert(cookie.jar_key()) {
            continue;
        }
        entries.push(make_entry(cookie, None, ctx, &source_host));
    }

    info!(entries = entries.len(), "Correlated cookie entries");
    entries
}

/// First/third-party classification of a cookie relative to the page host.
pub fn classify_party(cookie_domain: &str, source_host: &str) -> PartyType {
    if cookie_domain.is_empty() {
        return PartyType::Unknown;
    }
    let clean = cookie_domain.trim_start_matches('.');
    if source_host == clean || source_host.ends_with(clean) {
        PartyType::FirstParty
    } else {
        PartyType::ThirdParty
    }
}

fn make_entry(
    cookie: &CookieRecord,
    request: Option<&CapturedRequest>,
    ctx: &VisitContext,
    source_host: &str,
) -> CorrelatedEntry {
    CorrelatedEntry {
        cookie_name: cookie.name.clone(),
        cookie_value: cookie.value.clone(),
        cookie_domain: cookie.domain.clone(),
        cookie_path: cookie.path.clone(),
        cookie_secure: cookie.secure,
        cookie_http_only: cookie.http_only,
        request_url: request.map(|r| r.url.clone()),
        request_method: request.map(|r| r.method.clone()),
        request_timestamp: request.map(|r| r.timestamp.clone()),
        source_url: ctx.source_url.clone(),
        timestamp: ctx.timestamp.clone(),
        page_title: ctx.page_title.clone(),
        browser_id: ctx.browser_id.clone(),
        party_type: classify_party(&cookie.domain, source_host),
    }
}

fn iso_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;

    struct ScriptedJar {
        snaps: VecDeque<Vec<CookieRecord>>,
    }

    impl ScriptedJar {
        fn new(snaps: Vec<Vec<CookieRecord>>) -> Self {
            Self {
                snaps: snaps.into(),
            }
        }
    }

    #[async_trait]
    impl JarProvider for ScriptedJar {
        async fn snapshot(&mut self) -> Vec<CookieRecord> {
            self.snaps.pop_front().unwrap_or_default()
        }
    }

    fn cookie(name: &str, domain: &str) -> CookieRecord {
        CookieRecord {
            name: name.into(),
            value: "v".into(),
            domain: domain.into(),
            path: "/".into(),
            secure: false,
            http_only: false,
        }
    }

    fn sent(id: &str, url: &str, ts: i64) -> PerfLogEntry {
        PerfLogEntry {
            method: "Network.requestWillBeSent".into(),
            params: json!({
                "requestId": id,
                "request": {"url": url, "method": "GET", "headers": {"User-Agent": "test"}},
            }),
            timestamp_ms: ts,
        }
    }

    fn finished(id: &str, ts: i64) -> PerfLogEntry {
        PerfLogEntry {
            method: "Network.loadingFinished".into(),
            params: json!({"requestId": id}),
            timestamp_ms: ts,
        }
    }

    fn ctx() -> VisitContext {
        VisitContext {
            source_url: "https://shop.example.com".into(),
            page_title: "Shop".into(),
            browser_id: "shop_example_com".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn test_diff_attributes_cookie_to_causing_request() {
        // R1 starts (empty jar), R2 starts (empty jar), R1 finishes with C
        // in the jar, R2 finishes with C still there. C belongs to R1 only.
        let c = cookie("sid", ".example.com");
        let entries = vec![
            sent("R1", "https://example.com/a", 0),
            sent("R2", "https://cdn.example.com/b", 1),
            finished("R1", 2),
            finished("R2", 3),
        ];
        let mut jar = ScriptedJar::new(vec![
            vec![],
            vec![],
            vec![c.clone()],
            vec![c.clone()],
        ]);
        let requests = replay(&entries, &mut jar).await;

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].cookies_set.len(), 1);
        assert!(requests[1].cookies_set.is_empty());
        assert!(requests[0].finished && requests[1].finished);

        let out = correlate(&requests, &[c], &ctx());
        let sid: Vec<_> = out.iter().filter(|e| e.cookie_name == "sid").collect();
        assert_eq!(sid.len(), 1);
        assert_eq!(sid[0].request_url.as_deref(), Some("https://example.com/a"));
    }

    #[tokio::test]
    async fn test_unfinished_request_keeps_no_attribution() {
        let c = cookie("sid", ".example.com");
        let entries = vec![sent("R1", "https://example.com/a", 0)];
        let mut jar = ScriptedJar::new(vec![vec![]]);
        let requests = replay(&entries, &mut jar).await;

        assert!(!requests[0].finished);
        // Unfinished requests are skipped by the fallback pass, so the
        // cookie comes out request-less.
        let out = correlate(&requests, &[c], &ctx());
        assert_eq!(out.len(), 1);
        assert!(out[0].request_url.is_none());
    }

    #[tokio::test]
    async fn test_unknown_finish_and_malformed_entries_are_skipped() {
        let entries = vec![
            PerfLogEntry {
                method: "Network.requestWillBeSent".into(),
                params: json!({"request": {"url": "https://x.com"}}), // no requestId
                timestamp_ms: 0,
            },
            finished("ghost", 1),
            sent("R1", "https://example.com", 2),
            finished("R1", 3),
        ];
        let mut jar = ScriptedJar::new(vec![vec![], vec![]]);
        let requests = replay(&entries, &mut jar).await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].finished);
    }

    #[test]
    fn test_fallback_assigns_earliest_matching_request_once() {
        let mk_req = |id: &str, url: &str| CapturedRequest {
            id: id.into(),
            url: url.into(),
            method: "GET".into(),
            timestamp: "t".into(),
            headers: Default::default(),
            finished: true,
            cookies_set: vec![],
        };
        let requests = vec![
            mk_req("R1", "https://ads.tracker.io/pixel"),
            mk_req("R2", "https://tracker.io/beacon"),
            mk_req("R3", "https://cdn.example.com/app.js"),
        ];
        let cookies = vec![cookie("uid", "tracker.io"), cookie("sid", ".example.com")];

        let out = correlate(&requests, &cookies, &ctx());
        assert_eq!(out.len(), 2);
        let uid = out.iter().find(|e| e.cookie_name == "uid").unwrap();
        let sid = out.iter().find(|e| e.cookie_name == "sid").unwrap();
        // uid matches both R1 and R2; the earliest-started wins.
        assert_eq!(uid.request_url.as_deref(), Some("https://ads.tracker.io/pixel"));
        assert_eq!(sid.request_url.as_deref(), Some("https://cdn.example.com/app.js"));
    }

    #[test]
    fn test_internal_scheme_requests_are_excluded() {
        let req = CapturedRequest {
            id: "R1".into(),
            url: "chrome://newtab/".into(),
            method: "GET".into(),
            timestamp: "t".into(),
            headers: Default::default(),
            finished: true,
            cookies_set: vec![cookie("sid", ".example.com")],
        };
        let out = correlate(&[req], &[cookie("sid", ".example.com")], &ctx());
        // The cookie still comes out, but as a cookie-only entry.
        assert_eq!(out.len(), 1);
        assert!(out[0].request_url.is_none());
    }

    #[test]
    fn test_party_classification() {
        assert_eq!(classify_party(".example.com", "shop.example.com"), PartyType::FirstParty);
        assert_eq!(classify_party("example.com", "example.com"), PartyType::FirstParty);
        assert_eq!(classify_party("tracker.io", "shop.example.com"), PartyType::ThirdParty);
        assert_eq!(classify_party("", "shop.example.com"), PartyType::Unknown);
    }

    #[test]
    fn test_cookie_without_name_or_value_is_dropped() {
        let mut nameless = cookie("", ".example.com");
        nameless.value = "v".into();
        let mut valueless = cookie("empty", ".example.com");
        valueless.value = String::new();

        let out = correlate(&[], &[nameless, valueless], &ctx());
        assert!(out.is_empty());
    }
}
