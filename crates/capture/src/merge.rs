//! Deduplicate cookies gathered from multiple enumeration channels.

use crumbtrail_core::{CookieRecord, Result};
use std::collections::HashSet;
use tracing::{info, warn};

/// Merge N independently-obtained cookie lists into one deduplicated list.
///
/// A failed channel is logged and skipped; all channels failing yields an
/// empty list so the crawl continues with zero cookies instead of aborting.
/// Deduplication key is (name, domain, path); the first occurrence wins.
pub fn merge_channels(channels: Vec<Result<Vec<CookieRecord>>>) -> Vec<CookieRecord> {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mut merged = Vec::new();

    for (i, channel) in channels.into_iter().enumerate() {
        match channel {
            Ok(cookies) => {
                for cookie in cookies {
                    if seen.insert(cookie.dedup_key()) {
                        merged.push(cookie);
                    }
                }
            }
            Err(e) => {
                warn!(channel = i, error = %e, "Cookie enumeration channel failed");
            }
        }
    }

    info!(cookies = merged.len(), "Merged cookie channels");
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crumbtrail_core::Error;

    fn cookie(name: &str, domain: &str, path: &str, value: &str) -> CookieRecord {
        CookieRecord {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: path.into(),
            secure: false,
            http_only: false,
        }
    }

    #[test]
    fn test_first_occurrence_wins() {
        let merged = merge_channels(vec![
            Ok(vec![cookie("sid", ".example.com", "/", "original")]),
            Ok(vec![cookie("sid", ".example.com", "/", "overwritten")]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, "original");
    }

    #[test]
    fn test_distinct_paths_are_distinct_cookies() {
        let merged = merge_channels(vec![Ok(vec![
            cookie("sid", ".example.com", "/", "a"),
            cookie("sid", ".example.com", "/shop", "b"),
        ])]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_failed_channel_is_skipped() {
        let merged = merge_channels(vec![
            Err(Error::Session("jar unreachable".into())),
            Ok(vec![cookie("sid", ".example.com", "/", "a")]),
        ]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_all_channels_failing_yields_empty() {
        let merged = merge_channels(vec![
            Err(Error::Session("x".into())),
            Err(Error::Session("y".into())),
        ]);
        assert!(merged.is_empty());
    }
}
