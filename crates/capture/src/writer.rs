//! Persist correlated entries: once under the visit's profile directory and
//! once in the flat per-run archive.

use crumbtrail_core::{BrowsingProfile, CorrelatedEntry, Result};
use std::path::PathBuf;
use tracing::info;

pub struct CaptureWriter {
    archive_dir: PathBuf,
}

impl CaptureWriter {
    pub fn new(archive_dir: PathBuf) -> Self {
        Self { archive_dir }
    }

    /// Write both copies of the visit's capture artifact. The profile copy
    /// always reflects only the most recent visit; the archive copy is keyed
    /// by a sanitized form of the url. Callers treat failure as non-fatal
    /// for the visit.
    pub fn write(
        &self,
        profile: &BrowsingProfile,
        url: &str,
        entries: &[CorrelatedEntry],
    ) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;

        std::fs::create_dir_all(&profile.dir)?;
        std::fs::write(profile.capture_file(), &json)?;

        std::fs::create_dir_all(&self.archive_dir)?;
        let archive_file = self.archive_dir.join(format!("{}.json", archive_slug(url)));
        std::fs::write(&archive_file, &json)?;

        info!(
            entries = entries.len(),
            archive = %archive_file.display(),
            "Capture data saved"
        );
        Ok(())
    }
}

/// Archive file stem for a url: scheme marker dropped, `www.` removed,
/// separators normalized to `_`.
pub fn archive_slug(url: &str) -> String {
    let after_scheme = url.rsplit("//").next().unwrap_or(url);
    after_scheme
        .replace("www.", "")
        .chars()
        .map(|c| if c == '.' || c == '/' || c == ':' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crumbtrail_core::{PartyType, Paths};
    use tempfile::TempDir;

    fn entry() -> CorrelatedEntry {
        CorrelatedEntry {
            cookie_name: "sid".into(),
            cookie_value: "v".into(),
            cookie_domain: ".example.com".into(),
            cookie_path: "/".into(),
            cookie_secure: true,
            cookie_http_only: false,
            request_url: Some("https://example.com/a".into()),
            request_method: Some("GET".into()),
            request_timestamp: Some("t".into()),
            source_url: "https://example.com".into(),
            timestamp: "t".into(),
            page_title: "Example".into(),
            browser_id: "example_com".into(),
            party_type: PartyType::FirstParty,
        }
    }

    #[test]
    fn test_archive_slug() {
        assert_eq!(archive_slug("https://www.example.com"), "example_com");
        assert_eq!(archive_slug("http://sub.example.com/path"), "sub_example_com_path");
        assert_eq!(archive_slug("example.com"), "example_com");
    }

    #[test]
    fn test_writes_both_copies_and_overwrites_profile_copy() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::with_base(tmp.path().to_path_buf());
        let profile = paths.profile("https://www.example.com");
        let writer = CaptureWriter::new(paths.archive_dir());

        writer.write(&profile, "https://www.example.com", &[entry()]).unwrap();
        writer.write(&profile, "https://www.example.com", &[]).unwrap();

        // Profile copy reflects the most recent (empty) visit.
        let profile_copy = std::fs::read_to_string(profile.capture_file()).unwrap();
        let parsed: Vec<CorrelatedEntry> = serde_json::from_str(&profile_copy).unwrap();
        assert!(parsed.is_empty());

        assert!(paths.archive_dir().join("example_com.json").exists());
    }

    #[test]
    fn test_party_type_round_trips_in_artifact() {
        let json = serde_json::to_string(&[entry()]).unwrap();
        assert!(json.contains("\"party_type\":\"first-party\""));
        assert!(json.contains("\"cookie_httpOnly\":false"));
    }
}
