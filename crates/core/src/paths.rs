use std::path::PathBuf;

use crate::types::BrowsingProfile;

/// Filesystem layout for a crawl base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".crumbtrail"))
            .unwrap_or_else(|| PathBuf::from(".crumbtrail"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.base.join("profiles")
    }

    pub fn profile(&self, url: &str) -> BrowsingProfile {
        let id = BrowsingProfile::id_for_url(url);
        let dir = self.profiles_dir().join(&id);
        BrowsingProfile { id, dir }
    }

    /// Flat per-run archive of capture artifacts, one file per visited url.
    pub fn archive_dir(&self) -> PathBuf {
        self.base.join("data")
    }

    /// The one durable record of per-target crawl history.
    pub fn ledger_file(&self) -> PathBuf {
        self.base.join("masterfile.csv")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.profiles_dir())?;
        std::fs::create_dir_all(self.archive_dir())?;
        Ok(())
    }

    pub fn ensure_profile_dirs(&self, profile: &BrowsingProfile) -> std::io::Result<()> {
        std::fs::create_dir_all(&profile.dir)?;
        std::fs::create_dir_all(profile.user_data_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_profile_layout() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::with_base(tmp.path().to_path_buf());
        let profile = paths.profile("https://www.example.com");

        assert_eq!(profile.id, "example_com");
        assert!(profile.dir.starts_with(paths.profiles_dir()));
        assert!(profile.user_data_dir().ends_with("user_data"));

        paths.ensure_dirs().unwrap();
        paths.ensure_profile_dirs(&profile).unwrap();
        assert!(profile.user_data_dir().is_dir());
        assert!(paths.archive_dir().is_dir());
    }
}
