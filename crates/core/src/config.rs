use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlConfig {
    /// Seconds to dwell on each page while the annotation window is open.
    #[serde(default = "default_dwell_secs")]
    pub dwell_secs: u64,
    /// Ask the operator to confirm after this many consecutive successes.
    /// 0 disables the checkpoint.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u32,
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
}

fn default_dwell_secs() -> u64 {
    60
}

fn default_checkpoint_every() -> u32 {
    10
}

fn default_navigation_timeout_secs() -> u64 {
    20
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            dwell_secs: default_dwell_secs(),
            checkpoint_every: default_checkpoint_every(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Explicit browser binary; auto-detected when unset.
    #[serde(default)]
    pub binary: Option<String>,
    /// Launch a visible window instead of headless.
    #[serde(default)]
    pub headed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Path to the VPN client executable.
    #[serde(default)]
    pub client_path: Option<String>,
    #[serde(default = "default_vpn_region")]
    pub region: String,
    /// Process name killed on disconnect.
    #[serde(default = "default_vpn_process")]
    pub process_name: String,
}

fn default_vpn_region() -> String {
    "NL".to_string()
}

fn default_vpn_process() -> String {
    "ProtonVPN".to_string()
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_path: None,
            region: default_vpn_region(),
            process_name: default_vpn_process(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub vpn: VpnConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let raw = r#"{ "crawl": { "dwellSecs": 5 } }"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.crawl.dwell_secs, 5);
        assert_eq!(cfg.crawl.checkpoint_every, 10);
        assert_eq!(cfg.vpn.region, "NL");
        assert!(!cfg.browser.headed);
    }
}
