//! VPN lifecycle: connect before the run, disconnect after it. Brackets the
//! whole orchestration, never individual visits.

use crumbtrail_core::config::VpnConfig;
use crumbtrail_core::{Error, Result};
use std::process::{Child, Command};
use tracing::{info, warn};

pub struct VpnHandle {
    process_name: String,
    child: Child,
}

/// Spawn the VPN client pointed at the configured region. Returns `None`
/// when the VPN is disabled.
pub fn connect(config: &VpnConfig) -> Result<Option<VpnHandle>> {
    if !config.enabled {
        return Ok(None);
    }
    let path = config
        .client_path
        .as_ref()
        .ok_or_else(|| Error::Config("vpn.clientPath is required when vpn is enabled".into()))?;

    let child = Command::new(path)
        .arg("-f")
        .arg(&config.region)
        .spawn()
        .map_err(|e| Error::Config(format!("Failed to start VPN client {}: {}", path, e)))?;

    info!(region = %config.region, "VPN client started");
    Ok(Some(VpnHandle {
        process_name: config.process_name.clone(),
        child,
    }))
}

impl VpnHandle {
    /// Best-effort disconnect: kill our child, then the client by name in
    /// case it detached.
    pub fn disconnect(mut self) {
        let _ = self.child.kill();

        let result = if cfg!(target_os = "windows") {
            Command::new("taskkill")
                .args(["/IM", &format!("{}.exe", self.process_name), "/F"])
                .status()
        } else {
            Command::new("pkill").arg("-f").arg(&self.process_name).status()
        };
        match result {
            Ok(_) => info!("VPN client stopped"),
            Err(e) => warn!(error = %e, "Could not kill VPN client process"),
        }
    }
}
