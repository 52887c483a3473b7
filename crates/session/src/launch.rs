//! Chrome process lifecycle and the per-visit `CrawlSession`.
//!
//! One session per visit, bound to a persistent per-host profile directory.
//! Launch tries an anti-automation argument set first; if the browser or its
//! CDP endpoint never comes up it retries once with a minimal argument set
//! and masks `navigator.webdriver` from the page instead.

use crumbtrail_core::{BrowsingProfile, CookieRecord, Error, PerfLogEntry, Result};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Launch parameters for one session.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Explicit browser binary; auto-detected when `None`.
    pub binary: Option<String>,
    /// Launch a visible window instead of headless.
    pub headed: bool,
}

/// A live browser bound to a profile directory. Everything it exposes is
/// independently fallible; callers treat failures per-channel.
pub struct CrawlSession {
    pub profile: BrowsingProfile,
    process: Child,
    pub cdp: super::CdpClient,
    perf_log: Arc<Mutex<Vec<PerfLogEntry>>>,
    _pump_handle: tokio::task::JoinHandle<()>,
}

impl CrawlSession {
    /// Launch a browser for `profile`, with one fallback retry.
    pub async fn launch(profile: BrowsingProfile, opts: &LaunchOptions) -> Result<Self> {
        match Self::launch_once(&profile, opts, false).await {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!(profile = %profile.id, error = %e, "Primary browser init failed, trying fallback");
                let session = Self::launch_once(&profile, opts, true).await?;
                // The fallback argument set does not hide automation, so
                // mask the webdriver flag from page scripts instead.
                if let Err(e) = session
                    .cdp
                    .evaluate_js(
                        "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})",
                    )
                    .await
                {
                    debug!(error = %e, "Could not mask navigator.webdriver");
                }
                info!(profile = %profile.id, "Browser initialized with fallback method");
                Ok(session)
            }
        }
    }

    async fn launch_once(
        profile: &BrowsingProfile,
        opts: &LaunchOptions,
        fallback: bool,
    ) -> Result<Self> {
        let binary = match &opts.binary {
            Some(b) => b.clone(),
            None => find_browser_binary()
                .ok_or_else(|| Error::Session("No Chrome/Chromium binary found".to_string()))?,
        };

        std::fs::create_dir_all(profile.user_data_dir())?;

        let debug_port = find_free_port().await?;
        let args = build_browser_args(debug_port, &profile.user_data_dir(), opts.headed, fallback);

        info!(
            profile = %profile.id,
            port = debug_port,
            headed = opts.headed,
            fallback = fallback,
            "Launching browser"
        );

        let mut child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Session(format!("Failed to launch {}: {}", binary, e)))?;

        // Wait for the CDP endpoint, then attach to the page target so
        // Page/Network domains work.
        let page_ws_url = match wait_for_cdp_ready(debug_port, 15).await {
            Ok(_) => get_page_ws_url(debug_port).await,
            Err(e) => Err(e),
        };
        let page_ws_url = match page_ws_url {
            Ok(url) => url,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };

        let cdp = super::CdpClient::connect(&page_ws_url).await?;
        cdp.enable_domain("Page").await?;
        cdp.enable_domain("Runtime").await?;
        cdp.enable_network().await?;

        // Pump network lifecycle events into an ordered buffer. The
        // correlator replays this buffer after the dwell window.
        let mut events = cdp
            .subscribe_events(&["Network.requestWillBeSent", "Network.loadingFinished"])
            .await;
        let perf_log: Arc<Mutex<Vec<PerfLogEntry>>> = Arc::new(Mutex::new(Vec::new()));
        let perf_log_clone = perf_log.clone();
        let pump_handle = tokio::spawn(async move {
            while let Some((method, params)) = events.recv().await {
                let entry = PerfLogEntry {
                    method,
                    params,
                    timestamp_ms: chrono::Utc::now().timestamp_millis(),
                };
                perf_log_clone.lock().await.push(entry);
            }
        });

        info!(profile = %profile.id, ws_url = %page_ws_url, "CDP connection established");

        Ok(Self {
            profile: profile.clone(),
            process: child,
            cdp,
            perf_log,
            _pump_handle: pump_handle,
        })
    }

    /// Navigate and wait for the document to become interactive, bounded by
    /// `timeout`.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        self.cdp.navigate(url).await?;

        let start = std::time::Instant::now();
        loop {
            if start.elapsed() > timeout {
                return Err(Error::Navigation(format!(
                    "Page not ready after {}s: {}",
                    timeout.as_secs(),
                    url
                )));
            }
            match self.cdp.evaluate_js("document.readyState").await {
                Ok(Value::String(state)) if state == "interactive" || state == "complete" => {
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "readyState probe failed"),
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Cookies visible to the current page.
    pub async fn current_cookies(&self) -> Result<Vec<CookieRecord>> {
        let raw = self.cdp.get_cookies().await?;
        Ok(raw.iter().filter_map(CookieRecord::from_cdp).collect())
    }

    /// All cookies in the jar, regardless of the current page.
    pub async fn extended_cookies(&self) -> Result<Vec<CookieRecord>> {
        let raw = self.cdp.get_all_cookies().await?;
        Ok(raw.iter().filter_map(CookieRecord::from_cdp).collect())
    }

    /// Drain the buffered performance log, preserving arrival order.
    pub async fn performance_log(&self) -> Vec<PerfLogEntry> {
        std::mem::take(&mut *self.perf_log.lock().await)
    }

    pub async fn title(&self) -> String {
        match self.cdp.evaluate_js("document.title").await {
            Ok(Value::String(t)) => t,
            _ => String::new(),
        }
    }

    pub async fn current_url(&self) -> String {
        match self.cdp.evaluate_js("window.location.href").await {
            Ok(Value::String(u)) => u,
            _ => String::new(),
        }
    }

    /// Close the browser. Graceful CDP close first, then kill.
    pub async fn teardown(&mut self) {
        if let Err(e) = self.cdp.close_browser().await {
            debug!("CDP Browser.close failed (may already be closed): {}", e);
        }
        let _ = self.process.kill().await;
        info!(profile = %self.profile.id, "Browser closed");
    }
}

impl Drop for CrawlSession {
    fn drop(&mut self) {
        // Best-effort kill on drop
        let _ = self.process.start_kill();
        self._pump_handle.abort();
    }
}

/// Build the Chrome argument list.
fn build_browser_args(
    debug_port: u16,
    user_data_dir: &Path,
    headed: bool,
    fallback: bool,
) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--no-sandbox".to_string(),
        "--disable-gpu".to_string(),
    ];
    if !fallback {
        args.push("--disable-software-rasterizer".to_string());
        args.push("--disable-blink-features=AutomationControlled".to_string());
        args.push("--disable-background-networking".to_string());
        args.push("--disable-sync".to_string());
        args.push("--password-store=basic".to_string());
    }
    if headed {
        args.push("--start-maximized".to_string());
    } else {
        args.push("--headless=new".to_string());
        args.push("--window-size=1280,720".to_string());
    }
    args.push("about:blank".to_string());
    args
}

/// Find a Chrome/Chromium binary on the system.
pub fn find_browser_binary() -> Option<String> {
    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Find a free TCP port for the debugging endpoint.
async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::Session(format!("Failed to bind to find free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::Session(format!("Failed to get local addr: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll /json/version until the CDP endpoint responds, up to `timeout_secs`.
async fn wait_for_cdp_ready(port: u16, timeout_secs: u64) -> Result<String> {
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_secs);
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(Error::Session(format!(
                "Chrome CDP not ready after {}s on port {}",
                timeout_secs, port
            )));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Resolve the first page target's WebSocket URL via /json/list. Retries a
/// few times since the page target may not appear immediately.
async fn get_page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        let resp = match reqwest::get(&url).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        let targets: Vec<Value> = match resp.json().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        for target in &targets {
            if target.get("type").and_then(|v| v.as_str()) == Some("page") {
                if let Some(ws_url) = target.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }
    }

    Err(Error::Session("No page target found after retries".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_primary_args_hide_automation() {
        let args = build_browser_args(9222, &PathBuf::from("/tmp/p"), false, false);
        assert!(args.iter().any(|a| a == "--disable-blink-features=AutomationControlled"));
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert!(args.iter().any(|a| a.starts_with("--user-data-dir=")));
    }

    #[test]
    fn test_fallback_args_are_minimal() {
        let args = build_browser_args(9222, &PathBuf::from("/tmp/p"), false, true);
        assert!(!args.iter().any(|a| a.contains("AutomationControlled")));
        assert!(args.iter().any(|a| a.starts_with("--remote-debugging-port=")));
    }

    #[test]
    fn test_headed_args_maximize_instead_of_headless() {
        let args = build_browser_args(9222, &PathBuf::from("/tmp/p"), true, false);
        assert!(args.iter().any(|a| a == "--start-maximized"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }
}
