//! One target visit: profile, session launch, navigation, dwell window,
//! capture, persistence. Errors propagate to the orchestrator, which owns
//! the ledger finalization for both branches.

use async_trait::async_trait;
use chrono::Utc;
use crumbtrail_capture::{correlate, merge_channels, replay, CaptureWriter, JarProvider, VisitContext};
use crumbtrail_core::{domain_root, Config, CookieRecord, Paths, Result, Target};
use crumbtrail_session::{CdpClient, CrawlSession, LaunchOptions};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::annotate::dwell_for_annotation;

/// What a completed visit computed in memory. Ledger counts come from here,
/// independent of whether the artifact write succeeded.
#[derive(Debug, Clone)]
pub struct VisitOutcome {
    pub title: String,
    pub cookie_count: u64,
    pub request_count: u64,
    pub annotation: String,
}

/// Live jar snapshots over CDP. A failed read is an empty jar; the crawl
/// continues with zero cookies for that snapshot.
struct LiveJar<'a> {
    cdp: &'a CdpClient,
}

#[async_trait]
impl JarProvider for LiveJar<'_> {
    async fn snapshot(&mut self) -> Vec<CookieRecord> {
        match self.cdp.get_cookies().await {
            Ok(raw) => raw.iter().filter_map(CookieRecord::from_cdp).collect(),
            Err(e) => {
                debug!(error = %e, "Jar snapshot failed");
                Vec::new()
            }
        }
    }
}

/// Visit one target. On success the session is parked in `session_slot` for
/// reuse of the teardown path; on error it is torn down here before the
/// error propagates.
pub async fn run_visit(
    paths: &Paths,
    config: &Config,
    writer: &CaptureWriter,
    launch_opts: &LaunchOptions,
    target: &Target,
    session_slot: &mut Option<CrawlSession>,
) -> Result<VisitOutcome> {
    let url = target.normalized_url();
    let profile = paths.profile(&url);
    paths.ensure_profile_dirs(&profile)?;
    info!(profile = %profile.id, "Using profile");

    // One active session at a time; profiles are not designed for
    // concurrent writers.
    if let Some(mut previous) = session_slot.take() {
        previous.teardown().await;
    }

    let mut session = CrawlSession::launch(profile.clone(), launch_opts).await?;
    match drive(&session, config, writer, &url).await {
        Ok(outcome) => {
            *session_slot = Some(session);
            Ok(outcome)
        }
        Err(e) => {
            session.teardown().await;
            Err(e)
        }
    }
}

async fn drive(
    session: &CrawlSession,
    config: &Config,
    writer: &CaptureWriter,
    url: &str,
) -> Result<VisitOutcome> {
    let root = domain_root(url);
    info!(url = %root, "Navigating to domain root");
    session
        .navigate(&root, Duration::from_secs(config.crawl.navigation_timeout_secs))
        .await?;

    info!("Waiting for {} seconds...", config.crawl.dwell_secs);
    let annotation = dwell_for_annotation(Duration::from_secs(config.crawl.dwell_secs)).await;

    info!("Capturing data...");
    let channels = vec![
        session.current_cookies().await,
        session.extended_cookies().await,
    ];
    let cookies = merge_channels(channels);

    let log_entries = session.performance_log().await;
    let mut jar = LiveJar { cdp: &session.cdp };
    let requests = replay(&log_entries, &mut jar).await;

    let title = session.title().await;
    let ctx = VisitContext {
        source_url: url.to_string(),
        page_title: title.clone(),
        browser_id: session.profile.id.clone(),
        timestamp: Utc::now().to_rfc3339(),
    };
    let entries = correlate(&requests, &cookies, &ctx);

    // Write failures do not abort the visit; the ledger still records the
    // in-memory counts.
    if let Err(e) = writer.write(&session.profile, url, &entries) {
        error!(error = %e, "Failed to persist capture artifacts");
    }

    info!("Title: {}", title);
    info!("URL (last visited page): {}", session.current_url().await);
    info!("Cookies captured: {}", cookies.len());
    info!("Requests captured: {}", requests.len());

    Ok(VisitOutcome {
        title,
        cookie_count: cookies.len() as u64,
        request_count: requests.len() as u64,
        annotation,
    })
}
