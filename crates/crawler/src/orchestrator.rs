//! Sequential target loop. Exactly one ledger upsert per visited target,
//! on both the success and failure branches, before the next target starts.

use crumbtrail_capture::CaptureWriter;
use crumbtrail_core::{Config, Paths, Result, Target};
use crumbtrail_ledger::{CrawlStatus, Ledger, RowDraft};
use crumbtrail_session::{CrawlSession, LaunchOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::visit::run_visit;
use crate::vpn;

pub struct Orchestrator {
    paths: Paths,
    config: Config,
    ledger: Ledger,
    writer: CaptureWriter,
    launch_opts: LaunchOptions,
}

impl Orchestrator {
    pub fn new(paths: Paths, config: Config) -> Result<Self> {
        paths.ensure_dirs()?;
        let ledger = Ledger::open(paths.ledger_file())?;
        let writer = CaptureWriter::new(paths.archive_dir());
        let launch_opts = LaunchOptions {
            binary: config.browser.binary.clone(),
            headed: config.browser.headed,
        };
        Ok(Self {
            paths,
            config,
            ledger,
            writer,
            launch_opts,
        })
    }

    /// Visit every target in order. Per-visit failures are warned about and
    /// the loop continues; a failed ledger write aborts the whole run since
    /// the ledger is the one source of truth for per-target outcome.
    pub async fn run(&self, targets: &[Target]) -> Result<()> {
        let vpn_handle = vpn::connect(&self.config.vpn)?;

        // Operator interrupt stops visiting further targets; the in-flight
        // visit still finalizes its ledger row and the session is torn down.
        let interrupted = Arc::new(AtomicBool::new(false));
        {
            let interrupted = interrupted.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, finishing current target");
                    interrupted.store(true, Ordering::SeqCst);
                }
            });
        }

        let total = targets.len();
        let mut session: Option<CrawlSession> = None;
        let mut consecutive_successes: u32 = 0;

        for target in targets {
            if interrupted.load(Ordering::SeqCst) {
                warn!("Crawl interrupted by operator");
                break;
            }

            info!("[{}/{}] Crawling: {}", target.index, total, target.url);
            let url = target.normalized_url();

            let outcome = run_visit(
                &self.paths,
                &self.config,
                &self.writer,
                &self.launch_opts,
                target,
                &mut session,
            )
            .await;

            // Exactly one upsert per target, whichever branch was taken.
            let draft = match &outcome {
                Ok(o) => RowDraft::completed(
                    url.clone(),
                    target.category.clone(),
                    o.title.clone(),
                    o.cookie_count,
                    o.request_count,
                    o.annotation.clone(),
                ),
                Err(e) => {
                    warn!(url = %url, error = %e, "Visit failed");
                    RowDraft::failure(url.clone(), target.category.clone())
                }
            };
            let row = self.ledger.upsert(draft)?;

            if outcome.is_ok() && row.status == CrawlStatus::Success {
                consecutive_successes += 1;
                if self.should_checkpoint(consecutive_successes) && !confirm_continue().await {
                    info!("Operator declined to continue at checkpoint");
                    break;
                }
            } else {
                consecutive_successes = 0;
            }
        }

        if let Some(mut s) = session.take() {
            s.teardown().await;
        }
        if let Some(handle) = vpn_handle {
            handle.disconnect();
        }
        info!("Crawler session completed");
        Ok(())
    }

    fn should_checkpoint(&self, consecutive_successes: u32) -> bool {
        let every = self.config.crawl.checkpoint_every;
        every > 0 && consecutive_successes % every == 0
    }
}

/// Checkpoint prompt after a run of consecutive successes.
async fn confirm_continue() -> bool {
    info!("Checkpoint reached. Continue crawling? [Y/n]");
    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        line.trim().to_lowercase()
    })
    .await
    .unwrap_or_default();
    !answer.starts_with('n')
}
