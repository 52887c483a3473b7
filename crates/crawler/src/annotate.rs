//! The dwell/annotation window.
//!
//! A background task listens for an operator-supplied annotation while the
//! main flow blocks on a timeout of the same duration. This is a two-phase
//! wait, not a cancellable operation: on timeout the listener is not
//! cancelled but joined to completion, so a late annotation is still
//! captured even though the window has already timed out.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Wait up to `dwell` for the annotation listener, then unconditionally
/// join it.
pub async fn race_then_join(dwell: Duration, mut listener: JoinHandle<String>) -> String {
    match tokio::time::timeout(dwell, &mut listener).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            info!("No annotation received, proceeding without comment");
            info!("Enter a comment to continue:");
            listener.await.unwrap_or_default()
        }
    }
}

/// Open the dwell window on stdin.
pub async fn dwell_for_annotation(dwell: Duration) -> String {
    info!(
        "Enter a comment for this crawl (or press Enter to skip), capturing in {}s",
        dwell.as_secs()
    );
    let listener = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        line.trim().to_string()
    });
    race_then_join(dwell, listener).await
}
