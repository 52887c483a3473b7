use async_trait::async_trait;
use crumbtrail_capture::{replay, JarProvider};
use crumbtrail_core::{CookieRecord, PerfLogEntry};
use std::path::Path;
use tracing::info;

/// Offline replay has no jar to snapshot.
struct OfflineJar;

#[async_trait]
impl JarProvider for OfflineJar {
    async fn snapshot(&mut self) -> Vec<CookieRecord> {
        Vec::new()
    }
}

/// Replay a dumped performance log without a browser and print the
/// reconstructed request lifecycles. Malformed lines are skipped.
pub async fn run(log: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(log)?;
    let mut skipped = 0usize;
    let entries: Vec<PerfLogEntry> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match PerfLogEntry::from_json_line(l) {
            Some(entry) => Some(entry),
            None => {
                skipped += 1;
                None
            }
        })
        .collect();

    let mut jar = OfflineJar;
    let requests = replay(&entries, &mut jar).await;

    let finished = requests.iter().filter(|r| r.finished).count();
    info!(
        entries = entries.len(),
        skipped = skipped,
        requests = requests.len(),
        finished = finished,
        "Replayed performance log"
    );

    for request in &requests {
        println!(
            "{:<8} {:<4} {:<9} {}",
            request.id,
            request.method,
            if request.finished { "finished" } else { "open" },
            request.url
        );
    }
    Ok(())
}
