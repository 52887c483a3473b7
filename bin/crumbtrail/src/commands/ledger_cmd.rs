use crumbtrail_core::Paths;
use crumbtrail_ledger::{CrawlStatus, Ledger};

pub fn show(failed_only: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let ledger = Ledger::open(paths.ledger_file())?;
    let rows = ledger.read_rows()?;

    if rows.is_empty() {
        println!("Ledger is empty ({})", ledger.path().display());
        return Ok(());
    }

    println!(
        "{:<5} {:<40} {:<10} {:<8} {:>8} {:>9}  {:<25} {}",
        "id", "url", "region", "status", "cookies", "requests", "last crawl", "comment"
    );
    for row in rows {
        if failed_only && row.status != CrawlStatus::Failed {
            continue;
        }
        println!(
            "{:<5} {:<40} {:<10} {:<8} {:>8} {:>9}  {:<25} {}",
            row.id,
            row.url,
            row.region,
            row.status.as_str(),
            row.cookie_count,
            row.request_count,
            row.last_crawl,
            row.comment
        );
    }
    Ok(())
}
