use anyhow::bail;
use crumbtrail_core::{Config, Paths, Target};
use crumbtrail_crawler::{read_targets, Orchestrator};
use std::path::PathBuf;
use tracing::info;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    url: Option<String>,
    file: Option<PathBuf>,
    time: Option<u64>,
    base_dir: Option<PathBuf>,
    browser: Option<String>,
    headed: bool,
    vpn: bool,
) -> anyhow::Result<()> {
    let paths = match base_dir {
        Some(base) => Paths::with_base(base),
        None => Paths::new(),
    };
    let mut config = Config::load_or_default(&paths)?;

    // CLI flags override config.
    if let Some(secs) = time {
        config.crawl.dwell_secs = secs;
    }
    if let Some(binary) = browser {
        config.browser.binary = Some(binary);
    }
    if headed {
        config.browser.headed = true;
    }
    if vpn {
        config.vpn.enabled = true;
    }

    let targets: Vec<Target> = match (url, file) {
        (Some(url), None) => vec![Target::new(1, url, "Unknown")],
        (None, Some(path)) => read_targets(&path)?,
        _ => bail!("Provide exactly one of --url or --file"),
    };
    if targets.is_empty() {
        bail!("No targets provided or found in file");
    }

    info!("Starting crawler with {} targets", targets.len());
    let orchestrator = Orchestrator::new(paths, config)?;
    orchestrator.run(&targets).await?;
    Ok(())
}
