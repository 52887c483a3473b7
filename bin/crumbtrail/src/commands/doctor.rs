use crumbtrail_core::{Config, Paths};
use crumbtrail_session::find_browser_binary;

pub fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;

    println!("crumbtrail doctor");
    println!("  base dir:     {}", paths.base.display());
    println!(
        "  config:       {}",
        if paths.config_file().exists() { "present" } else { "defaults" }
    );

    match config.browser.binary.or_else(find_browser_binary) {
        Some(binary) => println!("  browser:      {}", binary),
        None => println!("  browser:      NOT FOUND (install Chrome or Chromium)"),
    }

    let ledger = paths.ledger_file();
    if ledger.exists() {
        println!("  ledger:       {}", ledger.display());
    } else {
        println!("  ledger:       not created yet");
    }

    let profiles = std::fs::read_dir(paths.profiles_dir())
        .map(|dir| dir.count())
        .unwrap_or(0);
    println!("  profiles:     {}", profiles);

    if config.vpn.enabled {
        match config.vpn.client_path {
            Some(path) => println!("  vpn:          enabled ({})", path),
            None => println!("  vpn:          enabled but vpn.clientPath is missing"),
        }
    } else {
        println!("  vpn:          disabled");
    }

    Ok(())
}
