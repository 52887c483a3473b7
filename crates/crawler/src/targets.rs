//! Target list input: one url per line, optionally with a `,category`
//! suffix. Blank lines and lines containing `#` are skipped.

use crumbtrail_core::{Error, Result, Target};
use std::path::Path;

pub fn parse_targets(content: &str) -> Vec<Target> {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.contains('#'))
        .enumerate()
        .map(|(i, line)| {
            let (url, category) = match line.split_once(',') {
                Some((url, category)) => (url.trim(), category.trim()),
                None => (line, ""),
            };
            let category = if category.is_empty() { "Unknown" } else { category };
            Target::new(i + 1, url, category)
        })
        .collect()
}

pub fn read_targets(path: &Path) -> Result<Vec<Target>> {
    if !path.exists() {
        return Err(Error::Config(format!("Target file not found: {}", path.display())));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(parse_targets(&content))
}
