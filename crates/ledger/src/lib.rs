//! The crawl ledger: a single CSV table keyed by target url, the one durable
//! record of per-target crawl history.
//!
//! Every write is a full read-modify-write of the whole table followed by an
//! atomic rename, so a crash can never leave a half-migrated header or a
//! truncated file. There is exactly one logical writer (the sequential
//! orchestrator), so no file locking is used.

use chrono::Utc;
use crumbtrail_core::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sentinel comment recorded for visits that failed outright.
pub const FAILURE_REASON: &str = "Connection timeout";

/// Modern column set, in file order.
const COLUMNS: [&str; 9] = [
    "id",
    "url",
    "region",
    "title",
    "status",
    "cookie_count",
    "request_count",
    "last_crawl_timestamp",
    "comment",
];

/// Index at which `region` was inserted when the schema gained it.
const REGION_INDEX: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStatus {
    Success,
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "Success" => Self::Success,
            _ => Self::Failed,
        }
    }
}

/// One ledger row. At most one row exists per url at any time.
#[derive(Debug, Clone)]
pub struct LedgerRow {
    pub id: u64,
    pub url: String,
    pub region: String,
    pub title: String,
    pub status: CrawlStatus,
    pub cookie_count: u64,
    pub request_count: u64,
    pub last_crawl: String,
    pub comment: String,
}

impl LedgerRow {
    fn to_record(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.url.clone(),
            self.region.clone(),
            self.title.clone(),
            self.status.as_str().to_string(),
            self.cookie_count.to_string(),
            self.request_count.to_string(),
            self.last_crawl.clone(),
            self.comment.clone(),
        ]
    }

    fn from_record(fields: &[String]) -> Result<Self> {
        if fields.len() != COLUMNS.len() {
            return Err(Error::Ledger(format!(
                "Row has {} fields, expected {}",
                fields.len(),
                COLUMNS.len()
            )));
        }
        Ok(Self {
            id: fields[0]
                .parse()
                .map_err(|_| Error::Ledger(format!("Bad row id: {:?}", fields[0])))?,
            url: fields[1].clone(),
            region: fields[2].clone(),
            title: fields[3].clone(),
            status: CrawlStatus::parse(&fields[4]),
            cookie_count: fields[5].parse().unwrap_or(0),
            request_count: fields[6].parse().unwrap_or(0),
            last_crawl: fields[7].clone(),
            comment: fields[8].clone(),
        })
    }
}

/// A visit outcome waiting to be upserted. Carries everything except the
/// row id (preserved on update, assigned on insert) and the crawl
/// timestamp (stamped at upsert time).
#[derive(Debug, Clone)]
pub struct RowDraft {
    pub url: String,
    pub region: String,
    pub title: String,
    pub status: CrawlStatus,
    pub cookie_count: u64,
    pub request_count: u64,
    pub comment: String,
}

impl RowDraft {
    /// Outcome of a completed visit. An operator annotation marks the visit
    /// `Failed` with the annotation preserved as free text; status
    /// derivation is confined to this constructor.
    pub fn completed(
        url: impl Into<String>,
        region: impl Into<String>,
        title: impl Into<String>,
        cookie_count: u64,
        request_count: u64,
        annotation: impl Into<String>,
    ) -> Self {
        let annotation = annotation.into();
        let status = if annotation.is_empty() {
            CrawlStatus::Success
        } else {
            CrawlStatus::Failed
        };
        Self {
            url: url.into(),
            region: region.into(),
            title: title.into(),
            status,
            cookie_count,
            request_count,
            comment: annotation,
        }
    }

    /// Outcome of a visit that threw: zero counts, empty title, fixed
    /// failure reason.
    pub fn failure(url: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            region: region.into(),
            title: String::new(),
            status: CrawlStatus::Failed,
            cookie_count: 0,
            request_count: 0,
            comment: FAILURE_REASON.to_string(),
        }
    }
}

pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Open the ledger, creating it with the modern header when absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let ledger = Self { path: path.into() };
        if !ledger.path.exists() {
            ledger.rewrite(&[])?;
            info!(path = %ledger.path.display(), "Created ledger");
        }
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upsert one visit outcome. Reads the whole table, migrates a legacy
    /// header if needed, replaces the matching url's row (keeping its id) or
    /// appends with the next sequential id, then rewrites the file
    /// atomically.
    pub fn upsert(&self, draft: RowDraft) -> Result<LedgerRow> {
        let mut rows = self.read_rows()?;
        let now = Utc::now().to_rfc3339();

        let row = match rows.iter_mut().find(|r| r.url == draft.url) {
            Some(existing) => {
                existing.region = draft.region;
                existing.title = draft.title;
                existing.status = draft.status;
                existing.cookie_count = draft.cookie_count;
                existing.request_count = draft.request_count;
                existing.last_crawl = now;
                existing.comment = draft.comment;
                existing.clone()
            }
            None => {
                let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
                let row = LedgerRow {
                    id,
                    url: draft.url,
                    region: draft.region,
                    title: draft.title,
                    status: draft.status,
                    cookie_count: draft.cookie_count,
                    request_count: draft.request_count,
                    last_crawl: now,
                    comment: draft.comment,
                };
                rows.push(row.clone());
                row
            }
        };

        self.rewrite(&rows)?;
        debug!(url = %row.url, status = row.status.as_str(), "Ledger upserted");
        Ok(row)
    }

    /// Read every row, migrating legacy records in memory. The migrated
    /// shape only reaches disk through the next atomic rewrite.
    pub fn read_rows(&self) -> Result<Vec<LedgerRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut records = reader.records();
        let header: Vec<String> = match records.next() {
            Some(rec) => rec?.iter().map(|s| s.to_string()).collect(),
            None => return Ok(Vec::new()),
        };
        let legacy = !header.iter().any(|c| c.eq_ignore_ascii_case("region"));

        let mut rows = Vec::new();
        for record in records {
            let mut fields: Vec<String> = record?.iter().map(|s| s.to_string()).collect();
            if fields.is_empty() || fields.iter().all(|f| f.is_empty()) {
                continue;
            }
            if legacy && fields.len() == COLUMNS.len() - 1 {
                fields.insert(REGION_INDEX, String::new());
            }
            rows.push(LedgerRow::from_record(&fields)?);
        }

        if legacy {
            info!(path = %self.path.display(), "Migrating legacy ledger header (adding region column)");
        }
        Ok(rows)
    }

    /// Rewrite the whole table. Writes a sibling temp file and renames it
    /// over the ledger so readers never observe a truncated table.
    fn rewrite(&self, rows: &[LedgerRow]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)?;
            writer.write_record(COLUMNS)?;
            for row in rows {
                writer.write_record(row.to_record())?;
            }
            writer.flush()?;
            let mut file = writer.into_inner().map_err(|e| Error::Ledger(e.to_string()))?;
            file.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_in(tmp: &TempDir) -> Ledger {
        Ledger::open(tmp.path().join("masterfile.csv")).unwrap()
    }

    #[test]
    fn test_open_creates_modern_header() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger_in(&tmp);
        let content = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(
            content.lines().next().unwrap(),
            "id,url,region,title,status,cookie_count,request_count,last_crawl_timestamp,comment"
        );
    }

    #[test]
    fn test_upsert_is_idempotent_per_url() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger_in(&tmp);

        let first = ledger
            .upsert(RowDraft::completed("https://example.com", "EU", "Example", 12, 40, ""))
            .unwrap();
        let second = ledger
            .upsert(RowDraft::failure("https://example.com", "EU"))
            .unwrap();

        let rows = ledger.read_rows().unwrap();
        assert_eq!(rows.len(), 1);
        // The second outcome's values, under the original id.
        assert_eq!(second.id, first.id);
        assert_eq!(rows[0].status, CrawlStatus::Failed);
        assert_eq!(rows[0].cookie_count, 0);
        assert_eq!(rows[0].comment, FAILURE_REASON);
    }

    #[test]
    fn test_ids_are_sequential() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger_in(&tmp);
        let a = ledger
            .upsert(RowDraft::completed("https://a.com", "", "A", 1, 1, ""))
            .unwrap();
        let b = ledger
            .upsert(RowDraft::completed("https://b.com", "", "B", 2, 2, ""))
            .unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn test_legacy_header_gains_region_at_position_three() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("masterfile.csv");
        std::fs::write(
            &path,
            "id,url,title,status,cookie_count,request_count,last_crawl_timestamp,comment\n\
             1,https://old.com,Old Site,Success,5,20,2024-01-01T00:00:00Z,\n",
        )
        .unwrap();

        let ledger = Ledger::open(&path).unwrap();
        ledger
            .upsert(RowDraft::completed("https://new.com", "US", "New", 3, 9, ""))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header: Vec<&str> = content.lines().next().unwrap().split(',').collect();
        assert_eq!(header.len(), 9);
        assert_eq!(header[2], "region");

        let rows = ledger.read_rows().unwrap();
        let old = rows.iter().find(|r| r.url == "https://old.com").unwrap();
        // Back-filled empty region, everything else untouched.
        assert_eq!(old.region, "");
        assert_eq!(old.id, 1);
        assert_eq!(old.title, "Old Site");
        assert_eq!(old.cookie_count, 5);
        assert_eq!(old.status, CrawlStatus::Success);
    }

    #[test]
    fn test_annotation_marks_visit_failed_but_is_preserved() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger_in(&tmp);
        ledger
            .upsert(RowDraft::completed(
                "https://example.com",
                "EU",
                "Example",
                4,
                7,
                "cookie banner blocked the page",
            ))
            .unwrap();

        let rows = ledger.read_rows().unwrap();
        assert_eq!(rows[0].status, CrawlStatus::Failed);
        assert_eq!(rows[0].comment, "cookie banner blocked the page");
        assert_eq!(rows[0].cookie_count, 4);
    }

    #[test]
    fn test_failure_row_after_crash_then_retry_leaves_one_row() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger_in(&tmp);

        ledger.upsert(RowDraft::failure("https://example.com", "EU")).unwrap();
        let rows = ledger.read_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, CrawlStatus::Failed);
        assert_eq!((rows[0].cookie_count, rows[0].request_count), (0, 0));
        assert!(!rows[0].comment.is_empty());

        // Retry of the same url in the same run updates in place.
        ledger
            .upsert(RowDraft::completed("https://example.com", "EU", "Example", 2, 5, ""))
            .unwrap();
        let rows = ledger.read_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, CrawlStatus::Success);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger_in(&tmp);
        ledger
            .upsert(RowDraft::completed("https://example.com", "", "E", 1, 1, ""))
            .unwrap();
        assert!(!tmp.path().join("masterfile.csv.tmp").exists());
    }

    #[test]
    fn test_fields_with_commas_survive_round_trip() {
        let tmp = TempDir::new().unwrap();
        let ledger = ledger_in(&tmp);
        ledger
            .upsert(RowDraft::completed(
                "https://example.com",
                "EU",
                "Shop, cart & more",
                1,
                1,
                "slow, but loaded",
            ))
            .unwrap();
        let rows = ledger.read_rows().unwrap();
        assert_eq!(rows[0].title, "Shop, cart & more");
        assert_eq!(rows[0].comment, "slow, but loaded");
    }
}
