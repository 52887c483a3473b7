//! Browsing session collaborator: Chrome process lifecycle plus a low-level
//! CDP client. The rest of the system only sees `CrawlSession`'s narrow
//! surface (navigate, cookies, performance log, title/url, teardown).

pub mod cdp;
pub mod launch;

pub use cdp::CdpClient;
pub use launch::{find_browser_binary, CrawlSession, LaunchOptions};
