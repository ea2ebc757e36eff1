//! The Scraper's pluggable per-source contract (§4.4): `Authenticate` → `Fetch` →
//! `Parse`. One `Source` implementation per upstream provider; the Collector routes
//! by service name rather than matching on a source-specific enum.

pub mod regtech;

use async_trait::async_trait;
use chrono::NaiveDate;
use ipwatch_core::CollectionCredential;
use std::fmt;

pub use regtech::RegtechSource;

/// Why `Authenticate` failed to establish a session. `Locked` is distinguished from
/// `Invalid` because the Scheduler freezes a service on `Locked` rather than
/// retrying with backoff (§7 "Authentication ... on locked freeze service").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    Invalid,
    Locked,
    Network(String),
    Timeout,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Invalid => write!(f, "invalid credentials"),
            AuthError::Locked => write!(f, "account locked"),
            AuthError::Network(detail) => write!(f, "network error: {detail}"),
            AuthError::Timeout => write!(f, "authentication timed out"),
        }
    }
}

impl std::error::Error for AuthError {}

/// An authenticated, per-job session handle. The headless-HTTP strategy (§4.4
/// "Implementation strategy") represents this as a cookie-bearing `reqwest::Client`
/// scoped to one `Fetch` call; it is never shared across jobs.
pub struct Session {
    pub client: reqwest::Client,
}

/// The requested coverage window for a `Fetch` call. REGTECH defaults to the last
/// three months when unspecified.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn last_months(today: NaiveDate, months: i64) -> Self {
        let start = shift_months(today, -months);
        Self { start, end: today }
    }
}

fn shift_months(date: NaiveDate, months: i64) -> NaiveDate {
    let total = date.year() as i64 * 12 + (date.month() as i64 - 1) + months;
    let year = total.div_euclid(12) as i32;
    let month = (total.rem_euclid(12) + 1) as u32;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    next.map(|n| (n - first).num_days() as u32).unwrap_or(28)
}

use chrono::Datelike;

/// Raw bytes downloaded by `Fetch`, tagged with the content-type the server reported
/// so `Parse` can validate it actually received a spreadsheet (§4.4 success
/// detection: `content-type` containing `spreadsheet|excel|octet-stream`).
pub struct FetchArtifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl FetchArtifact {
    pub fn looks_like_spreadsheet(&self) -> bool {
        let ct = self.content_type.to_ascii_lowercase();
        ct.contains("spreadsheet") || ct.contains("excel") || ct.contains("octet-stream")
    }
}

/// One parsed row, pre-normalization. Column values are kept as strings; the
/// Normalizer (§4.5) owns all type coercion and validation.
///
/// Also the wire shape accepted by `POST /api/collection/ingest` — a pushed row
/// carries the same fields a scraped spreadsheet row would, so the Normalizer
/// cannot tell the two paths apart (§4.6: ingest bypasses only the Scraper).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RawRow {
    pub ip: Option<String>,
    pub reason: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub detection_date: Option<String>,
    pub removal_date: Option<String>,
    pub confidence: Option<String>,
}

#[async_trait]
pub trait Source: Send + Sync {
    async fn authenticate(&self, credential: &CollectionCredential) -> Result<Session, AuthError>;

    async fn fetch(&self, session: &Session, window: DateWindow) -> Result<FetchArtifact, AuthError>;

    fn parse(&self, artifact: &FetchArtifact) -> anyhow::Result<Vec<RawRow>>;

    /// Per-source confidence override; REGTECH uses the Normalizer's default (85)
    /// and so does not override this (§9 open question: "per-source override
    /// discretion").
    fn default_confidence(&self) -> Option<i16> {
        None
    }
}
