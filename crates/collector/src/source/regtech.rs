//! REGTECH: the reference `Source` implementation (§4.4). Two-stage login (user-id
//! discovery, then id+password), Excel download of the blacklist advisory tab,
//! fuzzy-header column mapping.

use super::{AuthError, DateWindow, FetchArtifact, RawRow, Session, Source};
use async_trait::async_trait;
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use ipwatch_core::CollectionCredential;
use std::io::Cursor;
use std::time::Duration;

const NAVIGATE_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Header aliases the fuzzy column mapper accepts, lower-cased before comparison.
/// Order within a column's alias list does not matter; the first worksheet column
/// whose header matches any alias wins.
const IP_ALIASES: &[&str] = &["ip", "addr", "ip주소", "ip address"];
const REASON_ALIASES: &[&str] = &["reason", "사유", "description"];
const CATEGORY_ALIASES: &[&str] = &["category", "분류", "type"];
const COUNTRY_ALIASES: &[&str] = &["country", "국가", "nation"];
const DETECTION_DATE_ALIASES: &[&str] = &["detection_date", "detected", "탐지일", "date"];
const REMOVAL_DATE_ALIASES: &[&str] = &["removal_date", "removed", "해제일", "expiry"];
const CONFIDENCE_ALIASES: &[&str] = &["confidence", "신뢰도", "score"];

pub struct RegtechSource {
    base_url: String,
}

impl RegtechSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

#[async_trait]
impl Source for RegtechSource {
    /// Stage (a) POSTs the username to discover the portal-internal user id; stage
    /// (b) POSTs that id plus the password. Success is detected by the presence of
    /// both `regtech-va` and `regtech-front` cookies and a response that is not a
    /// redirect back to `/login` (§4.4).
    async fn authenticate(&self, credential: &CollectionCredential) -> Result<Session, AuthError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(NAVIGATE_TIMEOUT)
            .build()
            .map_err(|err| AuthError::Network(err.to_string()))?;

        let discovery = client
            .post(format!("{}/login/userIdDiscovery", self.base_url))
            .form(&[("username", credential.username.as_str())])
            .send()
            .await
            .map_err(map_request_error)?;

        if discovery.status() == reqwest::StatusCode::LOCKED {
            return Err(AuthError::Locked);
        }
        if !discovery.status().is_success() {
            return Err(AuthError::Invalid);
        }

        let discovered: DiscoveryResponse = discovery.json().await.map_err(|err| AuthError::Network(err.to_string()))?;

        let login = client
            .post(format!("{}/login", self.base_url))
            .form(&[("userId", discovered.user_id.as_str()), ("password", credential.password.as_str())])
            .send()
            .await
            .map_err(map_request_error)?;

        if login.status() == reqwest::StatusCode::LOCKED {
            return Err(AuthError::Locked);
        }

        let final_url = login.url().clone();
        let has_session_cookies = login
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .fold((false, false), |(va, front), cookie| {
                (va || cookie.starts_with("regtech-va"), front || cookie.starts_with("regtech-front"))
            });

        if final_url.path().ends_with("/login") || !(has_session_cookies.0 && has_session_cookies.1) {
            return Err(AuthError::Invalid);
        }

        Ok(Session { client })
    }

    /// Navigates to the advisory list, sets the requested date window, selects the
    /// blacklist tab, and triggers the Excel export. Success is detected by the
    /// response `content-type`, not by inspecting the body first.
    async fn fetch(&self, session: &Session, window: DateWindow) -> Result<FetchArtifact, AuthError> {
        let response = session
            .client
            .get(format!("{}/board/excelDownload", self.base_url))
            .query(&[
                ("tab", "blacklist"),
                ("startDate", &window.start.format("%Y-%m-%d").to_string()),
                ("endDate", &window.end.format("%Y-%m-%d").to_string()),
            ])
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(map_request_error)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = response.bytes().await.map_err(|err| AuthError::Network(err.to_string()))?.to_vec();
        let artifact = FetchArtifact { bytes, content_type };

        if !artifact.looks_like_spreadsheet() {
            return Err(AuthError::Network(format!(
                "unexpected content-type from excelDownload: {}",
                artifact.content_type
            )));
        }

        Ok(artifact)
    }

    fn parse(&self, artifact: &FetchArtifact) -> anyhow::Result<Vec<RawRow>> {
        let cursor = Cursor::new(artifact.bytes.clone());
        let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor)?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("workbook has no worksheets"))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        let mut rows = range.rows();
        let header = rows.next().ok_or_else(|| anyhow::anyhow!("worksheet has no header row"))?;
        let columns = ColumnMap::from_header(header);

        Ok(rows.map(|row| columns.extract(row)).collect())
    }
}

#[derive(serde::Deserialize)]
struct DiscoveryResponse {
    #[serde(rename = "userId")]
    user_id: String,
}

fn map_request_error(err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::Network(err.to_string())
    }
}

/// Resolves worksheet column indices by fuzzy header matching, once per fetch.
struct ColumnMap {
    ip: Option<usize>,
    reason: Option<usize>,
    category: Option<usize>,
    country: Option<usize>,
    detection_date: Option<usize>,
    removal_date: Option<usize>,
    confidence: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &[Data]) -> Self {
        let headers: Vec<String> = header.iter().map(|cell| cell.to_string().trim().to_ascii_lowercase()).collect();
        Self {
            ip: find_column(&headers, IP_ALIASES),
            reason: find_column(&headers, REASON_ALIASES),
            category: find_column(&headers, CATEGORY_ALIASES),
            country: find_column(&headers, COUNTRY_ALIASES),
            detection_date: find_column(&headers, DETECTION_DATE_ALIASES),
            removal_date: find_column(&headers, REMOVAL_DATE_ALIASES),
            confidence: find_column(&headers, CONFIDENCE_ALIASES),
        }
    }

    fn extract(&self, row: &[Data]) -> RawRow {
        RawRow {
            ip: self.cell(row, self.ip),
            reason: self.cell(row, self.reason),
            category: self.cell(row, self.category),
            country: self.cell(row, self.country),
            detection_date: self.cell(row, self.detection_date),
            removal_date: self.cell(row, self.removal_date),
            confidence: self.cell(row, self.confidence),
        }
    }

    fn cell(&self, row: &[Data], index: Option<usize>) -> Option<String> {
        index.and_then(|i| row.get(i)).map(|cell| cell.to_string().trim().to_string()).filter(|s| !s.is_empty())
    }
}

fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|header| aliases.iter().any(|alias| header == alias))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_column_matches_any_declared_alias() {
        // find_column itself is case-sensitive; ColumnMap::from_header lower-cases
        // headers before calling it, so the fixture does the same here.
        let headers = vec!["ip주소".to_string(), "사유".to_string(), "신뢰도".to_string()];
        assert_eq!(find_column(&headers, IP_ALIASES), Some(0));
        assert_eq!(find_column(&headers, REASON_ALIASES), Some(1));
        assert_eq!(find_column(&headers, CONFIDENCE_ALIASES), Some(2));
        assert_eq!(find_column(&headers, CATEGORY_ALIASES), None);
    }

    #[test]
    fn fetch_artifact_recognizes_spreadsheet_content_types() {
        let artifact = FetchArtifact {
            bytes: vec![],
            content_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
        };
        assert!(artifact.looks_like_spreadsheet());

        let other = FetchArtifact { bytes: vec![], content_type: "text/html".to_string() };
        assert!(!other.looks_like_spreadsheet());
    }
}
