//! Row-to-record mapping (§4.5): IP/date/country validation and default fill. Pure
//! functions over `RawRow` — no I/O, so this is unit-testable in isolation from the
//! Scraper and Store.

use crate::source::RawRow;
use chrono::NaiveDate;
use ipnetwork::IpNetwork;
use ipwatch_core::NormalizedRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use std::str::FromStr;

const DEFAULT_CONFIDENCE: i16 = 85;
const DEFAULT_CATEGORY: &str = "threat_intel";
const DEFAULT_REASON: &str = "REGTECH Excel Import";

static IPV4_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").expect("valid regex"));

static COUNTRY_ALIASES: Lazy<[(&str, &str); 4]> =
    Lazy::new(|| [("KOREA", "KR"), ("한국", "KR"), ("미국", "US"), ("USA", "US")]);

/// One row's normalization outcome: either a usable record, or a reason the row
/// was rejected (surfaced per-row in `CollectionHistory.details`, §7).
pub enum NormalizeOutcome {
    Accepted(NormalizedRecord),
    Rejected { ip: Option<String>, reason: String },
}

pub struct Normalizer {
    source: String,
    default_confidence: i16,
}

impl Normalizer {
    pub fn new(source: impl Into<String>, default_confidence: Option<i16>) -> Self {
        Self { source: source.into(), default_confidence: default_confidence.unwrap_or(DEFAULT_CONFIDENCE) }
    }

    pub fn normalize_batch(&self, rows: &[RawRow]) -> Vec<NormalizeOutcome> {
        rows.iter().map(|row| self.normalize_row(row)).collect()
    }

    fn normalize_row(&self, row: &RawRow) -> NormalizeOutcome {
        let raw_ip = match &row.ip {
            Some(ip) => ip.trim(),
            None => return NormalizeOutcome::Rejected { ip: None, reason: "missing ip column".to_string() },
        };

        let ip = match validate_ip(raw_ip) {
            Ok(ip) => ip,
            Err(reason) => return NormalizeOutcome::Rejected { ip: Some(raw_ip.to_string()), reason },
        };

        let detection_date = row.detection_date.as_deref().and_then(parse_date);
        let removal_date = row.removal_date.as_deref().and_then(parse_date);
        let today = chrono::Utc::now().date_naive();
        let active = !matches!(removal_date, Some(removal) if removal < today);

        let confidence = row
            .confidence
            .as_deref()
            .and_then(|value| value.trim().parse::<i16>().ok())
            .map(|value| value.clamp(0, 100))
            .unwrap_or(self.default_confidence);

        let country = row.country.as_deref().map(normalize_country);
        let category = row.category.as_deref().filter(|c| !c.trim().is_empty()).unwrap_or(DEFAULT_CATEGORY).to_string();
        let reason = row.reason.as_deref().filter(|r| !r.trim().is_empty()).unwrap_or(DEFAULT_REASON).to_string();

        NormalizeOutcome::Accepted(NormalizedRecord {
            ip,
            source: self.source.clone(),
            reason,
            category,
            confidence,
            country,
            detection_date,
            removal_date,
            active,
            raw_data: None,
        })
    }
}

/// IPv4 must match the dotted-quad shape with every octet `<=255` and must not fall
/// in RFC1918, loopback, or `0.0.0.0/8`. IPv6 is only checked for syntactic
/// validity — §4.5/§9 state no exclusion list applies there.
fn validate_ip(raw: &str) -> Result<IpNetwork, String> {
    if IPV4_SHAPE.is_match(raw) {
        let octets_in_range = raw.split('.').all(|part| part.parse::<u16>().map(|v| v <= 255).unwrap_or(false));
        if !octets_in_range {
            return Err(format!("ip octet out of range: {raw}"));
        }
        let addr = IpAddr::from_str(raw).map_err(|_| format!("invalid ipv4 address: {raw}"))?;
        if is_excluded_ipv4(&addr) {
            return Err(format!("ip in excluded range: {raw}"));
        }
        return Ok(IpNetwork::from_str(raw).map_err(|_| format!("invalid ipv4 address: {raw}"))?);
    }

    match IpAddr::from_str(raw) {
        Ok(IpAddr::V6(_)) => IpNetwork::from_str(raw).map_err(|_| format!("invalid ipv6 address: {raw}")),
        _ => Err(format!("not a syntactically valid ip: {raw}")),
    }
}

fn is_excluded_ipv4(addr: &IpAddr) -> bool {
    let IpAddr::V4(v4) = addr else { return false };
    v4.is_private() || v4.is_loopback() || v4.octets()[0] == 0
}

/// Uppercase, map known aliases, else truncate to 2 characters — §4.5 gives no
/// fallback beyond truncation for unrecognized country strings.
fn normalize_country(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if let Some((_, code)) = COUNTRY_ALIASES.iter().find(|(alias, _)| *alias == upper) {
        return code.to_string();
    }
    upper.chars().take(2).collect()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ip: &str) -> RawRow {
        RawRow { ip: Some(ip.to_string()), ..Default::default() }
    }

    #[test]
    fn rejects_rfc1918_loopback_and_zero_net() {
        assert!(validate_ip("192.168.1.1").is_err());
        assert!(validate_ip("10.0.0.1").is_err());
        assert!(validate_ip("127.0.0.1").is_err());
        assert!(validate_ip("0.1.2.3").is_err());
        assert!(validate_ip("1.2.3.4").is_ok());
    }

    #[test]
    fn rejects_out_of_range_octets() {
        assert!(validate_ip("1.2.3.999").is_err());
    }

    #[test]
    fn accepts_syntactically_valid_ipv6() {
        assert!(validate_ip("2001:db8::1").is_ok());
    }

    #[test]
    fn country_aliases_map_to_iso_codes() {
        assert_eq!(normalize_country("korea"), "KR");
        assert_eq!(normalize_country("한국"), "KR");
        assert_eq!(normalize_country("Germany"), "GE");
    }

    #[test]
    fn parses_all_three_declared_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(parse_date("2026-01-15"), Some(expected));
        assert_eq!(parse_date("2026/01/15"), Some(expected));
        assert_eq!(parse_date("2026.01.15"), Some(expected));
        assert_eq!(parse_date("not-a-date"), None);
    }

    #[test]
    fn removal_date_in_the_past_forces_inactive() {
        let normalizer = Normalizer::new("REGTECH", None);
        let mut r = row("1.2.3.4");
        r.removal_date = Some("2000-01-01".to_string());
        match normalizer.normalize_row(&r) {
            NormalizeOutcome::Accepted(record) => assert!(!record.active),
            NormalizeOutcome::Rejected { .. } => panic!("expected acceptance"),
        }
    }

    #[test]
    fn missing_confidence_falls_back_to_default() {
        let normalizer = Normalizer::new("REGTECH", None);
        match normalizer.normalize_row(&row("1.2.3.4")) {
            NormalizeOutcome::Accepted(record) => assert_eq!(record.confidence, DEFAULT_CONFIDENCE),
            NormalizeOutcome::Rejected { .. } => panic!("expected acceptance"),
        }
    }
}
