use chrono::{Duration, NaiveDate};
use serde::Deserialize;

use waypost_core::analytics::{EventType, PathFilter, PathMatch, QueryFilters, SegmentFilter};

use crate::error::AppError;

/// Window used when the caller omits `date_from`.
const DEFAULT_RANGE_DAYS: i64 = 30;
const MAX_FILTER_LEN: usize = 512;

/// Query-string parameters shared by every metric route.
#[derive(Debug, Default, Deserialize)]
pub struct MetricQuery {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub timezone: Option<String>,
    pub granularity: Option<String>,
    pub event_type: Option<String>,
    pub event_name: Option<String>,
    pub url_path: Option<String>,
    /// `equals` (default) or `contains`.
    pub url_path_match: Option<String>,
    pub filter_country: Option<String>,
    pub filter_device: Option<String>,
    pub filter_browser: Option<String>,
    pub filter_os: Option<String>,
    pub filter_utm_source: Option<String>,
    pub filter_referrer: Option<String>,
}

impl MetricQuery {
    pub fn filters(&self, website_id: String) -> Result<QueryFilters, AppError> {
        let today = chrono::Utc::now().date_naive();
        let date_to = match self.date_to.as_deref() {
            Some(raw) => parse_date("date_to", raw)?,
            None => today,
        };
        let date_from = match self.date_from.as_deref() {
            Some(raw) => parse_date("date_from", raw)?,
            None => date_to
                .checked_sub_signed(Duration::days(DEFAULT_RANGE_DAYS - 1))
                .ok_or_else(|| AppError::BadRequest("date_to is out of range".to_string()))?,
        };

        let url_path = match optional("url_path", &self.url_path)? {
            Some(value) => Some(PathFilter {
                value,
                op: parse_path_match(self.url_path_match.as_deref())?,
            }),
            None => None,
        };

        Ok(QueryFilters {
            website_id,
            date_from,
            date_to,
            event_type: EventType::parse(self.event_type.as_deref())?,
            event_name: optional("event_name", &self.event_name)?,
            url_path,
            segment: SegmentFilter {
                country: optional("filter_country", &self.filter_country)?,
                device: optional("filter_device", &self.filter_device)?,
                browser: optional("filter_browser", &self.filter_browser)?,
                os: optional("filter_os", &self.filter_os)?,
                utm_source: optional("filter_utm_source", &self.filter_utm_source)?,
                referrer: optional("filter_referrer", &self.filter_referrer)?,
            },
            timezone: optional("timezone", &self.timezone)?,
        })
    }
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid {field} (expected YYYY-MM-DD)")))
}

fn parse_path_match(raw: Option<&str>) -> Result<PathMatch, AppError> {
    match raw.map(str::trim) {
        None | Some("") | Some("equals") => Ok(PathMatch::Equals),
        Some("contains") => Ok(PathMatch::Contains),
        Some(other) => Err(AppError::BadRequest(format!(
            "url_path_match must be `equals` or `contains` (got `{other}`)"
        ))),
    }
}

/// Trimmed value, or `None` when absent. Present-but-blank is rejected.
pub fn optional(field: &str, value: &Option<String>) -> Result<Option<String>, AppError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!(
            "{field} cannot be empty when provided"
        )));
    }
    if trimmed.len() > MAX_FILTER_LEN {
        return Err(AppError::BadRequest(format!(
            "{field} is too long (max {MAX_FILTER_LEN} characters)"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// `true`/`1` or `false`/`0`; absent is `false`.
pub fn parse_flag(field: &str, raw: Option<&str>) -> Result<bool, AppError> {
    match raw.map(str::trim) {
        None | Some("") | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(AppError::BadRequest(format!(
            "{field} must be true or false (got `{other}`)"
        ))),
    }
}
