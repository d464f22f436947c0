//! Metric vocabulary and the backend abstraction.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Which store answers metric queries for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Row-oriented transactional store (Postgres, or embedded DuckDB).
    Relational,
    /// Column-oriented analytical store (ClickHouse).
    Columnar,
}

impl BackendKind {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "relational" | "postgres" | "postgresql" | "duckdb" => Ok(Self::Relational),
            "columnar" | "clickhouse" => Ok(Self::Columnar),
            other => Err(format!(
                "unknown backend `{other}` (expected `relational` or `columnar`)"
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Columnar => "columnar",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Funnel,
    Dropoff,
    Activation,
    PathTransitions,
    ChurnInput,
    ArpuUsers,
    ArpuRevenue,
    BounceRate,
    ClickThrough,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funnel => "funnel",
            Self::Dropoff => "dropoff",
            Self::Activation => "activation",
            Self::PathTransitions => "path_transitions",
            Self::ChurnInput => "churn_input",
            Self::ArpuUsers => "arpu_users",
            Self::ArpuRevenue => "arpu_revenue",
            Self::BounceRate => "bounce_rate",
            Self::ClickThrough => "click_through",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-series bucket width. Boundaries are always computed in UTC and weeks
/// start on Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn parse(raw: Option<&str>) -> Result<Self, EngineError> {
        match raw.map(str::trim) {
            None | Some("") | Some("day") => Ok(Self::Day),
            Some("week") => Ok(Self::Week),
            Some("month") => Ok(Self::Month),
            Some(other) => Err(EngineError::validation(format!(
                "granularity must be one of: day, week, month (got `{other}`)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// First day of the bucket containing `date`.
    pub fn truncate(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Week => {
                let back = u64::from(date.weekday().num_days_from_monday());
                date.checked_sub_days(Days::new(back)).unwrap_or(date)
            }
            Self::Month => date.with_day(1).unwrap_or(date),
        }
    }

    fn advance(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Day => start.succ_opt(),
            Self::Week => start.checked_add_days(Days::new(7)),
            Self::Month => start.checked_add_months(Months::new(1)),
        }
    }
}

/// Upper bound on the number of buckets a zero-filled series may hold.
pub const MAX_BUCKETS: usize = 10_000;

/// Every bucket start touched by `[date_from, date_to]`, oldest first.
/// The first bucket may begin before `date_from` (a week starting on the
/// preceding Monday, for instance).
pub fn bucket_starts(
    filters: &QueryFilters,
    granularity: Granularity,
) -> Result<Vec<NaiveDate>, EngineError> {
    let mut starts = Vec::new();
    let mut current = Some(granularity.truncate(filters.date_from));
    while let Some(start) = current.filter(|d| *d <= filters.date_to) {
        if starts.len() == MAX_BUCKETS {
            return Err(EngineError::validation(format!(
                "date range spans more than {MAX_BUCKETS} {} buckets",
                granularity.as_str()
            )));
        }
        starts.push(start);
        current = granularity.advance(start);
    }
    Ok(starts)
}

/// `website_event.event_type` as stored by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    CustomEvent,
}

impl EventType {
    pub fn code(&self) -> i64 {
        match self {
            Self::PageView => 1,
            Self::CustomEvent => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::PageView),
            2 => Some(Self::CustomEvent),
            _ => None,
        }
    }

    pub fn parse(raw: Option<&str>) -> Result<Option<Self>, EngineError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some("pageview") | Some("page_view") => Ok(Some(Self::PageView)),
            Some("event") | Some("custom_event") => Ok(Some(Self::CustomEvent)),
            Some(other) => Err(EngineError::validation(format!(
                "event_type must be `pageview` or `event` (got `{other}`)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PathMatch {
    #[default]
    Equals,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    pub value: String,
    pub op: PathMatch,
}

/// Visitor-segment predicates. Session attributes (country, device, browser,
/// os) live on `session` in the relational store and are denormalized onto
/// every event in the columnar store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentFilter {
    pub country: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub utm_source: Option<String>,
    pub referrer: Option<String>,
}

impl SegmentFilter {
    pub fn has_session_predicates(&self) -> bool {
        self.country.is_some() || self.device.is_some() || self.browser.is_some() || self.os.is_some()
    }
}

/// The logical request object every metric accepts.
#[derive(Debug, Clone)]
pub struct QueryFilters {
    pub website_id: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub event_type: Option<EventType>,
    pub event_name: Option<String>,
    pub url_path: Option<PathFilter>,
    pub segment: SegmentFilter,
    /// Accepted for forward compatibility; bucketing is UTC regardless.
    pub timezone: Option<String>,
}

impl QueryFilters {
    pub fn new(website_id: impl Into<String>, date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            website_id: website_id.into(),
            date_from,
            date_to,
            event_type: None,
            event_name: None,
            url_path: None,
            segment: SegmentFilter::default(),
            timezone: None,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.website_uuid()?;
        if self.date_to < self.date_from {
            return Err(EngineError::validation(
                "date_to must be on or after date_from",
            ));
        }
        if self.date_to.succ_opt().is_none() {
            return Err(EngineError::validation("date_to is out of range"));
        }
        if matches!(&self.event_name, Some(name) if name.trim().is_empty()) {
            return Err(EngineError::validation(
                "event_name cannot be empty when provided",
            ));
        }
        if matches!(&self.url_path, Some(path) if path.value.is_empty()) {
            return Err(EngineError::validation(
                "url_path cannot be empty when provided",
            ));
        }
        Ok(())
    }

    pub fn website_uuid(&self) -> Result<Uuid, EngineError> {
        Uuid::parse_str(self.website_id.trim())
            .map_err(|_| EngineError::validation("website_id must be a UUID"))
    }

    /// Inclusive lower bound: `date_from` at 00:00 UTC.
    pub fn window_start(&self) -> DateTime<Utc> {
        start_of_day(self.date_from)
    }

    /// Exclusive upper bound: the day after `date_to` at 00:00 UTC.
    /// Saturates on the last representable date, which `validate` rejects.
    pub fn window_end(&self) -> DateTime<Utc> {
        self.date_to
            .succ_opt()
            .map_or(DateTime::<Utc>::MAX_UTC, start_of_day)
    }
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[derive(Debug, Clone)]
pub struct FunnelQuery {
    pub from_event: String,
    pub to_event: String,
}

#[derive(Debug, Clone)]
pub struct ActivationQuery {
    pub event_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct PathQuery {
    pub normalize: bool,
}

#[derive(Debug, Clone)]
pub struct ChurnQuery {
    pub lookback_days: u32,
}

impl ChurnQuery {
    /// Sessions created on or after this instant are candidates.
    pub fn lookback_start(&self, filters: &QueryFilters) -> Result<DateTime<Utc>, EngineError> {
        filters
            .window_start()
            .checked_sub_signed(Duration::days(i64::from(self.lookback_days)))
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "lookback_days {} reaches before the earliest supported date",
                    self.lookback_days
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserModel {
    /// Every session with at least one event counts as a user.
    #[default]
    Active,
    /// Only sessions with a positive revenue record count.
    Paying,
}

impl UserModel {
    pub fn parse(raw: Option<&str>) -> Result<Self, EngineError> {
        match raw.map(str::trim) {
            None | Some("") | Some("active") => Ok(Self::Active),
            Some("paying") => Ok(Self::Paying),
            Some(other) => Err(EngineError::validation(format!(
                "model must be `active` or `paying` (got `{other}`)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Result shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelResult {
    pub started: i64,
    pub converted: i64,
    /// 0–100, two decimals.
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropoffRow {
    pub event_name: String,
    pub sessions_with_event: i64,
    pub dropoff_sessions: i64,
    pub dropoff_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationResult {
    pub total_sessions: i64,
    pub activated_sessions: i64,
    pub activation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathTransition {
    pub from_path: Option<String>,
    /// `None` marks the visit's exit.
    pub to_path: Option<String>,
    pub transitions: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChurnRow {
    pub session_id: String,
    pub session_created_at: DateTime<Utc>,
    pub event_created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserBucket {
    pub bucket_start: String,
    pub user_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueBucket {
    pub bucket_start: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BounceBucket {
    pub bucket_start: String,
    pub visits: i64,
    pub bounces: i64,
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClickThroughRow {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub event_type: EventType,
    pub event_name: Option<String>,
    pub url_path: String,
    pub utm_source: Option<String>,
    pub device: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArpuBucket {
    pub bucket_start: String,
    pub revenue: f64,
    pub users: i64,
    pub arpu: f64,
}

/// `part / whole * 100` rounded to two decimals; 0 when `whole` is 0.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One method per metric. Implementations must not fall back to another
/// backend: a metric the store cannot answer returns
/// [`EngineError::NotImplemented`].
#[async_trait]
pub trait MetricBackend: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    async fn ping(&self) -> Result<(), EngineError>;

    async fn funnel(
        &self,
        filters: &QueryFilters,
        query: &FunnelQuery,
    ) -> Result<FunnelResult, EngineError>;

    async fn dropoff(&self, filters: &QueryFilters) -> Result<Vec<DropoffRow>, EngineError>;

    async fn activation(
        &self,
        filters: &QueryFilters,
        query: &ActivationQuery,
    ) -> Result<ActivationResult, EngineError>;

    async fn path_transitions(
        &self,
        filters: &QueryFilters,
        query: &PathQuery,
    ) -> Result<Vec<PathTransition>, EngineError>;

    async fn churn_input(
        &self,
        filters: &QueryFilters,
        query: &ChurnQuery,
    ) -> Result<Vec<ChurnRow>, EngineError>;

    async fn arpu_users(
        &self,
        filters: &QueryFilters,
        granularity: Granularity,
        model: UserModel,
    ) -> Result<Vec<UserBucket>, EngineError>;

    async fn arpu_revenue(
        &self,
        filters: &QueryFilters,
        granularity: Granularity,
    ) -> Result<Vec<RevenueBucket>, EngineError>;

    async fn bounce_rate(
        &self,
        filters: &QueryFilters,
        granularity: Granularity,
    ) -> Result<Vec<BounceBucket>, EngineError>;

    async fn click_through(
        &self,
        filters: &QueryFilters,
    ) -> Result<Vec<ClickThroughRow>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
    }

    #[test]
    fn window_is_half_open_and_extends_to_next_day() {
        let f = QueryFilters::new(
            "5a1c4c4e-8f6b-4d4e-9a77-0f1c8f3b2a10",
            day("2025-07-01"),
            day("2025-08-31"),
        );
        assert_eq!(f.window_start().to_rfc3339(), "2025-07-01T00:00:00+00:00");
        assert_eq!(f.window_end().to_rfc3339(), "2025-09-01T00:00:00+00:00");
    }

    #[test]
    fn validate_rejects_inverted_range_and_bad_uuid() {
        let mut f = QueryFilters::new("not-a-uuid", day("2025-07-01"), day("2025-07-02"));
        assert!(matches!(f.validate(), Err(EngineError::Validation(_))));
        f.website_id = "5a1c4c4e-8f6b-4d4e-9a77-0f1c8f3b2a10".to_string();
        assert!(f.validate().is_ok());
        f.date_to = day("2025-06-30");
        assert!(matches!(f.validate(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn validate_rejects_last_representable_date() {
        let f = QueryFilters::new(
            "5a1c4c4e-8f6b-4d4e-9a77-0f1c8f3b2a10",
            NaiveDate::MAX,
            NaiveDate::MAX,
        );
        assert!(matches!(f.validate(), Err(EngineError::Validation(_))));
        assert_eq!(f.window_end(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn lookback_past_the_calendar_is_a_validation_error() {
        let f = QueryFilters::new(
            "5a1c4c4e-8f6b-4d4e-9a77-0f1c8f3b2a10",
            day("2025-07-01"),
            day("2025-07-31"),
        );
        let huge = ChurnQuery {
            lookback_days: 4_000_000_000,
        };
        assert!(matches!(
            huge.lookback_start(&f),
            Err(EngineError::Validation(_))
        ));
        let month = ChurnQuery { lookback_days: 30 };
        assert_eq!(
            month.lookback_start(&f).map(|t| t.to_rfc3339()).ok(),
            Some("2025-06-01T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn bucket_starts_cover_partial_leading_weeks_and_months() {
        let f = QueryFilters::new(
            "5a1c4c4e-8f6b-4d4e-9a77-0f1c8f3b2a10",
            day("2025-07-01"),
            day("2025-07-31"),
        );
        let weeks: Vec<String> = bucket_starts(&f, Granularity::Week)
            .unwrap_or_default()
            .iter()
            .map(|d| d.to_string())
            .collect();
        assert_eq!(
            weeks,
            vec!["2025-06-30", "2025-07-07", "2025-07-14", "2025-07-21", "2025-07-28"]
        );
        assert_eq!(bucket_starts(&f, Granularity::Day).map(|d| d.len()).ok(), Some(31));

        let spans = QueryFilters::new(
            "5a1c4c4e-8f6b-4d4e-9a77-0f1c8f3b2a10",
            day("2025-01-31"),
            day("2025-03-01"),
        );
        let months: Vec<String> = bucket_starts(&spans, Granularity::Month)
            .unwrap_or_default()
            .iter()
            .map(|d| d.to_string())
            .collect();
        assert_eq!(months, vec!["2025-01-01", "2025-02-01", "2025-03-01"]);
    }

    #[test]
    fn bucket_starts_refuse_unbounded_series() {
        let f = QueryFilters::new(
            "5a1c4c4e-8f6b-4d4e-9a77-0f1c8f3b2a10",
            day("1900-01-01"),
            day("2100-12-31"),
        );
        assert!(matches!(
            bucket_starts(&f, Granularity::Day),
            Err(EngineError::Validation(_))
        ));
        assert!(bucket_starts(&f, Granularity::Month).is_ok());
    }

    #[test]
    fn granularity_parse() {
        assert_eq!(Granularity::parse(None).ok(), Some(Granularity::Day));
        assert_eq!(Granularity::parse(Some("week")).ok(), Some(Granularity::Week));
        assert!(matches!(
            Granularity::parse(Some("hour")),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn percentage_is_zero_for_empty_denominator() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(18, 100), 18.0);
        assert_eq!(percentage(1, 3), 33.33);
    }

    #[test]
    fn backend_kind_aliases() {
        assert_eq!(BackendKind::parse("clickhouse"), Ok(BackendKind::Columnar));
        assert_eq!(BackendKind::parse("Postgres"), Ok(BackendKind::Relational));
        assert!(BackendKind::parse("mysql").is_err());
    }
}
