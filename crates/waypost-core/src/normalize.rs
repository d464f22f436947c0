//! Coerces positional rows from either store into the canonical result
//! types.
//!
//! The stores disagree on wire types: ClickHouse quotes 64-bit integers in
//! JSON and renders `Date` as a plain string, DuckDB hands back typed values,
//! Postgres returns `bigint` and `timestamp`. Everything funnels through the
//! accessors on [`Row`] so each metric decodes one way.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::analytics::{
    percentage, ActivationResult, BackendKind, BounceBucket, ChurnRow, ClickThroughRow,
    DropoffRow, EventType, FunnelResult, PathTransition, RevenueBucket, UserBucket,
};
use crate::error::BackendError;
use crate::executor::Rows;
use crate::sql::BoundStatement;

/// Output columns per metric, in select order. Both backends alias their
/// select lists to exactly these names.
pub mod columns {
    pub const FUNNEL: &[&str] = &["started", "converted"];
    pub const DROPOFF: &[&str] = &["event_name", "sessions_with_event", "dropoff_sessions"];
    pub const ACTIVATION: &[&str] = &["total_sessions", "activated_sessions"];
    pub const PATH_TRANSITIONS: &[&str] = &["from_path", "to_path", "transitions"];
    pub const CHURN_INPUT: &[&str] = &["session_id", "session_created_at", "event_created_at"];
    pub const ARPU_USERS: &[&str] = &["bucket_start", "user_count"];
    pub const ARPU_REVENUE: &[&str] = &["bucket_start", "total_revenue"];
    pub const BOUNCE_RATE: &[&str] = &["bucket_start", "visits", "bounces"];
    pub const CLICK_THROUGH: &[&str] = &[
        "session_id",
        "created_at",
        "event_type",
        "event_name",
        "url_path",
        "utm_source",
        "device",
        "country",
    ];
}

/// Rows returned for one statement, checked against its declared width.
#[derive(Debug)]
pub struct ResultSet {
    backend: BackendKind,
    columns: &'static [&'static str],
    rows: Rows,
}

impl ResultSet {
    pub fn new(backend: BackendKind, stmt: &BoundStatement, rows: Rows) -> Result<Self, BackendError> {
        let width = stmt.columns.len();
        if let Some(bad) = rows.iter().find(|row| row.len() != width) {
            return Err(BackendError::decode(
                backend,
                format!(
                    "{} returned a row with {} columns, expected {width}",
                    stmt.metric,
                    bad.len()
                ),
            ));
        }
        Ok(Self {
            backend,
            columns: stmt.columns,
            rows,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row {
            backend: self.backend,
            columns: self.columns,
            cells,
        })
    }

    pub fn first(&self) -> Option<Row<'_>> {
        self.rows().next()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    backend: BackendKind,
    columns: &'static [&'static str],
    cells: &'a [Value],
}

impl<'a> Row<'a> {
    fn cell(&self, idx: usize) -> &'a Value {
        self.cells.get(idx).unwrap_or(&Value::Null)
    }

    fn err(&self, idx: usize, want: &str) -> BackendError {
        let column = self.columns.get(idx).copied().unwrap_or("?");
        BackendError::decode(
            self.backend,
            format!("column `{column}`: expected {want}, got {}", self.cell(idx)),
        )
    }

    /// Null counts as 0. Accepts quoted integers.
    pub fn int(&self, idx: usize) -> Result<i64, BackendError> {
        match self.cell(idx) {
            Value::Null => Ok(0),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .ok_or_else(|| self.err(idx, "integer")),
            Value::String(s) => s.trim().parse().map_err(|_| self.err(idx, "integer")),
            Value::Bool(b) => Ok(i64::from(*b)),
            _ => Err(self.err(idx, "integer")),
        }
    }

    /// Null counts as 0.
    pub fn float(&self, idx: usize) -> Result<f64, BackendError> {
        match self.cell(idx) {
            Value::Null => Ok(0.0),
            Value::Number(n) => n.as_f64().ok_or_else(|| self.err(idx, "number")),
            Value::String(s) => s.trim().parse().map_err(|_| self.err(idx, "number")),
            _ => Err(self.err(idx, "number")),
        }
    }

    pub fn opt_text(&self, idx: usize) -> Result<Option<String>, BackendError> {
        match self.cell(idx) {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            Value::Number(n) => Ok(Some(n.to_string())),
            _ => Err(self.err(idx, "text")),
        }
    }

    pub fn text(&self, idx: usize) -> Result<String, BackendError> {
        self.opt_text(idx)?.ok_or_else(|| self.err(idx, "non-null text"))
    }

    /// `YYYY-MM-DD` from a date, a datetime or an RFC 3339 string.
    pub fn date_label(&self, idx: usize) -> Result<String, BackendError> {
        let raw = self.text(idx)?;
        raw.get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .map(|date| date.format("%Y-%m-%d").to_string())
            .ok_or_else(|| self.err(idx, "date"))
    }

    pub fn opt_timestamp(&self, idx: usize) -> Result<Option<DateTime<Utc>>, BackendError> {
        match self.opt_text(idx)? {
            None => Ok(None),
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| self.err(idx, "timestamp")),
        }
    }

    pub fn timestamp(&self, idx: usize) -> Result<DateTime<Utc>, BackendError> {
        self.opt_timestamp(idx)?
            .ok_or_else(|| self.err(idx, "non-null timestamp"))
    }

    pub fn event_type(&self, idx: usize) -> Result<EventType, BackendError> {
        EventType::from_code(self.int(idx)?).ok_or_else(|| self.err(idx, "event type 1 or 2"))
    }
}

/// RFC 3339, or a naive `YYYY-MM-DD hh:mm:ss[.fff]` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn funnel(set: &ResultSet) -> Result<FunnelResult, BackendError> {
    let (started, converted) = match set.first() {
        Some(row) => (row.int(0)?, row.int(1)?),
        None => (0, 0),
    };
    Ok(FunnelResult {
        started,
        converted,
        conversion_rate: percentage(converted, started),
    })
}

pub fn dropoff(set: &ResultSet) -> Result<Vec<DropoffRow>, BackendError> {
    set.rows()
        .map(|row| {
            let sessions_with_event = row.int(1)?;
            let dropoff_sessions = row.int(2)?;
            Ok(DropoffRow {
                event_name: row.text(0)?,
                sessions_with_event,
                dropoff_sessions,
                dropoff_rate: percentage(dropoff_sessions, sessions_with_event),
            })
        })
        .collect()
}

pub fn activation(set: &ResultSet) -> Result<ActivationResult, BackendError> {
    let (total_sessions, activated_sessions) = match set.first() {
        Some(row) => (row.int(0)?, row.int(1)?),
        None => (0, 0),
    };
    Ok(ActivationResult {
        total_sessions,
        activated_sessions,
        activation_rate: percentage(activated_sessions, total_sessions),
    })
}

pub fn path_transitions(set: &ResultSet) -> Result<Vec<PathTransition>, BackendError> {
    set.rows()
        .map(|row| {
            Ok(PathTransition {
                from_path: row.opt_text(0)?,
                to_path: row.opt_text(1)?,
                transitions: row.int(2)?,
            })
        })
        .collect()
}

pub fn churn_input(set: &ResultSet) -> Result<Vec<ChurnRow>, BackendError> {
    set.rows()
        .map(|row| {
            Ok(ChurnRow {
                session_id: row.text(0)?,
                session_created_at: row.timestamp(1)?,
                event_created_at: row.opt_timestamp(2)?,
            })
        })
        .collect()
}

pub fn arpu_users(set: &ResultSet) -> Result<Vec<UserBucket>, BackendError> {
    set.rows()
        .map(|row| {
            Ok(UserBucket {
                bucket_start: row.date_label(0)?,
                user_count: row.int(1)?,
            })
        })
        .collect()
}

pub fn arpu_revenue(set: &ResultSet) -> Result<Vec<RevenueBucket>, BackendError> {
    set.rows()
        .map(|row| {
            Ok(RevenueBucket {
                bucket_start: row.date_label(0)?,
                revenue: row.float(1)?,
            })
        })
        .collect()
}

pub fn bounce_rate(set: &ResultSet) -> Result<Vec<BounceBucket>, BackendError> {
    set.rows()
        .map(|row| {
            let visits = row.int(1)?;
            let bounces = row.int(2)?;
            Ok(BounceBucket {
                bucket_start: row.date_label(0)?,
                visits,
                bounces,
                bounce_rate: percentage(bounces, visits),
            })
        })
        .collect()
}

pub fn click_through(set: &ResultSet) -> Result<Vec<ClickThroughRow>, BackendError> {
    set.rows()
        .map(|row| {
            Ok(ClickThroughRow {
                session_id: row.text(0)?,
                created_at: row.timestamp(1)?,
                event_type: row.event_type(2)?,
                event_name: row.opt_text(3)?,
                url_path: row.text(4)?,
                utm_source: row.opt_text(5)?,
                device: row.opt_text(6)?,
                country: row.opt_text(7)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::analytics::Metric;

    fn stmt(metric: Metric, columns: &'static [&'static str]) -> BoundStatement {
        BoundStatement {
            metric,
            sql: String::new(),
            params: Vec::new(),
            columns,
        }
    }

    fn set(metric: Metric, columns: &'static [&'static str], rows: Rows) -> ResultSet {
        ResultSet::new(BackendKind::Columnar, &stmt(metric, columns), rows).expect("width")
    }

    #[test]
    fn quoted_and_native_integers_agree() {
        let quoted = set(Metric::Funnel, columns::FUNNEL, vec![vec![json!("100"), json!("18")]]);
        let native = set(Metric::Funnel, columns::FUNNEL, vec![vec![json!(100), json!(18)]]);
        let a = funnel(&quoted).expect("quoted");
        assert_eq!(a, funnel(&native).expect("native"));
        assert_eq!(a.conversion_rate, 18.0);
    }

    #[test]
    fn bucket_labels_are_truncated_to_dates() {
        let rows = vec![
            vec![json!("2025-07-07"), json!(3)],
            vec![json!("2025-07-14 00:00:00"), json!(4)],
            vec![json!("2025-07-21T00:00:00+00:00"), json!("5")],
        ];
        let buckets = arpu_users(&set(Metric::ArpuUsers, columns::ARPU_USERS, rows)).expect("decode");
        let labels: Vec<_> = buckets.iter().map(|b| b.bucket_start.as_str()).collect();
        assert_eq!(labels, ["2025-07-07", "2025-07-14", "2025-07-21"]);
        assert_eq!(buckets[2].user_count, 5);
    }

    #[test]
    fn null_counts_become_zero_and_empty_is_ok() {
        let rows = vec![vec![json!(null), json!(null)]];
        let result = activation(&set(Metric::Activation, columns::ACTIVATION, rows)).expect("decode");
        assert_eq!(result.total_sessions, 0);
        assert_eq!(result.activation_rate, 0.0);

        let empty = dropoff(&set(Metric::Dropoff, columns::DROPOFF, Vec::new())).expect("decode");
        assert!(empty.is_empty());
    }

    #[test]
    fn row_width_mismatch_is_a_decode_error() {
        let err = ResultSet::new(
            BackendKind::Relational,
            &stmt(Metric::Funnel, columns::FUNNEL),
            vec![vec![json!(1)]],
        )
        .expect_err("width");
        assert_eq!(err.kind, crate::error::BackendErrorKind::Decode);
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let a = parse_timestamp("2025-07-01 10:30:00.250").expect("naive");
        let b = parse_timestamp("2025-07-01T10:30:00.250Z").expect("rfc3339");
        assert_eq!(a, b);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
