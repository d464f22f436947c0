use waypost_core::sql::{BoundParam, Dialect, ParamValue, TypeHint};

/// `$n::type` placeholders understood by both Postgres and DuckDB.
///
/// A name used twice in one statement keeps its first position, so the
/// value is bound once. Every placeholder carries an explicit cast so the
/// store never has to infer a parameter type from context.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationalDialect;

impl Dialect for RelationalDialect {
    fn name(&self) -> &'static str {
        "relational"
    }

    fn placeholder(&self, position: usize, param: &BoundParam) -> String {
        format!("${position}::{}", cast(param.hint))
    }
}

fn cast(hint: TypeHint) -> &'static str {
    match hint {
        TypeHint::Uuid => "uuid",
        TypeHint::Timestamp => "timestamp",
        TypeHint::Date => "date",
        TypeHint::Text => "varchar",
        TypeHint::Int => "bigint",
        TypeHint::Float => "float8",
    }
}

/// What actually travels over the driver's bind interface. Identifiers and
/// temporal values go as text and are converted by the cast on the
/// placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Text(String),
    Int(i64),
    Float(f64),
}

pub fn wire_value(value: &ParamValue) -> WireValue {
    match value {
        ParamValue::Text(s) => WireValue::Text(s.clone()),
        ParamValue::Int(i) => WireValue::Int(*i),
        ParamValue::Float(f) => WireValue::Float(*f),
        ParamValue::Uuid(u) => WireValue::Text(u.to_string()),
        ParamValue::Date(d) => WireValue::Text(d.format("%Y-%m-%d").to_string()),
        ParamValue::Timestamp(ts) => {
            WireValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use waypost_core::analytics::Metric;
    use waypost_core::sql::{Params, Template};

    use super::*;

    #[test]
    fn reused_names_share_one_position() {
        let mut params = Params::new();
        params
            .set("cohort_website_id", uuid::Uuid::nil())
            .and_then(|p| p.set("cohort_start", chrono::Utc.timestamp_opt(0, 0).unwrap()))
            .expect("params");
        let stmt = Template::new(
            Metric::Dropoff,
            "SELECT 1 WHERE a = {{cohort_website_id::uuid}} AND t >= {{cohort_start}} AND b = {{cohort_website_id::uuid}}",
            &["one"],
        )
        .bind(&params, &RelationalDialect)
        .expect("bind");
        assert_eq!(
            stmt.sql,
            "SELECT 1 WHERE a = $1::uuid AND t >= $2::timestamp AND b = $1::uuid"
        );
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn timestamps_travel_as_utc_text() {
        let ts = chrono::Utc
            .with_ymd_and_hms(2025, 7, 1, 9, 5, 3)
            .single()
            .expect("ts");
        assert_eq!(
            wire_value(&ParamValue::Timestamp(ts)),
            WireValue::Text("2025-07-01 09:05:03.000000".to_string())
        );
    }
}
