use waypost_core::sql::{BoundParam, Dialect, ParamValue, TypeHint};

/// ClickHouse typed placeholders: `{name:Type}`. Values travel separately as
/// `param_<name>` query-string entries and are parsed server-side according
/// to the declared type, so they never touch the SQL text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHouseDialect;

impl Dialect for ClickHouseDialect {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn placeholder(&self, _position: usize, param: &BoundParam) -> String {
        format!("{{{}:{}}}", param.name, wire_type(param.hint))
    }
}

pub fn wire_type(hint: TypeHint) -> &'static str {
    match hint {
        TypeHint::Uuid => "UUID",
        TypeHint::Timestamp => "DateTime64(3, 'UTC')",
        TypeHint::Date => "Date",
        TypeHint::Text => "String",
        TypeHint::Int => "Int64",
        TypeHint::Float => "Float64",
    }
}

/// The `param_<name>` value. Date/time values are ISO-8601 in UTC.
pub fn param_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Text(s) => s.clone(),
        ParamValue::Int(i) => i.to_string(),
        ParamValue::Float(f) => f.to_string(),
        ParamValue::Uuid(u) => u.to_string(),
        ParamValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        ParamValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
    }
}
