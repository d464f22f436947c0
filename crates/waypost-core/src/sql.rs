//! Statement templates and the dialect-neutral half of parameter binding.
//!
//! SQL text is assembled only from `&'static str` pieces and [`SqlFragment`]s.
//! Caller-controlled data lives in [`Params`] and reaches the store through
//! the driver's bind mechanism, never through string concatenation.
//!
//! Templates reference parameters as `{{name}}` or `{{name::hint}}` and
//! splice fragments through `[[slot]]` markers. A [`Dialect`] turns each
//! placeholder into the store's native syntax.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::analytics::Metric;
use crate::error::EngineError;

/// Trusted SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlFragment(String);

impl SqlFragment {
    pub fn trusted(sql: &'static str) -> Self {
        Self(sql.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incrementally builds a [`SqlFragment`] from static text, other fragments
/// and parameter placeholders.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    sql: String,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sql: &'static str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn fragment(&mut self, fragment: &SqlFragment) -> &mut Self {
        self.sql.push_str(fragment.as_str());
        self
    }

    pub fn param(&mut self, name: &'static str, hint: Option<TypeHint>) -> &mut Self {
        self.sql.push_str("{{");
        self.sql.push_str(name);
        if let Some(hint) = hint {
            self.sql.push_str("::");
            self.sql.push_str(hint.as_str());
        }
        self.sql.push_str("}}");
        self
    }

    pub fn build(self) -> SqlFragment {
        SqlFragment(self.sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    Uuid,
    Timestamp,
    Date,
    Text,
    Int,
    Float,
}

impl TypeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::Text => "text",
            Self::Int => "int",
            Self::Float => "float",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "uuid" => Some(Self::Uuid),
            "timestamp" => Some(Self::Timestamp),
            "date" => Some(Self::Date),
            "text" => Some(Self::Text),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            _ => None,
        }
    }

    fn accepts(&self, value: &ParamValue) -> bool {
        matches!(
            (self, value),
            (Self::Uuid, ParamValue::Uuid(_))
                | (Self::Timestamp, ParamValue::Timestamp(_))
                | (Self::Date, ParamValue::Date(_))
                | (Self::Text, ParamValue::Text(_))
                | (Self::Int, ParamValue::Int(_))
                | (Self::Float, ParamValue::Float(_))
                | (Self::Float, ParamValue::Int(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl ParamValue {
    /// The hint implied by the value itself.
    pub fn natural_hint(&self) -> TypeHint {
        match self {
            Self::Text(_) => TypeHint::Text,
            Self::Int(_) => TypeHint::Int,
            Self::Float(_) => TypeHint::Float,
            Self::Uuid(_) => TypeHint::Uuid,
            Self::Date(_) => TypeHint::Date,
            Self::Timestamp(_) => TypeHint::Timestamp,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Uuid> for ParamValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// Named parameter bag. Setting a name twice is allowed only with an equal
/// value, which is what lets a fragment and its parent share `website_id`
/// without colliding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<&'static str, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        name: &'static str,
        value: impl Into<ParamValue>,
    ) -> Result<&mut Self, EngineError> {
        let value = value.into();
        match self.0.get(name) {
            Some(existing) if *existing != value => {
                return Err(EngineError::binding(format!(
                    "parameter `{name}` bound twice with different values"
                )));
            }
            Some(_) => {}
            None => {
                self.0.insert(name, value);
            }
        }
        Ok(self)
    }

    pub fn merge(&mut self, other: &Params) -> Result<&mut Self, EngineError> {
        for (name, value) in &other.0 {
            self.set(*name, value.clone())?;
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One distinct placeholder as it will be sent to the store, in order of
/// first appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub name: String,
    pub hint: TypeHint,
    pub value: ParamValue,
}

/// Store-specific placeholder rendering.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render the placeholder for the distinct parameter at `position`
    /// (1-based, order of first appearance). Called for every occurrence.
    fn placeholder(&self, position: usize, param: &BoundParam) -> String;
}

/// A complete statement ready for an executor.
#[derive(Debug, Clone)]
pub struct BoundStatement {
    pub metric: Metric,
    pub sql: String,
    pub params: Vec<BoundParam>,
    /// Output column order every executor must preserve.
    pub columns: &'static [&'static str],
}

/// A metric's SQL text before its slots are filled.
#[derive(Debug, Clone)]
pub struct Template {
    metric: Metric,
    sql: &'static str,
    columns: &'static [&'static str],
    slots: Vec<(&'static str, SqlFragment)>,
}

impl Template {
    pub fn new(metric: Metric, sql: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            metric,
            sql,
            columns,
            slots: Vec::new(),
        }
    }

    pub fn slot(mut self, name: &'static str, fragment: SqlFragment) -> Self {
        self.slots.push((name, fragment));
        self
    }

    /// Fill every `[[slot]]`. Inserted fragments are not rescanned.
    pub fn render(&self) -> Result<SqlFragment, EngineError> {
        let mut out = String::with_capacity(self.sql.len() * 2);
        let mut rest = self.sql;
        while let Some(open) = rest.find("[[") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let close = after
                .find("]]")
                .ok_or_else(|| EngineError::binding("unterminated slot marker"))?;
            let name = &after[..close];
            let fragment = self
                .slots
                .iter()
                .find(|(slot, _)| *slot == name)
                .map(|(_, fragment)| fragment)
                .ok_or_else(|| EngineError::binding(format!("slot `{name}` was not filled")))?;
            out.push_str(fragment.as_str());
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        Ok(SqlFragment(out))
    }

    pub fn bind(self, params: &Params, dialect: &dyn Dialect) -> Result<BoundStatement, EngineError> {
        let rendered = self.render()?;
        let (sql, bound) = bind(&rendered, params, dialect)?;
        Ok(BoundStatement {
            metric: self.metric,
            sql,
            params: bound,
            columns: self.columns,
        })
    }
}

/// Replace every `{{name[::hint]}}` in `sql` with the dialect's placeholder.
///
/// Fails on unbound names, unknown hints, hint/value mismatches and
/// malformed markers.
pub fn bind(
    sql: &SqlFragment,
    params: &Params,
    dialect: &dyn Dialect,
) -> Result<(String, Vec<BoundParam>), EngineError> {
    let text = sql.as_str();
    let mut out = String::with_capacity(text.len());
    let mut bound: Vec<BoundParam> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after
            .find("}}")
            .ok_or_else(|| EngineError::binding("unterminated placeholder"))?;
        let (name, hint) = parse_marker(&after[..close])?;

        let value = params.get(name).ok_or_else(|| {
            EngineError::binding(format!(
                "{} statement references unbound parameter `{name}`",
                dialect.name()
            ))
        })?;
        let hint = match hint {
            Some(hint) if !hint.accepts(value) => {
                return Err(EngineError::binding(format!(
                    "parameter `{name}` is hinted `{}` but bound to {:?}",
                    hint.as_str(),
                    value.natural_hint()
                )));
            }
            Some(hint) => hint,
            None => value.natural_hint(),
        };

        let position = match bound.iter().position(|p| p.name == name) {
            Some(idx) => idx + 1,
            None => {
                bound.push(BoundParam {
                    name: name.to_string(),
                    hint,
                    value: value.clone(),
                });
                bound.len()
            }
        };
        let param = &bound[position - 1];
        let rendered = if param.hint == hint {
            dialect.placeholder(position, param)
        } else {
            // Same name reused with a narrower hint (e.g. Int used as Float).
            let mut hinted = param.clone();
            hinted.hint = hint;
            dialect.placeholder(position, &hinted)
        };
        out.push_str(&rendered);
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Ok((out, bound))
}

fn parse_marker(marker: &str) -> Result<(&str, Option<TypeHint>), EngineError> {
    let (name, hint) = match marker.split_once("::") {
        Some((name, hint)) => {
            let parsed = TypeHint::parse(hint.trim())
                .ok_or_else(|| EngineError::binding(format!("unknown type hint `{hint}`")))?;
            (name.trim(), Some(parsed))
        }
        None => (marker.trim(), None),
    };
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        return Err(EngineError::binding(format!(
            "malformed placeholder `{{{{{marker}}}}}`"
        )));
    }
    Ok((name, hint))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Numbered;

    impl Dialect for Numbered {
        fn name(&self) -> &'static str {
            "test"
        }

        fn placeholder(&self, position: usize, param: &BoundParam) -> String {
            format!("${position}:{}", param.hint.as_str())
        }
    }

    #[test]
    fn reused_name_binds_once() {
        let mut params = Params::new();
        params
            .set("website_id", Uuid::nil())
            .and_then(|p| p.set("name", "signup"))
            .expect("params");
        let sql = SqlFragment::trusted(
            "a = {{website_id::uuid}} AND b = {{name}} AND c = {{website_id::uuid}}",
        );
        let (text, bound) = bind(&sql, &params, &Numbered).expect("bind");
        assert_eq!(text, "a = $1:uuid AND b = $2:text AND c = $1:uuid");
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[1].value, ParamValue::Text("signup".to_string()));
    }

    #[test]
    fn unbound_name_is_rejected() {
        let sql = SqlFragment::trusted("x = {{missing}}");
        let err = bind(&sql, &Params::new(), &Numbered).expect_err("unbound");
        assert!(matches!(err, EngineError::Binding(msg) if msg.contains("missing")));
    }

    #[test]
    fn hint_value_mismatch_is_rejected() {
        let mut params = Params::new();
        params.set("when", "yesterday").expect("params");
        let sql = SqlFragment::trusted("t >= {{when::timestamp}}");
        assert!(matches!(
            bind(&sql, &params, &Numbered),
            Err(EngineError::Binding(_))
        ));
    }

    #[test]
    fn caller_values_never_reach_sql_text() {
        let hostile = "x'; DROP TABLE website_event; --";
        let mut params = Params::new();
        params.set("name", hostile).expect("params");
        let sql = SqlFragment::trusted("event_name = {{name}}");
        let (text, bound) = bind(&sql, &params, &Numbered).expect("bind");
        assert!(!text.contains("DROP"));
        assert_eq!(bound[0].value, ParamValue::Text(hostile.to_string()));
    }

    #[test]
    fn conflicting_values_for_same_name_are_rejected() {
        let mut a = Params::new();
        a.set("website_id", Uuid::nil()).expect("a");
        let mut b = Params::new();
        b.set("website_id", Uuid::from_u128(7)).expect("b");
        assert!(a.merge(&b).is_err());

        let mut c = Params::new();
        c.set("website_id", Uuid::nil()).expect("c");
        assert!(a.merge(&c).is_ok());
    }

    #[test]
    fn template_slots_are_filled_once_and_missing_slots_fail() {
        let mut frag = SqlBuilder::new();
        frag.push("e.event_name = ").param("name", None);
        let template = Template::new(Metric::Dropoff, "SELECT 1 WHERE [[cohort]]", &["one"])
            .slot("cohort", frag.build());
        assert_eq!(
            template.render().expect("render").as_str(),
            "SELECT 1 WHERE e.event_name = {{name}}"
        );

        let missing = Template::new(Metric::Dropoff, "SELECT 1 WHERE [[cohort]]", &["one"]);
        assert!(matches!(missing.render(), Err(EngineError::Binding(_))));
    }

    #[test]
    fn malformed_markers_fail() {
        let params = Params::new();
        for raw in ["{{Bad}}", "{{a::money}}", "{{unterminated"] {
            let sql = SqlFragment(raw.to_string());
            assert!(bind(&sql, &params, &Numbered).is_err(), "{raw}");
        }
    }
}
