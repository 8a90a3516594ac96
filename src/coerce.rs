//! Scalar coercion helpers.
//!
//! Literals are validated against their field's scalar type before they are
//! hoisted into parameters; temporal, spatial and big-integer parameters are
//! wrapped in the matching Cypher constructor when referenced.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::cypher::{Expr, Var};
use crate::error::{TranslateError, TranslateResult};
use crate::schema::{ScalarField, ScalarType};
use crate::value::Value;

/// Cypher function that turns a parameter into a value of `ty`, if any.
pub fn constructor(ty: &ScalarType) -> Option<&'static str> {
    Some(match ty {
        ScalarType::DateTime => "datetime",
        ScalarType::Date => "date",
        ScalarType::Time => "time",
        ScalarType::LocalDateTime => "localdatetime",
        ScalarType::LocalTime => "localtime",
        ScalarType::Duration => "duration",
        ScalarType::Point | ScalarType::CartesianPoint => "point",
        ScalarType::BigInt => "toInteger",
        _ => return None,
    })
}

/// Wraps a scalar parameter reference in its constructor.
pub fn wrap_scalar(ty: &ScalarType, expr: Expr) -> Expr {
    match constructor(ty) {
        Some(name) => Expr::call(name, vec![expr]),
        None => expr,
    }
}

/// Wraps a list parameter element-wise, using `element` as the loop variable.
pub fn wrap_list(ty: &ScalarType, expr: Expr, element: Var) -> Expr {
    match constructor(ty) {
        Some(name) => Expr::Comprehension {
            list: Box::new(expr),
            map: Some(Box::new(Expr::call(name, vec![element.expr()]))),
            var: element,
            predicate: None,
        },
        None => expr,
    }
}

fn mismatch(ty: &ScalarType, value: &Value) -> TranslateError {
    TranslateError::InvalidLiteral {
        expected: scalar_label(ty),
        found: match value {
            Value::String(s) => format!("\"{s}\""),
            other => other.kind().to_owned(),
        },
    }
}

fn scalar_label(ty: &ScalarType) -> &'static str {
    match ty {
        ScalarType::Id => "ID",
        ScalarType::String => "String",
        ScalarType::Int => "Int",
        ScalarType::Float => "Float",
        ScalarType::BigInt => "BigInt",
        ScalarType::Boolean => "Boolean",
        ScalarType::DateTime => "DateTime",
        ScalarType::Date => "Date",
        ScalarType::Time => "Time",
        ScalarType::LocalDateTime => "LocalDateTime",
        ScalarType::LocalTime => "LocalTime",
        ScalarType::Duration => "Duration",
        ScalarType::Point => "Point",
        ScalarType::CartesianPoint => "CartesianPoint",
        ScalarType::Enum(_) => "enum",
    }
}

/// Validates a literal for a field, element-wise for list fields.
pub fn coerce_field(field: &ScalarField, value: Value) -> TranslateResult<Value> {
    match (field.list, value) {
        (_, Value::Null) => Ok(Value::Null),
        (true, Value::List(items)) => items
            .into_iter()
            .map(|item| coerce_literal(&field.ty, item))
            .collect::<TranslateResult<Vec<_>>>()
            .map(Value::List),
        (true, other) => Err(TranslateError::InvalidLiteral {
            expected: "list",
            found: other.kind().to_owned(),
        }),
        (false, value) => coerce_literal(&field.ty, value),
    }
}

/// Validates a single literal against `ty`, normalising where the wire form differs.
pub fn coerce_literal(ty: &ScalarType, value: Value) -> TranslateResult<Value> {
    let ok = match (ty, &value) {
        (_, Value::Null) => true,
        (ScalarType::Id, Value::Int(id)) => return Ok(Value::String(id.to_string())),
        (ScalarType::Id | ScalarType::String | ScalarType::Enum(_), Value::String(_)) => true,
        (ScalarType::Int, Value::Int(_)) => true,
        (ScalarType::Float, Value::Int(_) | Value::Float(_)) => true,
        (ScalarType::BigInt, Value::Int(_)) => true,
        (ScalarType::BigInt, Value::String(s)) => is_integer_text(s),
        (ScalarType::Boolean, Value::Bool(_)) => true,
        (ScalarType::DateTime, Value::String(s)) => OffsetDateTime::parse(s, &Rfc3339).is_ok(),
        (ScalarType::Date, Value::String(s)) => {
            Date::parse(s, format_description!("[year]-[month]-[day]")).is_ok()
        }
        (ScalarType::LocalDateTime, Value::String(s)) => PrimitiveDateTime::parse(
            s,
            format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
            ),
        )
        .is_ok(),
        (ScalarType::LocalTime, Value::String(s)) => parse_local_time(s),
        (ScalarType::Time, Value::String(s)) => parse_zoned_time(s),
        (ScalarType::Duration, Value::String(s)) => is_iso_duration(s),
        (ScalarType::Point, Value::Map(map)) => {
            has_numbers(map, &["longitude", "latitude"]) && optional_number(map, "height")
        }
        (ScalarType::CartesianPoint, Value::Map(map)) => {
            has_numbers(map, &["x", "y"]) && optional_number(map, "z")
        }
        _ => false,
    };
    if ok {
        Ok(value)
    } else {
        Err(mismatch(ty, &value))
    }
}

fn is_integer_text(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn parse_local_time(text: &str) -> bool {
    Time::parse(
        text,
        format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .is_ok()
        || Time::parse(text, format_description!("[hour]:[minute]")).is_ok()
}

fn parse_zoned_time(text: &str) -> bool {
    if let Some(local) = text.strip_suffix('Z') {
        return parse_local_time(local);
    }
    match text.rfind(['+', '-']) {
        Some(idx) if idx > 0 => {
            let (local, offset) = text.split_at(idx);
            let offset = &offset[1..];
            let valid_offset = offset.len() == 5
                && offset.as_bytes()[2] == b':'
                && offset
                    .bytes()
                    .enumerate()
                    .all(|(i, b)| i == 2 || b.is_ascii_digit());
            valid_offset && parse_local_time(local)
        }
        _ => parse_local_time(text),
    }
}

/// `P[nY][nM][nW][nD][T[nH][nM][n[.n]S]]`, at least one component.
fn is_iso_duration(text: &str) -> bool {
    let Some(body) = text.strip_prefix('P') else {
        return false;
    };
    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return false;
            }
            (date, Some(time))
        }
        None => (body, None),
    };
    let date_ok = components(date_part, &['Y', 'M', 'W', 'D'], false);
    let time_ok = time_part
        .map(|t| components(t, &['H', 'M', 'S'], true))
        .unwrap_or(Some(0));
    match (date_ok, time_ok) {
        (Some(d), Some(t)) => d + t > 0,
        _ => false,
    }
}

fn components(text: &str, designators: &[char], fractional_seconds: bool) -> Option<usize> {
    let mut count = 0;
    let mut number = String::new();
    let mut next = 0;
    for ch in text.chars() {
        if ch.is_ascii_digit() || (fractional_seconds && ch == '.') {
            number.push(ch);
            continue;
        }
        let position = designators[next..].iter().position(|d| *d == ch)? + next;
        if number.is_empty() || (number.contains('.') && ch != 'S') {
            return None;
        }
        number.clear();
        next = position + 1;
        count += 1;
    }
    number.is_empty().then_some(count)
}

fn has_numbers(map: &crate::value::ValueMap, keys: &[&str]) -> bool {
    keys.iter()
        .all(|key| map.get(*key).and_then(Value::as_f64).is_some())
}

fn optional_number(map: &crate::value::ValueMap, key: &str) -> bool {
    match map.get(key) {
        None | Some(Value::Null) => true,
        Some(value) => value.as_f64().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueMap;

    #[test]
    fn temporal_literals_are_validated() {
        assert!(coerce_literal(&ScalarType::DateTime, "2024-02-03T10:00:00Z".into()).is_ok());
        assert!(coerce_literal(&ScalarType::DateTime, "yesterday".into()).is_err());
        assert!(coerce_literal(&ScalarType::Date, "2024-02-30".into()).is_err());
        assert!(coerce_literal(&ScalarType::Date, "2024-02-29".into()).is_ok());
        assert!(coerce_literal(&ScalarType::LocalTime, "12:30".into()).is_ok());
        assert!(coerce_literal(&ScalarType::Time, "12:30:00+02:00".into()).is_ok());
        assert!(coerce_literal(&ScalarType::LocalDateTime, "2024-01-01T00:00:00.250".into()).is_ok());
    }

    #[test]
    fn durations_follow_iso_8601() {
        assert!(is_iso_duration("P1Y2M3DT4H5M6.5S"));
        assert!(is_iso_duration("PT15M"));
        assert!(is_iso_duration("P2W"));
        assert!(!is_iso_duration("P"));
        assert!(!is_iso_duration("PT"));
        assert!(!is_iso_duration("P1D2Y"));
        assert!(!is_iso_duration("1D"));
    }

    #[test]
    fn ids_accept_integers_as_strings() {
        assert_eq!(
            coerce_literal(&ScalarType::Id, Value::Int(7)).expect("id"),
            Value::String("7".into())
        );
        let err = coerce_literal(&ScalarType::Int, "7".into()).unwrap_err();
        assert_eq!(err.code(), "InvalidLiteral");
    }

    #[test]
    fn points_need_coordinates() {
        let mut map = ValueMap::new();
        map.insert("longitude".into(), Value::Float(1.5));
        map.insert("latitude".into(), Value::Int(2));
        assert!(coerce_literal(&ScalarType::Point, Value::Map(map.clone())).is_ok());
        map.remove("latitude");
        assert!(coerce_literal(&ScalarType::Point, Value::Map(map)).is_err());
    }

    #[test]
    fn wrappers_match_scalar_types() {
        assert_eq!(
            crate::cypher::render_expr(&wrap_scalar(&ScalarType::Date, Expr::param("param0"))),
            "date($param0)"
        );
        assert_eq!(
            crate::cypher::render_expr(&wrap_list(
                &ScalarType::DateTime,
                Expr::param("param1"),
                Var::new("var2")
            )),
            "[var2 IN $param1 | datetime(var2)]"
        );
        assert_eq!(wrap_scalar(&ScalarType::String, Expr::param("p")), Expr::param("p"));
    }
}
