//! Opaque connection cursors and result shaping for connection fields.
//!
//! A cursor is the base64 form of `arrayconnection:<offset>`, where offset is
//! the zero-based position of an edge in the sorted, filtered list. Decoding a
//! cursor issued for position `n` resumes the next page at `n + 1`.

use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine;

use crate::error::{TranslateError, TranslateResult};
use crate::value::{Value, ValueMap};

const CURSOR_PREFIX: &str = "arrayconnection:";

/// Encodes a list position as a cursor.
pub fn encode_cursor(offset: u64) -> String {
    BASE64_ENGINE.encode(format!("{CURSOR_PREFIX}{offset}"))
}

/// Decodes a cursor back into the position it was issued for.
pub fn decode_cursor(cursor: &str) -> TranslateResult<u64> {
    let invalid = || TranslateError::InvalidCursor {
        cursor: cursor.to_owned(),
    };
    let bytes = BASE64_ENGINE.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    let digits = text.strip_prefix(CURSOR_PREFIX).ok_or_else(invalid)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse::<u64>().map_err(|_| invalid())
}

/// The slice of a sorted list requested by `first`/`after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageWindow {
    /// Index of the first edge returned.
    pub start: u64,
    /// Maximum number of edges returned; unbounded when `None`.
    pub first: Option<u64>,
}

impl PageWindow {
    /// Derives the window from raw connection arguments.
    pub fn from_arguments(first: Option<&Value>, after: Option<&Value>) -> TranslateResult<Self> {
        let first = match first {
            None | Some(Value::Null) => None,
            Some(Value::Int(n)) if *n >= 0 => Some(*n as u64),
            Some(other) => {
                return Err(TranslateError::invalid_argument(
                    "first",
                    format!("expected a non-negative integer, found {}", other.kind()),
                ))
            }
        };
        let start = match after {
            None | Some(Value::Null) => 0,
            Some(Value::String(cursor)) => decode_cursor(cursor)?.saturating_add(1),
            Some(other) => {
                return Err(TranslateError::invalid_argument(
                    "after",
                    format!("expected a cursor string, found {}", other.kind()),
                ))
            }
        };
        Ok(Self { start, first })
    }

    /// Exclusive end index, if bounded.
    pub fn end(&self) -> Option<u64> {
        self.first.map(|first| self.start.saturating_add(first))
    }
}

/// Turns a `{ edges, totalCount }` row into the public connection payload.
///
/// Each edge gains a `cursor`; `pageInfo` is derived from the window that
/// produced the statement, so both must come from the same arguments.
pub fn shape_connection(raw: &Value, window: &PageWindow) -> TranslateResult<Value> {
    let map = raw
        .as_map()
        .ok_or_else(|| TranslateError::invalid_argument("connection", "expected an object row"))?;
    let total = match map.get("totalCount") {
        Some(Value::Int(n)) if *n >= 0 => *n as u64,
        _ => {
            return Err(TranslateError::invalid_argument(
                "connection",
                "row is missing a non-negative totalCount",
            ))
        }
    };
    let raw_edges = match map.get("edges") {
        Some(Value::List(edges)) => edges.as_slice(),
        Some(Value::Null) | None => &[],
        Some(_) => {
            return Err(TranslateError::invalid_argument(
                "connection",
                "edges must be a list",
            ))
        }
    };

    let mut edges = Vec::with_capacity(raw_edges.len());
    for (index, edge) in raw_edges.iter().enumerate() {
        let mut shaped = edge.as_map().cloned().unwrap_or_default();
        shaped.insert(
            "cursor".into(),
            Value::String(encode_cursor(window.start + index as u64)),
        );
        edges.push(Value::Map(shaped));
    }

    let start_cursor = edges
        .first()
        .map(|_| Value::String(encode_cursor(window.start)))
        .unwrap_or(Value::Null);
    let end_cursor = match edges.len() {
        0 => Value::Null,
        len => Value::String(encode_cursor(window.start + len as u64 - 1)),
    };
    let mut page_info = ValueMap::new();
    page_info.insert("startCursor".into(), start_cursor);
    page_info.insert("endCursor".into(), end_cursor);
    page_info.insert(
        "hasNextPage".into(),
        Value::Bool(window.start + (edges.len() as u64) < total),
    );
    page_info.insert("hasPreviousPage".into(), Value::Bool(window.start > 0));

    let mut out = ValueMap::new();
    out.insert("edges".into(), Value::List(edges));
    out.insert("totalCount".into(), Value::Int(total as i64));
    out.insert("pageInfo".into(), Value::Map(page_info));
    Ok(Value::Map(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(titles: &[&str], total: i64) -> Value {
        let edges = titles
            .iter()
            .map(|title| {
                let mut node = ValueMap::new();
                node.insert("title".into(), Value::from(*title));
                let mut edge = ValueMap::new();
                edge.insert("node".into(), Value::Map(node));
                Value::Map(edge)
            })
            .collect();
        let mut map = ValueMap::new();
        map.insert("edges".into(), Value::List(edges));
        map.insert("totalCount".into(), Value::Int(total));
        Value::Map(map)
    }

    #[test]
    fn cursor_encodes_array_connection_offset() {
        assert_eq!(encode_cursor(0), "YXJyYXljb25uZWN0aW9uOjA=");
        assert_eq!(decode_cursor("YXJyYXljb25uZWN0aW9uOjA=").expect("decode"), 0);
    }

    #[test]
    fn malformed_cursors_are_rejected() {
        for bad in ["not base64!", "Zm9vOjE=", "YXJyYXljb25uZWN0aW9uOg=="] {
            let err = decode_cursor(bad).unwrap_err();
            assert_eq!(err.code(), "InvalidCursor", "cursor {bad}");
        }
    }

    #[test]
    fn after_resumes_past_the_cursor_position() {
        let after = Value::String(encode_cursor(4));
        let window = PageWindow::from_arguments(Some(&Value::Int(2)), Some(&after)).expect("window");
        assert_eq!(window, PageWindow { start: 5, first: Some(2) });
        assert_eq!(window.end(), Some(7));
    }

    #[test]
    fn negative_first_is_rejected() {
        let err = PageWindow::from_arguments(Some(&Value::Int(-1)), None).unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
    }

    #[test]
    fn shape_connection_computes_page_info() {
        let window = PageWindow { start: 2, first: Some(2) };
        let shaped = shape_connection(&row(&["c", "d"], 5), &window).expect("shape");
        let map = shaped.as_map().expect("map");
        let info = map["pageInfo"].as_map().expect("pageInfo");
        assert_eq!(info["hasNextPage"], Value::Bool(true));
        assert_eq!(info["hasPreviousPage"], Value::Bool(true));
        assert_eq!(info["startCursor"], Value::String(encode_cursor(2)));
        assert_eq!(info["endCursor"], Value::String(encode_cursor(3)));
        let edges = map["edges"].as_list().expect("edges");
        assert_eq!(
            edges[1].as_map().expect("edge")["cursor"],
            Value::String(encode_cursor(3))
        );
    }

    #[test]
    fn last_page_has_no_next_page() {
        let window = PageWindow { start: 3, first: Some(2) };
        let shaped = shape_connection(&row(&["d", "e"], 5), &window).expect("shape");
        let info = shaped.as_map().expect("map")["pageInfo"].clone();
        assert_eq!(info.as_map().expect("info")["hasNextPage"], Value::Bool(false));
    }

    #[test]
    fn empty_page_has_null_cursors() {
        let shaped = shape_connection(&row(&[], 0), &PageWindow::default()).expect("shape");
        let info = shaped.as_map().expect("map")["pageInfo"].clone();
        let info = info.as_map().expect("info");
        assert_eq!(info["startCursor"], Value::Null);
        assert_eq!(info["endCursor"], Value::Null);
        assert_eq!(info["hasNextPage"], Value::Bool(false));
    }
}
