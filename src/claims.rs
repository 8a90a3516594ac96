//! Resolved caller identity and the placeholder paths that read from it.

use std::fmt;

use crate::error::TranslateResult;
use crate::value::{Value, ValueMap};

/// Already-verified identity data available to one translation.
///
/// An absent token is a normal state: every lookup against it yields
/// [`Value::Null`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims {
    jwt: Option<ValueMap>,
    context: ValueMap,
}

impl Claims {
    /// Claims for an unauthenticated caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Claims for a caller carrying a decoded token payload.
    pub fn authenticated(jwt: ValueMap) -> Self {
        Self {
            jwt: Some(jwt),
            context: ValueMap::new(),
        }
    }

    /// Builds authenticated claims from a decoded JSON payload.
    ///
    /// Non-object payloads are treated as an empty token.
    pub fn from_json(payload: serde_json::Value) -> TranslateResult<Self> {
        let jwt = match Value::from_json(payload)? {
            Value::Map(map) => map,
            _ => ValueMap::new(),
        };
        Ok(Self::authenticated(jwt))
    }

    /// Adds a static context entry readable through `$context.<key>`.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Returns `true` when a token payload is present.
    pub fn is_authenticated(&self) -> bool {
        self.jwt.is_some()
    }

    /// The token payload as a parameter value; null when unauthenticated.
    pub fn jwt_value(&self) -> Value {
        match &self.jwt {
            Some(map) => Value::Map(map.clone()),
            None => Value::Null,
        }
    }

    /// Looks up a dotted path inside the token.
    pub fn jwt_path(&self, path: &[String]) -> Value {
        match &self.jwt {
            Some(map) => lookup(map, path),
            None => Value::Null,
        }
    }

    /// Resolves a placeholder; missing entries resolve to null.
    pub fn resolve(&self, placeholder: &Placeholder) -> Value {
        match placeholder.source {
            ClaimSource::Jwt => self.jwt_path(&placeholder.path),
            ClaimSource::Context => lookup(&self.context, &placeholder.path),
        }
    }
}

fn lookup(map: &ValueMap, path: &[String]) -> Value {
    let Some((first, rest)) = path.split_first() else {
        return Value::Map(map.clone());
    };
    let mut current = match map.get(first) {
        Some(value) => value,
        None => return Value::Null,
    };
    for segment in rest {
        current = match current.as_map().and_then(|m| m.get(segment)) {
            Some(value) => value,
            None => return Value::Null,
        };
    }
    current.clone()
}

/// Where a placeholder reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimSource {
    /// Decoded token payload.
    Jwt,
    /// Static request context.
    Context,
}

/// A `$jwt.<path>` or `$context.<path>` reference inside a rule template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Root the path is resolved against.
    pub source: ClaimSource,
    /// Dotted path segments.
    pub path: Vec<String>,
}

impl Placeholder {
    /// Parses a template string; returns `None` for ordinary literals.
    pub fn parse(text: &str) -> Option<Self> {
        let (source, rest) = if let Some(rest) = text.strip_prefix("$jwt.") {
            (ClaimSource::Jwt, rest)
        } else if let Some(rest) = text.strip_prefix("$context.") {
            (ClaimSource::Context, rest)
        } else {
            return None;
        };
        let path: Vec<String> = rest.split('.').map(str::to_owned).collect();
        if path.iter().any(String::is_empty) {
            return None;
        }
        Some(Self { source, path })
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = match self.source {
            ClaimSource::Jwt => "$jwt",
            ClaimSource::Context => "$context",
        };
        write!(f, "{root}.{}", self.path.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Claims {
        let json = serde_json::json!({
            "sub": "user-1",
            "roles": ["admin"],
            "org": { "id": 7 }
        });
        Claims::from_json(json).expect("claims")
    }

    #[test]
    fn parses_placeholders() {
        let p = Placeholder::parse("$jwt.org.id").expect("placeholder");
        assert_eq!(p.source, ClaimSource::Jwt);
        assert_eq!(p.path, vec!["org", "id"]);
        assert_eq!(p.to_string(), "$jwt.org.id");
        assert!(Placeholder::parse("$jwt.").is_none());
        assert!(Placeholder::parse("plain").is_none());
    }

    #[test]
    fn resolves_nested_paths() {
        let claims = token();
        let p = Placeholder::parse("$jwt.org.id").expect("placeholder");
        assert_eq!(claims.resolve(&p), Value::Int(7));
        let missing = Placeholder::parse("$jwt.org.name").expect("placeholder");
        assert_eq!(claims.resolve(&missing), Value::Null);
    }

    #[test]
    fn anonymous_lookups_are_null() {
        let claims = Claims::anonymous().with_context("tenant", "acme");
        assert!(!claims.is_authenticated());
        assert_eq!(claims.jwt_value(), Value::Null);
        let sub = Placeholder::parse("$jwt.sub").expect("placeholder");
        assert_eq!(claims.resolve(&sub), Value::Null);
        let tenant = Placeholder::parse("$context.tenant").expect("placeholder");
        assert_eq!(claims.resolve(&tenant), Value::from("acme"));
    }
}
