//! Common types used across CLI modules

use serde_json::Value;
use uuid::Uuid;

/// Identifier that can be either a full UUID or an unambiguous prefix
#[derive(Debug, Clone, PartialEq)]
pub enum IdOrPrefix {
    /// Full UUID
    Full(Uuid),
    /// Prefix that should uniquely identify a resource
    Prefix(String),
}

impl IdOrPrefix {
    /// Parse a string into an IdOrPrefix
    ///
    /// Attempts to parse as a full UUID first, otherwise treats as a prefix
    pub fn parse(input: &str) -> Self {
        match Uuid::parse_str(input) {
            Ok(uuid) => IdOrPrefix::Full(uuid),
            Err(_) => IdOrPrefix::Prefix(input.trim().to_lowercase()),
        }
    }

    /// Get the UUID if this is a full ID
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    /// Whether `id` is the identified resource
    pub fn matches(&self, id: Uuid) -> bool {
        match self {
            IdOrPrefix::Full(uuid) => *uuid == id,
            IdOrPrefix::Prefix(prefix) => id.to_string().starts_with(prefix.as_str()),
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

/// Parse a single key=value pair
///
/// The value is read as JSON when it parses (numbers, booleans, objects),
/// otherwise kept as a string.
pub fn parse_param(s: &str) -> anyhow::Result<(String, Value)> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    if key.trim().is_empty() {
        anyhow::bail!("invalid KEY=value: empty key in `{}`", s);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_and_prefix() {
        let id = Uuid::new_v4();
        assert_eq!(IdOrPrefix::parse(&id.to_string()), IdOrPrefix::Full(id));
        assert_eq!(
            IdOrPrefix::parse("AB12"),
            IdOrPrefix::Prefix("ab12".to_string())
        );
    }

    #[test]
    fn test_prefix_matching() {
        let id = Uuid::parse_str("3f2b8c1e-0000-4000-8000-000000000000").unwrap();
        assert!(IdOrPrefix::parse("3f2b").matches(id));
        assert!(!IdOrPrefix::parse("3f2c").matches(id));
        assert!(IdOrPrefix::Full(id).matches(id));
    }

    #[test]
    fn test_parse_param_values() {
        assert_eq!(parse_param("sigma=4.5").unwrap(), ("sigma".to_string(), json!(4.5)));
        assert_eq!(parse_param("invert=true").unwrap().1, json!(true));
        assert_eq!(parse_param("method=otsu").unwrap().1, json!("otsu"));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=1").is_err());
    }
}
