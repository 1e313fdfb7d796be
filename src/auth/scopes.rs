use serde::{Deserialize, Serialize};
use std::fmt;

/// Scopes an administrator may grant to a client.
pub const KNOWN_SCOPES: [&str; 3] = ["read", "write", "delete"];

/// Granted when an authorization request names no scope.
pub const DEFAULT_SCOPE: &str = "read";

/// Default allowed set for administratively created clients.
pub const DEFAULT_CLIENT_SCOPES: [&str; 2] = ["read", "write"];

/// An ordered set of scope names. Insertion order is kept so that the
/// `scope` string echoed to clients matches what they asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_vec<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for scope in scopes {
            set.insert(scope.into());
        }
        set
    }

    /// Parses a space-delimited `scope` parameter. Absent or blank input
    /// yields the default scope.
    pub fn parse(scope: Option<&str>) -> Result<Self, String> {
        let raw = scope.unwrap_or("").trim();
        if raw.is_empty() {
            return Ok(Self::from_vec([DEFAULT_SCOPE]));
        }
        Self::from_string(raw)
    }

    pub fn from_string(scopes_str: &str) -> Result<Self, String> {
        let mut set = Self::new();
        for token in scopes_str.split_whitespace() {
            if !is_scope_token(token) {
                return Err(format!("Invalid scope: {}", token));
            }
            set.insert(token.to_string());
        }
        Ok(set)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let scopes: Vec<String> = serde_json::from_str(json)?;
        Ok(Self::from_vec(scopes))
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
        self.0.iter().all(|s| other.contains(s))
    }

    pub fn insert(&mut self, scope: String) {
        if !scope.is_empty() && !self.contains(&scope) {
            self.0.push(scope);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

// RFC 6749 section 3.3 scope-token characters.
fn is_scope_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b == 0x21 || (0x23..=0x5B).contains(&b) || (0x5D..=0x7E).contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_scope_defaults_to_read() {
        assert_eq!(ScopeSet::parse(None).unwrap().to_string(), "read");
        assert_eq!(ScopeSet::parse(Some("  ")).unwrap().to_string(), "read");
    }

    #[test]
    fn parse_keeps_order_and_drops_duplicates() {
        let scopes = ScopeSet::parse(Some("write read write")).unwrap();
        assert_eq!(scopes.to_string(), "write read");
        assert_eq!(scopes.len(), 2);
    }

    #[test]
    fn rejects_quotes_and_backslashes() {
        assert!(ScopeSet::from_string("read \"write\"").is_err());
        assert!(ScopeSet::from_string("read\\write").is_err());
    }

    #[test]
    fn subset_check() {
        let allowed = ScopeSet::from_vec(["read", "write"]);
        assert!(ScopeSet::from_vec(["read"]).is_subset_of(&allowed));
        assert!(!ScopeSet::from_vec(["read", "delete"]).is_subset_of(&allowed));
    }

    #[test]
    fn json_column_format() {
        let scopes = ScopeSet::from_vec(["read", "write"]);
        let json = scopes.to_json().unwrap();
        assert_eq!(json, r#"["read","write"]"#);
        assert_eq!(ScopeSet::from_json(&json).unwrap(), scopes);
    }
}
