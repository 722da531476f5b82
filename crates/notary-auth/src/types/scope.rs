//! Permission scopes.
//!
//! A [`Scope`] is the ordered list of permission names granted to a client on
//! behalf of a user. Names are de-duplicated on construction and containment
//! checks are set-membership tests, so nothing depends on the order in which
//! permissions were granted or requested.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Ordered, de-duplicated set of permission names.
///
/// # Examples
///
/// ```
/// use notary_auth::Scope;
///
/// let granted: Scope = "write read".parse().unwrap();
/// assert!(granted.has_subscope(&Scope::from_iter(["read"])));
/// assert!(!Scope::from_iter(["read"]).has_subscope(&granted));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Scope(Vec<String>);

impl Scope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds a permission, ignoring empty names and duplicates.
    ///
    /// Returns `true` if the permission was not present before.
    pub fn insert(&mut self, permission: impl Into<String>) -> bool {
        let permission = permission.into();
        if permission.is_empty() || self.contains(&permission) {
            return false;
        }
        self.0.push(permission);
        true
    }

    /// Returns `true` if the named permission is granted.
    #[must_use]
    pub fn contains(&self, permission: &str) -> bool {
        self.0.iter().any(|p| p == permission)
    }

    /// Returns `true` if every required permission is granted.
    ///
    /// An empty requirement is always satisfied.
    #[must_use]
    pub fn contains_all<I, S>(&self, required: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let granted: HashSet<&str> = self.0.iter().map(String::as_str).collect();
        required
            .into_iter()
            .all(|permission| granted.contains(permission.as_ref()))
    }

    /// Returns `true` if `sub` is covered by this scope.
    #[must_use]
    pub fn has_subscope(&self, sub: &Scope) -> bool {
        self.contains_all(sub.iter())
    }

    /// Iterates over the permission names in grant order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no permission is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the scope, returning the permission names.
    #[must_use]
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl<S: Into<String>> FromIterator<S> for Scope {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut scope = Scope::new();
        for permission in iter {
            scope.insert(permission);
        }
        scope
    }
}

impl<S: Into<String>> Extend<S> for Scope {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for permission in iter {
            self.insert(permission);
        }
    }
}

impl From<Vec<String>> for Scope {
    fn from(permissions: Vec<String>) -> Self {
        permissions.into_iter().collect()
    }
}

/// Parses the space-delimited OAuth 2.0 `scope` parameter form.
impl FromStr for Scope {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.split_whitespace().collect())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

// Deserialization goes through `FromIterator` so that stored or signed scopes
// are de-duplicated like every other construction path.
impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let permissions = Vec::<String>::deserialize(deserializer)?;
        Ok(permissions.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_subscope() {
        let read_write = Scope::from_iter(["read", "write"]);
        let read = Scope::from_iter(["read"]);

        assert!(read_write.has_subscope(&read));
        assert!(!read.has_subscope(&read_write));
    }

    #[test]
    fn test_containment_ignores_order() {
        let granted = Scope::from_iter(["write", "admin", "read"]);
        assert!(granted.contains_all(["read", "write"]));
        assert!(granted.contains_all(["admin", "read", "write"]));
        assert!(!granted.contains_all(["read", "delete"]));
    }

    #[test]
    fn test_empty_requirement_is_satisfied() {
        assert!(Scope::new().has_subscope(&Scope::new()));
        assert!(Scope::from_iter(["read"]).contains_all(Vec::<String>::new()));
    }

    #[test]
    fn test_duplicates_and_empty_names_are_dropped() {
        let scope = Scope::from_iter(["read", "", "write", "read"]);
        assert_eq!(scope.len(), 2);
        assert_eq!(scope.iter().collect::<Vec<_>>(), vec!["read", "write"]);
    }

    #[test]
    fn test_parse_and_display() {
        let scope: Scope = "  openid   profile email ".parse().unwrap();
        assert_eq!(scope.len(), 3);
        assert_eq!(scope.to_string(), "openid profile email");
    }

    #[test]
    fn test_serde_as_array() {
        let scope = Scope::from_iter(["read", "write"]);
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(json, r#"["read","write"]"#);

        let parsed: Scope = serde_json::from_str(r#"["b","a","b"]"#).unwrap();
        assert_eq!(parsed.into_inner(), vec!["b".to_string(), "a".to_string()]);
    }
}
