//! Canonical subscriber identities.
//!
//! Directory records are normalized into [`Identity`] values keyed by their
//! lower-cased email. The remote server performs the same normalization, so
//! the lower-cased key is what membership snapshots are compared on, while
//! the originally-cased email is preserved for remote commands.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::directory::{Person, Student};

/// Normalize an email address into the comparison key used throughout the
/// reconciliation engine.
pub fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A canonical subscriber record.
///
/// Two identities are equal iff their emails are equal case-insensitively;
/// the display name does not participate in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Originally-cased email, issued verbatim to the remote server.
    pub email: String,
    /// Optional display name, formatted "Last, First".
    pub display_name: Option<String>,
}

impl Identity {
    /// Build an identity from a raw email. Returns `None` when the email is
    /// empty or whitespace; such records are silently dropped, not errors.
    pub fn new(email: impl Into<String>, display_name: Option<String>) -> Option<Self> {
        let email = email.into();
        if email.trim().is_empty() {
            return None;
        }
        Some(Self {
            email,
            display_name,
        })
    }

    /// The lower-cased comparison key.
    pub fn key(&self) -> String {
        email_key(&self.email)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Identity {}

impl std::hash::Hash for Identity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Format a display name as "Last, First" for uniform administrator search.
///
/// Returns `None` when both parts are blank; a missing display name is valid.
pub fn format_display_name(last_name: &str, first_name: &str) -> Option<String> {
    let last = last_name.trim();
    let first = first_name.trim();
    match (last.is_empty(), first.is_empty()) {
        (true, true) => None,
        (false, true) => Some(last.to_string()),
        (true, false) => Some(first.to_string()),
        (false, false) => Some(format!("{}, {}", last, first)),
    }
}

// ---------------------------------------------------------------------------
// IdentitySet
// ---------------------------------------------------------------------------

/// A set of identities keyed by lower-cased email.
///
/// Constructed fresh per reconciliation run and never persisted.
#[derive(Debug, Clone, Default)]
pub struct IdentitySet {
    entries: HashMap<String, Identity>,
}

impl IdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identity; a later record with the same key replaces the
    /// earlier one.
    pub fn insert(&mut self, identity: Identity) {
        self.entries.insert(identity.key(), identity);
    }

    /// Normalize person records into an identity set. Records without a
    /// usable email are dropped; display names are "Last, First".
    pub fn from_persons(persons: &[Person]) -> Self {
        let mut set = Self::new();
        for person in persons {
            let Some(email) = person.email.as_deref() else {
                continue;
            };
            let display_name = format_display_name(&person.last_name, &person.first_name);
            if let Some(identity) = Identity::new(email, display_name) {
                set.insert(identity);
            }
        }
        set
    }

    /// Normalize student records (no display name) into an identity set.
    pub fn from_students(students: &[Student]) -> Self {
        let mut set = Self::new();
        for student in students {
            let Some(email) = student.email.as_deref() else {
                continue;
            };
            if let Some(identity) = Identity::new(email, None) {
                set.insert(identity);
            }
        }
        set
    }

    pub fn get(&self, email: &str) -> Option<&Identity> {
        self.entries.get(&email_key(email))
    }

    pub fn contains(&self, email: &str) -> bool {
        self.entries.contains_key(&email_key(email))
    }

    /// The set of lower-cased email keys.
    pub fn emails(&self) -> HashSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(first: &str, last: &str, email: Option<&str>) -> Person {
        Person {
            id: 1,
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.map(|e| e.to_string()),
        }
    }

    #[test]
    fn test_case_insensitive_collapse() {
        let mut set = IdentitySet::new();
        set.insert(Identity::new("Ada@X.Org", None).unwrap());
        set.insert(Identity::new("ada@x.org", None).unwrap());
        assert_eq!(set.len(), 1);
        assert!(set.contains("ADA@x.org"));
    }

    #[test]
    fn test_original_case_retained() {
        let mut set = IdentitySet::new();
        set.insert(Identity::new("Ada.Lovelace@X.Org", None).unwrap());
        let identity = set.get("ada.lovelace@x.org").unwrap();
        assert_eq!(identity.email, "Ada.Lovelace@X.Org");
        assert_eq!(identity.key(), "ada.lovelace@x.org");
    }

    #[test]
    fn test_empty_email_dropped() {
        assert!(Identity::new("", None).is_none());
        assert!(Identity::new("   ", None).is_none());

        let persons = vec![
            person("Ada", "Lovelace", Some("ada@x.org")),
            person("No", "Email", None),
            person("Blank", "Email", Some("")),
        ];
        let set = IdentitySet::from_persons(&persons);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_display_name_formatting() {
        assert_eq!(
            format_display_name("Lovelace", "Ada").as_deref(),
            Some("Lovelace, Ada")
        );
        assert_eq!(format_display_name("Lovelace", "").as_deref(), Some("Lovelace"));
        assert_eq!(format_display_name("", "Ada").as_deref(), Some("Ada"));
        assert_eq!(format_display_name("", ""), None);
    }

    #[test]
    fn test_from_persons_formats_names() {
        let persons = vec![person("Ada", "Lovelace", Some("ada@x.org"))];
        let set = IdentitySet::from_persons(&persons);
        let identity = set.get("ada@x.org").unwrap();
        assert_eq!(identity.display_name.as_deref(), Some("Lovelace, Ada"));
    }

    #[test]
    fn test_students_have_no_display_name() {
        let students = vec![Student {
            id: 7,
            email: Some("s1@students.x.org".into()),
        }];
        let set = IdentitySet::from_students(&students);
        assert!(set.get("s1@students.x.org").unwrap().display_name.is_none());
    }

    #[test]
    fn test_identity_equality_ignores_display_name() {
        let a = Identity::new("a@x.org", Some("A".into())).unwrap();
        let b = Identity::new("A@X.ORG", None).unwrap();
        assert_eq!(a, b);
    }
}
