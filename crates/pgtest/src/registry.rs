//! Registry of per-test child databases.
//!
//! Names are append-only: once registered, a name stays in the registry for
//! its whole lifetime and is only ever flipped to [`ChildStatus::Shutdown`].
//! Keeping shut-down entries lets the final sweep skip them and lets callers
//! audit what ran.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::config::ConnectionProfile;
use crate::error::{ProvisionError, Result};

/// Lifecycle of a child database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Active,
    Shutdown,
}

/// One provisioned child database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDatabase {
    pub profile: ConnectionProfile,
    pub status: ChildStatus,
}

impl ChildDatabase {
    pub fn is_active(&self) -> bool {
        self.status == ChildStatus::Active
    }
}

/// Thread-safe map from test name to child database record.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    children: Mutex<HashMap<String, ChildDatabase>>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChildDatabase>> {
        // Entries are plain data; a panic elsewhere cannot leave one half-written.
        self.children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `name` as an active child. Fails if the name was ever used.
    pub fn add(&self, name: &str, profile: ConnectionProfile) -> Result<()> {
        match self.lock().entry(name.to_string()) {
            Entry::Occupied(_) => Err(ProvisionError::DuplicateName(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(ChildDatabase {
                    profile,
                    status: ChildStatus::Active,
                });
                Ok(())
            }
        }
    }

    /// Copy of the record for `name`.
    pub fn get(&self, name: &str) -> Result<ChildDatabase> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| ProvisionError::NotFound(name.to_string()))
    }

    /// Mark `name` as shut down. Repeating this is a no-op.
    pub fn mark_shutdown(&self, name: &str) -> Result<()> {
        match self.lock().get_mut(name) {
            Some(child) => {
                child.status = ChildStatus::Shutdown;
                Ok(())
            }
            None => Err(ProvisionError::NotFound(name.to_string())),
        }
    }

    /// Names of all children still marked active, sorted.
    pub fn active_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, child)| child.is_active())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every record, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, ChildDatabase)> {
        let mut all: Vec<_> = self
            .lock()
            .iter()
            .map(|(name, child)| (name.clone(), child.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn profile(db: &str) -> ConnectionProfile {
        ConnectionProfile {
            host: "localhost".to_string(),
            port: 5432,
            database: db.to_string(),
            user: "pgtest".to_string(),
            password: "secret".to_string(),
            ssl: false,
        }
    }

    #[test]
    fn test_add_and_get() {
        let registry = ChildRegistry::new();
        registry.add("alice", profile("alice")).unwrap();

        let child = registry.get("alice").unwrap();
        assert_eq!(child.status, ChildStatus::Active);
        assert_eq!(child.profile.database, "alice");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_never_overwrites() {
        let registry = ChildRegistry::new();
        registry.add("alice", profile("alice")).unwrap();

        let err = registry.add("alice", profile("other")).unwrap_err();
        assert!(matches!(err, ProvisionError::DuplicateName(ref n) if n == "alice"));
        assert_eq!(registry.get("alice").unwrap().profile.database, "alice");
    }

    #[test]
    fn test_names_are_not_recycled_after_shutdown() {
        let registry = ChildRegistry::new();
        registry.add("alice", profile("alice")).unwrap();
        registry.mark_shutdown("alice").unwrap();

        assert!(matches!(
            registry.add("alice", profile("alice")),
            Err(ProvisionError::DuplicateName(_))
        ));
        assert_eq!(registry.get("alice").unwrap().status, ChildStatus::Shutdown);
    }

    #[test]
    fn test_unknown_names() {
        let registry = ChildRegistry::new();
        assert!(matches!(registry.get("missing"), Err(ProvisionError::NotFound(_))));
        assert!(matches!(
            registry.mark_shutdown("missing"),
            Err(ProvisionError::NotFound(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mark_shutdown_is_idempotent() {
        let registry = ChildRegistry::new();
        registry.add("alice", profile("alice")).unwrap();
        registry.mark_shutdown("alice").unwrap();
        registry.mark_shutdown("alice").unwrap();
        assert_eq!(registry.get("alice").unwrap().status, ChildStatus::Shutdown);
    }

    #[test]
    fn test_active_names_and_snapshot() {
        let registry = ChildRegistry::new();
        for name in ["carol", "alice", "bob"] {
            registry.add(name, profile(name)).unwrap();
        }
        registry.mark_shutdown("bob").unwrap();

        assert_eq!(registry.active_names(), vec!["alice", "carol"]);

        let snapshot = registry.snapshot();
        let names: Vec<_> = snapshot.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert_eq!(snapshot[1].1.status, ChildStatus::Shutdown);
    }

    #[test]
    fn test_concurrent_adds_of_same_name_admit_one() {
        let registry = Arc::new(ChildRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.add("shared", profile("shared")).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(registry.len(), 1);
    }
}
