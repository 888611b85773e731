use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// In-process allow-list of live tokens, keyed `subject:token`. An entry is
/// written on sign with an expiry equal to the token lifetime; removing a
/// subject's entries force-logs-out every session of that user on the next
/// HTTP verification.
#[derive(Clone, Default)]
pub struct AllowList {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

fn entry_key(subject: Uuid, token: &str) -> String {
    format!("{subject}:{token}")
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subject: Uuid, token: &str, ttl: Duration) {
        let mut entries = self.entries.lock().expect("allow-list lock poisoned");
        let now = Instant::now();
        entries.retain(|_, expires| *expires > now);
        entries.insert(entry_key(subject, token), now + ttl);
    }

    pub fn contains(&self, subject: Uuid, token: &str) -> bool {
        let entries = self.entries.lock().expect("allow-list lock poisoned");
        entries
            .get(&entry_key(subject, token))
            .is_some_and(|expires| *expires > Instant::now())
    }

    /// Drop every entry for `subject`. Returns how many were removed.
    pub fn revoke_subject(&self, subject: Uuid) -> usize {
        let mut entries = self.entries.lock().expect("allow-list lock poisoned");
        let prefix = format!("{subject}:");
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&prefix));
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains_revoke() {
        let list = AllowList::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        list.insert(alice, "tok-a", Duration::from_secs(60));
        list.insert(bob, "tok-b", Duration::from_secs(60));

        assert!(list.contains(alice, "tok-a"));
        assert!(!list.contains(alice, "tok-b"));

        assert_eq!(list.revoke_subject(alice), 1);
        assert!(!list.contains(alice, "tok-a"));
        assert!(list.contains(bob, "tok-b"));
    }

    #[test]
    fn expired_entries_are_dead() {
        let list = AllowList::new();
        let user = Uuid::new_v4();
        list.insert(user, "tok", Duration::from_secs(0));
        assert!(!list.contains(user, "tok"));
    }
}
