//! Named-group access list.
//!
//! A concurrency-safe mapping from group name to member nicks, shared by the
//! manager's administrative commands and any module that wants role checks.
//! Membership is a set: duplicates are rejected, insertion order is
//! irrelevant, and a nick may belong to any number of groups.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

/// Group membership table (group name -> set of member nicks).
#[derive(Debug, Default)]
pub struct AccessList {
    groups: DashMap<String, HashSet<String>>,
}

impl AccessList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table from configuration, lower-casing every nick.
    pub fn from_seed(seed: &HashMap<String, Vec<String>>) -> Self {
        let list = Self::new();
        for (group, members) in seed {
            for member in members {
                list.add(member, group);
            }
        }
        list
    }

    /// Add `member` to `group`, creating the group if needed.
    ///
    /// Returns `true` if inserted, `false` if already present.
    pub fn add(&self, member: &str, group: &str) -> bool {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(member.to_lowercase())
    }

    /// Remove `member` from `group`.
    ///
    /// Returns `true` if removed, `false` if the member or group is absent.
    pub fn remove(&self, member: &str, group: &str) -> bool {
        match self.groups.get_mut(group) {
            Some(mut members) => members.remove(&member.to_lowercase()),
            None => false,
        }
    }

    /// Whether `member` is in `group`.
    pub fn contains(&self, member: &str, group: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.contains(&member.to_lowercase()))
    }

    /// Snapshot of the requested groups and copies of their members.
    ///
    /// With no names given, every group is returned. Unknown group names are
    /// silently omitted.
    pub fn groups(&self, names: &[&str]) -> HashMap<String, Vec<String>> {
        if names.is_empty() {
            return self
                .groups
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
                .collect();
        }

        let mut snapshot = HashMap::new();
        for name in names {
            if let Some(members) = self.groups.get(*name) {
                snapshot.insert(name.to_string(), members.iter().cloned().collect());
            }
        }
        snapshot
    }

    /// The first group, in caller-supplied order, containing `member`.
    pub fn first_group_containing(&self, member: &str, groups: &[&str]) -> Option<String> {
        groups
            .iter()
            .find(|group| self.contains(member, group))
            .map(|group| group.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let list = AccessList::new();
        assert!(list.add("Alice", "admins"));
        assert!(!list.add("alice", "admins"));
        assert!(list.contains("ALICE", "admins"));
    }

    #[test]
    fn remove_reports_absence() {
        let list = AccessList::new();
        list.add("alice", "admins");
        assert!(list.remove("alice", "admins"));
        assert!(!list.remove("alice", "admins"));
        assert!(!list.remove("bob", "nogroup"));
    }

    #[test]
    fn snapshot_omits_unknown_groups() {
        let list = AccessList::new();
        list.add("alice", "admins");
        list.add("bob", "mods");

        let snap = list.groups(&["admins", "ghosts"]);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap["admins"], vec!["alice".to_string()]);

        let all = list.groups(&[]);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn first_group_respects_caller_order() {
        let list = AccessList::new();
        list.add("alice", "admins");
        list.add("alice", "mods");

        assert_eq!(
            list.first_group_containing("alice", &["mods", "admins"]),
            Some("mods".to_string())
        );
        assert_eq!(list.first_group_containing("carol", &["mods", "admins"]), None);
    }
}
