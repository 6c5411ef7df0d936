//! Per-module allow/deny gate.
//!
//! Four sets — allow/deny crossed with user/channel — evaluated before any
//! trigger may fire. A `#` sigil on the target selects the channel
//! dimension. An empty allow set means "allow all" for that dimension; a
//! non-empty one means "allow only listed".

use std::collections::HashSet;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::error::Error;

/// Which dimension of the gate a target falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    User,
    Chan,
}

impl Scope {
    /// Channel targets carry a `#` sigil; everything else is a user.
    pub fn of(target: &str) -> Self {
        if target.starts_with('#') {
            Self::Chan
        } else {
            Self::User
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Chan => "chan",
        }
    }
}

/// Allow or deny side of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

impl Access {
    pub fn label(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

#[derive(Debug, Default)]
struct Sets {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

/// A live, read-locked view of one gate set.
///
/// Release is tied to scope: dropping the guard releases the read lock on
/// every exit path, so a caller can format or print the set without copying
/// and without any risk of starving writers.
pub type GateView<'a> = MappedRwLockReadGuard<'a, HashSet<String>>;

/// The allow/deny gate. Users and channels are guarded independently so a
/// channel-list writer never blocks a user-list reader.
#[derive(Debug, Default)]
pub struct Gate {
    users: RwLock<Sets>,
    chans: RwLock<Sets>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one side of the gate, lower-casing every entry. Duplicates in
    /// the seed are collapsed silently.
    pub fn seed(&self, access: Access, targets: &[String]) {
        for target in targets {
            let target = target.to_lowercase();
            if target.is_empty() {
                continue;
            }
            let mut sets = self.lock_for(&target).write();
            match access {
                Access::Allow => sets.allow.insert(target),
                Access::Deny => sets.deny.insert(target),
            };
        }
    }

    /// Add `target` to the allow set for its dimension.
    pub fn allow(&self, target: &str) -> Result<(), Error> {
        self.insert(Access::Allow, target)
    }

    /// Add `target` to the deny set for its dimension.
    pub fn deny(&self, target: &str) -> Result<(), Error> {
        self.insert(Access::Deny, target)
    }

    fn insert(&self, access: Access, target: &str) -> Result<(), Error> {
        let target = normalized(target)?;
        let mut sets = self.lock_for(&target).write();
        let set = match access {
            Access::Allow => &mut sets.allow,
            Access::Deny => &mut sets.deny,
        };
        if !set.insert(target.clone()) {
            return Err(Error::DuplicateEntry(target));
        }
        Ok(())
    }

    /// Remove `target` from the allow set for its dimension.
    pub fn remove_allowed(&self, target: &str) -> Result<(), Error> {
        self.remove(Access::Allow, target)
    }

    /// Remove `target` from the deny set for its dimension.
    pub fn remove_denied(&self, target: &str) -> Result<(), Error> {
        self.remove(Access::Deny, target)
    }

    fn remove(&self, access: Access, target: &str) -> Result<(), Error> {
        let target = normalized(target)?;
        let mut sets = self.lock_for(&target).write();
        let set = match access {
            Access::Allow => &mut sets.allow,
            Access::Deny => &mut sets.deny,
        };
        if !set.remove(&target) {
            return Err(Error::NotFound(target));
        }
        Ok(())
    }

    /// Whether `target` is in the allow set for its dimension.
    pub fn is_allowed(&self, target: &str) -> bool {
        let Ok(target) = normalized(target) else {
            return false;
        };
        self.lock_for(&target).read().allow.contains(&target)
    }

    /// Whether `target` is in the deny set for its dimension.
    pub fn is_denied(&self, target: &str) -> bool {
        let Ok(target) = normalized(target) else {
            return false;
        };
        self.lock_for(&target).read().deny.contains(&target)
    }

    /// Empty one of the four sets. Clearing an empty set is a no-op.
    pub fn clear(&self, access: Access, scope: Scope) {
        let mut sets = self.lock_of(scope).write();
        match access {
            Access::Allow => sets.allow.clear(),
            Access::Deny => sets.deny.clear(),
        }
    }

    pub fn len(&self, access: Access, scope: Scope) -> usize {
        let sets = self.lock_of(scope).read();
        match access {
            Access::Allow => sets.allow.len(),
            Access::Deny => sets.deny.len(),
        }
    }

    pub fn is_empty(&self, access: Access, scope: Scope) -> bool {
        self.len(access, scope) == 0
    }

    /// Borrowed read of one set. The returned guard holds the read lock
    /// until dropped.
    pub fn read(&self, access: Access, scope: Scope) -> GateView<'_> {
        RwLockReadGuard::map(self.lock_of(scope).read(), |sets| match access {
            Access::Allow => &sets.allow,
            Access::Deny => &sets.deny,
        })
    }

    /// Owned copy of one set, for callers that outlive any sensible lock
    /// scope.
    pub fn entries(&self, access: Access, scope: Scope) -> Vec<String> {
        self.read(access, scope).iter().cloned().collect()
    }

    /// Evaluate the gate for an inbound event. Rejection order: sender
    /// denied, user-allow non-empty without sender, target denied,
    /// chan-allow non-empty without target.
    pub fn accepts(&self, sender: &str, target: &str) -> bool {
        if self.is_denied(sender) {
            return false;
        }
        if !self.is_empty(Access::Allow, Scope::User) && !self.is_allowed(sender) {
            return false;
        }
        if self.is_denied(target) {
            return false;
        }
        if !self.is_empty(Access::Allow, Scope::Chan) && !self.is_allowed(target) {
            return false;
        }
        true
    }

    fn lock_for(&self, target: &str) -> &RwLock<Sets> {
        self.lock_of(Scope::of(target))
    }

    fn lock_of(&self, scope: Scope) -> &RwLock<Sets> {
        match scope {
            Scope::User => &self.users,
            Scope::Chan => &self.chans,
        }
    }
}

fn normalized(target: &str) -> Result<String, Error> {
    if target.is_empty() {
        return Err(Error::EmptyTarget);
    }
    Ok(target.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigil_selects_dimension() {
        let gate = Gate::new();
        gate.allow("alice").unwrap();
        gate.allow("#lobby").unwrap();

        assert_eq!(gate.len(Access::Allow, Scope::User), 1);
        assert_eq!(gate.len(Access::Allow, Scope::Chan), 1);
        assert!(gate.is_allowed("Alice"));
        assert!(gate.is_allowed("#LOBBY"));
    }

    #[test]
    fn duplicate_and_missing_entries_error() {
        let gate = Gate::new();
        gate.deny("mallory").unwrap();
        assert!(matches!(gate.deny("Mallory"), Err(Error::DuplicateEntry(_))));
        assert!(matches!(gate.allow(""), Err(Error::EmptyTarget)));
        assert!(matches!(gate.remove_allowed("nobody"), Err(Error::NotFound(_))));
    }

    #[test]
    fn empty_allow_set_allows_all() {
        let gate = Gate::new();
        assert!(gate.accepts("anyone", "#anywhere"));

        gate.allow("alice").unwrap();
        assert!(gate.accepts("alice", "#anywhere"));
        assert!(!gate.accepts("bob", "#anywhere"));
    }

    #[test]
    fn deny_beats_everything() {
        let gate = Gate::new();
        gate.deny("mallory").unwrap();
        gate.deny("#spam").unwrap();

        assert!(!gate.accepts("mallory", "#lobby"));
        assert!(!gate.accepts("alice", "#spam"));
        assert!(gate.accepts("alice", "#lobby"));
    }

    #[test]
    fn clear_is_idempotent() {
        let gate = Gate::new();
        gate.allow("alice").unwrap();
        gate.clear(Access::Allow, Scope::User);
        gate.clear(Access::Allow, Scope::User);
        assert!(gate.is_empty(Access::Allow, Scope::User));
    }

    #[test]
    fn borrowed_read_releases_on_drop() {
        let gate = Gate::new();
        gate.allow("alice").unwrap();
        {
            let view = gate.read(Access::Allow, Scope::User);
            assert!(view.contains("alice"));
        }
        // Guard dropped; writers proceed.
        gate.allow("bob").unwrap();
    }
}
