//! Protocol events and the event-name registry.
//!
//! An event is an opaque protocol event name (normalized to uppercase) plus
//! a payload carrying the raw text, sender, and target. Payloads are emitted
//! by the transport and read-only to modules; every module and every fired
//! trigger receives its own clone so one callback's view can never be
//! corrupted by another's.

use dashmap::DashSet;

/// Well-known IRC event names modules commonly trigger on.
///
/// Any string is a valid event name; these constants only spare callers the
/// literals for the common cases.
pub mod events {
    pub const CONNECTED: &str = "CONNECTED";
    pub const DISCONNECTED: &str = "DISCONNECTED";
    pub const ACTION: &str = "ACTION";
    pub const INVITE: &str = "INVITE";
    pub const JOIN: &str = "JOIN";
    pub const KICK: &str = "KICK";
    pub const MODE: &str = "MODE";
    pub const NICK: &str = "NICK";
    pub const NOTICE: &str = "NOTICE";
    pub const PART: &str = "PART";
    pub const PRIVMSG: &str = "PRIVMSG";
    pub const QUIT: &str = "QUIT";
    pub const TOPIC: &str = "TOPIC";
}

/// Normalize an event name to its canonical uppercase form.
pub fn normalize(event: &str) -> String {
    event.to_ascii_uppercase()
}

/// An inbound protocol event as seen by modules.
///
/// `clone()` is the deep-copy boundary: the fan-out engine hands every
/// module, and every matched trigger, an independent copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Protocol event name (e.g. "PRIVMSG"). Normalized on dispatch.
    pub event: String,
    /// Raw message text.
    pub text: String,
    /// Sender identifier (nick).
    pub sender: String,
    /// Target identifier (channel or nick).
    pub target: String,
}

impl Payload {
    pub fn new(
        event: impl Into<String>,
        text: impl Into<String>,
        sender: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            event: normalize(&event.into()),
            text: text.into(),
            sender: sender.into(),
            target: target.into(),
        }
    }
}

/// Registry of event names that have at least one trigger somewhere.
///
/// Owned by the [`ModuleManager`](crate::manager::ModuleManager) and shared
/// with its modules at registration time; there is deliberately no
/// process-wide event list, so independent managers can coexist in one
/// process.
#[derive(Debug, Default)]
pub struct EventRegistry {
    names: DashSet<String>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event name. Returns `false` if it was already known.
    pub fn insert(&self, event: &str) -> bool {
        self.names.insert(normalize(event))
    }

    pub fn contains(&self, event: &str) -> bool {
        self.names.contains(&normalize(event))
    }

    /// Snapshot of all known event names, order not significant.
    pub fn names(&self) -> Vec<String> {
        self.names.iter().map(|e| e.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_normalizes_event_name() {
        let p = Payload::new("privmsg", "ping", "alice", "#test");
        assert_eq!(p.event, "PRIVMSG");
    }

    #[test]
    fn registry_dedupes_case_insensitively() {
        let reg = EventRegistry::new();
        assert!(reg.insert("privmsg"));
        assert!(!reg.insert("PRIVMSG"));
        assert!(reg.contains("PrivMsg"));
        assert_eq!(reg.names(), vec!["PRIVMSG".to_string()]);
    }
}
