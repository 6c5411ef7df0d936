//! Trigger registry and dispatcher for administrative commands.
//!
//! A console holds literal triggers and pattern triggers as a tagged sum
//! resolved at registration time. Literals are case-folded once and matched
//! by table lookup, keeping the common command path off the regex engine;
//! patterns cover the free-form commands (`join <chan>`,
//! `access add <group> <nick>`) with named captures.
//!
//! [`Console::parse`] spawns every matched callback as its own task and
//! never waits for completion.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use regex::Regex;

use crate::error::Error;

/// A console callback. Receives the case-folded input line.
pub type Handler = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a console [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |line| Box::pin(f(line)))
}

/// A console trigger: an exact literal or a compiled pattern.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Matched by equality against the case-folded input.
    Literal(String),
    /// Matched by regex search against the case-folded input.
    Pattern(Regex),
}

impl Trigger {
    /// Normalized identity used for the uniqueness invariant: lower-cased
    /// text for literals, the pattern source for patterns.
    pub fn key(&self) -> String {
        match self {
            Self::Literal(text) => text.to_lowercase(),
            Self::Pattern(re) => re.as_str().to_string(),
        }
    }
}

impl From<&str> for Trigger {
    fn from(text: &str) -> Self {
        Self::Literal(text.to_string())
    }
}

impl From<String> for Trigger {
    fn from(text: String) -> Self {
        Self::Literal(text)
    }
}

impl From<Regex> for Trigger {
    fn from(re: Regex) -> Self {
        Self::Pattern(re)
    }
}

struct LiteralEntry {
    text: String,
    handler: Handler,
}

struct PatternEntry {
    pattern: Regex,
    handler: Handler,
}

/// Administrative command console.
#[derive(Default)]
pub struct Console {
    literals: RwLock<Vec<LiteralEntry>>,
    patterns: RwLock<Vec<PatternEntry>>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trigger. Fails with [`Error::AlreadyRegistered`] if an
    /// identical trigger (by normalized text) exists in its category; the
    /// earlier registration keeps its callback.
    pub fn register(&self, trigger: impl Into<Trigger>, handler: Handler) -> Result<(), Error> {
        match trigger.into() {
            Trigger::Literal(text) => {
                let text = text.to_lowercase();
                let mut literals = self.literals.write();
                if literals.iter().any(|e| e.text == text) {
                    return Err(Error::AlreadyRegistered(text));
                }
                literals.push(LiteralEntry { text, handler });
            }
            Trigger::Pattern(pattern) => {
                let mut patterns = self.patterns.write();
                if patterns.iter().any(|e| e.pattern.as_str() == pattern.as_str()) {
                    return Err(Error::AlreadyRegistered(pattern.as_str().to_string()));
                }
                patterns.push(PatternEntry { pattern, handler });
            }
        }
        Ok(())
    }

    /// Unregister a trigger by its normalized text. Fails with
    /// [`Error::NotRegistered`] if absent.
    pub fn unregister(&self, trigger: impl Into<Trigger>) -> Result<(), Error> {
        match trigger.into() {
            Trigger::Literal(text) => {
                let text = text.to_lowercase();
                let mut literals = self.literals.write();
                match literals.iter().position(|e| e.text == text) {
                    Some(i) => {
                        literals.remove(i);
                        Ok(())
                    }
                    None => Err(Error::NotRegistered(text)),
                }
            }
            Trigger::Pattern(pattern) => {
                let mut patterns = self.patterns.write();
                match patterns.iter().position(|e| e.pattern.as_str() == pattern.as_str()) {
                    Some(i) => {
                        patterns.remove(i);
                        Ok(())
                    }
                    None => Err(Error::NotRegistered(pattern.as_str().to_string())),
                }
            }
        }
    }

    /// Case-fold `input` and dispatch it: at most one literal fires (first
    /// registered wins), and every matching pattern fires. Each callback
    /// runs on its own task; this call returns without waiting.
    pub fn parse(&self, input: &str) {
        let folded = input.trim().to_lowercase();

        let mut matched: Vec<Handler> = Vec::new();
        {
            let literals = self.literals.read();
            if let Some(entry) = literals.iter().find(|e| e.text == folded) {
                matched.push(Arc::clone(&entry.handler));
            }
        }
        {
            let patterns = self.patterns.read();
            for entry in patterns.iter() {
                if entry.pattern.is_match(&folded) {
                    matched.push(Arc::clone(&entry.handler));
                }
            }
        }

        for handler in matched {
            let line = folded.clone();
            tokio::spawn(async move { handler(line).await });
        }
    }

    /// Snapshot of all registered trigger texts (literals and pattern
    /// sources), order not significant.
    pub fn list_triggers(&self) -> Vec<String> {
        let literals = self.literals.read();
        let patterns = self.patterns.read();
        literals
            .iter()
            .map(|e| e.text.clone())
            .chain(patterns.iter().map(|e| e.pattern.as_str().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.literals.read().len() + self.patterns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("literals", &self.literals.read().len())
            .field("patterns", &self.patterns.read().len())
            .finish()
    }
}

/// Extract named capture groups from a match of `re` against `input`.
pub(crate) fn named_groups(re: &Regex, input: &str) -> Option<HashMap<String, String>> {
    let caps = re.captures(input)?;
    let mut groups = HashMap::new();
    for name in re.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            groups.insert(name.to_string(), m.as_str().to_string());
        }
    }
    Some(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::{Duration, timeout};

    fn probe() -> (Handler, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let h = handler(move |line| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(line);
            }
        });
        (h, rx)
    }

    #[tokio::test]
    async fn duplicate_literal_keeps_first_callback() {
        let console = Console::new();
        let (first, mut first_rx) = probe();
        let (second, mut second_rx) = probe();

        console.register("Info", first).unwrap();
        let err = console.register("info", second).unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(_)));

        console.parse("INFO");
        let line = timeout(Duration::from_secs(1), first_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "info");
        // The rejected handler was dropped, closing its channel; it can
        // never be invoked.
        assert!(second_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn duplicate_pattern_rejected() {
        let console = Console::new();
        let (h1, _rx1) = probe();
        let (h2, _rx2) = probe();

        console
            .register(Regex::new(r"^join (?P<chan>\S+)$").unwrap(), h1)
            .unwrap();
        let err = console
            .register(Regex::new(r"^join (?P<chan>\S+)$").unwrap(), h2)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn at_most_one_literal_every_matching_pattern() {
        let console = Console::new();
        let (lit, mut lit_rx) = probe();
        let (pat_a, mut pat_a_rx) = probe();
        let (pat_b, mut pat_b_rx) = probe();

        console.register("logs", lit).unwrap();
        console.register(Regex::new(r"^logs$").unwrap(), pat_a).unwrap();
        console.register(Regex::new(r"^lo").unwrap(), pat_b).unwrap();

        console.parse("logs");
        assert!(timeout(Duration::from_secs(1), lit_rx.recv()).await.is_ok());
        assert!(timeout(Duration::from_secs(1), pat_a_rx.recv()).await.is_ok());
        assert!(timeout(Duration::from_secs(1), pat_b_rx.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn unregister_absent_trigger_errors() {
        let console = Console::new();
        let (h, _rx) = probe();
        console.register("logs", h).unwrap();
        console.unregister("LOGS").unwrap();
        assert!(matches!(
            console.unregister("logs"),
            Err(Error::NotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn list_triggers_snapshots_both_kinds() {
        let console = Console::new();
        let (h1, _rx1) = probe();
        let (h2, _rx2) = probe();
        console.register("info", h1).unwrap();
        console.register(Regex::new(r"^head").unwrap(), h2).unwrap();

        let mut triggers = console.list_triggers();
        triggers.sort();
        assert_eq!(triggers, vec!["^head".to_string(), "info".to_string()]);
    }

    #[tokio::test]
    async fn named_groups_extracts_captures() {
        let re = Regex::new(r"^access (?P<cmd>add|rem) (?P<group>\S+) (?P<nick>\S+)$").unwrap();
        let groups = named_groups(&re, "access add admins alice").unwrap();
        assert_eq!(groups["cmd"], "add");
        assert_eq!(groups["group"], "admins");
        assert_eq!(groups["nick"], "alice");
        assert!(named_groups(&re, "access list").is_none());
    }
}
