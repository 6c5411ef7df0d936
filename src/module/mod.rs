//! Modules: the unit of registration, dispatch, and lifecycle.
//!
//! A module owns a [`Console`] for its command namespace, an allow/deny
//! [`Gate`], a [`Logger`], and two protocol-event trigger registries
//! (literal-keyed and pattern-keyed). Lifecycle:
//! constructed -> `pre_start` -> `start` (running) -> `exit` / `force_exit`.
//!
//! [`Module::handle`] is the hot path: normalize the event name, evaluate
//! the gate, then fire every matching trigger on its own task with its own
//! copy of the payload.

mod commands;
pub mod console;
pub mod gate;

pub use console::{Console, Handler as ConsoleHandler, Trigger, handler as console_handler};
pub use gate::{Access, Gate, GateView, Scope};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashSet;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use regex::Regex;

use crate::config::{ConfigError, ModuleConfig};
use crate::error::Error;
use crate::event::{EventRegistry, Payload, normalize};
use crate::logger::{Logger, Priority};
use crate::transport::Transport;

/// A protocol-event callback. Receives its own copy of the payload.
pub type EventHandler = Arc<dyn Fn(Payload) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`].
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

/// A lifecycle hook (pre-connect, connected, disconnect). Hook errors are
/// always logged to the owning module's logger before being surfaced.
pub type Hook = Arc<dyn Fn() -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// Wrap an async closure as a lifecycle [`Hook`].
pub fn hook<F, Fut>(f: F) -> Hook
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Supplier for the free-form part of the `info` command output.
pub type DescribeFn = Arc<dyn Fn() -> String + Send + Sync>;

struct PatternHook {
    pattern: Regex,
    handler: EventHandler,
}

#[derive(Default)]
struct Hooks {
    pre_connect: Option<Hook>,
    connected: Option<Hook>,
    disconnect: Option<Hook>,
    describe: Option<DescribeFn>,
}

/// A registered bot module.
pub struct Module {
    name: String,
    description: RwLock<String>,
    log_dir: RwLock<PathBuf>,
    enabled: AtomicBool,
    running: AtomicBool,

    gate: Gate,
    console: Console,
    logger: Logger,

    // Literal triggers keyed by (EVENT, lower-cased text); pattern triggers
    // keyed by EVENT.
    string_triggers: RwLock<HashMap<(String, String), EventHandler>>,
    pattern_triggers: RwLock<HashMap<String, Vec<PatternHook>>>,

    // Event names this module triggers on, merged into the manager's
    // registry at bind time.
    events: DashSet<String>,
    registry: RwLock<Option<Arc<EventRegistry>>>,

    transport: RwLock<Option<Arc<dyn Transport>>>,
    hooks: RwLock<Hooks>,
}

impl Module {
    /// Build a module from its configuration block. The name is lower-cased
    /// and immutable afterwards; gate seeds are lower-cased. Base console
    /// commands (`info`, `allow`, `logs`, ...) are registered here.
    pub fn new(config: ModuleConfig) -> Result<Arc<Self>, Error> {
        if config.name.is_empty() {
            return Err(ConfigError::Missing("module.name").into());
        }
        if config.description.is_empty() {
            return Err(ConfigError::Missing("module.description").into());
        }

        let gate = Gate::new();
        gate.seed(Access::Allow, &config.allow_user);
        gate.seed(Access::Deny, &config.deny_user);
        gate.seed(Access::Allow, &config.allow_chan);
        gate.seed(Access::Deny, &config.deny_chan);

        let module = Arc::new(Self {
            name: config.name.to_lowercase(),
            description: RwLock::new(config.description),
            log_dir: RwLock::new(config.log_dir.unwrap_or_else(|| PathBuf::from("./logs"))),
            enabled: AtomicBool::new(config.enabled),
            running: AtomicBool::new(false),
            gate,
            console: Console::new(),
            logger: Logger::new(Priority::Info),
            string_triggers: RwLock::new(HashMap::new()),
            pattern_triggers: RwLock::new(HashMap::new()),
            events: DashSet::new(),
            registry: RwLock::new(None),
            transport: RwLock::new(None),
            hooks: RwLock::new(Hooks::default()),
        });
        commands::register_base(&module);

        Ok(module)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> String {
        self.description.read().clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.write() = description.into();
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.read().clone()
    }

    /// Takes effect on the next `pre_start`.
    pub fn set_log_dir(&self, dir: impl Into<PathBuf>) {
        *self.log_dir.write() = dir.into();
    }

    fn log_path(&self) -> PathBuf {
        self.log_dir.read().join(format!("{}.log", self.name))
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The transport this module is bound to, if registered with a manager.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.transport.read().is_some()
    }

    /// Called before the transport connects.
    pub fn set_pre_connect(&self, hook: Hook) {
        self.hooks.write().pre_connect = Some(hook);
    }

    /// Called after the transport connects.
    pub fn set_connected(&self, hook: Hook) {
        self.hooks.write().connected = Some(hook);
    }

    /// Called when the module exits.
    pub fn set_disconnect(&self, hook: Hook) {
        self.hooks.write().disconnect = Some(hook);
    }

    /// Supplies the free-form section of the `info` command output.
    pub fn set_describe(&self, describe: DescribeFn) {
        self.hooks.write().describe = Some(describe);
    }

    /// Attach this module to a manager's transport and event registry.
    /// Fails with [`Error::AlreadyBound`] if already attached.
    pub(crate) fn bind(
        &self,
        transport: Arc<dyn Transport>,
        registry: Arc<EventRegistry>,
    ) -> Result<(), Error> {
        let mut slot = self.transport.write();
        if slot.is_some() {
            return Err(Error::AlreadyBound);
        }
        *slot = Some(transport);
        for event in self.events.iter() {
            registry.insert(&event);
        }
        *self.registry.write() = Some(registry);
        Ok(())
    }

    /// Register a protocol-event trigger. Literal text is lower-cased and
    /// keyed together with the event; patterns are keyed by event alone and
    /// matched against the raw text. Fails with
    /// [`Error::AlreadyRegistered`] when the normalized trigger already
    /// exists in its category for that event.
    pub fn register_trigger(
        &self,
        event: &str,
        trigger: impl Into<Trigger>,
        handler: EventHandler,
    ) -> Result<(), Error> {
        let event = normalize(event);

        match trigger.into() {
            Trigger::Literal(text) => {
                let key = (event.clone(), text.to_lowercase());
                let mut triggers = self.string_triggers.write();
                if triggers.contains_key(&key) {
                    return Err(Error::AlreadyRegistered(format!("{}/{}", key.0, key.1)));
                }
                triggers.insert(key, handler);
            }
            Trigger::Pattern(pattern) => {
                let mut triggers = self.pattern_triggers.write();
                let hooks = triggers.entry(event.clone()).or_default();
                if hooks.iter().any(|h| h.pattern.as_str() == pattern.as_str()) {
                    return Err(Error::AlreadyRegistered(format!(
                        "{}/{}",
                        event,
                        pattern.as_str()
                    )));
                }
                hooks.push(PatternHook { pattern, handler });
            }
        }

        self.events.insert(event.clone());
        if let Some(registry) = self.registry.read().as_ref() {
            registry.insert(&event);
        }
        Ok(())
    }

    /// Event names this module has triggers for.
    pub fn events(&self) -> Vec<String> {
        self.events.iter().map(|e| e.clone()).collect()
    }

    /// Formatted list of registered protocol-event triggers.
    pub fn triggers(&self) -> Vec<String> {
        let strings = self.string_triggers.read();
        let patterns = self.pattern_triggers.read();

        let mut out = Vec::with_capacity(strings.len() + patterns.len());
        for (event, text) in strings.keys() {
            out.push(format!("[{event:<12}] {text}"));
        }
        for (event, hooks) in patterns.iter() {
            for hook in hooks {
                out.push(format!("[{event:<12}] {}", hook.pattern.as_str()));
            }
        }
        out
    }

    /// Create the logger if absent and run the pre-connect hook. A hook
    /// error is logged and propagated, aborting startup for this module.
    pub async fn pre_start(&self) -> Result<(), Error> {
        if !self.logger.is_running() {
            if let Err(e) = self.logger.start(&self.log_path()).await {
                tracing::error!(
                    target: "botmux",
                    module = %self.name,
                    error = %e,
                    "failed to create log file"
                );
                return Err(e);
            }
        }

        let hook = self.hooks.read().pre_connect.clone();
        if let Some(hook) = hook {
            if let Err(e) = hook().await {
                self.logger.error(format!("pre-connect hook failed: {e}"));
                return Err(e);
            }
        }
        Ok(())
    }

    /// Mark the module running and invoke the connected hook. Fails with
    /// [`Error::AlreadyRunning`] on a double start without an intervening
    /// exit.
    pub async fn start(&self) -> Result<(), Error> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning(self.name.clone()));
        }

        self.logger.start(&self.log_path()).await?;

        let hook = self.hooks.read().connected.clone();
        if let Some(hook) = hook {
            if let Err(e) = hook().await {
                self.logger.error(format!("connected hook failed: {e}"));
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run the disconnect hook (error logged, non-fatal), drain and stop
    /// the logger, flush and close the log file. Strict: returns on the
    /// first cleanup failure.
    pub async fn exit(&self) -> Result<(), Error> {
        if !self.is_running() {
            return Err(Error::NotRunning(self.name.clone()));
        }

        let hook = self.hooks.read().disconnect.clone();
        if let Some(hook) = hook {
            if let Err(e) = hook().await {
                self.logger.error(format!("disconnect hook failed: {e}"));
            }
        }

        // The drain completes before the file is flushed and closed, so no
        // trailing lines are lost.
        self.logger.exit().await?;
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    /// Best-effort exit: every failure is collected instead of aborting.
    pub async fn force_exit(&self) -> Vec<Error> {
        let mut errors = Vec::new();

        let hook = self.hooks.read().disconnect.clone();
        if let Some(hook) = hook {
            if let Err(e) = hook().await {
                self.logger.error(format!("disconnect hook failed: {e}"));
                errors.push(e);
            }
        }

        if let Err(e) = self.logger.exit().await {
            errors.push(e);
        }
        self.running.store(false, Ordering::Release);
        errors
    }

    /// Dispatch one inbound event. Rejects via the gate first; accepted
    /// events fire every matching literal and pattern trigger, each on its
    /// own task with its own payload copy. Returns without waiting on any
    /// of them.
    pub fn handle(&self, payload: Payload) {
        if !self.enabled() {
            return;
        }
        if !self.gate.accepts(&payload.sender, &payload.target) {
            return;
        }

        let event = normalize(&payload.event);

        let literal = {
            let key = (event.clone(), payload.text.to_lowercase());
            self.string_triggers.read().get(&key).cloned()
        };
        if let Some(handler) = literal {
            let copy = payload.clone();
            tokio::spawn(async move { handler(copy).await });
        }

        let matched: Vec<EventHandler> = {
            let patterns = self.pattern_triggers.read();
            patterns
                .get(&event)
                .map(|hooks| {
                    hooks
                        .iter()
                        .filter(|h| h.pattern.is_match(&payload.text))
                        .map(|h| Arc::clone(&h.handler))
                        .collect()
                })
                .unwrap_or_default()
        };
        for handler in matched {
            let copy = payload.clone();
            tokio::spawn(async move { handler(copy).await });
        }
    }

    fn describe(&self) -> Option<String> {
        self.hooks.read().describe.as_ref().map(|d| d())
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("enabled", &self.enabled())
            .field("running", &self.is_running())
            .finish()
    }
}
