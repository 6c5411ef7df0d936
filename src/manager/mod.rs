//! The module manager: connection orchestration and event fan-out.
//!
//! Owns the transport, the reserved privileged `core` module, the set of
//! registered modules, and the top-level administrative console. `connect`
//! and `disconnect` drive every module's lifecycle concurrently, collecting
//! per-module errors instead of aborting siblings; the fan-out loop hands
//! every inbound transport event to every module on its own task, with no
//! back-pressure.
//!
//! Lock discipline: the running flag and module list share the manager
//! lock; module-internal state has per-module locks. No path holds the
//! manager lock while waiting on a module lock held by a path that wants
//! the manager lock, so the pair cannot deadlock.

mod commands;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use crate::access::AccessList;
use crate::config::{BotConfig, ModuleConfig};
use crate::error::Error;
use crate::event::EventRegistry;
use crate::module::{Console, Module};
use crate::transport::Transport;

/// Reserved name of the manager's privileged module.
pub const CORE: &str = "core";

struct ManagerInner {
    modules: Vec<Arc<Module>>,
    running: bool,
}

/// Multiplexes one transport connection across registered modules.
pub struct ModuleManager {
    config: BotConfig,
    transport: Arc<dyn Transport>,
    core: Arc<Module>,
    inner: RwLock<ManagerInner>,
    console: Console,
    events: Arc<EventRegistry>,
    access: AccessList,
    quit_tx: watch::Sender<bool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    fanout: Mutex<Option<JoinHandle<()>>>,
}

impl ModuleManager {
    /// Build a manager from a validated config and a transport.
    ///
    /// The config is taken by value: the manager owns an immutable snapshot
    /// and nothing else sees it afterwards. The core module is created,
    /// pre-started, and started here; modules declared in the config are
    /// constructed and registered (fetch them with [`find`](Self::find) to
    /// attach triggers and hooks).
    pub async fn new(
        config: BotConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>, Error> {
        config.validate()?;

        let core = Module::new(
            ModuleConfig::new(CORE, "botmux core module").with_log_dir(config.log_dir.clone()),
        )?;
        core.pre_start().await?;
        core.start().await?;

        let events = Arc::new(EventRegistry::new());
        core.bind(Arc::clone(&transport), Arc::clone(&events))?;

        let access = AccessList::from_seed(&config.access);
        let (quit_tx, _) = watch::channel(false);

        let manager = Arc::new(Self {
            core,
            inner: RwLock::new(ManagerInner {
                modules: Vec::new(),
                running: false,
            }),
            console: Console::new(),
            events,
            access,
            quit_tx,
            monitor: Mutex::new(None),
            fanout: Mutex::new(None),
            transport,
            config,
        });
        commands::register_manager_commands(&manager);

        for block in manager.config.modules.clone() {
            let block = if block.log_dir.is_some() {
                block
            } else {
                block.with_log_dir(manager.config.log_dir.clone())
            };
            let module = Module::new(block)?;
            manager.register(module).await?;
        }

        Ok(manager)
    }

    /// Register a module. Fails with [`Error::DuplicateName`] if the name
    /// collides with `core` or an already-registered module, or
    /// [`Error::AlreadyBound`] if the module is attached to a connection.
    pub async fn register(&self, module: Arc<Module>) -> Result<(), Error> {
        if module.is_bound() {
            return Err(Error::AlreadyBound);
        }

        let mut inner = self.inner.write().await;
        if module.name() == self.core.name()
            || inner.modules.iter().any(|m| m.name() == module.name())
        {
            return Err(Error::DuplicateName(module.name().to_string()));
        }

        module.bind(Arc::clone(&self.transport), Arc::clone(&self.events))?;
        inner.modules.push(module);
        Ok(())
    }

    /// Connect to the network.
    ///
    /// Runs every module's `pre_start` concurrently (errors collected per
    /// module), opens the transport (abort on failure), then runs `start`
    /// concurrently for the modules whose `pre_start` succeeded. The
    /// returned map is empty on full success; an entry under `"core"` means
    /// the connect itself failed.
    pub async fn connect(self: &Arc<Self>) -> HashMap<String, Error> {
        let mut inner = self.inner.write().await;
        let mut errors = HashMap::new();

        if inner.running {
            errors.insert(CORE.to_string(), Error::AlreadyRunning("manager".to_string()));
            return errors;
        }
        if let Err(e) = self.config.validate() {
            errors.insert(CORE.to_string(), e.into());
            return errors;
        }
        if let Err(e) = self.ensure_fanout() {
            self.core.logger().error(format!("cannot connect: {e}"));
            errors.insert(CORE.to_string(), e);
            return errors;
        }

        // Disconnect exits the core module with everything else; a reconnect
        // has to bring it back before anything logs through it.
        if !self.core.is_running() {
            let restarted = match self.core.pre_start().await {
                Ok(()) => self.core.start().await,
                Err(e) => Err(e),
            };
            if let Err(e) = restarted {
                errors.insert(CORE.to_string(), e);
                return errors;
            }
        }

        let modules = inner.modules.clone();

        let results = join_all(modules.iter().map(|module| {
            let module = Arc::clone(module);
            async move { (module.name().to_string(), module.pre_start().await) }
        }))
        .await;
        for (name, result) in results {
            if let Err(e) = result {
                self.core.logger().error(format!("{name}.pre_start() error: {e}"));
                errors.insert(name, e);
            }
        }

        if let Err(e) = self.transport.connect().await {
            self.core.logger().error(format!("error connecting: {e}"));
            errors.insert(CORE.to_string(), e.into());
            return errors;
        }

        let results = join_all(modules.iter().map(|module| {
            let module = Arc::clone(module);
            let failed = errors.contains_key(module.name());
            async move {
                if failed {
                    return (module.name().to_string(), Ok(()));
                }
                (module.name().to_string(), module.start().await)
            }
        }))
        .await;
        for (name, result) in results {
            if let Err(e) = result {
                self.core.logger().error(format!("{name}.start() error: {e}"));
                errors.insert(name, e);
            }
        }

        inner.running = true;
        drop(inner);

        self.post_connect().await;

        tracing::info!(
            target: "botmux",
            nick = %self.config.bot.nick,
            server = %self.config.network.server,
            "connected"
        );
        self.core.logger().info(format!(
            "{} connected to {}",
            self.config.bot.nick, self.config.network.server
        ));

        errors
    }

    /// Identify to services and join configured channels.
    async fn post_connect(&self) {
        if let Some(password) = &self.config.bot.password {
            if let Err(e) = self
                .transport
                .privmsg("NickServ", &format!("IDENTIFY {password}"))
                .await
            {
                self.core.logger().error(format!("identify failed: {e}"));
            }
        }
        for channel in &self.config.channels {
            match self.transport.join(channel).await {
                Ok(()) => self.core.logger().info(format!("joined {channel}")),
                Err(e) => self.core.logger().error(format!("join {channel} failed: {e}")),
            }
        }
    }

    /// Gracefully disconnect.
    ///
    /// Every module's `exit` runs concurrently; errors are collected per
    /// module. Only when zero modules failed does the manager exit the core
    /// module, stop the console, and close the transport. A partial failure
    /// leaves the manager running; use [`force_disconnect`](Self::force_disconnect).
    pub async fn disconnect(&self) -> HashMap<String, Error> {
        let mut inner = self.inner.write().await;
        let mut errors = HashMap::new();

        if !inner.running {
            errors.insert(CORE.to_string(), Error::NotRunning("manager".to_string()));
            return errors;
        }

        let results = join_all(inner.modules.iter().map(|module| {
            let module = Arc::clone(module);
            async move { (module.name().to_string(), module.exit().await) }
        }))
        .await;
        for (name, result) in results {
            if let Err(e) = result {
                self.core.logger().error(format!("{name}.exit() error: {e}"));
                errors.insert(name, e);
            }
        }

        if !errors.is_empty() {
            self.core.logger().warn("errors when attempting to disconnect");
            return errors;
        }
        self.core.logger().info("disconnected without errors");

        if let Err(e) = self.core.exit().await {
            tracing::error!(target: "botmux", error = %e, "core module failed to exit");
            errors.insert(CORE.to_string(), e);
            return errors;
        }

        self.stop_console();
        if self.transport.connected() {
            self.transport.quit().await;
        }
        inner.running = false;

        errors
    }

    /// Force-disconnect every module: best-effort, error-aggregating, and
    /// the transport is closed regardless of failures.
    pub async fn force_disconnect(&self) -> HashMap<String, Vec<Error>> {
        let mut inner = self.inner.write().await;
        let mut errors = HashMap::new();

        let results = join_all(inner.modules.iter().map(|module| {
            let module = Arc::clone(module);
            async move { (module.name().to_string(), module.force_exit().await) }
        }))
        .await;
        for (name, errs) in results {
            if !errs.is_empty() {
                for e in &errs {
                    self.core.logger().error(format!("{name}.force_exit() error: {e}"));
                }
                errors.insert(name, errs);
            }
        }

        let core_errors = self.core.force_exit().await;
        if !core_errors.is_empty() {
            tracing::error!(target: "botmux", "core module failed to force-exit");
            errors.insert(CORE.to_string(), core_errors);
        }

        self.stop_console();
        if self.transport.connected() {
            self.transport.quit().await;
        }
        inner.running = false;

        errors
    }

    /// Force-exit one named module, aggregating its errors. Unknown names
    /// yield an empty list.
    pub async fn force_disconnect_module(&self, name: &str) -> Vec<Error> {
        let module = self.find(name).await;
        match module {
            Some(module) => module.force_exit().await,
            None => Vec::new(),
        }
    }

    pub async fn running(&self) -> bool {
        self.inner.read().await.running
    }

    /// The reserved privileged module.
    pub fn core(&self) -> &Arc<Module> {
        &self.core
    }

    /// A registered module by (lower-cased) name. The core module is not
    /// part of the registered set; use [`core`](Self::core).
    pub async fn find(&self, name: &str) -> Option<Arc<Module>> {
        let name = name.to_lowercase();
        self.inner
            .read()
            .await
            .modules
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    /// Snapshot of the registered modules.
    pub async fn modules(&self) -> Vec<Arc<Module>> {
        self.inner.read().await.modules.clone()
    }

    pub fn access(&self) -> &AccessList {
        &self.access
    }

    pub fn event_registry(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Feed one administrative input line to the top-level console.
    pub fn handle_input(&self, line: &str) {
        self.console.parse(line);
    }

    /// Resolved to `true` after a clean quit, `false` after a failed one.
    pub fn quit_signal(&self) -> watch::Receiver<bool> {
        self.quit_tx.subscribe()
    }

    /// Start reading administrative input lines from stdin. No-op if
    /// already monitoring; stopped by `disconnect`/`force_disconnect`.
    pub fn monitor(self: &Arc<Self>) {
        let mut guard = self.monitor.lock();
        if guard.is_some() {
            return;
        }
        let weak = Arc::downgrade(self);
        *guard = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(manager) = weak.upgrade() else { break };
                manager.handle_input(&line);
            }
        }));
    }

    fn stop_console(&self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }
    }

    /// Make sure the fan-out loop is alive: one dispatch task per module
    /// per inbound event, fire-and-forget. A slow module's handlers never
    /// delay delivery to other modules or the transport's read loop.
    ///
    /// The inbound receiver is taken from the transport exactly once and
    /// owned by a single task that outlives connect cycles; events arriving
    /// while the manager is not running are discarded, so exited modules
    /// see nothing. Fails if the stream is gone (already taken elsewhere,
    /// or closed for good), since a manager without fan-out is not
    /// meaningfully connected.
    fn ensure_fanout(self: &Arc<Self>) -> Result<(), Error> {
        let mut slot = self.fanout.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let mut rx = self
            .transport
            .incoming()
            .ok_or(Error::EventStreamUnavailable)?;
        let weak = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let Some(manager) = weak.upgrade() else { break };
                let inner = manager.inner.read().await;
                if !inner.running {
                    continue;
                }
                let modules = inner.modules.clone();
                drop(inner);
                for module in modules {
                    let copy = payload.clone();
                    tokio::spawn(async move { module.handle(copy) });
                }
            }
        }));
        Ok(())
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("nick", &self.config.bot.nick)
            .field("server", &self.config.network.server)
            .finish()
    }
}
