//! botmux: a modular IRC bot framework built on concurrent event fan-out.
//!
//! A [`ModuleManager`](manager::ModuleManager) owns one
//! [`Transport`](transport::Transport) connection and any number of
//! registered [`Module`](module::Module)s. Every inbound protocol event is
//! handed to every module on its own task; each module evaluates its
//! allow/deny [`Gate`](module::Gate), then fires every matching trigger on
//! its own task with its own copy of the payload. Nothing in the dispatch
//! path waits on a handler, so one slow module can never stall its
//! siblings or the read loop.
//!
//! Each module also carries a [`Console`](module::Console) of
//! administrative commands (reachable through the manager's
//! `:<module> <command>` router) and a per-module asynchronous
//! [`Logger`](logger::Logger) that drains its queue before the log file is
//! closed.
//!
//! Lifecycle is two-phase: `connect` runs every module's pre-connect hook,
//! opens the transport, then runs the connected hooks; `disconnect` exits
//! modules strictly and only closes the transport when every module shut
//! down cleanly, while `force_disconnect` is the best-effort,
//! error-aggregating escape hatch. Per-module failures are collected into
//! maps instead of aborting siblings.

pub mod access;
pub mod config;
pub mod error;
pub mod event;
pub mod logger;
pub mod manager;
pub mod module;
pub mod transport;

pub use access::AccessList;
pub use config::{BotConfig, ConfigError, IdentityConfig, ModuleConfig, NetworkConfig};
pub use error::{Error, Result, TransportError};
pub use event::{EventRegistry, Payload, events, normalize};
pub use logger::{Logger, Priority};
pub use manager::{CORE, ModuleManager};
pub use module::{
    Access, Console, ConsoleHandler, DescribeFn, EventHandler, Gate, GateView, Hook, Module,
    Scope, Trigger, console_handler, event_handler, hook,
};
pub use transport::Transport;
