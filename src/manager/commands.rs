//! Top-level administrative console commands.
//!
//! `quit`, `fquit`/`force quit [module]`, `list`, `access list`,
//! `access add|rem <group> <nick>`, `join|part <chan>`, and the
//! `:<module> <command>` router that forwards input to one module's
//! console.
//!
//! Commands hold a `Weak` back-reference to the manager so a queued
//! command never keeps a dropped manager alive.

use std::sync::Arc;

use regex::Regex;

use super::{CORE, ModuleManager};
use crate::module::console::{handler, named_groups};

const CONSOLE: &str = "botmux::console";

pub(super) fn register_manager_commands(manager: &Arc<ModuleManager>) {
    let results = [
        register_quit(manager),
        register_force_quit(manager),
        register_list(manager),
        register_access_list(manager),
        register_access_edit(manager),
        register_join_part(manager),
        register_router(manager),
    ];
    for result in results {
        if let Err(e) = result {
            manager
                .core
                .logger()
                .error(format!("manager command registration failed: {e}"));
        }
    }
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("manager command pattern is valid")
}

fn register_quit(manager: &Arc<ModuleManager>) -> Result<(), crate::error::Error> {
    let weak = Arc::downgrade(manager);
    manager.console.register(
        "quit",
        handler(move |_line| {
            let manager = weak.clone();
            async move {
                let Some(manager) = manager.upgrade() else { return };
                let errors = manager.disconnect().await;
                if errors.is_empty() {
                    tracing::info!(target: CONSOLE, "quit: disconnected cleanly");
                    let _ = manager.quit_tx.send(true);
                } else {
                    for (name, e) in &errors {
                        tracing::warn!(target: CONSOLE, module = %name, error = %e, "quit failed");
                    }
                    let _ = manager.quit_tx.send(false);
                }
            }
        }),
    )
}

fn register_force_quit(manager: &Arc<ModuleManager>) -> Result<(), crate::error::Error> {
    let re = pattern(r"^f(orce\s)?quit(\s(?P<module>\S+))?$");
    let weak = Arc::downgrade(manager);
    let matcher = re.clone();
    manager.console.register(
        re,
        handler(move |line| {
            let manager = weak.clone();
            let matcher = matcher.clone();
            async move {
                let Some(manager) = manager.upgrade() else { return };
                let Some(groups) = named_groups(&matcher, &line) else { return };

                match groups.get("module") {
                    Some(name) => {
                        let errors = manager.force_disconnect_module(name).await;
                        if errors.is_empty() {
                            tracing::info!(target: CONSOLE, module = %name, "force-quit module");
                        } else {
                            for e in &errors {
                                tracing::warn!(target: CONSOLE, module = %name, error = %e, "force-quit error");
                            }
                        }
                    }
                    None => {
                        let errors = manager.force_disconnect().await;
                        for (name, errs) in &errors {
                            for e in errs {
                                tracing::warn!(target: CONSOLE, module = %name, error = %e, "force-quit error");
                            }
                        }
                        tracing::info!(target: CONSOLE, "force-quit: transport closed");
                        let _ = manager.quit_tx.send(errors.is_empty());
                    }
                }
            }
        }),
    )
}

fn register_list(manager: &Arc<ModuleManager>) -> Result<(), crate::error::Error> {
    let weak = Arc::downgrade(manager);
    manager.console.register(
        "list",
        handler(move |_line| {
            let manager = weak.clone();
            async move {
                let Some(manager) = manager.upgrade() else { return };
                let modules = manager.modules().await;
                let mut lines = Vec::with_capacity(modules.len() + 1);
                lines.push(format!("{CORE} (enabled) - {}", manager.core.description()));
                for module in &modules {
                    let status = if module.enabled() { "enabled" } else { "disabled" };
                    lines.push(format!("{} ({status}) - {}", module.name(), module.description()));
                }
                tracing::info!(target: CONSOLE, "modules:\n  {}", lines.join("\n  "));
            }
        }),
    )
}

fn register_access_list(manager: &Arc<ModuleManager>) -> Result<(), crate::error::Error> {
    let weak = Arc::downgrade(manager);
    manager.console.register(
        "access list",
        handler(move |_line| {
            let manager = weak.clone();
            async move {
                let Some(manager) = manager.upgrade() else { return };
                let groups = manager.access.groups(&[]);
                let mut lines: Vec<String> = groups
                    .iter()
                    .map(|(group, members)| format!("{group}: {}", members.join(", ")))
                    .collect();
                lines.sort();
                tracing::info!(target: CONSOLE, "access groups:\n  {}", lines.join("\n  "));
            }
        }),
    )
}

fn register_access_edit(manager: &Arc<ModuleManager>) -> Result<(), crate::error::Error> {
    let re = pattern(r"^access\s(?P<cmd>add|rem)\s(?P<group>\S+)\s(?P<nick>\S+)$");
    let weak = Arc::downgrade(manager);
    let matcher = re.clone();
    manager.console.register(
        re,
        handler(move |line| {
            let manager = weak.clone();
            let matcher = matcher.clone();
            async move {
                let Some(manager) = manager.upgrade() else { return };
                let Some(groups) = named_groups(&matcher, &line) else { return };
                let (group, nick) = (&groups["group"], &groups["nick"]);

                let changed = if groups["cmd"] == "add" {
                    manager.access.add(nick, group)
                } else {
                    manager.access.remove(nick, group)
                };
                if changed {
                    manager
                        .core
                        .logger()
                        .info(format!("access {}: {nick} in {group}", groups["cmd"]));
                    tracing::info!(target: CONSOLE, "access {}: {nick} in {group}", groups["cmd"]);
                } else {
                    tracing::warn!(target: CONSOLE, "access {}: no change for {nick} in {group}", groups["cmd"]);
                }
            }
        }),
    )
}

fn register_join_part(manager: &Arc<ModuleManager>) -> Result<(), crate::error::Error> {
    let re = pattern(r"^(?P<cmd>join|part)\s(?P<chan>\S+)$");
    let weak = Arc::downgrade(manager);
    let matcher = re.clone();
    manager.console.register(
        re,
        handler(move |line| {
            let manager = weak.clone();
            let matcher = matcher.clone();
            async move {
                let Some(manager) = manager.upgrade() else { return };
                let Some(groups) = named_groups(&matcher, &line) else { return };

                let channel = if groups["chan"].starts_with('#') {
                    groups["chan"].clone()
                } else {
                    format!("#{}", groups["chan"])
                };
                let result = if groups["cmd"] == "join" {
                    manager.transport.join(&channel).await
                } else {
                    manager.transport.part(&channel).await
                };
                match result {
                    Ok(()) => {
                        manager.core.logger().info(format!("{} {channel}", groups["cmd"]));
                        tracing::info!(target: CONSOLE, "{} {channel}", groups["cmd"]);
                    }
                    Err(e) => {
                        manager
                            .core
                            .logger()
                            .error(format!("{} {channel} failed: {e}", groups["cmd"]));
                        tracing::warn!(target: CONSOLE, "{} {channel} failed: {e}", groups["cmd"]);
                    }
                }
            }
        }),
    )
}

/// `:<module> <command>` forwards the command to that module's console.
/// Unknown module names are dropped silently.
fn register_router(manager: &Arc<ModuleManager>) -> Result<(), crate::error::Error> {
    let re = pattern(r"^:(?P<name>\w+)\s(?P<command>.+)$");
    let weak = Arc::downgrade(manager);
    let matcher = re.clone();
    manager.console.register(
        re,
        handler(move |line| {
            let manager = weak.clone();
            let matcher = matcher.clone();
            async move {
                let Some(manager) = manager.upgrade() else { return };
                let Some(groups) = named_groups(&matcher, &line) else { return };
                let (name, command) = (&groups["name"], &groups["command"]);

                if name == CORE {
                    manager.core.console().parse(command);
                    return;
                }
                match manager.find(name).await {
                    Some(module) => module.console().parse(command),
                    None => {
                        tracing::debug!(target: CONSOLE, module = %name, "no such module");
                    }
                }
            }
        }),
    )
}
