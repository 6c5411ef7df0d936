//! Base console commands auto-registered on every module.
//!
//! `info`, `allow|deny <target>`, `rem allow|deny <target>`,
//! `clear allow|deny user|chan`, `list allow|deny user|chan`,
//! `enable`/`disable`, `logs`, `head|tail [n]`, `clear logs`.
//!
//! Commands hold a `Weak` back-reference to their module; a command firing
//! after the module is dropped is a no-op.

use std::sync::{Arc, Weak};

use regex::Regex;

use super::console::{handler, named_groups};
use super::gate::{Access, Scope};
use super::Module;
use crate::error::Error;

const CONSOLE: &str = "botmux::console";

/// Register every base command, logging failures to the module's own
/// logger. Failures here mean a caller somehow pre-registered one of the
/// reserved base triggers.
pub(super) fn register_base(module: &Arc<Module>) {
    let results = [
        register_info(module),
        register_add(module),
        register_rem(module),
        register_clear(module),
        register_list(module),
        register_enable(module),
        register_logs(module),
        register_head_tail(module),
        register_clear_logs(module),
    ];
    for result in results {
        if let Err(e) = result {
            module.logger().error(format!("base command registration failed: {e}"));
        }
    }
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("base command pattern is valid")
}

fn register_info(module: &Arc<Module>) -> Result<(), Error> {
    let weak = Arc::downgrade(module);
    module.console().register(
        "info",
        handler(move |_line| {
            let module = weak.clone();
            async move {
                let Some(module) = module.upgrade() else { return };
                let gate = module.gate();
                let status = if module.enabled() { "enabled" } else { "disabled" };
                let described = module
                    .describe()
                    .map(|text| format!("\n    {text}"))
                    .unwrap_or_default();

                tracing::info!(
                    target: CONSOLE,
                    "{} ({status}) - {}{described}\n  \
                     event triggers:\n    {}\n  \
                     console triggers:\n    {}\n  \
                     allowed users: {:?}\n  denied users: {:?}\n  \
                     allowed chans: {:?}\n  denied chans: {:?}",
                    module.name(),
                    module.description(),
                    module.triggers().join("\n    "),
                    module.console().list_triggers().join("\n    "),
                    &*gate.read(Access::Allow, Scope::User),
                    &*gate.read(Access::Deny, Scope::User),
                    &*gate.read(Access::Allow, Scope::Chan),
                    &*gate.read(Access::Deny, Scope::Chan),
                );
            }
        }),
    )
}

fn register_add(module: &Arc<Module>) -> Result<(), Error> {
    let re = pattern(r"^(?P<mode>allow|deny)\s(?P<target>\S+)$");
    let weak = Arc::downgrade(module);
    let matcher = re.clone();
    module.console().register(
        re,
        handler(move |line| {
            let module = weak.clone();
            let matcher = matcher.clone();
            async move {
                let Some(module) = module.upgrade() else { return };
                // Match is guaranteed; parse only dispatches on a hit.
                let Some(groups) = named_groups(&matcher, &line) else { return };
                let target = &groups["target"];

                let result = match groups["mode"].as_str() {
                    "allow" => module.gate().allow(target),
                    _ => module.gate().deny(target),
                };
                match result {
                    Ok(()) => {
                        module.logger().info(format!("added {target} to {} list", groups["mode"]));
                        tracing::info!(target: CONSOLE, "added {target} to {} list", groups["mode"]);
                    }
                    Err(e) => {
                        module.logger().error(format!("adding {target} to {} list: {e}", groups["mode"]));
                        tracing::warn!(target: CONSOLE, "adding {target} to {} list: {e}", groups["mode"]);
                    }
                }
            }
        }),
    )
}

fn register_rem(module: &Arc<Module>) -> Result<(), Error> {
    let re = pattern(r"^rem\s(?P<mode>allow|deny)\s(?P<target>\S+)$");
    let weak = Arc::downgrade(module);
    let matcher = re.clone();
    module.console().register(
        re,
        handler(move |line| {
            let module = weak.clone();
            let matcher = matcher.clone();
            async move {
                let Some(module) = module.upgrade() else { return };
                let Some(groups) = named_groups(&matcher, &line) else { return };
                let target = &groups["target"];

                let result = match groups["mode"].as_str() {
                    "allow" => module.gate().remove_allowed(target),
                    _ => module.gate().remove_denied(target),
                };
                match result {
                    Ok(()) => {
                        module.logger().info(format!("removed {target} from {} list", groups["mode"]));
                        tracing::info!(target: CONSOLE, "removed {target} from {} list", groups["mode"]);
                    }
                    Err(e) => {
                        module.logger().error(format!("removing {target}: {e}"));
                        tracing::warn!(target: CONSOLE, "error removing {target}: {e}");
                    }
                }
            }
        }),
    )
}

fn register_clear(module: &Arc<Module>) -> Result<(), Error> {
    let re = pattern(r"^clear\s(?P<mode>allow|deny)\s(?P<scope>user|chan)$");
    let weak = Arc::downgrade(module);
    let matcher = re.clone();
    module.console().register(
        re,
        handler(move |line| {
            let module = weak.clone();
            let matcher = matcher.clone();
            async move {
                let Some(module) = module.upgrade() else { return };
                let Some(groups) = named_groups(&matcher, &line) else { return };
                let (access, scope) = access_scope(&groups["mode"], &groups["scope"]);

                module.gate().clear(access, scope);
                let what = format!("{} {}", access.label(), scope.label());
                module.logger().info(format!("cleared {what} list"));
                tracing::info!(target: CONSOLE, "cleared {what} list");
            }
        }),
    )
}

fn register_list(module: &Arc<Module>) -> Result<(), Error> {
    let re = pattern(r"^list\s(?P<mode>allow|deny)\s(?P<scope>user|chan)$");
    let weak = Arc::downgrade(module);
    let matcher = re.clone();
    module.console().register(
        re,
        handler(move |line| {
            let module = weak.clone();
            let matcher = matcher.clone();
            async move {
                let Some(module) = module.upgrade() else { return };
                let Some(groups) = named_groups(&matcher, &line) else { return };
                let (access, scope) = access_scope(&groups["mode"], &groups["scope"]);

                // Borrowed read: formatted without copying, released when
                // the guard drops.
                let view = module.gate().read(access, scope);
                tracing::info!(
                    target: CONSOLE,
                    "{} {}s: {:?}",
                    access.label(),
                    scope.label(),
                    &*view
                );
            }
        }),
    )
}

fn register_enable(module: &Arc<Module>) -> Result<(), Error> {
    let re = pattern(r"^(?P<cmd>en|dis)able$");
    let weak = Arc::downgrade(module);
    let matcher = re.clone();
    module.console().register(
        re,
        handler(move |line| {
            let module = weak.clone();
            let matcher = matcher.clone();
            async move {
                let Some(module) = module.upgrade() else { return };
                let Some(groups) = named_groups(&matcher, &line) else { return };

                let status = if groups["cmd"] == "en" {
                    module.enable();
                    "enabled"
                } else {
                    module.disable();
                    "disabled"
                };
                module.logger().info(format!("{status} {}", module.name()));
                tracing::info!(target: CONSOLE, "{status} {}", module.name());
            }
        }),
    )
}

fn register_logs(module: &Arc<Module>) -> Result<(), Error> {
    let weak = Arc::downgrade(module);
    module.console().register(
        "logs",
        handler(move |_line| {
            let module = weak.clone();
            async move {
                let Some(module) = module.upgrade() else { return };
                let logs = module.logger().tail_logs(10);
                tracing::info!(
                    target: CONSOLE,
                    "{}\nshowing {} of {} logs",
                    logs.join("\n"),
                    logs.len(),
                    module.logger().len_logs()
                );
            }
        }),
    )
}

fn register_head_tail(module: &Arc<Module>) -> Result<(), Error> {
    let re = pattern(r"^(?P<cmd>head|tail)(\s(?P<num>-?\d+))?$");
    let weak = Arc::downgrade(module);
    let matcher = re.clone();
    module.console().register(
        re,
        handler(move |line| {
            let module = weak.clone();
            let matcher = matcher.clone();
            async move {
                let Some(module) = module.upgrade() else { return };
                let Some(groups) = named_groups(&matcher, &line) else { return };

                let num: isize = match groups.get("num") {
                    Some(num) => match num.parse() {
                        Ok(n) => n,
                        Err(e) => {
                            module.logger().error(format!("bad log count {num}: {e}"));
                            tracing::warn!(target: CONSOLE, "bad log count {num}: {e}");
                            return;
                        }
                    },
                    None => 10,
                };

                let logs = if groups["cmd"] == "head" {
                    module.logger().logs(num)
                } else {
                    module.logger().tail_logs(num)
                };
                tracing::info!(target: CONSOLE, "{}", logs.join("\n"));
            }
        }),
    )
}

fn register_clear_logs(module: &Arc<Module>) -> Result<(), Error> {
    let weak: Weak<Module> = Arc::downgrade(module);
    module.console().register(
        "clear logs",
        handler(move |_line| {
            let module = weak.clone();
            async move {
                let Some(module) = module.upgrade() else { return };
                module.logger().clear_logs();
                tracing::info!(target: CONSOLE, "logs cleared");
            }
        }),
    )
}

fn access_scope(mode: &str, scope: &str) -> (Access, Scope) {
    let access = if mode == "allow" { Access::Allow } else { Access::Deny };
    let scope = if scope == "chan" { Scope::Chan } else { Scope::User };
    (access, scope)
}
