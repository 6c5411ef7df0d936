//! End-to-end dispatch: transport events fanned out through the manager to
//! module triggers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use botmux::{Module, ModuleConfig, ModuleManager, Payload, Transport, event_handler, events};
use common::{ChannelTransport, test_config, wait_for};

fn echo_module(dir: &std::path::Path, transport: &Arc<ChannelTransport>) -> Arc<Module> {
    let module = Module::new(ModuleConfig::new("echo", "replies to pings").with_log_dir(dir))
        .expect("valid module config");

    let t = Arc::clone(transport);
    module
        .register_trigger(
            events::PRIVMSG,
            "ping",
            event_handler(move |payload: Payload| {
                let t = Arc::clone(&t);
                async move {
                    let _ = t.privmsg(&payload.target, "pong").await;
                }
            }),
        )
        .unwrap();

    let t = Arc::clone(transport);
    let re = Regex::new(r"^echo\s+(?P<rest>.+)$").unwrap();
    let matcher = re.clone();
    module
        .register_trigger(
            events::PRIVMSG,
            re,
            event_handler(move |payload: Payload| {
                let t = Arc::clone(&t);
                let matcher = matcher.clone();
                async move {
                    if let Some(caps) = matcher.captures(&payload.text) {
                        let _ = t.privmsg(&payload.target, &caps["rest"]).await;
                    }
                }
            }),
        )
        .unwrap();

    module
}

#[tokio::test]
async fn literal_trigger_fires_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ChannelTransport::new();
    let manager = ModuleManager::new(test_config(dir.path()), transport.clone())
        .await
        .unwrap();
    manager
        .register(echo_module(dir.path(), &transport))
        .await
        .unwrap();
    // Module event names merged into the manager's registry at bind time.
    assert!(manager.event_registry().contains(events::PRIVMSG));
    assert!(manager.connect().await.is_empty());

    transport.inject(Payload::new("privmsg", "ping", "alice", "#lobby"));
    assert!(wait_for(|| transport.sent().contains(&"PRIVMSG #lobby :pong".to_string())).await);

    // No double delivery.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let pongs = transport
        .sent()
        .iter()
        .filter(|l| l.ends_with(":pong"))
        .count();
    assert_eq!(pongs, 1);
}

#[tokio::test]
async fn pattern_trigger_sees_raw_text() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ChannelTransport::new();
    let manager = ModuleManager::new(test_config(dir.path()), transport.clone())
        .await
        .unwrap();
    manager
        .register(echo_module(dir.path(), &transport))
        .await
        .unwrap();
    assert!(manager.connect().await.is_empty());

    transport.inject(Payload::new("PRIVMSG", "echo Hello World", "alice", "#lobby"));
    assert!(
        wait_for(|| transport
            .sent()
            .contains(&"PRIVMSG #lobby :Hello World".to_string()))
        .await
    );
}

#[tokio::test]
async fn unmatched_events_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ChannelTransport::new();
    let manager = ModuleManager::new(test_config(dir.path()), transport.clone())
        .await
        .unwrap();
    manager
        .register(echo_module(dir.path(), &transport))
        .await
        .unwrap();
    assert!(manager.connect().await.is_empty());

    transport.inject(Payload::new("JOIN", "ping", "alice", "#lobby"));
    transport.inject(Payload::new("PRIVMSG", "pingg", "alice", "#lobby"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn gate_filters_by_sender() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ChannelTransport::new();
    let manager = ModuleManager::new(test_config(dir.path()), transport.clone())
        .await
        .unwrap();

    let module = echo_module(dir.path(), &transport);
    module.gate().allow("alice").unwrap();
    manager.register(module).await.unwrap();
    assert!(manager.connect().await.is_empty());

    transport.inject(Payload::new("PRIVMSG", "ping", "bob", "#lobby"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(transport.sent().is_empty());

    transport.inject(Payload::new("PRIVMSG", "ping", "alice", "#lobby"));
    assert!(wait_for(|| transport.sent().contains(&"PRIVMSG #lobby :pong".to_string())).await);
}

#[tokio::test]
async fn disabled_module_receives_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ChannelTransport::new();
    let manager = ModuleManager::new(test_config(dir.path()), transport.clone())
        .await
        .unwrap();

    let module = echo_module(dir.path(), &transport);
    module.disable();
    manager.register(module).await.unwrap();
    assert!(manager.connect().await.is_empty());

    transport.inject(Payload::new("PRIVMSG", "ping", "alice", "#lobby"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn reconnect_restores_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ChannelTransport::new();
    let manager = ModuleManager::new(test_config(dir.path()), transport.clone())
        .await
        .unwrap();
    manager
        .register(echo_module(dir.path(), &transport))
        .await
        .unwrap();

    assert!(manager.connect().await.is_empty());
    manager.force_disconnect().await;
    assert!(!manager.running().await);

    // A second connect cycle must leave fan-out working.
    assert!(manager.connect().await.is_empty());
    assert!(manager.running().await);

    transport.inject(Payload::new("PRIVMSG", "ping", "alice", "#lobby"));
    assert!(wait_for(|| transport.sent().contains(&"PRIVMSG #lobby :pong".to_string())).await);
}

#[tokio::test]
async fn events_while_disconnected_are_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ChannelTransport::new();
    let manager = ModuleManager::new(test_config(dir.path()), transport.clone())
        .await
        .unwrap();
    manager
        .register(echo_module(dir.path(), &transport))
        .await
        .unwrap();

    assert!(manager.connect().await.is_empty());
    assert!(manager.disconnect().await.is_empty());

    // Exited modules must not see inbound traffic.
    transport.inject(Payload::new("PRIVMSG", "ping", "alice", "#lobby"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!transport.sent().iter().any(|l| l.ends_with(":pong")));
}

#[tokio::test]
async fn slow_module_never_delays_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ChannelTransport::new();
    let manager = ModuleManager::new(test_config(dir.path()), transport.clone())
        .await
        .unwrap();

    let slow = Module::new(ModuleConfig::new("slow", "stalls forever").with_log_dir(dir.path()))
        .unwrap();
    let t = Arc::clone(&transport);
    slow.register_trigger(
        events::PRIVMSG,
        Regex::new(".").unwrap(),
        event_handler(move |payload: Payload| {
            let t = Arc::clone(&t);
            async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                let _ = t.privmsg(&payload.target, "too late").await;
            }
        }),
    )
    .unwrap();
    manager.register(slow).await.unwrap();
    manager
        .register(echo_module(dir.path(), &transport))
        .await
        .unwrap();
    assert!(manager.connect().await.is_empty());

    transport.inject(Payload::new("PRIVMSG", "ping", "alice", "#lobby"));
    assert!(wait_for(|| transport.sent().contains(&"PRIVMSG #lobby :pong".to_string())).await);
    assert!(!transport.sent().iter().any(|l| l.ends_with(":too late")));
}
