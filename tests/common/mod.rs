//! Shared test infrastructure: an in-process transport double and small
//! helpers for building managers against it.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use botmux::{BotConfig, Payload, Transport, TransportError};

/// Transport double: tests inject inbound events and inspect the outbound
/// command log. No sockets involved.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Payload>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Payload>>>,
    connected: AtomicBool,
    fail_connect: bool,
    sent: Mutex<Vec<String>>,
}

impl ChannelTransport {
    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    /// A transport whose `connect` always fails.
    pub fn failing() -> Arc<Self> {
        Self::build(true)
    }

    fn build(fail_connect: bool) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: Mutex::new(Some(rx)),
            connected: AtomicBool::new(false),
            fail_connect,
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Push one inbound event into the stream the manager fans out.
    pub fn inject(&self, payload: Payload) {
        let _ = self.tx.send(payload);
    }

    /// Snapshot of outbound commands, oldest first.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.fail_connect {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn quit(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.sent.lock().push("QUIT".to_string());
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn join(&self, channel: &str) -> Result<(), TransportError> {
        self.sent.lock().push(format!("JOIN {channel}"));
        Ok(())
    }

    async fn part(&self, channel: &str) -> Result<(), TransportError> {
        self.sent.lock().push(format!("PART {channel}"));
        Ok(())
    }

    async fn privmsg(&self, target: &str, text: &str) -> Result<(), TransportError> {
        self.sent.lock().push(format!("PRIVMSG {target} :{text}"));
        Ok(())
    }

    fn incoming(&self) -> Option<mpsc::UnboundedReceiver<Payload>> {
        self.rx.lock().take()
    }
}

/// Install the env-filtered test subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Minimal valid config writing module logs under `log_dir`. Also installs
/// the test tracing subscriber, since every integration test starts here.
pub fn test_config(log_dir: &Path) -> BotConfig {
    init_tracing();
    let mut config: BotConfig = toml::from_str(
        r#"
        [bot]
        nick = "muxbot"

        [network]
        server = "irc.test.invalid"
        "#,
    )
    .expect("static test config parses");
    config.log_dir = log_dir.to_path_buf();
    config
}

/// Poll `cond` for up to two seconds. Dispatch is fire-and-forget, so
/// observable effects land asynchronously.
pub async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
