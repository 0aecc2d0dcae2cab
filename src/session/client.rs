//! Websocket session driver.
//!
//! One task owns the socket: it writes queued envelopes, reads frames,
//! sends heartbeats and reconnects. Everyone else talks to it through a
//! cloneable [`SessionHandle`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::machine::{SessionCore, SessionPhase, DEFAULT_MAX_PENDING_MESSAGES};
use super::protocol::{
    Envelope, Heartbeat, Inbound, InboundCommand, LogMessage, ProgressMessage, ResultMessage,
    HEARTBEAT, LOG, PROGRESS,
};
use super::state::DeviceStateStore;
use crate::device::DeviceInfo;
use crate::AutodriveError;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Receives commands as they arrive. Must return quickly; execution happens
/// elsewhere.
pub trait CommandListener: Send + Sync {
    fn on_command(&self, command: InboundCommand);
}

/// Whether a reconnect attempt is worth making.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

pub struct AlwaysOnline;

#[async_trait]
impl ConnectivityProbe for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Online when the server host resolves.
pub struct DnsProbe {
    authority: String,
}

impl DnsProbe {
    pub fn for_url(url: &str) -> Result<Self, AutodriveError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| AutodriveError::Config(format!("invalid server url '{}': {}", url, e)))?;
        let host = uri
            .host()
            .ok_or_else(|| AutodriveError::Config(format!("server url '{}' has no host", url)))?;
        let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
            Some("wss") | Some("https") => 443,
            _ => 80,
        });
        Ok(Self {
            authority: format!("{}:{}", host, port),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for DnsProbe {
    async fn is_online(&self) -> bool {
        match tokio::net::lookup_host(self.authority.as_str()).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                debug!(authority = %self.authority, error = %e, "Server host does not resolve");
                false
            }
        }
    }
}

/// Outgoing reports from command execution. Delivery is the session's
/// problem: these never fail.
pub trait Outbound: Send + Sync {
    fn send_result(&self, result: ResultMessage);

    fn send_progress(&self, progress: ProgressMessage);

    fn send_log(&self, log: LogMessage);

    fn device_id(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub url: String,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_pending_messages: usize,
}

impl SessionSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_pending_messages: DEFAULT_MAX_PENDING_MESSAGES,
        }
    }
}

struct Shared {
    core: Mutex<SessionCore>,
    writer: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    shutdown: CancellationToken,
}

/// Cheap handle onto a session. Lock order is always core, then writer.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn new(identity: DeviceInfo, device_id: Option<String>, max_pending_messages: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(SessionCore::new(identity, device_id, max_pending_messages)),
                writer: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, SessionCore> {
        self.shared.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand an envelope to the writer, or queue it if there is none.
    fn write_locked(&self, core: &mut SessionCore, envelope: Envelope) {
        let rejected = {
            let writer = self.shared.writer.lock().unwrap_or_else(|e| e.into_inner());
            match writer.as_ref() {
                Some(tx) => tx.send(envelope).err().map(|e| e.0),
                None => Some(envelope),
            }
        };
        if let Some(envelope) = rejected {
            core.requeue(envelope);
        }
    }

    /// Send now if the session is ready, otherwise queue.
    pub fn submit(&self, envelope: Envelope) {
        let mut core = self.lock_core();
        if let Some(envelope) = core.submit(envelope) {
            self.write_locked(&mut core, envelope);
        }
    }

    fn requeue(&self, envelope: Envelope) {
        self.lock_core().requeue(envelope);
    }

    fn complete_handshake(&self, device_id: Option<String>) -> usize {
        let mut core = self.lock_core();
        let flushed = core.on_ready(device_id);
        let count = flushed.len();
        for envelope in flushed {
            self.write_locked(&mut core, envelope);
        }
        count
    }

    fn install_writer(&self, tx: mpsc::UnboundedSender<Envelope>) {
        *self.shared.writer.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
    }

    fn clear_writer(&self) {
        *self.shared.writer.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Ask the session task to close the socket and stop reconnecting.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock_core().phase()
    }

    pub fn is_ready(&self) -> bool {
        self.lock_core().is_ready()
    }

    pub fn queued(&self) -> usize {
        self.lock_core().queued()
    }

    pub fn pending_acks(&self) -> Vec<String> {
        self.lock_core()
            .pending_ack_ids()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

impl Outbound for SessionHandle {
    fn send_result(&self, mut result: ResultMessage) {
        let mut core = self.lock_core();
        if result.device_id.is_none() {
            result.device_id = core.device_id().map(str::to_string);
        }
        debug!(command_id = %result.command_id, success = result.is_success(), "Submitting result");
        if let Some(envelope) = core.submit_result(&result) {
            self.write_locked(&mut core, envelope);
        }
    }

    fn send_progress(&self, mut progress: ProgressMessage) {
        if progress.device_id.is_none() {
            progress.device_id = self.device_id();
        }
        self.submit(Envelope::with_payload(PROGRESS, &progress));
    }

    fn send_log(&self, mut log: LogMessage) {
        if log.device_id.is_none() {
            log.device_id = self.device_id();
        }
        self.submit(Envelope::with_payload(LOG, &log));
    }

    fn device_id(&self) -> Option<String> {
        self.lock_core().device_id().map(str::to_string)
    }
}

type CapabilitySupplier = Arc<dyn Fn() -> Value + Send + Sync>;
type TaskStatusSupplier = Arc<dyn Fn() -> Option<String> + Send + Sync>;

pub struct SessionClient {
    settings: SessionSettings,
    handle: SessionHandle,
    listener: Arc<dyn CommandListener>,
    probe: Arc<dyn ConnectivityProbe>,
    state: Option<DeviceStateStore>,
    capabilities: Option<CapabilitySupplier>,
    task_status: Option<TaskStatusSupplier>,
}

impl SessionClient {
    pub fn new(
        settings: SessionSettings,
        handle: SessionHandle,
        listener: Arc<dyn CommandListener>,
    ) -> Self {
        Self {
            settings,
            handle,
            listener,
            probe: Arc::new(AlwaysOnline),
            state: None,
            capabilities: None,
            task_status: None,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Persist server-assigned device ids and connection times.
    pub fn with_state_store(mut self, state: DeviceStateStore) -> Self {
        self.state = Some(state);
        self
    }

    /// Capability listing sent with every `session_init`.
    pub fn with_capabilities(mut self, supplier: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.capabilities = Some(Arc::new(supplier));
        self
    }

    /// Current task name reported in heartbeats.
    pub fn with_task_status(
        mut self,
        supplier: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.task_status = Some(Arc::new(supplier));
        self
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Connect and serve until [`SessionHandle::shutdown`].
    #[instrument(skip_all, fields(url = %self.settings.url))]
    pub async fn run(&self) -> Result<(), AutodriveError> {
        let shutdown = self.handle.shared.shutdown.clone();
        while !shutdown.is_cancelled() {
            self.handle.lock_core().on_connecting();
            info!("Connecting");
            let connected = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = connect_async(self.settings.url.as_str()) => r,
            };
            match connected {
                Ok((ws, _)) => {
                    if let Err(e) = self.serve(ws).await {
                        warn!(error = %e, "Session dropped");
                    }
                }
                Err(e) => warn!(error = %e, "Connection failed"),
            }
            self.handle.lock_core().on_closed();

            if !self.wait_for_reconnect(&shutdown).await {
                break;
            }
        }
        self.handle.lock_core().shutdown();
        info!("Session stopped");
        Ok(())
    }

    /// Sleep out the reconnect delay, repeating while the network is down.
    /// Returns false on shutdown.
    async fn wait_for_reconnect(&self, shutdown: &CancellationToken) -> bool {
        loop {
            if shutdown.is_cancelled() {
                return false;
            }
            debug!(delay_ms = self.settings.reconnect_delay.as_millis() as u64, "Reconnect scheduled");
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }
            if self.probe.is_online().await {
                return true;
            }
            info!("Network unavailable, postponing reconnect");
        }
    }

    /// Drive one open connection until it closes.
    pub async fn serve<S>(&self, ws: WebSocketStream<S>) -> Result<(), AutodriveError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let shutdown = self.handle.shared.shutdown.clone();
        let (mut sink, mut stream) = ws.split();

        if let Some(state) = &self.state {
            state.mark_connected().await;
        }
        let capabilities = self.capabilities.as_ref().map(|f| f());
        let init = self.handle.lock_core().on_open(capabilities);
        sink.send(Message::Text(init.to_text()?)).await?;
        info!("Connected, session_init sent");

        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        self.handle.install_writer(tx);

        let period = self.settings.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);

        let outcome = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client shutdown".into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    break Ok(());
                }
                Some(envelope) = rx.recv() => {
                    let text = match envelope.to_text() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(kind = %envelope.kind, error = %e, "Dropping unserializable message");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        self.handle.requeue(envelope);
                        break Err(e.into());
                    }
                }
                _ = heartbeat.tick() => {
                    if self.handle.is_ready() {
                        let status = self.task_status.as_ref().and_then(|f| f());
                        self.handle.submit(Envelope::with_payload(HEARTBEAT, &Heartbeat::new(status)));
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = sink.send(Message::Pong(payload)).await {
                            break Err(e.into());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Server closed the session");
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(()),
                },
            }
        };

        self.handle.clear_writer();
        while let Ok(envelope) = rx.try_recv() {
            self.handle.requeue(envelope);
        }
        outcome
    }

    async fn handle_text(&self, text: &str) {
        let parsed = self.handle.lock_core().on_frame(text);
        let inbound = match parsed {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "Unparseable frame");
                return;
            }
        };
        match inbound {
            Inbound::Ready { device_id } => {
                let flushed = self.handle.complete_handshake(device_id.clone());
                info!(flushed, device_id = ?device_id, "Session ready");
                if let (Some(id), Some(state)) = (device_id, &self.state) {
                    state.set_device_id(&id).await;
                    if let Err(e) = state.save().await {
                        warn!(error = %e, "Failed to persist device id");
                    }
                }
            }
            Inbound::Command(command) => {
                debug!(action = %command.action, command_id = ?command.command_id, "Command received");
                self.listener.on_command(command);
            }
            Inbound::Ack(_) => {}
            Inbound::Ping => self.handle.submit(Envelope::pong()),
            Inbound::Other(kind) => debug!(kind = %kind, "Ignoring message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LogLevel;

    fn handle() -> SessionHandle {
        SessionHandle::new(DeviceInfo::new("bench", "emu"), Some("dev-1".into()), 4)
    }

    #[test]
    fn test_outbound_queues_while_disconnected() {
        let h = handle();
        h.send_progress(ProgressMessage::new("c1", "start", "starting"));
        h.send_log(LogMessage {
            level: LogLevel::Info,
            message: "hi".into(),
            extra: None,
            user_id: None,
            device_id: None,
        });
        h.send_result(ResultMessage::success("c1", None));
        assert_eq!(h.queued(), 3);
        assert_eq!(h.pending_acks(), vec!["c1"]);
        assert_eq!(h.phase(), SessionPhase::Disconnected);
        assert_eq!(Outbound::device_id(&h).as_deref(), Some("dev-1"));
    }

    #[test]
    fn test_ready_without_writer_requeues_flush() {
        let h = handle();
        h.send_result(ResultMessage::success("c1", None));
        {
            let mut core = h.lock_core();
            core.on_connecting();
            core.on_open(None);
        }
        // No socket task: flushed envelopes land back in the queue. The
        // queued result is not replayed a second time from pending acks.
        h.complete_handshake(None);
        assert!(h.is_ready());
        assert_eq!(h.queued(), 1);
        let core = h.lock_core();
        assert_eq!(core.queued_kinds(), vec!["result"]);
        assert_eq!(core.pending_ack_ids(), vec!["c1"]);
    }

    #[test]
    fn test_dns_probe_authority() {
        assert_eq!(DnsProbe::for_url("wss://example.com/ws").unwrap().authority, "example.com:443");
        assert_eq!(DnsProbe::for_url("ws://10.0.0.2:9000/a").unwrap().authority, "10.0.0.2:9000");
        assert!(DnsProbe::for_url("not a url").is_err());
    }

    #[test]
    fn test_shutdown_flag() {
        let h = handle();
        assert!(!h.is_shutdown());
        h.shutdown();
        assert!(h.is_shutdown());
    }
}
