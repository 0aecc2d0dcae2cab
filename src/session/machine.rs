//! Transport-free session state: handshake phase, outgoing queue and the
//! pending-ack table.
//!
//! The client feeds socket events in and writes whatever envelopes come back
//! out. Nothing here touches the network, so every rule can be tested
//! directly.

use std::collections::VecDeque;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use super::protocol::{Envelope, Inbound, ResultMessage, SessionInit, RESULT, SESSION_INIT};
use crate::device::DeviceInfo;
use crate::AutodriveError;

pub const DEFAULT_MAX_PENDING_MESSAGES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    /// Socket open, `session_init` sent, waiting for `session_ready`.
    AwaitingReady,
    Ready,
}

pub struct SessionCore {
    phase: SessionPhase,
    identity: DeviceInfo,
    device_id: Option<String>,
    queue: VecDeque<Envelope>,
    capacity: usize,
    pending_acks: IndexMap<String, Envelope>,
    dropped: u64,
}

impl SessionCore {
    pub fn new(identity: DeviceInfo, device_id: Option<String>, capacity: usize) -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            identity,
            device_id,
            queue: VecDeque::new(),
            capacity: capacity.max(1),
            pending_acks: IndexMap::new(),
            dropped: 0,
        }
    }

    pub fn on_connecting(&mut self) {
        self.phase = SessionPhase::Connecting;
    }

    /// The socket opened. Returns the `session_init` to write immediately.
    pub fn on_open(&mut self, capabilities: Option<Value>) -> Envelope {
        self.phase = SessionPhase::AwaitingReady;
        let mut init = SessionInit::new(&self.identity, self.device_id.clone());
        init.capabilities = capabilities;
        Envelope::with_payload(SESSION_INIT, &init)
    }

    /// Returns the envelope back if it may be written now; otherwise it is
    /// queued until the handshake completes.
    pub fn submit(&mut self, envelope: Envelope) -> Option<Envelope> {
        if self.phase == SessionPhase::Ready {
            Some(envelope)
        } else {
            self.enqueue(envelope);
            None
        }
    }

    /// Record a result as awaiting acknowledgement, then submit it. A later
    /// result for the same command replaces the recorded one.
    pub fn submit_result(&mut self, result: &ResultMessage) -> Option<Envelope> {
        let envelope = Envelope::with_payload(RESULT, result);
        self.pending_acks
            .insert(result.command_id.clone(), envelope.clone());
        self.submit(envelope)
    }

    /// Put back a message whose write failed. It goes to the back of the queue.
    pub fn requeue(&mut self, envelope: Envelope) {
        if envelope.kind == SESSION_INIT {
            return;
        }
        self.enqueue(envelope);
    }

    fn enqueue(&mut self, envelope: Envelope) {
        if self.queue.len() >= self.capacity {
            if let Some(dropped) = self.queue.pop_front() {
                self.dropped += 1;
                warn!(kind = %dropped.kind, capacity = self.capacity, "Outgoing queue full, dropping oldest message");
            }
        }
        self.queue.push_back(envelope);
    }

    /// Classify a received text frame. Acks are applied here.
    pub fn on_frame(&mut self, text: &str) -> Result<Inbound, AutodriveError> {
        let inbound = Inbound::from_envelope(Envelope::parse(text)?);
        if let Inbound::Ack(command_id) = &inbound {
            if self.pending_acks.shift_remove(command_id).is_some() {
                debug!(command_id = %command_id, "Result acknowledged");
            } else {
                debug!(command_id = %command_id, "Ack for unknown command");
            }
        }
        Ok(inbound)
    }

    /// Complete the handshake. Returns everything to write, in order: the
    /// queued messages, then every other result still awaiting an ack. A repeated
    /// `session_ready` on the same connection only updates the device id.
    pub fn on_ready(&mut self, device_id: Option<String>) -> Vec<Envelope> {
        if let Some(id) = device_id {
            self.device_id = Some(id);
        }
        if self.phase == SessionPhase::Ready {
            return Vec::new();
        }
        self.phase = SessionPhase::Ready;
        let mut out: Vec<Envelope> = self.queue.drain(..).collect();
        let queued_results: Vec<String> = out
            .iter()
            .filter(|e| e.kind == RESULT)
            .filter_map(|e| e.command_id().map(str::to_string))
            .collect();
        out.extend(
            self.pending_acks
                .iter()
                .filter(|(id, _)| !queued_results.contains(id))
                .map(|(_, envelope)| envelope.clone()),
        );
        debug!(count = out.len(), "Handshake complete, flushing");
        out
    }

    pub fn on_closed(&mut self) {
        self.phase = SessionPhase::Disconnected;
    }

    /// Caller-initiated close. Queued messages are discarded; pending acks
    /// are kept.
    pub fn shutdown(&mut self) {
        self.phase = SessionPhase::Disconnected;
        self.queue.clear();
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn identity(&self) -> &DeviceInfo {
        &self.identity
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn queued_kinds(&self) -> Vec<&str> {
        self.queue.iter().map(|e| e.kind.as_str()).collect()
    }

    pub fn pending_ack_ids(&self) -> Vec<&str> {
        self.pending_acks.keys().map(String::as_str).collect()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::protocol::{HEARTBEAT, LOG, PROGRESS};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn core(capacity: usize) -> SessionCore {
        SessionCore::new(DeviceInfo::new("bench", "emu"), None, capacity)
    }

    fn msg(kind: &str, n: usize) -> Envelope {
        Envelope::new(kind, Some(json!({"n": n})))
    }

    fn ready(core: &mut SessionCore) -> Vec<Envelope> {
        core.on_connecting();
        core.on_open(None);
        core.on_ready(None)
    }

    #[test]
    fn test_messages_wait_for_handshake() {
        let mut c = core(10);
        assert!(c.submit(msg(LOG, 1)).is_none());
        c.on_connecting();
        let init = c.on_open(Some(json!([{"action": "click"}])));
        assert_eq!(init.kind, SESSION_INIT);
        assert_eq!(init.data.as_ref().unwrap()["device_name"], "bench");
        assert_eq!(init.data.as_ref().unwrap()["capabilities"][0]["action"], "click");
        assert_eq!(c.phase(), SessionPhase::AwaitingReady);

        assert!(c.submit(msg(PROGRESS, 2)).is_none());
        assert_eq!(c.queued_kinds(), vec![LOG, PROGRESS]);

        let flushed = c.on_ready(Some("dev-1".into()));
        assert_eq!(flushed, vec![msg(LOG, 1), msg(PROGRESS, 2)]);
        assert_eq!(c.device_id(), Some("dev-1"));
        assert!(c.submit(msg(HEARTBEAT, 3)).is_some());
    }

    #[test]
    fn test_ready_is_idempotent_per_connection() {
        let mut c = core(10);
        c.submit_result(&ResultMessage::success("c1", None));
        assert_eq!(ready(&mut c).len(), 1);
        assert!(c.on_ready(Some("dev-2".into())).is_empty());
        assert_eq!(c.device_id(), Some("dev-2"));
    }

    #[test]
    fn test_pending_acks_replay_until_acked() {
        let mut c = core(10);
        ready(&mut c);
        let sent = c.submit_result(&ResultMessage::success("c1", Some("ok".into())));
        assert_eq!(sent.as_ref().and_then(Envelope::command_id), Some("c1"));
        c.submit_result(&ResultMessage::failure("c2", "boom"));
        assert_eq!(c.pending_ack_ids(), vec!["c1", "c2"]);

        c.on_frame(r#"{"type":"command_ack","data":{"command_id":"c1"}}"#).unwrap();
        c.on_frame(r#"{"type":"command_ack","data":{"command_id":"zzz"}}"#).unwrap();
        assert_eq!(c.pending_ack_ids(), vec!["c2"]);

        c.on_closed();
        let replay = ready(&mut c);
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].command_id(), Some("c2"));
        assert_eq!(replay[0].data.as_ref().unwrap()["error_message"], "boom");
    }

    #[test]
    fn test_shutdown_clears_queue_but_keeps_acks() {
        let mut c = core(10);
        c.submit(msg(LOG, 1));
        c.submit_result(&ResultMessage::success("c1", None));
        c.shutdown();
        assert_eq!(c.queued(), 0);
        assert_eq!(c.pending_ack_ids(), vec!["c1"]);
    }

    #[test]
    fn test_requeue_goes_to_back_and_skips_init() {
        let mut c = core(10);
        c.submit(msg(LOG, 1));
        c.requeue(msg(PROGRESS, 2));
        c.requeue(Envelope::new(SESSION_INIT, None));
        assert_eq!(c.queued_kinds(), vec![LOG, PROGRESS]);
    }

    #[test]
    fn test_malformed_frame_is_error() {
        let mut c = core(1);
        assert!(c.on_frame("{{").is_err());
    }

    proptest! {
        #[test]
        fn prop_queue_keeps_newest_within_capacity(capacity in 1usize..32, count in 0usize..100) {
            let mut c = core(capacity);
            for n in 0..count {
                c.submit(msg(LOG, n));
            }
            let kept = count.min(capacity);
            prop_assert_eq!(c.queued(), kept);
            prop_assert_eq!(c.dropped() as usize, count - kept);

            let flushed = ready(&mut c);
            let numbers: Vec<u64> = flushed
                .iter()
                .filter_map(|e| e.data.as_ref()?.get("n")?.as_u64())
                .collect();
            let expected: Vec<u64> = ((count - kept)..count).map(|n| n as u64).collect();
            prop_assert_eq!(numbers, expected);
        }
    }
}
