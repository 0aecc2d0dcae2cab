//! Reliable session with the control server: handshake, bounded outgoing
//! queue, result acknowledgement and reconnects.

mod client;
mod machine;
pub mod protocol;
mod state;

pub use client::{
    AlwaysOnline, CommandListener, ConnectivityProbe, DnsProbe, Outbound, SessionClient,
    SessionHandle, SessionSettings, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RECONNECT_DELAY,
};
pub use machine::{SessionCore, SessionPhase, DEFAULT_MAX_PENDING_MESSAGES};
pub use protocol::{Envelope, Inbound, InboundCommand, LogMessage, ProgressMessage, ResultMessage};
pub use state::{DeviceState, DeviceStateStore};
