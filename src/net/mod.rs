//! UDP Multicast Transport
//!
//! Egress and ingress halves of the wire:
//! - `sender`: multicast publisher with a deep send buffer and explicit
//!   backpressure signaling
//! - `frame`: Ethernet/IPv4/UDP header walk for raw captures
//! - `capture`: background capture thread feeding decoded payloads to a
//!   callback, over either a joined multicast socket or an AF_PACKET tap

pub mod capture;
pub mod frame;
pub mod sender;

pub use capture::{CaptureConfig, CaptureStats, CaptureStatsSnapshot, PacketCapture};
pub use frame::{FrameDecoder, FrameError};
pub use sender::{SendError, SenderConfig, UdpMulticastSender};
