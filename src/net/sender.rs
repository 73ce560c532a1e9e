//! UDP Multicast Sender
//!
//! Thin wrapper over a UDP socket aimed at one destination. Construction
//! applies the egress tuning (4 MiB send buffer, TTL, loopback, optional
//! egress interface); `send` classifies failures into transient
//! backpressure, which the caller is expected to retry, and hard errors,
//! which it is not.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::os::unix::io::AsRawFd;

use tracing::{debug, warn};

/// Default multicast group for the feed.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 1, 1);
/// Default destination port.
pub const DEFAULT_PORT: u16 = 9999;
/// Kernel send buffer request; absorbs bursts when the producer outruns
/// the NIC.
pub const SEND_BUFFER_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub dest: SocketAddrV4,
    /// Egress interface for multicast, `None` for the routing default.
    pub interface: Option<Ipv4Addr>,
    pub multicast_ttl: u32,
    pub multicast_loop: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            dest: SocketAddrV4::new(DEFAULT_GROUP, DEFAULT_PORT),
            interface: None,
            multicast_ttl: 1,
            multicast_loop: true,
        }
    }
}

/// Why a send did not complete.
#[derive(Debug)]
pub enum SendError {
    /// Kernel queue full (ENOBUFS/EAGAIN). Retry after a short pause.
    Backpressure(io::Error),
    /// Anything else. Retrying will not help.
    Io(io::Error),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Backpressure(e) => write!(f, "send backpressure: {e}"),
            SendError::Io(e) => write!(f, "send failed: {e}"),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SendError::Backpressure(e) | SendError::Io(e) => Some(e),
        }
    }
}

pub struct UdpMulticastSender {
    socket: UdpSocket,
    dest: SocketAddrV4,
}

impl UdpMulticastSender {
    /// Binds an ephemeral socket and applies egress tuning. A send buffer
    /// the kernel refuses to grow is only a warning; everything else is
    /// fatal here rather than surfacing later as per-packet errors.
    pub fn new(config: &SenderConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        if let Err(e) = set_send_buffer(&socket, SEND_BUFFER_BYTES) {
            warn!(
                requested = SEND_BUFFER_BYTES,
                "could not enlarge send buffer, drops possible under load: {e}"
            );
        }
        if config.dest.ip().is_multicast() {
            socket.set_multicast_ttl_v4(config.multicast_ttl)?;
            socket.set_multicast_loop_v4(config.multicast_loop)?;
            if let Some(iface) = config.interface {
                set_multicast_interface(&socket, iface)?;
                debug!(interface = %iface, "multicast egress pinned");
            }
        }
        debug!(dest = %config.dest, "udp sender ready");
        Ok(Self {
            socket,
            dest: config.dest,
        })
    }

    /// Sends one datagram. Returns the byte count the kernel accepted;
    /// callers treat a short count as a malformed datagram on the wire,
    /// not something to retry.
    pub fn send(&self, payload: &[u8]) -> Result<usize, SendError> {
        match self.socket.send_to(payload, self.dest) {
            Ok(n) => Ok(n),
            Err(e) if is_backpressure(&e) => Err(SendError::Backpressure(e)),
            Err(e) => Err(SendError::Io(e)),
        }
    }

    pub fn dest(&self) -> SocketAddrV4 {
        self.dest
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }
}

fn is_backpressure(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    matches!(e.raw_os_error(), Some(code) if code == libc::ENOBUFS || code == libc::EAGAIN)
}

fn set_send_buffer(socket: &UdpSocket, bytes: usize) -> io::Result<()> {
    let val: libc::c_int = bytes as libc::c_int;
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            &val as *const _ as *const libc::c_void,
            std::mem::size_of_val(&val) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// `IP_MULTICAST_IF`; std has no portable setter for the egress interface.
fn set_multicast_interface(socket: &UdpSocket, iface: Ipv4Addr) -> io::Result<()> {
    let addr = libc::in_addr {
        s_addr: u32::from(iface).to_be(),
    };
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_MULTICAST_IF,
            &addr as *const _ as *const libc::c_void,
            std::mem::size_of_val(&addr) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sends_full_datagram_over_loopback() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let config = SenderConfig {
            dest: SocketAddrV4::new(Ipv4Addr::LOCALHOST, port),
            ..SenderConfig::default()
        };
        let sender = UdpMulticastSender::new(&config).unwrap();
        let payload = b"8=FIX.4.2\x019=0\x0110=000\x01";
        let sent = sender.send(payload).unwrap();
        assert_eq!(sent, payload.len());

        let mut buf = [0u8; 128];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], payload);
    }

    #[test]
    fn multicast_construction_applies_opts() {
        // no datagram leaves the host: just exercise the setup path
        let config = SenderConfig::default();
        let sender = UdpMulticastSender::new(&config).unwrap();
        assert_eq!(sender.dest().ip(), &DEFAULT_GROUP);
        assert_eq!(sender.dest().port(), DEFAULT_PORT);
    }

    #[test]
    fn backpressure_classification() {
        let would_block = io::Error::new(io::ErrorKind::WouldBlock, "try again");
        assert!(is_backpressure(&would_block));
        let enobufs = io::Error::from_raw_os_error(libc::ENOBUFS);
        assert!(is_backpressure(&enobufs));
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "nope");
        assert!(!is_backpressure(&refused));
    }
}
