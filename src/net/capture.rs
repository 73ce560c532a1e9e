//! Packet Capture
//!
//! Background thread that pulls feed traffic off the wire and hands each
//! payload to a caller-supplied closure. Two sources:
//! - `multicast`: a joined UDP socket; the kernel filters, we see payloads
//! - `raw_socket` (Linux): an AF_PACKET tap; we see whole frames and run
//!   them through `FrameDecoder` ourselves
//!
//! The thread polls with a read timeout so `stop()` converges within one
//! timeout interval. Dropping the capture stops it.

use std::io;
use std::net::{Ipv4Addr, UdpSocket};
use std::os::unix::io::FromRawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};
#[cfg(target_os = "linux")]
use tracing::warn;

#[cfg(target_os = "linux")]
use crate::net::frame::{FrameDecoder, FrameError};
use crate::net::sender::{DEFAULT_GROUP, DEFAULT_PORT};

const READ_TIMEOUT: Duration = Duration::from_secs(1);
const RECV_BUFFER_LEN: usize = 4096;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Interface to join the group on; unspecified lets the kernel choose.
    pub interface: Ipv4Addr,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// Counters the capture thread updates as it runs.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub packets: AtomicU64,
    pub bytes: AtomicU64,
    pub truncated_frames: AtomicU64,
    pub skipped_frames: AtomicU64,
    pub recv_errors: AtomicU64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CaptureStatsSnapshot {
    pub packets: u64,
    pub bytes: u64,
    pub truncated_frames: u64,
    pub skipped_frames: u64,
    pub recv_errors: u64,
}

impl CaptureStats {
    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            truncated_frames: self.truncated_frames.load(Ordering::Relaxed),
            skipped_frames: self.skipped_frames.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
        }
    }
}

pub struct PacketCapture {
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PacketCapture {
    /// Captures via a bound and (for multicast groups) joined UDP socket.
    pub fn multicast<F>(config: &CaptureConfig, callback: F) -> io::Result<Self>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let socket = bind_reuse(config.port)?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        if config.group.is_multicast() {
            socket.join_multicast_v4(&config.group, &config.interface)?;
            debug!(group = %config.group, interface = %config.interface, "joined multicast group");
        }

        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(CaptureStats::default());
        let loop_running = running.clone();
        let loop_stats = stats.clone();
        let handle = thread::Builder::new()
            .name("tickcast-capture".to_string())
            .spawn(move || multicast_loop(socket, loop_running, loop_stats, callback))?;
        info!(port = config.port, "multicast capture started");

        Ok(Self {
            running,
            stats,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Captures every frame on the host via AF_PACKET and filters in user
    /// space with `FrameDecoder`. Needs CAP_NET_RAW.
    #[cfg(target_os = "linux")]
    pub fn raw_socket<F>(config: &CaptureConfig, callback: F) -> io::Result<Self>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let socket = RawPacketSocket::open()?;
        let decoder = FrameDecoder::new(config.port);

        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(CaptureStats::default());
        let loop_running = running.clone();
        let loop_stats = stats.clone();
        let handle = thread::Builder::new()
            .name("tickcast-capture-raw".to_string())
            .spawn(move || raw_loop(socket, decoder, loop_running, loop_stats, callback))?;
        info!(port = config.port, "raw capture started");

        Ok(Self {
            running,
            stats,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Signals the capture thread and joins it. Returns once the thread has
    /// observed the flag, at most one read timeout later.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
            info!("capture thread stopped");
        }
    }
}

impl Drop for PacketCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn multicast_loop<F>(
    socket: UdpSocket,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    mut callback: F,
) where
    F: FnMut(&[u8]),
{
    let mut buf = [0u8; RECV_BUFFER_LEN];
    while running.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            Ok(n) => {
                stats.packets.fetch_add(1, Ordering::Relaxed);
                stats.bytes.fetch_add(n as u64, Ordering::Relaxed);
                callback(&buf[..n]);
            }
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                stats.recv_errors.fetch_add(1, Ordering::Relaxed);
                debug!("capture recv error: {e}");
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn raw_loop<F>(
    socket: RawPacketSocket,
    decoder: FrameDecoder,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    mut callback: F,
) where
    F: FnMut(&[u8]),
{
    let mut buf = [0u8; RECV_BUFFER_LEN];
    while running.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            Ok(n) => match decoder.udp_payload(&buf[..n]) {
                Ok(payload) => {
                    stats.packets.fetch_add(1, Ordering::Relaxed);
                    stats.bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
                    callback(payload);
                }
                Err(FrameError::Truncated { needed, captured }) => {
                    stats.truncated_frames.fetch_add(1, Ordering::Relaxed);
                    warn!(needed, captured, "dropping truncated frame");
                }
                Err(_) => {
                    // unrelated traffic, the normal case on a busy host
                    stats.skipped_frames.fetch_add(1, Ordering::Relaxed);
                }
            },
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                stats.recv_errors.fetch_add(1, Ordering::Relaxed);
                debug!("raw capture recv error: {e}");
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Binds a UDP socket with SO_REUSEADDR so several analyzers can share the
/// feed port on one host. std cannot set options before bind, hence libc.
fn bind_reuse(port: u16) -> io::Result<UdpSocket> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let one: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of_val(&one) as libc::socklen_t,
        )
    };
    if ret != 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }
    let addr = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: port.to_be(),
        sin_addr: libc::in_addr {
            s_addr: libc::INADDR_ANY,
        },
        sin_zero: [0; 8],
    };
    let ret = unsafe {
        libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of_val(&addr) as libc::socklen_t,
        )
    };
    if ret != 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }
    // SAFETY: fd is a freshly created socket we exclusively own.
    Ok(unsafe { UdpSocket::from_raw_fd(fd) })
}

/// AF_PACKET/SOCK_RAW socket receiving every frame on the host.
#[cfg(target_os = "linux")]
struct RawPacketSocket {
    fd: libc::c_int,
}

#[cfg(target_os = "linux")]
impl RawPacketSocket {
    fn open() -> io::Result<Self> {
        let protocol = (libc::ETH_P_ALL as u16).to_be() as libc::c_int;
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, protocol) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let tv = libc::timeval {
            tv_sec: READ_TIMEOUT.as_secs() as libc::time_t,
            tv_usec: 0,
        };
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const _ as *const libc::c_void,
                std::mem::size_of_val(&tv) as libc::socklen_t,
            )
        };
        if ret != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        Ok(Self { fd })
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: fd stays open for self's lifetime, buf bounds are passed.
        let n = unsafe {
            libc::recv(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

#[cfg(target_os = "linux")]
impl Drop for RawPacketSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddrV4;

    #[test]
    fn capture_receives_loopback_datagrams() {
        let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let config = CaptureConfig {
            group: Ipv4Addr::LOCALHOST,
            port,
            interface: Ipv4Addr::UNSPECIFIED,
        };
        let capture = PacketCapture::multicast(&config, move |payload| {
            sink.lock().push(payload.to_vec());
        })
        .unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let dest = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
        for i in 0..5u8 {
            sender.send_to(&[i; 16], dest).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while received.lock().len() < 5 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        capture.stop();

        let got = received.lock();
        assert_eq!(got.len(), 5, "expected 5 datagrams, got {}", got.len());
        assert_eq!(got[0], vec![0u8; 16]);
        assert_eq!(capture.stats().snapshot().packets, 5);
        assert_eq!(capture.stats().snapshot().bytes, 80);
    }

    #[test]
    fn stop_is_idempotent_and_drop_safe() {
        let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let config = CaptureConfig {
            group: Ipv4Addr::LOCALHOST,
            port,
            interface: Ipv4Addr::UNSPECIFIED,
        };
        let capture = PacketCapture::multicast(&config, |_| {}).unwrap();
        assert!(capture.is_running());
        capture.stop();
        assert!(!capture.is_running());
        capture.stop();
        // drop runs stop a third time
    }
}
