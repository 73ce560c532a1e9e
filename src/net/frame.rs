//! Raw Frame Decoding
//!
//! Walks an Ethernet frame down to the UDP payload for the AF_PACKET
//! capture path, which sees every frame on the interface and has to do its
//! own filtering. Kernel-delivered multicast datagrams never come through
//! here.
//!
//! ```text
//! [14B Ethernet][IPv4 header, IHL*4 bytes][8B UDP header][payload]
//! ```

use std::fmt;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

const ETHERTYPE_IPV4: u16 = 0x0800;
const IP_PROTO_UDP: u8 = 17;

/// Why a frame was not handed to the payload callback. `Truncated` is the
/// only variant worth logging; the rest are ordinary unrelated traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    Truncated { needed: usize, captured: usize },
    NotIpv4,
    NotUdp,
    OtherPort(u16),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Truncated { needed, captured } => {
                write!(f, "frame truncated: need {needed} bytes, captured {captured}")
            }
            FrameError::NotIpv4 => write!(f, "not an IPv4 frame"),
            FrameError::NotUdp => write!(f, "not a UDP packet"),
            FrameError::OtherPort(p) => write!(f, "destined for port {p}"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Stateless header walk bound to one destination port.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    port: u16,
}

impl FrameDecoder {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Extracts the UDP payload destined for our port, trimmed to the
    /// datagram's own length so Ethernet padding never reaches the FIX
    /// decoder.
    pub fn udp_payload<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8], FrameError> {
        if frame.len() < ETHERNET_HEADER_LEN + IPV4_MIN_HEADER_LEN {
            return Err(FrameError::Truncated {
                needed: ETHERNET_HEADER_LEN + IPV4_MIN_HEADER_LEN,
                captured: frame.len(),
            });
        }
        let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
        if ethertype != ETHERTYPE_IPV4 {
            return Err(FrameError::NotIpv4);
        }

        let ip = &frame[ETHERNET_HEADER_LEN..];
        if ip[9] != IP_PROTO_UDP {
            return Err(FrameError::NotUdp);
        }
        let ihl = ((ip[0] & 0x0F) as usize) * 4;
        if ihl < IPV4_MIN_HEADER_LEN {
            return Err(FrameError::NotIpv4);
        }
        if ip.len() < ihl + UDP_HEADER_LEN {
            return Err(FrameError::Truncated {
                needed: ETHERNET_HEADER_LEN + ihl + UDP_HEADER_LEN,
                captured: frame.len(),
            });
        }

        let udp = &ip[ihl..];
        let dest_port = u16::from_be_bytes([udp[2], udp[3]]);
        if dest_port != self.port {
            return Err(FrameError::OtherPort(dest_port));
        }
        let udp_len = u16::from_be_bytes([udp[4], udp[5]]) as usize;
        if udp_len < UDP_HEADER_LEN || udp.len() < udp_len {
            return Err(FrameError::Truncated {
                needed: ETHERNET_HEADER_LEN + ihl + udp_len.max(UDP_HEADER_LEN),
                captured: frame.len(),
            });
        }
        Ok(&udp[UDP_HEADER_LEN..udp_len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assembles an Ethernet/IPv4/UDP frame around `payload`.
    fn build_frame(ihl_words: u8, proto: u8, dest_port: u16, payload: &[u8], pad: usize) -> Vec<u8> {
        let ihl = ihl_words as usize * 4;
        let mut frame = Vec::new();
        // ethernet: dst mac, src mac, ethertype
        frame.extend_from_slice(&[0x02; 6]);
        frame.extend_from_slice(&[0x04; 6]);
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        // ipv4 header
        let mut ip = vec![0u8; ihl];
        ip[0] = 0x40 | ihl_words;
        ip[9] = proto;
        frame.extend_from_slice(&ip);
        // udp header
        let udp_len = (UDP_HEADER_LEN + payload.len()) as u16;
        frame.extend_from_slice(&41000u16.to_be_bytes()); // src port
        frame.extend_from_slice(&dest_port.to_be_bytes());
        frame.extend_from_slice(&udp_len.to_be_bytes());
        frame.extend_from_slice(&[0, 0]); // checksum unused
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&vec![0u8; pad]);
        frame
    }

    #[test]
    fn extracts_payload_from_minimal_frame() {
        let decoder = FrameDecoder::new(9999);
        let frame = build_frame(5, IP_PROTO_UDP, 9999, b"8=FIX.4.2", 0);
        assert_eq!(decoder.udp_payload(&frame).unwrap(), b"8=FIX.4.2");
    }

    #[test]
    fn honors_ip_options() {
        // IHL of 7 words = 28-byte IP header
        let decoder = FrameDecoder::new(9999);
        let frame = build_frame(7, IP_PROTO_UDP, 9999, b"payload", 0);
        assert_eq!(decoder.udp_payload(&frame).unwrap(), b"payload");
    }

    #[test]
    fn trims_ethernet_padding() {
        let decoder = FrameDecoder::new(9999);
        let frame = build_frame(5, IP_PROTO_UDP, 9999, b"tiny", 18);
        assert_eq!(decoder.udp_payload(&frame).unwrap(), b"tiny");
    }

    #[test]
    fn skips_non_ipv4_ethertype() {
        let decoder = FrameDecoder::new(9999);
        let mut frame = build_frame(5, IP_PROTO_UDP, 9999, b"x", 0);
        frame[12] = 0x86; // ARP-ish
        frame[13] = 0xDD;
        assert_eq!(decoder.udp_payload(&frame), Err(FrameError::NotIpv4));
    }

    #[test]
    fn skips_non_udp_protocol() {
        let decoder = FrameDecoder::new(9999);
        let frame = build_frame(5, 6, 9999, b"x", 0); // TCP
        assert_eq!(decoder.udp_payload(&frame), Err(FrameError::NotUdp));
    }

    #[test]
    fn skips_other_ports() {
        let decoder = FrameDecoder::new(9999);
        let frame = build_frame(5, IP_PROTO_UDP, 53, b"x", 0);
        assert_eq!(decoder.udp_payload(&frame), Err(FrameError::OtherPort(53)));
    }

    #[test]
    fn reports_truncation_with_sizes() {
        let decoder = FrameDecoder::new(9999);
        let frame = build_frame(5, IP_PROTO_UDP, 9999, b"full payload", 0);

        match decoder.udp_payload(&frame[..10]) {
            Err(FrameError::Truncated { needed, captured }) => {
                assert_eq!(needed, ETHERNET_HEADER_LEN + IPV4_MIN_HEADER_LEN);
                assert_eq!(captured, 10);
            }
            other => panic!("expected truncated, got {other:?}"),
        }

        // cut inside the udp payload: udp length now exceeds what is there
        let cut = frame.len() - 4;
        match decoder.udp_payload(&frame[..cut]) {
            Err(FrameError::Truncated { captured, .. }) => assert_eq!(captured, cut),
            other => panic!("expected truncated, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bogus_ihl() {
        let decoder = FrameDecoder::new(9999);
        let mut frame = build_frame(5, IP_PROTO_UDP, 9999, b"x", 0);
        frame[ETHERNET_HEADER_LEN] = 0x42; // IHL=2 words, below the minimum
        assert_eq!(decoder.udp_payload(&frame), Err(FrameError::NotIpv4));
    }
}
