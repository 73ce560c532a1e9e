//! FIX 4.2 Snapshot Codec
//!
//! Encoder and strict decoder for the one message this system speaks:
//! MarketDataSnapshotFullRefresh (35=W) with a two-entry bid/ask book.
//!
//! Wire layout (SOH separators shown as `|`):
//!
//! ```text
//! 8=FIX.4.2|9=<len>|35=W|55=<sym>|268=2|269=0|270=<bid>|271=<bidqty>|269=1|270=<ask>|271=<askqty>|10=<cks>|
//! ```
//!
//! `9=` counts the bytes between its own trailing SOH and the `10=` tag.
//! `10=` is the byte sum of everything before it, mod 256, always three
//! digits. Prices render with exactly two decimals.
//!
//! The decoder validates begin string, body length and checksum before it
//! looks at a single field, so a corrupt datagram is rejected with a precise
//! error instead of producing a half-filled quote.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::market::MarketTick;

/// FIX field separator.
pub const SOH: u8 = 0x01;
/// Protocol version tag 8 carries.
pub const BEGIN_STRING: &str = "FIX.4.2";

const PREFIX: &[u8] = b"8=FIX.4.2\x01";
/// `10=` + three digits + SOH.
const TRAILER_LEN: usize = 7;

/// Byte sum mod 256 of everything before the `10=` tag.
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Reusable snapshot encoder. `encode` hands back a slice into an internal
/// buffer, so a steady-state producer allocates nothing per tick once the
/// buffers have grown to message size.
pub struct SnapshotEncoder {
    body: Vec<u8>,
    msg: Vec<u8>,
}

impl SnapshotEncoder {
    pub fn new() -> Self {
        Self {
            body: Vec::with_capacity(96),
            msg: Vec::with_capacity(160),
        }
    }

    /// Encodes one tick. The returned slice is valid until the next call.
    pub fn encode(&mut self, tick: &MarketTick) -> &[u8] {
        use std::io::Write;

        // Vec writes are infallible
        self.body.clear();
        let _ = write!(
            self.body,
            "35=W\x0155={}\x01268=2\x01269=0\x01270={:.2}\x01271={}\x01269=1\x01270={:.2}\x01271={}\x01",
            tick.symbol.as_str(),
            tick.bid,
            tick.bid_size,
            tick.ask,
            tick.ask_size,
        );
        self.msg.clear();
        self.msg.extend_from_slice(PREFIX);
        let _ = write!(self.msg, "9={}\x01", self.body.len());
        self.msg.extend_from_slice(&self.body);
        let cks = checksum(&self.msg);
        let _ = write!(self.msg, "10={cks:03}\x01");
        &self.msg
    }
}

impl Default for SnapshotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded snapshot. The symbol is owned here because the analyzer keeps
/// snapshots beyond the life of the receive buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub bid_size: u32,
    pub ask_size: u32,
}

impl Snapshot {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixDecodeError {
    /// Fewer bytes than the framing requires.
    Truncated { len: usize },
    /// Tag 8 missing or not FIX.4.2.
    BadBeginString,
    /// Tag 9 does not agree with the bytes actually present.
    BodyLengthMismatch { declared: usize, available: usize },
    /// Tag 10 does not match the recomputed byte sum.
    ChecksumMismatch { declared: u8, computed: u8 },
    /// Tag 35 is present but not `W`.
    UnsupportedMsgType,
    /// A required tag never appeared in the body.
    MissingField(&'static str),
    /// A numeric field failed to parse.
    InvalidNumber,
    /// The message contains non-ASCII bytes.
    NonAscii,
}

impl fmt::Display for FixDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixDecodeError::Truncated { len } => {
                write!(f, "message truncated at {len} bytes")
            }
            FixDecodeError::BadBeginString => write!(f, "begin string is not {BEGIN_STRING}"),
            FixDecodeError::BodyLengthMismatch {
                declared,
                available,
            } => write!(
                f,
                "body length declares {declared} bytes but {available} are present"
            ),
            FixDecodeError::ChecksumMismatch { declared, computed } => write!(
                f,
                "checksum mismatch: declared {declared:03}, computed {computed:03}"
            ),
            FixDecodeError::UnsupportedMsgType => write!(f, "unsupported message type"),
            FixDecodeError::MissingField(tag) => write!(f, "missing required tag {tag}"),
            FixDecodeError::InvalidNumber => write!(f, "unparseable numeric field"),
            FixDecodeError::NonAscii => write!(f, "message contains non-ASCII bytes"),
        }
    }
}

impl std::error::Error for FixDecodeError {}

/// Decodes one datagram into a snapshot.
pub fn decode(bytes: &[u8]) -> Result<Snapshot, FixDecodeError> {
    if bytes.len() < PREFIX.len() {
        return Err(FixDecodeError::Truncated { len: bytes.len() });
    }
    if &bytes[..PREFIX.len()] != PREFIX {
        return Err(FixDecodeError::BadBeginString);
    }

    let rest = &bytes[PREFIX.len()..];
    if !rest.starts_with(b"9=") {
        return Err(FixDecodeError::MissingField("9"));
    }
    let soh_pos = rest
        .iter()
        .position(|&b| b == SOH)
        .ok_or(FixDecodeError::Truncated { len: bytes.len() })?;
    let declared = std::str::from_utf8(&rest[2..soh_pos])
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(FixDecodeError::InvalidNumber)?;

    let body_start = PREFIX.len() + soh_pos + 1;
    // a hostile declared length must not overflow the framing arithmetic
    let body_end = body_start
        .checked_add(declared)
        .filter(|end| end.checked_add(TRAILER_LEN).is_some())
        .ok_or(FixDecodeError::Truncated { len: bytes.len() })?;
    if bytes.len() < body_end + TRAILER_LEN {
        return Err(FixDecodeError::Truncated { len: bytes.len() });
    }
    if bytes.len() > body_end + TRAILER_LEN {
        return Err(FixDecodeError::BodyLengthMismatch {
            declared,
            available: bytes.len() - body_start - TRAILER_LEN,
        });
    }

    let trailer = &bytes[body_end..];
    if &trailer[..3] != b"10=" || trailer[6] != SOH {
        return Err(FixDecodeError::MissingField("10"));
    }
    let declared_cks = std::str::from_utf8(&trailer[3..6])
        .ok()
        .and_then(|s| s.parse::<u8>().ok())
        .ok_or(FixDecodeError::InvalidNumber)?;
    let computed = checksum(&bytes[..body_end]);
    if declared_cks != computed {
        return Err(FixDecodeError::ChecksumMismatch {
            declared: declared_cks,
            computed,
        });
    }

    parse_body(&bytes[body_start..body_end])
}

/// Side of the book the current `269=` group applies to.
#[derive(Clone, Copy, PartialEq)]
enum Side {
    Bid,
    Ask,
}

fn parse_body(body: &[u8]) -> Result<Snapshot, FixDecodeError> {
    let text = std::str::from_utf8(body).map_err(|_| FixDecodeError::NonAscii)?;
    if !text.is_ascii() {
        return Err(FixDecodeError::NonAscii);
    }

    let mut saw_msg_type = false;
    let mut symbol: Option<String> = None;
    let mut side: Option<Side> = None;
    let mut bid: Option<f64> = None;
    let mut ask: Option<f64> = None;
    let mut bid_size: Option<u32> = None;
    let mut ask_size: Option<u32> = None;

    for field in text.split('\x01') {
        let Some((tag, value)) = field.split_once('=') else {
            // empty trailing segment after the final SOH, or a stray
            // tagless field; the checksum already vouched for the bytes
            continue;
        };
        match tag {
            "35" => {
                if value != "W" {
                    return Err(FixDecodeError::UnsupportedMsgType);
                }
                saw_msg_type = true;
            }
            "55" => symbol = Some(value.to_string()),
            "268" => {
                value
                    .parse::<u32>()
                    .map_err(|_| FixDecodeError::InvalidNumber)?;
            }
            "269" => {
                side = match value {
                    "0" => Some(Side::Bid),
                    "1" => Some(Side::Ask),
                    _ => None,
                };
            }
            "270" => {
                let px: f64 =
                    fast_float::parse(value).map_err(|_| FixDecodeError::InvalidNumber)?;
                match side {
                    Some(Side::Bid) => bid = Some(px),
                    Some(Side::Ask) => ask = Some(px),
                    None => {}
                }
            }
            "271" => {
                let qty = value
                    .parse::<u32>()
                    .map_err(|_| FixDecodeError::InvalidNumber)?;
                match side {
                    Some(Side::Bid) => bid_size = Some(qty),
                    Some(Side::Ask) => ask_size = Some(qty),
                    None => {}
                }
            }
            _ => {}
        }
    }

    if !saw_msg_type {
        return Err(FixDecodeError::MissingField("35"));
    }
    let symbol = symbol.ok_or(FixDecodeError::MissingField("55"))?;
    let bid = bid.ok_or(FixDecodeError::MissingField("270"))?;
    let ask = ask.ok_or(FixDecodeError::MissingField("270"))?;
    let bid_size = bid_size.ok_or(FixDecodeError::MissingField("271"))?;
    let ask_size = ask_size.ok_or(FixDecodeError::MissingField("271"))?;

    Ok(Snapshot {
        symbol,
        bid,
        ask,
        bid_size,
        ask_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Symbol;

    fn golden_tick() -> MarketTick {
        MarketTick {
            symbol: Symbol::new("ESZ5").unwrap(),
            bid: 99.78,
            ask: 100.03,
            bid_size: 100,
            ask_size: 75,
        }
    }

    /// Builds a message around an arbitrary body with correct framing.
    fn build_raw(body: &str) -> Vec<u8> {
        let mut msg = format!("8=FIX.4.2\x019={}\x01{}", body.len(), body).into_bytes();
        let cks = msg.iter().map(|&b| b as u32).sum::<u32>() % 256;
        msg.extend_from_slice(format!("10={cks:03}\x01").as_bytes());
        msg
    }

    #[test]
    fn encodes_the_documented_layout() {
        let body = "35=W\x0155=ESZ5\x01268=2\x01269=0\x01270=99.78\x01271=100\x01\
                    269=1\x01270=100.03\x01271=75\x01";
        assert_eq!(body.len(), 67);

        let mut encoder = SnapshotEncoder::new();
        let msg = encoder.encode(&golden_tick());
        assert_eq!(msg, build_raw(body).as_slice());
    }

    #[test]
    fn declared_checksum_matches_independent_sum() {
        let mut encoder = SnapshotEncoder::new();
        let msg = encoder.encode(&golden_tick()).to_vec();
        let n = msg.len();
        assert_eq!(msg[n - 1], SOH);
        assert_eq!(&msg[n - TRAILER_LEN..n - 4], b"10=");
        let declared: u32 = std::str::from_utf8(&msg[n - 4..n - 1])
            .unwrap()
            .parse()
            .unwrap();
        let computed = msg[..n - TRAILER_LEN]
            .iter()
            .map(|&b| b as u32)
            .sum::<u32>()
            % 256;
        assert_eq!(declared, computed);
    }

    #[test]
    fn prices_always_carry_two_decimals() {
        let mut tick = golden_tick();
        tick.bid = 100.0;
        tick.ask = 100.5;
        let mut encoder = SnapshotEncoder::new();
        let msg = String::from_utf8(encoder.encode(&tick).to_vec()).unwrap();
        assert!(msg.contains("270=100.00\x01"));
        assert!(msg.contains("270=100.50\x01"));
    }

    #[test]
    fn encoder_buffer_is_reusable() {
        let mut encoder = SnapshotEncoder::new();
        let first = encoder.encode(&golden_tick()).to_vec();
        let mut other = golden_tick();
        other.bid = 101.23;
        other.ask = 101.29;
        let _ = encoder.encode(&other);
        let again = encoder.encode(&golden_tick()).to_vec();
        assert_eq!(first, again);
    }

    #[test]
    fn checksum_wraps_mod_256() {
        assert_eq!(checksum(&[0xFF, 0x02]), 1);
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(&[0x80, 0x80]), 0);
    }

    #[test]
    fn decode_recovers_the_original_quote() {
        let mut encoder = SnapshotEncoder::new();
        let snap = decode(encoder.encode(&golden_tick())).unwrap();
        assert_eq!(
            snap,
            Snapshot {
                symbol: "ESZ5".to_string(),
                bid: 99.78,
                ask: 100.03,
                bid_size: 100,
                ask_size: 75,
            }
        );
        assert!((snap.mid() - 99.905).abs() < 1e-9);
    }

    #[test]
    fn rejects_corrupted_byte() {
        let mut encoder = SnapshotEncoder::new();
        let mut msg = encoder.encode(&golden_tick()).to_vec();
        msg[20] ^= 0xFF;
        match decode(&msg) {
            Err(FixDecodeError::ChecksumMismatch { declared, computed }) => {
                assert_ne!(declared, computed);
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[test]
    fn rejects_truncation_at_any_early_point() {
        let mut encoder = SnapshotEncoder::new();
        let msg = encoder.encode(&golden_tick()).to_vec();
        for cut in [0, 5, 9, 12, 20, msg.len() - 1] {
            match decode(&msg[..cut]) {
                Err(FixDecodeError::Truncated { len }) => assert_eq!(len, cut),
                other => panic!("cut at {cut}: expected truncated, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_wrong_begin_string() {
        let mut encoder = SnapshotEncoder::new();
        let mut msg = encoder.encode(&golden_tick()).to_vec();
        msg[8] = b'4'; // FIX.4.2 -> FIX.4.4
        assert_eq!(decode(&msg), Err(FixDecodeError::BadBeginString));
    }

    #[test]
    fn rejects_understated_body_length() {
        let mut encoder = SnapshotEncoder::new();
        let msg = String::from_utf8(encoder.encode(&golden_tick()).to_vec()).unwrap();
        let msg = msg.replacen("9=67", "9=59", 1);
        assert_eq!(
            decode(msg.as_bytes()),
            Err(FixDecodeError::BodyLengthMismatch {
                declared: 59,
                available: 67,
            })
        );
    }

    #[test]
    fn rejects_absurd_body_length() {
        // usize::MAX: the framing arithmetic itself would overflow
        let msg = b"8=FIX.4.2\x019=18446744073709551615\x0135=W\x0110=000\x01";
        assert_eq!(
            decode(msg),
            Err(FixDecodeError::Truncated { len: msg.len() })
        );

        // huge but non-overflowing: just far more than the datagram holds
        let msg = b"8=FIX.4.2\x019=1152921504606846976\x0135=W\x0110=000\x01";
        assert_eq!(
            decode(msg),
            Err(FixDecodeError::Truncated { len: msg.len() })
        );
    }

    #[test]
    fn rejects_missing_body_length() {
        let msg = b"8=FIX.4.2\x0135=W\x0155=ESZ5\x0110=000\x01";
        assert_eq!(decode(msg), Err(FixDecodeError::MissingField("9")));
    }

    #[test]
    fn rejects_foreign_message_type() {
        let msg = build_raw("35=D\x0155=ESZ5\x01");
        assert_eq!(decode(&msg), Err(FixDecodeError::UnsupportedMsgType));
    }

    #[test]
    fn rejects_incomplete_book() {
        // ask entry has no size
        let msg = build_raw("35=W\x0155=ESZ5\x01268=2\x01269=0\x01270=99.78\x01271=100\x01269=1\x01270=100.03\x01");
        assert_eq!(decode(&msg), Err(FixDecodeError::MissingField("271")));

        let msg = build_raw("35=W\x01268=2\x01269=0\x01270=1.00\x01271=1\x01269=1\x01270=1.01\x01271=1\x01");
        assert_eq!(decode(&msg), Err(FixDecodeError::MissingField("55")));
    }

    #[test]
    fn rejects_unparseable_price() {
        let msg = build_raw("35=W\x0155=ESZ5\x01268=2\x01269=0\x01270=abc\x01271=100\x01269=1\x01270=100.03\x01271=75\x01");
        assert_eq!(decode(&msg), Err(FixDecodeError::InvalidNumber));
    }

    #[test]
    fn ignores_unknown_entry_types() {
        // 269=2 (trade) entries are skipped, bid/ask still resolve
        let msg = build_raw(
            "35=W\x0155=ESZ5\x01268=3\x01269=0\x01270=99.78\x01271=100\x01\
             269=2\x01270=99.90\x01271=5\x01269=1\x01270=100.03\x01271=75\x01",
        );
        let snap = decode(&msg).unwrap();
        assert_eq!(snap.bid, 99.78);
        assert_eq!(snap.ask, 100.03);
        assert_eq!(snap.bid_size, 100);
        assert_eq!(snap.ask_size, 75);
    }
}
