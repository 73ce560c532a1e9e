//! Tick and Symbol Types
//!
//! `MarketTick` is the value that travels through the SPSC queues, so it is
//! `Copy` and holds the symbol inline instead of on the heap. Symbols are
//! short ASCII tags (`ESZ5`, `NQH6`) validated once at the edge; everything
//! downstream can embed them in FIX fields without re-checking.

use std::fmt;
use std::str::FromStr;

/// Maximum symbol length in bytes.
pub const SYMBOL_LEN: usize = 8;

/// Fixed-capacity inline symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol {
    bytes: [u8; SYMBOL_LEN],
    len: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolError {
    Empty,
    TooLong(usize),
    InvalidChar(char),
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolError::Empty => write!(f, "symbol is empty"),
            SymbolError::TooLong(n) => {
                write!(f, "symbol is {n} bytes, max is {SYMBOL_LEN}")
            }
            SymbolError::InvalidChar(c) => {
                write!(f, "symbol contains invalid character {c:?}")
            }
        }
    }
}

impl std::error::Error for SymbolError {}

impl Symbol {
    /// Validates and copies `s`. Accepts printable ASCII except `=`, which
    /// would corrupt a FIX tag-value pair.
    pub fn new(s: &str) -> Result<Self, SymbolError> {
        if s.is_empty() {
            return Err(SymbolError::Empty);
        }
        if s.len() > SYMBOL_LEN {
            return Err(SymbolError::TooLong(s.len()));
        }
        for c in s.chars() {
            if !c.is_ascii_graphic() || c == '=' {
                return Err(SymbolError::InvalidChar(c));
            }
        }
        let mut bytes = [0u8; SYMBOL_LEN];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self {
            bytes,
            len: s.len() as u8,
        })
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: the constructor only accepts ASCII bytes.
        unsafe { std::str::from_utf8_unchecked(&self.bytes[..self.len as usize]) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.as_str())
    }
}

/// One two-sided quote, produced by the synthesizer and consumed by the FIX
/// encoder. 40 bytes, `Copy`, no heap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketTick {
    pub symbol: Symbol,
    pub bid: f64,
    pub ask: f64,
    pub bid_size: u32,
    pub ask_size: u32,
}

impl MarketTick {
    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    #[inline]
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.bid > 0.0 && self.ask >= self.bid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_roundtrips_through_str() {
        let sym = Symbol::new("ESZ5").unwrap();
        assert_eq!(sym.as_str(), "ESZ5");
        assert_eq!(sym.len(), 4);
        assert_eq!(sym.to_string(), "ESZ5");
        assert_eq!("ESZ5".parse::<Symbol>().unwrap(), sym);
    }

    #[test]
    fn symbol_accepts_max_length() {
        let sym = Symbol::new("ABCDEFGH").unwrap();
        assert_eq!(sym.as_str(), "ABCDEFGH");
    }

    #[test]
    fn symbol_rejects_bad_input() {
        assert_eq!(Symbol::new(""), Err(SymbolError::Empty));
        assert_eq!(Symbol::new("ABCDEFGHI"), Err(SymbolError::TooLong(9)));
        assert_eq!(Symbol::new("ES=Z5"), Err(SymbolError::InvalidChar('=')));
        assert_eq!(Symbol::new("ES Z5"), Err(SymbolError::InvalidChar(' ')));
        assert_eq!(Symbol::new("ES\u{1}5"), Err(SymbolError::InvalidChar('\u{1}')));
    }

    #[test]
    fn tick_derives() {
        let tick = MarketTick {
            symbol: Symbol::new("ESZ5").unwrap(),
            bid: 99.78,
            ask: 100.03,
            bid_size: 100,
            ask_size: 75,
        };
        assert!((tick.mid() - 99.905).abs() < 1e-9);
        assert!((tick.spread() - 0.25).abs() < 1e-9);
        assert!(tick.is_valid());

        let crossed = MarketTick { ask: 99.0, ..tick };
        assert!(!crossed.is_valid());
    }
}
