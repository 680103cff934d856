//! The opaque identifier the server assigns to each connected principal.

use std::fmt;

/// A stable, opaque 32-byte identifier for a connected principal.
///
/// The server mints these; the client only ever compares and displays them.
/// Comparison is by value, never by reference or handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    bytes: [u8; 32],
}

/// Number of hex characters shown when abbreviating an identity for display.
pub const ABBREVIATED_HEX_LEN: usize = 8;

impl Identity {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Identity { bytes }
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let decoded = hex::decode(hex).ok()?;
        let bytes: [u8; 32] = decoded.try_into().ok()?;
        Some(Identity { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// The full lowercase hex rendering, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// A short prefix of the hex rendering, used as a display-name fallback
    /// for principals that never set a name or whose row is no longer visible.
    pub fn to_abbreviated_hex(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(ABBREVIATED_HEX_LEN);
        hex
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.to_abbreviated_hex())
    }
}
