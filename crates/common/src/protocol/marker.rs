use crate::constants::MARKER_LEN;

/// Fixed-width status tokens exchanged on a tunnel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Prefix of every envelope: a length and payload follow
    Sign,
    /// Credential rejected; the relay closes the connection afterwards
    VerifyFailed,
    /// Credential accepted; the connection is now idle in the relay's pool
    VerifySucceeded,
    /// The peer could not process the last envelope
    ServerError,
}

impl Marker {
    pub const fn as_bytes(self) -> &'static [u8; MARKER_LEN] {
        match self {
            Marker::Sign => b"sign",
            Marker::VerifyFailed => b"FAIL",
            Marker::VerifySucceeded => b"OKAY",
            Marker::ServerError => b"SERR",
        }
    }

    pub fn from_bytes(bytes: [u8; MARKER_LEN]) -> Option<Self> {
        match &bytes {
            b"sign" => Some(Marker::Sign),
            b"FAIL" => Some(Marker::VerifyFailed),
            b"OKAY" => Some(Marker::VerifySucceeded),
            b"SERR" => Some(Marker::ServerError),
            _ => None,
        }
    }
}
