/// Errors produced by the Orion 1000 protocol engine.
///
/// The variants mirror the protocol's failure taxonomy: frame shape problems
/// (`Framing`), transit corruption (`Checksum`), link problems (`Transport`,
/// `Io`, `Timeout`, `ConnectionBroken`), command routing problems
/// (`UnsupportedCommand`, `ResponseMismatch`) and payload interpretation
/// problems (`PayloadLength`, `Parse`).
///
/// Only the transport layer recovers from errors locally (reconnect/retry on
/// connection-reset class failures); everything else propagates to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed frame shape: bad start/end byte, bad total length or a
    /// buffer too short to contain a frame at all.
    #[error("framing error: {0}")]
    Framing(String),
    /// Frame shape was valid but the transmitted checksum disagrees with the
    /// recomputed one: the data was corrupted in transit.
    #[error("checksum mismatch: calculated {calculated:#04x}, received {received:#04x}")]
    Checksum { calculated: u8, received: u8 },
    /// Connection could not be established, or an I/O failure occurred that
    /// is not specifically a timeout.
    #[error("transport error: {0}")]
    Transport(String),
    /// An OS-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A read deadline elapsed. Carries the progress made for diagnosability.
    #[error("timeout reading {needed} bytes (got {got})")]
    Timeout { needed: usize, got: usize },
    /// The peer stopped delivering bytes without an OS-level error: the
    /// configured run of consecutive empty reads was exceeded.
    #[error("connection broken after {empty_reads} consecutive empty reads")]
    ConnectionBroken { empty_reads: u32 },
    /// The requested command identifier is not in the registry.
    #[error("unsupported command: {0:#04x}")]
    UnsupportedCommand(u8),
    /// The response's echoed command bytes do not match the request's. On a
    /// half-duplex link this means request/response desynchronization.
    #[error("response command mismatch: expected {expected:#06x}, received {received:#06x}")]
    ResponseMismatch { expected: u16, received: u16 },
    /// A response payload has the wrong length for its command.
    #[error("invalid {command} payload length: expected {expected}, got {actual}")]
    PayloadLength {
        command: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A required sub-field overran the available bytes or could not be
    /// interpreted.
    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    /// True for the timeout specialization of transport errors. The generic
    /// retry wrapper keys on this.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}
