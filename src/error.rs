use thiserror::Error;

/// Error taxonomy for a test run. Only `Configuration` is fatal; the
/// recoverable kinds are absorbed into statistics by the engine and exist
/// so that the codec and transceiver can name what went wrong.
#[derive(Debug, Error)]
pub enum RadioTestError {
    /// Transceiver init/configure failed. Aborts the run before the event
    /// loop is entered.
    #[error("radio configuration failed: {0}")]
    Configuration(String),

    /// No completion within the hardware timeout (RxTimeout/TxTimeout).
    #[error("transport timeout")]
    TransportTimeout,

    /// Corrupt frame, or a frame that is not part of this test protocol.
    #[error("frame error: {0}")]
    Frame(String),

    /// Frame too short to contain the probe header. Logged as a
    /// diagnostic, never counted toward loss.
    #[error("protocol mismatch: frame of {0} bytes is shorter than the probe header")]
    ProtocolMismatch(usize),
}
