use crossbeam_channel::{Receiver, Sender, unbounded};

/// One tag per transceiver completion, plus the engine's own transitions.
///
/// `RxDone` carries its own payload copy: completion context and engine
/// never share a buffer, so a second reception cannot clobber a frame the
/// engine is still looking at.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// Start (or restart) a test run: reset stats, configure the radio.
    Init,
    /// Master only: send the next probe, or report when the budget is spent.
    TxStart,
    /// Transmission completed.
    TxDone,
    /// Transmission never completed within the hardware timeout.
    TxTimeout,
    /// A frame was received.
    RxDone {
        payload: Vec<u8>,
        rssi: i16,
        snr: i8,
    },
    /// Nothing received within the armed timeout.
    RxTimeout,
    /// A frame was detected but could not be decoded.
    RxError,
}

pub type EventSender = Sender<RadioEvent>;
pub type EventReceiver = Receiver<RadioEvent>;

/// The mailbox between completion context and the engine: FIFO, posting
/// never blocks the producer, no coalescing.
pub fn event_queue() -> (EventSender, EventReceiver) {
    unbounded()
}
