use std::time::Duration;

use crate::error::RadioTestError;

/// Broadcast destination accepted by every slaver.
pub const BROADCAST_ADDR: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modem {
    LoRa,
    Fsk,
}

/// Radio parameters for one run. Immutable while a run is in flight;
/// the command surface builds a fresh set for the next run.
#[derive(Debug, Clone)]
pub struct RadioParameters {
    pub frequency_hz: u32,
    pub tx_power_dbm: i8,
    pub modem: Modem,
    // LoRa
    pub spreading_factor: u8,
    pub bandwidth_hz: u32,
    pub coding_rate: u8,
    pub preamble_symbols: u16,
    // FSK
    pub fsk_bandwidth_hz: u32,
    pub fsk_deviation_hz: u32,
    pub fsk_datarate_bps: u32,
}

impl RadioParameters {
    /// Estimated transmission duration for a frame of `frame_len` bytes.
    /// Pure computation, used for the banner line only.
    pub fn time_on_air(&self, frame_len: usize) -> Duration {
        match self.modem {
            Modem::LoRa => lora_time_on_air(self, frame_len),
            // 8 bits per byte plus preamble/sync overhead, at the raw datarate
            Modem::Fsk => {
                let bits = (frame_len as f64 + 8.0) * 8.0;
                Duration::from_secs_f64(bits / self.fsk_datarate_bps.max(1) as f64)
            }
        }
    }
}

/// LoRa time-on-air per the SX12xx datasheet formula: symbol time is
/// 2^SF / BW, the preamble costs `n_preamble + 4.25` symbols, and the
/// payload symbol count is ceil'd and scaled by the coding rate.
fn lora_time_on_air(params: &RadioParameters, frame_len: usize) -> Duration {
    let sf = f64::from(params.spreading_factor);
    let bw = f64::from(params.bandwidth_hz.max(1));
    let cr = f64::from(params.coding_rate) + 4.0;

    let t_sym = 2.0_f64.powf(sf) / bw;
    let n_preamble = f64::from(params.preamble_symbols) + 4.25;

    // Low data rate optimization kicks in for slow symbol rates (>16 ms).
    let de = if t_sym > 0.016 { 1.0 } else { 0.0 };
    let pl = frame_len as f64;
    let payload_symbols =
        8.0 + (((8.0 * pl - 4.0 * sf + 28.0 + 16.0).max(0.0)) / (4.0 * (sf - 2.0 * de))).ceil() * cr;

    Duration::from_secs_f64((n_preamble + payload_symbols) * t_sym)
}

/// The half-duplex transceiver the engine drives. `send` and `receive`
/// are asynchronous: they return immediately and the outcome arrives as a
/// `RadioEvent` on the queue the implementation was constructed with. An
/// implementation must return the radio to idle before posting a
/// completion, so the engine can arm the next operation right away.
pub trait Transceiver {
    /// Apply channel and modem configuration. Must be called once per run
    /// before any send/receive; failure is fatal for the run.
    fn configure(&mut self, params: &RadioParameters) -> Result<(), RadioTestError>;

    /// Hardware health check (`probe` command).
    fn check(&mut self) -> bool;

    /// Transmit one frame. Completion: `TxDone` or `TxTimeout`.
    fn send(&mut self, frame: &[u8]);

    /// Arm a reception. `None` means continuous (no timeout). Completion:
    /// `RxDone`, `RxTimeout`, or `RxError`.
    fn receive(&mut self, timeout: Option<Duration>);

    /// Emit an unmodulated carrier for `timeout` (`cw` command).
    fn set_tx_continuous_wave(&mut self, frequency_hz: u32, power_dbm: i8, timeout: Duration);
}
