use std::fmt;
use std::time::Instant;

/// RSSI value meaning "no sample yet" (dBm).
pub const RSSI_UNSET: i16 = -255;
/// SNR value meaning "no sample yet" (dB).
pub const SNR_UNSET: i8 = -128;

/// Running link statistics for one test run. Owned by the engine; every
/// update comes from its single processing step, so there are no
/// concurrent writers.
#[derive(Debug, Clone)]
pub struct LinkStats {
    pub tx_sent: u32,
    pub rx_correct: u32,
    pub rx_timeout: u32,
    pub rx_error: u32,

    rssi_min: i16,
    rssi_max: i16,
    rssi_sum: i64,
    snr_min: i8,
    snr_max: i8,
    snr_sum: i64,

    pub last_tx: Option<Instant>,
    pub last_rx: Option<Instant>,
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            tx_sent: 0,
            rx_correct: 0,
            rx_timeout: 0,
            rx_error: 0,
            rssi_min: RSSI_UNSET,
            rssi_max: RSSI_UNSET,
            rssi_sum: 0,
            snr_min: SNR_UNSET,
            snr_max: SNR_UNSET,
            snr_sum: 0,
            last_tx: None,
            last_rx: None,
        }
    }

    /// Back to the unset sentinels. Called on every Init.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn record_tx(&mut self) {
        self.tx_sent += 1;
        self.last_tx = Some(Instant::now());
    }

    /// One accepted reception. The first sample initializes both min and
    /// max, so the unset sentinels never take part in a comparison.
    pub fn record_rx(&mut self, rssi: i16, snr: i8) {
        self.rx_correct += 1;
        self.last_rx = Some(Instant::now());

        if self.rssi_max == RSSI_UNSET {
            self.rssi_min = rssi;
            self.rssi_max = rssi;
        } else if rssi < self.rssi_min {
            self.rssi_min = rssi;
        } else if rssi > self.rssi_max {
            self.rssi_max = rssi;
        }

        if self.snr_max == SNR_UNSET {
            self.snr_min = snr;
            self.snr_max = snr;
        } else if snr < self.snr_min {
            self.snr_min = snr;
        } else if snr > self.snr_max {
            self.snr_max = snr;
        }

        self.rssi_sum += i64::from(rssi);
        self.snr_sum += i64::from(snr);
    }

    pub fn record_timeout(&mut self) {
        self.rx_timeout += 1;
        self.last_rx = Some(Instant::now());
    }

    pub fn record_error(&mut self) {
        self.rx_error += 1;
    }

    /// Milliseconds between the last transmit and the last receive event;
    /// the per-reply round trip when read right after a reception.
    pub fn round_trip_ms(&self) -> u128 {
        match (self.last_tx, self.last_rx) {
            (Some(tx), Some(rx)) => rx.saturating_duration_since(tx).as_millis(),
            _ => 0,
        }
    }

    /// End-of-run summary. `frame_len` is the probe frame length used for
    /// the byte totals (header overhead added on top, as the original
    /// shell accounted it).
    pub fn snapshot(&self, frame_len: usize, master_addr: u32, slaver_addr: u32) -> Report {
        let per_packet = (frame_len + crate::frame::HEADER_LEN) as u64;
        let signal = if self.rx_correct > 0 {
            let n = i64::from(self.rx_correct);
            Some(SignalSummary {
                rssi_min: self.rssi_min,
                rssi_max: self.rssi_max,
                rssi_avg: self.rssi_sum / n,
                snr_min: self.snr_min,
                snr_max: self.snr_max,
                snr_avg: self.snr_sum / n,
            })
        } else {
            None
        };
        Report {
            master_addr,
            slaver_addr,
            tx_sent: self.tx_sent,
            rx_correct: self.rx_correct,
            lost: self.rx_timeout + self.rx_error,
            loss_pct: if self.tx_sent > 0 {
                (100.0 - (f64::from(self.rx_correct) / f64::from(self.tx_sent)) * 100.0) as u32
            } else {
                0
            },
            tx_total_bytes: u64::from(self.tx_sent) * per_packet,
            rx_total_bytes: u64::from(self.rx_correct) * per_packet,
            signal,
        }
    }
}

/// RSSI/SNR extrema and averages; absent when no reply was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSummary {
    pub rssi_min: i16,
    pub rssi_max: i16,
    pub rssi_avg: i64,
    pub snr_min: i8,
    pub snr_max: i8,
    pub snr_avg: i64,
}

/// Final report of a master run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub master_addr: u32,
    pub slaver_addr: u32,
    pub tx_sent: u32,
    pub rx_correct: u32,
    pub lost: u32,
    pub loss_pct: u32,
    pub tx_total_bytes: u64,
    pub rx_total_bytes: u64,
    pub signal: Option<SignalSummary>,
}

/// Whole-KByte / remainder-byte pair, the original shell's rendering.
fn kbyte_pair(bytes: u64) -> (u64, u64) {
    (bytes >> 10, bytes & 0x3FF)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tx_kb, tx_rem) = kbyte_pair(self.tx_total_bytes);
        let (rx_kb, rx_rem) = kbyte_pair(self.rx_total_bytes);
        writeln!(
            f,
            "Ping statistics for [MA=0x{:08X} <-> SA=0x{:08X}]:",
            self.master_addr, self.slaver_addr
        )?;
        writeln!(
            f,
            "-> Tx packets: sent = {}, tx_total = {}.{} KByte",
            self.tx_sent, tx_kb, tx_rem
        )?;
        writeln!(
            f,
            "-> Rx packets: received = {}, lost = {}, loss = {}%, rx_total = {}.{} KByte",
            self.rx_correct, self.lost, self.loss_pct, rx_kb, rx_rem
        )?;
        match &self.signal {
            Some(s) => {
                writeln!(
                    f,
                    "--> Rx rssi: max = {} dBm, min = {} dBm, avg = {} dBm",
                    s.rssi_max, s.rssi_min, s.rssi_avg
                )?;
                writeln!(
                    f,
                    "--> Rx snr : max = {} dB, min = {} dB, avg = {} dB",
                    s.snr_max, s.snr_min, s.snr_avg
                )?;
            }
            None => {
                writeln!(f, "--> Rx rssi: no data")?;
                writeln!(f, "--> Rx snr : no data")?;
            }
        }
        write!(f, "====== Ping Test Finished ======")
    }
}
