use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::RadioTestError;
use crate::event::{EventSender, RadioEvent};
use crate::radio::{RadioParameters, Transceiver};

/// Channel model for the simulated link: applied to each probe as it is
/// "transmitted" toward the built-in echo peer.
#[derive(Debug, Clone)]
pub struct SimLink {
    /// Probability the echo never comes back (probe or reply lost).
    pub loss: f64,
    /// Probability the reply arrives damaged (surfaces as RxError).
    pub corrupt: f64,
    /// Synthesized reply RSSI range, dBm.
    pub rssi_dbm: (i16, i16),
    /// Synthesized reply SNR range, dB.
    pub snr_db: (i8, i8),
    /// Fixed seed for reproducible runs; None derives one from entropy.
    pub seed: Option<u64>,
}

impl Default for SimLink {
    fn default() -> Self {
        Self {
            loss: 0.0,
            corrupt: 0.0,
            rssi_dbm: (-95, -40),
            snr_db: (-5, 10),
            seed: None,
        }
    }
}

/// What the armed receive will observe, decided at send time.
#[derive(Debug)]
enum Pending {
    Reply(Vec<u8>),
    Corrupt,
    Nothing,
}

/// A transceiver with a perfect echo peer on the other end of a lossy
/// simulated channel. No hardware involved: `send` schedules TxDone after
/// the frame's time-on-air, and the peer's echo (if it survives the link)
/// is delivered by the next `receive`. Completions run on short-lived
/// timer threads whose only action is posting one event, mirroring the
/// interrupt-context discipline of a real driver.
pub struct SimRadio {
    events: EventSender,
    link: SimLink,
    rng: StdRng,
    params: Option<RadioParameters>,
    pending: Pending,
}

impl SimRadio {
    pub fn new(events: EventSender, link: SimLink) -> Self {
        let rng = match link.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let link = SimLink {
            loss: link.loss.clamp(0.0, 1.0),
            corrupt: link.corrupt.clamp(0.0, 1.0),
            rssi_dbm: (
                link.rssi_dbm.0.min(link.rssi_dbm.1),
                link.rssi_dbm.0.max(link.rssi_dbm.1),
            ),
            snr_db: (
                link.snr_db.0.min(link.snr_db.1),
                link.snr_db.0.max(link.snr_db.1),
            ),
            ..link
        };
        Self {
            events,
            link,
            rng,
            params: None,
            pending: Pending::Nothing,
        }
    }

    fn time_on_air(&self, frame_len: usize) -> Duration {
        self.params
            .as_ref()
            .map(|p| p.time_on_air(frame_len))
            .unwrap_or_default()
    }

    fn post_after(&self, delay: Duration, event: RadioEvent) {
        let events = self.events.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = events.send(event);
        });
    }
}

impl Transceiver for SimRadio {
    fn configure(&mut self, params: &RadioParameters) -> Result<(), RadioTestError> {
        if params.frequency_hz == 0 {
            return Err(RadioTestError::Configuration("frequency is zero".into()));
        }
        debug!(
            "sim radio configured: freq={} Hz, power={} dBm",
            params.frequency_hz, params.tx_power_dbm
        );
        self.params = Some(params.clone());
        Ok(())
    }

    fn check(&mut self) -> bool {
        true
    }

    fn send(&mut self, frame: &[u8]) {
        let toa = self.time_on_air(frame.len());
        // The link's fate is drawn once per transmission.
        self.pending = if self.rng.gen_bool(self.link.loss) {
            Pending::Nothing
        } else if self.rng.gen_bool(self.link.corrupt) {
            Pending::Corrupt
        } else {
            Pending::Reply(frame.to_vec())
        };
        self.post_after(toa, RadioEvent::TxDone);
    }

    fn receive(&mut self, timeout: Option<Duration>) {
        match std::mem::replace(&mut self.pending, Pending::Nothing) {
            Pending::Reply(frame) => {
                // Peer turnaround plus the echoed frame's own air time.
                let delay = self.time_on_air(frame.len()) + Duration::from_millis(1);
                let rssi = self.rng.gen_range(self.link.rssi_dbm.0..=self.link.rssi_dbm.1);
                let snr = self.rng.gen_range(self.link.snr_db.0..=self.link.snr_db.1);
                self.post_after(
                    delay,
                    RadioEvent::RxDone {
                        payload: frame,
                        rssi,
                        snr,
                    },
                );
            }
            Pending::Corrupt => {
                let delay = self.time_on_air(17) + Duration::from_millis(1);
                self.post_after(delay, RadioEvent::RxError);
            }
            Pending::Nothing => {
                if let Some(timeout) = timeout {
                    self.post_after(timeout, RadioEvent::RxTimeout);
                }
                // Continuous receive over a silent link: nothing to hear.
            }
        }
    }

    fn set_tx_continuous_wave(&mut self, frequency_hz: u32, power_dbm: i8, timeout: Duration) {
        info!(
            "sim radio: carrier wave at {} Hz, {} dBm for {} s",
            frequency_hz,
            power_dbm,
            timeout.as_secs()
        );
        thread::sleep(timeout);
    }
}
