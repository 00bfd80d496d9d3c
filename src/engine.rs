use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::RadioTestError;
use crate::event::{EventReceiver, EventSender, RadioEvent};
use crate::frame;
use crate::radio::{BROADCAST_ADDR, RadioParameters, Transceiver};
use crate::stats::{LinkStats, Report};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaverMode {
    /// Echo probes addressed to us (or broadcast) back verbatim.
    Echo,
    /// Log everything heard, reply to nothing.
    Sniffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slaver(SlaverMode),
}

/// Per-run configuration, fixed before Init is posted.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub params: RadioParameters,
    pub master_addr: u32,
    pub slaver_addr: u32,
    /// Total probe frame length, header and marker included.
    pub frame_len: usize,
    /// Master trial budget.
    pub trials: u32,
    /// Master reply window.
    pub rx_timeout: Duration,
    /// Optional receive window for sniffer mode (`rx --timeout-ms`);
    /// default is continuous.
    pub sniffer_timeout: Option<Duration>,
}

/// Outcome of processing one event.
#[derive(Debug)]
pub enum Step {
    Continue,
    Finished(Report),
}

/// The protocol state machine. Single consumer of the event queue; owns
/// the statistics and the per-run counters, and is their only writer.
pub struct Engine<R: Transceiver> {
    role: Role,
    cfg: TestConfig,
    radio: R,
    stats: LinkStats,
    events_tx: EventSender,
    events_rx: EventReceiver,
}

impl<R: Transceiver> Engine<R> {
    pub fn new(
        role: Role,
        cfg: TestConfig,
        radio: R,
        events_tx: EventSender,
        events_rx: EventReceiver,
    ) -> Self {
        Self {
            role,
            cfg,
            radio,
            stats: LinkStats::new(),
            events_tx,
            events_rx,
        }
    }

    /// Post Init and process events until the run finishes. Master runs
    /// return the final report; slaver runs block until the process is
    /// stopped (or every producer goes away).
    pub fn run(&mut self) -> Result<Option<Report>, RadioTestError> {
        self.post(RadioEvent::Init);
        loop {
            let Ok(event) = self.events_rx.recv() else {
                // Every producer dropped its sender; nothing more can happen.
                return Ok(None);
            };
            match self.step(event)? {
                Step::Continue => {}
                Step::Finished(report) => return Ok(Some(report)),
            }
        }
    }

    /// Process exactly one event to completion.
    pub fn step(&mut self, event: RadioEvent) -> Result<Step, RadioTestError> {
        match event {
            RadioEvent::Init => self.on_init()?,
            RadioEvent::TxStart => match self.role {
                Role::Master => return self.next_trial_or_report(),
                Role::Slaver(_) => debug!("ignoring TxStart in slaver role"),
            },
            RadioEvent::TxDone => self.resume_receive(),
            RadioEvent::TxTimeout => {
                warn!("{} on tx, resuming receive", RadioTestError::TransportTimeout);
                self.resume_receive();
            }
            RadioEvent::RxDone { payload, rssi, snr } => {
                return self.on_rx_done(payload, rssi, snr);
            }
            RadioEvent::RxTimeout => match self.role {
                Role::Master => {
                    self.stats.record_timeout();
                    info!(
                        "Request [SA=0x{:08X}] timed out: seqno={}, time={} ms",
                        self.cfg.slaver_addr,
                        self.stats.tx_sent,
                        self.stats.round_trip_ms()
                    );
                    return self.next_trial_or_report();
                }
                Role::Slaver(_) => self.resume_receive(),
            },
            RadioEvent::RxError => match self.role {
                Role::Master => {
                    self.stats.record_error();
                    debug!("rx error, seqno={}", self.stats.tx_sent);
                    return self.next_trial_or_report();
                }
                Role::Slaver(_) => self.resume_receive(),
            },
        }
        Ok(Step::Continue)
    }

    fn on_init(&mut self) -> Result<(), RadioTestError> {
        self.radio.configure(&self.cfg.params)?;
        self.stats.reset();
        match self.role {
            Role::Master => self.post(RadioEvent::TxStart),
            Role::Slaver(mode) => {
                if mode == SlaverMode::Echo {
                    info!("Slaver Address(SA):[0x{:08X}]", self.cfg.slaver_addr);
                }
                let p = &self.cfg.params;
                info!(
                    "Stay in Rx Continuous with freq={} Hz, SF={}, CR=4/{}, BW={} Hz",
                    p.frequency_hz,
                    p.spreading_factor,
                    p.coding_rate + 4,
                    p.bandwidth_hz
                );
                self.radio.receive(self.listen_timeout());
            }
        }
        Ok(())
    }

    fn on_rx_done(&mut self, payload: Vec<u8>, rssi: i16, snr: i8) -> Result<Step, RadioTestError> {
        if payload.is_empty() {
            // Driver handed up a completion with no bytes; diagnostic only.
            warn!("{}", RadioTestError::ProtocolMismatch(0));
            self.resume_receive();
            return Ok(Step::Continue);
        }
        match self.role {
            Role::Master => match frame::parse_probe(&payload) {
                // Loose match by design: anything carrying the marker is a
                // reply, and its addresses are reported, never checked
                // against an expected peer.
                Ok(reply) => {
                    self.stats.record_rx(rssi, snr);
                    info!(
                        "Reply from [0x{:08X}]: seqno={}, bytes={}, time={} ms, rssi={}, snr={}",
                        reply.dst_addr,
                        reply.seq,
                        payload.len(),
                        self.stats.round_trip_ms(),
                        rssi,
                        snr
                    );
                    self.post(RadioEvent::TxStart);
                }
                Err(err) => {
                    if matches!(err, RadioTestError::ProtocolMismatch(_)) {
                        warn!("{err}");
                    }
                    self.resume_receive();
                }
            },
            Role::Slaver(SlaverMode::Echo) => {
                match frame::parse_probe(&payload) {
                    Ok(probe)
                        if probe.dst_addr == self.cfg.slaver_addr
                            || probe.dst_addr == BROADCAST_ADDR =>
                    {
                        debug!(
                            "echoing probe from [0x{:08X}], seqno={}, {} bytes",
                            probe.src_addr,
                            probe.seq,
                            payload.len()
                        );
                        self.radio.send(&payload);
                    }
                    // Not ours, not a probe, or too short: keep listening.
                    _ => self.resume_receive(),
                }
            }
            Role::Slaver(SlaverMode::Sniffer) => {
                self.stats.record_rx(rssi, snr);
                info!(
                    "Received: total={}, bytes={}, rssi={}, snr={}",
                    self.stats.rx_correct,
                    payload.len(),
                    rssi,
                    snr
                );
                debug!("frame: {:02X?}", payload);
                self.resume_receive();
            }
        }
        Ok(Step::Continue)
    }

    /// Shared tail of the RxTimeout/RxError/TxStart transitions: send the
    /// next probe while the budget lasts, otherwise produce the report.
    fn next_trial_or_report(&mut self) -> Result<Step, RadioTestError> {
        if self.stats.tx_sent < self.cfg.trials {
            if self.stats.tx_sent == 0 {
                self.log_run_banner();
            }
            let seq = self.stats.tx_sent + 1;
            let probe = frame::build_probe(
                self.cfg.master_addr,
                self.cfg.slaver_addr,
                seq,
                self.cfg.frame_len,
            );
            self.stats.record_tx();
            self.radio.send(&probe);
            Ok(Step::Continue)
        } else {
            Ok(Step::Finished(self.stats.snapshot(
                self.cfg.frame_len,
                self.cfg.master_addr,
                self.cfg.slaver_addr,
            )))
        }
    }

    fn log_run_banner(&self) {
        let p = &self.cfg.params;
        let toa = p.time_on_air(self.cfg.frame_len);
        info!("Master Address(MA):[0x{:08X}]", self.cfg.master_addr);
        info!(
            "Pinging [SA=0x{:08X}] with {} bytes (ToA={} ms) of data for {} counters:",
            self.cfg.slaver_addr,
            self.cfg.frame_len,
            toa.as_millis(),
            self.cfg.trials
        );
        info!(
            "With radio parameters: freq={} Hz, TxPower={} dBm, SF={}, CR=4/{}, BW={} Hz",
            p.frequency_hz,
            p.tx_power_dbm,
            p.spreading_factor,
            p.coding_rate + 4,
            p.bandwidth_hz
        );
    }

    /// Role-aware re-arm: the master listens with the reply window, a
    /// slaver goes back to continuous receive (or the sniffer window).
    fn resume_receive(&mut self) {
        match self.role {
            Role::Master => self.radio.receive(Some(self.cfg.rx_timeout)),
            Role::Slaver(_) => self.radio.receive(self.listen_timeout()),
        }
    }

    fn listen_timeout(&self) -> Option<Duration> {
        match self.role {
            Role::Slaver(SlaverMode::Sniffer) => self.cfg.sniffer_timeout,
            _ => None,
        }
    }

    fn post(&self, event: RadioEvent) {
        // The engine holds the receiver, so the channel cannot be closed.
        let _ = self.events_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_queue;
    use crate::radio::Modem;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Action {
        Configure,
        Send(Vec<u8>),
        Receive(Option<Duration>),
    }

    /// Scripted reply behavior, consumed one item per `receive()` call.
    #[derive(Debug, Clone)]
    enum RxScript {
        Echo,
        Timeout,
        Error,
        Garbage(Vec<u8>),
    }

    struct MockRadio {
        events: EventSender,
        actions: Rc<RefCell<Vec<Action>>>,
        script: Vec<RxScript>,
        last_sent: Vec<u8>,
        fail_configure: bool,
    }

    impl MockRadio {
        fn new(events: EventSender, script: Vec<RxScript>) -> (Self, Rc<RefCell<Vec<Action>>>) {
            let actions = Rc::new(RefCell::new(Vec::new()));
            (
                Self {
                    events,
                    actions: actions.clone(),
                    script,
                    last_sent: Vec::new(),
                    fail_configure: false,
                },
                actions,
            )
        }
    }

    impl Transceiver for MockRadio {
        fn configure(&mut self, _params: &RadioParameters) -> Result<(), RadioTestError> {
            if self.fail_configure {
                return Err(RadioTestError::Configuration("mock init failure".into()));
            }
            self.actions.borrow_mut().push(Action::Configure);
            Ok(())
        }

        fn check(&mut self) -> bool {
            true
        }

        fn send(&mut self, frame: &[u8]) {
            self.actions.borrow_mut().push(Action::Send(frame.to_vec()));
            self.last_sent = frame.to_vec();
            let _ = self.events.send(RadioEvent::TxDone);
        }

        fn receive(&mut self, timeout: Option<Duration>) {
            self.actions.borrow_mut().push(Action::Receive(timeout));
            if self.script.is_empty() {
                return; // stay silent; the test drives further steps itself
            }
            let event = match self.script.remove(0) {
                RxScript::Echo => RadioEvent::RxDone {
                    payload: self.last_sent.clone(),
                    rssi: -70,
                    snr: 7,
                },
                RxScript::Timeout => RadioEvent::RxTimeout,
                RxScript::Error => RadioEvent::RxError,
                RxScript::Garbage(bytes) => RadioEvent::RxDone {
                    payload: bytes,
                    rssi: -95,
                    snr: -3,
                },
            };
            let _ = self.events.send(event);
        }

        fn set_tx_continuous_wave(&mut self, _f: u32, _p: i8, _t: Duration) {}
    }

    fn test_config(trials: u32) -> TestConfig {
        TestConfig {
            params: RadioParameters {
                frequency_hz: 868_000_000,
                tx_power_dbm: 17,
                modem: Modem::LoRa,
                spreading_factor: 7,
                bandwidth_hz: 125_000,
                coding_rate: 1,
                preamble_symbols: 8,
                fsk_bandwidth_hz: 50_000,
                fsk_deviation_hz: 25_000,
                fsk_datarate_bps: 50_000,
            },
            master_addr: 0x11223344,
            slaver_addr: 0x55667788,
            frame_len: 32,
            trials,
            rx_timeout: Duration::from_millis(1000),
            sniffer_timeout: None,
        }
    }

    fn master_engine(
        trials: u32,
        script: Vec<RxScript>,
    ) -> (Engine<MockRadio>, Rc<RefCell<Vec<Action>>>) {
        let (tx, rx) = event_queue();
        let (radio, actions) = MockRadio::new(tx.clone(), script);
        (
            Engine::new(Role::Master, test_config(trials), radio, tx, rx),
            actions,
        )
    }

    fn slaver_engine(
        mode: SlaverMode,
        script: Vec<RxScript>,
    ) -> (Engine<MockRadio>, Rc<RefCell<Vec<Action>>>) {
        let (tx, rx) = event_queue();
        let (radio, actions) = MockRadio::new(tx.clone(), script);
        (
            Engine::new(Role::Slaver(mode), test_config(10), radio, tx, rx),
            actions,
        )
    }

    #[test]
    fn master_counts_every_trial_exactly_once() {
        use RxScript::*;
        let (mut engine, _) = master_engine(5, vec![Echo, Timeout, Error, Echo, Timeout]);
        let report = engine.run().unwrap().expect("master run must report");
        assert_eq!(report.tx_sent, 5);
        assert_eq!(report.rx_correct, 2);
        assert_eq!(report.lost, 3);
        assert_eq!(
            report.rx_correct + report.lost,
            report.tx_sent,
            "every trial has exactly one outcome"
        );
    }

    #[test]
    fn master_two_replies_one_timeout_is_33_percent_loss() {
        use RxScript::*;
        let (mut engine, _) = master_engine(3, vec![Echo, Echo, Timeout]);
        let report = engine.run().unwrap().unwrap();
        assert_eq!(report.tx_sent, 3);
        assert_eq!(report.rx_correct, 2);
        assert_eq!(report.loss_pct, 33);
        let s = report.signal.unwrap();
        assert_eq!((s.rssi_min, s.rssi_max), (-70, -70));
    }

    #[test]
    fn master_all_timeouts_reports_no_data() {
        use RxScript::*;
        let (mut engine, _) = master_engine(2, vec![Timeout, Timeout]);
        let report = engine.run().unwrap().unwrap();
        assert_eq!(report.loss_pct, 100);
        assert!(report.signal.is_none());
    }

    #[test]
    fn master_ignores_foreign_frames_and_keeps_listening() {
        use RxScript::*;
        // A non-probe frame does not consume the trial; the re-armed
        // receive then times out, which does.
        let garbage = vec![0xAAu8; 24];
        let (mut engine, actions) = master_engine(1, vec![Garbage(garbage), Timeout]);
        let report = engine.run().unwrap().unwrap();
        assert_eq!(report.tx_sent, 1);
        assert_eq!(report.rx_correct, 0);
        assert_eq!(report.lost, 1);
        // Both receives were armed with the master's reply window.
        let receives: Vec<_> = actions
            .borrow()
            .iter()
            .filter(|a| matches!(a, Action::Receive(_)))
            .cloned()
            .collect();
        assert_eq!(
            receives,
            vec![
                Action::Receive(Some(Duration::from_millis(1000))),
                Action::Receive(Some(Duration::from_millis(1000))),
            ]
        );
    }

    #[test]
    fn master_probe_is_well_formed_and_sequenced_from_one() {
        use RxScript::*;
        let (mut engine, actions) = master_engine(2, vec![Echo, Echo]);
        engine.run().unwrap().unwrap();
        let sent: Vec<Vec<u8>> = actions
            .borrow()
            .iter()
            .filter_map(|a| match a {
                Action::Send(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(sent.len(), 2);
        let first = frame::parse_probe(&sent[0]).unwrap();
        let second = frame::parse_probe(&sent[1]).unwrap();
        assert_eq!(first.src_addr, 0x11223344);
        assert_eq!(first.dst_addr, 0x55667788);
        assert_eq!((first.seq, second.seq), (1, 2));
        assert_eq!(sent[0].len(), 32);
    }

    #[test]
    fn configure_failure_aborts_before_the_loop() {
        let (tx, rx) = event_queue();
        let (mut radio, _) = MockRadio::new(tx.clone(), vec![]);
        radio.fail_configure = true;
        let mut engine = Engine::new(Role::Master, test_config(3), radio, tx, rx);
        let err = engine.run().unwrap_err();
        assert!(matches!(err, RadioTestError::Configuration(_)));
    }

    #[test]
    fn echo_slaver_echoes_broadcast_probe_verbatim() {
        let (mut engine, actions) = slaver_engine(SlaverMode::Echo, vec![]);
        let probe = frame::build_probe(0x11223344, BROADCAST_ADDR, 7, 32);
        engine.step(RadioEvent::Init).unwrap();
        engine
            .step(RadioEvent::RxDone {
                payload: probe.clone(),
                rssi: -60,
                snr: 9,
            })
            .unwrap();
        let all = actions.borrow();
        assert!(all.contains(&Action::Send(probe)), "echoed byte-identical");
    }

    #[test]
    fn echo_slaver_ignores_probes_for_other_addresses() {
        let (mut engine, actions) = slaver_engine(SlaverMode::Echo, vec![]);
        let probe = frame::build_probe(0x11223344, 0xDEADBEEF, 1, 32);
        engine.step(RadioEvent::Init).unwrap();
        engine
            .step(RadioEvent::RxDone {
                payload: probe,
                rssi: -60,
                snr: 9,
            })
            .unwrap();
        let sends = actions
            .borrow()
            .iter()
            .filter(|a| matches!(a, Action::Send(_)))
            .count();
        assert_eq!(sends, 0);
        // Back to continuous receive instead.
        assert_eq!(actions.borrow().last(), Some(&Action::Receive(None)));
    }

    #[test]
    fn echo_slaver_resumes_continuous_receive_after_tx_done() {
        let (mut engine, actions) = slaver_engine(SlaverMode::Echo, vec![]);
        engine.step(RadioEvent::Init).unwrap();
        engine.step(RadioEvent::TxDone).unwrap();
        assert_eq!(actions.borrow().last(), Some(&Action::Receive(None)));
    }

    #[test]
    fn sniffer_counts_everything_it_hears() {
        let (mut engine, actions) = slaver_engine(SlaverMode::Sniffer, vec![]);
        engine.step(RadioEvent::Init).unwrap();
        for payload in [vec![1u8, 2, 3], vec![0xFF; 40]] {
            engine
                .step(RadioEvent::RxDone {
                    payload,
                    rssi: -80,
                    snr: 2,
                })
                .unwrap();
        }
        // The sniffer re-arms receive after each frame.
        let receives = actions
            .borrow()
            .iter()
            .filter(|a| matches!(a, Action::Receive(_)))
            .count();
        assert_eq!(receives, 3); // Init + 2 resumes
    }

    #[test]
    fn empty_payload_is_diagnostic_only() {
        use RxScript::*;
        let (mut engine, _) = master_engine(1, vec![Garbage(vec![]), Timeout]);
        let report = engine.run().unwrap().unwrap();
        assert_eq!(report.tx_sent, 1);
        assert_eq!(report.rx_correct, 0);
        assert_eq!(report.lost, 1, "empty buffer never counts toward loss");
    }
}
