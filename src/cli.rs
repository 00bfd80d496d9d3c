use clap::{Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;

use crate::engine::{Role, SlaverMode, TestConfig};
use crate::radio::{Modem, RadioParameters};
use crate::sim::SimLink;

#[derive(Parser, Debug, Clone)]
#[command(name = "lora-hammer", about = "LoRa link tester (ping/rx) with framing & stats")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Radio health check
    Probe(ProbeOpts),
    /// Ping test: master transmits probes, slaver echoes them
    Ping(PingOpts),
    /// Receive only: sniff (default) or echo without a trial budget
    Rx(RxOpts),
    /// Emit an unmodulated carrier wave
    Cw(CwOpts),
    /// Resolve and print the radio parameters for the next run
    Config(ConfigOpts),
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ModemKind {
    Lora,
    Fsk,
}

#[derive(Args, Debug, Clone)]
pub struct RadioOpts {
    /// Carrier frequency in Hz
    #[arg(long, default_value_t = 868_000_000)]
    pub freq: u32,
    /// Transmit power in dBm
    #[arg(long, default_value_t = 17)]
    pub power: i8,
    /// Modulation
    #[arg(long, value_enum, default_value_t = ModemKind::Lora)]
    pub modem: ModemKind,
    /// LoRa spreading factor (7..=12)
    #[arg(long, default_value_t = 7)]
    pub sf: u8,
    /// LoRa bandwidth in Hz
    #[arg(long, default_value_t = 125_000)]
    pub bw: u32,
    /// LoRa coding rate denominator offset (1 => 4/5 .. 4 => 4/8)
    #[arg(long, default_value_t = 1)]
    pub cr: u8,
    /// LoRa preamble length in symbols
    #[arg(long, default_value_t = 8)]
    pub preamble: u16,
    /// FSK bandwidth in Hz
    #[arg(long, default_value_t = 50_000)]
    pub fsk_bw: u32,
    /// FSK frequency deviation in Hz
    #[arg(long, default_value_t = 25_000)]
    pub fsk_fdev: u32,
    /// FSK datarate in bits per second
    #[arg(long, default_value_t = 50_000)]
    pub fsk_datarate: u32,
}

impl RadioOpts {
    pub fn to_parameters(&self) -> RadioParameters {
        RadioParameters {
            frequency_hz: self.freq,
            tx_power_dbm: self.power,
            modem: match self.modem {
                ModemKind::Lora => Modem::LoRa,
                ModemKind::Fsk => Modem::Fsk,
            },
            spreading_factor: self.sf,
            bandwidth_hz: self.bw,
            coding_rate: self.cr,
            preamble_symbols: self.preamble,
            fsk_bandwidth_hz: self.fsk_bw,
            fsk_deviation_hz: self.fsk_fdev,
            fsk_datarate_bps: self.fsk_datarate,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AddrOpts {
    /// Master node address (decimal or 0x-hex)
    #[arg(long, value_parser = parse_u32, default_value = "0x11223344")]
    pub master_addr: u32,
    /// Slaver node address (decimal or 0x-hex)
    #[arg(long, value_parser = parse_u32, default_value = "0x55667788")]
    pub slaver_addr: u32,
}

/// Knobs for the simulated link backing the transceiver.
#[derive(Args, Debug, Clone)]
pub struct LinkOpts {
    /// Probability a probe gets no echo back
    #[arg(long, default_value_t = 0.0)]
    pub loss: f64,
    /// Probability an echo arrives corrupted
    #[arg(long, default_value_t = 0.0)]
    pub corrupt: f64,
    /// Synthesized RSSI range, dBm
    #[arg(long, default_value_t = -95)]
    pub rssi_min: i16,
    #[arg(long, default_value_t = -40)]
    pub rssi_max: i16,
    /// Synthesized SNR range, dB
    #[arg(long, default_value_t = -5)]
    pub snr_min: i8,
    #[arg(long, default_value_t = 10)]
    pub snr_max: i8,
    /// Seed for reproducible link behavior
    #[arg(long)]
    pub seed: Option<u64>,
}

impl LinkOpts {
    pub fn to_link(&self) -> SimLink {
        SimLink {
            loss: self.loss,
            corrupt: self.corrupt,
            rssi_dbm: (self.rssi_min, self.rssi_max),
            snr_db: (self.snr_min, self.snr_max),
            seed: self.seed,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProbeOpts {
    #[command(flatten)]
    pub radio: RadioOpts,
}

#[derive(Args, Debug, Clone)]
pub struct PingOpts {
    /// Run as master (transmit probes); default is slaver (echo)
    #[arg(short = 'm', long)]
    pub master: bool,
    /// Trial budget: probes to send before reporting
    #[arg(long, default_value_t = 10)]
    pub trials: u32,
    /// Probe frame length in bytes (header + marker + filler)
    #[arg(long, default_value_t = 32)]
    pub len: usize,
    /// Master reply window in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub rx_timeout_ms: u64,
    #[command(flatten)]
    pub radio: RadioOpts,
    #[command(flatten)]
    pub addr: AddrOpts,
    #[command(flatten)]
    pub link: LinkOpts,
}

#[derive(Args, Debug, Clone)]
pub struct RxOpts {
    /// Echo probes addressed to us instead of passively sniffing
    #[arg(long)]
    pub echo: bool,
    /// Optional receive window in milliseconds (default: continuous)
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    #[command(flatten)]
    pub radio: RadioOpts,
    #[command(flatten)]
    pub addr: AddrOpts,
    #[command(flatten)]
    pub link: LinkOpts,
}

#[derive(Args, Debug, Clone)]
pub struct CwOpts {
    /// Carrier frequency in Hz
    #[arg(long)]
    pub freq: u32,
    /// Transmit power in dBm
    #[arg(long)]
    pub power: i8,
    /// Carrier duration in seconds
    #[arg(long, default_value_t = 5)]
    pub timeout_s: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigOpts {
    #[command(flatten)]
    pub radio: RadioOpts,
}

impl PingOpts {
    pub fn role(&self) -> Role {
        if self.master {
            Role::Master
        } else {
            Role::Slaver(SlaverMode::Echo)
        }
    }

    pub fn to_test_config(&self) -> TestConfig {
        TestConfig {
            params: self.radio.to_parameters(),
            master_addr: self.addr.master_addr,
            slaver_addr: self.addr.slaver_addr,
            frame_len: self.len.max(crate::frame::MIN_FRAME_LEN),
            trials: self.trials,
            rx_timeout: Duration::from_millis(self.rx_timeout_ms),
            sniffer_timeout: None,
        }
    }
}

impl RxOpts {
    pub fn role(&self) -> Role {
        if self.echo {
            Role::Slaver(SlaverMode::Echo)
        } else {
            Role::Slaver(SlaverMode::Sniffer)
        }
    }

    pub fn to_test_config(&self) -> TestConfig {
        TestConfig {
            params: self.radio.to_parameters(),
            master_addr: self.addr.master_addr,
            slaver_addr: self.addr.slaver_addr,
            frame_len: 32,
            trials: 0,
            rx_timeout: Duration::from_millis(1000),
            sniffer_timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Accept addresses as decimal or 0x-prefixed hex.
fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("bad address {s:?}: {e}"))
}
