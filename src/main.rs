use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod cli;
mod engine;
mod error;
mod event;
mod frame;
mod radio;
mod sim;
mod stats;

use crate::engine::Engine;
use crate::event::event_queue;
use crate::radio::Transceiver;
use crate::sim::{SimLink, SimRadio};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = cli::Cli::parse();
    match args.cmd {
        cli::Cmd::Probe(opts) => probe(opts),
        cli::Cmd::Ping(opts) => ping(opts),
        cli::Cmd::Rx(opts) => rx(opts),
        cli::Cmd::Cw(opts) => cw(opts),
        cli::Cmd::Config(opts) => config(opts),
    }
}

fn probe(opts: cli::ProbeOpts) -> Result<()> {
    let (tx, _rx) = event_queue();
    let mut radio = SimRadio::new(tx, SimLink::default());
    radio.configure(&opts.radio.to_parameters())?;
    if radio.check() {
        println!("radio probe ok");
    } else {
        println!("radio probe failed");
    }
    Ok(())
}

fn ping(opts: cli::PingOpts) -> Result<()> {
    let (tx, rx) = event_queue();
    let radio = SimRadio::new(tx.clone(), opts.link.to_link());
    let mut engine = Engine::new(opts.role(), opts.to_test_config(), radio, tx, rx);
    if let Some(report) = engine.run()? {
        println!("{report}");
    }
    Ok(())
}

fn rx(opts: cli::RxOpts) -> Result<()> {
    let (tx, rx) = event_queue();
    let radio = SimRadio::new(tx.clone(), opts.link.to_link());
    let mut engine = Engine::new(opts.role(), opts.to_test_config(), radio, tx, rx);
    // Slaver runs have no trial budget; stop with ^C.
    engine.run()?;
    Ok(())
}

fn cw(opts: cli::CwOpts) -> Result<()> {
    let (tx, _rx) = event_queue();
    let mut radio = SimRadio::new(tx, SimLink::default());
    radio.set_tx_continuous_wave(opts.freq, opts.power, Duration::from_secs(opts.timeout_s));
    Ok(())
}

fn config(opts: cli::ConfigOpts) -> Result<()> {
    let p = opts.radio.to_parameters();
    println!("Frequency: {} Hz", p.frequency_hz);
    println!("TxPower  : {} dBm", p.tx_power_dbm);
    println!("Modem    : {:?}", p.modem);
    println!("SF: {}", p.spreading_factor);
    println!("BW: {} Hz", p.bandwidth_hz);
    println!("CR: 4/{}", p.coding_rate + 4);
    Ok(())
}
