//! Signalbox host simulator.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                    Simulated board (adapters)                  │
//! │                                                                │
//! │  stdin ──▶ SimUartRx (circular DMA)      SimUartTx ──▶ stdout  │
//! │            SimPin (LED, button)          SimLamp x2 ──▶ log    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │ Dispatcher: serial · button · led · system · traffic   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `signalbox [config.json | config.bin]`.  Type `n`, `s`, `e`, `w` for car
//! arrivals, `r` for a lamp fault, `b` to click the button, `h` to hold it.
//! End of input stops the system and exits.  `SIGNALBOX_LOG` sets the log
//! level.
#![deny(unused_must_use)]

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{info, warn};

use signalbox::adapters::log_sink::{StderrSink, parse_level};
use signalbox::adapters::sim::{SimLamp, SimPin, SimUartRx, SimUartTx};
use signalbox::app::board::{Board, Hardware};
use signalbox::config::AppConfig;
use signalbox::events::{Axis, Signal};
use signalbox::isr::{self, IsrLine};

/// Simulated time allowed for the STOP sequence on exit.
const SHUTDOWN_MS: u32 = 2_000;

enum Input {
    Bytes(Vec<u8>),
    Eof,
}

fn load_config() -> Result<AppConfig> {
    match std::env::args().nth(1) {
        Some(path) if path.ends_with(".bin") => {
            let bytes = std::fs::read(&path).with_context(|| format!("reading config {path}"))?;
            let cfg = AppConfig::from_blob(&bytes).with_context(|| format!("decoding {path}"))?;
            info!("Config blob loaded from {path}");
            Ok(cfg)
        }
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            let cfg = AppConfig::from_json(&text).with_context(|| format!("parsing {path}"))?;
            info!("Config loaded from {path}");
            Ok(cfg)
        }
        None => {
            info!("Using default config");
            Ok(AppConfig::default())
        }
    }
}

fn spawn_stdin() -> mpsc::Receiver<Input> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        use std::io::Read;
        let mut stdin = std::io::stdin().lock();
        let mut buf = [0u8; 64];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => {
                    let _ = tx.send(Input::Eof);
                    break;
                }
                Ok(n) => {
                    if tx.send(Input::Bytes(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// `b` and `h` drive the button; everything else goes down the UART.
fn route_input(bytes: &[u8], rx: &SimUartRx, button: &SimPin, line: &IsrLine) {
    let mut uart = Vec::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'b' => {
                button.press(line, true);
                button.press(line, false);
            }
            // Toggle: press to start a hold, again to release.
            b'h' => button.press(line, button.is_set_high()),
            _ => uart.push(b),
        }
    }
    if !uart.is_empty() && rx.inject(&uart) < uart.len() {
        warn!("sim: serial not running, input dropped");
    }
}

fn main() -> Result<()> {
    let level = parse_level(std::env::var("SIGNALBOX_LOG").ok().as_deref());
    StderrSink::init(level).map_err(|e| anyhow::anyhow!("logger: {e}"))?;

    info!("Signalbox v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let (line, drain) = isr::channel();

    let uart_rx = SimUartRx::new(line);
    let uart_tx = SimUartTx::new(line).echo_stdout();
    let led = SimPin::new(false);
    let button = SimPin::new(true);

    let mut board = Board::assemble(
        &config,
        Hardware {
            uart_rx: Box::new(uart_rx.clone()),
            uart_tx: Box::new(uart_tx),
            led: led.clone(),
            button: button.clone(),
            lamp_ns: Box::new(SimLamp::new(Axis::NorthSouth)),
            lamp_ew: Box::new(SimLamp::new(Axis::EastWest)),
        },
        drain,
    )?;

    board.request(Signal::SystemStartReq);
    board.request(Signal::TrafficStartReq);
    board.dispatcher.run_until_idle();

    let input = spawn_stdin();
    let tick = Duration::from_millis(u64::from(config.tick_ms));
    let mut led_was = led.is_set_high();
    let mut next = Instant::now() + tick;

    loop {
        match input.recv_timeout(next.saturating_duration_since(Instant::now())) {
            Ok(Input::Bytes(bytes)) => {
                route_input(&bytes, &uart_rx, &button, line);
                board.dispatcher.run_until_idle();
                continue;
            }
            Ok(Input::Eof) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        board.dispatcher.tick(config.tick_ms);
        board.dispatcher.run_until_idle();
        next += tick;

        let lit = led.is_set_high();
        if lit != led_was {
            info!("LED {}", if lit { "on" } else { "off" });
            led_was = lit;
        }
    }

    info!("Input closed, stopping");
    board.request(Signal::TrafficStopReq);
    board.request(Signal::SystemStopReq);
    board.dispatcher.advance(SHUTDOWN_MS);
    info!(
        "Stopped at {} ms: system {}, traffic {}",
        board.dispatcher.now_ms(),
        board.dispatcher.state_of("system").unwrap_or("?"),
        board.dispatcher.state_of("traffic").unwrap_or("?")
    );
    if board.dispatcher.dropped() > 0 {
        warn!("{} events lost to full mailboxes", board.dispatcher.dropped());
    }
    Ok(())
}
