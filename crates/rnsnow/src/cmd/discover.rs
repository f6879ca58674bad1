use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rnsnow_link::{Bridge, DiscoveryOutcome, LinkEvent};
use serde::Serialize;

use crate::cmd::{open_radio, Context, DiscoverArgs};
use crate::exit::{link_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS};
use crate::output::print_record;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Serialize)]
struct DiscoverOutput {
    channel: u8,
    responses: u32,
    attempts: u32,
    early: bool,
    fallback: bool,
    candidates: Vec<u8>,
    elapsed_ms: u64,
}

pub fn run(args: DiscoverArgs, ctx: Context) -> CliResult<i32> {
    let mut config = ctx.config;
    args.radio.apply(&mut config)?;
    if let Some(listen_ms) = args.listen_ms {
        config.link.discovery.listen_window_ms = listen_ms;
    }
    if let Some(attempts) = args.attempts {
        config.link.discovery.max_attempts = attempts;
    }
    if let Some(probes) = args.probes {
        config.link.discovery.probes_per_channel = probes;
    }

    let radio = open_radio(&config)?;
    let mut bridge = Bridge::new(config.link, radio, std::io::sink(), Vec::new())
        .map_err(|err| link_error("bridge setup failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let started = Instant::now();
    bridge
        .start_discovery(started)
        .map_err(|err| link_error("discovery failed", err))?;

    while bridge.is_discovering() {
        if !running.load(Ordering::SeqCst) {
            bridge
                .abort_discovery()
                .map_err(|err| link_error("abort failed", err))?;
            return Ok(INTERRUPTED);
        }
        let now = Instant::now();
        bridge
            .poll_radio(now)
            .map_err(|err| link_error("radio receive failed", err))?;
        bridge
            .tick(now)
            .map_err(|err| link_error("discovery failed", err))?;
        thread::sleep(POLL_INTERVAL);
    }

    let candidates = bridge
        .events()
        .iter()
        .find_map(|event| match event {
            LinkEvent::DiscoveryStarted { candidates } => Some(candidates.clone()),
            _ => None,
        })
        .unwrap_or_default();
    let outcome = completed(bridge.events())
        .ok_or_else(|| CliError::new(INTERNAL, "discovery ended without an outcome"))?;

    let output = DiscoverOutput {
        channel: outcome.channel,
        responses: outcome.responses,
        attempts: outcome.attempts,
        early: outcome.early,
        fallback: outcome.fallback,
        candidates,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    print_record("discovery", &output, ctx.format);
    Ok(SUCCESS)
}

fn completed(events: &[LinkEvent]) -> Option<DiscoveryOutcome> {
    events.iter().rev().find_map(|event| match event {
        LinkEvent::DiscoveryCompleted(outcome) => Some(outcome.clone()),
        _ => None,
    })
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
