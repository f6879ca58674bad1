use std::thread;
use std::time::{Duration, Instant};

use rnsnow_link::{Bridge, NullSink, PeerSummary};
use serde::Serialize;

use crate::cmd::{open_radio, Context, PingArgs};
use crate::exit::{link_error, CliResult, FAILURE, SUCCESS};
use crate::output::print_record;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Serialize)]
struct PingOutput {
    channel: u8,
    sent: u64,
    failed: u64,
    /// Peers whose own pings arrived meanwhile.
    peers: Vec<PeerSummary>,
}

pub fn run(args: PingArgs, ctx: Context) -> CliResult<i32> {
    let mut config = ctx.config;
    args.radio.apply(&mut config)?;
    let radio = open_radio(&config)?;
    let mut bridge = Bridge::new(config.link, radio, std::io::sink(), NullSink)
        .map_err(|err| link_error("bridge setup failed", err))?;
    let interval = Duration::from_millis(args.interval_ms);

    for n in 0..args.count {
        let now = Instant::now();
        bridge
            .send_ping(now)
            .map_err(|err| link_error("ping failed", err))?;
        if n + 1 == args.count {
            break;
        }
        let next = now + interval;
        while Instant::now() < next {
            bridge
                .poll_radio(Instant::now())
                .map_err(|err| link_error("radio receive failed", err))?;
            thread::sleep(POLL_INTERVAL);
        }
    }

    let stats = bridge.stats();
    let output = PingOutput {
        channel: bridge.channel(),
        sent: stats.pings_sent,
        failed: stats.send_failures,
        peers: bridge.peers().summaries(Instant::now()),
    };
    print_record("ping", &output, ctx.format);
    Ok(if stats.pings_sent == 0 { FAILURE } else { SUCCESS })
}
