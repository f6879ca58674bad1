use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rnsnow_link::driver::{self, BridgeCommand, DriverConfig, INBOX_CAPACITY};
use rnsnow_link::{Bridge, LinkEvent};
use rnsnow_transport::serial::validate_baud;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::app::AppConfig;
use crate::cmd::{open_radio, Context, RunArgs};
use crate::exit::{io_error, link_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{describe_event, print_event, print_record, OutputFormat};

type SerialOut = Box<dyn Write + Send>;

pub fn run(args: RunArgs, ctx: Context) -> CliResult<i32> {
    let Context {
        mut config,
        config_path,
        format,
    } = ctx;
    args.radio.apply(&mut config)?;
    if let Some(path) = args.serial {
        config.serial.path = Some(path);
    }
    if let Some(baud) = args.baud {
        config.serial.baud =
            validate_baud(baud).map_err(|err| CliError::new(USAGE, format!("--baud: {err}")))?;
    }
    if args.no_discovery {
        config.link.discovery.enabled = false;
    }

    let reload = Reload {
        path: config_path,
        channel: args.radio.channel,
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime start failed", err))?;
    let result = runtime.block_on(serve(
        config,
        reload,
        Duration::from_millis(args.tick_ms),
        format,
    ));
    // A blocking serial reader may still be parked in a read.
    runtime.shutdown_timeout(Duration::from_millis(500));
    result
}

/// Where a SIGHUP reloads the link configuration from.
struct Reload {
    path: Option<PathBuf>,
    channel: Option<u8>,
}

async fn serve(
    config: AppConfig,
    reload: Reload,
    tick: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let radio = open_radio(&config)?;
    let (serial_tx, serial_rx) = mpsc::channel(INBOX_CAPACITY);
    let (serial_out, reader) = open_serial(&config, serial_tx)?;
    // Stdout belongs to the serial link unless a device is used.
    let stdout_free = config.serial.path.is_some();

    let (event_tx, event_rx) = mpsc::channel(INBOX_CAPACITY);
    let mut bridge = Bridge::new(config.link.clone(), radio, serial_out, event_tx)
        .map_err(|err| link_error("bridge setup failed", err))?;
    let reporter = tokio::spawn(report_events(event_rx, stdout_free.then_some(format)));

    let (stop_tx, stop_rx) = watch::channel(false);
    let (cmd_tx, cmd_rx) = mpsc::channel(INBOX_CAPACITY);
    spawn_shutdown(stop_tx, reader);
    spawn_reload(reload, cmd_tx);

    if config.link.discovery.enabled {
        bridge
            .start_discovery(Instant::now())
            .map_err(|err| link_error("discovery failed", err))?;
    }

    let bridge = driver::run(
        bridge,
        serial_rx,
        cmd_rx,
        stop_rx,
        DriverConfig {
            tick_interval: tick,
        },
    )
    .await
    .map_err(|err| link_error("bridge failed", err))?;

    let stats = bridge.stats();
    // Closes the event channel so the reporter drains and exits.
    drop(bridge);
    let _ = reporter.await;

    if stdout_free {
        print_record("stats", &stats, format);
    } else {
        info!(
            frames_from_serial = stats.frames_from_serial,
            frames_to_serial = stats.frames_to_serial,
            serial_write_failures = stats.serial_write_failures,
            packets_sent = stats.packets_sent,
            packets_received = stats.packets_received,
            send_failures = stats.send_failures,
            "bridge stopped"
        );
    }
    Ok(SUCCESS)
}

fn open_serial(
    config: &AppConfig,
    tx: mpsc::Sender<Bytes>,
) -> CliResult<(SerialOut, JoinHandle<()>)> {
    match config.serial.path.as_deref() {
        None => {
            info!("bridging stdin/stdout");
            let reader = driver::spawn_async_reader(tokio::io::stdin(), tx);
            Ok((Box::new(std::io::stdout()), reader))
        }
        Some(path) => open_device(path, config.serial.baud, tx),
    }
}

#[cfg(feature = "serial")]
fn open_device(
    path: &str,
    baud: u32,
    tx: mpsc::Sender<Bytes>,
) -> CliResult<(SerialOut, JoinHandle<()>)> {
    use crate::exit::{transport_error, TRANSPORT_ERROR};

    let port = rnsnow_transport::serial::open(path, baud, Duration::from_millis(100))
        .map_err(|err| transport_error("serial open failed", err))?;
    let input = port
        .try_clone()
        .map_err(|err| CliError::new(TRANSPORT_ERROR, format!("serial open failed: {err}")))?;
    let reader = driver::spawn_blocking_reader(input, tx);
    Ok((Box::new(port), reader))
}

#[cfg(not(feature = "serial"))]
fn open_device(
    path: &str,
    _baud: u32,
    _tx: mpsc::Sender<Bytes>,
) -> CliResult<(SerialOut, JoinHandle<()>)> {
    Err(CliError::new(
        USAGE,
        format!("cannot open {path}: built without the `serial` feature"),
    ))
}

/// Stop on Ctrl-C or when the serial input ends.
fn spawn_shutdown(stop: watch::Sender<bool>, reader: JoinHandle<()>) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupted"),
            _ = reader => info!("serial input ended"),
        }
        let _ = stop.send(true);
    });
}

#[cfg(unix)]
fn spawn_reload(reload: Reload, commands: mpsc::Sender<BridgeCommand>) {
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::warn;

    let Some(path) = reload.path else {
        return;
    };
    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(err) => {
                warn!(error = %err, "SIGHUP handler unavailable, reload disabled");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            let mut config = match AppConfig::load(Some(&path)) {
                Ok(config) => config.link,
                Err(err) => {
                    warn!(error = %err, "configuration reload failed");
                    continue;
                }
            };
            if let Some(channel) = reload.channel {
                config.channel = channel;
            }
            info!(path = %path.display(), "configuration reloaded");
            if commands
                .send(BridgeCommand::ApplyConfig(Box::new(config)))
                .await
                .is_err()
            {
                break;
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload(_reload: Reload, _commands: mpsc::Sender<BridgeCommand>) {}

async fn report_events(mut events: mpsc::Receiver<LinkEvent>, print: Option<OutputFormat>) {
    while let Some(event) = events.recv().await {
        info!(event = %describe_event(&event), "link event");
        if let Some(format) = print {
            print_event(&event, format);
        }
    }
}
