//! Async runtime for a [`Bridge`].
//!
//! One task owns the bridge and multiplexes, with `tokio::select!`:
//! - serial input chunks from a reader task
//! - control commands
//! - a maintenance interval that drains the radio and runs [`Bridge::tick`]
//! - a shutdown signal
//!
//! Every branch finishes without blocking, so a current-thread runtime gives
//! the single-threaded cooperative scheduling the bridge expects.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use bytes::Bytes;
use rnsnow_transport::Radio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::config::LinkConfig;
use crate::error::Result;
use crate::events::EventSink;

/// Default maintenance interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Suggested capacity for the serial and command inboxes.
pub const INBOX_CAPACITY: usize = 64;

const READ_CHUNK_SIZE: usize = 1024;

/// Commands accepted by a running driver.
#[derive(Debug, Clone)]
pub enum BridgeCommand {
    StartDiscovery,
    AbortDiscovery,
    ApplyConfig(Box<LinkConfig>),
    SetChannel(u8),
    Ping,
}

/// Driver settings.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// How often the radio is drained and maintenance runs.
    pub tick_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

fn now() -> std::time::Instant {
    time::Instant::now().into_std()
}

/// Run `bridge` until `shutdown` becomes `true` or its sender is dropped.
///
/// The serial and command inboxes may close early; the bridge keeps serving
/// the radio until shutdown. Serial chunks already queued at shutdown are
/// still sent. A closed serial link ends the run with an error; a single
/// failed serial write only drops that frame. Returns the bridge so the
/// caller can read its final stats.
pub async fn run<R, W, E>(
    mut bridge: Bridge<R, W, E>,
    mut serial_rx: mpsc::Receiver<Bytes>,
    mut commands: mpsc::Receiver<BridgeCommand>,
    mut shutdown: watch::Receiver<bool>,
    config: DriverConfig,
) -> Result<Bridge<R, W, E>>
where
    R: Radio,
    W: Write,
    E: EventSink,
{
    let mut ticker = time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut serial_open = true;
    let mut commands_open = true;

    info!(channel = bridge.channel(), "bridge driver started");
    if *shutdown.borrow() {
        return Ok(bridge);
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            chunk = serial_rx.recv(), if serial_open => match chunk {
                Some(bytes) => bridge.on_serial_bytes(&bytes, now())?,
                None => {
                    debug!("serial input closed");
                    serial_open = false;
                }
            },
            command = commands.recv(), if commands_open => match command {
                Some(command) => execute(&mut bridge, command)?,
                None => commands_open = false,
            },
            _ = ticker.tick() => {
                let now = now();
                bridge.poll_radio(now)?;
                bridge.tick(now)?;
            }
        }
    }

    // Input that arrived before shutdown is still forwarded.
    while let Ok(bytes) = serial_rx.try_recv() {
        bridge.on_serial_bytes(&bytes, now())?;
    }

    info!("bridge driver stopped");
    Ok(bridge)
}

fn execute<R, W, E>(bridge: &mut Bridge<R, W, E>, command: BridgeCommand) -> Result<()>
where
    R: Radio,
    W: Write,
    E: EventSink,
{
    debug!(?command, "bridge command");
    let result = match command {
        BridgeCommand::StartDiscovery => bridge.start_discovery(now()),
        BridgeCommand::AbortDiscovery => bridge.abort_discovery(),
        BridgeCommand::ApplyConfig(config) => bridge.apply_config(*config),
        BridgeCommand::SetChannel(channel) => bridge.set_channel(channel),
        BridgeCommand::Ping => bridge.send_ping(now()),
    };
    // A rejected command leaves the bridge as it was.
    if let Err(err) = result {
        warn!(error = %err, "bridge command failed");
    }
    Ok(())
}

/// Pump an async byte stream (stdin, a pipe) into a serial inbox.
pub fn spawn_async_reader<Rd>(mut reader: Rd, tx: mpsc::Sender<Bytes>) -> JoinHandle<()>
where
    Rd: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!("serial reader reached EOF");
                    break;
                }
                Ok(n) => {
                    if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(error = %err, "serial read failed");
                    break;
                }
            }
        }
    })
}

/// Pump a blocking reader (a serial device) into a serial inbox.
///
/// Runs on the blocking pool. The reader should have a read timeout so the
/// task notices when the inbox is closed.
pub fn spawn_blocking_reader<Rd>(mut reader: Rd, tx: mpsc::Sender<Bytes>) -> JoinHandle<()>
where
    Rd: Read + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        while !tx.is_closed() {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("serial reader reached EOF");
                    break;
                }
                Ok(n) => {
                    if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        break;
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(err) => {
                    warn!(error = %err, "serial read failed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use bytes::BytesMut;
    use rnsnow_frame::{encode_frame, FrameDecoder};
    use rnsnow_transport::{MemoryAir, PeerAddr};

    use super::*;
    use crate::events::LinkEvent;

    const A: PeerAddr = PeerAddr::new([2, 0, 0, 0, 0, 0xA]);
    const B: PeerAddr = PeerAddr::new([2, 0, 0, 0, 0, 0xB]);

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn hdlc(payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        encode_frame(payload, &mut buf);
        buf.freeze()
    }

    fn fast() -> DriverConfig {
        DriverConfig {
            tick_interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_serial_to_radio_to_serial() {
        let air = MemoryAir::new();
        let config = LinkConfig::default();
        let out_b = SharedBuf::default();

        let bridge_a = Bridge::new(
            config.clone(),
            air.attach(A, 1).unwrap(),
            Vec::<u8>::new(),
            Vec::<LinkEvent>::new(),
        )
        .unwrap();
        let bridge_b = Bridge::new(
            config,
            air.attach(B, 1).unwrap(),
            out_b.clone(),
            Vec::<LinkEvent>::new(),
        )
        .unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let (serial_a_tx, serial_a_rx) = mpsc::channel(INBOX_CAPACITY);
        let (_serial_b_tx, serial_b_rx) = mpsc::channel(INBOX_CAPACITY);
        let (_cmd_a_tx, cmd_a_rx) = mpsc::channel(INBOX_CAPACITY);
        let (_cmd_b_tx, cmd_b_rx) = mpsc::channel(INBOX_CAPACITY);

        let task_a = tokio::spawn(run(bridge_a, serial_a_rx, cmd_a_rx, stop_rx.clone(), fast()));
        let task_b = tokio::spawn(run(bridge_b, serial_b_rx, cmd_b_rx, stop_rx, fast()));

        let frame: Vec<u8> = (0..700).map(|i| (i % 256) as u8).collect();
        let wire = hdlc(&frame);
        // Arbitrary chunking on the serial side.
        for chunk in wire.chunks(97) {
            serial_a_tx
                .send(Bytes::copy_from_slice(chunk))
                .await
                .unwrap();
        }

        let deadline = time::Instant::now() + Duration::from_secs(2);
        loop {
            let delivered = FrameDecoder::new().decode(&out_b.0.lock().unwrap());
            if !delivered.is_empty() {
                assert_eq!(delivered[0].as_ref(), frame.as_slice());
                break;
            }
            assert!(time::Instant::now() < deadline, "frame never arrived");
            time::sleep(Duration::from_millis(5)).await;
        }

        stop_tx.send(true).unwrap();
        let bridge_a = task_a.await.unwrap().unwrap();
        let bridge_b = task_b.await.unwrap().unwrap();
        assert_eq!(bridge_a.stats().frames_from_serial, 1);
        assert_eq!(bridge_a.stats().packets_sent, 3);
        assert_eq!(bridge_b.stats().frames_to_serial, 1);
    }

    #[tokio::test]
    async fn test_discovery_command_finds_peer() {
        let air = MemoryAir::new();
        let mut config = LinkConfig::default();
        config.discovery.listen_window_ms = 60;

        let (events_tx, mut events_rx) = mpsc::channel(64);
        let bridge_a = Bridge::new(
            config.clone(),
            air.attach(A, 1).unwrap(),
            Vec::<u8>::new(),
            events_tx,
        )
        .unwrap();
        let peer_config = LinkConfig {
            channel: 11,
            ..config
        };
        let bridge_b = Bridge::new(
            peer_config,
            air.attach(B, 11).unwrap(),
            Vec::<u8>::new(),
            Vec::<LinkEvent>::new(),
        )
        .unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let (_serial_a_tx, serial_a_rx) = mpsc::channel(INBOX_CAPACITY);
        let (_serial_b_tx, serial_b_rx) = mpsc::channel(INBOX_CAPACITY);
        let (cmd_a_tx, cmd_a_rx) = mpsc::channel(INBOX_CAPACITY);
        let (_cmd_b_tx, cmd_b_rx) = mpsc::channel(INBOX_CAPACITY);

        let task_a = tokio::spawn(run(bridge_a, serial_a_rx, cmd_a_rx, stop_rx.clone(), fast()));
        let task_b = tokio::spawn(run(bridge_b, serial_b_rx, cmd_b_rx, stop_rx, fast()));

        cmd_a_tx.send(BridgeCommand::StartDiscovery).await.unwrap();

        let outcome = time::timeout(Duration::from_secs(3), async {
            while let Some(event) = events_rx.recv().await {
                if let LinkEvent::DiscoveryCompleted(outcome) = event {
                    return Some(outcome);
                }
            }
            None
        })
        .await
        .expect("discovery timed out")
        .expect("event stream ended");

        assert_eq!(outcome.channel, 11);
        assert!(!outcome.fallback);

        stop_tx.send(true).unwrap();
        let bridge_a = task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();
        assert_eq!(bridge_a.channel(), 11);
    }

    #[tokio::test]
    async fn test_closed_inboxes_keep_running_until_shutdown() {
        let air = MemoryAir::new();
        let bridge = Bridge::new(
            LinkConfig::default(),
            air.attach(A, 1).unwrap(),
            Vec::<u8>::new(),
            Vec::<LinkEvent>::new(),
        )
        .unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (serial_tx, serial_rx) = mpsc::channel(1);
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        drop(serial_tx);
        drop(cmd_tx);

        let task = tokio::spawn(run(bridge, serial_rx, cmd_rx, stop_rx, fast()));
        time::sleep(Duration::from_millis(30)).await;
        assert!(!task.is_finished());

        drop(stop_tx);
        let bridge = task.await.unwrap().unwrap();
        assert_eq!(bridge.stats().frames_from_serial, 0);
    }

    #[tokio::test]
    async fn test_async_reader_forwards_chunks() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = spawn_async_reader(Cursor::new(b"serial bytes".to_vec()), tx);

        let mut got = Vec::new();
        while let Some(chunk) = rx.recv().await {
            got.extend_from_slice(&chunk);
        }
        handle.await.unwrap();
        assert_eq!(got, b"serial bytes");
    }

    #[tokio::test]
    async fn test_blocking_reader_forwards_chunks() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = spawn_blocking_reader(std::io::Cursor::new(vec![0x7E, 1, 2, 0x7E]), tx);

        let mut got = Vec::new();
        while let Some(chunk) = rx.recv().await {
            got.extend_from_slice(&chunk);
        }
        handle.await.unwrap();
        assert_eq!(got, vec![0x7E, 1, 2, 0x7E]);
    }
}
