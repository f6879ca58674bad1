//! Two bridges sharing an in-memory radio.
//!
//! Run with:
//!   cargo run --example loopback --features link
//!
//! A frame written to the first bridge's serial side comes out of the
//! second bridge's serial side.

use std::time::Instant;

use rnsnow::frame::{encode_frame, FrameDecoder};
use rnsnow::link::{Bridge, LinkConfig, LinkEvent};
use rnsnow::transport::{MemoryAir, PeerAddr};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let air = MemoryAir::new();
    let config = LinkConfig::default();

    let mut alice = Bridge::new(
        config.clone(),
        air.attach(PeerAddr::new([2, 0, 0, 0, 0, 1]), config.channel)?,
        Vec::new(),
        Vec::<LinkEvent>::new(),
    )?;
    let mut bob = Bridge::new(
        config.clone(),
        air.attach(PeerAddr::new([2, 0, 0, 0, 0, 2]), config.channel)?,
        Vec::new(),
        Vec::<LinkEvent>::new(),
    )?;

    let message: Vec<u8> = b"reticulum announce ".repeat(40);
    let mut wire = bytes::BytesMut::new();
    encode_frame(&message, &mut wire);

    let now = Instant::now();
    alice.on_serial_bytes(&wire, now)?;
    bob.poll_radio(now)?;

    for frame in FrameDecoder::new().decode(bob.serial()) {
        eprintln!("bob received a {} byte frame", frame.len());
    }
    eprintln!(
        "alice sent {} radio packets for one {} byte frame",
        alice.stats().packets_sent,
        message.len()
    );
    for event in bob.events() {
        eprintln!("bob event: {}", serde_json::to_string(event)?);
    }
    Ok(())
}
