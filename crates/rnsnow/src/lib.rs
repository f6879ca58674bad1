//! Carry Reticulum HDLC serial frames over a short-range broadcast radio.
//!
//! A host speaks HDLC-framed packets on a serial link. rnsnow splits each
//! frame into radio-sized packets, broadcasts them to every peer in the same
//! group and reassembles incoming packets back onto the serial link.
//!
//! # Crate Structure
//!
//! - [`transport`] - Radio boundary (in-memory and UDP radios, serial devices)
//! - [`frame`] - HDLC framing for the serial link
//! - [`link`] - Fragmentation, channel discovery and the bridge (behind `link` feature)

/// Re-export transport types.
pub mod transport {
    pub use rnsnow_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rnsnow_frame::*;
}

/// Re-export link types (requires `link` feature).
#[cfg(feature = "link")]
pub mod link {
    pub use rnsnow_link::*;
}
