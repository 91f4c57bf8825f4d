//! Register Stream Formats
//!
//! Parser implementations for on-disk OPL register write logs:
//! - IMF (id Software music format, 4-byte write/delay records)
//! - Raw register dumps (3-byte records with embedded tick delays)
//!
//! Both formats drive the chip one tick at a time: each tick yields at most
//! one register write, mirroring how the original players fed the bus.

#[cfg(feature = "imf-format")]
pub mod imf;
#[cfg(feature = "regdump-format")]
pub mod regdump;

#[cfg(feature = "imf-format")]
pub use imf::{guess_imf_type, ImfStream};
#[cfg(feature = "regdump-format")]
pub use regdump::RegdumpStream;

/// What a stream produced for one chip tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// A register write due on this tick.
    Write {
        /// Bus address, bank bit included.
        address: u16,
        /// Register value.
        value: u8,
    },
    /// Nothing due on this tick.
    Idle,
    /// The stream is exhausted.
    End,
}

/// A tick-driven source of chip register writes.
pub trait RegisterStream {
    /// Advance one chip tick.
    fn next_event(&mut self) -> StreamEvent;

    /// Rewind to the start of the stream.
    fn restart(&mut self);

    /// Whether writes should go through the chip's latency queue rather
    /// than the immediate write port.
    fn buffered_writes(&self) -> bool {
        true
    }

    /// Stream format name.
    fn name(&self) -> &'static str;
}
