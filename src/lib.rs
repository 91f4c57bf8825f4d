//! YMF262 (OPL3) FM Synthesis Emulator
//!
//! A cycle-accurate emulator of the Yamaha YMF262 four-operator FM synthesis
//! chip as found on Sound Blaster and AdLib Gold era sound cards. The core
//! reproduces the chip's per-sample pipeline bit-for-bit: phase generators,
//! envelope generators, wave generators, the noise LFSR, the rhythm
//! (percussion) mixer and the four-channel output accumulator, all running
//! at the native 49716 Hz sample rate.
//!
//! # Features
//! - All 36 operator slots and 18 two-operator channels, with 4-op pairing
//! - All 8 hardware waveforms and both register banks
//! - Rhythm mode (bass drum, snare, hi-hat, tom-tom, top cymbal)
//! - Tremolo/vibrato LFOs and the 37-bit envelope timer
//! - Latency-accurate register write queue
//! - IMF and raw register dump stream parsing and playback
//! - PCM frame rendering and WAV export
//!
//! # Crate feature flags
//! - `imf-format` (default): IMF stream parsing (`formats::imf`)
//! - `regdump-format` (default): register dump stream parsing (`formats::regdump`)
//! - `replayer` (default): file playback engine (`replayer`)
//! - `export` (default): WAV export of rendered frames (`export`)
//!
//! # Quick start
//! ## Core emulator only
//! ```no_run
//! use ymf262::Ymf262;
//! let mut chip = Ymf262::new();
//! chip.write(0x20, 0x01); // Operator 0: mult = 1
//! chip.write(0x40, 0x10); // Operator 0: total level
//! chip.write(0xA0, 0x44); // Channel 0: fnum low
//! chip.write(0xB0, 0x32); // Channel 0: block + key-on
//! chip.tick();
//! let [a, b, c, d] = chip.outputs();
//! # let _ = (a, b, c, d);
//! ```
//!
//! ## Render an IMF song to PCM frames
//! ```no_run
//! # #[cfg(feature = "replayer")]
//! # {
//! use ymf262::replayer::{Replayer, TimingConfig};
//! let data = std::fs::read("song.imf").unwrap();
//! let mut replayer = Replayer::from_imf(&data, TimingConfig::default()).unwrap();
//! let frames = replayer.render_to_end();
//! # let _ = frames;
//! # }
//! ```

#![warn(missing_docs)]

// Domain modules (feature-gated for modular use)
pub mod ymf262; // YMF262 OPL3 emulation (core)

#[cfg(feature = "export")]
pub mod export; // WAV export
#[cfg(any(feature = "imf-format", feature = "regdump-format"))]
pub mod formats; // Register stream parsing
#[cfg(feature = "replayer")]
pub mod replayer; // Playback engine

/// Error types for YMF262 emulator operations
#[derive(thiserror::Error, Debug)]
pub enum Ymf262Error {
    /// Error while parsing file format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Ymf262Error {
    fn from(msg: String) -> Self {
        Ymf262Error::Other(msg)
    }
}

impl From<&str> for Ymf262Error {
    fn from(msg: &str) -> Self {
        Ymf262Error::Other(msg.to_string())
    }
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, Ymf262Error>;

// Public API exports
pub use ymf262::{Ymf262, NATIVE_SAMPLE_RATE};

#[cfg(feature = "export")]
pub use export::write_wav;
#[cfg(any(feature = "imf-format", feature = "regdump-format"))]
pub use formats::{RegisterStream, StreamEvent};
#[cfg(feature = "replayer")]
pub use replayer::{Replayer, StreamFormat, TimingConfig};
