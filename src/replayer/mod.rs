//! Playback Engine
//!
//! Drives a register stream into a chip one tick at a time and collects the
//! four-channel PCM frames. IMF streams feed the chip's latency queue the
//! way the original card drivers did; register dumps bypass it because
//! their delays already include the settle time.

use std::path::Path;

use crate::formats::{RegisterStream, StreamEvent};
#[cfg(feature = "imf-format")]
use crate::formats::ImfStream;
#[cfg(feature = "regdump-format")]
use crate::formats::RegdumpStream;
use crate::ymf262::{Ymf262, NATIVE_SAMPLE_RATE};
use crate::{Result, Ymf262Error};

/// Playback timing configuration.
#[derive(Debug, Clone, Copy)]
pub struct TimingConfig {
    /// IMF command rate in Hz.
    pub imf_rate: u32,
}

impl TimingConfig {
    /// 700 Hz command rate (Wolfenstein 3D, Blake Stone, Corridor 7).
    pub fn wolfenstein_3d() -> Self {
        TimingConfig { imf_rate: 700 }
    }

    /// 560 Hz command rate (Commander Keen, Bio Menace, Monster Bash).
    pub fn commander_keen() -> Self {
        TimingConfig { imf_rate: 560 }
    }

    /// 280 Hz command rate (Duke Nukem II).
    pub fn duke_nukem_ii() -> Self {
        TimingConfig { imf_rate: 280 }
    }

    /// Chip ticks per IMF command period.
    pub fn ticks_per_command(&self) -> u32 {
        NATIVE_SAMPLE_RATE / self.imf_rate.max(1)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::commander_keen()
    }
}

/// Supported stream formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// id Software music format.
    Imf,
    /// Raw register dump.
    Regdump,
}

impl StreamFormat {
    /// Guess the format from a file name; IMF rips commonly use `.imf` or
    /// `.wlf`, dumps anything else.
    pub fn from_path<P: AsRef<Path>>(path: P) -> StreamFormat {
        match path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("imf") | Some("wlf") => StreamFormat::Imf,
            _ => StreamFormat::Regdump,
        }
    }
}

/// File playback engine: one chip plus one register stream.
pub struct Replayer {
    chip: Ymf262,
    stream: Box<dyn RegisterStream>,
    buffered: bool,
    finished: bool,
}

impl Replayer {
    /// Wrap an already-parsed stream.
    pub fn new(stream: Box<dyn RegisterStream>) -> Self {
        let buffered = stream.buffered_writes();
        Replayer {
            chip: Ymf262::new(),
            stream,
            buffered,
            finished: false,
        }
    }

    /// Parse IMF data and build a replayer for it.
    #[cfg(feature = "imf-format")]
    pub fn from_imf(data: &[u8], config: TimingConfig) -> Result<Self> {
        Ok(Self::new(Box::new(ImfStream::new(data, config.imf_rate)?)))
    }

    /// Parse register dump data and build a replayer for it.
    #[cfg(feature = "regdump-format")]
    pub fn from_regdump(data: &[u8]) -> Result<Self> {
        Ok(Self::new(Box::new(RegdumpStream::new(data)?)))
    }

    /// Parse data in the given format.
    pub fn load(data: &[u8], format: StreamFormat, config: TimingConfig) -> Result<Self> {
        match format {
            StreamFormat::Imf => Self::from_imf(data, config),
            StreamFormat::Regdump => Self::from_regdump(data),
        }
    }

    /// The chip being driven.
    pub fn chip(&self) -> &Ymf262 {
        &self.chip
    }

    /// Whether the stream has ended.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Stream format name.
    pub fn stream_name(&self) -> &'static str {
        self.stream.name()
    }

    /// Advance one tick: apply the stream's due write (if any), tick the
    /// chip and return its frame. `None` once the stream ends.
    pub fn step(&mut self) -> Option<[i16; 4]> {
        if self.finished {
            return None;
        }
        match self.stream.next_event() {
            StreamEvent::Write { address, value } => {
                if self.buffered {
                    if !self.chip.enqueue_write(address, value) {
                        // Queue full: fall back to the immediate port
                        // rather than lose the write.
                        self.chip.write(address, value);
                    }
                } else {
                    self.chip.write(address, value);
                }
            }
            StreamEvent::Idle => {}
            StreamEvent::End => {
                self.finished = true;
                return None;
            }
        }
        self.chip.tick();
        Some(self.chip.outputs())
    }

    /// Render up to `frames` frames; stops early at end of stream.
    pub fn render(&mut self, frames: usize) -> Vec<[i16; 4]> {
        let mut out = Vec::with_capacity(frames);
        for _ in 0..frames {
            match self.step() {
                Some(frame) => out.push(frame),
                None => break,
            }
        }
        out
    }

    /// Render until the stream ends.
    pub fn render_to_end(&mut self) -> Vec<[i16; 4]> {
        let mut out = Vec::new();
        while let Some(frame) = self.step() {
            out.push(frame);
        }
        out
    }

    /// Rewind the stream and reset the chip.
    pub fn restart(&mut self) {
        self.stream.restart();
        self.chip.reset();
        self.finished = false;
    }
}

impl std::fmt::Debug for Replayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replayer")
            .field("stream", &self.stream.name())
            .field("buffered", &self.buffered)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Convenience wrapper: detect the format from the file name, parse and
/// build a replayer.
pub fn load_file<P: AsRef<Path>>(path: P, config: TimingConfig) -> Result<Replayer> {
    let data = std::fs::read(&path).map_err(Ymf262Error::Io)?;
    Replayer::load(&data, StreamFormat::from_path(&path), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_config_defaults() {
        let config = TimingConfig::default();
        assert_eq!(config.imf_rate, 560);
        assert_eq!(config.ticks_per_command(), NATIVE_SAMPLE_RATE / 560);
        assert_eq!(TimingConfig::wolfenstein_3d().imf_rate, 700);
    }

    #[test]
    fn test_format_detection_by_extension() {
        assert_eq!(StreamFormat::from_path("song.imf"), StreamFormat::Imf);
        assert_eq!(StreamFormat::from_path("SONG.WLF"), StreamFormat::Imf);
        assert_eq!(StreamFormat::from_path("dump.bin"), StreamFormat::Regdump);
        assert_eq!(StreamFormat::from_path("noext"), StreamFormat::Regdump);
    }

    #[test]
    fn test_empty_stream_finishes_immediately() {
        let mut replayer = Replayer::from_regdump(&[]).unwrap();
        assert!(replayer.step().is_none());
        assert!(replayer.finished());
        assert!(replayer.render(16).is_empty());
    }

    #[test]
    fn test_restart_resets_chip_and_stream() {
        let data = [0x00, 0x20, 0x01, 0x00, 0xA0, 0x44];
        let mut replayer = Replayer::from_regdump(&data).unwrap();
        let first = replayer.render_to_end();
        replayer.restart();
        let second = replayer.render_to_end();
        assert_eq!(first, second);
    }
}
