//! WAV Export
//!
//! Folds the chip's four output channels into a stereo 16-bit WAV file:
//! A and B sum onto the left channel, C and D onto the right, as on the
//! card's analog output stage.

use std::path::Path;

use crate::ymf262::NATIVE_SAMPLE_RATE;
use crate::{Result, Ymf262Error};

/// Sum a pair of outputs onto one analog channel.
fn mix_pair(primary: i16, secondary: i16) -> i16 {
    (primary as i32 + secondary as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Write rendered frames as a stereo 16-bit WAV at the chip's native rate.
pub fn write_wav<P: AsRef<Path>>(path: P, frames: &[[i16; 4]]) -> Result<()> {
    write_wav_with_rate(path, frames, NATIVE_SAMPLE_RATE)
}

/// Write rendered frames as a stereo 16-bit WAV at a caller-chosen rate
/// (the samples are not resampled; the rate only lands in the header).
pub fn write_wav_with_rate<P: AsRef<Path>>(
    path: P,
    frames: &[[i16; 4]],
    sample_rate: u32,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| Ymf262Error::AudioFileError(e.to_string()))?;
    for &[a, b, c, d] in frames {
        writer
            .write_sample(mix_pair(a, b))
            .and_then(|_| writer.write_sample(mix_pair(c, d)))
            .map_err(|e| Ymf262Error::AudioFileError(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| Ymf262Error::AudioFileError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_pair_saturates() {
        assert_eq!(mix_pair(20000, 20000), i16::MAX);
        assert_eq!(mix_pair(-20000, -20000), i16::MIN);
        assert_eq!(mix_pair(100, -40), 60);
    }

    #[test]
    fn test_wav_round_trip() {
        let path = std::env::temp_dir().join("ymf262_export_test.wav");
        let frames = vec![[100, 0, -100, 0], [0, 200, 0, -200]];
        write_wav(&path, &frames).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, NATIVE_SAMPLE_RATE);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -100, 200, -200]);
        let _ = std::fs::remove_file(&path);
    }
}
