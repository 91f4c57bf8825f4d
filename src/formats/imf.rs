//! IMF Format Parser
//!
//! The id Software Music Format is a flat list of 4-byte records
//! `{address_lo, value, delay_lo, delay_hi}` at a fixed command rate,
//! optionally prefixed with a 2-byte data length ("type 1" files). Delays
//! count IMF periods, not chip samples, so playback divides the chip rate
//! by the IMF rate. A write to the virtual register 0x05 latches the upper
//! address byte for the OPL3 extended range instead of reaching the bus.
//!
//! See: <https://moddingwiki.shikadi.net/wiki/IMF_Format>

use nom::multi::many0;
use nom::number::complete::{le_u16, le_u8};
use nom::sequence::tuple;
use nom::IResult;

use super::{RegisterStream, StreamEvent};
use crate::ymf262::NATIVE_SAMPLE_RATE;
use crate::{Result, Ymf262Error};

/// One IMF record.
#[derive(Debug, Clone, Copy)]
struct ImfEvent {
    address_lo: u8,
    value: u8,
    delay: u16,
}

fn parse_event(input: &[u8]) -> IResult<&[u8], ImfEvent> {
    let (input, (address_lo, value, delay_lo, delay_hi)) =
        tuple((le_u8, le_u8, le_u8, le_u8))(input)?;
    Ok((
        input,
        ImfEvent {
            address_lo,
            value,
            delay: ((delay_hi as u16) << 8) | delay_lo as u16,
        },
    ))
}

/// Guess whether IMF data carries a type-1 length prefix.
///
/// Checksums the first words the way the original rippers did: type-1 data
/// keeps its delays in the odd words, which sum lower than the write words.
pub fn guess_imf_type(data: &[u8]) -> u8 {
    if data.len() < 2 {
        return 0;
    }
    let word = data[0] as u16 | ((data[1] as u16) << 8);
    if word == 0 || word & 3 != 0 {
        return 0;
    }

    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;
    let mut rest = &data[2..];
    for _ in 0..42 {
        if rest.len() < 4 {
            break;
        }
        sum1 += rest[0] as u32 | ((rest[1] as u32) << 8);
        sum2 += rest[2] as u32 | ((rest[3] as u32) << 8);
        rest = &rest[4..];
    }
    (sum1 > sum2) as u8
}

/// Tick-driven IMF playback stream.
#[derive(Debug, Clone)]
pub struct ImfStream {
    events: Vec<ImfEvent>,
    division: u32,
    divider: u32,
    delay: u16,
    index: usize,
    address_hi: u8,
}

impl ImfStream {
    /// Parse IMF data at the given command rate, guessing the file type
    /// from the content.
    pub fn new(data: &[u8], imf_rate: u32) -> Result<Self> {
        Self::with_type(data, imf_rate, guess_imf_type(data))
    }

    /// Parse IMF data with an explicit file type (1 = length-prefixed).
    pub fn with_type(data: &[u8], imf_rate: u32, imf_type: u8) -> Result<Self> {
        if imf_rate == 0 || imf_rate > NATIVE_SAMPLE_RATE {
            return Err(Ymf262Error::ConfigError(format!(
                "IMF rate {imf_rate} outside 1..={NATIVE_SAMPLE_RATE}"
            )));
        }
        let division = NATIVE_SAMPLE_RATE / imf_rate;

        let events = if imf_type != 0 {
            let (rest, length) = le_u16::<_, nom::error::Error<&[u8]>>(data)
                .map_err(|_| Ymf262Error::ParseError("IMF data shorter than its header".into()))?;
            let (_, mut events) = many0(parse_event)(rest)
                .map_err(|e| Ymf262Error::ParseError(format!("bad IMF record: {e}")))?;
            events.truncate(length as usize / 4);
            events
        } else {
            let (_, events) = many0(parse_event)(data)
                .map_err(|e| Ymf262Error::ParseError(format!("bad IMF record: {e}")))?;
            events
        };

        Ok(ImfStream {
            events,
            division,
            divider: 0,
            delay: 0,
            index: 0,
            address_hi: 0,
        })
    }

    /// Number of records in the stream.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the stream has no records.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl RegisterStream for ImfStream {
    fn next_event(&mut self) -> StreamEvent {
        if self.divider > 0 {
            self.divider -= 1;
        }
        if self.divider > 0 {
            return StreamEvent::Idle;
        }
        self.divider = self.division;

        if self.delay > 0 {
            self.delay -= 1;
        }
        if self.delay > 0 {
            return StreamEvent::Idle;
        }

        let Some(event) = self.events.get(self.index) else {
            return StreamEvent::End;
        };
        self.index += 1;
        self.delay = event.delay;

        // Virtual register 0x05 extends the address range for OPL3
        if event.address_lo == 0x05 {
            self.address_hi = event.value & 0x01;
            StreamEvent::Idle
        } else {
            StreamEvent::Write {
                address: ((self.address_hi as u16) << 8) | event.address_lo as u16,
                value: event.value,
            }
        }
    }

    fn restart(&mut self) {
        self.divider = 0;
        self.delay = 0;
        self.index = 0;
        self.address_hi = 0;
    }

    fn name(&self) -> &'static str {
        "IMF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(addr: u8, value: u8, delay: u16) -> [u8; 4] {
        [addr, value, delay as u8, (delay >> 8) as u8]
    }

    fn concat(records: &[[u8; 4]]) -> Vec<u8> {
        records.iter().flatten().copied().collect()
    }

    #[test]
    fn test_plain_file_emits_writes_in_order() {
        let data = concat(&[record(0x20, 0x01, 0), record(0x40, 0x3F, 0)]);
        let mut stream = ImfStream::with_type(&data, NATIVE_SAMPLE_RATE, 0).unwrap();
        assert_eq!(
            stream.next_event(),
            StreamEvent::Write {
                address: 0x20,
                value: 0x01
            }
        );
        assert_eq!(
            stream.next_event(),
            StreamEvent::Write {
                address: 0x40,
                value: 0x3F
            }
        );
        assert_eq!(stream.next_event(), StreamEvent::End);
    }

    #[test]
    fn test_delay_counts_imf_periods() {
        // 2 chip ticks per IMF period.
        let rate = NATIVE_SAMPLE_RATE / 2;
        let data = concat(&[record(0x20, 0x01, 2), record(0x40, 0x3F, 0)]);
        let mut stream = ImfStream::with_type(&data, rate, 0).unwrap();
        assert!(matches!(stream.next_event(), StreamEvent::Write { .. }));
        let mut idles = 0;
        loop {
            match stream.next_event() {
                StreamEvent::Idle => idles += 1,
                StreamEvent::Write { address, .. } => {
                    assert_eq!(address, 0x40);
                    break;
                }
                StreamEvent::End => panic!("stream ended early"),
            }
        }
        // One period of divider plus one period of delay.
        assert_eq!(idles, 3);
    }

    #[test]
    fn test_virtual_register_latches_high_address() {
        let data = concat(&[record(0x05, 0x01, 0), record(0x04, 0x55, 0)]);
        let mut stream = ImfStream::with_type(&data, NATIVE_SAMPLE_RATE, 0).unwrap();
        assert_eq!(stream.next_event(), StreamEvent::Idle);
        assert_eq!(
            stream.next_event(),
            StreamEvent::Write {
                address: 0x104,
                value: 0x55
            }
        );
    }

    #[test]
    fn test_type1_header_caps_length() {
        let mut data = vec![4, 0]; // one record according to the header
        data.extend_from_slice(&record(0x20, 0x01, 0));
        data.extend_from_slice(&record(0x40, 0x3F, 0));
        let mut stream = ImfStream::with_type(&data, NATIVE_SAMPLE_RATE, 1).unwrap();
        assert!(matches!(stream.next_event(), StreamEvent::Write { .. }));
        assert_eq!(stream.next_event(), StreamEvent::End);
    }

    #[test]
    fn test_guess_type() {
        // Type 0: starts with a zero word.
        let plain = concat(&[record(0x00, 0x00, 1), record(0x20, 0x01, 0)]);
        assert_eq!(guess_imf_type(&plain), 0);
        // Type 1: nonzero multiple of 4, write words outweigh delay words.
        let mut prefixed = vec![8, 0];
        prefixed.extend_from_slice(&record(0xB0, 0xFF, 0));
        prefixed.extend_from_slice(&record(0xB0, 0xFF, 0));
        assert_eq!(guess_imf_type(&prefixed), 1);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        assert!(ImfStream::with_type(&[], 0, 0).is_err());
        assert!(ImfStream::with_type(&[], NATIVE_SAMPLE_RATE + 1, 0).is_err());
    }

    #[test]
    fn test_restart_replays_from_start() {
        let data = concat(&[record(0x20, 0x01, 0)]);
        let mut stream = ImfStream::with_type(&data, NATIVE_SAMPLE_RATE, 0).unwrap();
        assert!(matches!(stream.next_event(), StreamEvent::Write { .. }));
        assert_eq!(stream.next_event(), StreamEvent::End);
        stream.restart();
        assert!(matches!(stream.next_event(), StreamEvent::Write { .. }));
    }
}
