//! Raw Register Dump Parser
//!
//! A register dump is a flat list of 3-byte records `{address_hi,
//! address_lo, value}`. Records with the top address bit set are delay
//! markers instead: the remaining 23 bits hold a tick count to wait before
//! the next record. Delays are already in chip samples, so no rate division
//! applies.

use nom::multi::many0;
use nom::number::complete::le_u8;
use nom::sequence::tuple;
use nom::IResult;

use super::{RegisterStream, StreamEvent};
use crate::{Result, Ymf262Error};

/// One register dump record.
#[derive(Debug, Clone, Copy)]
struct RegdumpEvent {
    address_hi: u8,
    address_lo: u8,
    value: u8,
}

fn parse_event(input: &[u8]) -> IResult<&[u8], RegdumpEvent> {
    let (input, (address_hi, address_lo, value)) = tuple((le_u8, le_u8, le_u8))(input)?;
    Ok((
        input,
        RegdumpEvent {
            address_hi,
            address_lo,
            value,
        },
    ))
}

/// Tick-driven register dump playback stream.
#[derive(Debug, Clone)]
pub struct RegdumpStream {
    events: Vec<RegdumpEvent>,
    index: usize,
    delay: u32,
}

impl RegdumpStream {
    /// Parse register dump data.
    pub fn new(data: &[u8]) -> Result<Self> {
        let (_, events) = many0(parse_event)(data)
            .map_err(|e| Ymf262Error::ParseError(format!("bad register dump record: {e}")))?;
        Ok(RegdumpStream {
            events,
            index: 0,
            delay: 0,
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

impl RegisterStream for RegdumpStream {
    fn next_event(&mut self) -> StreamEvent {
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

        if event.address_hi & 0x80 != 0 {
            self.delay = (((event.address_hi & 0x7F) as u32) << 16)
                | ((event.address_lo as u32) << 8)
                | event.value as u32;
            StreamEvent::Idle
        } else {
            StreamEvent::Write {
                address: ((event.address_hi as u16) << 8) | event.address_lo as u16,
                value: event.value,
            }
        }
    }

    fn restart(&mut self) {
        self.index = 0;
        self.delay = 0;
    }

    fn buffered_writes(&self) -> bool {
        // Dumps capture the bus after the chip's settle time; replay them
        // through the immediate write port.
        false
    }

    fn name(&self) -> &'static str {
        "register dump"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_carry_bank_bit() {
        let data = [0x01, 0x05, 0x01, 0x00, 0xB0, 0x35];
        let mut stream = RegdumpStream::new(&data).unwrap();
        assert_eq!(
            stream.next_event(),
            StreamEvent::Write {
                address: 0x105,
                value: 0x01
            }
        );
        assert_eq!(
            stream.next_event(),
            StreamEvent::Write {
                address: 0xB0,
                value: 0x35
            }
        );
        assert_eq!(stream.next_event(), StreamEvent::End);
    }

    #[test]
    fn test_delay_marker_waits_ticks() {
        // Delay of 3 ticks between two writes.
        let data = [0x00, 0x20, 0x01, 0x80, 0x00, 0x03, 0x00, 0x40, 0x3F];
        let mut stream = RegdumpStream::new(&data).unwrap();
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
        assert_eq!(idles, 3);
    }

    #[test]
    fn test_wide_delay_payload() {
        let data = [0xFF, 0xFF, 0xFF];
        let mut stream = RegdumpStream::new(&data).unwrap();
        assert_eq!(stream.next_event(), StreamEvent::Idle);
        assert_eq!(stream.delay, 0x7FFFFF);
    }

    #[test]
    fn test_trailing_partial_record_ignored() {
        let data = [0x00, 0x20, 0x01, 0x00, 0x40];
        let stream = RegdumpStream::new(&data).unwrap();
        assert_eq!(stream.len(), 1);
    }
}
