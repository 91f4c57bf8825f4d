//! Register File
//!
//! The chip's control plane as raw-byte wrappers with explicit shift/mask
//! accessors. Each wrapper stores the written byte verbatim so reserved and
//! undocumented bits survive readback; only the accessors give the bits
//! meaning. Layouts are little-endian as on the bus.

use bitflags::bitflags;

use super::tables::{CHANNEL_NUM_MAX, SLOT_NUM_MAX};

macro_rules! register_byte {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name(u8);

        impl $name {
            /// Wrap a raw register byte.
            #[inline]
            pub fn from_byte(byte: u8) -> Self {
                Self(byte)
            }

            /// Raw register byte, reserved bits intact.
            #[inline]
            pub fn to_byte(self) -> u8 {
                self.0
            }
        }
    };
}

register_byte! {
    /// Operator mode register (20h-35h): tremolo/vibrato/sustain/KSR
    /// enables and the frequency multiplier.
    OpMode
}

impl OpMode {
    /// Frequency multiplier index.
    pub fn mult(self) -> u8 {
        self.0 & 0x0F
    }

    /// Key-scale-rate enable.
    pub fn ksr(self) -> bool {
        self.0 & 0x10 != 0
    }

    /// Envelope sustain enable (EG type).
    pub fn egt(self) -> bool {
        self.0 & 0x20 != 0
    }

    /// Vibrato enable.
    pub fn vib(self) -> bool {
        self.0 & 0x40 != 0
    }

    /// Tremolo (amplitude modulation) enable.
    pub fn am(self) -> bool {
        self.0 & 0x80 != 0
    }
}

register_byte! {
    /// Operator level register (40h-55h): total level and key-scale level.
    OpLevel
}

impl OpLevel {
    /// Total level attenuation, 0.75 dB steps.
    pub fn tl(self) -> u8 {
        self.0 & 0x3F
    }

    /// Key-scale level selector.
    pub fn ksl(self) -> u8 {
        self.0 >> 6
    }
}

register_byte! {
    /// Operator attack/decay rate register (60h-75h).
    OpAttackDecay
}

impl OpAttackDecay {
    /// Decay rate nibble.
    pub fn dr(self) -> u8 {
        self.0 & 0x0F
    }

    /// Attack rate nibble.
    pub fn ar(self) -> u8 {
        self.0 >> 4
    }
}

register_byte! {
    /// Operator sustain level / release rate register (80h-95h).
    OpSustainRelease
}

impl OpSustainRelease {
    /// Release rate nibble.
    pub fn rr(self) -> u8 {
        self.0 & 0x0F
    }

    /// Sustain level nibble.
    pub fn sl(self) -> u8 {
        self.0 >> 4
    }
}

register_byte! {
    /// Operator waveform select register (E0h-F5h).
    OpWaveform
}

impl OpWaveform {
    /// Waveform index; the high shapes exist only with `newm` set.
    pub fn ws(self) -> u8 {
        self.0 & 0x07
    }

    /// Mask the waveform down to the OPL2 subset.
    pub fn mask_opl2(&mut self) {
        self.0 &= !0x04;
    }
}

register_byte! {
    /// Channel key/block/fnum-high register (B0h-B8h).
    ChKeyBlock
}

impl ChKeyBlock {
    /// Upper two bits of the frequency number.
    pub fn fnum_hi(self) -> u8 {
        self.0 & 0x03
    }

    /// Octave block.
    pub fn block(self) -> u8 {
        (self.0 >> 2) & 0x07
    }

    /// Key-on bit.
    pub fn kon(self) -> bool {
        self.0 & 0x20 != 0
    }
}

register_byte! {
    /// Channel connection/feedback/output-routing register (C0h-C8h).
    ChRouting
}

impl ChRouting {
    /// Connection bit: 0 = FM, 1 = additive.
    pub fn cnt(self) -> u8 {
        self.0 & 0x01
    }

    /// Feedback strength for the first operator.
    pub fn fb(self) -> u8 {
        (self.0 >> 1) & 0x07
    }

    /// Output A (left primary) enable.
    pub fn cha(self) -> bool {
        self.0 & 0x10 != 0
    }

    /// Output B (left secondary) enable.
    pub fn chb(self) -> bool {
        self.0 & 0x20 != 0
    }

    /// Output C (right primary) enable.
    pub fn chc(self) -> bool {
        self.0 & 0x40 != 0
    }

    /// Output D (right secondary) enable.
    pub fn chd(self) -> bool {
        self.0 & 0x80 != 0
    }
}

register_byte! {
    /// Timer control register (04h); stored for readback, timers are not
    /// dispatched.
    TimerCtrl
}

impl TimerCtrl {
    /// Timer 1 start.
    pub fn st1(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Timer 2 start.
    pub fn st2(self) -> bool {
        self.0 & 0x02 != 0
    }

    /// IRQ reset bit.
    pub fn rst(self) -> bool {
        self.0 & 0x80 != 0
    }
}

register_byte! {
    /// Note-select register (08h).
    NoteSelect
}

impl NoteSelect {
    /// Note select: picks the fnum bit feeding key scaling.
    pub fn nts(self) -> u8 {
        (self.0 >> 6) & 0x01
    }

    /// Composite sine mode bit (stored only).
    pub fn csm(self) -> bool {
        self.0 & 0x80 != 0
    }
}

register_byte! {
    /// Four-operator pairing bitmap register (104h).
    ConnSel
}

impl ConnSel {
    /// One pairing bit per 4-op channel.
    pub fn conn(self) -> u8 {
        self.0 & 0x3F
    }
}

register_byte! {
    /// OPL3 mode register (105h).
    ChipMode
}

impl ChipMode {
    /// OPL3 ("new") mode enable.
    pub fn newm(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Stereo extension enable (reserved behavior).
    pub fn stereo(self) -> bool {
        self.0 & 0x02 != 0
    }
}

bitflags! {
    /// Rhythm-mode and LFO-depth register (BDh).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RhythmFlags: u8 {
        /// Hi-hat key.
        const HH = 0x01;
        /// Top cymbal key.
        const TC = 0x02;
        /// Tom-tom key.
        const TOM = 0x04;
        /// Snare drum key.
        const SD = 0x08;
        /// Bass drum key.
        const BD = 0x10;
        /// Rhythm mode enable.
        const RYT = 0x20;
        /// Deep vibrato.
        const DVB = 0x40;
        /// Deep tremolo.
        const DAM = 0x80;
    }
}

impl Default for RhythmFlags {
    fn default() -> Self {
        RhythmFlags::empty()
    }
}

impl RhythmFlags {
    /// Wrap a raw register byte.
    pub fn from_byte(byte: u8) -> Self {
        RhythmFlags::from_bits_retain(byte)
    }

    /// Raw register byte.
    pub fn to_byte(self) -> u8 {
        self.bits()
    }
}

/// Chip-global registers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChipRegs {
    /// LSI test bits (01h), stored only.
    pub lsi_test: u8,
    /// Timer 1 preset (02h), stored only.
    pub timer1: u8,
    /// Timer 2 preset (03h), stored only.
    pub timer2: u8,
    /// Timer control (04h), stored only.
    pub timer_ctrl: TimerCtrl,
    /// Note select (08h).
    pub note_select: NoteSelect,
    /// Rhythm and LFO depth (BDh).
    pub rhythm: RhythmFlags,
    /// 4-op pairing bitmap (104h).
    pub conn_sel: ConnSel,
    /// OPL3 mode (105h).
    pub chip_mode: ChipMode,
}

/// Per-slot registers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotRegs {
    /// 20h-35h range.
    pub mode: OpMode,
    /// 40h-55h range.
    pub level: OpLevel,
    /// 60h-75h range.
    pub attack_decay: OpAttackDecay,
    /// 80h-95h range.
    pub sustain_release: OpSustainRelease,
    /// E0h-F5h range.
    pub waveform: OpWaveform,
}

/// Per-channel registers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChanRegs {
    /// Frequency number low byte (A0h-A8h).
    pub fnum_lo: u8,
    /// Key-on, block, fnum high bits (B0h-B8h).
    pub key_block: ChKeyBlock,
    /// Connection, feedback, output routing (C0h-C8h).
    pub routing: ChRouting,
    /// Stereo-extension cell (D0h-D8h), stored only.
    pub routing_ext: ChRouting,
}

/// The whole register file.
#[derive(Debug, Clone, Copy)]
pub struct RegisterFile {
    /// Chip globals.
    pub chip: ChipRegs,
    /// All addressable slots, both banks.
    pub slot: [SlotRegs; SLOT_NUM_MAX],
    /// All addressable channels, both banks.
    pub chan: [ChanRegs; CHANNEL_NUM_MAX],
}

impl Default for RegisterFile {
    fn default() -> Self {
        RegisterFile {
            chip: ChipRegs::default(),
            slot: [SlotRegs::default(); SLOT_NUM_MAX],
            chan: [ChanRegs::default(); CHANNEL_NUM_MAX],
        }
    }
}
