//! Chip State and Tick Driver
//!
//! The `Ymf262` struct owns every piece of mutable state: the lane groups,
//! the global LFO and timer scalars, the register file and the write queue.
//! `tick` advances one output sample through the fixed pipeline order; all
//! other mutation goes through `write` or the queue.

use super::queue::{RegisterQueue, QUEUE_LATENCY};
use super::registers::RegisterFile;
use super::simd::{I16x8, U32x8};
use super::tables::{
    CHANNEL_NUM_MAX, OG_PROUT_AC, OG_PROUT_BD, PG_MULT_X2_TABLE, SLOT_GROUP_LENGTH,
    SLOT_GROUP_NUM, WAVE_TABLE,
};

/// The chip's native output sample rate in Hz.
pub const NATIVE_SAMPLE_RATE: u32 = 49716;

/// Envelope generator states; attack is 0 and the lanes test it as zero.
pub(crate) const EG_GEN_DECAY: i16 = 1;
pub(crate) const EG_GEN_RELEASE: i16 = 3;

/// Shift selecting the active rate nibble per envelope state.
pub(crate) const EG_GEN_SHL_ATTACK: i16 = 0;
pub(crate) const EG_GEN_SHL_RELEASE: i16 = 12;
/// Right shift bringing the selected top nibble down to a rate value.
pub(crate) const EG_GEN_SRLHI: u32 = 10;

/// Key source bits: bit 0 is the channel key, bit 8 the rhythm drum key.
pub(crate) const EG_KEY_NORMAL: i16 = 1 << 0;
pub(crate) const EG_KEY_DRUM: i16 = 1 << 8;

/// Envelope timer "hi" flag above the 36 counting bits.
pub(crate) const EG_TIMER_HIBIT: u64 = 1 << 36;
pub(crate) const EG_TIMER_MASK: u64 = EG_TIMER_HIBIT - 1;

/// One group of eight operator slots, stored as parallel lanes.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SlotGroup {
    // Wave generator
    pub wg_out: I16x8,
    pub wg_prout: I16x8,
    pub wg_fb_shr: I16x8,
    pub wg_fbmod_gate: I16x8,
    pub wg_prmod_gate: I16x8,
    pub wg_phase_shl: I16x8,
    pub wg_phase_zero: I16x8,
    pub wg_phase_neg: I16x8,
    pub wg_phase_flip: I16x8,
    pub wg_phase_mask: I16x8,
    pub wg_sine_gate: I16x8,

    // Output accumulation, with the hardware's slot output delay
    pub og_prout: I16x8,
    pub og_prout_ac: I16x8,
    pub og_prout_bd: I16x8,
    pub og_out_ch_gate_a: I16x8,
    pub og_out_ch_gate_b: I16x8,
    pub og_out_ch_gate_c: I16x8,
    pub og_out_ch_gate_d: I16x8,

    // Envelope generator
    pub eg_rout: I16x8,
    pub eg_tl_x4: I16x8,
    pub eg_ksl_sh: I16x8,
    pub eg_tremolo_am: I16x8,
    pub eg_out: I16x8,
    pub eg_gen: I16x8,
    pub eg_gen_shl: I16x8,
    pub eg_sl: I16x8,
    pub eg_key: I16x8,
    pub eg_adsr: I16x8,
    pub eg_ks: I16x8,

    // Phase generator
    pub pg_notreset: I16x8,
    pub pg_vib: I16x8,
    pub pg_mult_x2: I16x8,
    pub pg_deltafreq: U32x8,
    pub pg_phase: U32x8,
    pub pg_phase_out: I16x8,

    // Updated only by register writes
    pub eg_am: I16x8,
    pub og_out_gate: I16x8,
}

/// One group of eight two-operator channels; both slot groups of a channel
/// read the same lane here.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ChanGroup {
    pub pg_fnum: I16x8,
    pub pg_block: I16x8,

    // Updated only by register writes
    pub eg_ksv: I16x8,
    pub og_ch_gate_a: I16x8,
    pub og_ch_gate_b: I16x8,
    pub og_ch_gate_c: I16x8,
    pub og_ch_gate_d: I16x8,
}

/// Cycle-accurate YMF262 (OPL3) chip instance.
#[derive(Debug, Clone)]
pub struct Ymf262 {
    // Lane data
    pub(crate) sg: [SlotGroup; SLOT_GROUP_NUM],
    pub(crate) cg: [ChanGroup; SLOT_GROUP_NUM / 2],

    // Chip-wide lane state
    pub(crate) wg_mod: I16x8,
    pub(crate) og_acc_a: I16x8,
    pub(crate) og_acc_b: I16x8,
    pub(crate) og_acc_c: I16x8,
    pub(crate) og_acc_d: I16x8,

    // Global scalars broadcast into the pipeline
    pub(crate) eg_statev: i16,
    pub(crate) eg_add: i16,
    pub(crate) eg_incstep: u16,
    pub(crate) pg_vib_shs: i16,
    pub(crate) pg_vib_sign: i16,

    // Timers
    pub(crate) eg_timer: u64,
    pub(crate) tm_timer: u64,

    // Output mixdown
    pub(crate) og_sum_a: i32,
    pub(crate) og_sum_b: i32,
    pub(crate) og_sum_c: i32,
    pub(crate) og_sum_d: i32,
    pub(crate) og_out_a: i16,
    pub(crate) og_out_b: i16,
    pub(crate) og_out_c: i16,
    pub(crate) og_out_d: i16,
    pub(crate) og_del_b: i16,
    pub(crate) og_del_d: i16,

    // Pairing and noise
    pub(crate) ch_pairing: u32,
    pub(crate) ch_drum: u32,
    pub(crate) ng_noise: u32,

    // Envelope timer half-cycle and LFO positions
    pub(crate) eg_state: u8,
    pub(crate) eg_tremolopos: u8,
    pub(crate) eg_tremoloshift: u8,
    pub(crate) eg_vibshift: u8,
    pub(crate) pg_vibpos: u8,

    // Rhythm phase taps
    pub(crate) rm_hh_bit2: u8,
    pub(crate) rm_hh_bit3: u8,
    pub(crate) rm_hh_bit7: u8,
    pub(crate) rm_hh_bit8: u8,
    pub(crate) rm_tc_bit3: u8,
    pub(crate) rm_tc_bit5: u8,

    // Reserved slot groups 5 and 7 are skipped unless enabled
    pub(crate) process_all_slots: bool,

    // Register file and write queue
    pub(crate) regs: RegisterFile,
    pub(crate) queue: RegisterQueue,
    pub(crate) rq_delay: u32,
}

/// Slot group index to channel group index: sibling groups (0,2), (1,3),
/// (4,6) and (5,7) share a channel group.
#[inline]
pub(crate) fn sgi_to_cgi(sgi: usize) -> usize {
    ((sgi >> 1) & 2) | (sgi & 1)
}

/// Split a word index into its slot group and lane.
#[inline]
pub(crate) fn word_to_group(word: usize) -> (usize, usize) {
    (word / SLOT_GROUP_LENGTH, word % SLOT_GROUP_LENGTH)
}

impl Ymf262 {
    /// Create a chip in its power-on state.
    pub fn new() -> Self {
        let mut chip = Ymf262 {
            sg: [SlotGroup::default(); SLOT_GROUP_NUM],
            cg: [ChanGroup::default(); SLOT_GROUP_NUM / 2],
            wg_mod: I16x8::zero(),
            og_acc_a: I16x8::zero(),
            og_acc_b: I16x8::zero(),
            og_acc_c: I16x8::zero(),
            og_acc_d: I16x8::zero(),
            eg_statev: 0,
            eg_add: 0,
            eg_incstep: 0,
            pg_vib_shs: 0,
            pg_vib_sign: 0,
            eg_timer: 0,
            tm_timer: 0,
            og_sum_a: 0,
            og_sum_b: 0,
            og_sum_c: 0,
            og_sum_d: 0,
            og_out_a: 0,
            og_out_b: 0,
            og_out_c: 0,
            og_out_d: 0,
            og_del_b: 0,
            og_del_d: 0,
            ch_pairing: 0,
            ch_drum: 0,
            ng_noise: 0,
            eg_state: 0,
            eg_tremolopos: 0,
            eg_tremoloshift: 0,
            eg_vibshift: 0,
            pg_vibpos: 0,
            rm_hh_bit2: 0,
            rm_hh_bit3: 0,
            rm_hh_bit7: 0,
            rm_hh_bit8: 0,
            rm_tc_bit3: 0,
            rm_tc_bit5: 0,
            process_all_slots: false,
            regs: RegisterFile::default(),
            queue: RegisterQueue::new(),
            rq_delay: 0,
        };
        chip.apply_power_on_defaults();
        chip
    }

    /// Reset to the power-on state.
    pub fn reset(&mut self) {
        *self = Ymf262::new();
    }

    /// Byte size of a chip instance.
    pub fn size() -> usize {
        std::mem::size_of::<Ymf262>()
    }

    fn apply_power_on_defaults(&mut self) {
        for sgi in 0..SLOT_GROUP_NUM {
            let sg = &mut self.sg[sgi];
            sg.eg_rout = I16x8::splat(0x01FF);
            sg.eg_out = I16x8::splat(0x01FF);
            sg.eg_gen = I16x8::splat(EG_GEN_RELEASE);
            sg.eg_gen_shl = I16x8::splat(EG_GEN_SHL_RELEASE);
            sg.pg_notreset = I16x8::splat(-1);
            sg.pg_mult_x2 = I16x8::splat(PG_MULT_X2_TABLE[0]);
            sg.wg_fb_shr = I16x8::splat(16);
            sg.og_prout_ac = I16x8::from_mask_bits(OG_PROUT_AC[sgi]);
            sg.og_prout_bd = I16x8::from_mask_bits(OG_PROUT_BD[sgi]);

            let wave = &WAVE_TABLE[0];
            sg.wg_phase_shl = I16x8::splat(wave.phase_shl);
            sg.wg_phase_zero = I16x8::splat(wave.phase_zero);
            sg.wg_phase_neg = I16x8::splat(wave.phase_neg);
            sg.wg_phase_flip = I16x8::splat(wave.phase_flip);
            sg.wg_phase_mask = I16x8::splat(wave.phase_mask);
            sg.wg_sine_gate = I16x8::splat(wave.sine_gate);
        }

        for cg in self.cg.iter_mut() {
            cg.og_ch_gate_a = I16x8::splat(-1);
            cg.og_ch_gate_b = I16x8::splat(-1);
        }
        for ch2x in 0..CHANNEL_NUM_MAX {
            self.cm_rewire_ch2x(ch2x);
        }

        self.eg_statev = 1;
        self.eg_timer = EG_TIMER_HIBIT;
        self.ng_noise = 1;
        self.eg_state = 1;
        self.eg_tremoloshift = 4;
        self.eg_vibshift = 1;
    }

    /// Advance one output sample.
    ///
    /// The slot groups run in the order the die pipelines them; the noise
    /// LFSR catches up between the two rhythm-relevant groups so percussion
    /// taps see the exact per-slot noise state.
    pub fn tick(&mut self) {
        self.og_clear();

        self.sg_update(0);
        self.sg_update(2);
        self.sg_update(4);
        self.sg_update(6);

        self.sg_update(1);
        self.ng_update(36 - 3);
        self.rm_update_sg1();

        self.sg_update(3);
        self.ng_update(3);
        self.rm_update_sg3();

        if self.process_all_slots {
            self.sg_update(5);
            self.sg_update(7);
        }

        self.og_update();
        self.tm_update();
        self.rq_update();
    }

    /// Queue a register write; returns false when the queue is full or the
    /// address is out of range.
    pub fn enqueue_write(&mut self, address: u16, value: u8) -> bool {
        if address < 0x8000 {
            self.queue.push(address, value)
        } else {
            false
        }
    }

    /// Queue a delay of `ticks` samples before the next queued write is
    /// dispatched; returns false for oversize delays or a full queue.
    pub fn enqueue_delay(&mut self, ticks: u32) -> bool {
        if ticks < 0x8000 {
            let address = ((ticks >> 8) as u16) | 0x8000;
            let value = (ticks & 0xFF) as u8;
            self.queue.push(address, value)
        } else {
            false
        }
    }

    /// Drain one queue entry at the tail end of a tick.
    fn rq_update(&mut self) {
        if self.rq_delay != 0 {
            self.rq_delay -= 1;
            if self.rq_delay != 0 {
                return;
            }
        }
        if let Some(item) = self.queue.pop() {
            if item.is_delay() {
                self.rq_delay = QUEUE_LATENCY + item.delay_ticks();
            } else {
                self.write(item.address, item.value);
            }
        }
    }

    /// Current sample of output A (left primary).
    pub fn out_a(&self) -> i16 {
        self.og_out_a
    }

    /// One-tick-delayed sample of output B (left secondary).
    pub fn out_b(&self) -> i16 {
        self.og_out_b
    }

    /// Current sample of output C (right primary).
    pub fn out_c(&self) -> i16 {
        self.og_out_c
    }

    /// One-tick-delayed sample of output D (right secondary).
    pub fn out_d(&self) -> i16 {
        self.og_out_d
    }

    /// The four output channels `[A, B, C, D]` after the last tick.
    pub fn outputs(&self) -> [i16; 4] {
        [self.og_out_a, self.og_out_b, self.og_out_c, self.og_out_d]
    }

    /// Also run the reserved slot groups each tick. Off by default; the
    /// reserved slots never reach the outputs either way.
    pub fn set_process_all_slots(&mut self, enabled: bool) {
        self.process_all_slots = enabled;
    }
}

impl Default for Ymf262 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_state() {
        let chip = Ymf262::new();
        for sg in &chip.sg {
            assert_eq!(sg.eg_rout, I16x8::splat(0x01FF));
            assert_eq!(sg.eg_gen, I16x8::splat(EG_GEN_RELEASE));
            assert_eq!(sg.pg_mult_x2, I16x8::splat(1));
            assert_eq!(sg.wg_fb_shr, I16x8::splat(16));
        }
        assert_eq!(chip.ng_noise, 1);
        assert_eq!(chip.eg_timer, EG_TIMER_HIBIT);
        assert_eq!(chip.eg_tremoloshift, 4);
        assert_eq!(chip.eg_vibshift, 1);
        assert_eq!(chip.outputs(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_silence_after_init() {
        let mut chip = Ymf262::new();
        for _ in 0..100 {
            chip.tick();
            assert_eq!(chip.outputs(), [0, 0, 0, 0]);
        }
    }

    #[test]
    fn test_accumulators_clear_after_tick() {
        let mut chip = Ymf262::new();
        chip.tick();
        // og_clear runs at the start of each tick; after a full tick the
        // accumulated sums have been folded into the outputs.
        chip.og_clear();
        assert_eq!(chip.og_acc_a, I16x8::zero());
        assert_eq!(chip.og_acc_b, I16x8::zero());
        assert_eq!(chip.og_acc_c, I16x8::zero());
        assert_eq!(chip.og_acc_d, I16x8::zero());
    }

    #[test]
    fn test_size_is_reported() {
        assert!(Ymf262::size() > 0);
    }

    #[test]
    fn test_out_of_range_write_is_ignored() {
        let mut chip = Ymf262::new();
        let before = chip.clone();
        chip.write(0x200, 0xFF);
        chip.write(0xFFFF, 0x55);
        chip.tick();
        let mut reference = before;
        reference.tick();
        assert_eq!(chip.outputs(), reference.outputs());
    }

    #[test]
    fn test_enqueue_bounds() {
        let mut chip = Ymf262::new();
        assert!(chip.enqueue_write(0x7FFF, 0));
        assert!(!chip.enqueue_write(0x8000, 0));
        assert!(chip.enqueue_delay(0x7FFF));
        assert!(!chip.enqueue_delay(0x8000));
    }

    #[test]
    fn test_sgi_to_cgi_interleave() {
        assert_eq!(sgi_to_cgi(0), 0);
        assert_eq!(sgi_to_cgi(1), 1);
        assert_eq!(sgi_to_cgi(2), 0);
        assert_eq!(sgi_to_cgi(3), 1);
        assert_eq!(sgi_to_cgi(4), 2);
        assert_eq!(sgi_to_cgi(5), 3);
        assert_eq!(sgi_to_cgi(6), 2);
        assert_eq!(sgi_to_cgi(7), 3);
    }
}
