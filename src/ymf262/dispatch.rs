//! Register Write Dispatcher
//!
//! Decodes a bus address into the register cell to mutate, then reshapes
//! the dependent lane state: connection rewiring, key-on/off fan-out,
//! frequency and key-scale refresh, waveform and rate updates. Writes land
//! between ticks; the next tick sees the new lane data.

use super::chip::{
    sgi_to_cgi, word_to_group, Ymf262, EG_KEY_DRUM, EG_KEY_NORMAL,
};
use super::registers::{
    ChKeyBlock, ChRouting, ChipMode, ConnSel, NoteSelect, OpAttackDecay, OpLevel, OpMode,
    OpSustainRelease, OpWaveform, RhythmFlags, TimerCtrl,
};
use super::simd::I16x8;
use super::tables::{
    SlotWiring, CH2X_PAIRED, CH2X_TO_WORD, CH4X_TO_PAIR, CHANNEL_NUM_MAX, CONN_CH2X_TABLE,
    CONN_CH4X_TABLE, CONN_RYT_TABLE, EG_KSLSH_TABLE, EG_KSL_TABLE, PG_MULT_X2_TABLE,
    SLOT_GROUP_NUM, SLOT_NUM_MAX, SLOT_TO_WORD, SUBADDR_TO_CH2X, SUBADDR_TO_SLOT, WAVE_TABLE,
    WORD_TO_CH2X, WORD_TO_SLOT,
};

/// Bus address to slot index; bit 8 selects the second register bank.
#[inline]
fn addr_to_slot(address: u16) -> usize {
    let subaddr = (address & 0x1F) | (((address >> 8) & 1) << 5);
    SUBADDR_TO_SLOT[subaddr as usize]
}

/// Bus address to channel index; bit 8 selects the second register bank.
#[inline]
fn addr_to_ch2x(address: u16) -> usize {
    let subaddr = (address & 0x0F) | (((address >> 8) & 1) << 4);
    SUBADDR_TO_CH2X[subaddr as usize]
}

impl Ymf262 {
    /// Immediate register write. Addresses above 0x1FF are ignored.
    pub fn write(&mut self, address: u16, value: u8) {
        if address > 0x1FF {
            return;
        }

        match address & 0xF0 {
            0x00 => self.write_global(address, value),
            0x20 | 0x30 => self.write_op_mode(address, value),
            0x40 | 0x50 => self.write_op_level(address, value),
            0x60 | 0x70 => self.write_op_attack_decay(address, value),
            0x80 | 0x90 => self.write_op_sustain_release(address, value),
            0xE0 | 0xF0 => self.write_op_waveform(address, value),
            0xA0 => self.write_ch_fnum_lo(address, value),
            0xB0 => self.write_ch_key_block(address, value),
            0xC0 => self.write_ch_routing(address, value),
            0xD0 => self.write_ch_routing_ext(address, value),
            _ => {}
        }
    }

    /// Read back a register byte, reserved bits intact. Unmapped addresses
    /// read as zero.
    pub fn register(&self, address: u16) -> u8 {
        if address > 0x1FF {
            return 0;
        }
        match address {
            0x01 => return self.regs.chip.lsi_test,
            0x02 => return self.regs.chip.timer1,
            0x03 => return self.regs.chip.timer2,
            0x04 => return self.regs.chip.timer_ctrl.to_byte(),
            0x08 => return self.regs.chip.note_select.to_byte(),
            0xBD => return self.regs.chip.rhythm.to_byte(),
            0x104 => return self.regs.chip.conn_sel.to_byte(),
            0x105 => return self.regs.chip.chip_mode.to_byte(),
            _ => {}
        }
        match address & 0xF0 {
            0x20 | 0x30 => self.regs.slot[addr_to_slot(address)].mode.to_byte(),
            0x40 | 0x50 => self.regs.slot[addr_to_slot(address)].level.to_byte(),
            0x60 | 0x70 => self.regs.slot[addr_to_slot(address)].attack_decay.to_byte(),
            0x80 | 0x90 => self
                .regs
                .slot[addr_to_slot(address)]
                .sustain_release
                .to_byte(),
            0xE0 | 0xF0 => self.regs.slot[addr_to_slot(address)].waveform.to_byte(),
            0xA0 => self.regs.chan[addr_to_ch2x(address)].fnum_lo,
            0xB0 => self.regs.chan[addr_to_ch2x(address)].key_block.to_byte(),
            0xC0 => self.regs.chan[addr_to_ch2x(address)].routing.to_byte(),
            0xD0 => self.regs.chan[addr_to_ch2x(address)].routing_ext.to_byte(),
            _ => 0,
        }
    }

    fn write_global(&mut self, address: u16, value: u8) {
        match address {
            0x01 => self.regs.chip.lsi_test = value,
            0x02 => self.regs.chip.timer1 = value,
            0x03 => self.regs.chip.timer2 = value,
            0x04 => self.regs.chip.timer_ctrl = TimerCtrl::from_byte(value),
            0x104 => {
                let prev = self.regs.chip.conn_sel;
                self.regs.chip.conn_sel = ConnSel::from_byte(value);
                self.cm_rewire_conn(prev);
            }
            0x105 => {
                self.regs.chip.chip_mode = ChipMode::from_byte(value);
            }
            0x08 => {
                let prev = self.regs.chip.note_select;
                self.regs.chip.note_select = NoteSelect::from_byte(value);
                if self.regs.chip.note_select.nts() != prev.nts() {
                    self.pg_update_nts();
                }
            }
            _ => {}
        }
    }

    fn write_op_mode(&mut self, address: u16, value: u8) {
        let slot = addr_to_slot(address);
        let (sgi, sgo) = word_to_group(SLOT_TO_WORD[slot]);
        let cgi = sgi_to_cgi(sgi);
        let prev = self.regs.slot[slot].mode;
        let cur = OpMode::from_byte(value);
        self.regs.slot[slot].mode = cur;
        let mut update_deltafreq = false;

        if cur.mult() != prev.mult() {
            let pg_mult_x2 = PG_MULT_X2_TABLE[cur.mult() as usize];
            let sg = &mut self.sg[sgi];
            sg.pg_mult_x2 = sg.pg_mult_x2.insert(pg_mult_x2, sgo);
            update_deltafreq = true;
        }

        if cur.ksr() != prev.ksr() {
            let eg_ksv = self.cg[cgi].eg_ksv.extract(sgo);
            let eg_ks = eg_ksv >> ((!cur.ksr() as u32) << 1);
            let sg = &mut self.sg[sgi];
            sg.eg_ks = sg.eg_ks.insert(eg_ks, sgo);
        }

        if cur.egt() != prev.egt() {
            let rr = self.regs.slot[slot].sustain_release.rr() as i16;
            let sg = &mut self.sg[sgi];
            let mut adsr = sg.eg_adsr.extract(sgo);
            adsr = (adsr & !0x00F0) | (if cur.egt() { 0 } else { rr << 4 });
            sg.eg_adsr = sg.eg_adsr.insert(adsr, sgo);
        }

        if cur.vib() != prev.vib() {
            let pg_vib = if cur.vib() { -1 } else { 0 };
            let sg = &mut self.sg[sgi];
            sg.pg_vib = sg.pg_vib.insert(pg_vib, sgo);
            update_deltafreq = true;
        }

        if cur.am() != prev.am() {
            let eg_am = if cur.am() { -1 } else { 0 };
            let mut tremolopos = self.eg_tremolopos as u16;
            if tremolopos >= 105 {
                tremolopos = 210 - tremolopos;
            }
            let eg_tremolo = I16x8::splat((tremolopos >> self.eg_tremoloshift) as i16);
            let sg = &mut self.sg[sgi];
            sg.eg_am = sg.eg_am.insert(eg_am, sgo);
            sg.eg_tremolo_am = eg_tremolo.and(sg.eg_am);
        }

        if update_deltafreq {
            // Any rate-related field invalidates the cached increments.
            for sgi in 0..SLOT_GROUP_NUM {
                self.pg_update_deltafreq(sgi);
            }
        }
    }

    fn write_op_level(&mut self, address: u16, value: u8) {
        let slot = addr_to_slot(address);
        let word = SLOT_TO_WORD[slot];
        let (sgi, sgo) = word_to_group(word);
        let prev = self.regs.slot[slot].level;
        let cur = OpLevel::from_byte(value);
        self.regs.slot[slot].level = cur;

        if cur.tl() != prev.tl() {
            let eg_tl_x4 = (cur.tl() as i16) << 2;
            let sg = &mut self.sg[sgi];
            sg.eg_tl_x4 = sg.eg_tl_x4.insert(eg_tl_x4, sgo);
        }

        if cur.ksl() != prev.ksl() {
            self.eg_update_ksl(word);
        }
    }

    fn write_op_attack_decay(&mut self, address: u16, value: u8) {
        let slot = addr_to_slot(address);
        let (sgi, sgo) = word_to_group(SLOT_TO_WORD[slot]);
        let prev = self.regs.slot[slot].attack_decay;
        let cur = OpAttackDecay::from_byte(value);
        self.regs.slot[slot].attack_decay = cur;

        if cur.dr() != prev.dr() || cur.ar() != prev.ar() {
            let sg = &mut self.sg[sgi];
            let mut adsr = sg.eg_adsr.extract(sgo);
            adsr = (adsr & 0x00FF) | ((cur.dr() as i16) << 8) | ((cur.ar() as i16) << 12);
            sg.eg_adsr = sg.eg_adsr.insert(adsr, sgo);
        }
    }

    fn write_op_sustain_release(&mut self, address: u16, value: u8) {
        let slot = addr_to_slot(address);
        let (sgi, sgo) = word_to_group(SLOT_TO_WORD[slot]);
        let prev = self.regs.slot[slot].sustain_release;
        let cur = OpSustainRelease::from_byte(value);
        self.regs.slot[slot].sustain_release = cur;

        if cur.rr() != prev.rr() || cur.sl() != prev.sl() {
            let egt = self.regs.slot[slot].mode.egt();
            let rr = cur.rr() as i16;
            let sg = &mut self.sg[sgi];
            let mut adsr = sg.eg_adsr.extract(sgo);
            adsr = (adsr & !0x00FF) | (if egt { 0 } else { rr << 4 }) | rr;
            sg.eg_adsr = sg.eg_adsr.insert(adsr, sgo);

            let mut eg_sl = cur.sl() as i16;
            if eg_sl == 0x0F {
                eg_sl = 0x1F;
            }
            sg.eg_sl = sg.eg_sl.insert(eg_sl, sgo);
        }
    }

    fn write_op_waveform(&mut self, address: u16, value: u8) {
        let slot = addr_to_slot(address);
        let (sgi, sgo) = word_to_group(SLOT_TO_WORD[slot]);
        let prev = self.regs.slot[slot].waveform;
        let mut cur = OpWaveform::from_byte(value);
        if !self.regs.chip.chip_mode.newm() {
            cur.mask_opl2();
        }
        self.regs.slot[slot].waveform = cur;

        if cur.ws() != prev.ws() {
            let wave = &WAVE_TABLE[cur.ws() as usize];
            let sg = &mut self.sg[sgi];
            sg.wg_phase_shl = sg.wg_phase_shl.insert(wave.phase_shl, sgo);
            sg.wg_phase_zero = sg.wg_phase_zero.insert(wave.phase_zero, sgo);
            sg.wg_phase_neg = sg.wg_phase_neg.insert(wave.phase_neg, sgo);
            sg.wg_phase_flip = sg.wg_phase_flip.insert(wave.phase_flip, sgo);
            sg.wg_phase_mask = sg.wg_phase_mask.insert(wave.phase_mask, sgo);
            sg.wg_sine_gate = sg.wg_sine_gate.insert(wave.sine_gate, sgo);
        }
    }

    /// Pairing prologue shared by the A0h and B0h ranges: writes to the
    /// secondary half of an active 4-op pair are dropped, and fnum changes
    /// on the primary propagate to the secondary.
    fn ch_pair_target(&self, ch2x: usize) -> Option<Option<usize>> {
        let pairing = self.ch_pairing & (1 << ch2x) != 0;
        let ch2p = CH2X_PAIRED[ch2x];
        let secondary = ch2p < ch2x;
        if self.regs.chip.chip_mode.newm() && pairing && secondary {
            return None;
        }
        if !pairing || secondary {
            Some(None)
        } else {
            Some(Some(ch2p))
        }
    }

    fn write_ch_fnum_lo(&mut self, address: u16, value: u8) {
        let ch2x = addr_to_ch2x(address);
        let Some(ch2p) = self.ch_pair_target(ch2x) else {
            return;
        };

        let prev = self.regs.chan[ch2x].fnum_lo;
        self.regs.chan[ch2x].fnum_lo = value;
        if value != prev {
            self.ch2x_update_fnum(ch2x, ch2p);
        }
    }

    fn write_ch_key_block(&mut self, address: u16, value: u8) {
        let ch2x = addr_to_ch2x(address);
        let Some(ch2p) = self.ch_pair_target(ch2x) else {
            return;
        };

        if address == 0xBD {
            let prev = self.regs.chip.rhythm;
            let cur = RhythmFlags::from_byte(value);
            self.regs.chip.rhythm = cur;

            let dam = cur.contains(RhythmFlags::DAM) as u8;
            let dvb = cur.contains(RhythmFlags::DVB) as u8;
            self.eg_tremoloshift = ((dam ^ 1) << 1) + 2;
            self.eg_vibshift = dvb ^ 1;
            self.cm_rewire_rhythm(prev);
        } else {
            let prev = self.regs.chan[ch2x].key_block;
            let cur = ChKeyBlock::from_byte(value);
            self.regs.chan[ch2x].key_block = cur;

            if cur.fnum_hi() != prev.fnum_hi() || cur.block() != prev.block() {
                self.ch2x_update_fnum(ch2x, ch2p);
            }

            if cur.kon() != prev.kon() {
                if cur.kon() {
                    self.ch2x_key_on(ch2x);
                } else {
                    self.ch2x_key_off(ch2x);
                }
            }
        }
    }

    fn write_ch_routing(&mut self, address: u16, value: u8) {
        let ch2x = addr_to_ch2x(address);
        let prev = self.regs.chan[ch2x].routing;
        let mut value = value;
        if !self.regs.chip.chip_mode.newm() {
            // OPL2 compatibility: both primary outputs on, no secondary pair.
            value = (value | 0x30) & 0x3F;
        }
        let cur = ChRouting::from_byte(value);
        self.regs.chan[ch2x].routing = cur;

        let word0 = CH2X_TO_WORD[ch2x][0];
        let word1 = CH2X_TO_WORD[ch2x][1];
        let (sgi0, sgo) = word_to_group(word0);
        let (sgi1, _) = word_to_group(word1);
        let cgi = sgi_to_cgi(sgi0);

        if cur.cha() != prev.cha() {
            let gate = if cur.cha() { -1 } else { 0 };
            self.cg[cgi].og_ch_gate_a = self.cg[cgi].og_ch_gate_a.insert(gate, sgo);
            let g = self.cg[cgi].og_ch_gate_a;
            self.sg[sgi0].og_out_ch_gate_a = self.sg[sgi0].og_out_gate.and(g);
            self.sg[sgi1].og_out_ch_gate_a = self.sg[sgi1].og_out_gate.and(g);
        }
        if cur.chb() != prev.chb() {
            let gate = if cur.chb() { -1 } else { 0 };
            self.cg[cgi].og_ch_gate_b = self.cg[cgi].og_ch_gate_b.insert(gate, sgo);
            let g = self.cg[cgi].og_ch_gate_b;
            self.sg[sgi0].og_out_ch_gate_b = self.sg[sgi0].og_out_gate.and(g);
            self.sg[sgi1].og_out_ch_gate_b = self.sg[sgi1].og_out_gate.and(g);
        }
        if cur.chc() != prev.chc() {
            let gate = if cur.chc() { -1 } else { 0 };
            self.cg[cgi].og_ch_gate_c = self.cg[cgi].og_ch_gate_c.insert(gate, sgo);
            let g = self.cg[cgi].og_ch_gate_c;
            self.sg[sgi0].og_out_ch_gate_c = self.sg[sgi0].og_out_gate.and(g);
            self.sg[sgi1].og_out_ch_gate_c = self.sg[sgi1].og_out_gate.and(g);
        }
        if cur.chd() != prev.chd() {
            let gate = if cur.chd() { -1 } else { 0 };
            self.cg[cgi].og_ch_gate_d = self.cg[cgi].og_ch_gate_d.insert(gate, sgo);
            let g = self.cg[cgi].og_ch_gate_d;
            self.sg[sgi0].og_out_ch_gate_d = self.sg[sgi0].og_out_gate.and(g);
            self.sg[sgi1].og_out_ch_gate_d = self.sg[sgi1].og_out_gate.and(g);
        }

        if cur.fb() != prev.fb() {
            let fb_shr = if cur.fb() != 0 {
                9 - cur.fb() as i16
            } else {
                16
            };
            self.sg[sgi0].wg_fb_shr = self.sg[sgi0].wg_fb_shr.insert(fb_shr, sgo);
            self.sg[sgi1].wg_fb_shr = self.sg[sgi1].wg_fb_shr.insert(fb_shr, sgo);
        }

        if cur.cnt() != prev.cnt() {
            self.cm_rewire_ch2x(ch2x);
        }
    }

    fn write_ch_routing_ext(&mut self, address: u16, value: u8) {
        // Stereo extension range: stored, no effect on the data path.
        let ch2x = addr_to_ch2x(address);
        self.regs.chan[ch2x].routing_ext = ChRouting::from_byte(value);
    }

    /// Recompute one slot's key-scale level attenuation.
    fn eg_update_ksl(&mut self, word: usize) {
        let slot = WORD_TO_SLOT[word];
        let (sgi, sgo) = word_to_group(word);
        let cgi = sgi_to_cgi(sgi);

        let pg_fnum = self.cg[cgi].pg_fnum.extract(sgo);
        let fnum_hn = ((pg_fnum >> 6) & 15) as usize;

        let ch2x = WORD_TO_CH2X[word];
        let eg_block = self.regs.chan[ch2x].key_block.block() as i16;
        let mut eg_ksl = EG_KSL_TABLE[fnum_hn];
        eg_ksl = (eg_ksl << 2) - ((8 - eg_block) << 5);
        if eg_ksl < 0 {
            eg_ksl = 0;
        }
        let eg_kslsh = EG_KSLSH_TABLE[self.regs.slot[slot].level.ksl() as usize];

        let eg_ksl_sh = eg_ksl >> eg_kslsh;
        let sg = &mut self.sg[sgi];
        sg.eg_ksl_sh = sg.eg_ksl_sh.insert(eg_ksl_sh, sgo);
    }

    /// Note-select changed: every slot's key-scale value depends on it.
    fn pg_update_nts(&mut self) {
        for slot in 0..SLOT_NUM_MAX {
            let word = SLOT_TO_WORD[slot];
            let ch2x = WORD_TO_CH2X[word];
            let chan = &self.regs.chan[ch2x];
            let pg_fnum =
                chan.fnum_lo as i16 | ((chan.key_block.fnum_hi() as i16) << 8);
            let nts = self.regs.chip.note_select.nts() as u32;
            let eg_ksv =
                ((chan.key_block.block() as i16) << 1) | ((pg_fnum >> (9 - nts)) & 1);

            let (sgi, sgo) = word_to_group(word);
            let cgi = sgi_to_cgi(sgi);
            let ksr = self.regs.slot[slot].mode.ksr();
            let ks = eg_ksv >> ((!ksr as u32) << 1);

            self.cg[cgi].eg_ksv = self.cg[cgi].eg_ksv.insert(eg_ksv, sgo);
            self.sg[sgi].eg_ks = self.sg[sgi].eg_ks.insert(ks, sgo);
        }
    }

    /// Push a channel's fnum/block/ksv into the lanes of both of its slots
    /// and refresh the dependent caches.
    fn pg_update_fnum(&mut self, ch2x: usize, pg_fnum: i16, eg_ksv: i16, pg_block: i16) {
        let word0 = CH2X_TO_WORD[ch2x][0];
        let (sgi0, sgo) = word_to_group(word0);
        let cgi = sgi_to_cgi(sgi0);

        let cg = &mut self.cg[cgi];
        cg.pg_block = cg.pg_block.insert(pg_block, sgo);
        cg.pg_fnum = cg.pg_fnum.insert(pg_fnum, sgo);
        cg.eg_ksv = cg.eg_ksv.insert(eg_ksv, sgo);

        let slot0 = WORD_TO_SLOT[word0];
        let ksr0 = self.regs.slot[slot0].mode.ksr();
        let ks0 = eg_ksv >> ((!ksr0 as u32) << 1);
        self.sg[sgi0].eg_ks = self.sg[sgi0].eg_ks.insert(ks0, sgo);
        self.eg_update_ksl(word0);
        self.pg_update_deltafreq(sgi0);

        let word1 = CH2X_TO_WORD[ch2x][1];
        let (sgi1, _) = word_to_group(word1);
        let slot1 = WORD_TO_SLOT[word1];
        let ksr1 = self.regs.slot[slot1].mode.ksr();
        let ks1 = eg_ksv >> ((!ksr1 as u32) << 1);
        self.sg[sgi1].eg_ks = self.sg[sgi1].eg_ks.insert(ks1, sgo);
        self.eg_update_ksl(word1);
        self.pg_update_deltafreq(sgi1);
    }

    fn ch2x_update_fnum(&mut self, ch2x: usize, ch2p: Option<usize>) {
        let chan = &self.regs.chan[ch2x];
        let pg_fnum = chan.fnum_lo as i16 | ((chan.key_block.fnum_hi() as i16) << 8);
        let pg_block = chan.key_block.block() as i16;
        let nts = self.regs.chip.note_select.nts() as u32;
        let eg_ksv = (pg_block << 1) | ((pg_fnum >> (9 - nts)) & 1);

        self.pg_update_fnum(ch2x, pg_fnum, eg_ksv, pg_block);

        if let Some(ch2p) = ch2p {
            self.pg_update_fnum(ch2p, pg_fnum, eg_ksv, pg_block);
        }
    }

    pub(crate) fn eg_key_on(&mut self, word: usize, mode: i16) {
        let (sgi, sgo) = word_to_group(word);
        let sg = &mut self.sg[sgi];
        let eg_key = sg.eg_key.extract(sgo) | mode;
        sg.eg_key = sg.eg_key.insert(eg_key, sgo);
    }

    pub(crate) fn eg_key_off(&mut self, word: usize, mode: i16) {
        let (sgi, sgo) = word_to_group(word);
        let sg = &mut self.sg[sgi];
        let eg_key = sg.eg_key.extract(sgo) & !mode;
        sg.eg_key = sg.eg_key.insert(eg_key, sgo);
    }

    fn ch2x_key_on(&mut self, ch2x: usize) {
        let [word0, word1] = CH2X_TO_WORD[ch2x];
        if self.regs.chip.chip_mode.newm() {
            let pairing = self.ch_pairing & (1 << ch2x) != 0;
            let drum = self.ch_drum & (1 << ch2x) != 0;
            let ch2p = CH2X_PAIRED[ch2x];
            let secondary = ch2p < ch2x;

            if pairing && !secondary {
                let [pword0, pword1] = CH2X_TO_WORD[ch2p];
                self.eg_key_on(word0, EG_KEY_NORMAL);
                self.eg_key_on(word1, EG_KEY_NORMAL);
                self.eg_key_on(pword0, EG_KEY_NORMAL);
                self.eg_key_on(pword1, EG_KEY_NORMAL);
            } else if !pairing || drum {
                self.eg_key_on(word0, EG_KEY_NORMAL);
                self.eg_key_on(word1, EG_KEY_NORMAL);
            }
        } else {
            self.eg_key_on(word0, EG_KEY_NORMAL);
            self.eg_key_on(word1, EG_KEY_NORMAL);
        }
    }

    fn ch2x_key_off(&mut self, ch2x: usize) {
        let [word0, word1] = CH2X_TO_WORD[ch2x];
        if self.regs.chip.chip_mode.newm() {
            let pairing = self.ch_pairing & (1 << ch2x) != 0;
            let drum = self.ch_drum & (1 << ch2x) != 0;
            let ch2p = CH2X_PAIRED[ch2x];
            let secondary = ch2p < ch2x;

            if pairing && !secondary {
                let [pword0, pword1] = CH2X_TO_WORD[ch2p];
                self.eg_key_off(word0, EG_KEY_NORMAL);
                self.eg_key_off(word1, EG_KEY_NORMAL);
                self.eg_key_off(pword0, EG_KEY_NORMAL);
                self.eg_key_off(pword1, EG_KEY_NORMAL);
            } else if !pairing || drum {
                self.eg_key_off(word0, EG_KEY_NORMAL);
                self.eg_key_off(word1, EG_KEY_NORMAL);
            }
        } else {
            self.eg_key_off(word0, EG_KEY_NORMAL);
            self.eg_key_off(word1, EG_KEY_NORMAL);
        }
    }

    /// Apply one slot's connection gates and refresh its combined output
    /// gates from the channel enables.
    fn cm_rewire_slot(&mut self, word: usize, conn: &SlotWiring) {
        let (sgi, sgo) = word_to_group(word);
        let cgi = sgi_to_cgi(sgi);
        let cg_gate_a = self.cg[cgi].og_ch_gate_a;
        let cg_gate_b = self.cg[cgi].og_ch_gate_b;
        let cg_gate_c = self.cg[cgi].og_ch_gate_c;
        let cg_gate_d = self.cg[cgi].og_ch_gate_d;

        let sg = &mut self.sg[sgi];
        sg.wg_fbmod_gate = sg.wg_fbmod_gate.insert(conn.fbmod_gate, sgo);
        sg.wg_prmod_gate = sg.wg_prmod_gate.insert(conn.prmod_gate, sgo);
        sg.og_out_gate = sg.og_out_gate.insert(conn.out_gate, sgo);

        sg.og_out_ch_gate_a = sg.og_out_gate.and(cg_gate_a);
        sg.og_out_ch_gate_b = sg.og_out_gate.and(cg_gate_b);
        sg.og_out_ch_gate_c = sg.og_out_gate.and(cg_gate_c);
        sg.og_out_ch_gate_d = sg.og_out_gate.and(cg_gate_d);
    }

    /// Rewire one channel from its own `cnt` bit, or from the pair's two
    /// bits when it is half of an active 4-op channel.
    pub(crate) fn cm_rewire_ch2x(&mut self, ch2x: usize) {
        if self.regs.chip.chip_mode.newm() && (self.ch_pairing & (1 << ch2x) != 0) {
            let mut prim = ch2x;
            let mut sec = CH2X_PAIRED[ch2x];
            if sec < prim {
                std::mem::swap(&mut prim, &mut sec);
            }
            let prim_cnt = self.regs.chan[prim].routing.cnt() as usize;
            let sec_cnt = self.regs.chan[sec].routing.cnt() as usize;
            let conn = &CONN_CH4X_TABLE[(prim_cnt << 1) | sec_cnt];
            self.cm_rewire_slot(CH2X_TO_WORD[prim][0], &conn[0]);
            self.cm_rewire_slot(CH2X_TO_WORD[prim][1], &conn[1]);
            self.cm_rewire_slot(CH2X_TO_WORD[sec][0], &conn[2]);
            self.cm_rewire_slot(CH2X_TO_WORD[sec][1], &conn[3]);
        } else {
            let cnt = self.regs.chan[ch2x].routing.cnt() as usize;
            let conn = &CONN_CH2X_TABLE[cnt];
            self.cm_rewire_slot(CH2X_TO_WORD[ch2x][0], &conn[0]);
            self.cm_rewire_slot(CH2X_TO_WORD[ch2x][1], &conn[1]);
        }
    }

    /// The 4-op pairing bitmap changed: rewire every affected pair.
    fn cm_rewire_conn(&mut self, prev: ConnSel) {
        let diff = (prev.conn() ^ self.regs.chip.conn_sel.conn()) as u32;

        for ch4x in 0..CHANNEL_NUM_MAX / 2 {
            if diff & (1 << ch4x) == 0 {
                continue;
            }
            let [ch2x, ch2p] = CH4X_TO_PAIR[ch4x];

            if self.regs.chip.conn_sel.conn() & (1 << ch4x) != 0 {
                self.ch_pairing |= (1 << ch2x) | (1 << ch2p);

                let prim_cnt = self.regs.chan[ch2x].routing.cnt() as usize;
                let sec_cnt = self.regs.chan[ch2p].routing.cnt() as usize;
                let conn = &CONN_CH4X_TABLE[(prim_cnt << 1) | sec_cnt];
                self.cm_rewire_slot(CH2X_TO_WORD[ch2x][0], &conn[0]);
                self.cm_rewire_slot(CH2X_TO_WORD[ch2x][1], &conn[1]);
                self.cm_rewire_slot(CH2X_TO_WORD[ch2p][0], &conn[2]);
                self.cm_rewire_slot(CH2X_TO_WORD[ch2p][1], &conn[3]);
            } else {
                self.ch_pairing &= !((1 << ch2x) | (1 << ch2p));

                let ch2x_cnt = self.regs.chan[ch2x].routing.cnt() as usize;
                let conn = &CONN_CH2X_TABLE[ch2x_cnt];
                self.cm_rewire_slot(CH2X_TO_WORD[ch2x][0], &conn[0]);
                self.cm_rewire_slot(CH2X_TO_WORD[ch2x][1], &conn[1]);

                let ch2p_cnt = self.regs.chan[ch2p].routing.cnt() as usize;
                let conn = &CONN_CH2X_TABLE[ch2p_cnt];
                self.cm_rewire_slot(CH2X_TO_WORD[ch2p][0], &conn[0]);
                self.cm_rewire_slot(CH2X_TO_WORD[ch2p][1], &conn[1]);
            }
        }
    }

    /// Rhythm mode or drum keys changed: swap the percussion wiring in or
    /// out and refresh the drum key bits.
    fn cm_rewire_rhythm(&mut self, prev: RhythmFlags) {
        let cur = self.regs.chip.rhythm;
        let mut keys = cur;
        let mut force_update = false;

        if cur.contains(RhythmFlags::RYT) {
            if !prev.contains(RhythmFlags::RYT) {
                // Apply special connection for rhythm mode
                let ch6_cnt = self.regs.chan[6].routing.cnt() as usize;
                let ch6_conn = &CONN_RYT_TABLE[ch6_cnt];
                self.cm_rewire_slot(CH2X_TO_WORD[6][0], &ch6_conn[0]);
                self.cm_rewire_slot(CH2X_TO_WORD[6][1], &ch6_conn[1]);

                let ch7_conn = &CONN_RYT_TABLE[2];
                self.cm_rewire_slot(CH2X_TO_WORD[7][0], &ch7_conn[0]);
                self.cm_rewire_slot(CH2X_TO_WORD[7][1], &ch7_conn[1]);

                let ch8_conn = &CONN_RYT_TABLE[3];
                self.cm_rewire_slot(CH2X_TO_WORD[8][0], &ch8_conn[0]);
                self.cm_rewire_slot(CH2X_TO_WORD[8][1], &ch8_conn[1]);

                force_update = true;
            }
        } else if prev.contains(RhythmFlags::RYT) {
            // Back to the standard two-operator connection
            for ch in [6usize, 7, 8] {
                let cnt = self.regs.chan[ch].routing.cnt() as usize;
                let conn = &CONN_CH2X_TABLE[cnt];
                self.cm_rewire_slot(CH2X_TO_WORD[ch][0], &conn[0]);
                self.cm_rewire_slot(CH2X_TO_WORD[ch][1], &conn[1]);
            }

            keys = RhythmFlags::empty(); // force all drum keys off
            force_update = true;
        }

        let hh = [CH2X_TO_WORD[7][0]];
        let tc = [CH2X_TO_WORD[8][1]];
        let tom = [CH2X_TO_WORD[8][0]];
        let sd = [CH2X_TO_WORD[7][1]];
        let bd = CH2X_TO_WORD[6];
        let drum_words: [(RhythmFlags, &[usize]); 5] = [
            (RhythmFlags::HH, &hh),
            (RhythmFlags::TC, &tc),
            (RhythmFlags::TOM, &tom),
            (RhythmFlags::SD, &sd),
            (RhythmFlags::BD, &bd),
        ];
        for (flag, words) in drum_words {
            if keys.contains(flag) != prev.contains(flag) || force_update {
                for &word in words {
                    if keys.contains(flag) {
                        self.eg_key_on(word, EG_KEY_DRUM);
                    } else {
                        self.eg_key_off(word, EG_KEY_DRUM);
                    }
                }
            }
        }
    }
}
