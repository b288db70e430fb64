use std::cmp::Ordering;

use miette::Result;

use crate::error;
use crate::image::Image;
use crate::ops::{Op, Operand};
use crate::tty::Tty;

/// LC3 can address 128KB of memory.
pub(crate) const MEMORY_MAX: usize = 0x10000;

/// Conventional start address for user programs.
const PC_START: u16 = 0x3000;

/// Represents complete program state during runtime.
pub struct RunState<T: Tty> {
    /// System memory - 128KB in size.
    mem: Box<[u16; MEMORY_MAX]>,
    /// Program counter
    pc: u16,
    /// 8x 16-bit registers
    reg: [u16; 8],
    /// Condition code
    flag: RunFlag,
    /// Cleared by the HALT trap
    running: bool,
    /// Character I/O port
    tty: T,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunFlag {
    N = 0b100,
    Z = 0b010,
    P = 0b001,
}

impl<T: Tty> RunState<T> {
    /// A zeroed machine with nothing loaded.
    pub fn new(tty: T) -> RunState<T> {
        RunState {
            mem: Box::new([0; MEMORY_MAX]),
            pc: PC_START,
            reg: [0; 8],
            flag: RunFlag::Z,
            running: true,
            tty,
        }
    }

    /// Copy an image payload into memory at its origin.
    ///
    /// Later images overwrite earlier ones where they overlap. `Image`
    /// guarantees the payload fits.
    pub fn load_image(&mut self, image: &Image) {
        let orig = image.origin() as usize;
        self.mem[orig..orig + image.words().len()].copy_from_slice(image.words());
    }

    /// Fetch, decode and execute until the HALT trap or a fault.
    pub fn run(&mut self) -> Result<()> {
        while self.running {
            self.step()?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        let instr = *self.mem(self.pc);
        // PC incremented before the instruction is performed, so offsets are
        // relative to the following word
        self.pc = self.pc.wrapping_add(1);

        match Op::decode(instr) {
            Op::ADD {
                dest_r,
                src_r,
                operand,
            } => self.add(dest_r, src_r, operand),
            Op::AND {
                dest_r,
                src_r,
                operand,
            } => self.and(dest_r, src_r, operand),
            Op::BR { cond, pc_offset9 } => self.br(cond, pc_offset9),
            Op::JMP { base_r } => self.jmp(base_r),
            Op::JSR { pc_offset11 } => self.jsr(pc_offset11),
            Op::JSRR { base_r } => self.jsrr(base_r),
            Op::LD { dest_r, pc_offset9 } => self.ld(dest_r, pc_offset9),
            Op::LDI { dest_r, pc_offset9 } => self.ldi(dest_r, pc_offset9),
            Op::LDR {
                dest_r,
                base_r,
                offset6,
            } => self.ldr(dest_r, base_r, offset6),
            Op::LEA { dest_r, pc_offset9 } => self.lea(dest_r, pc_offset9),
            Op::NOT { dest_r, src_r } => self.not(dest_r, src_r),
            Op::ST { src_r, pc_offset9 } => self.st(src_r, pc_offset9),
            Op::STI { src_r, pc_offset9 } => self.sti(src_r, pc_offset9),
            Op::STR {
                src_r,
                base_r,
                offset6,
            } => self.str(src_r, base_r, offset6),
            Op::TRAP { vect } => self.trap(vect)?,
            Op::RTI => {
                return Err(error::exec_reserved("RTI", self.pc.wrapping_sub(1)));
            }
            Op::RES => {
                return Err(error::exec_reserved("RES", self.pc.wrapping_sub(1)));
            }
        }
        Ok(())
    }

    #[inline]
    fn reg(&mut self, reg: u16) -> &mut u16 {
        // SAFETY: Should only be indexed with values that are & 0b111
        unsafe { self.reg.get_unchecked_mut(reg as usize) }
    }

    #[inline]
    fn mem(&mut self, addr: u16) -> &mut u16 {
        // SAFETY: memory fits any u16 index
        unsafe { self.mem.get_unchecked_mut(addr as usize) }
    }

    #[inline]
    fn set_flags(&mut self, val: u16) {
        self.flag = match (val as i16).cmp(&0) {
            Ordering::Less => RunFlag::N,
            Ordering::Equal => RunFlag::Z,
            Ordering::Greater => RunFlag::P,
        }
    }

    #[inline]
    fn operand(&mut self, operand: Operand) -> u16 {
        match operand {
            Operand::Reg(sr) => *self.reg(sr),
            Operand::Imm(imm) => imm,
        }
    }

    fn add(&mut self, dest_r: u16, src_r: u16, operand: Operand) {
        let val1 = *self.reg(src_r);
        let val2 = self.operand(operand);
        let res = val1.wrapping_add(val2);
        self.set_flags(res);
        *self.reg(dest_r) = res;
    }

    fn and(&mut self, dest_r: u16, src_r: u16, operand: Operand) {
        let val1 = *self.reg(src_r);
        let val2 = self.operand(operand);
        let res = val1 & val2;
        self.set_flags(res);
        *self.reg(dest_r) = res;
    }

    fn br(&mut self, cond: u16, pc_offset9: u16) {
        if self.flag as u16 & cond != 0 {
            self.pc = self.pc.wrapping_add(pc_offset9);
        }
    }

    fn jmp(&mut self, base_r: u16) {
        self.pc = *self.reg(base_r);
    }

    fn jsr(&mut self, pc_offset11: u16) {
        // Return address is saved before the jump, in both modes
        *self.reg(7) = self.pc;
        self.pc = self.pc.wrapping_add(pc_offset11);
    }

    fn jsrr(&mut self, base_r: u16) {
        *self.reg(7) = self.pc;
        self.pc = *self.reg(base_r);
    }

    fn ld(&mut self, dest_r: u16, pc_offset9: u16) {
        let val = *self.mem(self.pc.wrapping_add(pc_offset9));
        *self.reg(dest_r) = val;
        self.set_flags(val);
    }

    fn ldi(&mut self, dest_r: u16, pc_offset9: u16) {
        let ptr = *self.mem(self.pc.wrapping_add(pc_offset9));
        let val = *self.mem(ptr);
        *self.reg(dest_r) = val;
        self.set_flags(val);
    }

    fn ldr(&mut self, dest_r: u16, base_r: u16, offset6: u16) {
        let ptr = *self.reg(base_r);
        let val = *self.mem(ptr.wrapping_add(offset6));
        *self.reg(dest_r) = val;
        self.set_flags(val);
    }

    fn lea(&mut self, dest_r: u16, pc_offset9: u16) {
        let val = self.pc.wrapping_add(pc_offset9);
        *self.reg(dest_r) = val;
        self.set_flags(val);
    }

    fn not(&mut self, dest_r: u16, src_r: u16) {
        // Bitwise complement, never logical negation
        let val = !*self.reg(src_r);
        *self.reg(dest_r) = val;
        self.set_flags(val);
    }

    fn st(&mut self, src_r: u16, pc_offset9: u16) {
        let val = *self.reg(src_r);
        *self.mem(self.pc.wrapping_add(pc_offset9)) = val;
    }

    fn sti(&mut self, src_r: u16, pc_offset9: u16) {
        let val = *self.reg(src_r);
        let ptr = *self.mem(self.pc.wrapping_add(pc_offset9));
        *self.mem(ptr) = val;
    }

    fn str(&mut self, src_r: u16, base_r: u16, offset6: u16) {
        let ptr = *self.reg(base_r);
        let val = *self.reg(src_r);
        *self.mem(ptr.wrapping_add(offset6)) = val;
    }

    fn trap(&mut self, vect: u8) -> Result<()> {
        *self.reg(7) = self.pc;
        match vect {
            // getc
            0x20 => {
                let ch = self.read_byte()? as u16;
                *self.reg(0) = ch;
                self.set_flags(ch);
            }
            // out
            0x21 => {
                let ch = (*self.reg(0) & 0xFF) as u8;
                self.write_byte(ch)?;
                self.flush()?;
            }
            // puts
            0x22 => self.puts()?,
            // in
            0x23 => {
                self.write_str("Enter single character: ")?;
                self.flush()?;
                let ch = self.read_byte()?;
                self.write_byte(ch)?;
                self.flush()?;
                // High 8 bits of R0 are cleared
                *self.reg(0) = ch as u16;
                self.set_flags(ch as u16);
            }
            // putsp
            0x24 => self.putsp()?,
            // halt
            0x25 => {
                self.write_str("HALT\n")?;
                self.flush()?;
                self.running = false;
            }
            _ => return Err(error::exec_unknown_trap(vect, self.pc.wrapping_sub(1))),
        }
        Ok(())
    }

    /// One character per word, from R0 until a zero word.
    fn puts(&mut self) -> Result<()> {
        let start = *self.reg(0);
        for addr in start..=u16::MAX {
            let word = *self.mem(addr);
            if word == 0 {
                return self.flush();
            }
            self.write_byte((word & 0xFF) as u8)?;
        }
        Err(error::exec_unterminated(start))
    }

    /// Two packed characters per word, from R0 until a zero word.
    fn putsp(&mut self) -> Result<()> {
        let start = *self.reg(0);
        for addr in start..=u16::MAX {
            let word = *self.mem(addr);
            if word == 0 {
                return self.flush();
            }
            // Low byte first, high byte only when present
            self.write_byte((word & 0xFF) as u8)?;
            let high = (word >> 8) as u8;
            if high != 0 {
                self.write_byte(high)?;
            }
        }
        Err(error::exec_unterminated(start))
    }

    fn read_byte(&mut self) -> Result<u8> {
        self.tty.read_byte().map_err(error::input_failed)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.tty.write_byte(byte).map_err(error::output_failed)
    }

    fn write_str(&mut self, string: &str) -> Result<()> {
        self.tty.write_str(string).map_err(error::output_failed)
    }

    fn flush(&mut self) -> Result<()> {
        self.tty.flush().map_err(error::output_failed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tty::Buffered;

    /// A machine with `words` loaded at x3000 and an empty input stream.
    fn machine(words: &[u16]) -> RunState<Buffered> {
        machine_with_input(words, &[])
    }

    fn machine_with_input(words: &[u16], input: &[u8]) -> RunState<Buffered> {
        let mut bytes = vec![0x30, 0x00];
        for word in words {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        let image = Image::parse(&bytes, "test").unwrap();
        let mut state = RunState::new(Buffered::with_input(input));
        state.load_image(&image);
        state
    }

    #[test]
    fn flags_follow_signed_interpretation() {
        let mut state = machine(&[]);
        state.set_flags(0xFFFF);
        assert_eq!(state.flag, RunFlag::N);
        state.set_flags(0x8000);
        assert_eq!(state.flag, RunFlag::N);
        state.set_flags(0);
        assert_eq!(state.flag, RunFlag::Z);
        state.set_flags(1);
        assert_eq!(state.flag, RunFlag::P);
        state.set_flags(0x7FFF);
        assert_eq!(state.flag, RunFlag::P);
    }

    #[test]
    fn add_immediate_is_sign_extended() {
        // ADD R0, R0, #-16
        let mut state = machine(&[0x1030]);
        state.step().unwrap();
        assert_eq!(*state.reg(0), 0xFFF0);
        assert_eq!(state.flag, RunFlag::N);
    }

    #[test]
    fn add_register_mode_wraps() {
        // ADD R0, R0, R1
        let mut state = machine(&[0x1001]);
        *state.reg(0) = 0xFFFF;
        *state.reg(1) = 0x0002;
        state.step().unwrap();
        assert_eq!(*state.reg(0), 0x0001);
        assert_eq!(state.flag, RunFlag::P);
    }

    #[test]
    fn and_is_bitwise() {
        // AND R2, R0, R1
        let mut state = machine(&[0x5401]);
        *state.reg(0) = 0b1100;
        *state.reg(1) = 0b1010;
        state.step().unwrap();
        assert_eq!(*state.reg(2), 0b1000);
    }

    #[test]
    fn not_is_bitwise_complement() {
        // AND R0, R0, #0 then NOT R1, R0
        let mut state = machine(&[0x5020, 0x927F]);
        state.step().unwrap();
        state.step().unwrap();
        assert_eq!(*state.reg(1), 0xFFFF);
        assert_eq!(state.flag, RunFlag::N);
    }

    #[test]
    fn br_with_no_bits_never_branches() {
        let mut state = machine(&[0x0005]);
        state.step().unwrap();
        assert_eq!(state.pc, 0x3001);
    }

    #[test]
    fn br_branches_relative_to_incremented_pc() {
        // Condition code starts at Z; BRz #5
        let mut state = machine(&[0x0405]);
        state.step().unwrap();
        assert_eq!(state.pc, 0x3006);

        // BRn #5 does not match Z
        let mut state = machine(&[0x0805]);
        state.step().unwrap();
        assert_eq!(state.pc, 0x3001);

        // BRz #-2 goes backwards
        let mut state = machine(&[0x05FE]);
        state.step().unwrap();
        assert_eq!(state.pc, 0x2FFF);
    }

    #[test]
    fn jmp_loads_base_register() {
        // JMP R1
        let mut state = machine(&[0xC040]);
        *state.reg(1) = 0x4000;
        state.step().unwrap();
        assert_eq!(state.pc, 0x4000);
    }

    #[test]
    fn jsr_saves_return_address_in_both_modes() {
        // JSR #1
        let mut state = machine(&[0x4801]);
        state.step().unwrap();
        assert_eq!(*state.reg(7), 0x3001);
        assert_eq!(state.pc, 0x3002);

        // JSRR R1
        let mut state = machine(&[0x4040]);
        *state.reg(1) = 0x5000;
        state.step().unwrap();
        assert_eq!(*state.reg(7), 0x3001);
        assert_eq!(state.pc, 0x5000);
    }

    #[test]
    fn ld_is_pc_relative() {
        // LD R0, #1 - loads the word two past the instruction
        let mut state = machine(&[0x2001, 0x0000, 0x1234]);
        state.step().unwrap();
        assert_eq!(*state.reg(0), 0x1234);
        assert_eq!(state.flag, RunFlag::P);
    }

    #[test]
    fn ldi_loads_through_pointer() {
        // LDI R0, #1 - pointer lives at x3002, value at x4000
        let mut state = machine(&[0xA001, 0x0000, 0x4000]);
        *state.mem(0x4000) = 0xBEEF;
        state.step().unwrap();
        assert_eq!(*state.reg(0), 0xBEEF);
        assert_eq!(state.flag, RunFlag::N);
    }

    #[test]
    fn ldr_offsets_base_register() {
        // LDR R0, R1, #2
        let mut state = machine(&[0x6042]);
        *state.reg(1) = 0x4000;
        *state.mem(0x4002) = 0x0042;
        state.step().unwrap();
        assert_eq!(*state.reg(0), 0x0042);
    }

    #[test]
    fn lea_loads_address_and_flags() {
        // LEA R0, #-3
        let mut state = machine(&[0xE1FD]);
        state.step().unwrap();
        assert_eq!(*state.reg(0), 0x2FFE);
        assert_eq!(state.flag, RunFlag::P);
    }

    #[test]
    fn st_sti_str_write_memory() {
        // ST R0, #2
        let mut state = machine(&[0x3002]);
        *state.reg(0) = 0xABCD;
        state.step().unwrap();
        assert_eq!(*state.mem(0x3003), 0xABCD);

        // STI R0, #1 - pointer at x3002
        let mut state = machine(&[0xB001, 0x0000, 0x4000]);
        *state.reg(0) = 0xABCD;
        state.step().unwrap();
        assert_eq!(*state.mem(0x4000), 0xABCD);

        // STR R0, R1, #1
        let mut state = machine(&[0x7041]);
        *state.reg(0) = 0xABCD;
        *state.reg(1) = 0x4000;
        state.step().unwrap();
        assert_eq!(*state.mem(0x4001), 0xABCD);
    }

    #[test]
    fn reserved_opcodes_fault() {
        let mut state = machine(&[0x8000]);
        assert!(state.step().is_err());

        let mut state = machine(&[0xD000]);
        assert!(state.step().is_err());
    }

    #[test]
    fn trap_saves_return_address() {
        let mut state = machine(&[0xF025]);
        state.step().unwrap();
        assert_eq!(*state.reg(7), 0x3001);
    }

    #[test]
    fn getc_stores_and_sets_flags_without_echo() {
        let mut state = machine_with_input(&[0xF020], b"A");
        state.step().unwrap();
        assert_eq!(*state.reg(0), 0x41);
        assert_eq!(state.flag, RunFlag::P);
        assert!(state.tty.output().is_empty());
    }

    #[test]
    fn getc_faults_on_exhausted_input() {
        let mut state = machine(&[0xF020]);
        assert!(state.step().is_err());
    }

    #[test]
    fn out_writes_low_byte() {
        let mut state = machine(&[0xF021]);
        *state.reg(0) = 0xFF41;
        state.step().unwrap();
        assert_eq!(state.tty.output(), b"A");
    }

    #[test]
    fn in_prompts_and_echoes() {
        let mut state = machine_with_input(&[0xF023], b"A");
        state.step().unwrap();
        assert_eq!(state.tty.output(), b"Enter single character: A");
        assert_eq!(*state.reg(0), 0x41);
        assert_eq!(state.flag, RunFlag::P);
    }

    #[test]
    fn puts_stops_at_zero_word() {
        let mut state = machine(&[0xF022, 0x0000, 0x0041, 0x0042, 0x0000, 0x0043]);
        *state.reg(0) = 0x3002;
        state.step().unwrap();
        assert_eq!(state.tty.output(), b"AB");
    }

    #[test]
    fn puts_faults_without_terminator() {
        let mut state = machine(&[0xF022]);
        *state.reg(0) = 0xFFFE;
        *state.mem(0xFFFE) = 0x0041;
        *state.mem(0xFFFF) = 0x0042;
        assert!(state.step().is_err());
    }

    #[test]
    fn putsp_unpacks_low_byte_first() {
        // "AB" packed into one word, then "C" with an empty high byte
        let mut state = machine(&[0xF024, 0x0000, 0x4241, 0x0043, 0x0000]);
        *state.reg(0) = 0x3002;
        state.step().unwrap();
        assert_eq!(state.tty.output(), b"ABC");
    }

    #[test]
    fn unknown_trap_vector_faults() {
        let mut state = machine(&[0xF0FF]);
        assert!(state.step().is_err());
    }

    #[test]
    fn counts_to_ten_and_halts() {
        // AND R0, R0, #0 / ADD R0, R0, #10 / TRAP x25
        let mut state = machine(&[0x5020, 0x102A, 0xF025]);
        state.run().unwrap();
        assert!(!state.running);
        assert_eq!(*state.reg(0), 10);
        assert_eq!(state.tty.output(), b"HALT\n");
    }

    #[test]
    fn later_image_wins_on_overlap() {
        let mut state = machine(&[0x5020, 0x102A, 0xF025]);
        let overlay = Image::parse(&[0x30, 0x00, 0xF0, 0x25], "overlay").unwrap();
        state.load_image(&overlay);
        state.run().unwrap();
        assert_eq!(*state.reg(0), 0);
        assert_eq!(state.tty.output(), b"HALT\n");
    }

    #[test]
    fn runs_are_deterministic() {
        let words = &[0x5020, 0x102A, 0xE002, 0xF022, 0xF025, 0x0041, 0x0000];
        let mut first = machine(words);
        let mut second = machine(words);
        first.run().unwrap();
        second.run().unwrap();

        assert_eq!(first.reg, second.reg);
        assert_eq!(first.pc, second.pc);
        assert_eq!(first.flag, second.flag);
        assert!(first.mem[..] == second.mem[..]);
        assert_eq!(first.tty.output(), second.tty.output());
    }
}
