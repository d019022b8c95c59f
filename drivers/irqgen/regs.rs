//! IRQ Generator register interface
//!
//! Field layout of the IP core's 32-bit registers and typed accessors over
//! a mapped window. Every write builds the complete register word in a
//! local copy and stores it once; nothing here reads a register back to
//! modify it.

use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::drivers::RegisterIo;

register_bitfields![u32,
    /// Control register
    pub CTRL [
        /// Interrupt generation enabled
        ENABLE OFFSET(0) NUMBITS(1) [],
        /// The last raised interrupt was serviced
        HANDLED OFFSET(1) NUMBITS(1) [],
        /// Acknowledge bits, written as zero when re-arming
        ACK OFFSET(2) NUMBITS(4) []
    ],
    /// Generate register
    pub GENIRQ [
        /// Number of interrupts to raise
        AMOUNT OFFSET(0) NUMBITS(12) [],
        /// Line to raise them on
        LINE OFFSET(12) NUMBITS(4) [],
        /// Delay between consecutive interrupts
        DELAY OFFSET(16) NUMBITS(14) []
    ]
];

/// IRQ Generator registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Register {
    Ctrl = 0x00,
    GenIrq = 0x04,
    IrqCount = 0x08,
    Latency = 0x0C,
}

impl Register {
    /// Byte offset from the window base
    pub const fn offset(self) -> usize {
        self as usize
    }

    /// Register at a byte offset
    pub fn from_offset(offset: usize) -> Option<Self> {
        match offset {
            0x00 => Some(Register::Ctrl),
            0x04 => Some(Register::GenIrq),
            0x08 => Some(Register::IrqCount),
            0x0C => Some(Register::Latency),
            _ => None,
        }
    }
}

/// Bytes spanned by the register file
pub const REGISTER_FILE_SIZE: usize = Register::Latency.offset() + 4;

/// Local copy of a control register word
pub type ControlWord = LocalRegisterCopy<u32, CTRL::Register>;

/// Local copy of a generate register word
pub type GenerateWord = LocalRegisterCopy<u32, GENIRQ::Register>;

/// Latency register units to nanoseconds
///
/// The core does not report a real latency yet; the register value is
/// scaled by this constant and reported as-is.
pub const LATENCY_SCALE_NS: u64 = 10;

/// Build a control word; `ack` is masked to its field
pub fn control_word(enable: bool, handled: bool, ack: u8) -> ControlWord {
    let mut word = ControlWord::new(0);
    word.write(
        CTRL::ENABLE.val(enable as u32)
            + CTRL::HANDLED.val(handled as u32)
            + CTRL::ACK.val(ack as u32),
    );
    word
}

/// Build a generate word; each argument is masked to its field
pub fn generate_word(amount: u32, line: u8, delay: u32) -> GenerateWord {
    let mut word = GenerateWord::new(0);
    word.write(
        GENIRQ::AMOUNT.val(amount) + GENIRQ::LINE.val(line as u32) + GENIRQ::DELAY.val(delay),
    );
    word
}

/// Typed access to a mapped IRQ Generator window
#[derive(Debug, Clone)]
pub struct IrqGenRegisters<R: RegisterIo> {
    io: R,
}

impl<R: RegisterIo> IrqGenRegisters<R> {
    /// Wrap a mapped window
    pub fn new(io: R) -> Self {
        Self { io }
    }

    /// The underlying window
    pub fn io(&self) -> &R {
        &self.io
    }

    /// Write the control register
    pub fn write_control(&self, enable: bool, handled: bool, ack: u8) {
        self.io
            .write32(Register::Ctrl.offset(), control_word(enable, handled, ack).get());
    }

    /// Write the generate register
    pub fn write_generate(&self, amount: u32, line: u8, delay: u32) {
        self.io
            .write32(Register::GenIrq.offset(), generate_word(amount, line, delay).get());
    }

    /// Enable the generator, all other control fields zero
    pub fn enable(&self) {
        self.write_control(true, false, 0);
    }

    /// Tell the generator the interrupt was serviced and re-arm it
    pub fn ack_handled(&self) {
        self.write_control(true, true, 0);
    }

    /// Stop generation: zero amount on line 0 keeping `delay`, then
    /// clear the control register
    pub fn disable(&self, delay: u32) {
        self.write_generate(0, 0, delay);
        crate::utils::wmb();
        self.write_control(false, false, 0);
    }

    /// Latency of the last served interrupt in nanoseconds (scaled stub)
    pub fn read_latency(&self) -> u64 {
        self.io.read32(Register::Latency.offset()) as u64 * LATENCY_SCALE_NS
    }

    /// Total interrupts generated by the core since reset
    pub fn read_irq_count(&self) -> u32 {
        self.io.read32(Register::IrqCount.offset())
    }

    /// Raw register word, for diagnostics
    pub fn read_raw(&self, reg: Register) -> u32 {
        self.io.read32(reg.offset())
    }

    /// Store a raw register word, for diagnostics
    pub fn write_raw(&self, reg: Register, value: u32) {
        self.io.write32(reg.offset(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MmioRegion;
    use test_case::test_case;

    fn window(backing: &mut [u32; 4]) -> IrqGenRegisters<MmioRegion> {
        let region = unsafe { MmioRegion::new(backing.as_mut_ptr().cast(), 16) }.unwrap();
        IrqGenRegisters::new(region)
    }

    #[test_case(true, false, 0 => 0b0000_01 ; "enable only")]
    #[test_case(true, true, 0 => 0b0000_11 ; "enable and handled")]
    #[test_case(false, false, 0xF => 0b1111_00 ; "ack all")]
    #[test_case(false, false, 0x1F => 0b1111_00 ; "ack masked to field")]
    fn test_control_word(enable: bool, handled: bool, ack: u8) -> u32 {
        control_word(enable, handled, ack).get()
    }

    #[test]
    fn test_generate_word_layout() {
        let word = generate_word(5, 3, 2);
        assert_eq!(word.get(), 5 | (3 << 12) | (2 << 16));
        assert_eq!(word.read(GENIRQ::AMOUNT), 5);
        assert_eq!(word.read(GENIRQ::LINE), 3);
        assert_eq!(word.read(GENIRQ::DELAY), 2);
    }

    #[test]
    fn test_generate_word_masks_wide_values() {
        let word = generate_word(0x1FFF, 0x1F, 0x7FFF);
        assert_eq!(word.read(GENIRQ::AMOUNT), 0xFFF);
        assert_eq!(word.read(GENIRQ::LINE), 0xF);
        assert_eq!(word.read(GENIRQ::DELAY), 0x3FFF);
        assert_eq!(word.get() >> 30, 0);
    }

    #[test]
    fn test_ack_handled_writes_whole_word() {
        let mut backing = [0xFFFF_FFFFu32, 0, 0, 0];
        let regs = window(&mut backing);
        regs.ack_handled();
        assert_eq!(regs.read_raw(Register::Ctrl), 0b11);
    }

    #[test]
    fn test_disable_sequence() {
        let mut backing = [0b1u32, generate_word(9, 1, 4).get(), 0, 0];
        let regs = window(&mut backing);
        regs.disable(4);
        let word = GenerateWord::new(regs.read_raw(Register::GenIrq));
        assert_eq!(word.read(GENIRQ::AMOUNT), 0);
        assert_eq!(word.read(GENIRQ::LINE), 0);
        assert_eq!(word.read(GENIRQ::DELAY), 4);
        assert_eq!(regs.read_raw(Register::Ctrl), 0);
    }

    #[test]
    fn test_latency_is_scaled_register_value() {
        let mut backing = [0, 0, 17, 123];
        let regs = window(&mut backing);
        assert_eq!(regs.read_latency(), 1230);
        assert_eq!(regs.read_irq_count(), 17);
    }

    #[test]
    fn test_raw_access() {
        let mut backing = [0u32; 4];
        let regs = window(&mut backing);
        regs.write_raw(Register::GenIrq, 0xDEAD_BEEF);
        assert_eq!(regs.read_raw(Register::GenIrq), 0xDEAD_BEEF);
        assert_eq!(regs.read_raw(Register::Ctrl), 0);
    }

    #[test]
    fn test_register_offsets() {
        assert_eq!(Register::Latency.offset(), 0x0C);
        assert_eq!(Register::from_offset(0x04), Some(Register::GenIrq));
        assert_eq!(Register::from_offset(0x10), None);
        assert_eq!(REGISTER_FILE_SIZE, 0x10);
    }
}
