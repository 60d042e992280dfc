//! ROM image builders.
//!
//! Both images are plain byte vectors, zero-filled, with rows of
//! `output_bits` packed back to back most significant bit first. With an
//! 8-bit row this is one byte per address; a 16-bit row is big endian.
//! Addresses always count rows, never bytes.
use super::arch::{bits, Architecture, RomShape};
use super::error::{AsmError, AsmResult, ErrorKind};
use super::symbols::{SymbolKind, SymbolTable};

/// Name of the control line that, when declared, is asserted on every cycle
/// past the end of an opcode's sequence.
pub const FETCH_LINE: &str = "fetch";

/// Widest rom input an image is allocated for.
pub const MAX_INPUT_BITS: u32 = 24;

/// Fails with `RomOverflow` when `shape` is too large to allocate.
pub fn check_shape(rom: &'static str, shape: RomShape) -> AsmResult<()> {
    if shape.input_bits > MAX_INPUT_BITS {
        return Err(AsmError::new(ErrorKind::RomOverflow {
            rom,
            detail: format!("{} input bits exceeds the limit of {}", shape.input_bits, MAX_INPUT_BITS),
        }));
    }
    Ok(())
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RomImage {
    pub shape: RomShape,
    pub data: Vec<u8>,
}

impl RomImage {
    pub fn new(shape: RomShape) -> Self {
        RomImage { shape, data: vec![0; shape.byte_len()] }
    }

    pub fn rows(&self) -> u64 {
        1u64 << self.shape.input_bits
    }

    /// Bytes spanned by the first `rows` rows.
    pub fn bytes_for_rows(&self, rows: u64) -> usize {
        ((rows * self.shape.output_bits as u64 + 7) / 8) as usize
    }

    /// Writes `value` into row `row`, keeping its low `output_bits` bits.
    pub fn set_row(&mut self, row: u64, value: u64) {
        let width = self.shape.output_bits as u64;
        let first_bit = row * width;
        for i in 0..width {
            let bit_index = first_bit + i;
            let byte = (bit_index / 8) as usize;
            let mask = 0x80u8 >> (bit_index % 8);
            let shift = width - 1 - i;
            let set = shift < 64 && (value >> shift) & 1 == 1;
            if set {
                self.data[byte] |= mask;
            } else {
                self.data[byte] &= !mask;
            }
        }
    }

    pub fn row(&self, row: u64) -> u64 {
        let width = self.shape.output_bits as u64;
        let first_bit = row * width;
        let mut value = 0u64;
        for i in 0..width {
            let bit_index = first_bit + i;
            let bit = (self.data[(bit_index / 8) as usize] >> (7 - bit_index % 8)) & 1;
            value = (value << 1) | bit as u64;
        }
        value
    }
}

/// The assembled program, one row per address.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProgramRom {
    pub image: RomImage,
    max_address: Option<u64>,
}

impl ProgramRom {
    pub fn new(shape: RomShape) -> Self {
        ProgramRom { image: RomImage::new(shape), max_address: None }
    }

    /// An empty program rom shaped for `arch`.
    pub fn for_arch(arch: &Architecture) -> AsmResult<Self> {
        let shape = ProgramRom::shape_for(arch);
        check_shape("program", shape)?;
        Ok(ProgramRom::new(shape))
    }

    /// The program rom's shape: declared, or derived from `address_width`
    /// with byte-wide rows.
    pub fn shape_for(arch: &Architecture) -> RomShape {
        arch.program_rom.unwrap_or(RomShape {
            write: false,
            input_bits: arch.address_width,
            output_bits: 8,
        })
    }

    /// Number of addressable rows.
    pub fn len(&self) -> u64 {
        self.image.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.image.data.is_empty()
    }

    /// Row width in bits.
    pub fn word_bits(&self) -> u32 {
        self.image.shape.output_bits
    }

    /// Writes `value` into the row at `address`, keeping its low `word_bits`.
    pub fn write(&mut self, address: u64, value: u64) -> AsmResult<()> {
        let rows = self.len();
        if address >= rows {
            return Err(AsmError::new(ErrorKind::RomOverflow {
                rom: "program",
                detail: format!("address ${:04X} is past the end (${:04X} rows)", address, rows),
            }));
        }
        self.image.set_row(address, value);
        self.max_address = Some(self.max_address.map_or(address, |m| m.max(address)));
        Ok(())
    }

    /// Highest address written so far.
    pub fn max_address(&self) -> Option<u64> {
        self.max_address
    }

    pub fn bytes(&self) -> &[u8] {
        &self.image.data
    }

    /// The image up to and including the highest written row.
    pub fn used_bytes(&self) -> &[u8] {
        let rows = self.max_address.map_or(0, |m| m + 1);
        &self.image.data[..self.image.bytes_for_rows(rows)]
    }
}

/// Bit widths of the decoder rom's input fields.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DecoderLayout {
    pub opcode_bits: u32,
    pub cycle_bits: u32,
    pub flag_bits: u32,
    pub output_bits: u32,
}

impl DecoderLayout {
    pub fn derive(arch: &Architecture, symbols: &SymbolTable) -> Self {
        DecoderLayout {
            opcode_bits: bits(arch.max_opcode_value()),
            cycle_bits: bits(arch.max_cycles() as u64),
            flag_bits: bits(symbols.count(SymbolKind::Flag) as u64),
            output_bits: bits(arch.max_control_value()),
        }
    }

    pub fn input_bits(&self) -> u32 {
        self.opcode_bits + self.cycle_bits + self.flag_bits
    }

    pub fn address(&self, opcode: u64, cycle: u64, flag: u64) -> u64 {
        (opcode << (self.cycle_bits + self.flag_bits)) | (cycle << self.flag_bits) | flag
    }
}

/// The value asserted on cycles an opcode does not define.
pub fn fetch_pattern(symbols: &SymbolTable) -> u64 {
    symbols
        .get(FETCH_LINE)
        .filter(|s| s.kind == SymbolKind::ControlLine)
        .map(|s| s.address)
        .or_else(|| symbols.first_control_line().and_then(|n| symbols.get(n)).map(|s| s.address))
        .unwrap_or(0)
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DecoderRom {
    pub image: RomImage,
    pub layout: DecoderLayout,
}

impl DecoderRom {
    /// Builds the control-pattern table from the finished architecture.
    /// A declared shape must be at least as wide as the derived one.
    pub fn build(arch: &Architecture, symbols: &SymbolTable) -> AsmResult<Self> {
        let layout = DecoderLayout::derive(arch, symbols);
        if layout.input_bits() > MAX_INPUT_BITS {
            return Err(AsmError::new(ErrorKind::RomOverflow {
                rom: "decoder",
                detail: format!(
                    "the architecture needs {} input bits ({} opcode, {} cycle, {} flag), more than {}",
                    layout.input_bits(),
                    layout.opcode_bits,
                    layout.cycle_bits,
                    layout.flag_bits,
                    MAX_INPUT_BITS
                ),
            }));
        }
        let shape = match arch.decoder_rom {
            Some(declared) => {
                if declared.input_bits < layout.input_bits() || declared.output_bits < layout.output_bits {
                    return Err(AsmError::new(ErrorKind::RomOverflow {
                        rom: "decoder",
                        detail: format!(
                            "declared {} but the architecture needs {} inputs and {} outputs",
                            declared,
                            layout.input_bits(),
                            layout.output_bits
                        ),
                    }));
                }
                declared
            }
            None => RomShape { write: false, input_bits: layout.input_bits(), output_bits: layout.output_bits },
        };

        let mut image = RomImage::new(shape);
        let fetch = fetch_pattern(symbols);
        let cycles = 1u64 << layout.cycle_bits;
        let flags = 1u64 << layout.flag_bits;

        for opcode in 0..=arch.max_opcode_value() {
            let sequence = arch.get_opcode(opcode).map(|op| op.sequence.as_slice()).unwrap_or(&[]);
            for cycle in 0..cycles {
                for flag in 0..flags {
                    let value = match sequence.get(cycle as usize) {
                        Some(pattern) => pattern.resolve(flag),
                        None => fetch,
                    };
                    image.set_row(layout.address(opcode, cycle, flag), value);
                }
            }
        }

        Ok(DecoderRom { image, layout })
    }

    pub fn lookup(&self, opcode: u64, cycle: u64, flag: u64) -> u64 {
        self.image.row(self.layout.address(opcode, cycle, flag))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.image.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::arch::ControlPattern;

    #[test]
    fn test_row_packing() {
        let mut img = RomImage::new(RomShape { write: false, input_bits: 2, output_bits: 12 });
        assert_eq!(img.data.len(), 6);
        img.set_row(0, 0xABC);
        img.set_row(1, 0x123);
        assert_eq!(img.data[..3], [0xAB, 0xC1, 0x23]);
        assert_eq!(img.row(0), 0xABC);
        assert_eq!(img.row(1), 0x123);
        assert_eq!(img.row(2), 0);

        // values wider than the row are truncated
        img.set_row(3, 0xFFFF);
        assert_eq!(img.row(3), 0xFFF);
        img.set_row(3, 0);
        assert_eq!(img.row(3), 0);

        let mut img = RomImage::new(RomShape { write: false, input_bits: 1, output_bits: 16 });
        img.set_row(1, 0xBEEF);
        assert_eq!(img.data, vec![0, 0, 0xBE, 0xEF]);
    }

    #[test]
    fn test_program_rom() {
        let mut arch = Architecture::new();
        arch.address_width = 4;
        let mut rom = ProgramRom::for_arch(&arch).unwrap();
        assert_eq!(rom.len(), 16);
        assert_eq!(rom.max_address(), None);
        assert!(rom.used_bytes().is_empty());
        rom.write(3, 0x42).unwrap();
        rom.write(1, 0x01).unwrap();
        assert_eq!(rom.bytes()[3], 0x42);
        assert_eq!(rom.max_address(), Some(3));
        assert_eq!(rom.used_bytes(), &[0, 1, 0, 0x42]);
        let err = rom.write(16, 0).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RomOverflow { rom: "program", .. }));

        arch.address_width = 40;
        let err = ProgramRom::for_arch(&arch).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RomOverflow { rom: "program", .. }));
    }

    #[test]
    fn test_program_rom_addresses_rows() {
        let mut rom = ProgramRom::new(RomShape { write: true, input_bits: 4, output_bits: 4 });
        assert_eq!(rom.len(), 16);
        assert_eq!(rom.bytes().len(), 8);
        for address in 0..16 {
            rom.write(address, address).unwrap();
        }
        assert_eq!(rom.bytes()[..2], [0x01, 0x23]);
        assert_eq!(rom.used_bytes().len(), 8);
        assert!(rom.write(16, 0).is_err());

        let mut rom = ProgramRom::new(RomShape { write: true, input_bits: 4, output_bits: 16 });
        assert_eq!(rom.bytes().len(), 32);
        rom.write(15, 0xBEEF).unwrap();
        assert_eq!(rom.bytes()[30..], [0xBE, 0xEF]);
        let err = rom.write(20, 0).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RomOverflow { rom: "program", .. }));
    }

    #[test]
    fn test_decoder_input_limit() {
        let mut arch = Architecture::new();
        arch.instruction_width = 32;
        arch.add_opcode(Some(0xFFFF_FFFF), "BIG", 1).unwrap();
        let err = DecoderRom::build(&arch, &SymbolTable::new()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RomOverflow { rom: "decoder", .. }));
    }

    #[test]
    fn test_decoder_size_matches_declared_shape() {
        let mut arch = Architecture::new();
        arch.decoder_rom = Some(RomShape { write: true, input_bits: 6, output_bits: 12 });
        let symbols = SymbolTable::new();
        let rom = DecoderRom::build(&arch, &symbols).unwrap();
        assert_eq!(rom.bytes().len(), (12 * (1 << 6) + 7) / 8);
    }

    #[test]
    fn test_decoder_rows() {
        let mut symbols = SymbolTable::new();
        symbols.add_flag("C", 1, 1).unwrap();
        symbols.add_flag("Z", 2, 1).unwrap();
        symbols.add_control_line("PC_OUT", 0x01, 2).unwrap();
        symbols.add_control_line("fetch", 0x80, 3).unwrap();

        let mut arch = Architecture::new();
        arch.note_control_value(0x80);
        arch.add_opcode(None, "NOP", 4).unwrap();
        arch.add_opcode(None, "JZ *", 5).unwrap();
        arch.add_control_pattern(ControlPattern::new(0x03)).unwrap();
        arch.add_control_pattern(ControlPattern::conditional(2, 0x10)).unwrap();
        arch.set_else_branch(0x20).unwrap();

        let rom = DecoderRom::build(&arch, &symbols).unwrap();
        assert_eq!(
            rom.layout,
            DecoderLayout { opcode_bits: 1, cycle_bits: 2, flag_bits: 2, output_bits: 8 }
        );
        assert_eq!(rom.bytes().len(), 32);

        for flag in 0..4 {
            for cycle in 0..4 {
                assert_eq!(rom.lookup(0, cycle, flag), 0x80);
            }
            assert_eq!(rom.lookup(1, 0, flag), 0x03);
            assert_eq!(rom.lookup(1, 2, flag), 0x80);
        }
        assert_eq!(rom.lookup(1, 1, 2), 0x10);
        assert_eq!(rom.lookup(1, 1, 0), 0x20);
        assert_eq!(rom.lookup(1, 1, 1), 0x20);
    }

    #[test]
    fn test_declared_decoder_too_small() {
        let mut symbols = SymbolTable::new();
        symbols.add_control_line("BIG", 0x100, 1).unwrap();
        let mut arch = Architecture::new();
        arch.note_control_value(0x100);
        arch.decoder_rom = Some(RomShape { write: true, input_bits: 4, output_bits: 8 });
        let err = DecoderRom::build(&arch, &symbols).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::RomOverflow { rom: "decoder", .. }));
    }

    #[test]
    fn test_fetch_defaults_to_first_control_line() {
        let mut symbols = SymbolTable::new();
        assert_eq!(fetch_pattern(&symbols), 0);
        symbols.add_control_line("LOAD", 0x04, 1).unwrap();
        symbols.add_control_line("STORE", 0x08, 2).unwrap();
        assert_eq!(fetch_pattern(&symbols), 0x04);
    }
}
