//! The architecture model: everything the `register`, `flag`, `control`,
//! `opcode` and width/rom keywords declare, resolved to plain numbers.
//!
//! An opcode owns a sequence of control patterns, one per micro-cycle.
//! A pattern is the OR of the control lines it names, optionally split into
//! two flag-conditioned branches:
//!
//! ```nasm
//! opcode JZ * = $10
//! seq     PC_OUT | MEM_IN
//! seq_if  Z  PC_LOAD        ; cycle 1 when Z is the asserted flag
//! seq_else PC_INC           ; cycle 1 otherwise
//! ```
use std::collections::BTreeMap;
use std::fmt;

use super::error::{AsmError, AsmResult, ErrorKind};

/// Number of significant bits in `n`; `bits(0) == 0`.
pub fn bits(n: u64) -> u32 {
    64 - n.leading_zeros()
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RomShape {
    pub write: bool,
    pub input_bits: u32,
    pub output_bits: u32,
}

impl RomShape {
    /// Image size in bytes with rows packed back to back.
    pub fn byte_len(&self) -> usize {
        let total_bits = (self.output_bits as u128) << self.input_bits;
        ((total_bits + 7) / 8) as usize
    }
}

impl fmt::Display for RomShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} inputs, {} outputs ({})", self.input_bits, self.output_bits,
            if self.write { "write" } else { "non-write" })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Condition {
    /// Address of the flag the branch is keyed on.
    pub flag: u64,
    pub when_set: u64,
    pub when_clear: Option<u64>,
}

/// The control lines active during one micro-cycle.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct ControlPattern {
    pub lines: u64,
    pub condition: Option<Condition>,
}

impl ControlPattern {
    pub fn new(lines: u64) -> Self {
        ControlPattern { lines, condition: None }
    }

    pub fn conditional(flag: u64, when_set: u64) -> Self {
        ControlPattern { lines: 0, condition: Some(Condition { flag, when_set, when_clear: None }) }
    }

    /// The pattern's output for one flag input value.
    pub fn resolve(&self, flag_input: u64) -> u64 {
        match self.condition {
            Some(c) if c.flag == flag_input => self.lines | c.when_set,
            Some(c) => self.lines | c.when_clear.unwrap_or(0),
            None => self.lines,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Opcode {
    pub value: u64,
    /// Mnemonic plus operand shapes, e.g. `MOV A [*]`.
    pub mnemonic: String,
    pub line: usize,
    pub sequence: Vec<ControlPattern>,
}

impl Opcode {
    pub fn new(value: u64, mnemonic: &str, line: usize) -> Self {
        Opcode { value, mnemonic: mnemonic.to_owned(), line, sequence: Vec::new() }
    }

    pub fn num_cycles(&self) -> usize {
        self.sequence.len()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "${:02X} {} ({} cycles)", self.value, self.mnemonic, self.num_cycles())
    }
}

#[derive(Debug)]
pub struct Architecture {
    pub instruction_width: u32,
    pub address_width: u32,
    pub decoder_rom: Option<RomShape>,
    pub program_rom: Option<RomShape>,
    register_widths: Vec<(String, u32)>,
    opcodes: BTreeMap<u64, Opcode>,
    aliases: BTreeMap<u64, Opcode>,
    // mnemonic -> declaring line
    mnemonics: BTreeMap<String, usize>,
    current: Option<u64>,
    max_cycles: usize,
    max_control_value: u64,
}

impl Default for Architecture {
    fn default() -> Self {
        Architecture {
            instruction_width: 8,
            address_width: 8,
            decoder_rom: None,
            program_rom: None,
            register_widths: Vec::new(),
            opcodes: BTreeMap::new(),
            aliases: BTreeMap::new(),
            mnemonics: BTreeMap::new(),
            current: None,
            max_cycles: 0,
            max_control_value: 0,
        }
    }
}

impl Architecture {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_register_width(&mut self, name: &str, width: u32) {
        self.register_widths.push((name.to_owned(), width));
    }

    pub fn register_width(&self, name: &str) -> Option<u32> {
        self.register_widths.iter().find(|(n, _)| n == name).map(|(_, w)| *w)
    }

    pub fn note_control_value(&mut self, value: u64) {
        self.max_control_value = self.max_control_value.max(value);
    }

    pub fn max_control_value(&self) -> u64 {
        self.max_control_value
    }

    /// The value an opcode without an explicit one receives: one past the
    /// previously declared opcode.
    pub fn next_opcode_value(&self) -> u64 {
        self.current.map_or(0, |v| v + 1)
    }

    fn claim_mnemonic(&mut self, mnemonic: &str, line: usize) -> AsmResult<()> {
        if let Some(&first_line) = self.mnemonics.get(mnemonic) {
            return Err(AsmError::new(ErrorKind::DuplicateSymbol { name: mnemonic.to_owned(), first_line }));
        }
        self.mnemonics.insert(mnemonic.to_owned(), line);
        Ok(())
    }

    /// Adds an opcode and makes it the target of following `seq` lines.
    /// The value must fit in `instruction_width` bits.
    pub fn add_opcode(&mut self, value: Option<u64>, mnemonic: &str, line: usize) -> AsmResult<u64> {
        let value = value.unwrap_or_else(|| self.next_opcode_value());
        if self.instruction_width < 64 && value >> self.instruction_width != 0 {
            return Err(AsmError::unsupported(format!(
                "opcode ${:X} does not fit in a {}-bit instruction",
                value, self.instruction_width
            )));
        }
        if let Some(existing) = self.opcodes.get(&value) {
            return Err(AsmError::new(ErrorKind::DuplicateSymbol {
                name: format!("opcode ${:02X}", value),
                first_line: existing.line,
            }));
        }
        self.claim_mnemonic(mnemonic, line)?;
        self.opcodes.insert(value, Opcode::new(value, mnemonic, line));
        self.current = Some(value);
        Ok(value)
    }

    /// Adds an alias. Without an explicit value it shares the current opcode's;
    /// an explicit value must name a declared opcode.
    pub fn add_opcode_alias(&mut self, value: Option<u64>, mnemonic: &str, line: usize) -> AsmResult<u64> {
        let value = match value.or(self.current) {
            Some(v) => v,
            None => return Err(AsmError::syntax("alias has no value and no opcode precedes it")),
        };
        if !self.opcodes.contains_key(&value) {
            return Err(AsmError::new(ErrorKind::UnknownSymbol(format!("opcode ${:02X}", value))));
        }
        if let Some(existing) = self.aliases.get(&value) {
            return Err(AsmError::new(ErrorKind::DuplicateSymbol {
                name: format!("alias ${:02X}", value),
                first_line: existing.line,
            }));
        }
        self.claim_mnemonic(mnemonic, line)?;
        self.aliases.insert(value, Opcode::new(value, mnemonic, line));
        Ok(value)
    }

    fn current_opcode(&mut self) -> AsmResult<&mut Opcode> {
        let value = self.current.ok_or_else(|| AsmError::syntax("sequence declared before any opcode"))?;
        self.opcodes
            .get_mut(&value)
            .ok_or_else(|| AsmError::syntax("sequence declared before any opcode"))
    }

    /// Appends one micro-cycle to the current opcode.
    pub fn add_control_pattern(&mut self, pattern: ControlPattern) -> AsmResult<usize> {
        let op = self.current_opcode()?;
        op.sequence.push(pattern);
        let cycles = op.num_cycles();
        self.max_cycles = self.max_cycles.max(cycles);
        Ok(cycles)
    }

    /// Fills the other branch of the current opcode's last conditional cycle.
    pub fn set_else_branch(&mut self, lines: u64) -> AsmResult<()> {
        let op = self.current_opcode()?;
        match op.sequence.last_mut().and_then(|p| p.condition.as_mut()) {
            Some(c) if c.when_clear.is_none() => {
                c.when_clear = Some(lines);
                Ok(())
            }
            Some(_) => Err(AsmError::syntax("`seq_else` already given for this cycle")),
            None => Err(AsmError::syntax("`seq_else` without a preceding `seq_if`")),
        }
    }

    pub fn is_a_mnemonic(&self, s: &str) -> bool {
        self.mnemonics.contains_key(s)
    }

    pub fn get_value_by_unique_opcode_string(&self, s: &str) -> Option<u64> {
        self.opcodes.values().find(|op| op.mnemonic == s).map(|op| op.value)
    }

    pub fn get_value_by_unique_opcode_alias_string(&self, s: &str) -> Option<u64> {
        self.aliases.values().find(|op| op.mnemonic == s).map(|op| op.value)
    }

    /// Looks a signature up in the opcode table first, then the aliases.
    pub fn resolve_mnemonic(&self, s: &str) -> Option<u64> {
        self.get_value_by_unique_opcode_string(s)
            .or_else(|| self.get_value_by_unique_opcode_alias_string(s))
    }

    pub fn get_opcode(&self, value: u64) -> Option<&Opcode> {
        self.opcodes.get(&value)
    }

    pub fn opcodes(&self) -> impl Iterator<Item = &Opcode> {
        self.opcodes.values()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &Opcode> {
        self.aliases.values()
    }

    pub fn max_opcode_value(&self) -> u64 {
        self.opcodes.keys().next_back().copied().unwrap_or(0)
    }

    pub fn max_cycles(&self) -> usize {
        self.max_cycles
    }
}
