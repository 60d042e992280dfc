//! Every named, addressed entity lives here: constants, variables, labels,
//! registers, flags, devices and control lines share one namespace.
use std::collections::HashMap;
use std::fmt;

use super::error::{AsmError, AsmResult, ErrorKind};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum SymbolKind {
    Constant,
    Variable,
    Label,
    Register,
    Flag,
    Device,
    ControlLine,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// For control lines this is the resolved bit pattern.
    pub address: u64,
    pub line: usize,
}

#[derive(Default, Debug)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    // Addresses per kind, in declaration order.
    by_kind: HashMap<SymbolKind, Vec<u64>>,
    // First declared control line, used as the default fetch pattern.
    first_control_line: Option<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts a symbol. Names are unique across every kind.
    pub fn add(&mut self, kind: SymbolKind, name: &str, address: u64, line: usize) -> AsmResult<()> {
        if let Some(existing) = self.symbols.get(name) {
            return Err(AsmError::new(ErrorKind::DuplicateSymbol {
                name: name.to_owned(),
                first_line: existing.line,
            })
            .at(line, ""));
        }

        if kind == SymbolKind::ControlLine && self.first_control_line.is_none() {
            self.first_control_line = Some(name.to_owned());
        }
        self.by_kind.entry(kind).or_default().push(address);
        self.symbols.insert(name.to_owned(), Symbol { name: name.to_owned(), kind, address, line });
        Ok(())
    }

    pub fn add_constant(&mut self, name: &str, address: u64, line: usize) -> AsmResult<()> {
        self.add(SymbolKind::Constant, name, address, line)
    }

    pub fn add_variable(&mut self, name: &str, address: u64, line: usize) -> AsmResult<()> {
        self.add(SymbolKind::Variable, name, address, line)
    }

    pub fn add_label(&mut self, name: &str, address: u64, line: usize) -> AsmResult<()> {
        self.add(SymbolKind::Label, name, address, line)
    }

    pub fn add_register(&mut self, name: &str, address: u64, line: usize) -> AsmResult<()> {
        self.add(SymbolKind::Register, name, address, line)
    }

    pub fn add_flag(&mut self, name: &str, address: u64, line: usize) -> AsmResult<()> {
        self.add(SymbolKind::Flag, name, address, line)
    }

    pub fn add_device(&mut self, name: &str, address: u64, line: usize) -> AsmResult<()> {
        self.add(SymbolKind::Device, name, address, line)
    }

    pub fn add_control_line(&mut self, name: &str, value: u64, line: usize) -> AsmResult<()> {
        self.add(SymbolKind::ControlLine, name, value, line)
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn get_symbol_address(&self, name: &str) -> AsmResult<u64> {
        self.symbols
            .get(name)
            .map(|s| s.address)
            .ok_or_else(|| AsmError::new(ErrorKind::UnknownSymbol(name.to_owned())))
    }

    pub fn get_symbol_type(&self, name: &str) -> Option<SymbolKind> {
        self.symbols.get(name).map(|s| s.kind)
    }

    pub fn get_symbol_addresses(&self, kind: SymbolKind) -> &[u64] {
        self.by_kind.get(&kind).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn count(&self, kind: SymbolKind) -> usize {
        self.get_symbol_addresses(kind).len()
    }

    /// Next sequential address for kinds numbered from 1.
    pub fn next_address(&self, kind: SymbolKind) -> u64 {
        self.count(kind) as u64 + 1
    }

    pub fn first_control_line(&self) -> Option<&str> {
        self.first_control_line.as_deref()
    }

    /// All symbols of one kind, sorted by address then name.
    pub fn symbols_of(&self, kind: SymbolKind) -> Vec<&Symbol> {
        let mut out: Vec<&Symbol> = self.symbols.values().filter(|s| s.kind == kind).collect();
        out.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.name.cmp(&b.name)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_registers() {
        let mut t = SymbolTable::new();
        for name in &["A", "B", "X", "Y"] {
            let addr = t.next_address(SymbolKind::Register);
            t.add_register(name, addr, 3).unwrap();
        }
        assert_eq!(t.get_symbol_addresses(SymbolKind::Register), &[1, 2, 3, 4]);
        assert_eq!(t.get_symbol_address("X").unwrap(), 3);
        assert_eq!(t.get_symbol_type("Y"), Some(SymbolKind::Register));
        assert!(t.get_symbol_addresses(SymbolKind::Flag).is_empty());
    }

    #[test]
    fn test_duplicate_across_kinds() {
        let mut t = SymbolTable::new();
        t.add_register("A", 1, 4).unwrap();
        let err = t.add_flag("A", 1, 9).unwrap_err();
        match err.kind {
            ErrorKind::DuplicateSymbol { name, first_line } => {
                assert_eq!(name, "A");
                assert_eq!(first_line, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.line, 9);
        // the failed insert must not leak into the per-kind lists
        assert!(t.get_symbol_addresses(SymbolKind::Flag).is_empty());

        assert!(t.add_control_line("A", 8, 10).is_err());
        assert!(t.add_label("A", 0, 11).is_err());
        assert!(t.add_constant("A", 0, 12).is_err());
        assert!(t.add_variable("A", 0, 13).is_err());
        assert!(t.add_device("A", 0, 14).is_err());
    }

    #[test]
    fn test_unknown_symbol() {
        let t = SymbolTable::new();
        let err = t.get_symbol_address("nope").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownSymbol(ref n) if n == "nope"));
        assert_eq!(t.get_symbol_type("nope"), None);
    }

    #[test]
    fn test_case_sensitive() {
        let mut t = SymbolTable::new();
        t.add_flag("z", 1, 1).unwrap();
        t.add_flag("Z", 2, 1).unwrap();
        assert_eq!(t.get_symbol_address("Z").unwrap(), 2);
    }

    #[test]
    fn test_first_control_line() {
        let mut t = SymbolTable::new();
        assert_eq!(t.first_control_line(), None);
        t.add_control_line("PC_OUT", 1, 1).unwrap();
        t.add_control_line("IR_IN", 2, 2).unwrap();
        assert_eq!(t.first_control_line(), Some("PC_OUT"));
        let names: Vec<&str> = t.symbols_of(SymbolKind::ControlLine).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["PC_OUT", "IR_IN"]);
    }
}
