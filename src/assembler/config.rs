//! Run configuration: where includes are resolved from and which
//! diagnostic categories the core should log.
use std::path::PathBuf;

/// One query hook per diagnostic category. Built from a single byte,
/// most significant bit first:
///
/// | bit | category      |
/// |-----|---------------|
/// | 7   | architecture  |
/// | 6   | major tasks   |
/// | 5   | minor tasks   |
/// | 4   | warnings      |
/// | 3   | parsed major  |
/// | 2   | parsed minor  |
/// | 1   | source echo   |
/// | 0   | rom data      |
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct EchoFlags(u8);

impl EchoFlags {
    pub fn new(mask: u8) -> Self {
        EchoFlags(mask)
    }

    pub fn all() -> Self {
        EchoFlags(0xFF)
    }

    pub fn mask(&self) -> u8 {
        self.0
    }

    #[inline]
    fn bit(&self, b: u8) -> bool {
        self.0 & (1 << b) != 0
    }

    pub fn architecture(&self) -> bool { self.bit(7) }
    pub fn major_tasks(&self) -> bool { self.bit(6) }
    pub fn minor_tasks(&self) -> bool { self.bit(5) }
    pub fn warnings(&self) -> bool { self.bit(4) }
    pub fn parsed_major(&self) -> bool { self.bit(3) }
    pub fn parsed_minor(&self) -> bool { self.bit(2) }
    pub fn source(&self) -> bool { self.bit(1) }
    pub fn rom_data(&self) -> bool { self.bit(0) }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Directory every source name (root file and includes) is resolved against.
    pub source_root: PathBuf,
    pub echo: EchoFlags,
}

impl Default for Config {
    fn default() -> Self {
        Config { source_root: PathBuf::from("."), echo: EchoFlags::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_bits() {
        let e = EchoFlags::new(0b1000_1001);
        assert!(e.architecture());
        assert!(e.parsed_major());
        assert!(e.rom_data());
        assert!(!e.major_tasks());
        assert!(!e.minor_tasks());
        assert!(!e.warnings());
        assert!(!e.parsed_minor());
        assert!(!e.source());

        let e = EchoFlags::all();
        assert!(e.major_tasks() && e.minor_tasks() && e.warnings() && e.source() && e.parsed_minor());
        assert_eq!(EchoFlags::default().mask(), 0);
    }
}
