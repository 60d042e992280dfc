//! Error taxonomy for the assembler.
//!
//! Every failure aborts the whole run. Errors raised below the driver
//! (literal parsing, symbol lookups) start out without a location and get
//! one attached by their caller through [`AsmError::at`] and
//! [`AsmError::in_file`].
use std::fmt;
use std::io;
use thiserror::Error;

pub type AsmResult<T> = Result<T, AsmError>;

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),

    #[error("symbol `{name}` already declared on line {first_line}")]
    DuplicateSymbol { name: String, first_line: usize },

    #[error("unknown directive `.{0}`")]
    UnknownDirective(String),

    #[error("bad literal `{0}`")]
    BadLiteral(String),

    #[error("expected a symbol reference, found `{0}`")]
    ExpectedSymbol(String),

    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    #[error("label `{label}` was placed at ${expected:04X} but assembles at ${actual:04X}")]
    AddressDrift { label: String, expected: u64, actual: u64 },

    #[error("{rom} rom overflow: {detail}")]
    RomOverflow { rom: &'static str, detail: String },

    #[error("read failure: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub struct AsmError {
    #[source]
    pub kind: ErrorKind,
    pub file: Option<String>,
    pub line: usize,
    pub construct: String,
}

impl AsmError {
    pub fn new(kind: ErrorKind) -> Self {
        AsmError { kind, file: None, line: 0, construct: String::new() }
    }

    pub fn syntax<S: Into<String>>(message: S) -> Self {
        AsmError::new(ErrorKind::Syntax(message.into()))
    }

    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        AsmError::new(ErrorKind::UnsupportedConstruct(message.into()))
    }

    /// Attaches a line and construct, keeping any location already set by
    /// a deeper caller.
    pub fn at(mut self, line: usize, construct: &str) -> Self {
        if self.line == 0 {
            self.line = line;
        }
        if self.construct.is_empty() {
            self.construct = construct.to_owned();
        }
        self
    }

    pub fn in_file(mut self, file: &str) -> Self {
        if self.file.is_none() {
            self.file = Some(file.to_owned());
        }
        self
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:", file)?;
        }
        write!(f, "{}: ", self.line)?;
        if !self.construct.is_empty() {
            write!(f, "in `{}`: ", self.construct)?;
        }
        write!(f, "{}", self.kind)
    }
}

impl From<io::Error> for AsmError {
    fn from(err: io::Error) -> Self {
        AsmError::new(ErrorKind::Io(err))
    }
}
