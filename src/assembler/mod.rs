//! The Assembler module takes an architecture description and a program
//! written against it and produces two images: the decoder rom, holding
//! the control pattern for every (opcode, micro-cycle, flag) triple, and
//! the program rom, holding the assembled bytes.
//!
//! Work is done in two passes over the same sources, reading included
//! files in place. See [`driver::Assembler`].

pub mod arch;
pub mod config;
pub mod driver;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod rom;
pub mod source;
pub mod symbols;
