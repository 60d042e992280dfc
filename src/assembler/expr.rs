//! Evaluates the right-hand side of a `control` declaration.
//!
//! The grammar is a single left-to-right scan, not a precedence parser:
//!
//! ```nasm
//! control MEM_IN   = $01
//! control PC_OUT   = MEM_IN << 3       ; 8
//! control LATCH    = PC_OUT | MEM_IN   ; 9, plain or
//! control TOGGLE   = LATCH | _MEM_IN   ; 8, a leading `_` xors instead
//! control ALIAS    = LATCH             ; a bare name replaces the running value
//! ```
use std::convert::TryFrom;

use super::error::{AsmError, AsmResult, ErrorKind};
use super::lexer::{get_num_type, parse_literal_num, LiteralNumType, Token, TokenClass};
use super::symbols::SymbolTable;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Shift {
    None,
    Left,
    Right,
}

#[derive(Debug)]
struct Evaluator {
    acc: Option<u64>,
    op: Shift,
    second: Option<u64>,
    or_mode: bool,
}

impl Evaluator {
    fn new() -> Self {
        Evaluator { acc: None, op: Shift::None, second: None, or_mode: false }
    }

    fn number(&mut self, token: &str) -> AsmResult<()> {
        if self.or_mode {
            return Err(AsmError::new(ErrorKind::ExpectedSymbol(token.to_owned())));
        }
        let n = parse_literal_num(token, get_num_type(token))?;
        if self.op == Shift::None && self.acc.is_none() {
            self.acc = Some(n);
        } else {
            self.second = Some(n);
        }
        Ok(())
    }

    fn symbol(&mut self, token: &str, symbols: &SymbolTable) -> AsmResult<()> {
        if !self.or_mode {
            self.acc = Some(lookup(token, symbols)?);
            return Ok(());
        }

        let acc = self.acc.unwrap_or(0);
        self.acc = Some(match token.strip_prefix('_') {
            Some(name) => acc ^ lookup(name, symbols)?,
            None => acc | lookup(token, symbols)?,
        });
        self.or_mode = false;
        Ok(())
    }

    fn finish(self) -> AsmResult<u64> {
        let first = self.acc.ok_or_else(|| AsmError::syntax("control expression has no value"))?;
        if self.or_mode {
            return Err(AsmError::syntax("`|` is missing its right-hand symbol"));
        }
        if self.op == Shift::None {
            return Ok(first);
        }

        let second = self.second.ok_or_else(|| AsmError::syntax("shift is missing its amount"))?;
        let shifted = u32::try_from(second).ok().and_then(|s| match self.op {
            Shift::Left => first.checked_shl(s),
            _ => first.checked_shr(s),
        });
        shifted.ok_or_else(|| AsmError::syntax(format!("shift amount {} is out of range", second)))
    }
}

fn lookup(name: &str, symbols: &SymbolTable) -> AsmResult<u64> {
    if name.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        return Err(AsmError::new(ErrorKind::ExpectedSymbol(name.to_owned())));
    }
    symbols.get_symbol_address(name)
}

/// Resolves the tokens following a control line's name to one value.
pub fn evaluate(tokens: &[Token], symbols: &SymbolTable) -> AsmResult<u64> {
    let mut ev = Evaluator::new();

    for tok in tokens {
        match tok.class {
            TokenClass::Operator => match tok.text.as_str() {
                "=" => continue,
                "|" => ev.or_mode = true,
                "<<" => ev.op = Shift::Left,
                ">>" => ev.op = Shift::Right,
                _ => return Err(AsmError::syntax(format!("unexpected operator `{}`", tok.text))),
            },
            TokenClass::Literal => ev.number(&tok.text)?,
            _ if get_num_type(&tok.text) == LiteralNumType::None => ev.symbol(&tok.text, symbols)?,
            _ => return Err(AsmError::new(ErrorKind::ExpectedSymbol(tok.text.clone()))),
        }
    }

    ev.finish()
}
