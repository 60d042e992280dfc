//! The Parser module turns one source line's tokens into changes to the
//! symbol table and architecture model (architecture keywords), a parsed
//! directive, or an instruction ready for encoding.
//!
//! The keyword and directive sets are fixed, so both registries are plain
//! enums dispatched with `match`.
use std::convert::TryFrom;

use super::arch::{Architecture, ControlPattern, RomShape};
use super::config::EchoFlags;
use super::error::{AsmError, AsmResult, ErrorKind};
use super::expr;
use super::lexer::{self, Token, TokenClass};
use super::rom;
use super::symbols::{SymbolKind, SymbolTable};

/// Everything an architecture keyword may touch.
pub struct Context<'a> {
    pub symbols: &'a mut SymbolTable,
    pub arch: &'a mut Architecture,
    pub echo: EchoFlags,
}

impl<'a> Context<'a> {
    fn echo_arch(&self) -> bool {
        self.echo.parsed_major() && self.echo.architecture()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Keyword {
    InstructionWidth,
    AddressWidth,
    Width,
    DecoderRom,
    ProgramRom,
    Register,
    Flag,
    Device,
    Control,
    Opcode,
    OpcodeAlias,
    Seq,
    SeqIf,
    SeqElse,
}

const KEYWORDS: [(&str, Keyword); 14] = [
    ("instruction_width", Keyword::InstructionWidth),
    ("address_width", Keyword::AddressWidth),
    ("width", Keyword::Width),
    ("decoder_rom", Keyword::DecoderRom),
    ("program_rom", Keyword::ProgramRom),
    ("register", Keyword::Register),
    ("flag", Keyword::Flag),
    ("device", Keyword::Device),
    ("control", Keyword::Control),
    ("opcode", Keyword::Opcode),
    ("opcode_alias", Keyword::OpcodeAlias),
    ("seq", Keyword::Seq),
    ("seq_if", Keyword::SeqIf),
    ("seq_else", Keyword::SeqElse),
];

impl Keyword {
    pub fn from_name(s: &str) -> Option<Keyword> {
        KEYWORDS.iter().find(|(name, _)| *name == s).map(|(_, kw)| *kw)
    }

    pub fn name(self) -> &'static str {
        KEYWORDS.iter().find(|(_, kw)| *kw == self).map_or("?", |(name, _)| name)
    }

    /// Applies one declaration. `remainder` is the line after the keyword.
    pub fn process(self, cx: &mut Context, remainder: &str, line: usize) -> AsmResult<()> {
        self.apply(cx, remainder.to_owned(), line).map_err(|e| e.at(line, self.name()))
    }

    fn apply(self, cx: &mut Context, mut rest: String, line: usize) -> AsmResult<()> {
        match self {
            Keyword::InstructionWidth => {
                cx.arch.instruction_width = size_token(&mut rest, "width")?;
                Ok(())
            }
            Keyword::AddressWidth => {
                cx.arch.address_width = size_token(&mut rest, "width")?;
                Ok(())
            }
            Keyword::Width => {
                cx.arch.instruction_width = size_token(&mut rest, "instruction width")?;
                cx.arch.address_width = size_token(&mut rest, "address width")?;
                Ok(())
            }
            Keyword::DecoderRom | Keyword::ProgramRom => rom_shape(self, cx, &mut rest),
            Keyword::Register => {
                let width = size_token(&mut rest, "register width")?;
                for name in names(&mut rest)? {
                    let address = cx.symbols.next_address(SymbolKind::Register);
                    cx.symbols.add_register(&name, address, line)?;
                    cx.arch.add_register_width(&name, width);
                    if cx.echo_arch() {
                        debug!("*** Adding {}-bit register [{}] = {}", width, name, address);
                    }
                }
                Ok(())
            }
            Keyword::Flag | Keyword::Device => {
                let kind = if self == Keyword::Flag { SymbolKind::Flag } else { SymbolKind::Device };
                for name in names(&mut rest)? {
                    let address = cx.symbols.next_address(kind);
                    cx.symbols.add(kind, &name, address, line)?;
                    if cx.echo_arch() {
                        debug!("*** Adding {} [{}] = {}", self.name(), name, address);
                    }
                }
                Ok(())
            }
            Keyword::Control => control_line(cx, &rest, line),
            Keyword::Opcode | Keyword::OpcodeAlias => opcode(self, cx, &rest, line),
            Keyword::Seq => {
                let lines = control_lines(cx.symbols, &lexer::tokenize(&rest))?;
                cx.arch.add_control_pattern(ControlPattern::new(lines)).map(|_| ())
            }
            Keyword::SeqIf => {
                let tokens = lexer::tokenize(&rest);
                let (flag, tail) = tokens
                    .split_first()
                    .ok_or_else(|| AsmError::syntax("`seq_if` needs a flag"))?;
                let flag = symbol_of_kind(cx.symbols, &flag.text, SymbolKind::Flag)?;
                let lines = control_lines(cx.symbols, tail)?;
                cx.arch.add_control_pattern(ControlPattern::conditional(flag, lines)).map(|_| ())
            }
            Keyword::SeqElse => {
                let lines = control_lines(cx.symbols, &lexer::tokenize(&rest))?;
                cx.arch.set_else_branch(lines)
            }
        }
    }
}

/// Takes one size token. Sizes must start with a digit.
fn size_token(rest: &mut String, what: &str) -> AsmResult<u32> {
    let tok = lexer::extract_token_ws_comma(rest)
        .ok_or_else(|| AsmError::syntax(format!("there is no valid {}", what)))?;
    if lexer::get_num_type(&tok) != lexer::LiteralNumType::Decimal {
        return Err(AsmError::syntax(format!("invalid {} [{}]", what, tok)));
    }
    let n = lexer::parse_literal(&tok)?;
    u32::try_from(n).map_err(|_| AsmError::new(ErrorKind::BadLiteral(tok)))
}

fn rom_shape(kw: Keyword, cx: &mut Context, rest: &mut String) -> AsmResult<()> {
    let write = size_token(rest, "write token")? == 1;
    let input_bits = size_token(rest, "input size")?;
    let output_bits = size_token(rest, "output size")?;
    let shape = RomShape { write, input_bits, output_bits };
    rom::check_shape(if kw == Keyword::DecoderRom { "decoder" } else { "program" }, shape)?;
    if cx.echo_arch() {
        debug!("*** {} with {}", kw.name(), shape);
    }
    if kw == Keyword::DecoderRom {
        cx.arch.decoder_rom = Some(shape);
    } else {
        cx.arch.program_rom = Some(shape);
    }
    Ok(())
}

/// One or more comma/space separated identifiers.
fn names(rest: &mut String) -> AsmResult<Vec<String>> {
    let mut out = Vec::new();
    while let Some(name) = lexer::extract_token_ws_comma(rest) {
        if !lexer::is_identifier(&name) {
            return Err(AsmError::new(ErrorKind::ExpectedSymbol(name)));
        }
        out.push(name);
    }
    if out.is_empty() {
        return Err(AsmError::syntax("no names given"));
    }
    Ok(out)
}

fn control_line(cx: &mut Context, rest: &str, line: usize) -> AsmResult<()> {
    let tokens = lexer::tokenize(rest);
    let (name, expr_tokens) = tokens
        .split_first()
        .ok_or_else(|| AsmError::syntax("no label provided for control line"))?;
    if name.class != TokenClass::Identifier {
        return Err(AsmError::new(ErrorKind::ExpectedSymbol(name.text.clone())));
    }

    let value = expr::evaluate(expr_tokens, cx.symbols)?;
    cx.symbols.add_control_line(&name.text, value, line)?;
    cx.arch.note_control_value(value);

    if cx.echo.parsed_major() {
        if cx.echo.parsed_minor() {
            debug!("*** Saving control line {} = ${:02X} = %{:b}", name.text, value, value);
        } else {
            debug!("*** Saving control line {} = ${:02X}", name.text, value);
        }
    }
    Ok(())
}

/// `opcode MNEMONIC shapes... [= value]`
fn opcode(kw: Keyword, cx: &mut Context, rest: &str, line: usize) -> AsmResult<()> {
    let tokens = lexer::tokenize(rest);
    let (sig_tokens, value) = match tokens.iter().position(|t| t.is_op("=")) {
        Some(eq) => {
            let value = match &tokens[eq + 1..] {
                [v] if v.class == TokenClass::Literal => lexer::parse_literal(&v.text)?,
                [v] => return Err(AsmError::new(ErrorKind::BadLiteral(v.text.clone()))),
                _ => return Err(AsmError::syntax("expected exactly one value after `=`")),
            };
            (&tokens[..eq], Some(value))
        }
        None => (&tokens[..], None),
    };

    let signature = declared_signature(sig_tokens, cx.symbols)?;
    let value = if kw == Keyword::Opcode {
        cx.arch.add_opcode(value, &signature, line)?
    } else {
        cx.arch.add_opcode_alias(value, &signature, line)?
    };

    if cx.echo_arch() {
        debug!("*** {} [{}] = ${:02X}", kw.name(), signature, value);
    }
    Ok(())
}

fn declared_signature(tokens: &[Token], symbols: &SymbolTable) -> AsmResult<String> {
    let (mnemonic, shapes) = tokens.split_first().ok_or_else(|| AsmError::syntax("missing mnemonic"))?;
    if mnemonic.class != TokenClass::Identifier {
        return Err(AsmError::syntax(format!("invalid mnemonic [{}]", mnemonic.text)));
    }

    let mut sig = vec![mnemonic.text.clone()];
    let mut values = 0;
    for shape in shapes {
        let t = shape.text.as_str();
        let ok = match lexer::strip_indirect(t) {
            Some("*") => {
                values += 1;
                true
            }
            Some(inner) => lexer::is_register(inner, symbols),
            None if t == "*" => {
                values += 1;
                true
            }
            None => lexer::is_register(t, symbols),
        };
        if !ok {
            return Err(AsmError::syntax(format!("operand shape [{}] is not a register, `*` or `[...]`", t)));
        }
        sig.push(t.to_owned());
    }
    if values > 2 {
        return Err(AsmError::unsupported("an instruction carries at most two operand bytes"));
    }
    Ok(sig.join(" "))
}

/// ORs together the control lines named in `tokens`; `|` separators are allowed.
fn control_lines(symbols: &SymbolTable, tokens: &[Token]) -> AsmResult<u64> {
    let mut value = 0;
    for tok in tokens.iter().filter(|t| !t.is_op("|")) {
        value |= symbol_of_kind(symbols, &tok.text, SymbolKind::ControlLine)?;
    }
    Ok(value)
}

fn symbol_of_kind(symbols: &SymbolTable, name: &str, kind: SymbolKind) -> AsmResult<u64> {
    let sym = symbols
        .get(name)
        .ok_or_else(|| AsmError::new(ErrorKind::UnknownSymbol(name.to_owned())))?;
    if sym.kind != kind {
        return Err(AsmError::unsupported(format!("`{}` is a {}, expected a {}", name, sym.kind, kind)));
    }
    Ok(sym.address)
}

/// A parsed `.`-directive.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Directive {
    Include(String),
    Org(u64),
    Const { name: String, value: u64 },
    Var { name: String, address: u64 },
    /// Raw operand tokens; resolved when the bytes are emitted.
    Byte(Vec<String>),
}

impl Directive {
    pub fn name(&self) -> &'static str {
        match self {
            Directive::Include(_) => "include",
            Directive::Org(_) => "org",
            Directive::Const { .. } => "const",
            Directive::Var { .. } => "var",
            Directive::Byte(_) => "byte",
        }
    }

    /// Parses `.name remainder`. `name` excludes the leading dot.
    pub fn parse(name: &str, remainder: &str, symbols: &SymbolTable, line: usize) -> AsmResult<Directive> {
        Directive::parse_body(name, remainder.to_owned(), symbols).map_err(|e| e.at(line, name))
    }

    fn parse_body(name: &str, mut rest: String, symbols: &SymbolTable) -> AsmResult<Directive> {
        match name {
            "include" => match lexer::extract_token_str(&mut rest)? {
                Some(path) if !path.trim().is_empty() => Ok(Directive::Include(path.trim().to_owned())),
                _ => Err(AsmError::syntax("no file to include")),
            },
            "org" => {
                let tok = lexer::extract_token_ws_comma(&mut rest)
                    .ok_or_else(|| AsmError::syntax("org is not assigned a valid value"))?;
                let value = resolve_value(&tok, symbols)?;
                expect_empty(&rest).map(|_| Directive::Org(value))
            }
            "const" | "var" => {
                let tokens = lexer::tokenize(&rest);
                let tokens: Vec<&Token> = tokens.iter().filter(|t| !t.is_op("=")).collect();
                match tokens.as_slice() {
                    [n, v] if n.class == TokenClass::Identifier => {
                        let value = resolve_value(&v.text, symbols)?;
                        Ok(if name == "const" {
                            Directive::Const { name: n.text.clone(), value }
                        } else {
                            Directive::Var { name: n.text.clone(), address: value }
                        })
                    }
                    _ => Err(AsmError::syntax(format!("expected `.{} NAME = value`", name))),
                }
            }
            "byte" => {
                let mut values = Vec::new();
                while let Some(tok) = lexer::extract_token_ws_comma(&mut rest) {
                    values.push(tok);
                }
                if values.is_empty() {
                    Err(AsmError::syntax("no bytes given"))
                } else {
                    Ok(Directive::Byte(values))
                }
            }
            _ => Err(AsmError::new(ErrorKind::UnknownDirective(name.to_owned()))),
        }
    }
}

fn expect_empty(rest: &str) -> AsmResult<()> {
    if rest.trim().is_empty() {
        Ok(())
    } else {
        Err(AsmError::syntax(format!("unexpected trailing `{}`", rest.trim())))
    }
}

/// Resolves an operand to a number: a literal, `@name`, or the name of a
/// constant, variable, label or device.
pub fn resolve_value(token: &str, symbols: &SymbolTable) -> AsmResult<u64> {
    if lexer::get_num_type(token) != lexer::LiteralNumType::None {
        return lexer::parse_literal(token);
    }
    let name = lexer::strip_address(token).unwrap_or(token);
    let sym = symbols
        .get(name)
        .ok_or_else(|| AsmError::new(ErrorKind::UnknownSymbol(name.to_owned())))?;
    match sym.kind {
        SymbolKind::Constant | SymbolKind::Variable | SymbolKind::Label | SymbolKind::Device => Ok(sym.address),
        kind => Err(AsmError::unsupported(format!("a {} cannot be used as an operand value", kind))),
    }
}

/// One program line split into its lookup signature and the operands that
/// become bytes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub signature: String,
    pub operands: Vec<String>,
}

impl Instruction {
    /// Bytes this instruction occupies: the opcode plus one per value operand.
    pub fn size(&self) -> u64 {
        1 + self.operands.len() as u64
    }

    /// Builds the signature the same way `opcode` declarations do: register
    /// operands stay by name, everything else becomes `*` or `[*]`.
    pub fn parse(mnemonic: &str, remainder: &str, symbols: &SymbolTable) -> AsmResult<Instruction> {
        let mut sig = vec![mnemonic.to_owned()];
        let mut operands = Vec::new();
        for tok in lexer::tokenize(remainder) {
            let t = tok.text;
            if tok.class == TokenClass::Operator {
                return Err(AsmError::syntax(format!("unexpected operator `{}`", t)).at(0, mnemonic));
            }
            match lexer::strip_indirect(&t).map(str::to_owned) {
                Some(inner) if lexer::is_register(&inner, symbols) => sig.push(t),
                Some(inner) => {
                    sig.push("[*]".to_owned());
                    operands.push(inner);
                }
                None if lexer::is_register(&t, symbols) => sig.push(t),
                None => {
                    sig.push("*".to_owned());
                    operands.push(t);
                }
            }
        }
        if operands.len() > 2 {
            return Err(AsmError::unsupported("an instruction carries at most two operand bytes").at(0, mnemonic));
        }
        Ok(Instruction { signature: sig.join(" "), operands })
    }
}
