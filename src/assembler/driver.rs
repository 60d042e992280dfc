//! The two-pass driver.
//!
//! Pass 0 walks the root file and every include, building the symbol table
//! and the architecture model and sizing instructions so labels get their
//! addresses. Pass 1 walks the same sources again and emits the program.
//! The decoder rom is synthesized last, from the architecture alone.
use std::rc::Rc;

use super::arch::Architecture;
use super::config::{Config, EchoFlags};
use super::error::{AsmError, AsmResult, ErrorKind};
use super::lexer;
use super::parser::{resolve_value, Context, Directive, Instruction, Keyword};
use super::rom::{DecoderRom, ProgramRom};
use super::source::{FileLoader, IncludeStack, SourceLine, SourceLoader};
use super::symbols::{SymbolKind, SymbolTable};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Pass {
    Declare,
    Generate,
}

pub struct Assembler {
    start_file: String,
    loader: Rc<dyn SourceLoader>,
    echo: EchoFlags,
    symbols: SymbolTable,
    arch: Architecture,
    program: ProgramRom,
    cursor: u64,
}

/// The products of a successful run.
#[derive(Debug)]
pub struct Assembly {
    pub symbols: SymbolTable,
    pub arch: Architecture,
    pub program: ProgramRom,
    pub decoder: DecoderRom,
}

impl Assembly {
    pub fn get_value_by_unique_opcode_string(&self, s: &str) -> Option<u64> {
        self.arch.get_value_by_unique_opcode_string(s)
    }
}

impl Assembler {
    pub fn new<L: SourceLoader + 'static>(start_file: &str, loader: L, echo: EchoFlags) -> Self {
        let arch = Architecture::new();
        let program = ProgramRom::new(ProgramRom::shape_for(&arch));
        Assembler {
            start_file: start_file.to_owned(),
            loader: Rc::new(loader),
            echo,
            symbols: SymbolTable::new(),
            arch,
            program,
            cursor: 0,
        }
    }

    /// Reads sources from disk under `config.source_root`.
    pub fn from_config(start_file: &str, config: &Config) -> Self {
        Assembler::new(start_file, FileLoader::new(config.source_root.clone()), config.echo)
    }

    pub fn echo(&self) -> EchoFlags {
        self.echo
    }

    /// Runs both passes and builds both roms, consuming the assembler.
    pub fn assemble(mut self) -> AsmResult<Assembly> {
        if self.echo.major_tasks() {
            info!("pass 0: declarations in `{}`", self.start_file);
        }
        self.walk(Pass::Declare)?;

        self.program = ProgramRom::for_arch(&self.arch)?;
        if self.echo.major_tasks() {
            info!(
                "pass 1: code generation into a {}-row, {}-bit program rom",
                self.program.len(),
                self.program.word_bits()
            );
        }
        self.walk(Pass::Generate)?;

        if self.echo.major_tasks() {
            info!("synthesizing decoder rom");
        }
        let decoder = DecoderRom::build(&self.arch, &self.symbols)?;
        if self.echo.rom_data() {
            debug!(
                "decoder rom: {} opcode, {} cycle, {} flag input bits; {} output bits; {} bytes",
                decoder.layout.opcode_bits,
                decoder.layout.cycle_bits,
                decoder.layout.flag_bits,
                decoder.image.shape.output_bits,
                decoder.bytes().len()
            );
            debug!("program rom: highest address {:?}", self.program.max_address());
        }

        Ok(Assembly { symbols: self.symbols, arch: self.arch, program: self.program, decoder })
    }

    fn walk(&mut self, pass: Pass) -> AsmResult<()> {
        let loader = Rc::clone(&self.loader);
        let mut stack = IncludeStack::new(loader.as_ref());
        stack.push(&self.start_file)?;
        self.cursor = 0;

        while let Some(line) = stack.next_line()? {
            if self.echo.source() && pass == Pass::Declare {
                trace!("==> {} line #{} = {}", line.file, line.number, line.text);
            }
            self.process_line(pass, &mut stack, &line)
                .map_err(|e| e.at(line.number, "").in_file(&line.file))?;
        }
        if self.echo.minor_tasks() {
            debug!("{:?}: read {} source files", pass, stack.entries().len());
        }
        Ok(())
    }

    fn process_line(&mut self, pass: Pass, stack: &mut IncludeStack, line: &SourceLine) -> AsmResult<()> {
        let mut text = line.text.clone();
        lexer::strip_comment(&mut text);
        let token = match lexer::extract_token_ws(&mut text) {
            Some(t) => t,
            None => return Ok(()),
        };

        // tagged tokens and block braces carry no meaning
        if token.starts_with('#') || token.starts_with('{') || token.starts_with('}') {
            return Ok(());
        }

        if let Some(kw) = Keyword::from_name(&token) {
            if pass == Pass::Declare {
                let mut cx = Context { symbols: &mut self.symbols, arch: &mut self.arch, echo: self.echo };
                kw.process(&mut cx, &text, line.number)?;
            }
            return Ok(());
        }

        if lexer::is_directive(&token) {
            let directive = Directive::parse(&token[1..], &text, &self.symbols, line.number)?;
            let name = directive.name();
            return self.directive(pass, stack, directive, line.number).map_err(|e| e.at(line.number, name));
        }

        if let Some(label) = lexer::strip_label(&token) {
            self.label(pass, label, line.number).map_err(|e| e.at(line.number, "label"))?;
            return match lexer::extract_token_ws(&mut text) {
                Some(mnemonic) => self.instruction(pass, &mnemonic, &text, line.number),
                None => Ok(()),
            };
        }

        self.instruction(pass, &token, &text, line.number)
    }

    fn directive(&mut self, pass: Pass, stack: &mut IncludeStack, directive: Directive, line: usize) -> AsmResult<()> {
        match directive {
            Directive::Include(path) => {
                if self.echo.major_tasks() {
                    info!("*** processing include directive for file: {} (depth {})", path, stack.depth() + 1);
                }
                stack.push(&path)
            }
            Directive::Org(address) => {
                if self.echo.parsed_major() {
                    debug!("*** setting address to ${:04X}", address);
                }
                self.cursor = address;
                Ok(())
            }
            Directive::Const { name, value } => match pass {
                Pass::Declare => self.symbols.add_constant(&name, value, line),
                Pass::Generate => Ok(()),
            },
            Directive::Var { name, address } => match pass {
                Pass::Declare => self.symbols.add_variable(&name, address, line),
                Pass::Generate => Ok(()),
            },
            Directive::Byte(values) => match pass {
                Pass::Declare => {
                    self.cursor += values.len() as u64;
                    Ok(())
                }
                Pass::Generate => {
                    for v in values {
                        let value = resolve_value(&v, &self.symbols)?;
                        self.emit_value(value, &v)?;
                    }
                    Ok(())
                }
            },
        }
    }

    fn label(&mut self, pass: Pass, name: &str, line: usize) -> AsmResult<()> {
        match pass {
            Pass::Declare => self.symbols.add_label(name, self.cursor, line),
            Pass::Generate => {
                let expected = match self.symbols.get(name) {
                    Some(sym) if sym.kind == SymbolKind::Label => sym.address,
                    Some(sym) => {
                        return Err(AsmError::unsupported(format!("`{}` is a {}, not a label", name, sym.kind)))
                    }
                    None => return Err(AsmError::new(ErrorKind::UnknownSymbol(name.to_owned()))),
                };
                if expected != self.cursor {
                    return Err(AsmError::new(ErrorKind::AddressDrift {
                        label: name.to_owned(),
                        expected,
                        actual: self.cursor,
                    }));
                }
                self.cursor = expected;
                Ok(())
            }
        }
    }

    fn instruction(&mut self, pass: Pass, mnemonic: &str, rest: &str, line: usize) -> AsmResult<()> {
        let ins = Instruction::parse(mnemonic, rest, &self.symbols).map_err(|e| e.at(line, mnemonic))?;
        match pass {
            Pass::Declare => {
                self.cursor += ins.size();
                Ok(())
            }
            Pass::Generate => self.encode(&ins).map_err(|e| e.at(line, mnemonic)),
        }
    }

    fn encode(&mut self, ins: &Instruction) -> AsmResult<()> {
        let opcode = self
            .arch
            .resolve_mnemonic(&ins.signature)
            .ok_or_else(|| AsmError::new(ErrorKind::UnknownSymbol(ins.signature.clone())))?;
        if self.echo.parsed_minor() {
            debug!("${:04X}: {} => ${:02X}", self.cursor, ins.signature, opcode);
        }

        let word_bits = self.program.word_bits();
        if word_bits < 64 && opcode >> word_bits != 0 {
            return Err(AsmError::new(ErrorKind::RomOverflow {
                rom: "program",
                detail: format!("opcode ${:X} is wider than a {}-bit program word", opcode, word_bits),
            }));
        }
        self.emit_value(opcode, &ins.signature)?;
        for operand in &ins.operands {
            let value = resolve_value(operand, &self.symbols)?;
            self.emit_value(value, operand)?;
        }
        Ok(())
    }

    /// Writes `value` into the program word at the cursor and advances it.
    /// Operands wider than the word keep their low bits.
    fn emit_value(&mut self, value: u64, what: &str) -> AsmResult<()> {
        let word_bits = self.program.word_bits();
        if word_bits < 64 && value >> word_bits != 0 && self.echo.warnings() {
            let low = value & ((1u64 << word_bits) - 1);
            warn!("`{}` = ${:X} does not fit in {} bits; emitting ${:X}", what, value, word_bits, low);
        }
        self.program.write(self.cursor, value)?;
        self.cursor += 1;
        Ok(())
    }
}
