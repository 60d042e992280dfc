//! This lexer splits source lines into tokens.
//!
//! Lines are consumed destructively by the `extract_*` family: each call pops
//! one token off the front of the line and leaves the remainder in place, so
//! a construct can take what it needs and hand the rest to the next stage.
use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::OnceLock;

use regex::Regex;

use super::error::{AsmError, AsmResult, ErrorKind};
use super::parser::Keyword;
use super::symbols::{SymbolKind, SymbolTable};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TokenClass {
    Identifier,
    Literal,
    Operator,
    Sigil,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub text: String,
    pub class: TokenClass,
}

impl Token {
    pub fn new<S: Into<String>>(text: S) -> Self {
        let text = text.into();
        let class = classify(&text);
        Token { text, class }
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.class == TokenClass::Operator && self.text == op
    }
}

/// Formats for literal number types.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LiteralNumType {
    None,
    Binary,
    Decimal,
    Hexadecimal,
}

fn literal_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\$[0-9A-Fa-f]+|%[01]+|[0-9]+)$").unwrap())
}

fn identifier_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

fn classify(text: &str) -> TokenClass {
    match text {
        "|" | "=" | "<<" | ">>" => TokenClass::Operator,
        _ if get_num_type(text) != LiteralNumType::None => TokenClass::Literal,
        _ if identifier_shape().is_match(text) => TokenClass::Identifier,
        _ => TokenClass::Sigil,
    }
}

/// Removes everything from the first `;` that is not inside double quotes.
pub fn strip_comment(line: &mut String) {
    let mut quoted = false;
    let mut cut = None;
    for (idx, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                cut = Some(idx);
                break;
            }
            _ => {}
        }
    }
    if let Some(idx) = cut {
        line.truncate(idx);
    }
}

fn skip_while<F: Fn(char) -> bool>(chars: &mut Peekable<CharIndices>, f: F) {
    while let Some(&(_, c)) = chars.peek() {
        if !f(c) {
            break;
        }
        chars.next();
    }
}

/// Pops the next token delimited by `is_delim`. Leading delimiters are
/// skipped; the consumed prefix is drained from `line`.
fn extract_token<F: Fn(char) -> bool>(line: &mut String, is_delim: F) -> Option<String> {
    let mut chars = line.char_indices().peekable();
    skip_while(&mut chars, &is_delim);
    let start = chars.peek()?.0;
    skip_while(&mut chars, |c| !is_delim(c));
    let end = chars.peek().map(|&(i, _)| i).unwrap_or(line.len());

    let token = line[start..end].to_owned();
    line.replace_range(..end, "");
    Some(token)
}

/// Pops the next whitespace-delimited token.
pub fn extract_token_ws(line: &mut String) -> Option<String> {
    extract_token(line, char::is_whitespace)
}

/// Pops the next token, treating both whitespace and commas as terminators.
/// Commas never appear in the returned token.
pub fn extract_token_ws_comma(line: &mut String) -> Option<String> {
    extract_token(line, |c| c.is_whitespace() || c == ',')
}

/// Pops a path-shaped token, either quoted or bare. The line must be fully
/// consumed afterwards: anything left over is a syntax error.
pub fn extract_token_str(line: &mut String) -> AsmResult<Option<String>> {
    let trimmed = line.trim();
    let token = if let Some(rest) = trimmed.strip_prefix('"') {
        match rest.find('"') {
            Some(close) => {
                let token = rest[..close].to_owned();
                let leftover = rest[close + 1..].trim().to_owned();
                *line = leftover;
                Some(token)
            }
            None => return Err(AsmError::syntax(format!("unterminated string `{}`", trimmed))),
        }
    } else {
        extract_token_ws(line)
    };

    if !line.trim().is_empty() {
        return Err(AsmError::syntax(format!("unexpected trailing `{}`", line.trim())));
    }
    line.clear();
    Ok(token)
}

/// Splits a line into classified tokens. Whitespace and commas separate
/// tokens; the operators `|`, `=`, `<<` and `>>` are always tokens of their
/// own even when glued to their operands.
pub fn tokenize(line: &str) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(8);
    let mut sb = String::new();
    let mut chars = line.chars().peekable();

    'mainloop: while let Some(c) = chars.next() {
        match c {
            ';' => break 'mainloop,
            '\t' | '\n' | '\x0B' | '\x0C' | '\x0D' | ' ' | ',' => flush(&mut sb, &mut out),
            '|' | '=' => {
                flush(&mut sb, &mut out);
                out.push(Token::new(c.to_string()));
            }
            '<' | '>' if chars.peek() == Some(&c) => {
                chars.next();
                flush(&mut sb, &mut out);
                out.push(Token::new(format!("{}{}", c, c)));
            }
            _ => sb.push(c),
        }
    }
    flush(&mut sb, &mut out);
    out
}

fn flush(sb: &mut String, out: &mut Vec<Token>) {
    if !sb.is_empty() {
        out.push(Token::new(sb.clone()));
        sb.clear();
    }
}

/// Classifies a literal by its leading sigil.
pub fn get_num_type(token: &str) -> LiteralNumType {
    match token.chars().next() {
        Some('$') => LiteralNumType::Hexadecimal,
        Some('%') => LiteralNumType::Binary,
        Some(c) if c.is_ascii_digit() => LiteralNumType::Decimal,
        _ => LiteralNumType::None,
    }
}

/// Parses the magnitude of a literal of a known type.
pub fn parse_literal_num(token: &str, ty: LiteralNumType) -> AsmResult<u64> {
    let bad = || AsmError::new(ErrorKind::BadLiteral(token.to_owned()));
    if !literal_shape().is_match(token) {
        return Err(bad());
    }
    let parsed = match ty {
        LiteralNumType::Hexadecimal => u64::from_str_radix(&token[1..], 16),
        LiteralNumType::Binary => u64::from_str_radix(&token[1..], 2),
        LiteralNumType::Decimal => token.parse::<u64>(),
        LiteralNumType::None => return Err(bad()),
    };
    parsed.map_err(|_| bad())
}

/// Parses a literal of whatever type its sigil announces.
pub fn parse_literal(token: &str) -> AsmResult<u64> {
    parse_literal_num(token, get_num_type(token))
}

pub fn is_command(token: &str) -> bool {
    Keyword::from_name(token).is_some()
}

pub fn is_directive(token: &str) -> bool {
    token.len() > 1 && token.starts_with('.')
}

pub fn is_label(token: &str) -> bool {
    token.len() > 1 && token.starts_with(':')
}

pub fn is_indirect(token: &str) -> bool {
    token.len() > 2 && token.starts_with('[') && token.ends_with(']')
}

pub fn is_address(token: &str) -> bool {
    token.len() > 1 && token.starts_with('@')
}

pub fn is_register(token: &str, symbols: &SymbolTable) -> bool {
    symbols.get_symbol_type(token) == Some(SymbolKind::Register)
}

pub fn is_identifier(token: &str) -> bool {
    identifier_shape().is_match(token)
}

/// Returns the inside of `[...]`.
pub fn strip_indirect(token: &str) -> Option<&str> {
    if is_indirect(token) {
        Some(&token[1..token.len() - 1])
    } else {
        None
    }
}

pub fn strip_label(token: &str) -> Option<&str> {
    if is_label(token) { Some(&token[1..]) } else { None }
}

pub fn strip_address(token: &str) -> Option<&str> {
    if is_address(token) { Some(&token[1..]) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comment() {
        let mut s = "NOP ; does nothing".to_owned();
        strip_comment(&mut s);
        assert_eq!(s, "NOP ");

        let mut s = ".include \"a;b.asm\" ; tail".to_owned();
        strip_comment(&mut s);
        assert_eq!(s, ".include \"a;b.asm\" ");

        let mut s = "; whole line".to_owned();
        strip_comment(&mut s);
        assert!(s.is_empty());
    }

    #[test]
    fn test_extract_token_ws() {
        let mut s = "  register 8 A, B".to_owned();
        assert_eq!(extract_token_ws(&mut s), Some("register".to_owned()));
        assert_eq!(s, " 8 A, B");
        assert_eq!(extract_token_ws(&mut s), Some("8".to_owned()));
        assert_eq!(extract_token_ws(&mut s), Some("A,".to_owned()));
        assert_eq!(extract_token_ws(&mut s), Some("B".to_owned()));
        assert_eq!(extract_token_ws(&mut s), None);

        let mut s = " \t ".to_owned();
        assert_eq!(extract_token_ws(&mut s), None);
    }

    #[test]
    fn test_extract_token_ws_comma() {
        let mut s = "A,B , C,,D".to_owned();
        assert_eq!(extract_token_ws_comma(&mut s), Some("A".to_owned()));
        assert_eq!(extract_token_ws_comma(&mut s), Some("B".to_owned()));
        assert_eq!(extract_token_ws_comma(&mut s), Some("C".to_owned()));
        assert_eq!(extract_token_ws_comma(&mut s), Some("D".to_owned()));
        assert_eq!(extract_token_ws_comma(&mut s), None);
    }

    #[test]
    fn test_extract_token_str() {
        let mut s = " \"lib/cpu.asm\"  ".to_owned();
        assert_eq!(extract_token_str(&mut s).unwrap(), Some("lib/cpu.asm".to_owned()));
        assert!(s.is_empty());

        let mut s = " cpu.asm".to_owned();
        assert_eq!(extract_token_str(&mut s).unwrap(), Some("cpu.asm".to_owned()));

        let mut s = "".to_owned();
        assert_eq!(extract_token_str(&mut s).unwrap(), None);

        let mut s = "cpu.asm garbage".to_owned();
        let err = extract_token_str(&mut s).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Syntax(_)));

        let mut s = "\"cpu.asm".to_owned();
        assert!(extract_token_str(&mut s).is_err());
    }

    #[test]
    fn test_get_num_type() {
        assert_eq!(get_num_type("$FF"), LiteralNumType::Hexadecimal);
        assert_eq!(get_num_type("%1010"), LiteralNumType::Binary);
        assert_eq!(get_num_type("42"), LiteralNumType::Decimal);
        assert_eq!(get_num_type("A"), LiteralNumType::None);
        assert_eq!(get_num_type(""), LiteralNumType::None);
    }

    #[test]
    fn test_parse_literal_num() {
        for i in 0..=u8::MAX as u64 {
            assert_eq!(parse_literal(&format!("{}", i)).unwrap(), i);
            assert_eq!(parse_literal(&format!("${:X}", i)).unwrap(), i);
            assert_eq!(parse_literal(&format!("${:x}", i)).unwrap(), i);
            assert_eq!(parse_literal(&format!("%{:b}", i)).unwrap(), i);
        }
        assert_eq!(parse_literal("$FFFFFFFFFFFFFFFF").unwrap(), u64::MAX);

        for bad in &["$", "%", "%102", "$G1", "12a", "$1_0", "$10000000000000000"] {
            let err = parse_literal(bad).unwrap_err();
            assert!(matches!(err.kind, ErrorKind::BadLiteral(_)), "{}", bad);
        }
        assert!(parse_literal_num("FF", LiteralNumType::None).is_err());
    }

    #[test]
    fn test_tokenize() {
        let toks = tokenize("CTRL=FLAG<<3 ; shifted");
        let text: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(text, vec!["CTRL", "=", "FLAG", "<<", "3"]);
        assert_eq!(toks[0].class, TokenClass::Identifier);
        assert_eq!(toks[1].class, TokenClass::Operator);
        assert_eq!(toks[4].class, TokenClass::Literal);

        let toks = tokenize("A | _B,C>>%01");
        let text: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(text, vec!["A", "|", "_B", "C", ">>", "%01"]);

        let toks = tokenize("MOV [HL], @loop");
        assert_eq!(toks[1], Token { text: "[HL]".to_owned(), class: TokenClass::Sigil });
        assert_eq!(toks[2].class, TokenClass::Sigil);

        assert!(tokenize(" \t ; nothing").is_empty());
        assert_eq!(tokenize("a<b")[0].text, "a<b");
    }

    #[test]
    fn test_predicates() {
        assert!(is_command("register"));
        assert!(is_command("seq_if"));
        assert!(!is_command("REGISTER"));
        assert!(is_directive(".include"));
        assert!(!is_directive("."));
        assert!(is_label(":loop"));
        assert!(!is_label("loop"));
        assert!(is_indirect("[HL]"));
        assert!(!is_indirect("[]"));
        assert!(is_address("@loop"));
        assert_eq!(strip_indirect("[HL]"), Some("HL"));
        assert_eq!(strip_label(":loop"), Some("loop"));
        assert_eq!(strip_address("@loop"), Some("loop"));
        assert!(is_identifier("_B2"));
        assert!(!is_identifier("2B"));

        let mut symbols = SymbolTable::new();
        symbols.add_register("A", 1, 1).unwrap();
        symbols.add_flag("Z", 1, 2).unwrap();
        assert!(is_register("A", &symbols));
        assert!(!is_register("Z", &symbols));
        assert!(!is_register("B", &symbols));
    }
}
