//! Input grammar: tokenizes one line of the textual command language.
//!
//! This sits outside the core engine; parsing is treated as an
//! external collaborator, but it still ships as part of the crate
//! rather than leaving input wiring to a caller.

use crate::common::{SiteId, TransactionId, VariableId};

/// One parsed instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Begin(TransactionId),
    BeginReadOnly(TransactionId),
    Read(TransactionId, VariableId),
    Write(TransactionId, VariableId, i64),
    End(TransactionId),
    Fail(SiteId),
    Recover(SiteId),
    Dump,
}

/// What a parsed line resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Command(Command),
    /// Blank after stripping comments.
    Empty,
    /// A `===` line: everything after it is non-instruction debug text.
    EndOfInput,
    /// Tokenized but not a recognized instruction shape.
    Malformed(String),
}

/// Splits on `//`, trims, and checks for the `===` terminator before
/// tokenizing into alphanumeric-plus-underscore runs, matching the
/// reference tokenizer's `\w+` behavior.
pub fn parse_line(line: &str) -> Line {
    let stripped = line.split("//").next().unwrap_or("").trim();
    if stripped.is_empty() {
        return Line::Empty;
    }
    if stripped.starts_with("===") {
        return Line::EndOfInput;
    }

    let tokens = tokenize(stripped);
    if tokens.is_empty() {
        return Line::Empty;
    }

    match parse_tokens(&tokens) {
        Some(cmd) => Line::Command(cmd),
        None => Line::Malformed(line.trim().to_string()),
    }
}

fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in s.chars() {
        if c.is_alphanumeric() || c == '_' {
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_tokens(tokens: &[String]) -> Option<Command> {
    let head = tokens[0].as_str();
    match head {
        "begin" if tokens.len() == 2 => Some(Command::Begin(tokens[1].clone())),
        "beginRO" if tokens.len() == 2 => Some(Command::BeginReadOnly(tokens[1].clone())),
        "R" if tokens.len() == 3 => {
            VariableId::parse(&tokens[2]).map(|v| Command::Read(tokens[1].clone(), v))
        }
        "W" if tokens.len() == 4 => {
            let value: i64 = tokens[3].parse().ok()?;
            VariableId::parse(&tokens[2]).map(|v| Command::Write(tokens[1].clone(), v, value))
        }
        "end" if tokens.len() == 2 => Some(Command::End(tokens[1].clone())),
        "fail" if tokens.len() == 2 => tokens[1].parse().ok().map(Command::Fail),
        "recover" if tokens.len() == 2 => tokens[1].parse().ok().map(Command::Recover),
        "dump" if tokens.len() == 1 => Some(Command::Dump),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_forms() {
        assert_eq!(
            parse_line("begin(T1)"),
            Line::Command(Command::Begin("T1".to_string()))
        );
        assert_eq!(
            parse_line("W(T1, x2, 22)"),
            Line::Command(Command::Write("T1".to_string(), VariableId(2), 22))
        );
        assert_eq!(
            parse_line("R(T1,x2)"),
            Line::Command(Command::Read("T1".to_string(), VariableId(2)))
        );
        assert_eq!(parse_line("dump()"), Line::Command(Command::Dump));
        assert_eq!(parse_line("fail(2)"), Line::Command(Command::Fail(2)));
    }

    #[test]
    fn strips_comments_and_whitespace() {
        assert_eq!(parse_line("  // just a comment"), Line::Empty);
        assert_eq!(
            parse_line("begin(T1) // starts T1"),
            Line::Command(Command::Begin("T1".to_string()))
        );
        assert_eq!(parse_line(""), Line::Empty);
    }

    #[test]
    fn recognizes_terminator() {
        assert_eq!(parse_line("=== rest is debug info ==="), Line::EndOfInput);
    }

    #[test]
    fn unknown_command_is_malformed() {
        matches!(parse_line("frobnicate(T1)"), Line::Malformed(_));
    }
}
