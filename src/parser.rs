// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembly source parsing into statement nodes.
//!
//! Parsing is deliberately loose: operand counts and types are not checked
//! here, and unknown mnemonics are kept as instruction nodes so the encoder
//! can report precise per-instruction errors later. One bad line never stops
//! the rest of the file from being parsed.

use crate::diag::{Diagnostic, ErrorKind};
use crate::isa::Isa;
use crate::scanner::{Scanner, Token, TokenKind};

/// An instruction operand as written in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A register reference, resolved to its declaration index.
    Register { name: String, index: usize },
    /// A numeric literal.
    Number(i64),
    /// A symbolic reference (label or constant), resolved later.
    Symbol(String),
    /// A string literal (directive argument).
    Str(Vec<u8>),
}

impl Operand {
    /// Render the operand back to source form, used by pseudo-instruction
    /// template substitution.
    pub fn to_source(&self, isa: &Isa) -> String {
        match self {
            Operand::Register { name, .. } => {
                format!("{}{}", isa.syntax.register_prefix, name)
            }
            Operand::Number(value) => value.to_string(),
            Operand::Symbol(name) => name.clone(),
            Operand::Str(bytes) => format!("\"{}\"", String::from_utf8_lossy(bytes)),
        }
    }
}

/// One instruction as parsed, before resolution.
#[derive(Debug, Clone)]
pub struct InstructionNode {
    pub mnemonic: String,
    pub operands: Vec<Operand>,
    pub line: u32,
}

/// A parsed statement in source order.
#[derive(Debug, Clone)]
pub enum Statement {
    Instruction(InstructionNode),
    Label { name: String, line: u32 },
    Directive { name: String, args: Vec<Operand>, line: u32 },
}

impl Statement {
    pub fn line(&self) -> u32 {
        match self {
            Statement::Instruction(node) => node.line,
            Statement::Label { line, .. } => *line,
            Statement::Directive { line, .. } => *line,
        }
    }
}

/// Parse a whole source text. Statements come back in source order;
/// diagnostics are collected per line and never abort the parse.
pub fn parse(source: &str, isa: &Isa) -> (Vec<Statement>, Vec<Diagnostic>) {
    let scanner = Scanner::new(isa);
    let mut statements = Vec::new();
    let mut diagnostics = Vec::new();

    for (ix, raw_line) in source.lines().enumerate() {
        let line = (ix + 1) as u32;
        let tokens = match scanner.tokenize_line(raw_line) {
            Ok(tokens) => tokens,
            Err(err) => {
                diagnostics.push(
                    Diagnostic::error(line, ErrorKind::Parse, err.message)
                        .with_column(Some(err.column)),
                );
                continue;
            }
        };
        if tokens.is_empty() {
            continue;
        }
        parse_line(&tokens, line, isa, &mut statements, &mut diagnostics);
    }

    (statements, diagnostics)
}

fn parse_line(
    tokens: &[Token],
    line: u32,
    isa: &Isa,
    statements: &mut Vec<Statement>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut rest = tokens;

    // Leading `name:` label definition; the remainder of the line may hold
    // a further statement.
    if rest.len() >= 2 && rest[0].kind == TokenKind::Identifier && rest[1].kind == TokenKind::Colon
    {
        statements.push(Statement::Label {
            name: rest[0].text.clone(),
            line,
        });
        rest = &rest[2..];
    }
    if rest.is_empty() {
        return;
    }

    let head = &rest[0];
    match head.kind {
        TokenKind::Directive => {
            if !isa.allows_directive(&head.text) {
                diagnostics.push(
                    Diagnostic::error(
                        line,
                        ErrorKind::Parse,
                        format!("Unknown directive: {}", head.text),
                    )
                    .with_column(Some(head.column)),
                );
                return;
            }
            match parse_operand_list(&rest[1..], line) {
                Ok(args) => statements.push(Statement::Directive {
                    name: head.text.to_ascii_lowercase(),
                    args,
                    line,
                }),
                Err(diag) => diagnostics.push(diag),
            }
        }
        TokenKind::Identifier => match parse_operand_list(&rest[1..], line) {
            Ok(operands) => statements.push(Statement::Instruction(InstructionNode {
                mnemonic: head.text.clone(),
                operands,
                line,
            })),
            Err(diag) => diagnostics.push(diag),
        },
        _ => {
            diagnostics.push(
                Diagnostic::error(
                    line,
                    ErrorKind::Parse,
                    format!("Expected mnemonic, directive or label, found \"{}\"", head.text),
                )
                .with_column(Some(head.column)),
            );
        }
    }
}

fn parse_operand_list(tokens: &[Token], line: u32) -> Result<Vec<Operand>, Diagnostic> {
    let mut operands = Vec::new();
    let mut expect_operand = true;

    for token in tokens {
        if expect_operand {
            let operand = match token.kind {
                TokenKind::Register => Operand::Register {
                    name: token.text.clone(),
                    index: token.value as usize,
                },
                TokenKind::Constant => Operand::Number(token.value),
                TokenKind::Identifier => Operand::Symbol(token.text.clone()),
                TokenKind::Str => Operand::Str(token.bytes.clone()),
                _ => {
                    return Err(Diagnostic::error(
                        line,
                        ErrorKind::Parse,
                        format!("Expected operand, found \"{}\"", token.text),
                    )
                    .with_column(Some(token.column)))
                }
            };
            operands.push(operand);
            expect_operand = false;
        } else {
            if token.kind != TokenKind::Comma {
                return Err(Diagnostic::error(
                    line,
                    ErrorKind::Parse,
                    format!("Expected ',' between operands, found \"{}\"", token.text),
                )
                .with_column(Some(token.column)));
            }
            expect_operand = true;
        }
    }

    if expect_operand && !operands.is_empty() {
        return Err(Diagnostic::error(
            line,
            ErrorKind::Parse,
            "Trailing ',' without an operand",
        ));
    }
    Ok(operands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::builtins;

    fn zx16() -> Isa {
        builtins::load("zx16").unwrap()
    }

    #[test]
    fn parses_labels_directives_and_instructions_in_order() {
        let isa = zx16();
        let source = "START:\n  LI x1, 5\n  ADD x1, x1, x1\nDATA:\n  .word 0x1234\n";
        let (statements, diagnostics) = parse(source, &isa);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(statements.len(), 5);
        assert!(matches!(&statements[0], Statement::Label { name, .. } if name == "START"));
        assert!(matches!(&statements[1], Statement::Instruction(node) if node.mnemonic == "LI"));
        assert!(matches!(&statements[4], Statement::Directive { name, .. } if name == ".word"));
    }

    #[test]
    fn label_and_instruction_share_a_line() {
        let isa = zx16();
        let (statements, diagnostics) = parse("LOOP: ADD x1, x2, x3", &isa);
        assert!(diagnostics.is_empty());
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].line(), 1);
        assert_eq!(statements[1].line(), 1);
    }

    #[test]
    fn unknown_mnemonics_are_retained_for_encode_time() {
        let isa = zx16();
        let (statements, diagnostics) = parse("FROB x1, x2", &isa);
        assert!(diagnostics.is_empty());
        assert!(matches!(
            &statements[0],
            Statement::Instruction(node) if node.mnemonic == "FROB"
        ));
    }

    #[test]
    fn comment_and_blank_lines_produce_no_nodes() {
        let isa = zx16();
        let (statements, diagnostics) = parse("; header\n\n   \n; more\n", &isa);
        assert!(statements.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn one_bad_line_does_not_stop_the_parse() {
        let isa = zx16();
        let source = "LI x1, 0xZZ\nADD x1, x1, x1\n";
        let (statements, diagnostics) = parse(source, &isa);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line(), 1);
        assert_eq!(statements.len(), 1);
        assert!(matches!(
            &statements[0],
            Statement::Instruction(node) if node.mnemonic == "ADD"
        ));
    }

    #[test]
    fn missing_comma_between_operands_is_a_parse_error() {
        let isa = zx16();
        let (statements, diagnostics) = parse("ADD x1 x2, x3", &isa);
        assert!(statements.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message().contains("','"));
    }

    #[test]
    fn undeclared_directive_is_rejected_at_parse_time() {
        let isa = zx16();
        let (statements, diagnostics) = parse(".frobnicate 1", &isa);
        assert!(statements.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message().contains("Unknown directive"));
    }

    #[test]
    fn operands_resolve_register_indices() {
        let isa = zx16();
        let (statements, _) = parse("ADD x1, zero, x3", &isa);
        let Statement::Instruction(node) = &statements[0] else {
            panic!("expected instruction");
        };
        assert_eq!(
            node.operands,
            vec![
                Operand::Register { name: "x1".to_string(), index: 1 },
                Operand::Register { name: "zero".to_string(), index: 0 },
                Operand::Register { name: "x3".to_string(), index: 3 },
            ]
        );
    }
}
