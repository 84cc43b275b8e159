// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Symbol table and two-pass reference resolution.
//!
//! Pseudo-instructions are expanded into their real-instruction sequences
//! before the first address is assigned, so a template that expands to more
//! than one word can never invalidate previously computed addresses. Pass
//! one walks statements in source order assigning addresses; pass two
//! substitutes symbolic operands with absolute addresses or PC-relative
//! offsets depending on the field the operand lands in.

use std::collections::BTreeMap;

use crate::diag::{Diagnostic, ErrorKind};
use crate::isa::{FieldContent, Isa, OperandKind};
use crate::parser::{self, InstructionNode, Operand, Statement};

/// Classification of a defined symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Code,
    Data,
    External,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Code => "code",
            SymbolKind::Data => "data",
            SymbolKind::External => "external",
        }
    }
}

/// One resolved symbol.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub address: u32,
    pub kind: SymbolKind,
    pub line: u32,
}

/// Name-unique symbol map with deterministic iteration order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a symbol. On a name collision the existing entry is left in
    /// place and returned so the caller can report both definition sites.
    pub fn define(&mut self, symbol: Symbol) -> Result<(), Symbol> {
        match self.entries.get(&symbol.name) {
            Some(existing) => Err(existing.clone()),
            None => {
                self.entries.insert(symbol.name.clone(), symbol);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.values()
    }
}

/// A statement with its assigned address.
#[derive(Debug, Clone)]
pub struct ResolvedStatement {
    pub address: u32,
    pub statement: Statement,
}

/// Output of the resolver: addressed statements, the finalized symbol
/// table, and every diagnostic collected along the way.
#[derive(Debug)]
pub struct Resolution {
    pub nodes: Vec<ResolvedStatement>,
    pub symbols: SymbolTable,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diag| diag.severity() == crate::diag::Severity::Error)
    }
}

/// Expand pseudo-instructions into real instructions.
///
/// Operand names from the pseudo syntax template are substituted textually
/// into the expansion lines, which are then re-parsed under the same ISA.
/// Expanded statements keep the source line of the pseudo-instruction.
pub fn expand_pseudo(statements: Vec<Statement>, isa: &Isa) -> (Vec<Statement>, Vec<Diagnostic>) {
    let mut out = Vec::with_capacity(statements.len());
    let mut diagnostics = Vec::new();

    for statement in statements {
        let Statement::Instruction(node) = &statement else {
            out.push(statement);
            continue;
        };
        let Some(pseudo) = isa.find_pseudo(&node.mnemonic) else {
            out.push(statement);
            continue;
        };

        let params = pseudo.syntax_operands();
        if params.len() != node.operands.len() {
            diagnostics.push(Diagnostic::error(
                node.line,
                ErrorKind::Encoding,
                format!(
                    "Pseudo-instruction {} expects {} operand(s), found {}",
                    pseudo.mnemonic,
                    params.len(),
                    node.operands.len()
                ),
            ));
            continue;
        }

        let bindings: Vec<(&str, String)> = params
            .iter()
            .zip(&node.operands)
            .map(|(param, operand)| (*param, operand.to_source(isa)))
            .collect();

        for template in &pseudo.expansion {
            let line_text = substitute(template, &bindings);
            let (mut expanded, expand_diags) = parser::parse(&line_text, isa);
            if !expand_diags.is_empty() {
                for diag in expand_diags {
                    diagnostics.push(Diagnostic::error(
                        node.line,
                        ErrorKind::Encoding,
                        format!(
                            "Expansion of {} (\"{line_text}\") failed: {}",
                            pseudo.mnemonic,
                            diag.message()
                        ),
                    ));
                }
                continue;
            }
            for inner in &mut expanded {
                set_line(inner, node.line);
            }
            out.append(&mut expanded);
        }
    }

    (out, diagnostics)
}

fn set_line(statement: &mut Statement, line: u32) {
    match statement {
        Statement::Instruction(node) => node.line = line,
        Statement::Label { line: l, .. } => *l = line,
        Statement::Directive { line: l, .. } => *l = line,
    }
}

/// Replace whole-identifier occurrences of each parameter name.
fn substitute(template: &str, bindings: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut ix = 0;
    while ix < chars.len() {
        let ch = chars[ix];
        if ch.is_ascii_alphabetic() || ch == '_' {
            let start = ix;
            while ix < chars.len() && (chars[ix].is_ascii_alphanumeric() || chars[ix] == '_') {
                ix += 1;
            }
            let word: String = chars[start..ix].iter().collect();
            match bindings.iter().find(|(param, _)| *param == word) {
                Some((_, replacement)) => out.push_str(replacement),
                None => out.push_str(&word),
            }
        } else {
            out.push(ch);
            ix += 1;
        }
    }
    out
}

/// Resolve a parsed program: expand pseudo-instructions, assign addresses,
/// then substitute symbolic operands. All problems are collected.
pub fn resolve(statements: Vec<Statement>, isa: &Isa) -> Resolution {
    let (statements, mut diagnostics) = expand_pseudo(statements, isa);

    let mut symbols = SymbolTable::new();
    for (name, value) in &isa.constants {
        // Constants cannot collide: the map they come from is name-unique.
        let _ = symbols.define(Symbol {
            name: name.clone(),
            address: *value as u32,
            kind: SymbolKind::External,
            line: 0,
        });
    }

    let nodes = assign_addresses(statements, isa, &mut symbols, &mut diagnostics);
    let nodes = substitute_symbols(nodes, isa, &symbols, &mut diagnostics);

    Resolution {
        nodes,
        symbols,
        diagnostics,
    }
}

fn assign_addresses(
    statements: Vec<Statement>,
    isa: &Isa,
    symbols: &mut SymbolTable,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ResolvedStatement> {
    let mut nodes = Vec::with_capacity(statements.len());
    let mut address = isa.address_space.default_code_start;

    for (ix, statement) in statements.iter().enumerate() {
        match statement {
            Statement::Label { name, line } => {
                let kind = if next_is_data_directive(&statements[ix + 1..]) {
                    SymbolKind::Data
                } else {
                    SymbolKind::Code
                };
                let result = symbols.define(Symbol {
                    name: name.clone(),
                    address,
                    kind,
                    line: *line,
                });
                if let Err(existing) = result {
                    let first = if existing.line == 0 {
                        "declared as an ISA constant".to_string()
                    } else {
                        format!("first defined at line {}", existing.line)
                    };
                    diagnostics.push(Diagnostic::error(
                        *line,
                        ErrorKind::Resolution,
                        format!("Duplicate label \"{name}\" at line {line}, {first}"),
                    ));
                }
            }
            Statement::Instruction(_) => {
                address = address.wrapping_add(isa.instruction_bytes());
            }
            Statement::Directive { name, args, line } => {
                match directive_effect(name, args, address, isa) {
                    Ok(DirectiveEffect::SetAddress(target)) => address = target,
                    Ok(DirectiveEffect::Advance(bytes)) => {
                        address = address.wrapping_add(bytes);
                    }
                    Err(message) => {
                        diagnostics.push(Diagnostic::error(*line, ErrorKind::Resolution, message));
                    }
                }
            }
        }
        nodes.push(ResolvedStatement {
            address: statement_address(statement, address, isa),
            statement: statement.clone(),
        });
    }
    nodes
}

/// The address a statement occupies. Instructions and directives were
/// advanced past already, so back out their own size; labels sit at the
/// running address.
fn statement_address(statement: &Statement, address_after: u32, isa: &Isa) -> u32 {
    match statement {
        Statement::Label { .. } => address_after,
        Statement::Instruction(_) => address_after.wrapping_sub(isa.instruction_bytes()),
        Statement::Directive { name, args, .. } => {
            match directive_effect(name, args, address_after, isa) {
                Ok(DirectiveEffect::Advance(bytes)) => address_after.wrapping_sub(bytes),
                _ => address_after,
            }
        }
    }
}

fn next_is_data_directive(rest: &[Statement]) -> bool {
    for statement in rest {
        match statement {
            Statement::Label { .. } => continue,
            Statement::Directive { name, .. } => {
                return matches!(name.as_str(), ".word" | ".byte" | ".space" | ".ascii")
            }
            Statement::Instruction(_) => return false,
        }
    }
    false
}

enum DirectiveEffect {
    SetAddress(u32),
    Advance(u32),
}

fn directive_effect(
    name: &str,
    args: &[Operand],
    current: u32,
    isa: &Isa,
) -> Result<DirectiveEffect, String> {
    match name {
        ".org" => match args {
            [Operand::Number(target)] if *target >= 0 => {
                let target = *target as u32;
                if target >= isa.address_space.size {
                    return Err(format!(
                        ".org target {target:#x} is outside the {}-byte address space",
                        isa.address_space.size
                    ));
                }
                Ok(DirectiveEffect::SetAddress(target))
            }
            _ => Err(".org expects one non-negative numeric address".to_string()),
        },
        ".word" => {
            if args.is_empty() {
                return Err(".word expects at least one value".to_string());
            }
            Ok(DirectiveEffect::Advance(
                isa.word_bytes() * args.len() as u32,
            ))
        }
        ".byte" => {
            if args.is_empty() {
                return Err(".byte expects at least one value".to_string());
            }
            let mut bytes = 0u32;
            for arg in args {
                bytes += match arg {
                    Operand::Str(data) => data.len() as u32,
                    _ => 1,
                };
            }
            Ok(DirectiveEffect::Advance(bytes))
        }
        ".space" => match args {
            [Operand::Number(count)] if *count >= 0 => Ok(DirectiveEffect::Advance(*count as u32)),
            _ => Err(".space expects one non-negative byte count".to_string()),
        },
        ".ascii" => {
            let mut bytes = 0u32;
            for arg in args {
                match arg {
                    Operand::Str(data) => bytes += data.len() as u32,
                    _ => return Err(".ascii expects string arguments".to_string()),
                }
            }
            if bytes == 0 && args.is_empty() {
                return Err(".ascii expects at least one string".to_string());
            }
            Ok(DirectiveEffect::Advance(bytes))
        }
        other => Err(format!("Unsupported directive: {other}")),
    }
}

fn substitute_symbols(
    nodes: Vec<ResolvedStatement>,
    isa: &Isa,
    symbols: &SymbolTable,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ResolvedStatement> {
    nodes
        .into_iter()
        .map(|node| {
            let address = node.address;
            let statement = match node.statement {
                Statement::Instruction(ins) => Statement::Instruction(substitute_instruction(
                    ins,
                    address,
                    isa,
                    symbols,
                    diagnostics,
                )),
                Statement::Directive { name, args, line } => {
                    let args = args
                        .into_iter()
                        .map(|arg| match arg {
                            Operand::Symbol(symbol_name) => {
                                match symbols.lookup(&symbol_name) {
                                    Some(symbol) => Operand::Number(symbol.address as i64),
                                    None => {
                                        diagnostics.push(Diagnostic::error(
                                            line,
                                            ErrorKind::Resolution,
                                            format!("Unresolved symbol \"{symbol_name}\""),
                                        ));
                                        Operand::Symbol(symbol_name)
                                    }
                                }
                            }
                            other => other,
                        })
                        .collect();
                    Statement::Directive { name, args, line }
                }
                other => other,
            };
            ResolvedStatement { address, statement }
        })
        .collect()
}

fn substitute_instruction(
    mut ins: InstructionNode,
    address: u32,
    isa: &Isa,
    symbols: &SymbolTable,
    diagnostics: &mut Vec<Diagnostic>,
) -> InstructionNode {
    // Unknown mnemonics keep their operands; the encoder reports them.
    let Some(def) = isa.find_instruction(&ins.mnemonic) else {
        return ins;
    };
    let operand_names = def.syntax_operands();

    for (ix, operand) in ins.operands.iter_mut().enumerate() {
        let Operand::Symbol(symbol_name) = operand else {
            continue;
        };
        let Some(symbol) = symbols.lookup(symbol_name.as_str()) else {
            diagnostics.push(Diagnostic::error(
                ins.line,
                ErrorKind::Resolution,
                format!("Unresolved symbol \"{symbol_name}\""),
            ));
            continue;
        };

        let kind = operand_names
            .get(ix)
            .and_then(|name| def.operand_field(name))
            .and_then(|field| match field.content {
                FieldContent::Operand(kind) => Some(kind),
                FieldContent::Literal(_) => None,
            });

        let value = match kind {
            Some(OperandKind::Offset) => {
                symbol.address as i64 - (address as i64 + isa.instruction_bytes() as i64)
            }
            _ => symbol.address as i64,
        };
        *operand = Operand::Number(value);
    }
    ins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::builtins;
    use crate::parser::parse;

    fn zx16() -> Isa {
        builtins::load("zx16").unwrap()
    }

    fn resolve_source(source: &str) -> Resolution {
        let isa = zx16();
        let (statements, diagnostics) = parse(source, &isa);
        assert!(diagnostics.is_empty(), "parse failed: {diagnostics:?}");
        resolve(statements, &isa)
    }

    #[test]
    fn labels_record_without_advancing() {
        let resolution = resolve_source("A:\nB: LI x1, 1\nC: HALT\n");
        let a = resolution.symbols.lookup("A").unwrap();
        let b = resolution.symbols.lookup("B").unwrap();
        let c = resolution.symbols.lookup("C").unwrap();
        assert_eq!(a.address, 0);
        assert_eq!(b.address, 0);
        assert_eq!(c.address, 2);
    }

    #[test]
    fn forward_and_backward_references_agree() {
        let forward = resolve_source("JMP TARGET\nNOP\nTARGET: HALT\n");
        let backward = resolve_source("TARGET: HALT\nNOP\nJMP TARGET\n");
        assert!(!forward.has_errors(), "{:?}", forward.diagnostics);
        assert!(!backward.has_errors(), "{:?}", backward.diagnostics);
        assert_eq!(forward.symbols.lookup("TARGET").unwrap().address, 4);
        assert_eq!(backward.symbols.lookup("TARGET").unwrap().address, 0);
    }

    #[test]
    fn duplicate_label_names_both_lines() {
        let resolution = resolve_source("LOOP: NOP\nLOOP: HALT\n");
        assert!(resolution.has_errors());
        let message = resolution.diagnostics[0].message();
        assert!(message.contains("LOOP"), "{message}");
        assert!(message.contains("line 2"), "{message}");
        assert!(message.contains("line 1"), "{message}");
    }

    #[test]
    fn pseudo_expansion_happens_before_addressing() {
        // MOV expands to one ADD; the label after it must sit at one word.
        let resolution = resolve_source("MOV x1, x2\nAFTER: HALT\n");
        assert!(!resolution.has_errors(), "{:?}", resolution.diagnostics);
        assert_eq!(resolution.symbols.lookup("AFTER").unwrap().address, 2);
        let mnemonics: Vec<&str> = resolution
            .nodes
            .iter()
            .filter_map(|node| match &node.statement {
                Statement::Instruction(ins) => Some(ins.mnemonic.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(mnemonics, vec!["ADD", "HALT"]);
    }

    #[test]
    fn pseudo_operands_substitute_into_expansion() {
        let resolution = resolve_source("MOV x5, x7\n");
        let Statement::Instruction(ins) = &resolution.nodes[0].statement else {
            panic!("expected instruction");
        };
        assert_eq!(ins.mnemonic, "ADD");
        assert_eq!(
            ins.operands,
            vec![
                Operand::Register { name: "x5".to_string(), index: 5 },
                Operand::Register { name: "x7".to_string(), index: 7 },
                Operand::Register { name: "x0".to_string(), index: 0 },
            ]
        );
    }

    #[test]
    fn offset_operands_become_pc_relative() {
        // BEQ at address 0, target at address 4: offset = 4 - (0 + 2) = 2.
        let resolution = resolve_source("BEQ x1, x2, SKIP\nNOP\nSKIP: HALT\n");
        assert!(!resolution.has_errors(), "{:?}", resolution.diagnostics);
        let Statement::Instruction(ins) = &resolution.nodes[0].statement else {
            panic!("expected instruction");
        };
        assert_eq!(ins.operands[2], Operand::Number(2));
    }

    #[test]
    fn address_operands_stay_absolute() {
        let resolution = resolve_source("NOP\nJMP TOP\nTOP: HALT\n");
        let Statement::Instruction(ins) = &resolution.nodes[1].statement else {
            panic!("expected instruction");
        };
        assert_eq!(ins.operands[0], Operand::Number(4));
    }

    #[test]
    fn unresolved_symbols_collect_one_error_each() {
        let resolution = resolve_source("JMP NOWHERE\nJMP ELSEWHERE\n");
        let errors: Vec<&str> = resolution
            .diagnostics
            .iter()
            .map(|diag| diag.message())
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("NOWHERE"));
        assert!(errors[1].contains("ELSEWHERE"));
    }

    #[test]
    fn org_repositions_and_word_advances() {
        let resolution = resolve_source(".org 0x10\nDATA: .word 1, 2\nNEXT: HALT\n");
        assert_eq!(resolution.symbols.lookup("DATA").unwrap().address, 0x10);
        assert_eq!(resolution.symbols.lookup("NEXT").unwrap().address, 0x14);
    }

    #[test]
    fn data_labels_are_classified_as_data() {
        let resolution = resolve_source("RUN: NOP\nTABLE: .word 1\n");
        assert_eq!(
            resolution.symbols.lookup("RUN").unwrap().kind,
            SymbolKind::Code
        );
        assert_eq!(
            resolution.symbols.lookup("TABLE").unwrap().kind,
            SymbolKind::Data
        );
    }

    #[test]
    fn isa_constants_are_preseeded_as_external() {
        let resolution = resolve_source("ECALL SVC_EXIT\n");
        assert!(!resolution.has_errors(), "{:?}", resolution.diagnostics);
        let constant = resolution.symbols.lookup("SVC_EXIT").unwrap();
        assert_eq!(constant.kind, SymbolKind::External);
        let Statement::Instruction(ins) = &resolution.nodes[0].statement else {
            panic!("expected instruction");
        };
        assert_eq!(ins.operands[0], Operand::Number(0));
    }
}
