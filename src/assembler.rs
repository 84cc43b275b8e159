// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Encoder: resolved statements to machine code.
//!
//! The result always exposes exactly one canonical raw byte sequence in
//! `machine_code`; callers never have to probe for alternate container
//! shapes. Encoding problems are collected per instruction so a file with a
//! few bad lines still yields bytes for the good ones. Resolution errors
//! are different: addresses are unreliable after one, so no bytes are
//! emitted at all.

use std::collections::BTreeMap;

use crate::diag::{self, Diagnostic, ErrorKind};
use crate::isa::{Endianness, FieldContent, Isa, OperandKind};
use crate::parser::{self, InstructionNode, Operand, Statement};
use crate::symbols::{self, SymbolTable};

/// A named contiguous region of the output image.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub base: u32,
    pub bytes: Vec<u8>,
}

/// Result of one assemble call. Immutable once returned.
#[derive(Debug)]
pub struct AssembledResult {
    /// The flat raw byte image, spanning the lowest to the highest written
    /// address with zero fill in between.
    pub machine_code: Vec<u8>,
    /// Address of the first byte of `machine_code`.
    pub origin: u32,
    pub sections: Vec<Section>,
    pub symbols: SymbolTable,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub success: bool,
}

/// Two-pass assembler over one ISA.
pub struct Assembler<'a> {
    isa: &'a Isa,
}

impl<'a> Assembler<'a> {
    pub fn new(isa: &'a Isa) -> Self {
        Self { isa }
    }

    /// Assemble a complete source text.
    pub fn assemble(&self, source: &str) -> AssembledResult {
        let (statements, parse_diags) = parser::parse(source, self.isa);
        let resolution = symbols::resolve(statements, self.isa);

        let mut diagnostics = parse_diags;
        let resolution_failed = resolution.has_errors();
        diagnostics.extend(resolution.diagnostics);

        let mut image = Image::new();
        if !resolution_failed {
            for node in &resolution.nodes {
                match &node.statement {
                    Statement::Instruction(ins) => {
                        if let Some(word) = self.encode_instruction(ins, &mut diagnostics) {
                            image.store_word(node.address, word, self.isa);
                        }
                    }
                    Statement::Directive { name, args, line } => {
                        self.emit_directive(&mut image, node.address, name, args, *line, &mut diagnostics);
                    }
                    Statement::Label { .. } => {}
                }
            }
        }

        let (errors, warnings) = diag::partition(diagnostics);
        let success = errors.is_empty();
        let (origin, machine_code) = image.flatten(self.isa.address_space.default_code_start);
        let sections = if machine_code.is_empty() {
            Vec::new()
        } else {
            vec![Section {
                name: "text".to_string(),
                base: origin,
                bytes: machine_code.clone(),
            }]
        };

        AssembledResult {
            machine_code,
            origin,
            sections,
            symbols: resolution.symbols,
            errors,
            warnings,
            success,
        }
    }

    /// Encode one instruction to its word, or report why it cannot be.
    fn encode_instruction(
        &self,
        ins: &InstructionNode,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<u64> {
        let Some(def) = self.isa.find_instruction(&ins.mnemonic) else {
            diagnostics.push(Diagnostic::error(
                ins.line,
                ErrorKind::Encoding,
                format!("Unknown instruction: {}", ins.mnemonic),
            ));
            return None;
        };

        let operand_names = def.syntax_operands();
        if operand_names.len() != ins.operands.len() {
            diagnostics.push(Diagnostic::error(
                ins.line,
                ErrorKind::Encoding,
                format!(
                    "{} expects {} operand(s), found {}",
                    def.mnemonic,
                    operand_names.len(),
                    ins.operands.len()
                ),
            ));
            return None;
        }

        let mut word = 0u64;
        let mut failed = false;
        for field in &def.fields {
            let value = match field.content {
                FieldContent::Literal(value) => value,
                FieldContent::Operand(kind) => {
                    // Schema validation guarantees the field name appears in
                    // the syntax template.
                    let ix = operand_names
                        .iter()
                        .position(|name| *name == field.name)
                        .unwrap_or(0);
                    match self.encode_operand(def.mnemonic.as_str(), &ins.operands[ix], kind, field.width(), ins.line, diagnostics)
                    {
                        Some(value) => value,
                        None => {
                            failed = true;
                            continue;
                        }
                    }
                }
            };
            word |= (value & (field.mask() >> field.lo)) << field.lo;
        }
        if failed {
            return None;
        }
        Some(word)
    }

    fn encode_operand(
        &self,
        mnemonic: &str,
        operand: &Operand,
        kind: OperandKind,
        width: u32,
        line: u32,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<u64> {
        match (kind, operand) {
            (OperandKind::Register, Operand::Register { index, name }) => {
                let max = field_max_unsigned(width);
                if *index as u64 > max {
                    diagnostics.push(Diagnostic::error(
                        line,
                        ErrorKind::Encoding,
                        format!(
                            "Register {name} (index {index}) cannot be encoded in a {width}-bit field"
                        ),
                    ));
                    return None;
                }
                Some(*index as u64)
            }
            (OperandKind::Register, other) => {
                diagnostics.push(Diagnostic::error(
                    line,
                    ErrorKind::Encoding,
                    format!(
                        "{mnemonic}: expected a register, found \"{}\"",
                        other.to_source(self.isa)
                    ),
                ));
                None
            }
            (_, Operand::Number(value)) => {
                Some(self.fit_value(mnemonic, *value, kind, width, line, diagnostics))
            }
            (_, Operand::Register { name, .. }) => {
                diagnostics.push(Diagnostic::error(
                    line,
                    ErrorKind::Encoding,
                    format!("{mnemonic}: expected {}, found register {name}", kind.as_str()),
                ));
                None
            }
            (_, Operand::Symbol(_)) => {
                // The resolver already reported this reference as unresolved.
                None
            }
            (_, Operand::Str(_)) => {
                diagnostics.push(Diagnostic::error(
                    line,
                    ErrorKind::Encoding,
                    format!("{mnemonic}: strings are not valid instruction operands"),
                ));
                None
            }
        }
    }

    /// Two's-complement truncate `value` to `width` bits, warning when the
    /// literal does not fit the field. The emitted bits are always the low
    /// `width` bits of the value.
    fn fit_value(
        &self,
        mnemonic: &str,
        value: i64,
        kind: OperandKind,
        width: u32,
        line: u32,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> u64 {
        let fits = if width >= 64 {
            true
        } else if kind.is_signed() {
            let min = -(1i64 << (width - 1));
            let max = (1i64 << (width - 1)) - 1;
            value >= min && value <= max
        } else {
            value >= 0 && (value as u64) <= field_max_unsigned(width)
        };
        if !fits {
            diagnostics.push(Diagnostic::warning(
                line,
                ErrorKind::Encoding,
                format!("{mnemonic}: value {value} truncated to {width} bits"),
            ));
        }
        (value as u64) & field_max_unsigned(width)
    }

    /// Data directives admit the full unsigned range as well as negative
    /// two's-complement values of the same width.
    fn fit_data_value(
        &self,
        directive: &str,
        value: i64,
        width: u32,
        line: u32,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> u64 {
        let fits = width >= 64 || {
            let min = -(1i64 << (width - 1));
            value >= min && (value < 0 || (value as u64) <= field_max_unsigned(width))
        };
        if !fits {
            diagnostics.push(Diagnostic::warning(
                line,
                ErrorKind::Encoding,
                format!("{directive}: value {value} truncated to {width} bits"),
            ));
        }
        (value as u64) & field_max_unsigned(width)
    }

    fn emit_directive(
        &self,
        image: &mut Image,
        address: u32,
        name: &str,
        args: &[Operand],
        line: u32,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        match name {
            ".org" | ".space" => {}
            ".word" => {
                let mut addr = address;
                for arg in args {
                    match arg {
                        Operand::Number(value) => {
                            let bits = self.fit_data_value(".word", *value, self.isa.word_size, line, diagnostics);
                            image.store_value(addr, bits, self.isa.word_bytes(), self.isa.endianness);
                            addr = addr.wrapping_add(self.isa.word_bytes());
                        }
                        other => diagnostics.push(Diagnostic::error(
                            line,
                            ErrorKind::Encoding,
                            format!(".word expects numeric values, found \"{}\"", other.to_source(self.isa)),
                        )),
                    }
                }
            }
            ".byte" => {
                let mut addr = address;
                for arg in args {
                    match arg {
                        Operand::Number(value) => {
                            let bits = self.fit_data_value(".byte", *value, 8, line, diagnostics);
                            image.store(addr, bits as u8);
                            addr = addr.wrapping_add(1);
                        }
                        Operand::Str(bytes) => {
                            image.store_slice(addr, bytes);
                            addr = addr.wrapping_add(bytes.len() as u32);
                        }
                        other => diagnostics.push(Diagnostic::error(
                            line,
                            ErrorKind::Encoding,
                            format!(".byte expects values or strings, found \"{}\"", other.to_source(self.isa)),
                        )),
                    }
                }
            }
            ".ascii" => {
                let mut addr = address;
                for arg in args {
                    if let Operand::Str(bytes) = arg {
                        image.store_slice(addr, bytes);
                        addr = addr.wrapping_add(bytes.len() as u32);
                    }
                }
            }
            _ => {}
        }
    }
}

fn field_max_unsigned(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Address-keyed byte image. Last write wins; the flat view spans the
/// written range with zero fill, matching the raw binary output convention.
struct Image {
    bytes: BTreeMap<u32, u8>,
}

impl Image {
    fn new() -> Self {
        Self {
            bytes: BTreeMap::new(),
        }
    }

    fn store(&mut self, addr: u32, value: u8) {
        self.bytes.insert(addr, value);
    }

    fn store_slice(&mut self, addr: u32, values: &[u8]) {
        for (ix, value) in values.iter().enumerate() {
            self.store(addr.wrapping_add(ix as u32), *value);
        }
    }

    fn store_value(&mut self, addr: u32, value: u64, num_bytes: u32, endianness: Endianness) {
        for ix in 0..num_bytes {
            let shift = match endianness {
                Endianness::Little => 8 * ix,
                Endianness::Big => 8 * (num_bytes - 1 - ix),
            };
            self.store(addr.wrapping_add(ix), (value >> shift) as u8);
        }
    }

    fn store_word(&mut self, addr: u32, word: u64, isa: &Isa) {
        self.store_value(addr, word, isa.instruction_bytes(), isa.endianness);
    }

    fn flatten(&self, default_origin: u32) -> (u32, Vec<u8>) {
        let Some((&first, _)) = self.bytes.iter().next() else {
            return (default_origin, Vec::new());
        };
        let (&last, _) = self.bytes.iter().next_back().unwrap_or((&first, &0));
        let mut out = vec![0u8; (last - first + 1) as usize];
        for (&addr, &value) in &self.bytes {
            out[(addr - first) as usize] = value;
        }
        (first, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::builtins;
    use serde_json::json;

    fn zx16() -> Isa {
        builtins::load("zx16").unwrap()
    }

    #[test]
    fn encodes_three_register_add() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble("ADD x1, x2, x3\n");
        assert!(result.success, "{:?}", result.errors);
        // opcode 0001 | rd 1 | rs1 2 | rs2 3, little endian.
        assert_eq!(result.machine_code, vec![0x23, 0x11]);
    }

    #[test]
    fn minimal_isa_add_scenario_places_fields_as_declared() {
        let doc = json!({
            "name": "Mini",
            "word_size": 16,
            "registers": { "general_purpose": ["x0","x1","x2","x3","x4","x5","x6","x7"] },
            "instructions": [{
                "mnemonic": "ADD",
                "syntax": "ADD rd, rs1, rs2",
                "encoding": { "fields": [
                    { "name": "opcode", "bits": "15:12", "value": "0101" },
                    { "name": "rd",  "bits": "11:9", "type": "register" },
                    { "name": "rs1", "bits": "8:6",  "type": "register" },
                    { "name": "rs2", "bits": "5:3",  "type": "register" },
                    { "name": "funct", "bits": "2:0", "value": "000" }
                ]}
            }]
        });
        let isa = Isa::from_document(&doc).unwrap();
        let result = Assembler::new(&isa).assemble("ADD x1, x2, x3\n");
        assert!(result.success, "{:?}", result.errors);
        let word = u16::from_le_bytes([result.machine_code[0], result.machine_code[1]]);
        assert_eq!(word >> 12, 0b0101);
        assert_eq!((word >> 9) & 0x7, 1);
        assert_eq!((word >> 6) & 0x7, 2);
        assert_eq!((word >> 3) & 0x7, 3);
        assert_eq!(word & 0x7, 0);
    }

    #[test]
    fn assembly_is_deterministic() {
        let isa = zx16();
        let source = "START: LI x1, 5\nADD x1, x1, x1\nJMP START\nTAB: .word 7\n";
        let a = Assembler::new(&isa).assemble(source);
        let b = Assembler::new(&isa).assemble(source);
        assert_eq!(a.machine_code, b.machine_code);
        let names_a: Vec<&str> = a.symbols.iter().map(|sym| sym.name.as_str()).collect();
        let names_b: Vec<&str> = b.symbols.iter().map(|sym| sym.name.as_str()).collect();
        assert_eq!(names_a, names_b);
    }

    #[test]
    fn immediate_overflow_warns_and_keeps_low_bits() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble("LI x1, 300\n");
        assert!(result.success, "warnings must not flip success");
        assert_eq!(result.errors.len(), 0);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message().contains("truncated"));
        // 300 & 0xFF == 44; word = 0110 | rd 1 | 0x2C.
        assert_eq!(result.machine_code, vec![0x2C, 0x61]);
    }

    #[test]
    fn unknown_mnemonic_is_collected_and_other_lines_still_emit() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble("FROB x1\nADD x1, x2, x3\n");
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message().contains("Unknown instruction"));
        // The bad line reserved its word; the good ADD still landed at 2.
        assert_eq!(result.origin, 2);
        assert_eq!(result.machine_code, vec![0x23, 0x11]);
    }

    #[test]
    fn duplicate_label_emits_no_bytes() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble("LOOP: NOP\nLOOP: HALT\n");
        assert!(!result.success);
        assert!(result.machine_code.is_empty());
        assert!(result.sections.is_empty());
        assert!(result
            .errors
            .iter()
            .any(|diag| diag.message().contains("Duplicate label")));
    }

    #[test]
    fn operand_count_mismatch_is_an_encoding_error() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble("ADD x1, x2\n");
        assert!(!result.success);
        assert!(result.errors[0].message().contains("expects 3 operand(s)"));
    }

    #[test]
    fn operand_type_mismatch_is_an_encoding_error() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble("ADD x1, x2, 7\n");
        assert!(!result.success);
        assert!(result.errors[0].message().contains("expected a register"));
    }

    #[test]
    fn word_directive_emits_per_declared_endianness() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble(".word 0x1234, 0x5678\n");
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.machine_code, vec![0x34, 0x12, 0x78, 0x56]);
    }

    #[test]
    fn org_gap_is_zero_filled_in_flat_image() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble(".byte 1\n.org 4\n.byte 2\n");
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.origin, 0);
        assert_eq!(result.machine_code, vec![1, 0, 0, 0, 2]);
    }

    #[test]
    fn ascii_directive_emits_string_bytes() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble(".ascii \"Hi\"\n");
        assert!(result.success);
        assert_eq!(result.machine_code, vec![b'H', b'i']);
    }

    #[test]
    fn sections_expose_the_text_image() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble("HALT\n");
        assert_eq!(result.sections.len(), 1);
        assert_eq!(result.sections[0].name, "text");
        assert_eq!(result.sections[0].base, result.origin);
        assert_eq!(result.sections[0].bytes, result.machine_code);
    }

    #[test]
    fn symbol_table_snapshot_carries_kinds() {
        let isa = zx16();
        let result = Assembler::new(&isa).assemble("RUN: HALT\nTAB: .word 9\n");
        assert!(result.success, "{:?}", result.errors);
        let run = result.symbols.lookup("RUN").unwrap();
        let tab = result.symbols.lookup("TAB").unwrap();
        assert_eq!(run.kind.as_str(), "code");
        assert_eq!(tab.kind.as_str(), "data");
        assert_eq!(tab.address, 2);
    }
}
