// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Decoder: machine code back to mnemonic/operand form.
//!
//! Words are matched against every declared encoding by checking literal
//! fields; when several encodings match, the one constraining the most bits
//! wins, with declaration order as the tie breaker. A word no encoding
//! matches produces one decode error and decoding continues at the next
//! word.

use crate::diag::{Diagnostic, ErrorKind};
use crate::isa::{FieldContent, InstructionDef, Isa, OperandKind};
use crate::parser::{self, Operand, Statement};

/// One decoded instruction record.
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    pub address: u32,
    pub raw: u64,
    pub hex: String,
    pub mnemonic: String,
    pub operands: Vec<String>,
    pub comment: Option<String>,
}

/// Result of one disassemble call.
#[derive(Debug)]
pub struct DisassembledResult {
    pub instructions: Vec<DecodedInstruction>,
    pub errors: Vec<Diagnostic>,
}

/// A decoded word before rendering: the matched definition and the raw
/// value of every operand field (sign-extended where the field is signed).
#[derive(Debug)]
pub struct DecodedWord<'a> {
    pub def: &'a InstructionDef,
    pub operands: Vec<(OperandKind, i64)>,
}

/// Decoder over one ISA.
pub struct Disassembler<'a> {
    isa: &'a Isa,
}

impl<'a> Disassembler<'a> {
    pub fn new(isa: &'a Isa) -> Self {
        Self { isa }
    }

    /// Disassemble a byte stream starting at the ISA's default code start.
    pub fn disassemble(&self, bytes: &[u8], reconstruct_pseudo: bool) -> DisassembledResult {
        self.disassemble_at(bytes, self.isa.address_space.default_code_start, reconstruct_pseudo)
    }

    /// Disassemble a byte stream whose first byte sits at `origin`.
    pub fn disassemble_at(
        &self,
        bytes: &[u8],
        origin: u32,
        reconstruct_pseudo: bool,
    ) -> DisassembledResult {
        let step = self.isa.instruction_bytes() as usize;
        let mut instructions = Vec::new();
        let mut errors = Vec::new();

        let mut offset = 0usize;
        let mut word_ix = 0u32;
        while offset < bytes.len() {
            word_ix += 1;
            let address = origin.wrapping_add(offset as u32);
            if offset + step > bytes.len() {
                errors.push(Diagnostic::error(
                    word_ix,
                    ErrorKind::Decode,
                    format!(
                        "Trailing {} byte(s) at {address:#06X} do not form a full instruction",
                        bytes.len() - offset
                    ),
                ));
                break;
            }
            let raw = self.read_word(&bytes[offset..offset + step]);
            match self.decode_word(raw) {
                Some(decoded) => {
                    instructions.push(DecodedInstruction {
                        address,
                        raw,
                        hex: self.format_hex(raw),
                        mnemonic: decoded.def.mnemonic.clone(),
                        operands: self.render_operands(&decoded),
                        comment: None,
                    });
                }
                None => {
                    errors.push(Diagnostic::error(
                        word_ix,
                        ErrorKind::Decode,
                        format!(
                            "No instruction encoding matches word {} at {address:#06X}",
                            self.format_hex(raw)
                        ),
                    ));
                }
            }
            offset += step;
        }

        if reconstruct_pseudo {
            instructions = self.reconstruct_pseudo(instructions);
        }

        DisassembledResult {
            instructions,
            errors,
        }
    }

    /// Decode a single word against every declared encoding. The most
    /// specific match (greatest number of literal bits) wins; declaration
    /// order breaks ties.
    pub fn decode_word(&self, word: u64) -> Option<DecodedWord<'a>> {
        let mut best: Option<&InstructionDef> = None;
        for def in &self.isa.instructions {
            if !self.matches(def, word) {
                continue;
            }
            let better = match best {
                Some(current) => def.literal_bits() > current.literal_bits(),
                None => true,
            };
            if better {
                best = Some(def);
            }
        }
        let def = best?;

        let mut operands = Vec::new();
        for name in def.syntax_operands() {
            let Some(field) = def.operand_field(name) else {
                continue;
            };
            let FieldContent::Operand(kind) = field.content else {
                continue;
            };
            let raw = (word >> field.lo) & (field.mask() >> field.lo);
            let value = if kind.is_signed() {
                sign_extend(raw, field.width())
            } else {
                raw as i64
            };
            operands.push((kind, value));
        }
        Some(DecodedWord { def, operands })
    }

    fn matches(&self, def: &InstructionDef, word: u64) -> bool {
        def.fields.iter().all(|field| match field.content {
            FieldContent::Literal(value) => (word & field.mask()) >> field.lo == value,
            FieldContent::Operand(_) => true,
        })
    }

    fn read_word(&self, bytes: &[u8]) -> u64 {
        let mut word = 0u64;
        match self.isa.endianness {
            crate::isa::Endianness::Little => {
                for (ix, byte) in bytes.iter().enumerate() {
                    word |= (*byte as u64) << (8 * ix);
                }
            }
            crate::isa::Endianness::Big => {
                for byte in bytes {
                    word = (word << 8) | *byte as u64;
                }
            }
        }
        word
    }

    fn format_hex(&self, word: u64) -> String {
        let digits = (self.isa.instruction_bytes() * 2) as usize;
        format!("{word:0digits$X}")
    }

    fn render_operands(&self, decoded: &DecodedWord<'_>) -> Vec<String> {
        decoded
            .operands
            .iter()
            .map(|(kind, value)| self.render_operand(*kind, *value))
            .collect()
    }

    fn render_operand(&self, kind: OperandKind, value: i64) -> String {
        match kind {
            OperandKind::Register => match self.isa.registers.get(value as usize) {
                Some(def) => format!("{}{}", self.isa.syntax.register_prefix, def.name),
                None => value.to_string(),
            },
            OperandKind::Address => format!("{:#X}", value),
            _ => value.to_string(),
        }
    }

    /// Collapse instruction runs matching a declared pseudo expansion back
    /// into the pseudo form. Templates bind their parameters on the first
    /// occurrence and must see the same operand text on every later one.
    fn reconstruct_pseudo(&self, instructions: Vec<DecodedInstruction>) -> Vec<DecodedInstruction> {
        let matchers = self.pseudo_matchers();
        if matchers.is_empty() {
            return instructions;
        }

        let mut out = Vec::with_capacity(instructions.len());
        let mut ix = 0;
        'outer: while ix < instructions.len() {
            for matcher in &matchers {
                if let Some(record) = matcher.try_match(&instructions[ix..], self.isa) {
                    ix += matcher.templates.len();
                    out.push(record);
                    continue 'outer;
                }
            }
            out.push(instructions[ix].clone());
            ix += 1;
        }
        out
    }

    fn pseudo_matchers(&self) -> Vec<PseudoMatcher> {
        let mut matchers = Vec::new();
        for pseudo in &self.isa.pseudo_instructions {
            let mut templates = Vec::new();
            for line in &pseudo.expansion {
                let (statements, diags) = parser::parse(line, self.isa);
                if !diags.is_empty() || statements.len() != 1 {
                    templates.clear();
                    break;
                }
                match statements.into_iter().next() {
                    Some(Statement::Instruction(ins)) => templates.push(ins),
                    _ => {
                        templates.clear();
                        break;
                    }
                }
            }
            if templates.is_empty() {
                continue;
            }
            matchers.push(PseudoMatcher {
                mnemonic: pseudo.mnemonic.clone(),
                params: pseudo.syntax_operands().iter().map(|s| s.to_string()).collect(),
                templates,
            });
        }
        matchers
    }

    /// Render an address-annotated listing, headed by the ISA identity the
    /// way the interactive disassembly view prints it.
    pub fn render_listing(&self, result: &DisassembledResult, binary_size: usize) -> String {
        let comment = self.isa.syntax.comment_char;
        let mut out = String::new();
        out.push_str(&format!(
            "{comment} Disassembly of {} v{}\n",
            self.isa.name, self.isa.version
        ));
        out.push_str(&format!("{comment} Binary size: {binary_size} bytes\n"));
        out.push_str(&format!("{comment} Word size: {} bits\n", self.isa.word_size));
        out.push_str(&format!(
            "{comment} Endianness: {}\n\n",
            self.isa.endianness.as_str()
        ));

        for ins in &result.instructions {
            let operands = ins.operands.join(", ");
            let mut line = format!("{:04X}: {:<6} {}", ins.address, ins.hex, ins.mnemonic);
            if !operands.is_empty() {
                line.push(' ');
                line.push_str(&operands);
            }
            if let Some(text) = &ins.comment {
                line.push_str(&format!("  {comment} {text}"));
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }

        for err in &result.errors {
            out.push_str(&format!("{comment} {}\n", err.message()));
        }
        out
    }
}

struct PseudoMatcher {
    mnemonic: String,
    params: Vec<String>,
    templates: Vec<crate::parser::InstructionNode>,
}

impl PseudoMatcher {
    fn try_match(&self, window: &[DecodedInstruction], isa: &Isa) -> Option<DecodedInstruction> {
        if window.len() < self.templates.len() {
            return None;
        }
        let mut bindings: Vec<(String, String)> = Vec::new();

        for (template, decoded) in self.templates.iter().zip(window) {
            if template.mnemonic != decoded.mnemonic
                || template.operands.len() != decoded.operands.len()
            {
                return None;
            }
            for (template_op, decoded_op) in template.operands.iter().zip(&decoded.operands) {
                match template_op {
                    Operand::Symbol(name) if self.params.contains(name) => {
                        match bindings.iter().find(|(param, _)| param == name) {
                            Some((_, bound)) if bound != decoded_op => return None,
                            Some(_) => {}
                            None => bindings.push((name.clone(), decoded_op.clone())),
                        }
                    }
                    other => {
                        if other.to_source(isa) != *decoded_op {
                            return None;
                        }
                    }
                }
            }
        }

        let first = &window[0];
        let hex = window[..self.templates.len()]
            .iter()
            .map(|ins| ins.hex.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let operands = self
            .params
            .iter()
            .map(|param| {
                bindings
                    .iter()
                    .find(|(name, _)| name == param)
                    .map(|(_, value)| value.clone())
                    .unwrap_or_default()
            })
            .collect();
        Some(DecodedInstruction {
            address: first.address,
            raw: first.raw,
            hex,
            mnemonic: self.mnemonic.clone(),
            operands,
            comment: None,
        })
    }
}

fn sign_extend(raw: u64, width: u32) -> i64 {
    if width == 0 || width >= 64 {
        return raw as i64;
    }
    let sign = 1u64 << (width - 1);
    if raw & sign != 0 {
        (raw | !((1u64 << width) - 1)) as i64
    } else {
        raw as i64
    }
}
