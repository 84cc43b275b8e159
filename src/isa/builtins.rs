// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Bundled example ISA definitions.
//!
//! The registry is an immutable table fixed at compile time; loading by name
//! goes through the same document loader and validation as inline documents,
//! so `load("zx16")` and `Isa::from_json(document("zx16"))` are identical.

use super::schema::SchemaError;
use super::Isa;

const ZX16: &str = r#"{
  "name": "ZX16",
  "version": "1.1",
  "description": "16-bit RISC-style teaching architecture with 16 registers",
  "word_size": 16,
  "instruction_size": 16,
  "endianness": "little",
  "address_space": { "size": 65536, "default_code_start": 0 },
  "syntax": { "comment_char": ";", "label_suffix": ":" },
  "registers": {
    "general_purpose": [
      { "name": "x0", "aliases": ["zero"] },
      "x1", "x2", "x3", "x4", "x5", "x6", "x7",
      "x8", "x9", "x10", "x11", "x12", "x13", "x14", "x15"
    ],
    "special": ["pc", "sp"]
  },
  "instructions": [
    {
      "mnemonic": "ADD",
      "description": "Add rs1 and rs2 into rd",
      "syntax": "ADD rd, rs1, rs2",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "0001" },
        { "name": "rd",  "bits": "11:8", "type": "register" },
        { "name": "rs1", "bits": "7:4",  "type": "register" },
        { "name": "rs2", "bits": "3:0",  "type": "register" }
      ]}
    },
    {
      "mnemonic": "SUB",
      "description": "Subtract rs2 from rs1 into rd",
      "syntax": "SUB rd, rs1, rs2",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "0010" },
        { "name": "rd",  "bits": "11:8", "type": "register" },
        { "name": "rs1", "bits": "7:4",  "type": "register" },
        { "name": "rs2", "bits": "3:0",  "type": "register" }
      ]}
    },
    {
      "mnemonic": "AND",
      "description": "Bitwise and",
      "syntax": "AND rd, rs1, rs2",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "0011" },
        { "name": "rd",  "bits": "11:8", "type": "register" },
        { "name": "rs1", "bits": "7:4",  "type": "register" },
        { "name": "rs2", "bits": "3:0",  "type": "register" }
      ]}
    },
    {
      "mnemonic": "OR",
      "description": "Bitwise or",
      "syntax": "OR rd, rs1, rs2",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "0100" },
        { "name": "rd",  "bits": "11:8", "type": "register" },
        { "name": "rs1", "bits": "7:4",  "type": "register" },
        { "name": "rs2", "bits": "3:0",  "type": "register" }
      ]}
    },
    {
      "mnemonic": "XOR",
      "description": "Bitwise exclusive or",
      "syntax": "XOR rd, rs1, rs2",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "0101" },
        { "name": "rd",  "bits": "11:8", "type": "register" },
        { "name": "rs1", "bits": "7:4",  "type": "register" },
        { "name": "rs2", "bits": "3:0",  "type": "register" }
      ]}
    },
    {
      "mnemonic": "LI",
      "description": "Load a signed 8-bit immediate into rd",
      "syntax": "LI rd, imm",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "0110" },
        { "name": "rd",  "bits": "11:8", "type": "register" },
        { "name": "imm", "bits": "7:0",  "type": "signed_immediate" }
      ]}
    },
    {
      "mnemonic": "LW",
      "description": "Load the word at an absolute 8-bit address",
      "syntax": "LW rd, addr",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "0111" },
        { "name": "rd",   "bits": "11:8", "type": "register" },
        { "name": "addr", "bits": "7:0",  "type": "address" }
      ]}
    },
    {
      "mnemonic": "SW",
      "description": "Store rd to an absolute 8-bit address",
      "syntax": "SW rd, addr",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "1000" },
        { "name": "rd",   "bits": "11:8", "type": "register" },
        { "name": "addr", "bits": "7:0",  "type": "address" }
      ]}
    },
    {
      "mnemonic": "BEQ",
      "description": "Branch by a signed word offset when rs1 equals rs2",
      "syntax": "BEQ rs1, rs2, offs",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "1001" },
        { "name": "rs1",  "bits": "11:8", "type": "register" },
        { "name": "rs2",  "bits": "7:4",  "type": "register" },
        { "name": "offs", "bits": "3:0",  "type": "offset" }
      ]}
    },
    {
      "mnemonic": "BNE",
      "description": "Branch by a signed word offset when rs1 differs from rs2",
      "syntax": "BNE rs1, rs2, offs",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "1010" },
        { "name": "rs1",  "bits": "11:8", "type": "register" },
        { "name": "rs2",  "bits": "7:4",  "type": "register" },
        { "name": "offs", "bits": "3:0",  "type": "offset" }
      ]}
    },
    {
      "mnemonic": "JMP",
      "description": "Jump to an absolute 12-bit address",
      "syntax": "JMP addr",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "1011" },
        { "name": "addr", "bits": "11:0", "type": "address" }
      ]}
    },
    {
      "mnemonic": "ECALL",
      "description": "Request environment service",
      "syntax": "ECALL svc",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "1110" },
        { "name": "svc", "bits": "11:0", "type": "immediate" }
      ]}
    },
    {
      "mnemonic": "HALT",
      "description": "Stop execution",
      "syntax": "HALT",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "1111" },
        { "name": "pad", "bits": "11:0", "value": "000000000000" }
      ]}
    }
  ],
  "directives": [
    { "name": ".org",   "description": "set the current assembly address" },
    { "name": ".word",  "description": "emit machine words" },
    { "name": ".byte",  "description": "emit raw bytes" },
    { "name": ".space", "description": "reserve zero-filled bytes" },
    { "name": ".ascii", "description": "emit string bytes" }
  ],
  "pseudo_instructions": [
    { "mnemonic": "NOP", "syntax": "NOP",
      "description": "No operation",
      "expansion": "ADD x0, x0, x0" },
    { "mnemonic": "MOV", "syntax": "MOV rd, rs",
      "description": "Copy rs into rd",
      "expansion": "ADD rd, rs, x0" },
    { "mnemonic": "CLR", "syntax": "CLR rd",
      "description": "Clear rd to zero",
      "expansion": "XOR rd, rd, rd" }
  ],
  "constants": { "SVC_EXIT": 0, "SVC_PRINT": 1 }
}"#;

const SIMPLE_RISC: &str = r#"{
  "name": "Simple RISC",
  "version": "1.0",
  "description": "Basic RISC-style instruction set with 8 registers",
  "word_size": 16,
  "endianness": "little",
  "instruction_size": 16,
  "registers": {
    "general_purpose": ["r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7"],
    "special": ["pc", "sp"]
  },
  "instructions": [
    {
      "mnemonic": "ADD",
      "description": "Add two registers",
      "syntax": "ADD rd, rs1, rs2",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "0000" },
        { "name": "rd",  "bits": "11:9", "type": "register" },
        { "name": "rs1", "bits": "8:6",  "type": "register" },
        { "name": "rs2", "bits": "5:3",  "type": "register" },
        { "name": "funct", "bits": "2:0", "value": "000" }
      ]}
    },
    {
      "mnemonic": "SUB",
      "description": "Subtract two registers",
      "syntax": "SUB rd, rs1, rs2",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "0001" },
        { "name": "rd",  "bits": "11:9", "type": "register" },
        { "name": "rs1", "bits": "8:6",  "type": "register" },
        { "name": "rs2", "bits": "5:3",  "type": "register" },
        { "name": "funct", "bits": "2:0", "value": "000" }
      ]}
    },
    {
      "mnemonic": "JMP",
      "description": "Jump to an absolute address",
      "syntax": "JMP addr",
      "encoding": { "fields": [
        { "name": "opcode", "bits": "15:12", "value": "0010" },
        { "name": "addr", "bits": "11:0", "type": "address" }
      ]}
    }
  ],
  "directives": [".org", ".word", ".byte"]
}"#;

const BUILTINS: &[(&str, &str)] = &[("zx16", ZX16), ("simple_risc", SIMPLE_RISC)];

/// Names of the bundled ISAs, in registry order.
pub fn names() -> Vec<&'static str> {
    BUILTINS.iter().map(|(name, _)| *name).collect()
}

/// The raw JSON document for a bundled ISA.
pub fn document(name: &str) -> Option<&'static str> {
    BUILTINS
        .iter()
        .find(|(builtin, _)| builtin.eq_ignore_ascii_case(name))
        .map(|(_, doc)| *doc)
}

/// Load a bundled ISA by name through the regular validation path.
pub fn load(name: &str) -> Result<Isa, SchemaError> {
    let Some(doc) = document(name) else {
        return Err(SchemaError::new(
            "name",
            format!(
                "unknown built-in ISA \"{name}\" (available: {})",
                names().join(", ")
            ),
        ));
    };
    Isa::from_json(doc)
}
