// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! ISA document loading and validation.
//!
//! Documents are plain `serde_json::Value` trees; the loader walks them by
//! hand so every failure can name the exact field path it tripped on. A
//! document either yields a fully validated [`Isa`] or a single fatal
//! [`SchemaError`]; there is no partially constructed model.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{
    AddressSpace, DirectiveDef, Endianness, FieldContent, FieldDef, InstructionDef, Isa,
    OperandKind, PseudoDef, RegisterClass, RegisterDef, RegisterFile, SyntaxConventions,
};
use crate::parser::{self, Statement};

const DEFAULT_ADDRESS_SPACE: u32 = 65536;
const MAX_INSTRUCTION_BITS: u32 = 64;

/// Fatal error in an ISA document, naming the offending field.
#[derive(Debug, Clone)]
pub struct SchemaError {
    pub path: String,
    pub reason: String,
}

impl SchemaError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

impl std::error::Error for SchemaError {}

/// Result of the document-level `validate` entry point.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Validate a document without keeping the model.
pub fn validate_document(doc: &Value) -> ValidationReport {
    match Isa::from_document(doc) {
        Ok(_) => ValidationReport {
            valid: true,
            errors: Vec::new(),
        },
        Err(err) => ValidationReport {
            valid: false,
            errors: vec![err.to_string()],
        },
    }
}

impl Isa {
    /// Build an ISA from a parsed JSON document.
    pub fn from_document(doc: &Value) -> Result<Isa, SchemaError> {
        let root = doc
            .as_object()
            .ok_or_else(|| SchemaError::new("$", "ISA document must be a JSON object"))?;

        let name = require_str(root, "name")?;
        let version = optional_str(root, "version")?.unwrap_or_else(|| "1.0".to_string());
        let description = optional_str(root, "description")?.unwrap_or_default();

        let word_size = require_bits(root, "word_size")?;
        let instruction_size = match root.get("instruction_size") {
            Some(_) => require_bits(root, "instruction_size")?,
            None => word_size,
        };

        let endianness = match optional_str(root, "endianness")?.as_deref() {
            None | Some("little") => Endianness::Little,
            Some("big") => Endianness::Big,
            Some(other) => {
                return Err(SchemaError::new(
                    "endianness",
                    format!("expected \"little\" or \"big\", found \"{other}\""),
                ))
            }
        };

        let address_space = parse_address_space(root)?;
        let syntax = parse_syntax(root)?;
        let registers = parse_registers(root)?;
        let instructions = parse_instructions(root, instruction_size)?;
        let directives = parse_directives(root)?;
        let pseudo_instructions = parse_pseudo_instructions(root, &instructions)?;
        let constants = parse_constants(root)?;

        let isa = Isa {
            name,
            version,
            description,
            word_size,
            instruction_size,
            endianness,
            address_space,
            syntax,
            registers,
            instructions,
            directives,
            pseudo_instructions,
            constants,
        };
        check_pseudo_expansions(&isa)?;
        Ok(isa)
    }

    /// Build an ISA from JSON text.
    pub fn from_json(text: &str) -> Result<Isa, SchemaError> {
        let doc: Value = serde_json::from_str(text)
            .map_err(|err| SchemaError::new("$", format!("invalid JSON: {err}")))?;
        Isa::from_document(&doc)
    }
}

fn require_str(root: &serde_json::Map<String, Value>, key: &str) -> Result<String, SchemaError> {
    match root.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(SchemaError::new(key, "must not be empty")),
        Some(_) => Err(SchemaError::new(key, "must be a string")),
        None => Err(SchemaError::new(key, "required field is missing")),
    }
}

fn optional_str(
    root: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<String>, SchemaError> {
    match root.get(key) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(SchemaError::new(key, "must be a string")),
        None => Ok(None),
    }
}

fn require_bits(root: &serde_json::Map<String, Value>, key: &str) -> Result<u32, SchemaError> {
    let value = root
        .get(key)
        .ok_or_else(|| SchemaError::new(key, "required field is missing"))?;
    let bits = value
        .as_u64()
        .ok_or_else(|| SchemaError::new(key, "must be a positive integer"))?;
    if bits == 0 || bits % 8 != 0 {
        return Err(SchemaError::new(key, "must be a positive multiple of 8"));
    }
    if bits > MAX_INSTRUCTION_BITS as u64 {
        return Err(SchemaError::new(
            key,
            format!("must be at most {MAX_INSTRUCTION_BITS} bits"),
        ));
    }
    Ok(bits as u32)
}

fn parse_address_space(
    root: &serde_json::Map<String, Value>,
) -> Result<AddressSpace, SchemaError> {
    let Some(value) = root.get("address_space") else {
        return Ok(AddressSpace {
            size: DEFAULT_ADDRESS_SPACE,
            default_code_start: 0,
        });
    };
    let obj = value
        .as_object()
        .ok_or_else(|| SchemaError::new("address_space", "must be an object"))?;
    let size = match obj.get("size") {
        Some(v) => v
            .as_u64()
            .filter(|size| *size > 0 && *size <= u32::MAX as u64)
            .ok_or_else(|| SchemaError::new("address_space.size", "must be a positive integer"))?
            as u32,
        None => DEFAULT_ADDRESS_SPACE,
    };
    let default_code_start = match obj.get("default_code_start") {
        Some(v) => v.as_u64().filter(|start| *start < size as u64).ok_or_else(|| {
            SchemaError::new(
                "address_space.default_code_start",
                "must be an address inside the address space",
            )
        })? as u32,
        None => 0,
    };
    Ok(AddressSpace {
        size,
        default_code_start,
    })
}

fn parse_syntax(root: &serde_json::Map<String, Value>) -> Result<SyntaxConventions, SchemaError> {
    let Some(value) = root.get("syntax") else {
        return Ok(SyntaxConventions::default());
    };
    let obj = value
        .as_object()
        .ok_or_else(|| SchemaError::new("syntax", "must be an object"))?;
    let mut syntax = SyntaxConventions::default();
    if let Some(comment) = obj.get("comment_char") {
        let text = comment
            .as_str()
            .filter(|s| s.chars().count() == 1)
            .ok_or_else(|| SchemaError::new("syntax.comment_char", "must be a single character"))?;
        syntax.comment_char = text.chars().next().unwrap_or(';');
    }
    if let Some(prefix) = obj.get("register_prefix") {
        syntax.register_prefix = prefix
            .as_str()
            .ok_or_else(|| SchemaError::new("syntax.register_prefix", "must be a string"))?
            .to_string();
    }
    if let Some(prefix) = obj.get("immediate_prefix") {
        syntax.immediate_prefix = prefix
            .as_str()
            .ok_or_else(|| SchemaError::new("syntax.immediate_prefix", "must be a string"))?
            .to_string();
    }
    if let Some(suffix) = obj.get("label_suffix") {
        let text = suffix
            .as_str()
            .filter(|s| s.chars().count() == 1)
            .ok_or_else(|| SchemaError::new("syntax.label_suffix", "must be a single character"))?;
        syntax.label_suffix = text.chars().next().unwrap_or(':');
    }
    Ok(syntax)
}

fn parse_registers(root: &serde_json::Map<String, Value>) -> Result<RegisterFile, SchemaError> {
    let value = root
        .get("registers")
        .ok_or_else(|| SchemaError::new("registers", "required field is missing"))?;
    let obj = value
        .as_object()
        .ok_or_else(|| SchemaError::new("registers", "must be an object"))?;

    let word_size = require_bits(root, "word_size")?;
    let mut file = RegisterFile::default();

    for (key, class) in [
        ("general_purpose", RegisterClass::GeneralPurpose),
        ("special", RegisterClass::Special),
    ] {
        let Some(list) = obj.get(key) else {
            continue;
        };
        let list = list
            .as_array()
            .ok_or_else(|| SchemaError::new(format!("registers.{key}"), "must be an array"))?;
        for (ix, entry) in list.iter().enumerate() {
            let path = format!("registers.{key}[{ix}]");
            let def = parse_register_entry(entry, &path, word_size, class)?;
            if let Err(dup) = file.push(def) {
                return Err(SchemaError::new(
                    path,
                    format!("register name \"{dup}\" is declared more than once"),
                ));
            }
        }
    }

    if file.general_purpose().next().is_none() {
        return Err(SchemaError::new(
            "registers.general_purpose",
            "at least one general purpose register is required",
        ));
    }
    Ok(file)
}

fn parse_register_entry(
    entry: &Value,
    path: &str,
    word_size: u32,
    class: RegisterClass,
) -> Result<RegisterDef, SchemaError> {
    match entry {
        Value::String(name) if !name.trim().is_empty() => Ok(RegisterDef {
            name: name.clone(),
            size: word_size,
            aliases: Vec::new(),
            class,
        }),
        Value::Object(obj) => {
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| SchemaError::new(format!("{path}.name"), "must be a string"))?
                .to_string();
            let size = match obj.get("size") {
                Some(v) => v.as_u64().filter(|size| *size > 0).ok_or_else(|| {
                    SchemaError::new(format!("{path}.size"), "must be a positive integer")
                })? as u32,
                None => word_size,
            };
            let aliases = match obj.get("aliases") {
                Some(Value::Array(list)) => {
                    let mut aliases = Vec::new();
                    for alias in list {
                        let alias = alias.as_str().ok_or_else(|| {
                            SchemaError::new(format!("{path}.aliases"), "must contain strings")
                        })?;
                        aliases.push(alias.to_string());
                    }
                    aliases
                }
                Some(_) => {
                    return Err(SchemaError::new(
                        format!("{path}.aliases"),
                        "must be an array of strings",
                    ))
                }
                None => Vec::new(),
            };
            Ok(RegisterDef {
                name,
                size,
                aliases,
                class,
            })
        }
        _ => Err(SchemaError::new(
            path,
            "must be a register name or an object with a \"name\" field",
        )),
    }
}

fn parse_instructions(
    root: &serde_json::Map<String, Value>,
    instruction_size: u32,
) -> Result<Vec<InstructionDef>, SchemaError> {
    let value = root
        .get("instructions")
        .ok_or_else(|| SchemaError::new("instructions", "required field is missing"))?;
    let list = value
        .as_array()
        .ok_or_else(|| SchemaError::new("instructions", "must be an array"))?;
    if list.is_empty() {
        return Err(SchemaError::new("instructions", "must not be empty"));
    }

    let mut instructions: Vec<InstructionDef> = Vec::with_capacity(list.len());
    for (ix, entry) in list.iter().enumerate() {
        let path = format!("instructions[{ix}]");
        let obj = entry
            .as_object()
            .ok_or_else(|| SchemaError::new(path.as_str(), "must be an object"))?;
        let mnemonic = obj
            .get("mnemonic")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SchemaError::new(format!("{path}.mnemonic"), "must be a string"))?
            .to_string();
        if instructions.iter().any(|def| def.mnemonic == mnemonic) {
            return Err(SchemaError::new(
                format!("{path}.mnemonic"),
                format!("mnemonic \"{mnemonic}\" is declared more than once"),
            ));
        }
        let description = obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let syntax_template = obj
            .get("syntax")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| mnemonic.clone());
        let fields = parse_encoding_fields(obj, &path, instruction_size)?;

        let def = InstructionDef {
            mnemonic,
            description,
            syntax: syntax_template,
            fields,
        };
        check_operands_named_in_syntax(&def, &path)?;
        instructions.push(def);
    }
    Ok(instructions)
}

fn parse_encoding_fields(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    instruction_size: u32,
) -> Result<Vec<FieldDef>, SchemaError> {
    let encoding = obj
        .get("encoding")
        .ok_or_else(|| SchemaError::new(format!("{path}.encoding"), "required field is missing"))?
        .as_object()
        .ok_or_else(|| SchemaError::new(format!("{path}.encoding"), "must be an object"))?;
    let list = encoding
        .get("fields")
        .ok_or_else(|| {
            SchemaError::new(format!("{path}.encoding.fields"), "required field is missing")
        })?
        .as_array()
        .ok_or_else(|| SchemaError::new(format!("{path}.encoding.fields"), "must be an array"))?;

    let mut fields = Vec::with_capacity(list.len());
    let mut coverage = vec![false; instruction_size as usize];

    for (ix, entry) in list.iter().enumerate() {
        let field_path = format!("{path}.encoding.fields[{ix}]");
        let obj = entry
            .as_object()
            .ok_or_else(|| SchemaError::new(field_path.as_str(), "must be an object"))?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SchemaError::new(format!("{field_path}.name"), "must be a string"))?
            .to_string();
        let bits = obj
            .get("bits")
            .ok_or_else(|| {
                SchemaError::new(format!("{field_path}.bits"), "required field is missing")
            })?;
        let (hi, lo) = parse_bit_range(bits, &format!("{field_path}.bits"))?;
        if hi >= instruction_size {
            return Err(SchemaError::new(
                format!("{field_path}.bits"),
                format!("bit {hi} is outside the {instruction_size}-bit instruction"),
            ));
        }

        for bit in lo..=hi {
            if coverage[bit as usize] {
                return Err(SchemaError::new(
                    format!("{field_path}.bits"),
                    format!("bit {bit} overlaps a previously declared field"),
                ));
            }
            coverage[bit as usize] = true;
        }

        let content = parse_field_content(obj, &field_path, hi - lo + 1)?;
        fields.push(FieldDef {
            name,
            hi,
            lo,
            content,
        });
    }

    if let Some(gap) = coverage.iter().position(|covered| !covered) {
        return Err(SchemaError::new(
            format!("{path}.encoding.fields"),
            format!("bit {gap} is not covered by any field"),
        ));
    }
    Ok(fields)
}

fn parse_bit_range(value: &Value, path: &str) -> Result<(u32, u32), SchemaError> {
    let text = value
        .as_str()
        .ok_or_else(|| SchemaError::new(path, "must be a string like \"15:12\""))?;
    let parse_one = |part: &str| -> Result<u32, SchemaError> {
        part.trim()
            .parse::<u32>()
            .map_err(|_| SchemaError::new(path, format!("\"{part}\" is not a bit position")))
    };
    let (hi, lo) = match text.split_once(':') {
        Some((hi, lo)) => (parse_one(hi)?, parse_one(lo)?),
        None => {
            let bit = parse_one(text)?;
            (bit, bit)
        }
    };
    if hi < lo {
        return Err(SchemaError::new(
            path,
            format!("range \"{text}\" must be high:low"),
        ));
    }
    Ok((hi, lo))
}

fn parse_field_content(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    width: u32,
) -> Result<FieldContent, SchemaError> {
    match (obj.get("value"), obj.get("type")) {
        (Some(_), Some(_)) => Err(SchemaError::new(
            path,
            "a field declares either \"value\" or \"type\", not both",
        )),
        (Some(value), None) => {
            let literal = parse_literal(value, &format!("{path}.value"))?;
            let max = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
            if literal > max {
                return Err(SchemaError::new(
                    format!("{path}.value"),
                    format!("literal {literal:#x} does not fit in {width} bits"),
                ));
            }
            Ok(FieldContent::Literal(literal))
        }
        (None, Some(kind)) => {
            let kind = kind
                .as_str()
                .ok_or_else(|| SchemaError::new(format!("{path}.type"), "must be a string"))?;
            let kind = match kind {
                "register" => OperandKind::Register,
                "immediate" => OperandKind::Immediate,
                "signed_immediate" => OperandKind::SignedImmediate,
                "address" => OperandKind::Address,
                "offset" => OperandKind::Offset,
                other => {
                    return Err(SchemaError::new(
                        format!("{path}.type"),
                        format!(
                            "unknown operand type \"{other}\" (expected register, immediate, \
                             signed_immediate, address or offset)"
                        ),
                    ))
                }
            };
            Ok(FieldContent::Operand(kind))
        }
        (None, None) => Err(SchemaError::new(
            path,
            "a field must declare a literal \"value\" or an operand \"type\"",
        )),
    }
}

fn parse_literal(value: &Value, path: &str) -> Result<u64, SchemaError> {
    match value {
        Value::String(text) => {
            let digits = text.trim();
            if digits.is_empty() || !digits.chars().all(|ch| ch == '0' || ch == '1') {
                return Err(SchemaError::new(
                    path,
                    format!("\"{text}\" is not a binary bit string"),
                ));
            }
            u64::from_str_radix(digits, 2)
                .map_err(|_| SchemaError::new(path, "bit string is too wide"))
        }
        Value::Number(num) => num
            .as_u64()
            .ok_or_else(|| SchemaError::new(path, "must be a non-negative integer")),
        _ => Err(SchemaError::new(
            path,
            "must be a binary bit string or an integer",
        )),
    }
}

fn check_operands_named_in_syntax(def: &InstructionDef, path: &str) -> Result<(), SchemaError> {
    let names = def.syntax_operands();
    for field in &def.fields {
        if matches!(field.content, FieldContent::Operand(_))
            && !names.contains(&field.name.as_str())
        {
            return Err(SchemaError::new(
                format!("{path}.syntax"),
                format!(
                    "operand field \"{}\" does not appear in syntax template \"{}\"",
                    field.name, def.syntax
                ),
            ));
        }
    }
    Ok(())
}

fn parse_directives(
    root: &serde_json::Map<String, Value>,
) -> Result<Vec<DirectiveDef>, SchemaError> {
    let Some(value) = root.get("directives") else {
        return Ok(Vec::new());
    };
    let list = value
        .as_array()
        .ok_or_else(|| SchemaError::new("directives", "must be an array"))?;
    let mut directives = Vec::with_capacity(list.len());
    for (ix, entry) in list.iter().enumerate() {
        let path = format!("directives[{ix}]");
        let (name, description) = match entry {
            Value::String(name) => (name.clone(), String::new()),
            Value::Object(obj) => {
                let name = obj
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SchemaError::new(format!("{path}.name"), "must be a string"))?
                    .to_string();
                let description = obj
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                (name, description)
            }
            _ => return Err(SchemaError::new(path, "must be a string or an object")),
        };
        if !name.starts_with('.') {
            return Err(SchemaError::new(path, "directive names start with '.'"));
        }
        directives.push(DirectiveDef { name, description });
    }
    Ok(directives)
}

fn parse_pseudo_instructions(
    root: &serde_json::Map<String, Value>,
    instructions: &[InstructionDef],
) -> Result<Vec<PseudoDef>, SchemaError> {
    let Some(value) = root.get("pseudo_instructions") else {
        return Ok(Vec::new());
    };
    let list = value
        .as_array()
        .ok_or_else(|| SchemaError::new("pseudo_instructions", "must be an array"))?;
    let mut pseudos: Vec<PseudoDef> = Vec::with_capacity(list.len());
    for (ix, entry) in list.iter().enumerate() {
        let path = format!("pseudo_instructions[{ix}]");
        let obj = entry
            .as_object()
            .ok_or_else(|| SchemaError::new(path.as_str(), "must be an object"))?;
        let mnemonic = obj
            .get("mnemonic")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SchemaError::new(format!("{path}.mnemonic"), "must be a string"))?
            .to_string();
        if instructions.iter().any(|def| def.mnemonic == mnemonic) {
            return Err(SchemaError::new(
                format!("{path}.mnemonic"),
                format!("\"{mnemonic}\" collides with a real instruction"),
            ));
        }
        if pseudos.iter().any(|def| def.mnemonic == mnemonic) {
            return Err(SchemaError::new(
                format!("{path}.mnemonic"),
                format!("pseudo-instruction \"{mnemonic}\" is declared more than once"),
            ));
        }
        let description = obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let syntax = obj
            .get("syntax")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| mnemonic.clone());
        let expansion = match obj.get("expansion") {
            Some(Value::String(line)) => vec![line.clone()],
            Some(Value::Array(lines)) => {
                let mut expansion = Vec::with_capacity(lines.len());
                for line in lines {
                    let line = line.as_str().ok_or_else(|| {
                        SchemaError::new(
                            format!("{path}.expansion"),
                            "must contain template strings",
                        )
                    })?;
                    expansion.push(line.to_string());
                }
                expansion
            }
            Some(_) => {
                return Err(SchemaError::new(
                    format!("{path}.expansion"),
                    "must be a template string or an array of template strings",
                ))
            }
            None => {
                return Err(SchemaError::new(
                    format!("{path}.expansion"),
                    "required field is missing",
                ))
            }
        };
        if expansion.is_empty() {
            return Err(SchemaError::new(
                format!("{path}.expansion"),
                "must contain at least one template line",
            ));
        }
        pseudos.push(PseudoDef {
            mnemonic,
            description,
            syntax,
            expansion,
        });
    }
    Ok(pseudos)
}

/// Expansion templates must parse under the ISA's own syntax conventions and
/// each line must name a real instruction, so a pseudo can never expand into
/// another pseudo or into something the encoder rejects on every use.
fn check_pseudo_expansions(isa: &Isa) -> Result<(), SchemaError> {
    for (ix, pseudo) in isa.pseudo_instructions.iter().enumerate() {
        for (line_ix, template) in pseudo.expansion.iter().enumerate() {
            let path = format!("pseudo_instructions[{ix}].expansion[{line_ix}]");
            let (statements, diagnostics) = parser::parse(template, isa);
            if let Some(diag) = diagnostics.first() {
                return Err(SchemaError::new(path, diag.message().to_string()));
            }
            match statements.as_slice() {
                [Statement::Instruction(ins)] => {
                    if isa.find_instruction(&ins.mnemonic).is_none() {
                        return Err(SchemaError::new(
                            path,
                            format!("\"{}\" is not a real instruction", ins.mnemonic),
                        ));
                    }
                }
                _ => {
                    return Err(SchemaError::new(
                        path,
                        "template must hold exactly one instruction",
                    ))
                }
            }
        }
    }
    Ok(())
}

fn parse_constants(
    root: &serde_json::Map<String, Value>,
) -> Result<BTreeMap<String, i64>, SchemaError> {
    let Some(value) = root.get("constants") else {
        return Ok(BTreeMap::new());
    };
    let obj = value
        .as_object()
        .ok_or_else(|| SchemaError::new("constants", "must be an object"))?;
    let mut constants = BTreeMap::new();
    for (name, value) in obj {
        let value = value.as_i64().ok_or_else(|| {
            SchemaError::new(format!("constants.{name}"), "must be an integer")
        })?;
        constants.insert(name.clone(), value);
    }
    Ok(constants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_doc() -> Value {
        json!({
            "name": "Mini",
            "word_size": 16,
            "instructions": [
                {
                    "mnemonic": "ADD",
                    "syntax": "ADD rd, rs1, rs2",
                    "encoding": { "fields": [
                        { "name": "opcode", "bits": "15:12", "value": "0000" },
                        { "name": "rd",  "bits": "11:9", "type": "register" },
                        { "name": "rs1", "bits": "8:6",  "type": "register" },
                        { "name": "rs2", "bits": "5:3",  "type": "register" },
                        { "name": "funct", "bits": "2:0", "value": "000" }
                    ]}
                }
            ],
            "registers": {
                "general_purpose": ["r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7"],
                "special": ["pc", "sp"]
            }
        })
    }

    #[test]
    fn loads_minimal_document() {
        let isa = Isa::from_document(&minimal_doc()).expect("minimal ISA should load");
        assert_eq!(isa.name, "Mini");
        assert_eq!(isa.word_size, 16);
        assert_eq!(isa.instruction_size, 16);
        assert_eq!(isa.endianness, Endianness::Little);
        assert_eq!(isa.registers.len(), 10);
        assert_eq!(isa.instructions.len(), 1);
        let add = &isa.instructions[0];
        assert_eq!(add.literal_bits(), 7);
        assert_eq!(add.syntax_operands(), vec!["rd", "rs1", "rs2"]);
    }

    #[test]
    fn rejects_missing_name() {
        let mut doc = minimal_doc();
        doc.as_object_mut().unwrap().remove("name");
        let err = Isa::from_document(&doc).unwrap_err();
        assert_eq!(err.path, "name");
    }

    #[test]
    fn rejects_word_size_not_multiple_of_eight() {
        let mut doc = minimal_doc();
        doc["word_size"] = json!(12);
        let err = Isa::from_document(&doc).unwrap_err();
        assert_eq!(err.path, "word_size");
    }

    #[test]
    fn rejects_overlapping_fields() {
        let mut doc = minimal_doc();
        doc["instructions"][0]["encoding"]["fields"][1]["bits"] = json!("12:9");
        let err = Isa::from_document(&doc).unwrap_err();
        assert!(err.path.contains("encoding.fields[1].bits"), "{err}");
        assert!(err.reason.contains("overlaps"), "{err}");
    }

    #[test]
    fn rejects_gaps_in_field_coverage() {
        let mut doc = minimal_doc();
        doc["instructions"][0]["encoding"]["fields"]
            .as_array_mut()
            .unwrap()
            .pop();
        let err = Isa::from_document(&doc).unwrap_err();
        assert!(err.reason.contains("not covered"), "{err}");
    }

    #[test]
    fn rejects_duplicate_register_names() {
        let mut doc = minimal_doc();
        doc["registers"]["general_purpose"][1] = json!("r0");
        let err = Isa::from_document(&doc).unwrap_err();
        assert!(err.reason.contains("more than once"), "{err}");
    }

    #[test]
    fn rejects_unknown_operand_type() {
        let mut doc = minimal_doc();
        doc["instructions"][0]["encoding"]["fields"][1] =
            json!({ "name": "rd", "bits": "11:9", "type": "flag" });
        let err = Isa::from_document(&doc).unwrap_err();
        assert!(err.reason.contains("unknown operand type"), "{err}");
    }

    #[test]
    fn rejects_literal_wider_than_field() {
        let mut doc = minimal_doc();
        doc["instructions"][0]["encoding"]["fields"][0]["value"] = json!("10000");
        let err = Isa::from_document(&doc).unwrap_err();
        assert!(err.reason.contains("does not fit"), "{err}");
    }

    #[test]
    fn rejects_operand_field_missing_from_syntax() {
        let mut doc = minimal_doc();
        doc["instructions"][0]["syntax"] = json!("ADD rd, rs1");
        let err = Isa::from_document(&doc).unwrap_err();
        assert!(err.reason.contains("does not appear in syntax"), "{err}");
    }

    #[test]
    fn rejects_pseudo_colliding_with_instruction() {
        let mut doc = minimal_doc();
        doc.as_object_mut().unwrap().insert(
            "pseudo_instructions".to_string(),
            json!([{ "mnemonic": "ADD", "syntax": "ADD", "expansion": "ADD r0, r0, r0" }]),
        );
        let err = Isa::from_document(&doc).unwrap_err();
        assert!(err.reason.contains("collides"), "{err}");
    }

    #[test]
    fn rejects_pseudo_expanding_to_unknown_instruction() {
        let mut doc = minimal_doc();
        doc.as_object_mut().unwrap().insert(
            "pseudo_instructions".to_string(),
            json!([{ "mnemonic": "NOP", "syntax": "NOP", "expansion": "XYZZY r0" }]),
        );
        let err = Isa::from_document(&doc).unwrap_err();
        assert_eq!(err.path, "pseudo_instructions[0].expansion[0]");
        assert!(err.reason.contains("not a real instruction"), "{err}");
    }

    #[test]
    fn rejects_pseudo_expanding_to_another_pseudo() {
        let mut doc = minimal_doc();
        doc.as_object_mut().unwrap().insert(
            "pseudo_instructions".to_string(),
            json!([
                { "mnemonic": "NOP", "syntax": "NOP", "expansion": "ADD r0, r0, r0" },
                { "mnemonic": "NOP2", "syntax": "NOP2", "expansion": "NOP" }
            ]),
        );
        let err = Isa::from_document(&doc).unwrap_err();
        assert!(err.path.contains("expansion"), "{err}");
    }

    #[test]
    fn accepts_pseudo_with_parameterized_expansion() {
        let mut doc = minimal_doc();
        doc.as_object_mut().unwrap().insert(
            "pseudo_instructions".to_string(),
            json!([{
                "mnemonic": "MOV", "syntax": "MOV rd, rs",
                "expansion": "ADD rd, rs, r0"
            }]),
        );
        assert!(Isa::from_document(&doc).is_ok());
    }

    #[test]
    fn accepts_numeric_literal_values() {
        let mut doc = minimal_doc();
        doc["instructions"][0]["encoding"]["fields"][0]["value"] = json!(0);
        assert!(Isa::from_document(&doc).is_ok());
    }

    #[test]
    fn single_bit_range_is_accepted() {
        let (hi, lo) = parse_bit_range(&json!("3"), "bits").unwrap();
        assert_eq!((hi, lo), (3, 3));
    }

    #[test]
    fn inverted_bit_range_is_rejected() {
        assert!(parse_bit_range(&json!("3:7"), "bits").is_err());
    }

    #[test]
    fn validate_document_reports_errors_as_strings() {
        let report = validate_document(&json!({ "name": "X" }));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("word_size"));
    }

    #[test]
    fn validate_document_accepts_minimal() {
        let report = validate_document(&minimal_doc());
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }
}
