// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for isaforge.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use isaforge::assembler::Assembler;
use isaforge::diag::Diagnostic;
use isaforge::disassembler::Disassembler;
use isaforge::executor;
use isaforge::isa::{builtins, schema, Isa};

#[derive(Parser, Debug)]
#[command(
    name = "isaforge",
    version,
    about = "ISA-driven assembler, disassembler and instruction-level simulator",
    long_about = "Define an instruction set as a JSON document, then assemble, \
disassemble and step-execute programs against it. Pass --isa a document path \
or a built-in name (see `isaforge validate --help`)."
)]
struct Cli {
    #[arg(
        long = "format",
        value_enum,
        global = true,
        default_value_t = OutputFormat::Text,
        long_help = "Select CLI output format. text is default; json emits machine-readable output."
    )]
    format: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate an ISA document.
    Validate {
        /// ISA document path, or a built-in name (zx16, simple_risc).
        isa: String,
    },
    /// Assemble a source file to machine code.
    Assemble {
        #[arg(long, value_name = "ISA")]
        isa: String,
        /// Assembly source file.
        source: PathBuf,
        /// Write the raw binary image to FILE.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Disassemble a binary image.
    Disassemble {
        #[arg(long, value_name = "ISA")]
        isa: String,
        /// Binary input file.
        binary: PathBuf,
        /// Treat the input file as hex text instead of raw bytes.
        #[arg(long)]
        hex: bool,
        /// Collapse expanded pseudo-instructions back to their mnemonics.
        #[arg(long)]
        reconstruct_pseudo: bool,
    },
    /// Assemble a source file and step-execute it.
    Simulate {
        #[arg(long, value_name = "ISA")]
        isa: String,
        /// Assembly source file.
        source: PathBuf,
        /// Maximum number of instructions to execute.
        #[arg(long, default_value_t = 16)]
        steps: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Validate { isa } => cmd_validate(isa, cli.format),
        Command::Assemble {
            isa,
            source,
            output,
        } => cmd_assemble(isa, source, output.as_deref(), cli.format),
        Command::Disassemble {
            isa,
            binary,
            hex,
            reconstruct_pseudo,
        } => cmd_disassemble(isa, binary, *hex, *reconstruct_pseudo, cli.format),
        Command::Simulate { isa, source, steps } => {
            cmd_simulate(isa, source, *steps, cli.format)
        }
    };
    match result {
        Ok(ok) => {
            if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(message) => {
            eprintln!("isaforge: {message}");
            ExitCode::FAILURE
        }
    }
}

/// Resolve `--isa`: an existing file path wins, otherwise the built-ins.
fn load_isa(spec: &str) -> Result<Isa, String> {
    let path = Path::new(spec);
    if path.exists() {
        let text =
            fs::read_to_string(path).map_err(|err| format!("cannot read {spec}: {err}"))?;
        Isa::from_json(&text).map_err(|err| format!("invalid ISA document {spec}: {err}"))
    } else {
        builtins::load(spec).map_err(|err| err.to_string())
    }
}

fn cmd_validate(spec: &str, format: OutputFormat) -> Result<bool, String> {
    let path = Path::new(spec);
    let report = if path.exists() {
        let text =
            fs::read_to_string(path).map_err(|err| format!("cannot read {spec}: {err}"))?;
        match serde_json::from_str(&text) {
            Ok(doc) => schema::validate_document(&doc),
            Err(err) => schema::ValidationReport {
                valid: false,
                errors: vec![format!("invalid JSON: {err}")],
            },
        }
    } else {
        match builtins::load(spec) {
            Ok(_) => schema::ValidationReport {
                valid: true,
                errors: Vec::new(),
            },
            Err(err) => schema::ValidationReport {
                valid: false,
                errors: vec![err.to_string()],
            },
        }
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                json!({ "valid": report.valid, "errors": report.errors })
            );
        }
        OutputFormat::Text => {
            if report.valid {
                println!("{spec}: valid");
            } else {
                for error in &report.errors {
                    println!("{spec}: error: {error}");
                }
            }
        }
    }
    Ok(report.valid)
}

fn cmd_assemble(
    spec: &str,
    source: &Path,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<bool, String> {
    let isa = load_isa(spec)?;
    let text = fs::read_to_string(source)
        .map_err(|err| format!("cannot read {}: {err}", source.display()))?;
    let result = Assembler::new(&isa).assemble(&text);

    if let Some(path) = output {
        fs::write(path, &result.machine_code)
            .map_err(|err| format!("cannot write {}: {err}", path.display()))?;
    }

    match format {
        OutputFormat::Json => {
            let symbols: serde_json::Map<String, serde_json::Value> = result
                .symbols
                .iter()
                .map(|sym| {
                    (
                        sym.name.clone(),
                        json!({ "address": sym.address, "kind": sym.kind.as_str() }),
                    )
                })
                .collect();
            println!(
                "{}",
                json!({
                    "machine_code": bytes_to_hex(&result.machine_code),
                    "origin": result.origin,
                    "success": result.success,
                    "symbols": symbols,
                    "errors": diagnostic_strings(&result.errors),
                    "warnings": diagnostic_strings(&result.warnings),
                })
            );
        }
        OutputFormat::Text => {
            for diag in result.warnings.iter().chain(&result.errors) {
                println!("{}", diag.format());
            }
            if result.success {
                println!(
                    "assembled {} byte(s) at {:#06X}",
                    result.machine_code.len(),
                    result.origin
                );
                if output.is_none() && !result.machine_code.is_empty() {
                    println!("{}", bytes_to_hex(&result.machine_code));
                }
                for sym in result.symbols.iter() {
                    println!("{:>8} = {:#06X} ({})", sym.name, sym.address, sym.kind.as_str());
                }
            }
        }
    }
    Ok(result.success)
}

fn cmd_disassemble(
    spec: &str,
    binary: &Path,
    hex: bool,
    reconstruct_pseudo: bool,
    format: OutputFormat,
) -> Result<bool, String> {
    let isa = load_isa(spec)?;
    let bytes = if hex {
        let text = fs::read_to_string(binary)
            .map_err(|err| format!("cannot read {}: {err}", binary.display()))?;
        hex_to_bytes(&text)?
    } else {
        fs::read(binary).map_err(|err| format!("cannot read {}: {err}", binary.display()))?
    };

    let disassembler = Disassembler::new(&isa);
    let result = disassembler.disassemble(&bytes, reconstruct_pseudo);

    match format {
        OutputFormat::Json => {
            let instructions: Vec<serde_json::Value> = result
                .instructions
                .iter()
                .map(|ins| {
                    json!({
                        "address": ins.address,
                        "hex": ins.hex,
                        "mnemonic": ins.mnemonic,
                        "operands": ins.operands,
                        "comment": ins.comment,
                    })
                })
                .collect();
            println!(
                "{}",
                json!({
                    "instructions": instructions,
                    "errors": diagnostic_strings(&result.errors),
                })
            );
        }
        OutputFormat::Text => {
            print!("{}", disassembler.render_listing(&result, bytes.len()));
        }
    }
    Ok(result.errors.is_empty())
}

fn cmd_simulate(
    spec: &str,
    source: &Path,
    steps: u32,
    format: OutputFormat,
) -> Result<bool, String> {
    let isa = load_isa(spec)?;
    let text = fs::read_to_string(source)
        .map_err(|err| format!("cannot read {}: {err}", source.display()))?;
    let outcome = match executor::simulate(&isa, &text, steps) {
        Ok(outcome) => outcome,
        Err(errors) => {
            for diag in &errors {
                eprintln!("{}", diag.format());
            }
            return Ok(false);
        }
    };

    match format {
        OutputFormat::Json => {
            let states: Vec<serde_json::Value> = outcome
                .states
                .iter()
                .map(|state| {
                    let registers: serde_json::Map<String, serde_json::Value> = state
                        .registers
                        .iter()
                        .map(|(name, value)| (name.clone(), json!(value)))
                        .collect();
                    json!({
                        "step": state.step,
                        "pc": state.pc,
                        "registers": registers,
                        "flags": {
                            "Z": state.flags.zero,
                            "N": state.flags.negative,
                            "C": state.flags.carry,
                            "V": state.flags.overflow,
                        },
                    })
                })
                .collect();
            let memory = outcome
                .states
                .last()
                .map(|state| bytes_to_hex(trim_trailing_zeros(&state.memory)))
                .unwrap_or_default();
            println!(
                "{}",
                json!({
                    "states": states,
                    "total_steps": outcome.states.len(),
                    "halted": outcome.halted,
                    "halt_reason": outcome.halt_reason.to_string(),
                    "memory": memory,
                })
            );
        }
        OutputFormat::Text => {
            for state in &outcome.states {
                let registers: Vec<String> = state
                    .registers
                    .iter()
                    .filter(|(_, value)| *value != 0)
                    .map(|(name, value)| format!("{name}={value:#X}"))
                    .collect();
                println!(
                    "step {:>3}  pc={:#06X}  Z={} N={} C={} V={}  {}",
                    state.step,
                    state.pc,
                    state.flags.zero as u8,
                    state.flags.negative as u8,
                    state.flags.carry as u8,
                    state.flags.overflow as u8,
                    registers.join(" ")
                );
            }
            println!(
                "halted: {} ({})",
                outcome.halted, outcome.halt_reason
            );
        }
    }
    Ok(true)
}

fn diagnostic_strings(diagnostics: &[Diagnostic]) -> Vec<String> {
    diagnostics.iter().map(Diagnostic::format).collect()
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn hex_to_bytes(text: &str) -> Result<Vec<u8>, String> {
    let cleaned: String = text.chars().filter(|ch| !ch.is_whitespace()).collect();
    if cleaned.len() % 2 != 0 {
        return Err("hex input has an odd number of digits".to_string());
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|ix| {
            u8::from_str_radix(&cleaned[ix..ix + 2], 16)
                .map_err(|_| format!("bad hex byte: {}", &cleaned[ix..ix + 2]))
        })
        .collect()
}

fn trim_trailing_zeros(memory: &[u8]) -> &[u8] {
    let end = memory
        .iter()
        .rposition(|byte| *byte != 0)
        .map(|ix| ix + 1)
        .unwrap_or(0);
    &memory[..end]
}
