// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use msp430sim_config::{AccessWidth, RunAssertion, RunScript, StopReason};
use msp430sim_core::cpu::StatusFlags;
use msp430sim_core::memory::ProgramImage;
use msp430sim_core::metrics::PerformanceMetrics;
use msp430sim_core::peripherals::Port1Monitor;
use msp430sim_core::snapshot::MachineSnapshot;
use msp430sim_core::{DebugControl, Machine, Memory, Msp430, SimulationConfig, SimulationError};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";
const PORT1_HOOK: &str = "port1";

fn parse_addr(s: &str) -> Result<u16, String> {
    msp430sim_config::parse_address(s).map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "MSP430 instruction set simulator",
    long_about = None,
    subcommand_negates_reqs = true
)]
struct Cli {
    /// Path to the firmware ELF file
    #[arg(short, long)]
    firmware: Option<PathBuf>,

    /// Load the firmware as a flat binary at this address instead of ELF
    #[arg(long, value_parser = parse_addr)]
    raw_base: Option<u16>,

    /// Write a machine snapshot (JSON) when the run ends.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Breakpoint PC address (repeatable). Stops simulation when PC matches.
    #[arg(long, value_parser = parse_addr)]
    breakpoint: Vec<u16>,

    /// Enable instruction-level execution tracing
    #[arg(short, long, global = true)]
    trace: bool,

    /// Maximum number of steps to execute
    #[arg(long, default_value = "20000")]
    max_steps: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deterministic, CI-friendly runner mode driven by a run script (YAML).
    Test(TestArgs),

    /// Print a listing without executing anything.
    Disasm(DisasmArgs),

    /// Print the register file, optionally after a number of steps.
    Regs(RegsArgs),
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the firmware (overrides inputs.firmware)
    #[arg(short = 'f', long)]
    firmware: Option<PathBuf>,

    /// Path to the run script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Override max steps (takes precedence over script)
    #[arg(long)]
    max_steps: Option<u64>,

    /// Additional breakpoint PC address (repeatable)
    #[arg(long, value_parser = parse_addr)]
    breakpoint: Vec<u16>,

    /// Write result.json to this path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct DisasmArgs {
    #[arg(short, long)]
    firmware: PathBuf,

    #[arg(long, value_parser = parse_addr)]
    raw_base: Option<u16>,

    /// First address to decode (default: reset vector)
    #[arg(long, value_parser = parse_addr)]
    start: Option<u16>,

    /// Number of instructions to decode
    #[arg(long, default_value = "16")]
    count: usize,
}

#[derive(Parser, Debug)]
struct RegsArgs {
    #[arg(short, long)]
    firmware: PathBuf,

    #[arg(long, value_parser = parse_addr)]
    raw_base: Option<u16>,

    /// Steps to execute before dumping
    #[arg(long, default_value = "0")]
    steps: u64,
}

#[derive(Debug, Serialize)]
struct AssertionResult {
    assertion: RunAssertion,
    passed: bool,
}

#[derive(Debug, Serialize)]
struct TestResult {
    result_schema_version: String,
    status: String,
    steps_executed: u64,
    instructions: u64,
    stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    assertions: Vec<AssertionResult>,
    firmware_hash: String,
    machine: Option<MachineSnapshot>,
}

#[derive(Debug, Serialize)]
struct RunSnapshot {
    snapshot_schema_version: String,
    stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    firmware_hash: String,
    machine: MachineSnapshot,
    port1: Option<Port1Monitor>,
}

#[derive(Debug, Clone, PartialEq)]
struct RunOutcome {
    stop_reason: StopReason,
    steps_executed: u64,
    message: Option<String>,
    faulted: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Some(Commands::Test(args)) => run_test(args),
        Some(Commands::Disasm(args)) => run_disasm(args),
        Some(Commands::Regs(args)) => run_regs(args, cli.trace),
        None => run_interactive(cli),
    }
}

fn load_image(firmware: &Path, raw_base: Option<u16>) -> anyhow::Result<ProgramImage> {
    info!("Loading firmware: {:?}", firmware);
    match raw_base {
        Some(base) => msp430sim_loader::load_raw(firmware, base),
        None => msp430sim_loader::load_elf(firmware),
    }
}

fn build_machine(image: &ProgramImage, trace: bool) -> anyhow::Result<Machine<Msp430>> {
    let config = SimulationConfig {
        trace_disassembly: trace,
        ..SimulationConfig::default()
    };
    let mut bus = Memory::new();
    bus.attach_hook(PORT1_HOOK, Port1Monitor::range(), Box::new(Port1Monitor::new()));

    let mut machine = Machine::new(Msp430::with_config(config), bus);
    machine.load_firmware(image)?;
    Ok(machine)
}

fn firmware_hash(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        }
        Err(e) => {
            error!("Failed to read firmware for hash {:?}: {}", path, e);
            String::new()
        }
    }
}

fn stop_reason_for_error(e: &SimulationError) -> StopReason {
    match e {
        SimulationError::UndefinedOpcode { .. } => StopReason::UndefinedOpcode,
        SimulationError::UnimplementedOpcode { .. } => StopReason::UnimplementedOpcode,
        SimulationError::AlignmentFault { .. } => StopReason::AlignmentFault,
        SimulationError::PeripheralFetchFault { .. } => StopReason::PeripheralFetchFault,
    }
}

/// Step until a limit, breakpoint or fault. A breakpoint at the starting PC
/// does not stop the run before the first step.
fn run_simulation_loop(
    machine: &mut Machine<Msp430>,
    max_steps: u64,
    breakpoints: &[u16],
    no_progress_steps: Option<u64>,
) -> RunOutcome {
    let mut prev_pc = machine.get_pc();
    let mut stuck_counter: u64 = 0;

    for step in 0..max_steps {
        let pc = machine.get_pc();
        if step > 0 && breakpoints.contains(&pc) {
            info!("Breakpoint hit at PC={:#06x} (step={})", pc, step);
            return RunOutcome {
                stop_reason: StopReason::Breakpoint,
                steps_executed: step,
                message: None,
                faulted: false,
            };
        }

        if let Err(e) = machine.step() {
            error!("Simulation error at step {}: {}", step, e);
            return RunOutcome {
                stop_reason: stop_reason_for_error(&e),
                steps_executed: step,
                message: Some(e.to_string()),
                faulted: true,
            };
        }

        if let Some(limit) = no_progress_steps {
            let current_pc = machine.get_pc();
            if current_pc == prev_pc {
                stuck_counter += 1;
                if stuck_counter >= limit {
                    warn!(
                        "No progress (PC stuck at {:#06x}) for {} steps",
                        current_pc, limit
                    );
                    return RunOutcome {
                        stop_reason: StopReason::NoProgress,
                        steps_executed: step + 1,
                        message: None,
                        faulted: false,
                    };
                }
            } else {
                stuck_counter = 0;
                prev_pc = current_pc;
            }
        }
    }

    RunOutcome {
        stop_reason: StopReason::MaxSteps,
        steps_executed: max_steps,
        message: None,
        faulted: false,
    }
}

fn format_flags(sr: u16) -> String {
    let flags = StatusFlags::from_bits_retain(sr);
    [
        (StatusFlags::OVERFLOW, 'V'),
        (StatusFlags::NEGATIVE, 'N'),
        (StatusFlags::ZERO, 'Z'),
        (StatusFlags::CARRY, 'C'),
    ]
    .iter()
    .map(|(flag, c)| if flags.contains(*flag) { *c } else { '-' })
    .collect()
}

/// One line per register, annotated with its architectural role.
fn format_register_dump(machine: &Machine<Msp430>) -> Vec<String> {
    let names = machine.get_register_names();
    let mut lines = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let value = machine.read_core_reg(index as u8);
        let label = format!("R{}", index);
        let mut line = if *name == label {
            format!("{:<4}       = {:#06x}", label, value)
        } else {
            format!("{:<4} ({:<3}) = {:#06x}", label, name, value)
        };
        if index == 2 {
            line.push_str(&format!("  [{}]", format_flags(value)));
        }
        lines.push(line);
    }
    lines
}

fn report_metrics(machine: &Machine<Msp430>, metrics: &PerformanceMetrics) {
    info!("Simulation loop finished.");
    info!("Final PC: {:#06x}", machine.get_pc());
    info!("Total Instructions: {}", metrics.get_instructions());
    info!("Average IPS: {:.2}", metrics.get_ips());
    for (opcode, count) in metrics.opcode_histogram() {
        info!("  {:<5} {}", opcode, count);
    }
}

fn evaluate_assertion(
    assertion: &RunAssertion,
    machine: &Machine<Msp430>,
    stop_reason: StopReason,
) -> bool {
    match assertion {
        RunAssertion::ExpectedStopReason(a) => a.expected_stop_reason == stop_reason,
        RunAssertion::RegisterValue(a) => {
            let r = &a.register_value;
            machine.read_core_reg(r.register) == r.expected_value
        }
        RunAssertion::MemoryValue(a) => {
            let m = &a.memory_value;
            match m.width {
                AccessWidth::Byte => machine.read_byte(m.address) as u16 == m.expected_value,
                AccessWidth::Word => machine.read_word(m.address) == Ok(m.expected_value),
            }
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!("Failed to create parent dir {:?}: {}", parent, e);
            return;
        }
    }
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                error!("Failed to write {:?}: {}", path, e);
            }
        }
        Err(e) => error!("Failed to serialize {:?}: {}", path, e),
    }
}

fn run_interactive(cli: Cli) -> ExitCode {
    info!("Starting MSP430 simulator");

    let Some(firmware) = &cli.firmware else {
        error!("Missing required --firmware argument");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    };

    let mut machine = match load_image(firmware, cli.raw_base)
        .and_then(|image| build_machine(&image, cli.trace))
    {
        Ok(machine) => machine,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let metrics = Arc::new(PerformanceMetrics::new());
    machine.observers.push(metrics.clone());

    info!("Running for up to {} steps...", cli.max_steps);
    let outcome = run_simulation_loop(&mut machine, cli.max_steps, &cli.breakpoint, None);
    machine.stop();

    report_metrics(&machine, &metrics);
    for line in format_register_dump(&machine) {
        info!("{}", line);
    }

    if let Some(path) = &cli.snapshot {
        let snapshot = RunSnapshot {
            snapshot_schema_version: RESULT_SCHEMA_VERSION.to_string(),
            stop_reason: outcome.stop_reason,
            message: outcome.message.clone(),
            firmware_hash: firmware_hash(firmware),
            machine: machine.snapshot(),
            port1: machine.peek_hook::<Port1Monitor>(PORT1_HOOK).cloned(),
        };
        write_json(path, &snapshot);
        info!("Snapshot written to {:?}", path);
    }

    if outcome.faulted {
        ExitCode::from(EXIT_RUNTIME_ERROR)
    } else {
        ExitCode::from(EXIT_PASS)
    }
}

fn run_disasm(args: DisasmArgs) -> ExitCode {
    let image = match load_image(&args.firmware, args.raw_base) {
        Ok(image) => image,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let machine = match build_machine(&image, false) {
        Ok(machine) => machine,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let symbols = if args.raw_base.is_none() {
        msp430sim_loader::load_symbols(&args.firmware).unwrap_or_default()
    } else {
        Default::default()
    };

    let mut addr = args.start.unwrap_or_else(|| machine.get_pc());
    for _ in 0..args.count {
        if let Some(label) = symbols.label_at(addr) {
            println!("{}:", label);
        }
        match machine.disassemble(addr) {
            Ok(dis) => {
                println!("  {}", dis);
                addr = dis.next_address();
            }
            Err(e) => {
                let word = machine.read_word(addr & !1).unwrap_or(0);
                println!("  {:#06x}: {:04x}            .word {:#06x} ; {}", addr, word, word, e);
                addr = addr.wrapping_add(2) & !1;
            }
        }
    }
    ExitCode::from(EXIT_PASS)
}

fn run_regs(args: RegsArgs, trace: bool) -> ExitCode {
    let mut machine = match load_image(&args.firmware, args.raw_base)
        .and_then(|image| build_machine(&image, trace))
    {
        Ok(machine) => machine,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let outcome = if args.steps > 0 {
        Some(run_simulation_loop(&mut machine, args.steps, &[], None))
    } else {
        None
    };

    println!("Reset vector: {:#06x}", machine.reset_vector().unwrap_or(0));
    println!("Steps: {}", machine.get_step_count());
    for line in format_register_dump(&machine) {
        println!("{}", line);
    }

    match outcome {
        Some(o) if o.faulted => {
            println!("Stopped: {}", o.message.unwrap_or_default());
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
        _ => ExitCode::from(EXIT_PASS),
    }
}

fn resolve_script_path(script_path: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        return p;
    }
    script_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(p)
}

fn config_error(args: &TestArgs, message: String) -> ExitCode {
    error!("{}", message);
    if let Some(path) = &args.output {
        let result = TestResult {
            result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
            status: "error".to_string(),
            steps_executed: 0,
            instructions: 0,
            stop_reason: StopReason::ConfigError,
            message: Some(message),
            assertions: Vec::new(),
            firmware_hash: String::new(),
            machine: None,
        };
        write_json(path, &result);
    }
    ExitCode::from(EXIT_CONFIG_ERROR)
}

fn run_test(args: TestArgs) -> ExitCode {
    let script = match RunScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => return config_error(&args, format!("{:#}", e)),
    };

    let firmware_path = args
        .firmware
        .clone()
        .unwrap_or_else(|| resolve_script_path(&args.script, &script.inputs.firmware));

    let mut breakpoints = match script.breakpoint_addresses() {
        Ok(b) => b,
        Err(e) => return config_error(&args, format!("{:#}", e)),
    };
    breakpoints.extend(&args.breakpoint);

    let raw_base = match script.raw_base() {
        Ok(b) => b,
        Err(e) => return config_error(&args, format!("{:#}", e)),
    };

    let mut machine = match load_image(&firmware_path, raw_base)
        .and_then(|image| build_machine(&image, false))
    {
        Ok(machine) => machine,
        Err(e) => return config_error(&args, format!("{:#}", e)),
    };

    let metrics = Arc::new(PerformanceMetrics::new());
    machine.observers.push(metrics.clone());

    let max_steps = args.max_steps.unwrap_or(script.limits.max_steps);
    let outcome = run_simulation_loop(
        &mut machine,
        max_steps,
        &breakpoints,
        script.limits.no_progress_steps,
    );
    machine.stop();

    let mut assertion_results = Vec::new();
    let mut all_passed = true;
    let mut expected_stop_reason_matched = false;

    for assertion in &script.assertions {
        let passed = evaluate_assertion(assertion, &machine, outcome.stop_reason);
        if matches!(assertion, RunAssertion::ExpectedStopReason(_)) && passed {
            expected_stop_reason_matched = true;
        }
        if !passed {
            all_passed = false;
            error!("Assertion failed: {:?}", assertion);
        }
        assertion_results.push(AssertionResult {
            assertion: assertion.clone(),
            passed,
        });
    }

    // A stall is only a pass when the script asked for it
    let unexpected_stall =
        outcome.stop_reason == StopReason::NoProgress && !expected_stop_reason_matched;

    let (status, code) = if !all_passed || unexpected_stall {
        ("fail", EXIT_ASSERT_FAIL)
    } else if outcome.faulted && !expected_stop_reason_matched {
        ("error", EXIT_RUNTIME_ERROR)
    } else {
        ("pass", EXIT_PASS)
    };

    info!(
        "Test {}: {:?} after {} steps",
        status, outcome.stop_reason, outcome.steps_executed
    );

    if let Some(path) = &args.output {
        let result = TestResult {
            result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
            status: status.to_string(),
            steps_executed: outcome.steps_executed,
            instructions: metrics.get_instructions(),
            stop_reason: outcome.stop_reason,
            message: outcome.message.clone(),
            assertions: assertion_results,
            firmware_hash: firmware_hash(&firmware_path),
            machine: Some(machine.snapshot()),
        };
        write_json(path, &result);
    }

    ExitCode::from(code)
}
