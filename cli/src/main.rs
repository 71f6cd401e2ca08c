//! `ct10` — the headless CT-10 driver.
//!
//! Loads a program text file (or the built-in acceptance program), runs the
//! machine one microstep at a time until it halts or the step budget runs
//! out, then checks expectations. One-line `PASS:`/`FAIL:` verdicts go to
//! stdout; exit codes are 0 pass, 1 wrong result, 2 no halt, 3 argument or
//! file error.

mod golden;
mod program;
mod tape;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};

use comtran_core::engine;
use comtran_core::io::IoState;
use comtran_core::machine::MachineState;
use comtran_core::timing::ClockPhase;

use program::ProgramSpec;

const DEFAULT_MAX_STEPS: u32 = 200_000;
const MAX_STEP_LIMIT: u32 = 10_000_000;

/// The panel I/O mode selected on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum IoModeArg {
    /// Re-transmit mode (panel mode 3).
    Rexmt,
    /// I/O off (panel mode 0).
    Off,
    /// Octal display, treated as off (panel mode 0).
    Octal,
    /// Hex display (panel mode 1).
    Hex,
    /// Alphanumeric display (panel mode 2).
    Alpha,
}

impl IoModeArg {
    fn panel_value(self) -> u8 {
        match self {
            Self::Rexmt => 3,
            Self::Off | Self::Octal => 0,
            Self::Hex => 1,
            Self::Alpha => 2,
        }
    }
}

/// Headless driver for the CT-10 emulator.
#[derive(Debug, Parser)]
#[command(name = "ct10", version, about)]
struct Args {
    /// Program text file; a bare number is treated as the step budget.
    program: Option<String>,
    /// Step budget, positionally.
    steps: Option<String>,
    /// Load this file onto the paper-tape input channel.
    #[arg(long)]
    tape: Option<PathBuf>,
    /// Treat the tape file as raw text.
    #[arg(long)]
    tape_alpha: bool,
    /// Treat the tape file as hex bytes.
    #[arg(long)]
    tape_hex: bool,
    /// Load this file onto the terminal input channel.
    #[arg(long)]
    terminal_in: Option<PathBuf>,
    /// Treat the terminal input as raw text.
    #[arg(long)]
    terminal_alpha: bool,
    /// Treat the terminal input as hex bytes.
    #[arg(long)]
    terminal_hex: bool,
    /// Step budget (clamped to 10,000,000).
    #[arg(long)]
    max_steps: Option<u32>,
    /// Compare the terminal output against this hex file after the run.
    #[arg(long)]
    expect_term: Option<PathBuf>,
    /// Compare the printer output against this hex file after the run.
    #[arg(long)]
    expect_printer: Option<PathBuf>,
    /// Write the tape output channel here after the run (hex or alpha per
    /// the display mode).
    #[arg(long)]
    save_tape: Option<PathBuf>,
    /// Write the raw terminal output bytes here after the run.
    #[arg(long)]
    save_term: Option<PathBuf>,
    /// Write the printer output here after the run, as sanitized text.
    #[arg(long)]
    save_printer: Option<PathBuf>,
    /// Panel I/O mode.
    #[arg(long, value_enum)]
    io_mode: Option<IoModeArg>,
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
            {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(3)
            };
            let _ = err.print();
            return code;
        }
    };

    match drive(&args) {
        Ok(code) => code,
        Err(err) => {
            println!("FAIL: {err:#}");
            ExitCode::from(3)
        }
    }
}

/// One host clock step.
///
/// The halt latch is released for the duration of the step and restored if
/// the step itself did not halt, so a machine parked by a manual transfer
/// still services the panel.
fn step_clock(state: &mut MachineState) {
    let was_halted = state.mode.halted;
    state.mode.halted = false;
    engine::step(state);
    if !state.mode.halted {
        state.mode.halted = was_halted;
    }
    state.timing.advance();
}

fn phase_name(phase: ClockPhase) -> &'static str {
    match phase {
        ClockPhase::Cp1 => "CP1",
        ClockPhase::Cp2 => "CP2",
        ClockPhase::Cp3 => "CP3",
    }
}

#[allow(clippy::too_many_lines)]
fn drive(args: &Args) -> anyhow::Result<ExitCode> {
    let mut state = MachineState::new();

    let mut max_steps = DEFAULT_MAX_STEPS;
    let mut max_steps_set = false;
    if let Some(value) = args.max_steps {
        anyhow::ensure!(value > 0, "invalid --max-steps value");
        max_steps = value.min(MAX_STEP_LIMIT);
        max_steps_set = true;
    }

    // A bare numeric positional is a step budget, wherever it lands.
    let mut program_path: Option<PathBuf> = None;
    for token in [&args.program, &args.steps].into_iter().flatten() {
        if let Ok(value) = token.parse::<i64>() {
            if !max_steps_set && value > 0 {
                max_steps = value.min(i64::from(MAX_STEP_LIMIT)) as u32;
                max_steps_set = true;
            }
            continue;
        }
        if program_path.is_none() {
            program_path = Some(PathBuf::from(token));
        }
    }

    let mut program_spec: Option<ProgramSpec> = None;
    if let Some(path) = &program_path {
        state.reset();
        state.memory.clear();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to open program file {}", path.display()))?;
        let (spec, result) = program::parse_program(&text);
        anyhow::ensure!(!spec.writes.is_empty(), "no bytes parsed from program file");
        if result.skipped > 0 {
            log::warn!(
                "{} tokens skipped while parsing {}",
                result.skipped,
                path.display()
            );
        }
        for write in &spec.writes {
            state.memory.write(write.address, write.value);
        }
        let entry = if spec.has_entry { spec.entry } else { 0x000 };
        state.regs.set_par(entry);
        log::info!(
            "loaded {} bytes, entry {entry:#05X}",
            spec.writes.len()
        );
        program_spec = Some(spec);
    } else {
        golden::load(&mut state);
    }

    let terminal_alpha = args.terminal_alpha || !args.terminal_hex;

    let mut io_mode = state.panel_input.io_mode;
    if let Some(mode) = args.io_mode {
        io_mode = mode.panel_value();
    } else if args.tape_alpha {
        io_mode = 3;
    } else if args.tape_hex {
        io_mode = 2;
    } else if args.terminal_in.is_some() {
        io_mode = if terminal_alpha { 3 } else { 2 };
    }
    state.panel_input.io_mode = io_mode;

    if let Some(path) = &args.tape {
        state.io.alpha_mode = args.tape_alpha;
        state.io.hex_mode = args.tape_hex || !args.tape_alpha;
        let result = tape::load_tape(path, &mut state.io).context("tape load failed")?;
        if result.skipped > 0 {
            log::warn!("tape loaded with {} skipped tokens", result.skipped);
        }
        log::info!("{} tape bytes queued", state.io.input_data.len());
    }

    if let Some(path) = &args.terminal_in {
        let mut staged = IoState::new();
        staged.alpha_mode = terminal_alpha;
        staged.hex_mode = args.terminal_hex || !terminal_alpha;
        tape::load_tape(path, &mut staged).context("terminal input load failed")?;
        state.io.terminal_input = staged.input_data;
        state.io.terminal_input_pos = 0;
        state.io.interrupt = false;
    }

    state.timing.reset();

    let mut steps_taken: u32 = 0;
    for _ in 0..max_steps {
        step_clock(&mut state);
        steps_taken += 1;
        if state.mode.halted {
            break;
        }
    }

    if !state.mode.halted {
        println!("FAIL: did not halt within {max_steps} clock steps.");
        println!(
            "State: PAR={:#05X} OP={:#04X} MAR={:#05X} D={} {} {}",
            state.regs.par.value(),
            state.regs.opcode,
            state.regs.mar.value(),
            state.timing.distributor.value(),
            phase_name(state.timing.phase),
            if state.timing.acquisition { "acq" } else { "exec" },
        );
        return Ok(ExitCode::from(2));
    }

    if program_path.is_none() {
        let result = state.memory.read(golden::RESULT_ADDRESS);
        if result != golden::EXPECTED_VALUE {
            println!(
                "FAIL: memory[{:#04X}] = {result:#04X} (expected {:#04X}).",
                golden::RESULT_ADDRESS,
                golden::EXPECTED_VALUE,
            );
            return Ok(ExitCode::from(1));
        }
        println!(
            "PASS: halted after {steps_taken} clock steps. memory[{:#04X}] = {result:#04X}.",
            golden::RESULT_ADDRESS,
        );
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(spec) = &program_spec {
        for expect in &spec.expects {
            let value = state.memory.read(expect.address);
            if value != expect.value {
                println!(
                    "FAIL: memory[{:#05X}] = {value:#04X} (expected {:#04X}).",
                    expect.address, expect.value,
                );
                return Ok(ExitCode::from(1));
            }
        }
    }

    if let Some(path) = &args.expect_term {
        match check_output(path, "terminal output", &state.io.terminal_output) {
            Ok(true) => {}
            Ok(false) => return Ok(ExitCode::from(1)),
            Err(err) => {
                println!("FAIL: {err:#}");
                return Ok(ExitCode::from(1));
            }
        }
    }

    if let Some(path) = &args.expect_printer {
        match check_output(path, "printer output", &state.io.printer_output) {
            Ok(true) => {}
            Ok(false) => return Ok(ExitCode::from(1)),
            Err(err) => {
                println!("FAIL: {err:#}");
                return Ok(ExitCode::from(1));
            }
        }
    }

    if let Some(path) = &args.save_tape {
        tape::save_tape(path, &state.io)?;
        log::info!("tape output saved to {}", path.display());
    }
    if let Some(path) = &args.save_term {
        tape::save_bytes(path, &state.io.terminal_output, true)?;
    }
    if let Some(path) = &args.save_printer {
        tape::save_ascii(path, &state.io.printer_output, true)?;
    }

    println!("PASS: halted after {steps_taken} clock steps.");
    Ok(ExitCode::SUCCESS)
}

/// Compare a device output buffer against a hex expectation file.
fn check_output(path: &Path, label: &str, actual: &[u8]) -> anyhow::Result<bool> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("unable to open expected output file {}", path.display()))?;
    let (expected, result) = program::parse_hex_stream(&text);
    anyhow::ensure!(!expected.is_empty(), "no bytes parsed from expected output file");
    anyhow::ensure!(
        result.skipped == 0,
        "expected output file contains invalid tokens"
    );

    if actual.len() != expected.len() {
        println!(
            "FAIL: {label} size {} (expected {}).",
            actual.len(),
            expected.len()
        );
        return Ok(false);
    }
    for (i, (have, want)) in actual.iter().zip(&expected).enumerate() {
        if have != want {
            println!("FAIL: {label} byte {i} = {have:#04X} (expected {want:#04X}).");
            return Ok(false);
        }
    }
    Ok(true)
}
