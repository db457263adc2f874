//! The BX compiler driver: reads a `.bx` source file, runs it through
//! however much of the pipeline `--emit` asks for, and writes the
//! corresponding artifact next to the input.
//!
//! run with `--help` for more info.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bx::BxError;
use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input `.bx` file
    file: PathBuf,
    /// how far through the pipeline to run, and which artifact to write
    #[arg(value_enum, long, default_value_t = Emit::Asm)]
    emit: Emit,
    /// accepted for compatibility with the rest of this repository's
    /// collaborator contract; optimization is out of scope, so this does
    /// nothing
    #[arg(short = 'O', long, default_value_t = false)]
    optimize: bool,
    /// output path; defaults to the input file's name with the emitted
    /// phase's extension (`.parsed`, `.rtl`, or `.s`)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Emit {
    /// pretty-printed typed AST
    Parsed,
    /// pretty-printed RTL callables
    Rtl,
    /// AMD64 AT&T-syntax assembly
    Asm,
}

impl Emit {
    fn extension(self) -> &'static str {
        match self {
            Emit::Parsed => "parsed",
            Emit::Rtl => "rtl",
            Emit::Asm => "s",
        }
    }
}

fn default_output(input: &Path, emit: Emit) -> PathBuf {
    input.with_extension(emit.extension())
}

/// Maps a `BxError` to the driver's exit code (spec §6, "Exit codes").
fn exit_code_for(err: &BxError) -> u8 {
    match err {
        BxError::Lex(..) | BxError::Parse(_) => 3,
        BxError::Type(_)
        | BxError::UndefinedVariable(_)
        | BxError::UndefinedCallable(_)
        | BxError::MissingMain
        | BxError::UnresolvableLValue
        | BxError::NonConstantInitializer(_)
        | BxError::ArityMismatch { .. } => 4,
    }
}

fn run(args: &Args) -> Result<(), u8> {
    let source = std::fs::read_to_string(&args.file).map_err(|e| {
        log::error!("cannot read `{}`: {e}", args.file.display());
        2
    })?;

    log::debug!("parsing and type-checking {}", args.file.display());
    let checked = bx::parse_and_check(&source).map_err(|e| {
        log::error!("{e}");
        exit_code_for(&e)
    })?;

    if args.emit == Emit::Parsed {
        return write_output(args, &format!("{checked:#?}"));
    }

    log::debug!("lowering to RTL");
    let rtl = bx::lower_program(&checked).map_err(|e| {
        log::error!("{e}");
        exit_code_for(&e)
    })?;

    if args.emit == Emit::Rtl {
        return write_output(args, &format!("{rtl}"));
    }

    log::debug!("translating RTL to assembly");
    let asm = bx::translate_program(&rtl);
    write_output(args, &format!("{asm}"))
}

fn write_output(args: &Args, contents: &str) -> Result<(), u8> {
    let out = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.file, args.emit));
    std::fs::write(&out, contents).map_err(|e| {
        log::error!("cannot write `{}`: {e}", out.display());
        2
    })
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    if args.optimize {
        log::warn!("-O/--optimize has no effect: optimization is out of scope for this compiler");
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}
