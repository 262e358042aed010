//! `gba-asm`: assembles a `.s` source tree into a GBA ROM image.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context};
use clap::Parser;
use gba_asm_cli::{Driver, FsProjectIo};
use gba_asm_core::Project;
use tracing_subscriber::EnvFilter;

/// Command-line surface (spec §C.5 "CLI ergonomics").
#[derive(Parser, Debug)]
#[command(name = "gba-asm", about = "Assembles GBA ARM/Thumb source into a ROM image")]
struct Args {
    /// Main source file to assemble.
    main: PathBuf,

    /// Output ROM path.
    #[arg(short, long, default_value = "out.gba")]
    output: PathBuf,

    /// `NAME=VALUE` define, entered into the main file's root scope as a
    /// `num` symbol before parsing begins. May be repeated.
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
    defines: Vec<String>,

    /// Additional directory to search for `.include`/`.importall`/
    /// `.importnames`/`.embed` paths. May be repeated.
    #[arg(short = 'I', long = "include-dir", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Increase log verbosity (`-v` info, `-vv` debug, `-vvv` trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dump each section's layout as JSON to stdout instead of writing a ROM.
    #[cfg(feature = "dump-sections")]
    #[arg(long)]
    dump_sections: bool,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Parses a `NAME=VALUE` define into a root-scope `num` entry. `VALUE` goes
/// through the same expression grammar as ordinary source, but must reduce
/// to a compile-time literal since `Project::define` takes a plain `Value`.
fn parse_define(raw: &str) -> anyhow::Result<(String, gba_asm_types::Value)> {
    let (name, value_text) = raw
        .split_once('=')
        .with_context(|| format!("define '{raw}' is missing '=VALUE' (expected NAME=VALUE)"))?;
    // `ExprError` carries a `SourcePos` (`Rc<str>`), so it isn't `Send`/`Sync`
    // and can't ride along as an `anyhow` source; flatten it to a string.
    let expr = gba_asm_expr::parse(value_text, "-D", 0, 0).map_err(|e| anyhow::anyhow!("invalid define value in '{raw}': {e}"))?;
    match expr {
        gba_asm_expr::Expr::Number(n) => Ok((name.to_string(), n)),
        _ => bail!("define '{raw}': value must be a literal number, not an expression"),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let main_path = args
        .main
        .to_str()
        .with_context(|| format!("main path '{}' is not valid UTF-8", args.main.display()))?
        .to_string();

    let io = Rc::new(FsProjectIo::new(args.include_dirs.clone()));
    let mut project = Project::new(main_path, io, Rc::new(Driver::new()));

    for raw in &args.defines {
        let (name, value) = parse_define(raw)?;
        project.define(name, value);
    }

    // `CoreError` carries `Rc<str>` source positions, so it isn't `Send`/`Sync`
    // and can't be threaded through as an `anyhow` source directly; flatten it
    // to a string at this boundary instead.
    let output = project.make().map_err(|e| anyhow::anyhow!("assembly failed: {e}"))?;

    for path in &output.used_files {
        tracing::debug!(target: "gba_asm::build", file = %path, "used");
    }

    #[cfg(feature = "dump-sections")]
    if args.dump_sections {
        #[derive(serde::Serialize)]
        struct Dump<'a> {
            rom_bytes: usize,
            used_files: &'a [String],
        }
        let dump = Dump {
            rom_bytes: output.rom.len(),
            used_files: &output.used_files,
        };
        let json = serde_json::to_string_pretty(&dump).context("failed to serialize section dump")?;
        println!("{json}");
        return Ok(());
    }

    std::fs::write(&args.output, &output.rom)
        .with_context(|| format!("failed to write ROM to '{}'", args.output.display()))?;
    tracing::info!(target: "gba_asm::build", path = %args.output.display(), bytes = output.rom.len(), "wrote ROM");

    Ok(())
}
