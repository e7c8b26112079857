//! kz65_emit - 6502 display demos as 64KB memory images

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use kz65_emit::{codegen, parse_address, Demo, EmitConfig, Image};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Program to emit
    #[arg(short, long, value_enum, default_value_t = Demo::Pattern)]
    demo: Demo,

    /// Output binary file (default: <demo>.bin)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Load origin, hex ($0600, 0x0600 or 0600)
    #[arg(short = 'a', long, value_parser = parse_origin, default_value = "$0600")]
    origin: u16,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn parse_origin(text: &str) -> Result<u16, String> {
    parse_address(text).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    let config = EmitConfig::new(args.demo, args.origin, args.output);
    if let Err(e) = run(&config) {
        tracing::error!("{e:#}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(config: &EmitConfig) -> Result<()> {
    let code = codegen::generate(config.demo, config.origin)
        .with_context(|| format!("emitting {} demo", config.demo))?;
    let image = Image::from_code(&code)
        .with_context(|| format!("packing {} bytes at ${:04X}", code.len(), config.origin))?;

    fs::write(&config.output, image.as_bytes())
        .with_context(|| format!("writing {}", config.output.display()))?;

    println!("Created {} ({} bytes)", config.output.display(), image.len());
    println!("Program size: {} bytes", code.len());
    println!("Load at: $0000");
    println!("Start at: ${:04X}", config.origin);
    println!();
    println!(
        "Run with: 6502_emu -f {} -pc {:04X} -g",
        config.output.display(),
        config.origin
    );
    Ok(())
}
