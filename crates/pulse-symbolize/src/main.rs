use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pulse_symbolize::{Symbolizer, DEFAULT_TOOL};

/// Resolve raw fault addresses against a compiled kernel artifact.
#[derive(Debug, Parser)]
#[command(name = "pulse-symbolize")]
struct Args {
    /// Batch symbol resolution tool to invoke.
    #[arg(long, default_value = DEFAULT_TOOL)]
    tool: String,

    /// Compiled kernel artifact to resolve against.
    #[arg(long)]
    exe: PathBuf,

    /// Fault addresses, hexadecimal (with or without 0x prefix).
    #[arg(required = true, value_parser = parse_hex_address)]
    addresses: Vec<u64>,
}

fn parse_hex_address(raw: &str) -> std::result::Result<u64, String> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16).map_err(|err| format!("bad address {raw:?}: {err}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let artifact = std::fs::read(&args.exe)
        .with_context(|| format!("read artifact: {}", args.exe.display()))?;

    let backtrace = Symbolizer::new(&args.tool).symbolize(&artifact, &args.addresses)?;
    serde_json::to_writer_pretty(std::io::stdout().lock(), &backtrace)
        .context("write backtrace json")?;
    println!();
    Ok(())
}
