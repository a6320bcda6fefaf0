//! Entry point for the reasm pretty printer.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap` and set up logging.
//! 2. Map the input file into memory and build a module from it.
//! 3. Lay the module out if it has no addresses yet.
//! 4. Select the printer from the target registry and adjust its policy.
//! 5. Print to the output file or stdout.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing_subscriber::EnvFilter;

use reasm::config::Config;
use reasm::layout::{layout_module_at, layout_required};
use reasm::loader::load_elf;
use reasm::registry::TargetRegistry;

fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let registry = TargetRegistry::with_builtin_targets();
    if config.list_targets {
        for (format, dialect) in registry.targets() {
            let default = registry.default_dialect(&format).map_or(false, |d| d == dialect);
            println!("{format} {dialect}{}", if default { " (default)" } else { "" });
        }
        return Ok(());
    }

    let Some(path) = config.input.as_ref() else {
        anyhow::bail!("no input file");
    };
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let mut module = load_elf(&mmap, &name)?;

    if layout_required(&module) {
        let report = layout_module_at(&mut module, config.base_address).context("failed to lay out module")?;
        if !report.unresolved_symbols.is_empty() {
            tracing::warn!(
                "{} symbols could not be attached to a block and are printed as addresses",
                report.unresolved_symbols.len()
            );
        }
    }

    let dialect = match &config.syntax {
        Some(dialect) => dialect.clone(),
        None => registry.default_dialect(&config.format)?.to_string(),
    };
    let factory = registry.lookup(&config.format, &dialect)?;
    let mut policy = factory.default_policy();
    config.adjust_policy(&mut policy);
    let printer = factory.create(&module, policy);

    match &config.output {
        Some(output) => {
            let file = File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
            let mut out = BufWriter::new(file);
            printer.print(&mut out)?;
            out.flush()?;
            tracing::info!("Wrote {}", output.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            printer.print(&mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}
