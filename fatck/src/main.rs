// SPDX-License-Identifier: BSD-2-Clause

mod bpb;
mod utils;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use fatckio::prelude::*;
use fatckfs::*;

use crate::utils::ask::Interactive;
use crate::utils::{set_log_level, LogLevel};

#[derive(Parser)]
#[command(name = "fatck", version, about = "FAT12/16/32 allocation table checker", long_about = None)]
struct Cli {
    /// Volume image or block device
    device: PathBuf,

    /// Report inconsistencies but never write
    #[arg(short = 'n', long)]
    no_write: bool,

    /// Apply every repair without prompting
    #[arg(short = 'y', long)]
    yes: bool,

    /// Answer every prompt with its default, no interaction
    #[arg(short, long)]
    preen: bool,

    /// Check even when the volume is marked clean
    #[arg(short, long)]
    force: bool,

    /// Byte offset of the filesystem inside the file or device
    #[arg(long, default_value_t = 0)]
    offset: u64,

    /// Never memory-map the FAT, always work on a private copy
    #[arg(long)]
    no_mmap: bool,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    set_log_level(if cli.quiet {
        LogLevel::Quiet
    } else if cli.verbose {
        LogLevel::Verbose
    } else {
        LogLevel::Normal
    });

    let rdonly = cli.no_write;
    let mut file = OpenOptions::new()
        .read(true)
        .write(!rdonly)
        .open(&cli.device)
        .with_context(|| format!("cannot open {}", cli.device.display()))?;
    let mut io = StdBlockIO::new_with_offset(&mut file, cli.offset);

    let boot = bpb::read_boot(&mut io)?;
    let geom = &boot.geom;
    log_verbose!(
        "{:?} volume: {} data clusters, {} FAT copies of {} sectors",
        geom.encoding,
        geom.num_clusters - CLUST_FIRST,
        geom.num_fats,
        geom.fat_sectors
    );

    if !cli.force && !is_dirty(&mut io, geom) {
        log_info!("{} is marked clean, not checking", cli.device.display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut policy: Box<dyn RepairPolicy> = if cli.no_write {
        Box::new(ReportOnly)
    } else if cli.yes {
        Box::new(FixAll)
    } else if cli.preen {
        Box::new(UseDefault)
    } else {
        Box::new(Interactive)
    };

    let opts = CheckOptions {
        read_only: rdonly,
        try_map: !cli.no_mmap,
    };
    let mut rep = CheckReport::default();
    let (mut table, mut ctx, mut out) = load_table(&mut io, geom, &opts, policy.as_mut(), &mut rep)?;
    log_verbose!(
        "table loaded ({})",
        if table.is_mapped() { "mapped" } else { "copied" }
    );
    let lost = check_lost(&mut table, &mut ctx, policy.as_mut(), &mut DropLost, &mut rep)?;
    out |= lost.outcome;

    print_findings(&rep);

    if out.contains(Outcome::MODIFIED) {
        table.write_back(&mut io).context("writing repaired FAT")?;
    }
    table.release()?;
    if let Some(hints) = lost.fsinfo {
        bpb::write_fsinfo(&mut io, &boot, &hints)?;
        log_info!(
            "FSInfo updated: {} free, next free {}",
            hints.free,
            hints.next_free
        );
    }
    io.flush()?;

    log_info!(
        "{} clusters in use, {} free, {} marked bad",
        ctx.used.count(),
        ctx.num_free,
        ctx.num_bad
    );

    if out.contains(Outcome::UNRESOLVED) {
        log_info!("{}", "volume still has unresolved inconsistencies".red());
        return Ok(ExitCode::from(4));
    }
    if out.contains(Outcome::MODIFIED) {
        log_info!("{}", "***** FILE SYSTEM WAS MODIFIED *****".yellow());
    }
    Ok(ExitCode::SUCCESS)
}

fn print_findings(rep: &CheckReport) {
    for f in &rep.findings {
        let tag = match f.sev {
            Severity::Info => "info".normal(),
            Severity::Warn => "warn".yellow(),
            Severity::Error => "error".red(),
        };
        log_info!("{tag}: {}", f.msg);
    }
}
