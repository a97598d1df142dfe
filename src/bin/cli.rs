//! Binary entry point for the gridstore administrative CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use gridstore::{
    admin::{self, InfoReport, RebuildReport, SubStoreInfo, VerifyReport},
    logging::init_logging,
    storage::{SlotRecord, Store, StoreOptions},
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "gridstore",
    version,
    about = "Administrative CLI for gridstore directories",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        env = "GRIDSTORE_LOG",
        default_value = "warn",
        help = "Tracing filter directive"
    )]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Print header values and file sizes")]
    Info {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    #[command(about = "Check header, index and version chain invariants")]
    Verify {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        #[arg(long, help = "Shorthand for --format json")]
        json: bool,
    },

    #[command(about = "List every id with its head version")]
    Scan {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        #[arg(long, value_enum, default_value_t = KindArg::Nodes)]
        kind: KindArg,

        #[arg(long, help = "Walk each id's version chain")]
        versions: bool,
    },

    #[command(about = "Rewrite index files from the records files")]
    RebuildIndex {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum KindArg {
    Nodes,
    Edges,
}

#[derive(Debug, Serialize)]
struct ScanRow {
    id: u64,
    creation_time: u64,
    lifetime_begin: u64,
    lifetime_end: Option<u64>,
    versions: Option<u64>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log)?;

    match cli.command {
        Command::Info { dir } => {
            let report = admin::info(&dir)?;
            emit(&cli.format, &report, |_| print_info_text(&report))?;
        }
        Command::Verify { dir, json } => {
            let report = admin::verify(&dir)?;
            let format = if json { OutputFormat::Json } else { cli.format };
            emit(&format, &report, |_| print_verify_text(&report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Scan {
            dir,
            kind,
            versions,
        } => {
            let rows = match kind {
                KindArg::Nodes => scan::<gridstore::storage::NodeRecord>(&dir, versions)?,
                KindArg::Edges => scan::<gridstore::storage::EdgeRecord>(&dir, versions)?,
            };
            emit(&cli.format, &rows, |_| print_scan_text(&rows))?;
        }
        Command::RebuildIndex { dir } => {
            let reports = admin::rebuild_index(&dir)?;
            emit(&cli.format, &reports, |_| print_rebuild_text(&reports))?;
        }
    }
    Ok(())
}

fn scan<R: SlotRecord>(dir: &Path, versions: bool) -> Result<Vec<ScanRow>, Box<dyn Error>> {
    let (records, _) = gridstore::storage::substore::file_paths::<R>(dir);
    if !records.exists() {
        return Err(Box::new(admin::AdminError::MissingStore(records)));
    }
    let store = Store::<R>::open(dir, StoreOptions::default())?;

    let mut rows = Vec::new();
    {
        let mut cursor = store.full_scan();
        cursor.open();
        while cursor.next() {
            let head = cursor.read()?;
            rows.push(ScanRow {
                id: head.stable_id(),
                creation_time: head.creation_time().0,
                lifetime_begin: head.lifetime().begin.0,
                lifetime_end: head.lifetime().end.map(|end| end.0),
                versions: None,
            });
        }
        cursor.close();
    }

    if versions {
        for row in &mut rows {
            let mut walk = store.versions(R::Id::from(row.id));
            walk.open()?;
            let mut count = 1;
            while walk.next()? {
                count += 1;
            }
            walk.close();
            row.versions = Some(count);
        }
    }
    store.close()?;
    Ok(rows)
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}

fn print_info_text(report: &InfoReport) {
    println!("Store: {}", report.dir);
    print_substore_text(&report.nodes);
    print_substore_text(&report.edges);
}

fn print_substore_text(info: &SubStoreInfo) {
    println!();
    println!("{} (record_size={}):", info.kind, info.record_size);
    match (info.records_size_bytes, &info.records_header) {
        (None, _) => println!("  records: missing ({})", info.records_path),
        (Some(size), Some(header)) => println!(
            "  records: size={} next_id={} next_slot={} capacity={}",
            size, header.next_id, header.next_slot, header.capacity
        ),
        (Some(size), None) => println!("  records: size={size} header unreadable"),
    }
    match (info.index_size_bytes, &info.index_header) {
        (None, _) => println!("  index:   missing ({})", info.index_path),
        (Some(size), Some(header)) => {
            println!("  index:   size={} cursor={}", size, header.cursor)
        }
        (Some(size), None) => println!("  index:   size={size} header unreadable"),
    }
    for problem in &info.problems {
        println!("  ! {problem}");
    }
}

fn print_verify_text(report: &VerifyReport) {
    println!(
        "Verify => success={} nodes={} node_versions={} edges={} edge_versions={}",
        report.success,
        report.counts.nodes_indexed,
        report.counts.node_versions,
        report.counts.edges_indexed,
        report.counts.edge_versions,
    );
    for finding in &report.findings {
        println!("- {:?} [{}]: {}", finding.severity, finding.kind, finding.message);
    }
    if report.truncated {
        println!("- (more findings omitted)");
    }
}

fn print_scan_text(rows: &[ScanRow]) {
    for row in rows {
        let end = row
            .lifetime_end
            .map_or_else(|| "inf".to_string(), |end| end.to_string());
        match row.versions {
            Some(versions) => println!(
                "{}\tcreated={}\tlifetime=[{}, {})\tversions={}",
                row.id, row.creation_time, row.lifetime_begin, end, versions
            ),
            None => println!(
                "{}\tcreated={}\tlifetime=[{}, {})",
                row.id, row.creation_time, row.lifetime_begin, end
            ),
        }
    }
}

fn print_rebuild_text(reports: &[RebuildReport]) {
    for report in reports {
        let before = report
            .cursor_before
            .map_or_else(|| "unreadable".to_string(), |cursor| cursor.to_string());
        println!(
            "{}: cursor {} -> {} ({} non-head slots)",
            report.kind, before, report.cursor_after, report.non_head_slots
        );
    }
}
