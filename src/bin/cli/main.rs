//! Binary entry point for the cowtree command-line driver.
#![forbid(unsafe_code)]

mod config;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cowtree::{
    primitives::pager::PagerStats,
    storage::btree::{BTreeStatsSnapshot, VerifyReport},
    BTree, MemPageStore,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use config::{CliConfig, TreeSection};

#[derive(Parser, Debug)]
#[command(
    name = "cowtree",
    version,
    about = "Build and check copy-on-write B+ trees in memory",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "COWTREE_CONFIG",
        value_name = "FILE",
        help = "CLI config file (defaults to the user config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(flatten)]
    tree: TreeArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct TreeArgs {
    #[arg(long, global = true, help = "Page size in bytes")]
    page_size: Option<usize>,

    #[arg(long, global = true, help = "Largest accepted key in bytes")]
    max_key_size: Option<usize>,

    #[arg(long, global = true, help = "Largest accepted value in bytes")]
    max_value_size: Option<usize>,
}

impl From<&TreeArgs> for TreeSection {
    fn from(args: &TreeArgs) -> Self {
        TreeSection {
            page_size: args.page_size,
            max_key_size: args.max_key_size,
            max_value_size: args.max_value_size,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Insert synthetic keys, then verify the tree")]
    Fill(FillCmd),

    #[command(about = "Insert key/value lines from a file, then verify the tree")]
    Load {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct FillCmd {
    #[arg(long, default_value_t = 10_000, help = "Number of inserts")]
    count: u64,

    #[arg(long, default_value_t = 16, help = "Key length in bytes (at least 8)")]
    key_len: usize,

    #[arg(long, default_value_t = 100, help = "Value length in bytes")]
    value_len: usize,

    #[arg(long, value_enum, default_value_t = KeyOrder::Sequential)]
    order: KeyOrder,

    #[arg(long, default_value_t = 0x5eed, help = "Seed for random keys and values")]
    seed: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum KeyOrder {
    Sequential,
    Random,
}

#[derive(Debug, Serialize)]
struct RunReport {
    inserts: u64,
    elapsed_ms: f64,
    verify: VerifyReport,
    tree: BTreeStatsSnapshot,
    pager: PagerStats,
}

fn main() {
    init_tracing();
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Returns whether the built tree passed verification.
fn run() -> Result<bool, Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    let options = config.tree_options(&TreeSection::from(&cli.tree));
    tracing::debug!(
        target: "cowtree::cli",
        config = ?config.path(),
        page_size = options.page_size,
        "resolved tree options"
    );

    let store = Arc::new(MemPageStore::new(options.page_size));
    let mut tree = BTree::create(store.clone(), options)?;
    let started = std::time::Instant::now();
    let inserts = match &cli.command {
        Command::Fill(cmd) => fill(&mut tree, cmd)?,
        Command::Load { path } => load(&mut tree, path)?,
    };
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    tree.emit_stats();
    let report = RunReport {
        inserts,
        elapsed_ms,
        verify: tree.verify()?,
        tree: tree.stats_snapshot(),
        pager: store.stats(),
    };
    emit(&cli.format, &report, |fmt| print_report_text(fmt, &report))?;
    Ok(report.verify.success)
}

fn fill(tree: &mut BTree, cmd: &FillCmd) -> Result<u64, Box<dyn Error>> {
    if cmd.key_len < 8 {
        return Err("--key-len must be at least 8".into());
    }
    let mut rng = ChaCha8Rng::seed_from_u64(cmd.seed);
    let mut key = vec![0u8; cmd.key_len];
    let mut value = vec![0u8; cmd.value_len];
    for i in 0..cmd.count {
        let id = match cmd.order {
            KeyOrder::Sequential => i,
            KeyOrder::Random => rng.gen(),
        };
        key[..8].copy_from_slice(&id.to_be_bytes());
        rng.fill(&mut value[..]);
        tree.insert(&key, &value)?;
    }
    Ok(cmd.count)
}

fn load(tree: &mut BTree, path: &Path) -> Result<u64, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let mut inserts = 0;
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('\t')
            .or_else(|| line.split_once('='))
            .ok_or_else(|| format!("{}:{}: expected key<TAB>value", path.display(), lineno + 1))?;
        tree.insert(key.as_bytes(), value.as_bytes())?;
        inserts += 1;
    }
    Ok(inserts)
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

fn print_report_text(_: OutputFormat, report: &RunReport) {
    println!(
        "Inserted {} records in {:.2} ms",
        report.inserts, report.elapsed_ms
    );
    println!();
    let counts = &report.verify.counts;
    println!(
        "Verify => success={} root={} height={} leaves={} internal={} entries={} bytes_used={}",
        report.verify.success,
        report.verify.root,
        counts.height,
        counts.leaf_pages,
        counts.internal_pages,
        counts.entries,
        counts.bytes_used,
    );
    for finding in &report.verify.findings {
        println!("- page {}: {}", finding.page, finding.message);
    }
    println!();
    let tree = &report.tree;
    println!(
        "Tree: inserts={} updates={} leaf_splits={} internal_splits={} root_promotions={}",
        tree.leaf_inserts,
        tree.leaf_updates,
        tree.leaf_splits,
        tree.internal_splits,
        tree.root_promotions
    );
    println!(
        "      pages_allocated={} pages_released={} aborted_inserts={}",
        tree.pages_allocated, tree.pages_released, tree.aborted_inserts
    );
    println!();
    let pager = &report.pager;
    println!(
        "Pager: page_size={} live_pages={} reads={} allocations={} frees={}",
        pager.page_size, pager.live_pages, pager.reads, pager.allocations, pager.frees
    );
}
