use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use regex::Regex;
use tracing_subscriber::EnvFilter;

use restartcheck::collab::{DirectoryHookRunner, NoopInterpreterProber, NullProgressSink, SystemctlProbe};
use restartcheck::config::{RestartMode, ScanOptions};
use restartcheck::output::{batch, text};
use restartcheck::scan::Collaborators;

/// Find processes still running deleted or upgraded files, and report what
/// needs restarting to pick up the new code.
#[derive(Parser, Debug)]
#[command(name = "restartcheck", version, about)]
struct Cli {
    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Emit machine-parsable NEEDRESTART-* lines instead of a text summary.
    #[arg(short, long)]
    batch: bool,

    /// Emit the report as JSON instead of a text summary.
    #[arg(long, conflicts_with = "batch")]
    json: bool,

    /// Restart mode: list, interactive, or automatic.
    #[arg(short = 'r', long, default_value = "list")]
    restart_mode: String,

    /// Skip the kernel version/ABI check.
    #[arg(long)]
    no_kernelhints: bool,

    /// Probe interpreters (perl/python/ruby/...) for obsolete source files.
    #[arg(short = 'i', long)]
    interpscan: bool,

    /// Assume "no" for any restart prompt (batch/automatic mode only).
    #[arg(short = 'n', long)]
    defno: bool,

    /// Exclude executables matching this regex; repeatable.
    #[arg(short = 'e', long = "blacklist")]
    blacklist: Vec<String>,

    /// Exclude controllable units matching this regex; repeatable.
    #[arg(long = "blacklist-rc")]
    blacklist_rc: Vec<String>,

    /// Directory of executable hook scripts consulted during attribution.
    #[arg(long)]
    hook_dir: Option<PathBuf>,

    /// Root to treat as `/proc` (testing/containers).
    #[arg(long, default_value = "/proc")]
    proc_root: PathBuf,

    /// Root to treat as `/boot` (testing/containers).
    #[arg(long, default_value = "/boot")]
    boot_dir: PathBuf,

    /// Root to treat as `/run` (testing/containers).
    #[arg(long, default_value = "/run")]
    run_root: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = build_options(&cli)?;
    options.validate()?;

    let hook_dir = options.hook_dir.clone().unwrap_or_else(|| PathBuf::from("/usr/share/restartcheck/hooks.d"));
    let hook_runner = DirectoryHookRunner { dir: hook_dir };
    let interpreter = NoopInterpreterProber;
    let service_manager_probe = SystemctlProbe;
    let progress = NullProgressSink;

    let collaborators = Collaborators {
        hook_runner: &hook_runner,
        interpreter: &interpreter,
        service_manager_probe: &service_manager_probe,
        progress: &progress,
    };

    let report = restartcheck::scan::run(&options, &collaborators)?;

    if cli.json {
        serde_json::to_writer_pretty(std::io::stdout(), &report)?;
        println!();
    } else if cli.batch {
        batch::write_report(std::io::stdout(), &report)?;
    } else {
        text::print_report(&report);
    }

    Ok(())
}

fn build_options(cli: &Cli) -> Result<ScanOptions> {
    let mut options = ScanOptions::default();
    options.verbose = cli.verbose;
    options.restart_mode = RestartMode::parse(&cli.restart_mode)?;
    options.kernelhints = !cli.no_kernelhints;
    options.interpscan = cli.interpscan;
    options.defno = cli.defno;
    options.proc_root = cli.proc_root.clone();
    options.boot_dir = cli.boot_dir.clone();
    options.run_root = cli.run_root.clone();
    options.hook_dir = cli.hook_dir.clone();

    for pattern in &cli.blacklist {
        options.blacklist.push(Regex::new(pattern)?);
    }
    for pattern in &cli.blacklist_rc {
        options.blacklist_rc.push(Regex::new(pattern)?);
    }

    Ok(options)
}
