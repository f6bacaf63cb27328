//! `megadl` command line downloader.
//!
//! Usage:
//!   megadl [OPTIONS] <URL>...
//!
//! Exit status: 0 when every file completed, 1 on partial completion, 2 on
//! fatal errors (bad links, login failure).

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use megadl::hooks::dump_file_stem;
use megadl::{
    parse_url, AfterScanHook, AutoDecision, BeforeDownloadHook, Config, Decider, DownloadMode,
    DownloadOutcome, Downloader, DumpLinksHook, DumpStructureHook, IntegrityPolicy,
    OverwritePolicy, ProgressCallback, Range, TransferProgress,
};

const MB: f64 = 1024.0 * 1024.0;

#[derive(Parser, Debug)]
#[command(name = "megadl", version, about = "Download files and folders from MEGA share links")]
struct Cli {
    /// Share links to download
    #[arg(required = true)]
    urls: Vec<String>,

    /// TOML configuration file; flags override its values
    #[arg(short, long, env = "MEGADL_CONFIG")]
    config: Option<PathBuf>,

    /// Destination base directory
    #[arg(short = 'o', long)]
    dest: Option<PathBuf>,

    /// Files downloaded at once
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Download mode: full, touch or skip
    #[arg(short = 'm', long)]
    mode: Option<DownloadMode>,

    /// Existing files: ask, always or never
    #[arg(long)]
    overwrite: Option<OverwritePolicy>,

    /// MAC mismatch handling: fail or warn
    #[arg(long)]
    integrity: Option<IntegrityPolicy>,

    /// Proxy URL (http, socks4, socks5, socks5h)
    #[arg(long, env = "MEGADL_PROXY")]
    proxy: Option<String>,

    /// Retry budget per API request
    #[arg(long)]
    retries: Option<u32>,

    /// Socket read timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Disable pacing between API requests
    #[arg(long)]
    nodelay: bool,

    /// Keep files whose size in MB is in [MIN, MAX)
    #[arg(long, value_name = "MIN-MAX")]
    filter_size: Option<Range>,

    /// Keep files whose name matches this glob
    #[arg(long, value_name = "GLOB")]
    filter_name: Option<String>,

    /// Keep files with these extensions (comma separated)
    #[arg(long, value_name = "EXT", value_delimiter = ',')]
    filter_ext: Vec<String>,

    /// Save direct links and keys of every file as JSON
    #[arg(long)]
    dump_links: bool,

    /// Save the scanned folder structure as JSON
    #[arg(long)]
    dump_structure: bool,

    /// Log level (overrides RUST_LOG)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Disable coloured log output
    #[arg(long)]
    no_color: bool,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,

    /// Answer every question with yes
    #[arg(short = 'y', long)]
    yes: bool,
}

fn init_logging(cli: &Cli) {
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(format!("megadl={}", level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("megadl=info")),
    };
    fmt()
        .with_env_filter(filter)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dest) = &cli.dest {
        config.dest_base = dest.clone();
    }
    if let Some(jobs) = cli.jobs {
        config.max_jobs = jobs;
    }
    if let Some(mode) = cli.mode {
        config.download_mode = mode;
    }
    if let Some(overwrite) = cli.overwrite {
        config.overwrite = overwrite;
    }
    if let Some(integrity) = cli.integrity {
        config.integrity = integrity;
    }
    if let Some(proxy) = &cli.proxy {
        config.proxy = Some(proxy.clone());
    }
    if let Some(retries) = cli.retries {
        config.retries = retries;
    }
    if let Some(timeout) = cli.timeout {
        config.read_timeout_secs = timeout;
    }
    if cli.nodelay {
        config.nodelay = true;
    }
    if let Some(range) = cli.filter_size {
        config.filter_filesize = Some(range);
    }
    if let Some(pattern) = &cli.filter_name {
        config.filter_filename = Some(pattern.clone());
    }
    if !cli.filter_ext.is_empty() {
        config.filter_extensions = cli.filter_ext.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Asks on the terminal; one question at a time.
struct ConsoleDecider {
    lock: Mutex<()>,
}

impl ConsoleDecider {
    fn new() -> Self {
        Self { lock: Mutex::new(()) }
    }

    fn ask(&self, prompt: &str, default: bool) -> bool {
        let _guard = self.lock.lock();
        let stdin = std::io::stdin();
        loop {
            eprint!("{} ", prompt);
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => return default,
                Ok(_) => {}
            }
            match line.trim() {
                "" => return default,
                "y" | "Y" | "1" => return true,
                "n" | "N" | "0" => return false,
                _ => continue,
            }
        }
    }
}

impl Decider for ConsoleDecider {
    fn confirm_overwrite(&self, path: &Path, existing_size: u64, expected_size: u64) -> bool {
        self.ask(
            &format!(
                "{} already exists ({:.2} / {:.2} MB). Overwrite? [y/N]",
                path.display(),
                existing_size as f64 / MB,
                expected_size as f64 / MB
            ),
            false,
        )
    }

    fn confirm_download(&self, index: usize, path: &Path, size: u64) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.ask(
            &format!("[{}] Download {} ({:.2} MB)? [Y/n]", index, name, size as f64 / MB),
            true,
        )
    }
}

fn progress_bars(multi: MultiProgress) -> ProgressCallback {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-");
    let bars: Mutex<HashMap<usize, ProgressBar>> = Mutex::new(HashMap::new());

    Arc::new(move |progress: &TransferProgress| {
        let Ok(mut bars) = bars.lock() else {
            return true;
        };
        let bar = bars.entry(progress.index).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(progress.total));
            bar.set_style(style.clone());
            bar.set_message(progress.filename.clone());
            bar
        });
        bar.set_position(progress.done.min(progress.total));
        if progress.is_complete() {
            bar.finish_with_message(format!("{} complete", progress.filename));
        }
        true
    })
}

fn exit_code(outcomes: &[DownloadOutcome], failed_links: usize) -> ExitCode {
    let failed = outcomes.iter().filter(|o| !o.status.is_success()).count();
    if failed == 0 && failed_links == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = build_config(&cli)?;
    for url in &cli.urls {
        parse_url(url)?;
    }

    let abort = Arc::new(AtomicBool::new(false));
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping downloads...");
                abort.store(true, Ordering::SeqCst);
            }
        });
    }

    let dest_base = config.dest_base.clone();
    let mut downloader = Downloader::connect(config, abort.clone())
        .await
        .context("anonymous login failed")?;

    let decider: Arc<dyn Decider> = if cli.yes {
        Arc::new(AutoDecision {
            overwrite: true,
            download: true,
        })
    } else {
        Arc::new(ConsoleDecider::new())
    };
    downloader = downloader.with_decider(decider);

    let stem = dump_file_stem(&cli.urls[0]);
    let mut before_hooks: Vec<Arc<dyn BeforeDownloadHook>> = Vec::new();
    let mut after_hooks: Vec<Arc<dyn AfterScanHook>> = Vec::new();
    if cli.dump_links {
        let args = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
        let path = dest_base.join(format!("{}.json", stem));
        before_hooks.push(Arc::new(DumpLinksHook::new(path, &dest_base, args)));
    }
    if cli.dump_structure {
        let path = dest_base.join(format!("{}_structure.json", stem));
        after_hooks.push(Arc::new(DumpStructureHook::new(path)));
    }
    for hook in &before_hooks {
        downloader = downloader.with_before_download_hook(hook.clone());
    }
    for hook in &after_hooks {
        downloader = downloader.with_after_scan_hook(hook.clone());
    }
    if !cli.no_progress {
        downloader = downloader.with_progress(progress_bars(MultiProgress::new()));
    }

    let mut outcomes = Vec::new();
    let mut failed_links = 0;
    for url in &cli.urls {
        if abort.load(Ordering::SeqCst) {
            break;
        }
        match downloader.download_url(url).await {
            Ok(results) => outcomes.extend(results),
            Err(e) => {
                error!("{}: {}", url, e);
                failed_links += 1;
            }
        }
    }

    for hook in &before_hooks {
        if let Err(e) = hook.finish() {
            error!("Hook failed: {}", e);
        }
    }
    for hook in &after_hooks {
        if let Err(e) = hook.finish() {
            error!("Hook failed: {}", e);
        }
    }

    for outcome in outcomes.iter().filter(|o| !o.status.is_success()) {
        warn!("{}: {}", outcome.path.display(), outcome.status);
    }
    let completed = outcomes.iter().filter(|o| o.status.is_success()).count();
    info!("{} / {} files handled successfully", completed, outcomes.len());

    Ok(exit_code(&outcomes, failed_links))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
