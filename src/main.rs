//! CLI entry point for `midsearch`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use midsearch::config::{self, Config, DEFAULT_PORT};
use midsearch::error::SearchError;
use midsearch::export::csv::MatchAggregator;
use midsearch::model::target::{load_targets, TargetIdentifier};
use midsearch::parser::header::parse_date;
use midsearch::search::{mailbox, Progress, RunSummary, SearchOptions, Searcher};
use midsearch::session::imap::{ConnectParams, ImapSession};

#[derive(Parser)]
#[command(
    name = "midsearch",
    version,
    about = "Search IMAP mailboxes by Message-ID and export matches to CSV"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args)]
struct ConnectionArgs {
    /// IMAP hostname
    #[arg(long, env = "IMAP_HOST")]
    host: Option<String>,

    /// IMAPS port (default 993)
    #[arg(long, env = "IMAP_PORT")]
    port: Option<u16>,

    /// Login name
    #[arg(long, env = "IMAP_USER")]
    user: Option<String>,

    /// Password (IMAP_PASS or IMAP_PASSWORD); prompted for when omitted
    #[arg(long, env = "IMAP_PASS", hide_env_values = true)]
    password: Option<String>,

    /// Take host and port from a named provider (see `midsearch providers`)
    #[arg(long)]
    provider: Option<String>,

    /// Extra TOML file with provider entries
    #[arg(long, env = "MIDSEARCH_PROVIDERS", value_name = "FILE")]
    providers_file: Option<PathBuf>,

    /// Socket timeout in seconds (0 waits forever)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Print the raw IMAP conversation
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search mailboxes for Message-IDs and write a CSV
    Search {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Message-IDs, with or without angle brackets
        #[arg(long, num_args = 1.., value_name = "ID")]
        ids: Vec<String>,

        /// File with one Message-ID per line
        #[arg(long, value_name = "FILE")]
        ids_file: Option<PathBuf>,

        /// Mailboxes to search; '*' for every selectable mailbox
        #[arg(long, num_args = 1.., value_name = "NAME")]
        mailboxes: Vec<String>,

        /// Output CSV path
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Disable the date/domain deep search
        #[arg(long)]
        no_deep: bool,

        /// Days on each side of the reference date for the deep search
        #[arg(long, value_name = "DAYS")]
        window_days: Option<u32>,

        /// Maximum deep-search candidates per mailbox
        #[arg(long, value_name = "N")]
        max_candidates: Option<usize>,

        /// Reference date for the deep search (overrides the date embedded in ids)
        #[arg(long, value_name = "DATE")]
        reference_date: Option<String>,

        /// Stop at the first mailbox containing a Message-ID
        #[arg(long)]
        first_match: bool,

        /// Write a row for Message-IDs found nowhere
        #[arg(long)]
        include_missing: bool,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the mailboxes a search would scan
    Mailboxes {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Mailboxes to resolve; '*' (default) for every selectable mailbox
        #[arg(long, num_args = 1.., value_name = "NAME")]
        mailboxes: Vec<String>,
    },
    /// Show the provider table
    Providers {
        /// Extra TOML file with provider entries
        #[arg(long, env = "MIDSEARCH_PROVIDERS", value_name = "FILE")]
        providers_file: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Everything `midsearch search` needs besides the connection.
struct SearchRequest {
    ids: Vec<String>,
    ids_file: Option<PathBuf>,
    mailboxes: Vec<String>,
    out: Option<PathBuf>,
    no_deep: bool,
    window_days: Option<u32>,
    max_candidates: Option<usize>,
    reference_date: Option<String>,
    first_match: bool,
    include_missing: bool,
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);
    let trace = cli.verbose >= 3;

    match cli.command {
        Commands::Search {
            conn,
            ids,
            ids_file,
            mailboxes,
            out,
            no_deep,
            window_days,
            max_candidates,
            reference_date,
            first_match,
            include_missing,
            json,
        } => {
            let request = SearchRequest {
                ids,
                ids_file,
                mailboxes,
                out,
                no_deep,
                window_days,
                max_candidates,
                reference_date,
                first_match,
                include_missing,
                json,
            };
            cmd_search(&config, &conn, request, trace)
        }
        Commands::Mailboxes { conn, mailboxes } => cmd_mailboxes(&config, &conn, &mailboxes, trace),
        Commands::Providers {
            providers_file,
            json,
        } => cmd_providers(&config, providers_file.as_deref(), json),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "midsearch.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Resolve host, port, user and password from flags, provider and config,
/// prompting for the password when nothing supplies it.
fn connect_params(config: &Config, conn: &ConnectionArgs, trace: bool) -> anyhow::Result<ConnectParams> {
    let provider_name = conn
        .provider
        .as_deref()
        .or(config.connection.provider.as_deref());
    let provider = match provider_name {
        Some(name) => {
            let providers = config.providers(conn.providers_file.as_deref())?;
            let found = config::find_provider(&providers, name).cloned();
            if found.is_none() {
                anyhow::bail!(
                    "Unknown provider '{name}'. Known: {}",
                    providers.keys().cloned().collect::<Vec<_>>().join(", ")
                );
            }
            found
        }
        None => None,
    };

    let host = conn
        .host
        .clone()
        .or_else(|| provider.as_ref().map(|p| p.server.clone()))
        .or_else(|| config.connection.host.clone())
        .ok_or_else(|| anyhow::anyhow!("Missing required: --host (or --provider)"))?;
    let port = conn
        .port
        .or_else(|| provider.as_ref().map(|p| p.port))
        .unwrap_or(if config.connection.port == 0 {
            DEFAULT_PORT
        } else {
            config.connection.port
        });
    let user = conn
        .user
        .clone()
        .or_else(|| config.connection.user.clone())
        .ok_or_else(|| anyhow::anyhow!("Missing required: --user"))?;

    let password = match conn
        .password
        .clone()
        .or_else(|| std::env::var("IMAP_PASSWORD").ok())
    {
        Some(p) => p,
        None => rpassword::prompt_password("IMAP password: ")?,
    };

    let timeout_secs = conn.timeout.unwrap_or(config.connection.timeout_secs);

    Ok(ConnectParams {
        host,
        port,
        user,
        password,
        timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        debug: conn.debug || trace,
    })
}

/// Build search options: config first, CLI flags on top.
fn search_options(config: &Config, request: &SearchRequest) -> anyhow::Result<SearchOptions> {
    let mut options = config.search.to_options();
    if request.no_deep {
        options.deep = false;
    }
    if let Some(days) = request.window_days {
        options.deep_options.window_days = days;
    }
    if let Some(max) = request.max_candidates {
        options.deep_options.max_candidates = max;
    }
    if let Some(ref raw) = request.reference_date {
        let date = parse_date(raw)
            .ok_or_else(|| anyhow::anyhow!("Unrecognized --reference-date '{raw}'"))?;
        options.reference_date = Some(date);
    }
    options.first_match_only |= request.first_match;
    options.include_missing |= request.include_missing;
    Ok(options)
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Search mailboxes and export the matches.
fn cmd_search(
    config: &Config,
    conn: &ConnectionArgs,
    request: SearchRequest,
    trace: bool,
) -> anyhow::Result<()> {
    let targets = load_targets(&request.ids, request.ids_file.as_deref())?;
    let options = search_options(config, &request)?;
    let out_path = request
        .out
        .clone()
        .unwrap_or_else(|| config.export.output.clone());

    let params = connect_params(config, conn, trace)?;
    println!("Connecting to {}:{} as {} ...", params.host, params.port, params.user);
    let mut session = ImapSession::connect(params)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flushed = Arc::new(Mutex::new(MatchAggregator::new()));
    install_interrupt_handler(
        Arc::clone(&cancel),
        Arc::clone(&flushed),
        out_path.clone(),
        config.export.utf8_bom,
    );

    let start = Instant::now();
    let mut aggregator = MatchAggregator::new();

    let (outcome, summary) = {
        let mailboxes =
            match mailbox::resolve(&request.mailboxes, &config.search.default_mailboxes, &mut session) {
                Ok(m) => m,
                Err(e) => {
                    session.logout();
                    return Err(e.into());
                }
            };
        tracing::info!(count = mailboxes.len(), "Mailboxes to scan");

        let pb = spinner();
        let mut searcher = Searcher::new(&mut session, options);
        let outcome = searcher.run(
            &targets,
            &mailboxes,
            &mut aggregator,
            Some(&|event: &Progress<'_>| {
                match event {
                    Progress::Scanning {
                        target,
                        mailbox,
                        position,
                        total,
                    } => pb.set_message(format!("<{target}> {mailbox} ({position}/{total})")),
                    Progress::Matched { record, source } => {
                        if let Ok(mut mirror) = flushed.lock() {
                            mirror.insert((*record).clone());
                        }
                        pb.println(format!(
                            "  - {}: {} seq {} | {} | {} ({source:?})",
                            record.message_id,
                            record.mailbox,
                            record.seqnum.unwrap_or_default(),
                            record.date,
                            record.subject
                        ))
                    }
                    Progress::Warning { message } => pb.println(format!("  ! {message}")),
                }
                !cancel.load(Ordering::SeqCst)
            }),
        );
        pb.finish_and_clear();
        (outcome, searcher.into_summary())
    };
    session.logout();

    let fatal = match outcome {
        Ok(()) => None,
        Err(SearchError::Cancelled) => {
            eprintln!("Interrupted, writing partial results");
            None
        }
        Err(e) => Some(e),
    };

    if fatal.is_none() || !aggregator.is_empty() {
        aggregator.export_csv(&out_path, config.export.utf8_bom)?;
    }

    if request.json {
        print_summary_json(&summary, &targets, &aggregator, start.elapsed(), &out_path)?;
    } else {
        print_summary(&summary, start.elapsed(), &out_path, fatal.is_none() || !aggregator.is_empty());
    }

    match fatal {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// First Ctrl-C: stop before the next mailbox. Second Ctrl-C: write the
/// matches seen so far and exit, even while a server read is blocking.
fn install_interrupt_handler(
    cancel: Arc<AtomicBool>,
    flushed: Arc<Mutex<MatchAggregator>>,
    out_path: PathBuf,
    utf8_bom: bool,
) {
    let presses = AtomicUsize::new(0);
    let result = ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            cancel.store(true, Ordering::SeqCst);
            eprintln!("\nStopping after the current mailbox (Ctrl-C again to stop now)");
            return;
        }
        let code = match flushed.lock() {
            Ok(aggregator) => match aggregator.export_csv(&out_path, utf8_bom) {
                Ok(()) => {
                    eprintln!(
                        "\nInterrupted, {} matches written to {}",
                        aggregator.match_count(),
                        out_path.display()
                    );
                    130
                }
                Err(e) => {
                    eprintln!("\nInterrupted, could not write results: {e}");
                    1
                }
            },
            Err(_) => 1,
        };
        std::process::exit(code);
    });
    if let Err(e) = result {
        tracing::warn!(error = %e, "Could not install Ctrl-C handler");
    }
}

/// Connect and print the resolved mailbox list.
fn cmd_mailboxes(
    config: &Config,
    conn: &ConnectionArgs,
    requested: &[String],
    trace: bool,
) -> anyhow::Result<()> {
    let params = connect_params(config, conn, trace)?;
    let mut session = ImapSession::connect(params)?;

    let requested = if requested.is_empty() {
        vec![mailbox::WILDCARD.to_string()]
    } else {
        requested.to_vec()
    };
    let resolved = mailbox::resolve(&requested, &config.search.default_mailboxes, &mut session);
    session.logout();

    for name in resolved? {
        println!("{name}");
    }
    Ok(())
}

/// Print the merged provider table.
fn cmd_providers(config: &Config, providers_file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let providers = config.providers(providers_file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&providers)?);
        return Ok(());
    }

    println!();
    println!("  {:<16} {:<36} {:>5}", "Provider", "Server", "Port");
    println!("  {}", "-".repeat(59));
    for (name, provider) in &providers {
        println!("  {:<16} {:<36} {:>5}", name, provider.server, provider.port);
    }
    println!();
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "midsearch", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print the end-of-run report.
fn print_summary(summary: &RunSummary, elapsed: Duration, out_path: &Path, written: bool) {
    println!();
    println!("  {:<20} {}", "Message-IDs", summary.targets);
    println!("  {:<20} {}", "Found", summary.targets_found);
    println!("  {:<20} {}", "Mailboxes", summary.mailboxes);
    println!(
        "  {:<20} {} ({} exact, {} deep)",
        "Matches",
        summary.matches(),
        summary.exact_matches,
        summary.deep_matches
    );
    if !summary.warnings.is_empty() {
        println!("  {:<20} {}", "Warnings", summary.warnings.len());
    }
    println!("  {:<20} {:.1?}", "Elapsed", elapsed);
    if written {
        println!("  {:<20} {}", "CSV", out_path.display());
    }
    println!();
}

/// Print the end-of-run report as JSON.
fn print_summary_json(
    summary: &RunSummary,
    targets: &[TargetIdentifier],
    aggregator: &MatchAggregator,
    elapsed: Duration,
    out_path: &Path,
) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "targets": targets.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
        "summary": summary,
        "records": aggregator.records(),
        "elapsed_ms": elapsed.as_millis(),
        "output": out_path.to_string_lossy(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
