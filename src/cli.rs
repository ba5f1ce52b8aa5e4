//! Command-line surface wrapping the library API.

use crate::config::Config;
use crate::{Claudette, ClaudetteError, RequestOptions};
use clap::{Args, Parser, Subcommand};
use claudette_core::mask_secret;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Task-aware routing middleware for LLM backends.
#[derive(Debug, Parser)]
#[command(name = "claudette", version, about, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub ask: AskArgs,

    /// Path to a JSON configuration file.
    #[arg(long, global = true, env = "CLAUDETTE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print response metadata to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress everything except the response body and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Force debug-level logging.
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Arguments of the default command: send a prompt.
#[derive(Debug, Args)]
pub struct AskArgs {
    /// The prompt to send.
    pub prompt: Option<String>,

    /// Files whose contents are prepended as context.
    pub files: Vec<String>,

    /// Force a specific backend.
    #[arg(short = 'b', long)]
    pub backend: Option<String>,

    /// Override the backend's configured model.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Sampling temperature in [0, 1].
    #[arg(short = 't', long)]
    pub temperature: Option<f32>,

    /// Upper bound on generated tokens.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Skip the cache lookup.
    #[arg(long)]
    pub no_cache: bool,

    /// Raw mode: no cache, no scoring, no fallback.
    #[arg(long)]
    pub raw: bool,

    /// Whole-request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Health and cache/ledger summary.
    Status,
    /// Per-backend availability and routing stats.
    Backends,
    /// Cache operations.
    Cache {
        #[command(subcommand)]
        op: CacheOp,
    },
    /// Credential maintenance.
    ApiKeys {
        #[command(subcommand)]
        op: KeyOp,
    },
    /// Print the effective configuration with secrets masked.
    Config,
    /// Delegates to the interactive setup wizard.
    Init,
    /// Delegates to the setup wizard subcommands.
    Setup {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        rest: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheOp {
    /// Show cache statistics.
    Stats,
    /// Drop every cached response.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(short = 'f', long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum KeyOp {
    /// Instructions for storing a key for one backend.
    Add { backend: String },
    /// Instructions for removing a key for one backend.
    Remove { backend: String },
    /// Show which key variables are configured and set.
    List,
    /// Probe one backend with the configured key.
    Test { backend: String },
    /// Provider-specific setup guidance.
    Guide { backend: String },
}

/// Installs the tracing subscriber for the CLI process.
pub fn init_tracing(debug: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if debug {
        "claudette=debug"
    } else if quiet {
        "claudette=error"
    } else {
        "claudette=warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs the parsed invocation and returns the process exit code.
pub async fn run(cli: Cli) -> i32 {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return report_error(&e),
    };

    match cli.command {
        None => ask(config, cli.ask, cli.verbose).await,
        Some(Command::Status) => status(config).await,
        Some(Command::Backends) => backends(config).await,
        Some(Command::Cache { op }) => cache(config, op).await,
        Some(Command::ApiKeys { op }) => api_keys(config, op).await,
        Some(Command::Config) => show_config(&config),
        Some(Command::Init) | Some(Command::Setup { .. }) => {
            println!(
                "The interactive setup wizard ships separately; run `claudette-setup` \
                 or edit the configuration file directly (see `claudette config`)."
            );
            0
        }
    }
}

async fn ask(config: Config, args: AskArgs, verbose: bool) -> i32 {
    let Some(prompt) = args.prompt else {
        eprintln!("error[INVALID_INPUT]: a prompt is required (see --help)");
        return 2;
    };

    let claudette = match Claudette::new(config) {
        Ok(claudette) => claudette,
        Err(e) => return report_error(&e),
    };

    let options = RequestOptions {
        forced_backend: args.backend,
        model: args.model,
        max_tokens: args.max_tokens,
        temperature: args.temperature,
        bypass_cache: args.no_cache,
        bypass_optimization: args.raw,
        timeout_ms: args.timeout.map(|s| s.saturating_mul(1000)),
    };

    let result = claudette.optimize(&prompt, &args.files, options).await;
    claudette.cleanup().await;

    match result {
        Ok(response) => {
            println!("{}", response.content);
            if verbose {
                eprintln!(
                    "backend={} cost_eur={:.6} latency_ms={} tokens={}→{} cache_hit={}",
                    response.backend_used,
                    response.cost_eur,
                    response.latency_ms,
                    response.tokens_input,
                    response.tokens_output,
                    response.cache_hit
                );
                if let Some(reason) = response.metadata.get("selection_reason") {
                    eprintln!("selection: {}", reason.as_str().unwrap_or_default());
                }
            }
            0
        }
        Err(e) => report_error(&e),
    }
}

async fn status(config: Config) -> i32 {
    let claudette = match Claudette::new(config) {
        Ok(claudette) => claudette,
        Err(e) => return report_error(&e),
    };
    claudette.probe_backends().await;
    let report = claudette.get_status().await;
    claudette.cleanup().await;

    println!(
        "claudette {} — {}",
        report.version,
        if report.healthy() { "healthy" } else { "degraded" }
    );
    println!(
        "storage: {} (schema v{})",
        if report.storage_enabled { "enabled" } else { "disabled" },
        report.schema_version
    );
    println!(
        "cache: {} entries, {} bytes, session {}/{} hit/miss, lifetime {}/{}",
        report.cache.entries,
        report.cache.total_bytes,
        report.cache.session_hits,
        report.cache.session_misses,
        report.cache.lifetime_hits,
        report.cache.lifetime_misses
    );
    if let Some(today) = &report.usage_today {
        println!(
            "today: {} requests ({} cached), {:.6} EUR",
            today.requests, today.cache_hits, today.cost_eur
        );
    }
    for backend in &report.backends {
        println!(
            "  {:<12} {:<9} breaker={}",
            backend.name,
            availability_label(backend.available),
            backend.breaker_state
        );
    }
    0
}

async fn backends(config: Config) -> i32 {
    let claudette = match Claudette::new(config) {
        Ok(claudette) => claudette,
        Err(e) => return report_error(&e),
    };
    claudette.probe_backends().await;
    let report = claudette.get_status().await;
    claudette.cleanup().await;

    for backend in &report.backends {
        println!(
            "{} ({})\n  availability: {}\n  breaker: {}\n  requests: {} ({:.6} EUR total)",
            backend.name,
            backend.model,
            availability_label(backend.available),
            backend.breaker_state,
            backend.total_requests,
            backend.total_cost_eur,
        );
        if let (Some(latency), Some(success), Some(quality)) = (
            backend.avg_latency_ms,
            backend.success_rate,
            backend.quality_score,
        ) {
            println!(
                "  rolling: latency {latency:.0} ms, success {:.0}%, quality {:.2}",
                success * 100.0,
                quality
            );
        }
    }
    0
}

async fn cache(config: Config, op: CacheOp) -> i32 {
    let claudette = match Claudette::new(config) {
        Ok(claudette) => claudette,
        Err(e) => return report_error(&e),
    };
    let code = match op {
        CacheOp::Stats => {
            let report = claudette.get_status().await;
            println!(
                "entries: {}\nbytes: {}\nsession hits/misses: {}/{}\nlifetime hits/misses: {}/{}",
                report.cache.entries,
                report.cache.total_bytes,
                report.cache.session_hits,
                report.cache.session_misses,
                report.cache.lifetime_hits,
                report.cache.lifetime_misses
            );
            0
        }
        CacheOp::Clear { force } => {
            if !force && !confirm("Clear every cached response?") {
                eprintln!("aborted");
                1
            } else {
                match claudette.cache().clear().await {
                    Ok(removed) => {
                        println!("removed {removed} cache entries");
                        0
                    }
                    Err(e) => {
                        eprintln!("error[CACHE_UNAVAILABLE]: {e}");
                        1
                    }
                }
            }
        }
    };
    claudette.cleanup().await;
    code
}

async fn api_keys(config: Config, op: KeyOp) -> i32 {
    match op {
        KeyOp::List => {
            for (name, backend) in &config.backends {
                match &backend.api_key_ref {
                    Some(var) => {
                        let value = std::env::var(var).ok().filter(|v| !v.is_empty());
                        let state = match value {
                            Some(v) => format!("set ({})", mask_secret(&v)),
                            None => "missing".to_string(),
                        };
                        println!("{name:<12} {var:<22} {state}");
                    }
                    None => println!("{name:<12} (no key required)"),
                }
            }
            0
        }
        KeyOp::Test { backend } => {
            let claudette = match Claudette::new(config) {
                Ok(claudette) => claudette,
                Err(e) => return report_error(&e),
            };
            let result = match claudette.router().registry().get(&backend) {
                None => {
                    eprintln!("error[INVALID_INPUT]: backend {backend:?} is not configured");
                    2
                }
                Some(b) => {
                    if b.is_available(Duration::from_secs(10)).await {
                        println!("{backend}: reachable, credentials accepted");
                        0
                    } else {
                        eprintln!("{backend}: unreachable or credentials rejected");
                        3
                    }
                }
            };
            claudette.cleanup().await;
            result
        }
        KeyOp::Add { backend } | KeyOp::Remove { backend } => {
            match config.backends.get(&backend).and_then(|b| b.api_key_ref.as_deref()) {
                Some(var) => println!(
                    "Keys are managed by your credential store; export or unset {var} \
                     (e.g. in your shell profile), then verify with `claudette api-keys test {backend}`."
                ),
                None => println!("backend {backend:?} does not use an API key"),
            }
            0
        }
        KeyOp::Guide { backend } => {
            print_key_guide(&backend);
            0
        }
    }
}

fn show_config(config: &Config) -> i32 {
    match serde_json::to_string_pretty(&config.masked_view()) {
        Ok(rendered) => {
            println!("{rendered}");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

fn print_key_guide(backend: &str) {
    match backend {
        "openai" => println!(
            "OpenAI: create a key at platform.openai.com/api-keys and export OPENAI_API_KEY."
        ),
        "claude" => println!(
            "Anthropic: create a key at console.anthropic.com and export ANTHROPIC_API_KEY."
        ),
        "qwen" => println!(
            "Qwen: create a DashScope key in the Alibaba Cloud console and export DASHSCOPE_API_KEY."
        ),
        "ollama" => println!("Ollama runs locally and needs no key; install it from ollama.com."),
        other => println!(
            "No guide for {other:?}; set the backend's api_key_ref variable in the configuration."
        ),
    }
}

fn availability_label(available: Option<bool>) -> &'static str {
    match available {
        Some(true) => "healthy",
        Some(false) => "unhealthy",
        None => "unknown",
    }
}

fn confirm(question: &str) -> bool {
    eprint!("{question} [y/N] ");
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn report_error(error: &ClaudetteError) -> i32 {
    eprintln!("error[{}]: {error}", error.code());
    if let ClaudetteError::AllBackendsFailed { attempts } = error {
        for attempt in attempts {
            eprintln!("  {}: {} ({})", attempt.backend, attempt.message, attempt.kind.code());
        }
    }
    error.exit_code()
}
