//! kbreason CLI
//!
//! Command-line entrypoint for:
//! - serving the knowledge base over HTTP (`serve`)
//! - one-off queries and term lookups (`ask`, `term`)
//! - checking that the configured `.kif` sources load (`check`)
//! - dumping the TPTP problem the prover receives (`export-tptp`)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use kbreason_kb::{
    encode, execute_query, lookup_term, KbManager, OntologyConfig, ResponseStatus, TimeBudget,
};
use kbreason_prover::{SolverLimits, VampireConfig, VampireProver};
use tracing_subscriber::EnvFilter;

mod server;

/// Path-separated list of `.kif` sources used when `--kif` is not given.
const KIF_ENV: &str = "KBREASON_KIF";
const PROVER_BIN_ENV: &str = "KBREASON_PROVER_BIN";

#[derive(Parser)]
#[command(name = "kbreason")]
#[command(
    author,
    version,
    about = "kbreason: SUO-KIF knowledge base queries answered by an external TPTP prover"
)]
struct Cli {
    /// Log level when `RUST_LOG` is unset (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve `/init`, `/reset`, `/ask`, `/tell` and `/term` over HTTP.
    Serve(ServeArgs),

    /// Run one query and print the JSON response.
    Ask {
        #[command(flatten)]
        kb: KbArgs,
        /// SUO-KIF query, e.g. `(subclass ?X Object)`.
        query: String,
        /// Time budget in seconds.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Print the transitive subclasses of a term as JSON.
    Term {
        #[command(flatten)]
        kb: KbArgs,
        term: String,
    },

    /// Load the configured sources and report what was read.
    Check {
        #[command(flatten)]
        kb: KbArgs,
    },

    /// Write the TPTP axioms handed to the prover.
    ExportTptp {
        #[command(flatten)]
        kb: KbArgs,
        /// Output file (stdout when omitted).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct KbArgs {
    /// SUO-KIF file or directory (repeatable). Falls back to `KBREASON_KIF`.
    #[arg(long = "kif", value_name = "PATH")]
    kif: Vec<PathBuf>,

    /// Knowledge base name; also used in TPTP formula names.
    #[arg(long, default_value = "SUMO")]
    kb_name: String,

    /// Prover binary. Falls back to `KBREASON_PROVER_BIN`, then `vampire` on `PATH`.
    #[arg(long)]
    prover_bin: Option<PathBuf>,

    /// Prover flag (repeatable); replaces the default Vampire flags.
    #[arg(long = "prover-arg", value_name = "ARG", allow_hyphen_values = true)]
    prover_arg: Vec<String>,

    /// Maximum answer tuples read from one prover run.
    #[arg(long, default_value_t = 10)]
    answer_limit: usize,

    /// Directory for per-query problem files (system temp dir by default).
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    #[command(flatten)]
    kb: KbArgs,

    /// Listen address (use `127.0.0.1:0` to auto-pick a free port).
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// If set, write a small JSON file once the server is listening.
    #[arg(long)]
    ready_file: Option<PathBuf>,

    /// Load the knowledge base before accepting connections instead of on `/init`.
    #[arg(long)]
    eager_init: bool,
}

fn resolve_kif_sources(args: &KbArgs) -> Vec<PathBuf> {
    if !args.kif.is_empty() {
        return args.kif.clone();
    }
    match std::env::var_os(KIF_ENV) {
        Some(value) => std::env::split_paths(&value)
            .filter(|p| !p.as_os_str().is_empty())
            .collect(),
        None => Vec::new(),
    }
}

fn resolve_prover_bin(args: &KbArgs) -> PathBuf {
    if let Some(p) = args.prover_bin.as_ref() {
        return p.clone();
    }
    if let Ok(p) = std::env::var(PROVER_BIN_ENV) {
        let p = p.trim();
        if !p.is_empty() {
            return PathBuf::from(p);
        }
    }

    // Prefer a prover colocated next to the running binary.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("vampire");
            if candidate.exists() {
                return candidate;
            }
        }
    }

    PathBuf::from("vampire")
}

fn solver_limits(args: &KbArgs) -> Result<SolverLimits> {
    if args.answer_limit == 0 {
        return Err(anyhow!("--answer-limit must be at least 1"));
    }
    Ok(SolverLimits {
        answer_limit: args.answer_limit,
    })
}

fn build_manager(args: &KbArgs) -> Result<Arc<KbManager>> {
    let sources = resolve_kif_sources(args);
    if sources.is_empty() {
        tracing::warn!("no .kif sources configured (pass --kif or set {KIF_ENV})");
    }
    let mut ontology = OntologyConfig::new(args.kb_name.clone());
    ontology.sources = sources;

    let work_dir = args.work_dir.clone().unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&work_dir)
        .map_err(|e| anyhow!("failed to create work dir {}: {e}", work_dir.display()))?;

    let mut vampire = VampireConfig::new(resolve_prover_bin(args), work_dir);
    if !args.prover_arg.is_empty() {
        vampire.args = args.prover_arg.clone();
    }
    tracing::debug!(program = %vampire.program.display(), args = ?vampire.args, "prover configured");

    Ok(Arc::new(KbManager::new(
        ontology,
        Arc::new(VampireProver::new(vampire)),
    )))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| anyhow!("invalid --log-level `{level}`: {e}"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve(args) => {
            let manager = build_manager(&args.kb)?;
            let config = server::ServerConfig {
                listen: args.listen,
                ready_file: args.ready_file.clone(),
                eager_init: args.eager_init,
                limits: solver_limits(&args.kb)?,
            };
            runtime()?.block_on(server::serve(config, manager))?;
        }
        Commands::Ask { kb, query, timeout } => cmd_ask(&kb, &query, timeout)?,
        Commands::Term { kb, term } => cmd_term(&kb, &term)?,
        Commands::Check { kb } => cmd_check(&kb)?,
        Commands::ExportTptp { kb, out } => cmd_export_tptp(&kb, out.as_ref())?,
    }

    Ok(())
}

fn cmd_ask(args: &KbArgs, query: &str, timeout: u64) -> Result<()> {
    let budget =
        TimeBudget::from_secs(timeout).ok_or_else(|| anyhow!("--timeout must be at least 1 second"))?;
    let limits = solver_limits(args)?;
    let manager = build_manager(args)?;

    let encoded = runtime()?.block_on(async {
        let kb = manager.kb().await?;
        Ok::<_, anyhow::Error>(encode(&execute_query(kb.as_ref(), query, budget, limits).await))
    })?;

    println!("{}", encoded.body);
    match encoded.status {
        ResponseStatus::Ok => Ok(()),
        ResponseStatus::ServerError => Err(anyhow!("query did not succeed")),
    }
}

fn cmd_term(args: &KbArgs, term: &str) -> Result<()> {
    let manager = build_manager(args)?;
    let kb = runtime()?.block_on(manager.kb())?;
    let children = lookup_term(kb.as_ref(), term)?;
    println!("{}", serde_json::to_string(&children)?);
    Ok(())
}

fn cmd_check(args: &KbArgs) -> Result<()> {
    let manager = build_manager(args)?;
    let kb = runtime()?.block_on(manager.kb())?;
    let artifact = kb.artifact();
    let status = kb.status();
    eprintln!(
        "{} loaded {} (statements={} user={} untranslatable={} terms={} axioms={})",
        "ok".green().bold(),
        status.name,
        status.statements,
        status.user_statements,
        status.untranslatable,
        status.terms,
        artifact.axioms
    );
    println!("{}", artifact.digest);
    Ok(())
}

fn cmd_export_tptp(args: &KbArgs, out: Option<&PathBuf>) -> Result<()> {
    let manager = build_manager(args)?;
    let kb = runtime()?.block_on(manager.kb())?;
    let artifact = kb.artifact();
    match out {
        Some(path) => {
            std::fs::write(path, artifact.tptp.as_bytes())
                .map_err(|e| anyhow!("failed to write {}: {e}", path.display()))?;
            eprintln!(
                "{} {} ({} axioms)",
                "wrote".green().bold(),
                path.display().to_string().bold(),
                artifact.axioms
            );
        }
        None => print!("{}", artifact.tptp),
    }
    Ok(())
}
