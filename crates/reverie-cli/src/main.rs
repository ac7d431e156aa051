//! `reverie` – Reverie Command Line Interface
//!
//! 1. Checks for `~/.reverie/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Builds the content store and embedder the config asks for, falling back
//!    to the hash embedder when Ollama is unreachable.
//! 3. Restores the index snapshot from `~/.reverie/index.json` and starts the
//!    background consolidation scheduler.
//! 4. Drops the user into an **interactive REPL** (`/help` lists commands).
//! 5. Intercepts **Ctrl-C** to wake any dreaming memories, then saves the
//!    snapshot on the way out.  An unreadable snapshot is moved to
//!    `index.json.corrupt` at start-up rather than overwritten.

mod config;
mod ollama;
mod repl;
mod snapshot;
mod telemetry;

use colored::Colorize;
use reverie_memory::{
    AssociativeMemory, ConsolidationScheduler, ContentStore, Embedder, HashEmbedder,
    InMemoryStore, OllamaEmbedder, SqliteStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::config::{Config, EmbedderKind};

fn main() {
    let _telemetry = telemetry::init_tracing("reverie");

    print_banner();

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    // ── Collaborators ─────────────────────────────────────────────────────
    let store = match build_store(&cfg) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{}: {}", "Content store error".red(), e);
            std::process::exit(1);
        }
    };
    let embedder = build_embedder(&cfg);
    let memory = Arc::new(AssociativeMemory::with_config(
        store,
        embedder,
        cfg.consolidation.clone(),
    ));

    // ── Snapshot ──────────────────────────────────────────────────────────
    let index_path = config::index_path();
    let mut save_on_exit = true;
    match snapshot::load_from(&index_path) {
        Ok(Some(memories)) => {
            let count = memories.len();
            runtime.block_on(memory.restore(memories));
            println!("  Restored {} memories from {}", count.to_string().bold(), index_path.display());
        }
        Ok(None) => println!("  {}", "Starting with an empty index.".dimmed()),
        Err(e) => {
            println!("{}: {}", "Snapshot error".red(), e);
            match snapshot::quarantine(&index_path) {
                Ok(moved) => println!(
                    "  Starting with an empty index; the unreadable file was moved to {}",
                    moved.display().to_string().bold()
                ),
                Err(e) => {
                    warn!(error = %e, "snapshot quarantine failed; exit-time save disabled");
                    println!(
                        "  Starting with an empty index.  {} will not be overwritten on exit.",
                        index_path.display()
                    );
                    save_on_exit = false;
                }
            }
        }
    }

    // ── Background consolidation ──────────────────────────────────────────
    let scheduler = runtime.block_on(async {
        ConsolidationScheduler::spawn(memory.clone(), cfg.scheduler_config())
    });
    info!(
        interval_secs = cfg.consolidation_interval_secs,
        idle_timeout_secs = cfg.idle_timeout_secs,
        "scheduler running"
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // rustyline handles Ctrl-C at the prompt; this covers it mid-command.
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let memory_for_ctrlc = memory.clone();
    let handle = runtime.handle().clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – waking dreaming memories …".yellow().bold());
        let memory = memory_for_ctrlc.clone();
        handle.spawn(async move {
            memory.wake().await;
        });
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not wake dreaming memories");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let session = repl::Session {
        memory: memory.clone(),
        runtime: runtime.handle().clone(),
        config: cfg,
    };
    repl::run(&session, shutdown);

    // ── Shutdown ──────────────────────────────────────────────────────────
    let cycles = runtime.block_on(scheduler.shutdown());
    runtime.block_on(memory.wake());
    if save_on_exit {
        let memories = runtime.block_on(memory.snapshot());
        match snapshot::save_to(&memories, &index_path) {
            Ok(()) => println!(
                "{} {} memories saved to {}",
                "✓".green().bold(),
                memories.len(),
                index_path.display().to_string().bold()
            ),
            Err(e) => println!("{}: {}", "Error saving snapshot".red(), e),
        }
    }
    info!(background_cycles = cycles, "reverie exiting");
    println!("{}", "Goodbye.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators
// ─────────────────────────────────────────────────────────────────────────────

fn build_store(cfg: &Config) -> Result<Arc<dyn ContentStore>, String> {
    if cfg.store_path.is_empty() {
        println!("  Content store: {}", "in-memory (lost on exit)".yellow());
        return Ok(Arc::new(InMemoryStore::new()));
    }
    let store = SqliteStore::open(&cfg.store_path).map_err(|e| e.to_string())?;
    println!("  Content store: {}", cfg.store_path.bold());
    Ok(Arc::new(store))
}

fn build_embedder(cfg: &Config) -> Arc<dyn Embedder> {
    let hash = || -> Arc<dyn Embedder> { Arc::new(HashEmbedder::new(cfg.embedding_dimension)) };
    match cfg.embedder {
        EmbedderKind::Hash => {
            println!("  Embedder: {} ({} dims)", "hash".bold(), cfg.embedding_dimension);
            hash()
        }
        EmbedderKind::Ollama => {
            print!("  Probing Ollama at {} … ", cfg.ollama_url.dimmed());
            std::io::Write::flush(&mut std::io::stdout()).ok();
            match ollama::fetch_models(&cfg.ollama_url) {
                Ok(models) => {
                    println!("{} ({} model(s) available)", "online".green(), models.len());
                    if !ollama::has_model(&models, &cfg.embedding_model) {
                        println!(
                            "  {} '{}' is not pulled.  Run `{}`.",
                            "Warning:".yellow(),
                            cfg.embedding_model,
                            format!("ollama pull {}", cfg.embedding_model).bold()
                        );
                    }
                    println!("  Embedder: {}", cfg.embedding_model.bold());
                    Arc::new(OllamaEmbedder::new(&cfg.ollama_url, &cfg.embedding_model))
                }
                Err(e) => {
                    println!("{}", "offline".yellow());
                    warn!(error = %e, "falling back to the hash embedder");
                    println!(
                        "  {}  Using the hash embedder; run `{}` for semantic recall.",
                        "No Ollama instance detected.".dimmed(),
                        "ollama serve".bold()
                    );
                    hash()
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Reverie First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Reverie.\n");

    let mut cfg = Config::default();

    println!("  How should text be embedded?");
    println!("    1) Hash embedder  (default, offline, vocabulary overlap only)");
    println!("    2) Ollama model   (semantic, needs `ollama serve`)");
    if prompt_line("  Enter choice [1]: ", "1").trim() == "2" {
        cfg.embedder = EmbedderKind::Ollama;
        cfg.embedding_model = prompt_line(
            &format!("  Embedding model [{}]: ", cfg.embedding_model),
            &cfg.embedding_model,
        );
    }

    let path = prompt_line(
        "  SQLite file for content (empty keeps content in memory): ",
        "",
    );
    cfg.store_path = path.trim().to_string();

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___                  _     "#.bold().cyan());
    println!("{}", r#"  / _ \___ _  _____ ___(_)__  "#.bold().cyan());
    println!("{}", r#" / , _/ -_) |/ / -_) __/ / -_)"#.bold().cyan());
    println!("{}", r#"/_/|_|\__/|___/\__/_/ /_/\__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Reverie".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Associative memory that sleeps on it");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
