//! REPL – Read-Eval-Print Loop for the Reverie interactive shell.
//!
//! Supported slash-commands:
//!   /remember <text>  – store text as a new memory
//!   /recall <cue>     – find memories similar to the cue
//!   /forget <id>      – send a memory to compost
//!   /cherish <id>     – protect a memory forever
//!   /consolidate      – run one sleep cycle now
//!   /wake             – pull every dreaming memory back to dormant
//!   /status           – lifecycle counts and averages
//!   /list <state>     – memories in one lifecycle state
//!   /import <file>    – apply a JSON-lines feed of events
//!   /settings         – edit `~/.reverie/config.toml`
//!   /help             – show this list
//!   /quit | /exit     – save and exit

use colored::Colorize;
use reverie_memory::feed::{ChannelFeed, FeedEvent, FeedStats, run_feed};
use reverie_memory::{AssociativeMemory, RecallHit};
use reverie_types::{ConsolidationReport, Content, DatumId, Lifecycle, Memory, MemoryStatus, Metadata};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;

use crate::config::{self, Config, EmbedderKind};

const PREVIEW_CHARS: usize = 60;
const LIST_USAGE: &str = "/list <active|dormant|dreaming|composting>";

/// Everything a command needs to act on the memory.
pub struct Session {
    pub memory: Arc<AssociativeMemory>,
    pub runtime: Handle,
    pub config: Config,
}

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Remember(String),
    Recall(String),
    Forget(DatumId),
    Cherish(DatumId),
    Consolidate,
    Wake,
    Status,
    List(Lifecycle),
    Import(PathBuf),
    Settings,
    Help,
    Quit,
    /// A known command with missing or invalid arguments.
    Usage(&'static str),
    Unknown(String),
}

/// Parse one input line.  `None` for a blank line.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (line, ""),
    };
    let needs = |usage: &'static str, build: fn(&str) -> Command| {
        if rest.is_empty() { Command::Usage(usage) } else { build(rest) }
    };
    let cmd = match head {
        "/remember" => needs("/remember <text>", |r| Command::Remember(r.to_string())),
        "/recall" => needs("/recall <cue>", |r| Command::Recall(r.to_string())),
        "/forget" => needs("/forget <id>", |r| Command::Forget(DatumId::from(r))),
        "/cherish" => needs("/cherish <id>", |r| Command::Cherish(DatumId::from(r))),
        "/import" => needs("/import <file>", |r| Command::Import(PathBuf::from(r))),
        "/list" => match rest.parse::<Lifecycle>() {
            Ok(state) => Command::List(state),
            Err(_) => Command::Usage(LIST_USAGE),
        },
        "/consolidate" => Command::Consolidate,
        "/wake" => Command::Wake,
        "/status" => Command::Status,
        "/settings" => Command::Settings,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(cmd)
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(session: &Session, shutdown: Arc<AtomicBool>) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };
    let history = config::history_path();
    let _ = rl.load_history(&history);
    let prompt = format!("{} ", "reverie>".bold().cyan());

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        let Some(cmd) = parse(&line) else {
            continue;
        };
        let _ = rl.add_history_entry(line.trim());

        match cmd {
            Command::Remember(text) => cmd_remember(session, text),
            Command::Recall(cue) => cmd_recall(session, cue),
            Command::Forget(id) => cmd_forget(session, &id),
            Command::Cherish(id) => cmd_cherish(session, &id),
            Command::Consolidate => cmd_consolidate(session),
            Command::Wake => cmd_wake(session),
            Command::Status => cmd_status(session),
            Command::List(state) => cmd_list(session, state),
            Command::Import(path) => cmd_import(session, &path),
            Command::Settings => cmd_settings(&mut rl),
            Command::Help => cmd_help(),
            Command::Quit => {
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Command::Usage(usage) => println!("{} {}", "Usage:".yellow(), usage.bold()),
            Command::Unknown(other) => println!(
                "{} '{}'. Type {} for available commands.",
                "Unknown command:".red(),
                other.yellow(),
                "/help".bold()
            ),
        }
    }

    if let Some(parent) = history.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = rl.save_history(&history);
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Reverie Commands".bold().underline());
    let rows = [
        ("/remember <text>", "store text as a new memory"),
        ("/recall <cue>", "find memories similar to the cue"),
        ("/forget <id>", "send a memory to compost"),
        ("/cherish <id>", "protect a memory forever"),
        ("/consolidate", "run one sleep cycle now"),
        ("/wake", "pull dreaming memories back to dormant"),
        ("/status", "lifecycle counts and averages"),
        (LIST_USAGE, "memories in one state"),
        ("/import <file>", "apply a JSON-lines event feed"),
        ("/settings", "edit ~/.reverie/config.toml"),
        ("/quit  /exit", "save the index and exit"),
    ];
    for (cmd, what) in rows {
        println!("  {:<44} – {}", cmd.bold().cyan(), what);
    }
    println!();
}

fn cmd_remember(session: &Session, text: String) {
    match session
        .runtime
        .block_on(session.memory.remember(text, None, Metadata::new()))
    {
        Ok(id) => println!("{} {}", "✓ Remembered".green(), id.to_string().bold()),
        Err(e) => println!("{}: {}", "Remember failed".red(), e),
    }
}

fn cmd_recall(session: &Session, cue: String) {
    let cfg = &session.config;
    let hits = match session.runtime.block_on(session.memory.recall(
        cue,
        cfg.recall_limit,
        cfg.recall_threshold,
    )) {
        Ok(hits) => hits,
        Err(e) => {
            println!("{}: {}", "Recall failed".red(), e);
            return;
        }
    };
    if hits.is_empty() {
        println!(
            "  {}",
            format!("Nothing above similarity {:.2}.", cfg.recall_threshold).dimmed()
        );
        return;
    }
    for hit in &hits {
        print_hit(hit);
    }
}

fn print_hit(hit: &RecallHit) {
    println!(
        "  {}  {}  {}",
        format!("{:.3}", hit.similarity).green(),
        hit.memory.datum_id().to_string().bold(),
        preview(hit.content.as_ref()).dimmed()
    );
}

fn cmd_forget(session: &Session, id: &DatumId) {
    if session.runtime.block_on(session.memory.forget(id)) {
        println!("{} {}", "✓ Composting".green(), id.to_string().bold());
    } else {
        println!(
            "{} '{}' is unknown or cherished.",
            "Not forgotten:".yellow(),
            id.to_string().bold()
        );
    }
}

fn cmd_cherish(session: &Session, id: &DatumId) {
    if session.runtime.block_on(session.memory.cherish(id)) {
        println!("{} {}", "✓ Cherished".green(), id.to_string().bold());
    } else {
        println!("{} '{}'", "Unknown memory:".red(), id.to_string().yellow());
    }
}

fn cmd_consolidate(session: &Session) {
    let report = session.runtime.block_on(session.memory.consolidate());
    print_report(&report);
}

fn print_report(report: &ConsolidationReport) {
    println!("{}", "Consolidation".bold().underline());
    println!("  dreamed      : {}", report.dreaming_count);
    println!("  demoted      : {}", report.demoted_count);
    println!("  merged       : {}", report.merged_count);
    println!("  strengthened : {}", report.strengthened_count);
    println!("  degraded     : {}", report.degraded_count);
    println!("  woke         : {}", report.woken_count);
    println!(
        "  took         : {}",
        format!("{} ms", report.duration.as_millis()).dimmed()
    );
}

fn cmd_wake(session: &Session) {
    let woken = session.runtime.block_on(session.memory.wake());
    println!("{} {} memory(ies) woken", "✓".green(), woken);
}

fn cmd_status(session: &Session) {
    let status = session.runtime.block_on(session.memory.status());
    print_status(&status);
}

fn print_status(status: &MemoryStatus) {
    println!("{}", "Memory Status".bold().underline());
    println!("  total      : {}", status.total.to_string().bold());
    for state in reverie_types::lifecycle::ALL_STATES {
        println!("  {:<10} : {}", state.as_str(), status.count(state));
    }
    println!("  cherished  : {}", status.cherished);
    println!("  resolution : {:.3} avg", status.average_resolution);
    println!("  relevance  : {:.3} avg", status.average_relevance);
    if status.is_consolidating {
        println!("  {}", "consolidation in progress".yellow());
    }
}

fn cmd_list(session: &Session, state: Lifecycle) {
    let memories = session.runtime.block_on(session.memory.by_lifecycle(state));
    if memories.is_empty() {
        println!("  {}", format!("No {state} memories.").dimmed());
        return;
    }
    for m in &memories {
        print_memory(m);
    }
}

fn print_memory(m: &Memory) {
    let marker = if m.is_cherished() { "♥" } else { " " };
    println!(
        "  {} {}  rel {:.2}  res {:.2}  hits {}",
        marker.red(),
        m.datum_id().to_string().bold(),
        m.relevance(),
        m.resolution(),
        m.access_count()
    );
}

fn cmd_import(session: &Session, path: &std::path::Path) {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            println!("{} {}: {}", "Cannot read".red(), path.display(), e);
            return;
        }
    };
    let (events, skipped) = parse_feed_lines(&raw);
    let stats = session.runtime.block_on(import(session.memory.clone(), events));
    println!(
        "{} {} remembered, {} applied, {} ignored, {} failed, {} unparseable",
        "✓ Imported:".green(),
        stats.remembered,
        stats.applied,
        stats.ignored,
        stats.failed,
        skipped
    );
}

async fn import(memory: Arc<AssociativeMemory>, events: Vec<FeedEvent>) -> FeedStats {
    let (tx, feed) = ChannelFeed::new(64);
    let producer = async move {
        for event in events {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    };
    let ((), stats) = tokio::join!(producer, run_feed(memory, &feed));
    stats
}

/// Parse a JSON-lines feed.  Blank lines and `#` comments are skipped;
/// returns the events and the number of lines that failed to parse.
pub fn parse_feed_lines(raw: &str) -> (Vec<FeedEvent>, usize) {
    let mut events = Vec::new();
    let mut bad = 0;
    for line in raw.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(event) => events.push(event),
            Err(_) => bad += 1,
        }
    }
    (events, bad)
}

fn cmd_settings(rl: &mut DefaultEditor) {
    let mut cfg = match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };

    println!("{}", "Settings Editor".bold().underline());
    println!("  (press Enter to keep the current value)");

    let kind = prompt_str(rl, &format!("  Embedder (hash/ollama) [{}]: ", cfg.embedder), &cfg.embedder.to_string());
    match kind.parse::<EmbedderKind>() {
        Ok(k) => cfg.embedder = k,
        Err(e) => println!("  {} {}, keeping {}", "Warning:".yellow(), e, cfg.embedder),
    }
    cfg.ollama_url = prompt_str(rl, &format!("  Ollama URL [{}]: ", cfg.ollama_url), &cfg.ollama_url);
    cfg.embedding_model = prompt_str(
        rl,
        &format!("  Embedding model [{}]: ", cfg.embedding_model),
        &cfg.embedding_model,
    );
    let shown = if cfg.store_path.is_empty() { "in-memory" } else { cfg.store_path.as_str() };
    let path = prompt_str(rl, &format!("  Content store file [{}]: ", shown), &cfg.store_path);
    cfg.store_path = if path == "in-memory" { String::new() } else { path };
    cfg.consolidation_interval_secs = prompt_parsed(
        rl,
        "  Consolidation interval (s)",
        cfg.consolidation_interval_secs,
    );
    cfg.idle_timeout_secs = prompt_parsed(rl, "  Idle timeout (s, 0 = never)", cfg.idle_timeout_secs);
    cfg.recall_limit = prompt_parsed(rl, "  Recall limit", cfg.recall_limit);
    cfg.recall_threshold = prompt_parsed(rl, "  Recall threshold", cfg.recall_threshold);

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold(),
            "(applied on next launch)".dimmed()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// First line of `content`, cut to [`PREVIEW_CHARS`] characters.
pub fn preview(content: Option<&Content>) -> String {
    let Some(content) = content else {
        return "<content unavailable>".to_string();
    };
    let text = content.to_text();
    let first = text.lines().next().unwrap_or("");
    if first.chars().count() > PREVIEW_CHARS {
        let cut: String = first.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        first.to_string()
    }
}

/// Prompt for a value.  Keeps `default` on Enter or on a parse failure.
fn prompt_parsed<T>(rl: &mut DefaultEditor, label: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    let raw = prompt_str(rl, &format!("{label} [{default}]: "), &default.to_string());
    match raw.parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            println!(
                "  {} '{}' is not valid here, keeping {}",
                "Warning:".yellow(),
                raw,
                default
            );
            default
        }
    }
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
fn prompt_str(rl: &mut DefaultEditor, msg: &str, default: &str) -> String {
    match rl.readline(msg) {
        Ok(line) => {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => default.to_string(),
    }
}
