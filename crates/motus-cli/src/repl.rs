//! REPL – the interactive console, acting as the UI channel.
//!
//! Plain text lines go to the [`Controller`](motus_runtime::Controller) and
//! its reply is printed.  Supported slash-commands:
//!   /help         – show this list
//!   /status       – current scheduler snapshot
//!   /stop         – queue a Stop (hold every actuator)
//!   /presets      – list the named arm poses
//!   /settings     – interactively edit `~/.motus/config.toml`
//!   /quit | /exit – finish the in-flight command, then exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use motus_runtime::presets::PRESETS;
use motus_runtime::{CommandSender, ExecutionSnapshot, Inbound, MotionProfile};
use motus_types::Command;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::{self, Config};

/// How long the prompt waits for a reply before printing it in the
/// background instead.
const REPLY_WAIT: Duration = Duration::from_millis(300);

/// Handles the REPL needs to talk to the rest of the stack.
pub struct Session<'a> {
    pub runtime: &'a Runtime,
    pub inbound: mpsc::Sender<Inbound>,
    pub queue: CommandSender,
    pub status: watch::Receiver<ExecutionSnapshot>,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
/// Returning on `/quit` or end of input leaves the shutdown decision to the
/// caller.
pub fn run(session: Session<'_>, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "motus>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }

        match cmd {
            "/help" => cmd_help(),
            "/status" => cmd_status(&session),
            "/stop" => cmd_stop(&session),
            "/presets" => cmd_presets(),
            "/settings" => cmd_settings(),
            "/quit" | "/exit" => {
                println!("{}", "Goodbye.".green());
                break;
            }
            other if other.starts_with('/') => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
            text => match send(&session, text) {
                Some(Reply::Now(reply)) => print_reply(&reply),
                Some(Reply::Later(pending)) => {
                    println!("  {}", "Translating; the reply will follow.".dimmed());
                    session.runtime.spawn(async move {
                        if let Ok(reply) = pending.await {
                            println!();
                            print_reply(&reply);
                        }
                    });
                }
                None => println!("{}", "Controller is not running.".red()),
            },
        }
    }
}

enum Reply {
    Now(String),
    /// Still translating; the prompt comes back before the reply.
    Later(oneshot::Receiver<String>),
}

/// Hand one line to the controller and wait briefly for its reply.
fn send(session: &Session<'_>, text: &str) -> Option<Reply> {
    let (reply_tx, mut reply_rx) = oneshot::channel();
    let msg = Inbound {
        text: text.to_string(),
        reply: reply_tx,
    };
    let arrived = session.runtime.block_on(async {
        session.inbound.send(msg).await.ok()?;
        Some(tokio::time::timeout(REPLY_WAIT, &mut reply_rx).await)
    })?;
    match arrived {
        Ok(reply) => reply.ok().map(Reply::Now),
        Err(_) => Some(Reply::Later(reply_rx)),
    }
}

fn print_reply(reply: &str) {
    println!("  {}", render_reply(reply).replace('\n', "\n  "));
}

/// Undo the HTML escaping of a reply for terminal display.
pub(crate) fn render_reply(reply: &str) -> String {
    reply
        .replace("<br>", "\n")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Motus Commands".bold().underline());
    println!("  {}    – current scheduler state", "/status".bold().cyan());
    println!("  {}      – stop and hold every actuator", "/stop".bold().cyan());
    println!("  {}   – list named arm poses", "/presets".bold().cyan());
    println!("  {}  – edit ~/.motus/config.toml settings", "/settings".bold().cyan());
    println!("  {}  – finish the current command and exit", "/quit  /exit".bold().cyan());
    println!();
    println!("  Anything else is an instruction, for example:");
    println!("    {}", "forward 0.5 2".yellow());
    println!("    {}", "close gripper".yellow());
    println!("    {}", "lift the arm, then open the gripper".yellow());
    println!();
}

fn cmd_status(session: &Session<'_>) {
    let snapshot = session.status.borrow().clone();
    println!("{}", "Scheduler".bold().underline());
    println!("  State     : {}", snapshot.state.to_string().yellow());
    println!("  Tick      : {}", snapshot.tick);
    if let (Some(kind), Some(id)) = (snapshot.command_kind, snapshot.command_id) {
        println!(
            "  Executing : {} {} ({} ticks)",
            kind,
            id.to_string().dimmed(),
            snapshot.elapsed_ticks
        );
    }
    println!("  Queued    : {}", snapshot.queue_depth);
    println!(
        "  Completed : {} ({} failed)",
        snapshot.completed,
        if snapshot.failures > 0 {
            snapshot.failures.to_string().red()
        } else {
            snapshot.failures.to_string().green()
        }
    );
    if let Some(report) = &snapshot.last_report {
        println!(
            "  Last      : {} {:?} after {} ticks at {}",
            report.kind,
            report.outcome,
            report.ticks,
            report.finished_at.format("%H:%M:%S%.3f")
        );
    }
}

fn cmd_stop(session: &Session<'_>) {
    session.queue.enqueue(Command::stop());
    println!("  {} Stop queued (queue depth {}).", "✓".green().bold(), session.queue.len());
}

fn cmd_presets() {
    println!("{}", "Presets".bold().underline());
    for preset in &PRESETS {
        let targets = preset
            .targets()
            .iter()
            .map(|(joint, angle)| format!("{joint}={angle:.2}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {:<6} {}", preset.name.bold().cyan(), targets.dimmed());
    }
}

fn cmd_settings() {
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
    cfg.llm_url = prompt_str(&format!("  Model endpoint [{}]: ", cfg.llm_url), &cfg.llm_url);
    cfg.model = prompt_str(&format!("  Model name [{}]: ", cfg.model), &cfg.model);

    let key_hint = if cfg.api_key.is_empty() { "not set" } else { "set" };
    let key = prompt_str(&format!("  API key [{key_hint}]: "), "");
    if !key.is_empty() {
        cfg.api_key = key;
    }

    let profile = prompt_str(
        &format!("  Motion profile, standard or fast [{}]: ", cfg.profile),
        "",
    );
    if !profile.is_empty() {
        match profile.parse::<MotionProfile>() {
            Ok(p) => cfg.profile = p,
            Err(e) => println!("  {} {}, keeping {}", "Warning:".yellow(), e, cfg.profile),
        }
    }

    let step = prompt_str(&format!("  Timestep ms [{}]: ", cfg.timestep_ms), "");
    if !step.is_empty() {
        match step.parse::<u64>() {
            Ok(ms) if ms > 0 => cfg.timestep_ms = ms,
            _ => println!(
                "  {} '{}' is not a valid timestep, keeping {}",
                "Warning:".yellow(),
                step,
                cfg.timestep_ms
            ),
        }
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Saved to {}. Changes apply on next start.",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}
