//! `motus-cli` – Motus Command Line Interface
//!
//! This binary wires the whole stack together and acts as its UI channel.
//! It:
//!
//! 1. Loads `~/.motus/config.toml` (defaults plus `MOTUS_*` environment
//!    overrides when the file is absent).
//! 2. Builds the simulated robot (UR10e arm, three-finger gripper,
//!    differential base) and checks it against the expected device manifest.
//! 3. Runs the simulation loop on its own thread; it is the only place the
//!    simulation clock advances.
//! 4. Serves the text [`Controller`] on a tokio runtime.
//! 5. Drops the user into an **interactive REPL**; plain lines are
//!    instructions, slash-commands are local (`/status`, `/stop`, `/help`).
//! 6. On `/quit` lets the in-flight command finish, then holds every
//!    actuator.  **Ctrl-C** stops the simulation loop at once with an
//!    emergency hold.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use motus_hal::SimWorld;
use motus_hal::sim::GRIPPER_FINGERS;
use motus_runtime::translator::translator_from_config;
use motus_runtime::{
    ActuationScheduler, Controller, PlanExpander, SimDriver, command_queue, init_tracing,
};

/// Inbound lines buffered ahead of the controller.
const INBOUND_CAPACITY: usize = 16;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); MOTUS_LOG_FORMAT=json switches to
    // newline-delimited JSON.  User-facing output still uses println!.
    let _telemetry = init_tracing("motus");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(c)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            c
        }
        Ok(None) => {
            println!(
                "  No config at {}; using defaults. Type {} to create one.",
                config::config_path().display().to_string().dimmed(),
                "/settings".bold().cyan()
            );
            config::from_env()
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::from_env()
        }
    };
    info!(config = ?cfg, "configuration resolved");

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    // Finish the in-flight command, then hold and stop.
    let drain = Arc::new(AtomicBool::new(false));
    // Set by the simulation thread once actuators are held.
    let halted = Arc::new(AtomicBool::new(false));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    {
        let shutdown = shutdown.clone();
        let halted = halted.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – stopping all actuators …".yellow().bold());
            shutdown.store(true, Ordering::SeqCst);

            // The REPL may be blocked on stdin; give the simulation thread a
            // moment to hold everything, then leave.
            let deadline = Instant::now() + Duration::from_millis(500);
            while !halted.load(Ordering::SeqCst) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if halted.load(Ordering::SeqCst) {
                println!("{}", "  ✓ Actuators held.".green());
            } else {
                println!("{}", "  ✗ Simulation loop did not confirm the stop.".red());
            }
            println!("{}", "  ✓ Exiting Motus.".green());
            std::process::exit(130);
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not hold actuators");
        }
    }

    // ── Simulated robot ───────────────────────────────────────────────────
    let mut builder = SimWorld::builder(cfg.timestep_ms)
        .with_ur10e_arm()
        .with_three_finger_gripper()
        .with_differential_base();
    if let Some(contact_at) = cfg.contact_at {
        builder = builder.with_touch_sensor(config::TOUCH_SENSOR, GRIPPER_FINGERS[0], contact_at);
    }
    let (world, registry) = builder.build();

    let missing = registry.missing(&cfg.manifest());
    if missing.is_empty() {
        println!("  {} All devices present.", "✓".green().bold());
    } else {
        for id in &missing {
            warn!(device = %id, "expected device missing; commands naming it will skip it");
        }
        println!(
            "  {} Missing devices: {}",
            "⚠".yellow().bold(),
            missing.join(", ").yellow()
        );
    }

    let expander = PlanExpander::new(cfg.expander_config(), registry.limits_table());
    let (queue, commands) = command_queue();
    let scheduler = ActuationScheduler::new(registry, commands, cfg.scheduler_config());
    let status = scheduler.subscribe();
    let mut driver = SimDriver::new(world, scheduler, cfg.driver_config());

    // ── Simulation loop ───────────────────────────────────────────────────
    let sim = {
        let shutdown = shutdown.clone();
        let drain = drain.clone();
        let halted = halted.clone();
        thread::Builder::new().name("motus-sim".to_string()).spawn(move || {
            let summary = driver.run(&shutdown, &drain);
            halted.store(true, Ordering::SeqCst);
            summary
        })
    };
    let sim = match sim {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start simulation thread");
            eprintln!("{}: {}", "Cannot start simulation".red(), e);
            std::process::exit(1);
        }
    };

    // ── Controller ────────────────────────────────────────────────────────
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            shutdown.store(true, Ordering::SeqCst);
            let _ = sim.join();
            std::process::exit(1);
        }
    };
    let translator = translator_from_config(cfg.translator_config());
    let controller = Controller::new(translator, expander, queue.clone(), status.clone());
    let (inbound, inbound_rx) = tokio::sync::mpsc::channel(INBOUND_CAPACITY);
    runtime.spawn(controller.serve(inbound_rx));

    println!(
        "  Simulation running at {} ms per tick ({} profile).",
        cfg.timestep_ms.to_string().yellow(),
        cfg.profile.to_string().yellow()
    );
    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    let session = repl::Session {
        runtime: &runtime,
        inbound,
        queue,
        status,
    };
    repl::run(session, shutdown.clone());

    if !shutdown.load(Ordering::SeqCst) {
        println!("  Finishing the in-flight command (Ctrl-C to abort) …");
        drain.store(true, Ordering::SeqCst);
    }
    match sim.join() {
        Ok(summary) => {
            if summary.drained {
                println!("  {} Actuators held.", "✓".green().bold());
            }
            println!(
                "  Ran {} ticks, {} commands completed ({} failed).",
                summary.ticks, summary.completed, summary.failures
            );
        }
        Err(_) => error!("simulation thread panicked"),
    }
    runtime.shutdown_timeout(Duration::from_secs(1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  __  __       _             "#.bold().cyan());
    println!("{}", r#" |  \/  | ___ | |_ _   _ ___ "#.bold().cyan());
    println!("{}", r#" | |\/| |/ _ \| __| | | / __|"#.bold().cyan());
    println!("{}", r#" | |  | | (_) | |_| |_| \__ \"#.bold().cyan());
    println!("{}", r#" |_|  |_|\___/ \__|\__,_|___/"#.bold().cyan());
    println!();
    println!(
        "  {} v{}",
        "Motus actuation console".bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();
}
