//! `strider` – headless control-loop runner.
//!
//! Wires the full stack against simulated boards and a simulated
//! policy session: loads (or defaults) the run configuration,
//! registers one mode, brings the boards up, then drives the
//! observe → build state → infer → dispatch tick at the configured
//! rate until Ctrl-C or a fatal signal.

mod config;

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colored::Colorize;
use serde_json::Value;
use tracing::{info, warn};

use strider_hal::{SafetyMonitor, SimBoard};
use strider_policy::sim::SimSessionLoader;
use strider_runtime::{ControlRate, Mode, ModeConfig, RlRuntime};
use strider_types::{obs_len, Command, ACTION_DIM};

fn main() {
    // Structured logging via RUST_LOG (defaults to "info"). Set
    // STRIDER_LOG_FORMAT=json for newline-delimited JSON suitable for
    // log aggregators. User-facing output stays on println!.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("STRIDER_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "Ctrl-C received, stopping the motors ...".yellow().bold());
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; use a fatal signal to stop");
    }

    if let Err(e) = run(&shutdown) {
        println!("{} {e}", "fatal:".red().bold());
        std::process::exit(1);
    }
    println!("{}", "Motors halted. Goodbye.".green());
}

fn run(shutdown: &AtomicBool) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load(&config::config_path())?;

    let mut mode_cfg = cfg.mode.clone();
    if mode_cfg.policy_path.is_none() {
        // Self-contained demo: the simulated session loader ignores
        // the file contents, but the path checks still apply.
        let path = std::env::temp_dir().join("strider-demo.onnx");
        fs::write(&path, b"simulated policy")?;
        mode_cfg.policy_path = Some(path);
    }

    let loader = SimSessionLoader::mlp(expected_state_len(&mode_cfg), ACTION_DIM);
    let mode = Mode::from_config(&mode_cfg, &loader)?;
    let mode_id = mode.id;
    let cmd_len = mode.cmd_vector_length;

    let mut runtime = RlRuntime::new();
    runtime.add_mode(mode);
    runtime.activate(mode_id);

    let mut monitor = SafetyMonitor::new(SimBoard::front(), SimBoard::rear());
    println!("  Waiting for motor boards ...");
    monitor.wait_ready(Duration::from_secs(cfg.startup_timeout_secs))?;
    monitor.set_gains(&cfg.kp, &cfg.kd)?;
    println!("  {} mode {mode_id} active at {} hz", "Running:".bold(), cfg.hz);

    let mut rate = ControlRate::new(cfg.hz)?;
    let command = Command {
        mode_id: None,
        cmd_vector: Some(vec![0.0; cmd_len]),
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            let signal = monitor.sleep_motors();
            info!(%signal, "shutdown complete");
            return Ok(());
        }

        let obs = monitor.check_safety()?;
        let state = runtime.build_state(&obs, &command, None)?;
        let action = runtime.select_action(&state)?;
        monitor.do_action(&action, cfg.torque_ctrl)?;
        rate.sleep();
    }
}

/// State length implied by a raw mode config, for sizing the
/// simulated policy session before validation runs.
fn expected_state_len(mode: &ModeConfig) -> usize {
    let cmd_len = mode
        .cmd_vector_length
        .as_ref()
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;
    let stack = mode
        .stack_size
        .as_ref()
        .and_then(Value::as_u64)
        .unwrap_or(1) as usize;
    let slot = |key: &String| {
        if key == "command" {
            cmd_len
        } else {
            obs_len(key).unwrap_or(0)
        }
    };
    let stacked: usize = mode.stacked_obs_order.iter().map(slot).sum();
    let tail: usize = mode.non_stacked_obs_order.iter().map(slot).sum();
    stacked * stack + tail
}

fn print_banner() {
    println!();
    println!("  {}", "strider control core".bold());
    println!("  {}", "wheeled-legged robot runtime".dimmed());
    println!();
}
