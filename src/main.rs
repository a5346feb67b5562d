//! Auto Angler - fishing mini-game automation
//!
//! Wires the background tasks together:
//! - memory poller publishing player snapshots
//! - window capture publishing frames
//! - the controller tick driving input
//! - the journal writer and status reporter
//!
//! Start/stop come from global hotkeys; Ctrl+C shuts everything down.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager};
use tokio::sync::{mpsc, watch};

use auto_angler::controller::Controller;
use auto_angler::input::EnigoInput;
use auto_angler::journal::{Journal, JournalMessage};
use auto_angler::memory::TargetProcessProvider;
use auto_angler::screen_reader::{FrameDetector, FrameProvider, FrameSlot};
use auto_angler::utils::bot_state::{summary_channel, AutomationToggle};
use auto_angler::utils::keybinds::hotkey_for;
use auto_angler::utils::path::{debug_log_dir, journal_dir};
use auto_angler::utils::settings::BotConfig;
use auto_angler::window::{focus_game_window, pump_messages};
use auto_angler::worker::{report_status, CaptureLoop, ControllerLoop, MemoryPoller, TaskGroup};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const JOURNAL_CAPACITY: usize = 64;
const PUMP_INTERVAL: Duration = Duration::from_millis(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn init_logging() {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // Keep external crates quiet unless RUST_LOG says otherwise
    const LOG_FILTER: &str = "info,auto_angler=info,mio=warn";

    let log_dir = debug_log_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file_path = log_dir.join("debug.log");
    let file_result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LOG_FILTER));

    match file_result {
        Ok(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE);

            let stdout_layer = tracing_subscriber::fmt::layer().with_span_events(FmtSpan::CLOSE);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(stdout_layer)
                .init();

            tracing::info!("[INIT] Logging initialized, file: {:?}", log_file_path);
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(LOG_FILTER))
                .init();
            eprintln!(
                "[INIT] Failed to create debug log file at {:?}: {}",
                log_file_path, e
            );
        }
    }
}

/// Flip automation on hotkey presses and record session boundaries
fn spawn_hotkey_listener(
    config: &BotConfig,
    toggle: AutomationToggle,
    journal: mpsc::Sender<JournalMessage>,
) -> anyhow::Result<GlobalHotKeyManager> {
    let manager = GlobalHotKeyManager::new().context("Failed to create hotkey manager")?;

    let start = hotkey_for(&config.keys.start_key)
        .with_context(|| format!("start key '{}' cannot be a hotkey", config.keys.start_key))?;
    let stop = hotkey_for(&config.keys.stop_key)
        .with_context(|| format!("stop key '{}' cannot be a hotkey", config.keys.stop_key))?;
    let (start_id, stop_id) = (start.id(), stop.id());
    for (name, hotkey) in [(&config.keys.start_key, start), (&config.keys.stop_key, stop)] {
        if let Err(e) = manager.register(hotkey) {
            tracing::warn!("[INIT] Failed to register hotkey {}: {}", name, e);
        }
    }
    println!("Hotkeys: START={}, STOP={}", config.keys.start_key, config.keys.stop_key);

    let title = config.window.title.clone();
    thread::spawn(move || {
        let receiver = GlobalHotKeyEvent::receiver();
        while let Ok(event) = receiver.recv() {
            let message = if event.id == start_id {
                if toggle.set(true) {
                    continue;
                }
                tracing::info!("[HOTKEY] Automation started");
                focus_game_window(&title);
                JournalMessage::SessionStarted
            } else if event.id == stop_id {
                if !toggle.set(false) {
                    continue;
                }
                tracing::info!("[HOTKEY] Automation stopped");
                JournalMessage::SessionStopped
            } else {
                continue;
            };
            if let Err(e) = journal.try_send(message) {
                tracing::warn!("[JOURNAL] Dropped session marker: {}", e);
            }
        }
    });

    Ok(manager)
}

fn main() -> anyhow::Result<()> {
    init_logging();

    println!("Auto Angler {}", APP_VERSION);
    println!("================================");

    let config = BotConfig::load_or_default();
    let detector = FrameDetector::load(config.detection.clone(), &BotConfig::reference_dir());
    let input = EnigoInput::new().context("Failed to initialize input simulation")?;

    let toggle = AutomationToggle::new();
    let (journal_tx, journal_rx) = mpsc::channel(JOURNAL_CAPACITY);
    // Hotkey events are delivered to the thread that owns the manager
    let _manager = spawn_hotkey_listener(&config, toggle.clone(), journal_tx.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (snapshot_tx, snapshot_rx) = watch::channel(None);
    let (window_tx, window_rx) = watch::channel(None);
    let (summary_tx, summary_rx) = summary_channel();
    let slot = Arc::new(FrameSlot::new());

    let poller = MemoryPoller::new(
        Arc::new(TargetProcessProvider::new(config.window.process_name.clone())),
        config.window.module_name.clone(),
        config.memory.clone(),
        config.timing.clone(),
    );
    let capture = CaptureLoop::new(config.window.title.clone(), config.timing.clone(), slot.clone());
    let tick = config.timing.tick();
    let frames: Arc<dyn FrameProvider> = slot;
    let controller = Controller::new(config, Box::new(detector), Box::new(input), std::time::Instant::now());
    let controller_loop = ControllerLoop::new(
        controller,
        toggle,
        frames,
        snapshot_rx,
        window_rx,
        summary_tx,
        journal_tx,
    );

    let mut tasks = TaskGroup::new();
    // the controller goes first so it is named when its consumers end with it
    tasks.add("controller", runtime.spawn(controller_loop.run(tick, shutdown_rx.clone())));
    tasks.add("memory", runtime.spawn(poller.run(snapshot_tx, shutdown_rx.clone())));
    tasks.add("capture", runtime.spawn(capture.run(window_tx, shutdown_rx.clone())));
    tasks.add("journal", runtime.spawn(Journal::new(journal_dir()).run(journal_rx)));
    tasks.add("status", runtime.spawn(report_status(summary_rx)));

    let signal_tx = shutdown_tx.clone();
    runtime.spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[INIT] Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("[INIT] Ctrl+C received, shutting down");
        signal_tx.send_replace(true);
    });

    // every task runs until shutdown, so one that ends first has failed
    let mut stopped = None;
    while !*shutdown_rx.borrow() {
        if let Some(name) = tasks.finished() {
            tracing::error!("[INIT] {} task stopped unexpectedly", name);
            stopped = Some(name);
            break;
        }
        pump_messages();
        thread::sleep(PUMP_INTERVAL);
    }

    println!("App is closing, cleaning up...");
    shutdown_tx.send_replace(true);
    let failed = runtime.block_on(tasks.join(SHUTDOWN_GRACE));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    if let Some(name) = stopped.or_else(|| failed.first().copied()) {
        return Err(anyhow::anyhow!("{} task stopped unexpectedly", name));
    }
    Ok(())
}
