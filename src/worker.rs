//! Timer-driven background tasks: memory polling, frame capture, the
//! controller tick and the status reporter
//!
//! Each task owns its own interval. They talk through `watch` channels
//! (latest value wins) and a bounded `mpsc` for controller events, so no
//! task ever waits on another one's I/O.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::controller::{Controller, ControllerSummary, StateKind, TickInput, TickReport};
use crate::geometry::Rect;
use crate::journal::JournalMessage;
use crate::memory::{GameSnapshot, MemoryReadError, MemoryReader, ProcessProvider};
use crate::screen_reader::{FrameProvider, FrameSlot, ScreenService};
use crate::utils::bot_state::AutomationToggle;
use crate::utils::settings::{MemoryLayout, TimingSettings};
use crate::window::find_game_window;

fn ticker(period: Duration) -> time::Interval {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Keeps the latest player snapshot published, reconnecting when the game
/// restarts. Reads run on the blocking pool under a timeout.
pub struct MemoryPoller {
    provider: Arc<dyn ProcessProvider>,
    module_name: String,
    layout: MemoryLayout,
    timing: TimingSettings,
}

impl MemoryPoller {
    pub fn new(
        provider: Arc<dyn ProcessProvider>,
        module_name: impl Into<String>,
        layout: MemoryLayout,
        timing: TimingSettings,
    ) -> Self {
        Self {
            provider,
            module_name: module_name.into(),
            layout,
            timing,
        }
    }

    pub async fn run(
        self,
        tx: watch::Sender<Option<GameSnapshot>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = ticker(self.timing.memory_poll());
        let mut reader: Option<MemoryReader> = None;
        let mut next_connect = Instant::now();
        let mut seq = 0u64;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            let Some(current) = reader.take() else {
                if Instant::now() >= next_connect {
                    reader = self.connect().await;
                    if reader.is_none() {
                        next_connect = Instant::now() + self.timing.reconnect();
                    }
                }
                continue;
            };

            match self.read(current).await {
                Ok((current, mut snapshot)) => {
                    // numbering survives reconnects
                    seq += 1;
                    snapshot.seq = seq;
                    tx.send_replace(Some(snapshot));
                    reader = Some(current);
                }
                Err(e) => {
                    tracing::warn!("[MEM] Reader disconnected: {}", e);
                    tx.send_replace(None);
                    next_connect = Instant::now() + self.timing.reconnect();
                }
            }
        }
        tracing::debug!("[MEM] Poller stopped");
    }

    /// Open the target and scan for the player, bounded like a read
    async fn connect(&self) -> Option<MemoryReader> {
        let provider = self.provider.clone();
        let module = self.module_name.clone();
        let layout = self.layout.clone();
        let task = tokio::task::spawn_blocking(move || {
            let process = provider.open_target().ok_or(MemoryReadError::ProcessUnavailable)?;
            MemoryReader::connect(process, &module, layout)
        });

        match time::timeout(self.timing.connect_timeout(), task).await {
            Ok(Ok(Ok(reader))) => Some(reader),
            Ok(Ok(Err(e))) => {
                tracing::debug!("[MEM] Connect failed: {}", e);
                None
            }
            Ok(Err(e)) => {
                tracing::error!("[MEM] Connect task failed: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "[MEM] Connect exceeded {} ms",
                    self.timing.connect_timeout().as_millis()
                );
                None
            }
        }
    }

    /// One bounded read. A reader that times out is abandoned to the blocking pool.
    async fn read(&self, mut reader: MemoryReader) -> Result<(MemoryReader, GameSnapshot), MemoryReadError> {
        let task = tokio::task::spawn_blocking(move || {
            let snapshot = reader.read_snapshot(Instant::now())?;
            Ok::<_, MemoryReadError>((reader, snapshot))
        });
        match time::timeout(self.timing.memory_read_timeout(), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(MemoryReadError::ReadFailed {
                address: 0,
                len: 0,
                reason: e.to_string(),
            }),
            Err(_) => Err(MemoryReadError::Timeout),
        }
    }
}

/// Finds the game window and captures it into the frame slot
pub struct CaptureLoop {
    window_title: String,
    timing: TimingSettings,
    slot: Arc<FrameSlot>,
}

impl CaptureLoop {
    pub fn new(window_title: impl Into<String>, timing: TimingSettings, slot: Arc<FrameSlot>) -> Self {
        Self {
            window_title: window_title.into(),
            timing,
            slot,
        }
    }

    pub async fn run(self, window_tx: watch::Sender<Option<Rect>>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = ticker(self.timing.capture());
        let service = Arc::new(ScreenService::new());

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            let window = find_game_window(&self.window_title).filter(|w| !w.is_empty());
            window_tx.send_if_modified(|current| {
                if *current != window {
                    tracing::info!("[CAPTURE] Game window {:?}", window);
                    *current = window;
                    true
                } else {
                    false
                }
            });
            let Some(window) = window else {
                self.slot.clear();
                continue;
            };

            let service = service.clone();
            let task = tokio::task::spawn_blocking(move || service.capture_window(window));
            match time::timeout(self.timing.capture_timeout(), task).await {
                Ok(Ok(Ok(frame))) => self.slot.publish(frame),
                Ok(Ok(Err(e))) => tracing::debug!("[CAPTURE] {}", e),
                Ok(Err(e)) => tracing::error!("[CAPTURE] Capture task failed: {}", e),
                Err(_) => tracing::warn!(
                    "[CAPTURE] Capture exceeded {} ms",
                    self.timing.capture_timeout().as_millis()
                ),
            }
        }
        tracing::debug!("[CAPTURE] Capture loop stopped");
    }
}

/// Drives the controller on a fixed period and fans out its results
pub struct ControllerLoop {
    controller: Controller,
    toggle: AutomationToggle,
    frames: Arc<dyn FrameProvider>,
    snapshots: watch::Receiver<Option<GameSnapshot>>,
    window: watch::Receiver<Option<Rect>>,
    summary: watch::Sender<ControllerSummary>,
    journal: mpsc::Sender<JournalMessage>,
}

impl ControllerLoop {
    pub fn new(
        controller: Controller,
        toggle: AutomationToggle,
        frames: Arc<dyn FrameProvider>,
        snapshots: watch::Receiver<Option<GameSnapshot>>,
        window: watch::Receiver<Option<Rect>>,
        summary: watch::Sender<ControllerSummary>,
        journal: mpsc::Sender<JournalMessage>,
    ) -> Self {
        Self {
            controller,
            toggle,
            frames,
            snapshots,
            window,
            summary,
            journal,
        }
    }

    /// Tick until shutdown. The final tick runs with automation disabled so
    /// held keys are released before the task ends.
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = ticker(period);
        loop {
            let stopping = tokio::select! {
                _ = interval.tick() => false,
                _ = shutdown.changed() => true,
            };
            let enabled = !stopping && self.toggle.is_enabled();
            self.step(Instant::now(), enabled);
            if stopping {
                break;
            }
        }
        tracing::debug!("[CTRL] Controller loop stopped");
    }

    pub fn step(&mut self, now: Instant, automation_enabled: bool) -> TickReport {
        let frame = self.frames.latest_frame();
        let snapshot = *self.snapshots.borrow();
        let window = *self.window.borrow();

        let report = self.controller.tick(TickInput {
            now,
            automation_enabled,
            frame: frame.as_deref(),
            snapshot: snapshot.as_ref(),
            window,
        });

        for event in &report.events {
            if let Err(e) = self.journal.try_send(JournalMessage::Event(event.clone())) {
                tracing::debug!("[JOURNAL] Dropped event {}: {}", event, e);
            }
        }
        self.summary.send_replace(self.controller.summary().clone());
        report
    }
}

/// Background tasks that are meant to run until shutdown
#[derive(Default)]
pub struct TaskGroup {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.push((name, handle));
    }

    /// First task that has already ended
    pub fn finished(&self) -> Option<&'static str> {
        self.tasks
            .iter()
            .find(|(_, handle)| handle.is_finished())
            .map(|(name, _)| *name)
    }

    /// Wait up to `grace` for every task and return the names of those that
    /// failed. Tasks still running at the deadline are aborted.
    pub async fn join(self, grace: Duration) -> Vec<&'static str> {
        let deadline = time::Instant::now() + grace;
        let mut failed = Vec::new();
        for (name, mut handle) in self.tasks {
            match time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("[INIT] {} task failed: {}", name, e);
                    failed.push(name);
                }
                Err(_) => {
                    tracing::debug!("[INIT] Aborting {} task", name);
                    handle.abort();
                }
            }
        }
        failed
    }
}

/// Log a status line whenever the controller changes state
pub async fn report_status(mut rx: watch::Receiver<ControllerSummary>) {
    let mut last_state: Option<StateKind> = None;
    while rx.changed().await.is_ok() {
        let summary = rx.borrow_and_update().clone();
        if last_state != Some(summary.state) {
            tracing::info!("[CTRL] {}", summary.status_line());
            last_state = Some(summary.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerEvent, Trigger};
    use crate::geometry::Point;
    use crate::input::{InputDispatcher, InputError};
    use crate::memory::reader::tests::{fake_game, FakeProcess};
    use crate::memory::ProcessMemory;
    use crate::screen_reader::{CaptureFrame, CueDetector, CueKind, DetectionResult};
    use crate::utils::settings::BotConfig;
    use parking_lot::Mutex;

    struct FakeProvider(FakeProcess);

    impl ProcessProvider for FakeProvider {
        fn open_target(&self) -> Option<Box<dyn ProcessMemory>> {
            Some(Box::new(self.0.clone()))
        }
    }

    struct BlindDetector;

    impl CueDetector for BlindDetector {
        fn detect(&self, _: &CaptureFrame, _: &Rect, kind: CueKind) -> DetectionResult {
            DetectionResult::not_found(kind)
        }

        fn count_circles(&self, _: &CaptureFrame, _: &Rect) -> usize {
            0
        }

        fn detect_bubbles(&self, _: &CaptureFrame, _: &Rect, _: Option<usize>) -> DetectionResult {
            DetectionResult::not_found(CueKind::Bubble)
        }
    }

    #[derive(Clone, Default)]
    struct KeyLog(Arc<Mutex<Vec<String>>>);

    impl InputDispatcher for KeyLog {
        fn key_down(&mut self, key: &str) -> Result<(), InputError> {
            self.0.lock().push(format!("down {}", key));
            Ok(())
        }

        fn key_up(&mut self, key: &str) -> Result<(), InputError> {
            self.0.lock().push(format!("up {}", key));
            Ok(())
        }

        fn tap_key(&mut self, key: &str) -> Result<(), InputError> {
            self.0.lock().push(format!("tap {}", key));
            Ok(())
        }

        fn click_at(&mut self, p: Point) -> Result<(), InputError> {
            self.0.lock().push(format!("click {},{}", p.x, p.y));
            Ok(())
        }

        fn mouse_move(&mut self, _: Point) -> Result<(), InputError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_task_group_reports_failed_task() {
        let mut group = TaskGroup::new();
        group.add("steady", tokio::spawn(std::future::pending::<()>()));
        group.add("capture", tokio::spawn(async { panic!("capture backend died") }));

        time::timeout(Duration::from_secs(5), async {
            while group.finished().is_none() {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(group.finished(), Some("capture"));

        let failed = group.join(Duration::from_millis(50)).await;
        assert_eq!(failed, vec!["capture"]);
    }

    struct StuckProvider;

    impl ProcessProvider for StuckProvider {
        fn open_target(&self) -> Option<Box<dyn ProcessMemory>> {
            std::thread::sleep(Duration::from_millis(500));
            None
        }
    }

    #[tokio::test]
    async fn test_connect_is_time_bounded() {
        let timing = TimingSettings {
            connect_timeout_ms: 20,
            ..fast_timing()
        };
        let poller = MemoryPoller::new(Arc::new(StuckProvider), "GTA5.exe", MemoryLayout::default(), timing);
        let started = Instant::now();
        assert!(poller.connect().await.is_none());
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    fn fast_timing() -> TimingSettings {
        TimingSettings {
            memory_poll_ms: 5,
            memory_read_timeout_ms: 1_000,
            reconnect_ms: 5,
            ..TimingSettings::default()
        }
    }

    #[tokio::test]
    async fn test_poller_publishes_and_recovers() {
        let process = fake_game(200, 512);
        let handle = process.clone();
        let poller = MemoryPoller::new(
            Arc::new(FakeProvider(process)),
            "GTA5.exe",
            MemoryLayout::default(),
            fast_timing(),
        );
        let (tx, mut rx) = watch::channel(None);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(poller.run(tx, stop_rx));

        let first = time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.is_some()))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(first.seq >= 1);

        handle.unmap_all();
        time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.is_none()))
            .await
            .unwrap()
            .unwrap();

        stop_tx.send_replace(true);
        time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    fn controller_loop(keys: KeyLog) -> (ControllerLoop, mpsc::Receiver<JournalMessage>, watch::Receiver<ControllerSummary>) {
        let controller = Controller::new(
            BotConfig::default(),
            Box::new(BlindDetector),
            Box::new(keys),
            Instant::now(),
        );
        let (_snap_tx, snap_rx) = watch::channel(None);
        let (_win_tx, win_rx) = watch::channel(None);
        let (summary_tx, summary_rx) = watch::channel(ControllerSummary::default());
        let (journal_tx, journal_rx) = mpsc::channel(16);
        let frames: Arc<dyn FrameProvider> = Arc::new(FrameSlot::new());
        let toggle = AutomationToggle::new();
        let lp = ControllerLoop::new(controller, toggle, frames, snap_rx, win_rx, summary_tx, journal_tx);
        (lp, journal_rx, summary_rx)
    }

    #[test]
    fn test_step_forwards_events_and_summary() {
        let keys = KeyLog::default();
        let (mut lp, mut journal_rx, summary_rx) = controller_loop(keys.clone());

        let report = lp.step(Instant::now(), true);
        assert_eq!(report.events.len(), 1);
        assert_eq!(summary_rx.borrow().state, StateKind::Cast);
        assert_eq!(keys.0.lock().as_slice(), ["tap SPACE"]);

        match journal_rx.try_recv() {
            Ok(JournalMessage::Event(ControllerEvent::Transition { trigger, .. })) => {
                assert_eq!(trigger, Trigger::AutomationEnabled);
            }
            other => panic!("unexpected journal message {:?}", other),
        }
    }

    #[test]
    fn test_step_never_blocks_on_full_journal() {
        let (mut lp, _journal_rx, summary_rx) = controller_loop(KeyLog::default());
        let t0 = Instant::now();
        for i in 0..64u64 {
            // alternate enabled/disabled to emit events every tick
            lp.step(t0 + Duration::from_millis(50 * i), i % 2 == 0);
        }
        assert!(!summary_rx.borrow().automation_enabled);
    }
}
