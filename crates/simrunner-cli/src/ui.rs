use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use simrunner::engine::progress::{Progress, ProgressCallback};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::warn;

#[derive(Debug)]
pub enum UiEvent {
    Progress(Progress),
    Log(String),
}

pub struct UiManager {
    mp: Arc<MultiProgress>,
    state: BarState,
    event_receiver: mpsc::Receiver<UiEvent>,
    shutdown_receiver: watch::Receiver<bool>,
    _sentinel_bar: ProgressBar,
}

#[derive(Default)]
struct BarState {
    active_bar: Option<ProgressBar>,
    running: usize,
    retries: usize,
    failures: usize,
}

impl BarState {
    fn status_text(&self) -> String {
        format!(
            "{} running, {} retried, {} failed",
            self.running, self.retries, self.failures
        )
    }
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<UiEvent>, watch::Sender<bool>) {
        let (event_sender, event_receiver) = mpsc::channel(1024);
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let mp = Arc::new(MultiProgress::new());
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        let _sentinel_bar = mp.add(ProgressBar::hidden());
        let manager = Self {
            mp,
            state: BarState::default(),
            event_receiver,
            shutdown_receiver,
            _sentinel_bar,
        };

        (manager, event_sender, shutdown_sender)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.event_receiver.recv() => {
                    self.handle_event(event);
                }
                result = self.shutdown_receiver.changed() => {
                    if result.is_err() || *self.shutdown_receiver.borrow() {
                        break;
                    }
                }
            }
        }
        while let Ok(event) = self.event_receiver.try_recv() {
            self.handle_event(event);
        }
        if let Some(bar) = self.state.active_bar.take() {
            bar.finish_and_clear();
        }
        self._sentinel_bar.finish_and_clear();
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(msg) => {
                // Unlike `println`, this still prints when stderr is not a terminal.
                self.mp.suspend(|| eprintln!("{}", msg));
            }
            UiEvent::Progress(progress) => self.handle_progress(progress),
        }
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::RunStart { total } => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }
                self.state = BarState::default();

                let pb = self.mp.add(ProgressBar::new(total));
                pb.set_style(Self::bar_style());
                pb.set_message(self.state.status_text());
                self.state.active_bar = Some(pb);
            }
            Progress::JobStarted { index, attempt } => {
                self.state.running += 1;
                if attempt > 1 {
                    self.mp
                        .println(format!("  ↻ Process {} restarted (attempt {})", index, attempt))
                        .ok();
                }
                self.refresh_message();
            }
            Progress::JobRetry { index, retries } => {
                self.state.running = self.state.running.saturating_sub(1);
                self.state.retries += 1;
                self.mp
                    .println(format!("  ⚠ Process {} failed ({} so far)", index, retries))
                    .ok();
                self.refresh_message();
            }
            Progress::JobFinished { index, success } => {
                self.state.running = self.state.running.saturating_sub(1);
                if !success {
                    self.state.failures += 1;
                    self.mp
                        .println(format!("  ✗ Process {} exhausted its retries", index))
                        .ok();
                }
                if let Some(bar) = self.state.active_bar.as_ref() {
                    bar.inc(1);
                }
                self.refresh_message();
            }
            Progress::RunFinish { finished, killed } => {
                if let Some(bar) = self.state.active_bar.take() {
                    bar.finish_and_clear();
                }
                let line = if killed {
                    format!("✗ Run killed after {} process(es) finished", finished)
                } else {
                    format!("✓ {} process(es) finished", finished)
                };
                self.mp.println(line).ok();
            }
            Progress::Message(msg) => {
                self.mp.println(format!("  {}", msg)).ok();
            }
        }
    }

    fn refresh_message(&self) {
        if let Some(bar) = self.state.active_bar.as_ref() {
            bar.set_message(self.state.status_text());
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<40} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})")
            .expect("Invalid template")
            .with_key(
                "elapsed",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    write!(w, "{:.1}s", state.elapsed().as_secs_f64()).ok();
                },
            )
            .progress_chars("━╸ ")
    }
}

#[derive(Clone)]
pub struct CliProgressHandler {
    sender: mpsc::Sender<UiEvent>,
}

impl CliProgressHandler {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }

    pub fn get_callback(&self) -> ProgressCallback {
        let sender = self.sender.clone();
        Box::new(move |progress: Progress| {
            if let Err(e) = sender.try_send(UiEvent::Progress(progress)) {
                warn!("Failed to send progress update to UI channel: {}", e);
            }
        })
    }
}
