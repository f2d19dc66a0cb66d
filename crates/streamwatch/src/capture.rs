use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::supervisor::{self, ExitOutcome, ProcessSpec};

/// Terminal failures surfaced to the owner of the capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
	/// The restart budget ran out; the session abandoned itself.
	RetriesExhausted { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
	pub spec: ProcessSpec,
	pub restart_delay: Duration,
	/// Consecutive failed runs tolerated before the session gives up.
	pub max_retries: u32,
}

/// Owns at most one capture supervision loop at a time.
///
/// `begin()` spawns the loop under a fresh cancel scope; `end()` cancels it
/// and joins the task so teardown is complete before returning. The loop also
/// observes the root cancel scope, so shutting the program down takes any
/// active session with it.
pub struct CaptureManager {
	config: CaptureConfig,
	events: mpsc::Sender<CaptureEvent>,
	root_cancel: watch::Receiver<bool>,
	active: Mutex<Option<ActiveSession>>,
}

struct ActiveSession {
	cancel: watch::Sender<bool>,
	task: JoinHandle<()>,
}

impl CaptureManager {
	pub fn new(
		config: CaptureConfig,
		events: mpsc::Sender<CaptureEvent>,
		root_cancel: watch::Receiver<bool>,
	) -> Self {
		Self {
			config,
			events,
			root_cancel,
			active: Mutex::new(None),
		}
	}

	/// Start a capture session. Returns false (and logs) if one is already
	/// active; a session that stopped on its own counts as inactive.
	pub async fn begin(&self) -> bool {
		let mut active = self.active.lock().await;
		if let Some(session) = active.as_ref() {
			if !session.task.is_finished() {
				tracing::info!("[{}] capture session already active", self.config.spec.name);
				return false;
			}
		}

		let (cancel_tx, cancel_rx) = watch::channel(false);
		let config = self.config.clone();
		let events = self.events.clone();
		let root_cancel = self.root_cancel.clone();
		let task = tokio::spawn(async move {
			run_capture_loop(config, events, cancel_rx, root_cancel).await;
		});

		*active = Some(ActiveSession { cancel: cancel_tx, task });
		true
	}

	/// Stop the active session and wait for its loop to finish.
	pub async fn end(&self) {
		let mut active = self.active.lock().await;
		let Some(session) = active.take() else {
			tracing::debug!("[{}] no active capture session", self.config.spec.name);
			return;
		};

		let _ = session.cancel.send(true);
		if let Err(e) = session.task.await {
			tracing::error!("[{}] capture loop task failed: {}", self.config.spec.name, e);
		}
		tracing::info!("[{}] capture session stopped", self.config.spec.name);
	}

	pub async fn is_active(&self) -> bool {
		let active = self.active.lock().await;
		active.as_ref().map(|s| !s.task.is_finished()).unwrap_or(false)
	}
}

async fn run_capture_loop(
	config: CaptureConfig,
	events: mpsc::Sender<CaptureEvent>,
	cancel: watch::Receiver<bool>,
	root_cancel: watch::Receiver<bool>,
) {
	let mut failures: u32 = 0;

	loop {
		if *cancel.borrow() || *root_cancel.borrow() {
			return;
		}

		let (tx, mut rx) = mpsc::channel::<supervisor::OutputLine>(256);
		let name = config.spec.name.clone();
		let echo = tokio::spawn(async move {
			while let Some(line) = rx.recv().await {
				tracing::info!("[{}] {}", name, line.text);
			}
		});

		let merged = merged_cancel(cancel.clone(), root_cancel.clone());
		let outcome = supervisor::run_process(&config.spec, tx, merged).await;
		let _ = echo.await;

		match outcome {
			Ok(ExitOutcome::Cancelled) => {
				tracing::info!("[{}] capture cancelled", config.spec.name);
				return;
			}
			Ok(ExitOutcome::Exited(0)) => {
				// A clean run resets the budget
				failures = 0;
				tracing::info!(
					"[{}] capture exited cleanly, restarting in {:?}",
					config.spec.name,
					config.restart_delay
				);
			}
			Ok(ExitOutcome::Exited(code)) => {
				failures += 1;
				tracing::warn!(
					"[{}] capture crashed (exit {}), failure {}/{}",
					config.spec.name,
					code,
					failures,
					config.max_retries
				);
			}
			Err(e) => {
				failures += 1;
				tracing::error!("{} (failure {}/{})", e, failures, config.max_retries);
			}
		}

		if failures >= config.max_retries {
			tracing::error!(
				"[{}] giving up after {} consecutive failures",
				config.spec.name,
				failures
			);
			let _ = events.send(CaptureEvent::RetriesExhausted { attempts: failures }).await;
			return;
		}

		tokio::select! {
			_ = tokio::time::sleep(config.restart_delay) => {}
			_ = cancelled(cancel.clone()) => return,
			_ = cancelled(root_cancel.clone()) => return,
		}
	}
}

/// Combine the session scope with the root scope into one receiver, so the
/// process supervisor only has to watch a single cancel signal.
fn merged_cancel(a: watch::Receiver<bool>, b: watch::Receiver<bool>) -> watch::Receiver<bool> {
	let (tx, rx) = watch::channel(false);
	tokio::spawn(async move {
		let mut a = a;
		let mut b = b;
		if *a.borrow() || *b.borrow() {
			let _ = tx.send(true);
			return;
		}
		loop {
			let changed = tokio::select! {
				r = a.changed() => r,
				r = b.changed() => r,
			};
			if changed.is_err() || *a.borrow() || *b.borrow() {
				let _ = tx.send(true);
				return;
			}
		}
	});
	rx
}

async fn cancelled(mut rx: watch::Receiver<bool>) {
	if *rx.borrow() {
		return;
	}
	let _ = rx.changed().await;
}
