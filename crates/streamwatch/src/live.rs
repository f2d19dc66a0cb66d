use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};

use crate::capture::{CaptureEvent, CaptureManager};
use crate::notify::Notifier;
use crate::signal::{self, Signal};
use crate::supervisor::{self, ExitOutcome, ProcessSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
	NotLive,
	Live,
}

/// Drives the capture session and notifications from detector signals.
///
/// The state and the transition side effects run under one lock, so a late
/// `LiveEnded` can never interleave with a fresh `begin()`.
pub struct LiveMonitor {
	state: Mutex<LiveState>,
	capture: CaptureManager,
	notifier: Notifier,
}

impl LiveMonitor {
	pub fn new(capture: CaptureManager, notifier: Notifier) -> Self {
		Self {
			state: Mutex::new(LiveState::NotLive),
			capture,
			notifier,
		}
	}

	pub async fn state(&self) -> LiveState {
		*self.state.lock().await
	}

	pub fn capture(&self) -> &CaptureManager {
		&self.capture
	}

	pub async fn handle_signal(&self, signal: Signal) {
		let mut state = self.state.lock().await;
		match (signal, *state) {
			(Signal::Live, LiveState::NotLive) => {
				tracing::info!("live detected");
				*state = LiveState::Live;
				self.capture.begin().await;
				self.notifier.notify("LiveStart").await;
			}
			(Signal::Live, LiveState::Live) => {
				tracing::info!("already live, ignoring");
			}
			(Signal::LiveEnded, LiveState::Live) => {
				tracing::info!("live ended");
				*state = LiveState::NotLive;
				// Tear the session down fully before announcing the end
				self.capture.end().await;
				self.notifier.notify("LiveEnd").await;
			}
			(Signal::LiveEnded, LiveState::NotLive) => {
				tracing::info!("already not live, ignoring");
			}
			(Signal::Started, _) => {
				tracing::info!("live check running");
			}
			(Signal::Disconnected, _) => {
				tracing::info!("detector disconnected");
			}
			(Signal::Unknown(raw), _) => {
				tracing::warn!("unknown control line: {}", raw);
			}
		}
	}

	pub async fn handle_capture_event(&self, event: CaptureEvent) {
		match event {
			CaptureEvent::RetriesExhausted { attempts } => {
				// The stream may still be live; only the capture loop gave
				// up. Operator fallback happens outside this process.
				tracing::error!(
					"capture abandoned after {} failed attempts, stream is not being recorded",
					attempts
				);
			}
		}
	}

	/// Final teardown on program shutdown, regardless of detector state.
	pub async fn shutdown(&self) {
		let mut state = self.state.lock().await;
		if *state == LiveState::Live {
			tracing::info!("shutting down during a live period, stopping capture");
		}
		*state = LiveState::NotLive;
		self.capture.end().await;
	}
}

/// Outermost loop: run the detector forever, relaunching after each exit,
/// until the root cancel scope fires.
pub async fn run_detector_loop(
	spec: ProcessSpec,
	restart_delay: Duration,
	max_errors: u32,
	monitor: Arc<LiveMonitor>,
	mut cancel: watch::Receiver<bool>,
) {
	let mut errors: u32 = 0;

	loop {
		if *cancel.borrow() {
			return;
		}

		let (tx, mut rx) = mpsc::channel::<supervisor::OutputLine>(256);
		let mon = Arc::clone(&monitor);
		let name = spec.name.clone();
		let consumer = tokio::spawn(async move {
			while let Some(line) = rx.recv().await {
				match signal::classify(&line.text) {
					Some(sig) => mon.handle_signal(sig).await,
					None => tracing::info!("[{}] {}", name, line.text),
				}
			}
		});

		let outcome = supervisor::run_process(&spec, tx, cancel.clone()).await;
		if let Err(e) = consumer.await {
			tracing::error!("[{}] line consumer failed: {}", spec.name, e);
		}

		match outcome {
			Ok(ExitOutcome::Cancelled) => {
				tracing::info!("[{}] detector cancelled", spec.name);
				return;
			}
			Ok(ExitOutcome::Exited(code)) => {
				tracing::info!(
					"[{}] detector exited (code {}), relaunching in {:?}",
					spec.name,
					code,
					restart_delay
				);
			}
			Err(e) => {
				errors += 1;
				tracing::error!("#{} {}", errors, e);
				if errors >= max_errors {
					tracing::error!("[{}] too many errors, giving up", spec.name);
					return;
				}
			}
		}

		tokio::select! {
			_ = tokio::time::sleep(restart_delay) => {}
			_ = cancel.changed() => return,
		}
	}
}
