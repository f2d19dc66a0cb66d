use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, watch};

use streamwatch::capture::{CaptureConfig, CaptureManager};
use streamwatch::config;
use streamwatch::live::{self, LiveMonitor};
use streamwatch::notify::{Notifier, NotifyConfig};
use streamwatch::supervisor::ProcessSpec;

#[derive(Parser)]
#[command(name = "streamwatch")]
#[command(about = "Watches a live detector process and supervises a stream capture process")]
#[command(version)]
struct Cli {
	/// Target account to watch
	#[arg(default_value = "hofzeitprojekt")]
	user: String,

	/// Path to config.toml
	#[arg(short, long)]
	config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt().init();

	let cli = Cli::parse();
	let config = config::load(cli.config.as_deref());

	tracing::info!("streamwatch running for @{}", cli.user);

	let notifier = match Notifier::new(NotifyConfig {
		base_url: config.notify.base_url.clone(),
		token: config.notify.token.clone(),
		timeout: Duration::from_secs(config.notify.timeout_secs),
	}) {
		Ok(n) => n,
		Err(e) => {
			tracing::error!("{}", e);
			std::process::exit(1);
		}
	};

	let (cancel_tx, cancel_rx) = watch::channel(false);
	let (event_tx, mut event_rx) = mpsc::channel(16);

	let capture = CaptureManager::new(
		CaptureConfig {
			spec: ProcessSpec::direct(
				"streamlink",
				"streamlink",
				config.capture_args(&cli.user),
				Duration::from_secs(config.capture.grace_secs),
			),
			restart_delay: Duration::from_secs(config.capture.restart_delay_secs),
			max_retries: config.capture.max_retries,
		},
		event_tx,
		cancel_rx.clone(),
	);

	let monitor = Arc::new(LiveMonitor::new(capture, notifier));

	// Capture-loop failures arrive outside the detector line flow
	let event_monitor = Arc::clone(&monitor);
	tokio::spawn(async move {
		while let Some(event) = event_rx.recv().await {
			event_monitor.handle_capture_event(event).await;
		}
	});

	let detector = ProcessSpec::shell(
		"check_live.py",
		&config.detector_command(&cli.user),
		Duration::from_secs(config.detector.grace_secs),
	);
	let restart_delay = Duration::from_secs(config.detector.restart_delay_secs);
	let max_errors = config.detector.max_errors;

	let loop_monitor = Arc::clone(&monitor);
	let loop_cancel = cancel_rx.clone();
	let mut detector_handle = tokio::spawn(async move {
		live::run_detector_loop(detector, restart_delay, max_errors, loop_monitor, loop_cancel).await;
	});

	tokio::select! {
		_ = &mut detector_handle => {
			tracing::warn!("detector loop ended");
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("shutting down");
			let _ = cancel_tx.send(true);
			let _ = detector_handle.await;
		}
	}

	// A session may still be up if the detector ended without ~LIVE_ENDED
	monitor.shutdown().await;
}
