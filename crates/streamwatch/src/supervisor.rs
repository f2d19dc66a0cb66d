use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

/// How to launch one supervised child process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
	/// Logical name used for log prefixes.
	pub name: String,
	pub program: String,
	pub args: Vec<String>,
	/// How long to wait after SIGTERM before escalating to SIGKILL.
	pub grace: Duration,
}

impl ProcessSpec {
	/// A command string run through a shell (needed for interpreter
	/// environment activation like `source .../activate env && ...`).
	pub fn shell(name: &str, command: &str, grace: Duration) -> Self {
		Self {
			name: name.to_string(),
			program: "bash".to_string(),
			args: vec!["-c".to_string(), command.to_string()],
			grace,
		}
	}

	pub fn direct(name: &str, program: &str, args: Vec<String>, grace: Duration) -> Self {
		Self {
			name: name.to_string(),
			program: program.to_string(),
			args,
			grace,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
	Stdout,
	Stderr,
}

#[derive(Debug, Clone)]
pub struct OutputLine {
	pub source: StreamSource,
	pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
	/// The child exited on its own. A non-zero code is not an error at this
	/// layer; retry policy lives with the caller.
	Exited(i32),
	/// The child was terminated because the cancel scope fired.
	Cancelled,
}

/// Run one child process to completion or cancellation.
///
/// Every line the child writes to stdout or stderr is forwarded over `lines`.
/// Order is preserved within a stream; interleaving across the two streams is
/// whatever the channel sees. On cancellation the child's process group gets
/// SIGTERM, then SIGKILL once if it has not exited within the grace period.
pub async fn run_process(
	spec: &ProcessSpec,
	lines: mpsc::Sender<OutputLine>,
	mut cancel: watch::Receiver<bool>,
) -> Result<ExitOutcome, String> {
	if *cancel.borrow() {
		return Ok(ExitOutcome::Cancelled);
	}

	let mut child = spawn_child(spec)?;
	let pid = child.id().unwrap_or(0);
	tracing::info!("[{}] process started (pid {})", spec.name, pid);

	let mut readers = Vec::new();
	if let Some(stdout) = child.stdout.take() {
		readers.push(tokio::spawn(pipe_lines(stdout, StreamSource::Stdout, lines.clone())));
	}
	if let Some(stderr) = child.stderr.take() {
		readers.push(tokio::spawn(pipe_lines(stderr, StreamSource::Stderr, lines.clone())));
	}
	drop(lines);

	let outcome = tokio::select! {
		status = child.wait() => {
			let code = status
				.map_err(|e| format!("[{}] wait failed: {}", spec.name, e))?
				.code()
				.unwrap_or(-1);
			tracing::info!("[{}] process exited (code {})", spec.name, code);
			ExitOutcome::Exited(code)
		}
		_ = cancel.changed() => {
			terminate(&spec.name, &mut child, pid, spec.grace).await;
			ExitOutcome::Cancelled
		}
	};

	// Let the readers drain whatever is left in the pipes.
	for reader in readers {
		let _ = reader.await;
	}

	Ok(outcome)
}

fn spawn_child(spec: &ProcessSpec) -> Result<Child, String> {
	let mut cmd = Command::new(&spec.program);
	cmd.args(&spec.args)
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		// Own process group so termination covers the whole tree
		.process_group(0);

	cmd.spawn()
		.map_err(|e| format!("[{}] failed to spawn: {}", spec.name, e))
}

async fn pipe_lines<R>(reader: R, source: StreamSource, sink: mpsc::Sender<OutputLine>)
where
	R: tokio::io::AsyncRead + Unpin,
{
	let mut lines = BufReader::new(reader).lines();
	while let Ok(Some(text)) = lines.next_line().await {
		if sink.send(OutputLine { source, text }).await.is_err() {
			break;
		}
	}
}

async fn terminate(name: &str, child: &mut Child, pid: u32, grace: Duration) {
	use nix::sys::signal::{killpg, Signal};
	use nix::unistd::Pid;

	let pgid = Pid::from_raw(pid as i32);
	tracing::info!("[{}] sending SIGTERM (pid {})", name, pid);
	let _ = killpg(pgid, Signal::SIGTERM);

	tokio::select! {
		_ = child.wait() => {
			tracing::info!("[{}] exited after SIGTERM", name);
		}
		_ = tokio::time::sleep(grace) => {
			tracing::warn!("[{}] still running after {:?}, sending SIGKILL", name, grace);
			let _ = killpg(pgid, Signal::SIGKILL);
			let _ = child.wait().await;
		}
	}
}
