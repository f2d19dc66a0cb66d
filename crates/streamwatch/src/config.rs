use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
	#[serde(default)]
	pub detector: DetectorConfig,
	#[serde(default)]
	pub capture: CaptureSettings,
	#[serde(default)]
	pub notify: NotifySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
	/// Interpreter environment activated before the script runs.
	#[serde(default = "default_conda_env")]
	pub conda_env: String,
	#[serde(default = "default_script")]
	pub script: String,
	#[serde(default = "default_restart_delay")]
	pub restart_delay_secs: u64,
	#[serde(default = "default_detector_grace")]
	pub grace_secs: u64,
	/// Overall error budget before the detector loop gives up.
	#[serde(default = "default_max_errors")]
	pub max_errors: u32,
}

impl Default for DetectorConfig {
	fn default() -> Self {
		Self {
			conda_env: default_conda_env(),
			script: default_script(),
			restart_delay_secs: default_restart_delay(),
			grace_secs: default_detector_grace(),
			max_errors: default_max_errors(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSettings {
	#[serde(default = "default_restart_delay")]
	pub restart_delay_secs: u64,
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Port the capture tool serves the relayed stream on.
	#[serde(default = "default_relay_port")]
	pub relay_port: u16,
	#[serde(default = "default_capture_grace")]
	pub grace_secs: u64,
}

impl Default for CaptureSettings {
	fn default() -> Self {
		Self {
			restart_delay_secs: default_restart_delay(),
			max_retries: default_max_retries(),
			relay_port: default_relay_port(),
			grace_secs: default_capture_grace(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifySettings {
	#[serde(default = "default_base_url")]
	pub base_url: String,
	#[serde(default)]
	pub token: String,
	#[serde(default = "default_notify_timeout")]
	pub timeout_secs: u64,
}

impl Default for NotifySettings {
	fn default() -> Self {
		Self {
			base_url: default_base_url(),
			token: String::new(),
			timeout_secs: default_notify_timeout(),
		}
	}
}

fn default_conda_env() -> String {
	"tiktoklive".to_string()
}
fn default_script() -> String {
	"check_live.py".to_string()
}
fn default_restart_delay() -> u64 {
	30
}
fn default_detector_grace() -> u64 {
	30
}
fn default_max_errors() -> u32 {
	50
}
fn default_max_retries() -> u32 {
	5
}
fn default_relay_port() -> u16 {
	1312
}
fn default_capture_grace() -> u64 {
	10
}
fn default_base_url() -> String {
	"http://localhost:7474".to_string()
}
fn default_notify_timeout() -> u64 {
	30
}

impl Config {
	/// Shell command for the detector, with the activation step.
	pub fn detector_command(&self, user: &str) -> String {
		format!(
			"source ~/anaconda3/bin/activate {} && python -u {} -n {}",
			self.detector.conda_env, self.detector.script, user
		)
	}

	/// Arguments for the capture tool (invoked directly, no shell).
	pub fn capture_args(&self, user: &str) -> Vec<String> {
		vec![
			format!("https://www.tiktok.com/@{}/live", user),
			"best".to_string(),
			"--player-external-http".to_string(),
			"--player-external-http-port".to_string(),
			self.capture.relay_port.to_string(),
			"-l".to_string(),
			"all".to_string(),
		]
	}
}

pub fn load(path: Option<&Path>) -> Config {
	let path = match path {
		Some(p) => p.to_path_buf(),
		None => PathBuf::from("config.toml"),
	};

	let mut config = if path.exists() {
		match std::fs::read_to_string(&path) {
			Ok(content) => match toml::from_str(&content) {
				Ok(config) => config,
				Err(e) => {
					tracing::warn!("failed to parse {}: {}", path.display(), e);
					Config::default()
				}
			},
			Err(e) => {
				tracing::warn!("failed to read {}: {}", path.display(), e);
				Config::default()
			}
		}
	} else {
		Config::default()
	};

	// Credentials come from the environment, not the config file
	if let Ok(token) = std::env::var("STREAMWATCH_TOKEN") {
		config.notify.token = token;
	}

	config
}
