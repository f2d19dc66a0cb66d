use serde::{Deserialize, Serialize};

/// Prefix for control lines emitted by the detector script.
pub const MARKER: char = '~';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
	Live,
	LiveEnded,
	Disconnected,
	Started,
	Unknown(String),
}

/// Classify one line of detector output.
///
/// Returns `None` for ordinary (non-marker) lines. Marker lines outside the
/// known vocabulary come back as `Signal::Unknown` with the raw text.
pub fn classify(line: &str) -> Option<Signal> {
	if !line.starts_with(MARKER) {
		return None;
	}
	Some(match line {
		"~LIVE" => Signal::Live,
		"~LIVE_ENDED" => Signal::LiveEnded,
		"~DISCONNECTED" => Signal::Disconnected,
		"~STARTED" => Signal::Started,
		_ => Signal::Unknown(line.to_string()),
	})
}
