use std::time::Duration;

use serde_json::json;

#[derive(Debug, Clone)]
pub struct NotifyConfig {
	pub base_url: String,
	/// Bearer token; empty means no Authorization header.
	pub token: String,
	pub timeout: Duration,
}

/// Fire-and-forget action trigger for the automation endpoint.
#[derive(Clone)]
pub struct Notifier {
	client: reqwest::Client,
	config: NotifyConfig,
}

impl Notifier {
	pub fn new(config: NotifyConfig) -> Result<Self, String> {
		let client = reqwest::Client::builder()
			.timeout(config.timeout)
			.build()
			.map_err(|e| format!("failed to build http client: {}", e))?;
		Ok(Self { client, config })
	}

	/// POST the action to the endpoint. Any failure (transport error,
	/// timeout, non-2xx) is logged and swallowed; callers never see it.
	pub async fn notify(&self, action: &str) {
		let url = format!("{}/DoAction", self.config.base_url);
		let body = json!({ "action": { "name": action } });

		let mut request = self.client.post(&url).json(&body);
		if !self.config.token.is_empty() {
			request = request.bearer_auth(&self.config.token);
		}

		match request.send().await {
			Ok(resp) if resp.status().is_success() => {
				tracing::info!("action '{}' sent", action);
			}
			Ok(resp) => {
				tracing::error!("action '{}' rejected: {}", action, resp.status());
			}
			Err(e) => {
				tracing::error!("failed to send action '{}': {}", action, e);
			}
		}
	}
}
