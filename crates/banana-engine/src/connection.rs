//! Provider connection test: a single authenticated GET against the
//! provider's model listing endpoint.

use std::sync::mpsc;
use std::thread;

use banana_contracts::ConnectionProfile;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use uuid::Uuid;

use crate::debug::mask_api_key;
use crate::http::{create_client, CONNECTION_TEST_TIMEOUT};

pub const CONNECTION_OK_MESSAGE: &str = "Connection successful!";
pub const CUSTOM_PROVIDER_MESSAGE: &str =
    "Custom provider: Cannot automatically test. Please verify manually.";

/// Providers whose models endpoint takes the key as a query parameter.
const QUERY_KEY_PROVIDERS: &[&str] = &["Google Gemini", "Yunwu Gemini"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub ok: bool,
    pub message: String,
}

impl ConnectionReport {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProbe {
    pub url: String,
    pub bearer: Option<String>,
}

/// Endpoint to probe for `profile`, or `None` when it cannot be derived.
pub fn probe_for(profile: &ConnectionProfile) -> Option<ConnectionProbe> {
    let base = profile.base_url.as_str();
    if QUERY_KEY_PROVIDERS.contains(&profile.name.as_str()) {
        let trimmed = base.strip_suffix('/').unwrap_or(base);
        return Some(ConnectionProbe {
            url: format!("{trimmed}/models?key={}", profile.api_key),
            bearer: None,
        });
    }

    let bearer = Some(profile.api_key.clone());
    let is_gptgod = profile.name.to_ascii_lowercase().contains("gptgod")
        || base.to_ascii_lowercase().contains("gptgod");
    if is_gptgod {
        let url = if base.contains("/chat/completions") {
            base.replace("/chat/completions", "/models")
        } else {
            format!("{}models", with_trailing_slash(base))
        };
        return Some(ConnectionProbe { url, bearer });
    }

    if base.contains("v1") {
        let stripped = base.replace("/chat/completions", "");
        return Some(ConnectionProbe {
            url: format!("{}models", with_trailing_slash(&stripped)),
            bearer,
        });
    }
    None
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

pub fn test_connection(profile: &ConnectionProfile) -> ConnectionReport {
    match create_client() {
        Ok(client) => test_connection_with(&client, profile),
        Err(err) => ConnectionReport::failed(format!("Error: {err}")),
    }
}

pub fn test_connection_with(client: &Client, profile: &ConnectionProfile) -> ConnectionReport {
    if !profile.has_credentials() {
        return ConnectionReport::failed("Missing API Key or Base URL.");
    }
    let Some(probe) = probe_for(profile) else {
        return ConnectionReport::ok(CUSTOM_PROVIDER_MESSAGE);
    };
    tracing::info!(provider = %profile.name, url = %mask_api_key(&probe.url), "testing connection");

    let mut builder = client
        .get(&probe.url)
        .header(CONTENT_TYPE, "application/json")
        .timeout(CONNECTION_TEST_TIMEOUT);
    if let Some(key) = &probe.bearer {
        builder = builder.header(AUTHORIZATION, format!("Bearer {key}"));
    }
    let response = match builder.send() {
        Ok(response) => response,
        Err(err) if err.is_connect() || err.is_timeout() => {
            return ConnectionReport::failed(format!("Connection Error: {err}"));
        }
        Err(err) => return ConnectionReport::failed(format!("Error: {err}")),
    };

    let status = response.status();
    if !status.is_success() {
        let reason = status.canonical_reason().unwrap_or("Unknown");
        return ConnectionReport::failed(format!("HTTP Error: {} - {reason}", status.as_u16()));
    }
    let body = match response.text() {
        Ok(body) => body,
        Err(err) => return ConnectionReport::failed(format!("Error: {err}")),
    };
    let Ok(parsed) = serde_json::from_str::<Value>(&body) else {
        return ConnectionReport::failed("Invalid JSON response.");
    };
    if let Some(error) = parsed.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("Unknown error");
        return ConnectionReport::failed(format!("API Error: {message}"));
    }
    ConnectionReport::ok(CONNECTION_OK_MESSAGE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCompletion {
    pub task_id: Uuid,
    pub provider_name: String,
    pub report: ConnectionReport,
}

/// Runs the test on its own thread, independent of any generation task.
pub fn spawn_test(
    task_id: Uuid,
    profile: ConnectionProfile,
    sender: mpsc::Sender<ConnectionCompletion>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("banana-connection-{}", task_id.simple()))
        .spawn(move || {
            let report = test_connection(&profile);
            let _ = sender.send(ConnectionCompletion {
                task_id,
                provider_name: profile.name,
                report,
            });
        })
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use banana_contracts::ConnectionProfile;
    use uuid::Uuid;

    use super::{
        probe_for, spawn_test, test_connection, ConnectionProbe, CONNECTION_OK_MESSAGE,
        CUSTOM_PROVIDER_MESSAGE,
    };

    #[test]
    fn gemini_names_probe_with_query_key() {
        let profile = ConnectionProfile::new("Yunwu Gemini", "k1", "https://yunwu.zeabur.app/v1beta/", "m");
        assert_eq!(
            probe_for(&profile),
            Some(ConnectionProbe {
                url: "https://yunwu.zeabur.app/v1beta/models?key=k1".to_string(),
                bearer: None,
            })
        );
    }

    #[test]
    fn gptgod_swaps_chat_completions_for_models() {
        let profile = ConnectionProfile::new(
            "GPTGod NanoBanana Pro",
            "k2",
            "https://api.gptgod.online/v1/chat/completions",
            "m",
        );
        let probe = probe_for(&profile);
        assert_eq!(
            probe.as_ref().map(|probe| probe.url.as_str()),
            Some("https://api.gptgod.online/v1/models")
        );
        assert_eq!(probe.and_then(|probe| probe.bearer).as_deref(), Some("k2"));

        let bare = ConnectionProfile::new("mine", "k", "https://api.gptgod.online/v1", "m");
        assert_eq!(
            probe_for(&bare).map(|probe| probe.url),
            Some("https://api.gptgod.online/v1/models".to_string())
        );
    }

    #[test]
    fn openai_compatible_v1_urls_probe_models() {
        let profile = ConnectionProfile::new("Local", "k", "http://localhost:8080/v1/chat/completions", "m");
        assert_eq!(
            probe_for(&profile).map(|probe| probe.url),
            Some("http://localhost:8080/v1/models".to_string())
        );
    }

    #[test]
    fn custom_provider_reports_success_without_io() {
        let profile = ConnectionProfile::new("Studio", "k", "http://127.0.0.1:9/api", "m");
        assert_eq!(probe_for(&profile), None);
        let report = test_connection(&profile);
        assert!(report.ok);
        assert_eq!(report.message, CUSTOM_PROVIDER_MESSAGE);
    }

    #[test]
    fn missing_credentials_fail_fast() {
        let profile = ConnectionProfile::new("Yunwu Gemini", "", "https://x", "m");
        let report = test_connection(&profile);
        assert!(!report.ok);
        assert_eq!(report.message, "Missing API Key or Base URL.");
    }

    #[test]
    fn successful_listing_is_ok() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/v1/models")
            .match_header("authorization", "Bearer sk")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"gemini-3-pro-image-preview"}]}"#)
            .create();
        let profile = ConnectionProfile::new("gptgod", "sk", format!("{}/v1/chat/completions", server.url()), "m");
        let report = test_connection(&profile);
        mock.assert();
        assert!(report.ok, "{report:?}");
        assert_eq!(report.message, CONNECTION_OK_MESSAGE);
    }

    #[test]
    fn api_error_inside_success_status_fails() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_body(r#"{"error":{"message":"invalid key"}}"#)
            .create();
        let profile = ConnectionProfile::new("Local", "sk", format!("{}/v1", server.url()), "m");
        let report = test_connection(&profile);
        assert!(!report.ok);
        assert_eq!(report.message, "API Error: invalid key");
    }

    #[test]
    fn non_json_and_http_errors_are_reported() {
        let mut server = mockito::Server::new();
        let _html = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create();
        let profile = ConnectionProfile::new("Local", "sk", format!("{}/v1", server.url()), "m");
        assert_eq!(test_connection(&profile).message, "Invalid JSON response.");

        let gemini = ConnectionProfile::new("Google Gemini", "sk", format!("{}/v1beta/", server.url()), "m");
        let _unauthorized = server
            .mock("GET", "/v1beta/models")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "sk".into()))
            .with_status(401)
            .create();
        assert_eq!(test_connection(&gemini).message, "HTTP Error: 401 - Unauthorized");
    }

    #[test]
    fn refused_connection_is_a_connection_error() -> anyhow::Result<()> {
        let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
        let profile = ConnectionProfile::new("Local", "sk", format!("http://127.0.0.1:{port}/v1"), "m");
        let report = test_connection(&profile);
        assert!(!report.ok);
        assert!(report.message.starts_with("Connection Error: "), "{}", report.message);
        Ok(())
    }

    #[test]
    fn spawned_test_posts_completion() -> anyhow::Result<()> {
        let (sender, receiver) = mpsc::channel();
        let profile = ConnectionProfile::new("Studio", "k", "http://127.0.0.1:9/api", "m");
        let task_id = Uuid::new_v4();
        let handle = spawn_test(task_id, profile, sender)?;
        let completion = receiver.recv_timeout(Duration::from_secs(10))?;
        assert_eq!(completion.task_id, task_id);
        assert_eq!(completion.provider_name, "Studio");
        assert!(completion.report.ok);
        handle.join().map_err(|_| anyhow::anyhow!("connection thread panicked"))?;
        Ok(())
    }
}
