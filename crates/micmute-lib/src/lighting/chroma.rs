//! Razer Chroma REST client.
//!
//! Session lifecycle:
//! 1. `POST {base}` with the application descriptor returns a session `uri`
//! 2. `PUT {uri}/keyboard` with a `CHROMA_CUSTOM` grid sets the pattern
//! 3. `DELETE {uri}` ends the session
//!
//! The service drops sessions after 15 s without traffic. The reconciliation
//! loop pushes a pattern on every tick while active, which keeps the session
//! alive without a separate heartbeat.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{LightingConnection, LightingError, LightingPattern, LightingSdk, Result};

pub const DEFAULT_URL: &str = "http://localhost:54235/razer/chromasdk";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct Author<'a> {
    name: &'a str,
    contact: &'a str,
}

#[derive(Serialize)]
struct AppInfo<'a> {
    title: &'a str,
    description: &'a str,
    author: Author<'a>,
    device_supported: [&'a str; 1],
    category: &'a str,
}

const APP_INFO: AppInfo<'static> = AppInfo {
    title: "MicMute",
    description: "Microphone mute indicator",
    author: Author {
        name: "micmute",
        contact: "https://github.com/micmute",
    },
    device_supported: ["keyboard"],
    category: "application",
};

#[derive(Deserialize)]
struct SessionReply {
    #[serde(default)]
    sessionid: Option<u64>,
    uri: Option<String>,
    #[serde(default)]
    result: Option<i64>,
}

#[derive(Serialize)]
struct CustomEffect {
    effect: &'static str,
    param: Vec<Vec<u32>>,
}

#[derive(Deserialize)]
struct EffectReply {
    result: i64,
}

/// Chroma SDK over the local REST endpoint.
#[derive(Debug, Clone)]
pub struct ChromaRestSdk {
    base_url: String,
}

impl ChromaRestSdk {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for ChromaRestSdk {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl LightingSdk for ChromaRestSdk {
    fn create_connection(&self) -> Result<Box<dyn LightingConnection>> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LightingError::Connect(e.to_string()))?;

        let reply: SessionReply = client
            .post(&self.base_url)
            .json(&APP_INFO)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| LightingError::Connect(e.to_string()))?
            .json()
            .map_err(|e| LightingError::Protocol(e.to_string()))?;

        let Some(uri) = reply.uri else {
            return Err(LightingError::Protocol(format!(
                "no session uri in reply (result {:?})",
                reply.result
            )));
        };
        log::info!(
            "chroma session {} opened at {uri}",
            reply.sessionid.unwrap_or_default()
        );
        Ok(Box::new(ChromaConnection {
            client,
            uri: uri.trim_end_matches('/').to_string(),
            initialized: true,
        }))
    }
}

struct ChromaConnection {
    client: Client,
    uri: String,
    initialized: bool,
}

impl LightingConnection for ChromaConnection {
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn set_pattern(&mut self, pattern: &LightingPattern) -> Result<()> {
        if !self.initialized {
            return Err(LightingError::Send("session closed".into()));
        }
        let body = CustomEffect {
            effect: "CHROMA_CUSTOM",
            param: pattern.to_bgr_rows(),
        };
        let reply: EffectReply = self
            .client
            .put(format!("{}/keyboard", self.uri))
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| LightingError::Send(e.to_string()))?
            .json()
            .map_err(|e| LightingError::Protocol(e.to_string()))?;
        if reply.result != 0 {
            return Err(LightingError::Send(format!(
                "keyboard effect rejected (result {})",
                reply.result
            )));
        }
        Ok(())
    }

    fn uninitialize(&mut self) {
        if !self.initialized {
            return;
        }
        self.initialized = false;
        match self.client.delete(&self.uri).send() {
            Ok(_) => log::info!("chroma session closed"),
            Err(e) => log::debug!("chroma session close failed: {e}"),
        }
    }
}

impl Drop for ChromaConnection {
    fn drop(&mut self) {
        self.uninitialize();
    }
}
