use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::composer::ChatRequest;

/// The one failure kind the conversation loop sees. Whatever went wrong
/// underneath (connect, status, body), the caller only gets a short
/// human-readable cause.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{cause}")]
pub struct TransportError {
    cause: String,
}

impl TransportError {
    fn new(cause: impl Into<String>) -> Self {
        Self { cause: cause.into() }
    }
}

/// Normalized backend response for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub reply: String,
    /// Present only when the request carried audio.
    pub transcription: Option<String>,
    /// Decoded spoken-reply bytes, when the backend sent any.
    pub audio: Option<Vec<u8>>,
}

/// Wire body for `POST /chat`. Exactly one of `text`/`audio` is set,
/// enforced upstream by the composer's precedence rule.
#[derive(Debug, Serialize)]
struct ChatPayload {
    user_id: String,
    latitude: f64,
    longitude: f64,
    text: Option<String>,
    audio: Option<String>,
    speak: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
    #[serde(default)]
    transcription: Option<String>,
    #[serde(default)]
    audio: Option<String>,
}

/// HTTP client for the conversational backend. One request per turn, no
/// retries; the user re-sends on failure.
#[derive(Clone)]
pub struct AgentClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl AgentClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Send one composed turn and await the single response.
    pub async fn send(&self, request: &ChatRequest) -> Result<TurnResult, TransportError> {
        let payload = encode_payload(request).await?;
        let url = format!("{}/chat", self.base_url);
        debug!(%url, has_audio = payload.audio.is_some(), "sending turn");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(request_cause)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(format!("the agent returned {}", status)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|_| TransportError::new("the agent's reply could not be read"))?;
        decode_reply(body)
    }

    /// One-shot availability probe against `GET /health`. Runs before the
    /// UI comes up, so it gets a short timeout of its own.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let timeout = self.timeout.min(Duration::from_secs(3));
        match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(%err, "health check failed");
                false
            }
        }
    }
}

/// Turn the logical request into the wire body, reading and encoding the
/// voice clip when one is attached.
async fn encode_payload(request: &ChatRequest) -> Result<ChatPayload, TransportError> {
    let audio = match &request.audio {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|_| TransportError::new("the voice clip could not be read"))?;
            Some(BASE64.encode(bytes))
        }
        None => None,
    };
    Ok(ChatPayload {
        user_id: request.user_id.clone(),
        latitude: request.latitude,
        longitude: request.longitude,
        text: request.text.clone(),
        audio,
        speak: request.speak,
    })
}

fn decode_reply(body: ChatResponse) -> Result<TurnResult, TransportError> {
    let audio = body
        .audio
        .map(|b64| BASE64.decode(b64))
        .transpose()
        .map_err(|_| TransportError::new("the agent's reply audio was garbled"))?;
    Ok(TurnResult {
        reply: body.response,
        transcription: body.transcription,
        audio,
    })
}

fn request_cause(err: reqwest::Error) -> TransportError {
    let cause = if err.is_timeout() {
        "the request timed out"
    } else if err.is_connect() {
        "the agent could not be reached"
    } else {
        "the request failed"
    };
    TransportError::new(cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::{compose_turn, TurnInput, FALLBACK_COORDINATES};
    use crate::location::Location;
    use std::io::Write;

    #[tokio::test]
    async fn text_payload_has_null_audio() {
        let request =
            compose_turn("user_1", Location::Unknown, TurnInput::text("find gas"), false).unwrap();
        let payload = encode_payload(&request).await.unwrap();

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["user_id"], "user_1");
        assert_eq!(json["latitude"], FALLBACK_COORDINATES.latitude);
        assert_eq!(json["text"], "find gas");
        assert!(json["audio"].is_null());
        assert_eq!(json["speak"], false);
    }

    #[tokio::test]
    async fn voice_payload_is_base64_of_the_clip() {
        let mut clip = tempfile::NamedTempFile::new().unwrap();
        clip.write_all(b"RIFFfake-wav-bytes").unwrap();

        let request = compose_turn(
            "user_1",
            Location::Unknown,
            TurnInput::voice(clip.path()),
            true,
        )
        .unwrap();
        let payload = encode_payload(&request).await.unwrap();

        assert!(payload.text.is_none());
        assert_eq!(payload.audio.as_deref(), Some(BASE64.encode(b"RIFFfake-wav-bytes").as_str()));
        assert!(payload.speak);
    }

    #[tokio::test]
    async fn missing_clip_normalizes_to_a_transport_error() {
        let request = compose_turn(
            "user_1",
            Location::Unknown,
            TurnInput::voice("/no/such/clip.wav"),
            false,
        )
        .unwrap();
        let err = encode_payload(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "the voice clip could not be read");
    }

    #[test]
    fn reply_parses_with_and_without_optional_fields() {
        let body: ChatResponse =
            serde_json::from_str(r#"{"response": "Here are 3 stations"}"#).unwrap();
        let result = decode_reply(body).unwrap();
        assert_eq!(result.reply, "Here are 3 stations");
        assert_eq!(result.transcription, None);
        assert_eq!(result.audio, None);

        let body: ChatResponse = serde_json::from_str(
            r#"{"response": "ok", "transcription": "find gas near me", "audio": "aGVsbG8="}"#,
        )
        .unwrap();
        let result = decode_reply(body).unwrap();
        assert_eq!(result.transcription.as_deref(), Some("find gas near me"));
        assert_eq!(result.audio.as_deref(), Some(b"hello".as_slice()));
    }

    #[test]
    fn garbled_reply_audio_is_one_transport_error() {
        let body: ChatResponse =
            serde_json::from_str(r#"{"response": "ok", "audio": "!!not-base64!!"}"#).unwrap();
        let err = decode_reply(body).unwrap_err();
        assert_eq!(err.to_string(), "the agent's reply audio was garbled");
    }

    #[tokio::test]
    async fn unreachable_backend_is_one_transport_error() {
        // Port 9 (discard) on localhost is not listening.
        let client = AgentClient::new("http://127.0.0.1:9", Duration::from_millis(500));
        let request =
            compose_turn("user_1", Location::Unknown, TurnInput::text("hi"), false).unwrap();
        let err = client.send(&request).await.unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
