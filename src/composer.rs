use std::path::PathBuf;
use thiserror::Error;

use crate::location::{Coordinates, Location};

/// Coordinates substituted when no device fix is available. `(0, 0)` is an
/// obvious sentinel to backend operators and matches the client's historic
/// default.
pub const FALLBACK_COORDINATES: Coordinates = Coordinates {
    latitude: 0.0,
    longitude: 0.0,
};

/// What the user wants to say this turn: typed text, a recorded clip, or
/// (from a sloppy caller) both. `compose_turn` applies the precedence rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnInput {
    pub text: Option<String>,
    pub audio: Option<PathBuf>,
}

impl TurnInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            audio: None,
        }
    }

    pub fn voice(clip: impl Into<PathBuf>) -> Self {
        Self {
            text: None,
            audio: Some(clip.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.text.as_deref().map_or(true, |t| t.trim().is_empty())
    }
}

/// One logical outbound turn. The transport decides the wire encoding;
/// this is the field set the backend contract is defined over.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub text: Option<String>,
    pub audio: Option<PathBuf>,
    pub speak: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    /// Caller contract violation: a turn must carry text or a clip.
    #[error("a turn needs text or a voice clip")]
    EmptyTurn,
}

/// Assemble one outbound turn. Pure: no I/O, no shared state.
///
/// When a clip is attached, it wins and any text is dropped from the
/// request — the backend transcribes the audio instead. An unknown
/// location substitutes [`FALLBACK_COORDINATES`].
pub fn compose_turn(
    identity: &str,
    location: Location,
    input: TurnInput,
    speak: bool,
) -> Result<ChatRequest, ComposeError> {
    if input.is_empty() {
        return Err(ComposeError::EmptyTurn);
    }

    let coords = match location {
        Location::Known(c) => c,
        Location::Unknown => FALLBACK_COORDINATES,
    };

    let (text, audio) = match input.audio {
        Some(clip) => (None, Some(clip)),
        None => (input.text, None),
    };

    Ok(ChatRequest {
        user_id: identity.to_string(),
        latitude: coords.latitude,
        longitude: coords.longitude,
        text,
        audio,
        speak,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HERE: Location = Location::Known(Coordinates {
        latitude: 37.7749,
        longitude: -122.4194,
    });

    #[test]
    fn text_turn_carries_identity_location_and_text() {
        let request = compose_turn("user_abc123", HERE, TurnInput::text("find gas"), false)
            .unwrap();
        assert_eq!(request.user_id, "user_abc123");
        assert_eq!(request.latitude, 37.7749);
        assert_eq!(request.longitude, -122.4194);
        assert_eq!(request.text.as_deref(), Some("find gas"));
        assert_eq!(request.audio, None);
        assert!(!request.speak);
    }

    #[test]
    fn audio_wins_over_text() {
        let input = TurnInput {
            text: Some("ignored".to_string()),
            audio: Some(PathBuf::from("clip.wav")),
        };
        let request = compose_turn("user_abc123", HERE, input, true).unwrap();
        assert_eq!(request.text, None);
        assert_eq!(request.audio, Some(PathBuf::from("clip.wav")));
        assert!(request.speak);
    }

    #[test]
    fn unknown_location_substitutes_the_fallback_exactly() {
        let request =
            compose_turn("user_abc123", Location::Unknown, TurnInput::text("hi"), false).unwrap();
        assert_eq!(request.latitude, FALLBACK_COORDINATES.latitude);
        assert_eq!(request.longitude, FALLBACK_COORDINATES.longitude);
    }

    #[test]
    fn empty_turn_is_rejected() {
        let err = compose_turn("user_abc123", HERE, TurnInput::default(), false).unwrap_err();
        assert_eq!(err, ComposeError::EmptyTurn);

        let blank = TurnInput::text("   ");
        let err = compose_turn("user_abc123", HERE, blank, false).unwrap_err();
        assert_eq!(err, ComposeError::EmptyTurn);
    }
}
