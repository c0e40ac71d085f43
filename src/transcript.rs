use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::agent::TurnResult;
use crate::composer::TurnInput;

/// Opening message shown after startup and after a conversation reset.
pub const WELCOME_TEXT: &str =
    "Hello! I can help you find fuel, parking, and amenities. Where are you?";

/// Shown in place of the user's words until the backend sends a transcription.
pub const VOICE_PLACEHOLDER: &str = "voice message…";

/// Appended as an agent turn when the transport fails.
pub const APOLOGY_TEXT: &str = "Sorry, I encountered an error. Please try again.";

/// Identifier for a turn, unique within a session and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Agent,
}

/// Audio attached to a turn: either the user's recorded clip on disk, or
/// reply audio the backend sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnAudio {
    Clip(PathBuf),
    Reply(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: TurnId,
    pub sender: Sender,
    pub text: String,
    pub audio: Option<TurnAudio>,
    pub at: DateTime<Utc>,
}

/// Ordered, append-only log of the conversation. Turns are only ever
/// appended, except for one permitted patch: overwriting a pending voice
/// turn's placeholder text with the server transcription.
pub struct Transcript {
    turns: Vec<Turn>,
    next_id: u64,
    pending: Option<TurnId>,
}

impl Transcript {
    /// Fresh transcript holding only the welcome turn.
    pub fn with_welcome() -> Self {
        let mut transcript = Self {
            turns: Vec::new(),
            next_id: 1,
            pending: None,
        };
        transcript.push(Sender::Agent, WELCOME_TEXT.to_string(), None);
        transcript
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Id of the user turn still waiting on a backend response, if any.
    pub fn pending(&self) -> Option<TurnId> {
        self.pending
    }

    /// Append the user's side of a turn. Voice turns show a placeholder
    /// until `reconcile` patches in the transcription.
    pub fn append_user_turn(&mut self, input: &TurnInput) -> TurnId {
        let (text, audio) = match &input.audio {
            Some(path) => (VOICE_PLACEHOLDER.to_string(), Some(TurnAudio::Clip(path.clone()))),
            None => (input.text.clone().unwrap_or_default(), None),
        };
        let id = self.push(Sender::User, text, audio);
        self.pending = Some(id);
        id
    }

    /// Fold a backend response into the transcript: patch the pending
    /// user turn's text with the transcription (when present) and append
    /// the agent's reply.
    ///
    /// A stale `id` (the turn no longer exists, e.g. a reset happened
    /// while the request was in flight) makes the whole call a no-op.
    pub fn reconcile(&mut self, id: TurnId, result: &TurnResult) {
        let Some(turn) = self.turns.iter_mut().find(|t| t.id == id) else {
            return;
        };
        if let Some(transcription) = &result.transcription {
            turn.text = transcription.clone();
        }
        let audio = result.audio.clone().map(TurnAudio::Reply);
        self.push(Sender::Agent, result.reply.clone(), audio);
        if self.pending == Some(id) {
            self.pending = None;
        }
    }

    /// Close out a failed turn with the fixed apology. The user turn keeps
    /// whatever text it already shows. No-ops on a stale `id`, same as
    /// `reconcile`.
    pub fn record_failure(&mut self, id: TurnId) {
        if !self.turns.iter().any(|t| t.id == id) {
            return;
        }
        self.push(Sender::Agent, APOLOGY_TEXT.to_string(), None);
        if self.pending == Some(id) {
            self.pending = None;
        }
    }

    /// Drop the whole conversation and start over with a welcome turn.
    /// Turn ids keep counting up so an in-flight response cannot alias a
    /// new turn.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.pending = None;
        self.push(Sender::Agent, WELCOME_TEXT.to_string(), None);
    }

    fn push(&mut self, sender: Sender, text: String, audio: Option<TurnAudio>) -> TurnId {
        let id = TurnId(self.next_id);
        self.next_id += 1;
        self.turns.push(Turn {
            id,
            sender,
            text,
            audio,
            at: Utc::now(),
        });
        id
    }
}
