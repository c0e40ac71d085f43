use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::agent::{AgentClient, TransportError, TurnResult};
use crate::composer::{compose_turn, TurnInput};
use crate::identity::IdentityStore;
use crate::location::LocationProvider;
use crate::transcript::{Transcript, TurnId};

/// Bound on the single startup location fix.
pub const LOCATION_FIX_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
    /// Entering the path of a recorded clip to send as a voice turn.
    VoicePrompt,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Message input
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Voice prompt input
    pub voice_input: String,

    // Conversation state
    pub transcript: Transcript,
    pub identity: IdentityStore,
    pub location: LocationProvider,
    pub agent: AgentClient,
    pub speak_replies: bool,

    // Voice capability, decided once at startup
    pub voice_enabled: bool,
    pub audio_dir: Option<PathBuf>,

    pub backend_online: bool,

    // At most one turn in flight; while this is Some, sending is refused
    pub turn_task: Option<(TurnId, JoinHandle<Result<TurnResult, TransportError>>)>,

    // Transient footer notice
    pub notice: Option<String>,

    // Chat viewport (dimensions updated during render)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub total_chat_lines: u16,
    pub follow_chat: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(
        agent: AgentClient,
        identity: IdentityStore,
        location: LocationProvider,
        speak_replies: bool,
        audio_dir: Option<PathBuf>,
    ) -> Self {
        let voice_enabled = audio_dir.as_deref().map_or(false, |d| d.is_dir());
        Self {
            should_quit: false,
            input_mode: InputMode::Normal,

            input: String::new(),
            cursor: 0,
            voice_input: String::new(),

            transcript: Transcript::with_welcome(),
            identity,
            location,
            agent,
            speak_replies,

            voice_enabled,
            audio_dir,

            backend_online: false,

            turn_task: None,
            notice: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            total_chat_lines: 0,
            follow_chat: true,

            animation_frame: 0,
        }
    }

    /// One-time startup probes: backend health, a single bounded location
    /// fix, and warming the identity so the first send never waits on it.
    pub async fn startup(&mut self) {
        self.backend_online = self.agent.health().await;
        self.location.refresh(LOCATION_FIX_TIMEOUT).await;
        self.identity.get_or_create();
    }

    pub fn is_sending(&self) -> bool {
        self.turn_task.is_some()
    }

    /// Send the typed message, if any. Clears the input only when the
    /// turn was actually dispatched.
    pub fn submit_message(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }
        if self.submit(TurnInput::text(text)) {
            self.input.clear();
            self.cursor = 0;
            self.input_mode = InputMode::Normal;
        }
    }

    /// Send the clip named in the voice prompt as a voice turn.
    pub fn submit_voice_clip(&mut self) {
        let entry = self.voice_input.trim().to_string();
        if entry.is_empty() {
            return;
        }
        let path = self.resolve_clip(&entry);
        if !path.is_file() {
            self.notice = Some(format!("no clip at {}", path.display()));
            return;
        }
        if self.submit(TurnInput::voice(path)) {
            self.voice_input.clear();
            self.input_mode = InputMode::Normal;
        }
    }

    fn resolve_clip(&self, entry: &str) -> PathBuf {
        let path = PathBuf::from(entry);
        if path.is_relative() {
            if let Some(dir) = &self.audio_dir {
                return dir.join(path);
            }
        }
        path
    }

    /// Compose and dispatch one turn. Refused while another turn is in
    /// flight: the transcript supports a single pending turn, so this
    /// gate is an invariant, not a UI nicety.
    fn submit(&mut self, input: TurnInput) -> bool {
        if self.turn_task.is_some() {
            return false;
        }
        let identity = self.identity.get_or_create();
        let request = match compose_turn(
            &identity,
            self.location.last_known(),
            input.clone(),
            self.speak_replies,
        ) {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "refusing to send");
                return false;
            }
        };

        let id = self.transcript.append_user_turn(&input);
        let agent = self.agent.clone();
        self.turn_task = Some((id, tokio::spawn(async move { agent.send(&request).await })));
        self.follow_chat = true;
        true
    }

    /// Called on every tick: fold a finished turn back into the
    /// transcript. Does nothing while the request is still running.
    pub async fn poll_turn(&mut self) {
        let Some((id, task)) = self.turn_task.take() else {
            return;
        };
        if !task.is_finished() {
            self.turn_task = Some((id, task));
            return;
        }
        match task.await {
            Ok(Ok(result)) => self.transcript.reconcile(id, &result),
            Ok(Err(err)) => {
                debug!(%err, "turn failed");
                self.transcript.record_failure(id);
            }
            Err(err) => {
                warn!(%err, "turn task aborted");
                self.transcript.record_failure(id);
            }
        }
        self.follow_chat = true;
    }

    /// Start over: fresh transcript, fresh identity. An in-flight
    /// response, if any, finds its turn gone and no-ops.
    pub fn new_conversation(&mut self) {
        self.transcript.reset();
        self.identity.reset();
        self.notice = Some("started a new chat".to_string());
        self.chat_scroll = 0;
        self.follow_chat = true;
    }

    pub fn tick_animation(&mut self) {
        self.animation_frame = (self.animation_frame + 1) % 3;
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
        self.follow_chat = false;
    }

    pub fn scroll_down(&mut self) {
        let bottom = self.total_chat_lines.saturating_sub(self.chat_height);
        self.chat_scroll = (self.chat_scroll + 1).min(bottom);
        self.follow_chat = self.chat_scroll == bottom;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_chat = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Coordinates, FixedSource};
    use tempfile::TempDir;

    fn test_app() -> (App, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let identity = IdentityStore::at(dir.path().join("user_id"));
        let location = LocationProvider::new(Box::new(FixedSource(Coordinates {
            latitude: 51.5,
            longitude: -0.12,
        })));
        // Port 9 (discard) is not listening; sends fail fast.
        let agent = AgentClient::new("http://127.0.0.1:9", Duration::from_millis(200));
        let app = App::new(agent, identity, location, false, None);
        (app, dir)
    }

    #[tokio::test]
    async fn second_send_is_refused_while_one_is_in_flight() {
        let (mut app, _dir) = test_app();
        let before = app.transcript.len();

        app.input = "find gas".to_string();
        app.submit_message();
        assert!(app.is_sending());
        assert_eq!(app.transcript.len(), before + 1);
        assert_eq!(app.input, "");

        app.input = "second message".to_string();
        app.submit_message();
        // Refused: input stays, transcript unchanged.
        assert_eq!(app.input, "second message");
        assert_eq!(app.transcript.len(), before + 1);
    }

    #[tokio::test]
    async fn finished_turn_is_reconciled_on_poll() {
        let (mut app, _dir) = test_app();
        let id = app.transcript.append_user_turn(&TurnInput::text("hello"));
        app.turn_task = Some((
            id,
            tokio::spawn(async {
                Ok(TurnResult {
                    reply: "hi there".to_string(),
                    transcription: None,
                    audio: None,
                })
            }),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        app.poll_turn().await;

        assert!(!app.is_sending());
        assert_eq!(app.transcript.turns().last().unwrap().text, "hi there");
    }

    #[tokio::test]
    async fn failed_turn_appends_the_apology() {
        let (mut app, _dir) = test_app();
        app.input = "anything".to_string();
        app.submit_message();

        // The discard port refuses quickly; wait for the task to settle.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            app.poll_turn().await;
            if !app.is_sending() {
                break;
            }
        }

        assert!(!app.is_sending());
        let last = app.transcript.turns().last().unwrap();
        assert_eq!(last.text, crate::transcript::APOLOGY_TEXT);
    }

    #[tokio::test]
    async fn response_arriving_after_reset_changes_nothing() {
        let (mut app, _dir) = test_app();
        let id = app.transcript.append_user_turn(&TurnInput::text("still there?"));
        app.turn_task = Some((
            id,
            tokio::spawn(async {
                Ok(TurnResult {
                    reply: "late answer".to_string(),
                    transcription: None,
                    audio: None,
                })
            }),
        ));

        app.new_conversation();
        tokio::time::sleep(Duration::from_millis(50)).await;
        app.poll_turn().await;

        assert_eq!(app.transcript.len(), 1);
        assert_eq!(app.transcript.turns()[0].text, crate::transcript::WELCOME_TEXT);
    }

    #[tokio::test]
    async fn new_conversation_rotates_the_identity() {
        let (mut app, _dir) = test_app();
        let old = app.identity.get_or_create();
        app.new_conversation();
        let new = app.identity.get_or_create();
        assert_ne!(old, new);
        assert_eq!(app.transcript.len(), 1);
    }
}
