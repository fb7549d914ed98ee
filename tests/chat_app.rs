mod common;

use chrono::{TimeDelta, Utc};
use common::{RecordingFeedback, ScriptedClient};
use std::io::Write;
use std::sync::Arc;
use urdu_gpt_lib::chat::ReplyOutcome;
use urdu_gpt_lib::clock::ManualClock;
use urdu_gpt_lib::commands::{ChatApp, Cue};
use urdu_gpt_lib::config::AppConfig;
use urdu_gpt_lib::db::models::{MessageStatus, Theme};
use urdu_gpt_lib::db::Store;
use urdu_gpt_lib::error::AppError;
use urdu_gpt_lib::llm::LlmError;

struct Harness {
    store: Arc<Store>,
    clock: Arc<ManualClock>,
    feedback: RecordingFeedback,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(Store::in_memory().unwrap()),
            clock: Arc::new(ManualClock::new(Utc::now())),
            feedback: RecordingFeedback::default(),
        }
    }

    fn app(&self) -> ChatApp {
        self.app_configured(AppConfig::default())
    }

    fn app_configured(&self, config: AppConfig) -> ChatApp {
        ChatApp::new(
            config,
            self.store.clone(),
            self.clock.clone(),
            Box::new(self.feedback.clone()),
        )
    }

    fn app_with(&self, client: ScriptedClient) -> (ChatApp, Arc<ScriptedClient>) {
        let client = Arc::new(client);
        let app = self.app().with_client(client.clone());
        (app, client)
    }
}

#[tokio::test]
async fn send_delivers_reply_and_plays_cues() {
    let harness = Harness::new();
    let (mut app, _) = harness.app_with(ScriptedClient::replying("ishq ki nazm"));

    let outcome = app.send("Tell me a poem about love").await.unwrap();
    assert!(matches!(outcome, ReplyOutcome::Delivered(ref m) if m.content == "ishq ki nazm"));
    assert!(!app.is_loading());

    let conversation = app.current_conversation().unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(
        conversation.messages[0].status,
        Some(MessageStatus::Delivered)
    );
    assert_eq!(
        harness.feedback.cues(),
        vec![Cue::MessageSent, Cue::MessageReceived]
    );

    harness.clock.advance(TimeDelta::seconds(2));
    app.tick();
    assert_eq!(
        app.current_conversation().unwrap().messages[0].status,
        Some(MessageStatus::Read)
    );
}

#[test]
fn second_submit_while_loading_is_busy() {
    let harness = Harness::new();
    let (mut app, _) = harness.app_with(ScriptedClient::new());

    let pending = app.submit("pehla").unwrap();
    assert!(app.is_loading());
    assert!(matches!(app.submit("doosra"), Err(AppError::Busy)));
    assert_eq!(app.current_conversation().unwrap().messages.len(), 1);

    let settled = block_on(pending);
    app.finish_reply(settled);
    assert!(!app.is_loading());
    assert!(app.submit("teesra").is_ok());
}

fn block_on(
    pending: urdu_gpt_lib::commands::PendingReply,
) -> urdu_gpt_lib::commands::SettledReply {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(pending.generate())
}

#[tokio::test]
async fn failed_generation_notifies_and_reenables_input() {
    let harness = Harness::new();
    let (mut app, _) = harness.app_with(ScriptedClient::failing(LlmError::Api {
        status: 503,
        message: "overloaded".into(),
    }));

    let outcome = app.send("sawal").await.unwrap();
    assert!(matches!(outcome, ReplyOutcome::Failed { .. }));
    assert!(!app.is_loading());
    assert_eq!(
        app.take_notices(),
        vec!["Failed to generate response. Please try again.".to_string()]
    );
    assert_eq!(harness.feedback.cues(), vec![Cue::MessageSent, Cue::Error]);

    let messages = &app.current_conversation().unwrap().messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].status, Some(MessageStatus::Failed));
    assert!(messages[1].fallback);
}

#[test]
fn empty_prompt_creates_nothing() {
    let harness = Harness::new();
    let (mut app, client) = harness.app_with(ScriptedClient::new());

    assert!(matches!(app.submit("   "), Err(AppError::EmptyPrompt)));
    assert!(app.list_chats().is_empty());
    assert!(app.current_chat().is_none());
    assert!(!app.is_loading());
    assert!(client.requests().is_empty());
    assert!(harness.feedback.cues().is_empty());
}

#[test]
fn missing_api_key_is_a_configuration_error() {
    let harness = Harness::new();
    let mut app = harness.app();

    let err = app.submit("sawal").unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));
    assert!(app.list_chats().is_empty());
    assert!(!app.is_loading());
}

#[test]
fn stored_api_key_is_used_and_masked() {
    let harness = Harness::new();
    let mut app = harness.app();
    assert!(app.set_api_key("  ").is_err());

    app.set_api_key("AIzaSyExampleKey1234").unwrap();
    assert_eq!(app.get_settings()["api_key"], "AIza...1234");
    assert!(app.submit("sawal").is_ok());
}

#[test]
fn configured_key_shadows_saved_key() {
    let harness = Harness::new();
    let mut app = harness.app_configured(AppConfig {
        api_key: Some("ConfiguredKey98765".into()),
        ..AppConfig::default()
    });

    app.set_api_key("AIzaSyExampleKey1234").unwrap();
    let notices = app.take_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("takes precedence"));
    assert_eq!(app.get_settings()["api_key"], "Conf...8765");
}

#[test]
fn saving_a_key_without_configured_one_is_silent() {
    let harness = Harness::new();
    let mut app = harness.app();
    app.set_api_key("AIzaSyExampleKey1234").unwrap();
    assert!(app.take_notices().is_empty());
}

#[test]
fn current_chat_survives_restart() {
    let harness = Harness::new();
    let id = {
        let mut app = harness.app();
        let first = app.new_chat(Some("Pehli"));
        app.new_chat(Some("Doosri"));
        app.select_chat(&first.id).unwrap();
        first.id
    };

    let app = harness.app();
    assert_eq!(app.current_chat(), Some(id.as_str()));
    assert_eq!(app.list_chats().len(), 2);
}

#[test]
fn deleting_current_chat_unsets_it() {
    let harness = Harness::new();
    let mut app = harness.app();
    let conv = app.new_chat(None);

    app.delete_chat(&conv.id).unwrap();
    assert!(app.current_chat().is_none());
    assert!(harness.app().current_chat().is_none());
}

#[test]
fn find_chat_by_position_or_prefix() {
    let harness = Harness::new();
    let mut app = harness.app();
    let first = app.new_chat(Some("Pehli"));
    harness.clock.advance(TimeDelta::seconds(1));
    let second = app.new_chat(Some("Doosri"));

    assert_eq!(app.find_chat("1"), Some(second.id.clone()));
    assert_eq!(app.find_chat("2"), Some(first.id.clone()));
    assert_eq!(app.find_chat(&first.id[..8]), Some(first.id.clone()));
    assert_eq!(app.find_chat(""), None);
}

#[tokio::test]
async fn clear_chat_empties_history_and_notifies() {
    let harness = Harness::new();
    let (mut app, _) = harness.app_with(ScriptedClient::replying("jawab"));
    app.send("sawal").await.unwrap();

    app.clear_chat();
    assert!(app.current_conversation().unwrap().messages.is_empty());
    assert_eq!(
        app.take_notices(),
        vec!["Chat cleared. Your chat history has been cleared.".to_string()]
    );

    harness.clock.advance(TimeDelta::seconds(5));
    assert_eq!(app.tick(), 0);
}

#[test]
fn muted_sound_plays_no_cues() {
    let harness = Harness::new();
    let (mut app, _) = harness.app_with(ScriptedClient::new());
    assert!(app.sound_enabled());

    assert!(!app.toggle_sound());
    app.take_notices();
    app.submit("sawal").unwrap();
    assert!(harness.feedback.cues().is_empty());
    assert!(!harness.app().sound_enabled());
}

#[test]
fn preferences_persist() {
    let harness = Harness::new();
    let mut app = harness.app();
    assert!(app.is_first_visit());
    assert_eq!(app.theme(), Theme::Dark);

    app.mark_visited();
    app.set_theme(Theme::Light);
    assert!(!app.toggle_sidebar());

    let app = harness.app();
    assert!(!app.is_first_visit());
    assert_eq!(app.theme(), Theme::Light);
    assert!(!app.sidebar_open());
}

#[tokio::test]
async fn uploaded_file_content_prefixes_next_prompt() {
    let harness = Harness::new();
    let (mut app, client) = harness.app_with(ScriptedClient::replying("tabsira"));

    let mut upload = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    write!(upload, "Mir Taqi Mir ka sher").unwrap();
    let cached = app.upload_file(upload.path()).unwrap();
    assert_eq!(cached.mime_type, "text/plain");
    assert!(app.snapshot().has_staged_context);
    assert_eq!(app.list_files().len(), 1);

    app.send("iski tashreeh karo").await.unwrap();
    let requests = client.requests();
    assert_eq!(requests[0].prompt, "Mir Taqi Mir ka sher\n\niski tashreeh karo");
    assert!(!app.snapshot().has_staged_context);

    app.remove_file(&cached.id).unwrap();
    assert!(matches!(
        app.remove_file(&cached.id),
        Err(AppError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn attached_image_travels_with_prompt() {
    let harness = Harness::new();
    let (mut app, client) = harness.app_with(ScriptedClient::replying("khoobsurat"));

    let mut image = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    image.write_all(&[0x89, b'P', b'N', b'G']).unwrap();
    app.attach_media(image.path()).unwrap();

    app.send("").await.unwrap();
    let request = &client.requests()[0];
    let media = request.media.as_ref().unwrap();
    assert_eq!(media.mime_type, "image/png");
    assert_eq!(media.decoded_len(), 4);
}

#[test]
fn unsupported_attachment_is_rejected() {
    let harness = Harness::new();
    let mut app = harness.app();
    let file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    assert!(matches!(
        app.attach_media(file.path()),
        Err(AppError::UnsupportedFile(_))
    ));
    assert!(!app.snapshot().has_staged_media);
}
