//! Terminal front-end: a line-oriented chat loop over `ChatApp`.

use crate::chat::{ChatEvent, ReplyOutcome};
use crate::commands::{ChatApp, Cue, Feedback, SettledReply};
use crate::db::models::{CachedFile, ConversationSummary, Message, MessageStatus, Role, Theme};
use crate::error::AppError;
use chrono::{DateTime, Local, TimeZone};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

const HELP: &str = "\
Type a message and press Enter to chat. Commands:
  /new [title]        start a new conversation
  /chats              list conversations
  /open <n|id>        switch to a conversation
  /search <text>      search titles and messages
  /pin <n|id>         pin or unpin a conversation
  /rename <n|id> <t>  rename a conversation
  /delete <n|id>      delete a conversation
  /clear              clear the current conversation
  /upload <path>      cache a file and add its content to the next message
  /attach <path>      send an image or audio file with the next message
  /files              list cached files
  /use <file-id>      add a cached file to the next message
  /forget <file-id>   remove a cached file
  /purge              remove all cached files
  /discard            drop anything staged for the next message
  /sound              toggle message sounds
  /theme <dark|light|system>
  /sidebar            toggle the conversation list
  /key <api-key>      save a Gemini API key
  /settings           show settings
  /help               show this help
  /quit               exit";

/// Rings the terminal bell for every cue.
pub struct TerminalBell;

impl Feedback for TerminalBell {
    fn play(&self, _cue: Cue) {
        print!("\x07");
        let _ = std::io::stdout().flush();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New(Option<String>),
    Chats,
    Open(String),
    Search(String),
    Pin(String),
    Rename(String, String),
    Delete(String),
    Clear,
    Upload(PathBuf),
    Attach(PathBuf),
    Files,
    Use(String),
    Forget(String),
    Purge,
    Discard,
    Sound,
    Theme(String),
    Sidebar,
    Key(String),
    Settings,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let arg_string = || arg.to_string();

    match name {
        "new" => Command::New(Some(arg_string()).filter(|a| !a.is_empty())),
        "chats" | "list" => Command::Chats,
        "open" if !arg.is_empty() => Command::Open(arg_string()),
        "search" => Command::Search(arg_string()),
        "pin" if !arg.is_empty() => Command::Pin(arg_string()),
        "rename" => match arg.split_once(char::is_whitespace) {
            Some((target, title)) if !title.trim().is_empty() => {
                Command::Rename(target.to_string(), title.trim().to_string())
            }
            _ => Command::Unknown(line.to_string()),
        },
        "delete" if !arg.is_empty() => Command::Delete(arg_string()),
        "clear" => Command::Clear,
        "upload" if !arg.is_empty() => Command::Upload(PathBuf::from(arg)),
        "attach" if !arg.is_empty() => Command::Attach(PathBuf::from(arg)),
        "files" => Command::Files,
        "use" if !arg.is_empty() => Command::Use(arg_string()),
        "forget" if !arg.is_empty() => Command::Forget(arg_string()),
        "purge" => Command::Purge,
        "discard" => Command::Discard,
        "sound" => Command::Sound,
        "theme" => Command::Theme(arg_string()),
        "sidebar" => Command::Sidebar,
        "key" if !arg.is_empty() => Command::Key(arg_string()),
        "settings" => Command::Settings,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// `HH:MM` for today, `DD/MM/YYYY, HH:MM` otherwise.
pub fn format_message_time<Tz: TimeZone>(at: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    if at.date_naive() == now.date_naive() {
        at.format("%H:%M").to_string()
    } else {
        at.format("%d/%m/%Y, %H:%M").to_string()
    }
}

fn status_label(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Sending => "sending",
        MessageStatus::Sent => "sent ✓",
        MessageStatus::Delivered => "delivered ✓✓",
        MessageStatus::Read => "read ✓✓",
        MessageStatus::Failed => "failed ✗",
    }
}

fn render_message(message: &Message) {
    let at = message.timestamp.with_timezone(&Local);
    let time = format_message_time(&at, &Local::now());
    match message.role {
        Role::User => {
            let status = message.status.map(status_label).unwrap_or_default();
            println!("[{}] you: {}  ({})", time, message.history_text(), status);
        }
        Role::Assistant => {
            println!("[{}] UrduGPT:", time);
            for line in message.content.lines() {
                println!("    {}", line);
            }
        }
    }
}

fn render_chats(chats: &[ConversationSummary], current: Option<&str>) {
    if chats.is_empty() {
        println!("No conversations yet");
        return;
    }
    for (i, chat) in chats.iter().enumerate() {
        let marker = if Some(chat.id.as_str()) == current { "*" } else { " " };
        let pin = if chat.is_pinned { "📌 " } else { "" };
        println!(
            "{}{:>3}. {}{}  [{}]  {}",
            marker,
            i + 1,
            pin,
            chat.title,
            &chat.id[..8.min(chat.id.len())],
            chat.preview
        );
    }
}

fn render_files(files: &[CachedFile]) {
    if files.is_empty() {
        println!("No cached files");
        return;
    }
    for file in files {
        println!(
            "  {}  {}  ({:.1} KB, {})",
            file.id,
            file.name,
            file.size as f64 / 1024.0,
            file.mime_type
        );
    }
}

fn render_event(app: &ChatApp, event: &ChatEvent) {
    match event {
        ChatEvent::MessageAppended {
            conversation_id,
            message,
        } if app.current_chat() == Some(conversation_id.as_str()) => render_message(message),
        ChatEvent::StatusChanged {
            conversation_id,
            status,
            ..
        } if app.current_chat() == Some(conversation_id.as_str()) => {
            println!("    {}", status_label(*status));
        }
        ChatEvent::ConversationCleared { .. } => println!("(conversation cleared)"),
        ChatEvent::ConversationDeleted { .. } => println!("(conversation deleted)"),
        _ => {}
    }
}

fn render_current(app: &ChatApp) {
    match app.current_conversation() {
        Some(conversation) if !conversation.messages.is_empty() => {
            println!("── {} ──", conversation.title);
            for message in &conversation.messages {
                render_message(message);
            }
        }
        _ => {
            println!("Welcome to UrduGPT");
            println!("Start a conversation and I'll respond with Urdu poetry.");
        }
    }
}

fn report(result: Result<(), AppError>) {
    if let Err(err) = result {
        println!("! {}", err);
    }
}

enum Flow {
    Continue,
    Quit,
}

fn with_chat<F>(app: &mut ChatApp, reference: &str, f: F) -> Result<(), AppError>
where
    F: FnOnce(&mut ChatApp, &str) -> Result<(), AppError>,
{
    let id = app
        .find_chat(reference)
        .ok_or_else(|| AppError::ConversationNotFound(reference.to_string()))?;
    f(app, &id)
}

fn handle_command(
    app: &mut ChatApp,
    command: Command,
    replies: &mpsc::UnboundedSender<SettledReply>,
) -> Flow {
    match command {
        Command::Send(text) => match app.submit(&text) {
            Ok(pending) => {
                let replies = replies.clone();
                tokio::spawn(async move {
                    let settled = pending.generate().await;
                    // The receiver is gone only when the app is shutting down.
                    let _ = replies.send(settled);
                });
            }
            Err(AppError::EmptyPrompt) => {}
            Err(err) => println!("! {}", err),
        },
        Command::New(title) => {
            let conversation = app.new_chat(title.as_deref());
            println!("── {} ──", conversation.title);
            if app.sidebar_open() {
                render_chats(&app.list_chats(), app.current_chat());
            }
        }
        Command::Chats => render_chats(&app.list_chats(), app.current_chat()),
        Command::Open(reference) => report(with_chat(app, &reference, |app, id| {
            app.select_chat(id)?;
            render_current(app);
            Ok(())
        })),
        Command::Search(query) => render_chats(&app.search_chats(&query), app.current_chat()),
        Command::Pin(reference) => report(with_chat(app, &reference, |app, id| {
            let pinned = app.toggle_pin(id)?;
            println!("{}", if pinned { "Pinned" } else { "Unpinned" });
            Ok(())
        })),
        Command::Rename(reference, title) => report(with_chat(app, &reference, |app, id| {
            app.rename_chat(id, &title)
        })),
        Command::Delete(reference) => report(with_chat(app, &reference, |app, id| app.delete_chat(id))),
        Command::Clear => app.clear_chat(),
        Command::Upload(path) => report(app.upload_file(&path).map(|file| {
            println!("Cached {} as {}; it will be added to your next message", file.name, file.id);
        })),
        Command::Attach(path) => report(app.attach_media(&path).map(|kind| {
            println!("{} will be sent with your next message", kind.marker());
        })),
        Command::Files => render_files(&app.list_files()),
        Command::Use(id) => report(app.use_file(&id).map(|file| {
            println!("{} will be added to your next message", file.name);
        })),
        Command::Forget(id) => report(app.remove_file(&id)),
        Command::Purge => {
            app.clear_files();
            println!("File cache cleared");
        }
        Command::Discard => app.discard_staged(),
        Command::Sound => {
            app.toggle_sound();
        }
        Command::Theme(name) if name.is_empty() => {
            println!("theme: {:?}", app.theme());
        }
        Command::Theme(name) => match name.parse::<Theme>() {
            Ok(theme) => app.set_theme(theme),
            Err(err) => println!("! {}", err),
        },
        Command::Sidebar => {
            let open = app.toggle_sidebar();
            println!("Conversation list {}", if open { "shown" } else { "hidden" });
        }
        Command::Key(key) => report(app.set_api_key(&key).map(|_| println!("API key saved"))),
        Command::Settings => {
            for (key, value) in app.get_settings() {
                println!("  {} = {}", key, value);
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return Flow::Quit,
        Command::Unknown(line) => println!("! unknown command: {} (try /help)", line),
    }
    Flow::Continue
}

/// Drive the app from stdin until `/quit` or end of input.
pub async fn run_terminal(mut app: ChatApp) -> Result<(), AppError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SettledReply>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    if app.is_first_visit() {
        println!("All chat history is stored locally on this machine. Type /help for commands.");
        app.mark_visited();
    }
    if app.sidebar_open() {
        render_chats(&app.list_chats(), app.current_chat());
    }
    render_current(&app);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if let Flow::Quit = handle_command(&mut app, parse_command(&line), &tx) {
                    break;
                }
            }
            Some(settled) = rx.recv() => {
                if let ReplyOutcome::Failed { error, .. } = app.finish_reply(settled) {
                    warn!(%error, "reply failed");
                }
            }
            _ = ticker.tick() => {
                app.tick();
            }
        }

        for event in app.take_events() {
            render_event(&app, &event);
        }
        for notice in app.take_notices() {
            println!("» {}", notice);
        }
    }

    info!("leaving chat");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(
            parse_command("  Tell me a poem about love "),
            Command::Send("Tell me a poem about love".into())
        );
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_command("/new"), Command::New(None));
        assert_eq!(parse_command("/new Ghazal"), Command::New(Some("Ghazal".into())));
        assert_eq!(parse_command("/open 2"), Command::Open("2".into()));
        assert_eq!(
            parse_command("/rename 1 Shaam ki baat"),
            Command::Rename("1".into(), "Shaam ki baat".into())
        );
        assert_eq!(
            parse_command("/upload /tmp/notes.txt"),
            Command::Upload(PathBuf::from("/tmp/notes.txt"))
        );
        assert_eq!(parse_command("/q"), Command::Quit);
        assert!(matches!(parse_command("/open"), Command::Unknown(_)));
        assert!(matches!(parse_command("/rename 1"), Command::Unknown(_)));
        assert!(matches!(parse_command("/dance"), Command::Unknown(_)));
    }

    #[test]
    fn message_time_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 0).unwrap();
        let today = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 2, 28, 21, 0, 0).unwrap();
        assert_eq!(format_message_time(&today, &now), "07:05");
        assert_eq!(format_message_time(&earlier, &now), "28/02/2024, 21:00");
    }
}
