pub mod chat;
pub mod clock;
pub mod commands;
pub mod config;
pub mod db;
pub mod doc_processor;
pub mod error;
pub mod llm;
pub mod ui;

use clock::SystemClock;
use commands::ChatApp;
use config::AppConfig;
use db::Store;
use error::AppError;
use std::sync::Arc;
use tracing::info;

/// Load configuration, open the store and run the terminal chat.
pub async fn run() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let store = Arc::new(Store::new(&config.data_dir)?);
    info!(data_dir = %config.data_dir.display(), provider = ?config.provider, "starting urdu-gpt");

    let app = ChatApp::new(config, store, Arc::new(SystemClock), Box::new(ui::TerminalBell));
    ui::run_terminal(app).await
}
