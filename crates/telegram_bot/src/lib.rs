//! Telegram bot.
//!
//! The bot is the only user-facing surface of the rental engine: it keeps
//! per-chat conversation state, turns button presses and typed text into
//! engine calls and renders the replies.

use engine::Engine;
use teloxide::prelude::*;

mod handlers;
mod parsing;
mod state;
mod ui;

#[derive(Clone)]
pub struct ConfigParameters {
    engine: Engine,
    sessions: state::SessionStore,
}

pub struct Bot {
    token: String,
    engine: Engine,
}

impl Bot {
    pub fn new(token: &str, engine: Engine) -> Result<Self, String> {
        if token.trim().is_empty() {
            return Err("telegram token is empty".to_string());
        }
        Ok(Self {
            token: token.to_string(),
            engine,
        })
    }

    pub fn builder() -> BotBuilder {
        BotBuilder::default()
    }

    pub async fn run(&self) {
        tracing::info!("Starting telegram bot...");

        let bot = teloxide::Bot::new(&self.token);

        let parameters = ConfigParameters {
            engine: self.engine.clone(),
            sessions: state::SessionStore::default(),
        };

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(handlers::handle_message))
            .branch(Update::filter_callback_query().endpoint(handlers::handle_callback));

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![parameters])
            .default_handler(|upd| async move {
                tracing::debug!("Unhandled update: {:?}", upd.kind);
            })
            .error_handler(LoggingErrorHandler::with_custom_text(
                "An error has occurred in the dispatcher",
            ))
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }
}

#[derive(Default)]
pub struct BotBuilder {
    token: String,
    engine: Option<Engine>,
}

impl BotBuilder {
    pub fn token(mut self, token: &str) -> BotBuilder {
        self.token = token.to_string();
        self
    }

    pub fn engine(mut self, engine: Engine) -> BotBuilder {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> Result<Bot, String> {
        tracing::info!("Initializing telegram bot...");
        let engine = self
            .engine
            .ok_or_else(|| "telegram bot needs an engine".to_string())?;
        Bot::new(&self.token, engine)
    }
}
