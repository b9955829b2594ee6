//! Rent and return conversations.
//!
//! Contexts live in the session store between button presses. Each step
//! takes the context out, lets the engine advance it and puts it back unless
//! the conversation is over. A failed step drops it, except for input or
//! stale-button errors which leave the conversation where it was.

use chrono::Utc;
use engine::{
    EngineError, FieldChoice, RentalContext, RentalReply, ReturnContext, ReturnReply,
    cancel_pair,
};
use teloxide::{
    prelude::*,
    types::{ChatId, MessageId},
};
use tokio::sync::mpsc;

use super::{Outcome, edit_or_send};
use crate::{ConfigParameters, ui};

fn expired() -> Outcome {
    Ok(Some((
        "This conversation is over. Start again from the menu.".to_string(),
        ui::back_only(),
    )))
}

fn keeps_context(err: &EngineError) -> bool {
    matches!(
        err,
        EngineError::InvalidInput(_) | EngineError::InvalidTransition(_)
    )
}

async fn take_rental(cfg: &ConfigParameters, chat_id: ChatId) -> Option<RentalContext> {
    cfg.sessions.update(chat_id, |s| s.rental.take()).await
}

async fn store_rental(cfg: &ConfigParameters, chat_id: ChatId, ctx: RentalContext) {
    cfg.sessions
        .update(chat_id, |s| s.rental = (!ctx.is_finished()).then_some(ctx))
        .await;
}

async fn finish_rental_step(
    cfg: &ConfigParameters,
    chat_id: ChatId,
    ctx: RentalContext,
    result: Result<RentalReply, EngineError>,
) -> Outcome {
    match result {
        Ok(reply) => {
            store_rental(cfg, chat_id, ctx).await;
            Ok(Some(ui::render_rental(&reply)))
        }
        Err(err) => {
            if keeps_context(&err) {
                store_rental(cfg, chat_id, ctx).await;
            }
            Err(err)
        }
    }
}

pub(super) async fn start(cfg: &ConfigParameters, chat_id: ChatId, user_id: i64) -> Outcome {
    if cfg.sessions.get(chat_id).await.code_wait.is_some() {
        return Err(EngineError::Conflict(
            "a code wait is still running".to_string(),
        ));
    }
    let (ctx, reply) = cfg.engine.start_rental(user_id).await?;
    cfg.sessions.update(chat_id, |s| s.returning = None).await;
    store_rental(cfg, chat_id, ctx).await;
    Ok(Some(ui::render_rental(&reply)))
}

pub(super) async fn select_account(
    cfg: &ConfigParameters,
    chat_id: ChatId,
    account_id: i64,
) -> Outcome {
    let Some(mut ctx) = take_rental(cfg, chat_id).await else {
        return expired();
    };
    let result = cfg.engine.select_rental_account(&mut ctx, account_id).await;
    finish_rental_step(cfg, chat_id, ctx, result).await
}

pub(super) async fn select_duration(
    cfg: &ConfigParameters,
    chat_id: ChatId,
    minutes: u32,
) -> Outcome {
    let Some(mut ctx) = take_rental(cfg, chat_id).await else {
        return expired();
    };
    let result = cfg
        .engine
        .select_rental_duration(&mut ctx, minutes, Utc::now())
        .await;
    finish_rental_step(cfg, chat_id, ctx, result).await
}

pub(super) async fn confirm_code(
    bot: &Bot,
    cfg: &ConfigParameters,
    chat_id: ChatId,
    needed: bool,
) -> Outcome {
    let Some(mut ctx) = take_rental(cfg, chat_id).await else {
        return expired();
    };
    let result = cfg
        .engine
        .confirm_code_required(&mut ctx, needed, Utc::now())
        .await;
    let reply = match result {
        Ok(reply @ RentalReply::WaitingForCode { .. }) => reply,
        result => return finish_rental_step(cfg, chat_id, ctx, result).await,
    };

    let (text, kb) = ui::render_rental(&reply);
    if let Err(err) = edit_or_send(bot, chat_id, cfg, text, kb).await {
        tracing::warn!("code wait screen not shown: {err}");
    }
    let message_id = cfg.sessions.get(chat_id).await.hub_message_id;
    spawn_code_wait(bot.clone(), cfg.clone(), chat_id, ctx, message_id).await;
    Ok(None)
}

/// Run the code wait off the dispatcher so the chat stays responsive and the
/// cancel button can reach it.
async fn spawn_code_wait(
    bot: Bot,
    cfg: ConfigParameters,
    chat_id: ChatId,
    mut ctx: RentalContext,
    message_id: Option<MessageId>,
) {
    let (handle, mut signal) = cancel_pair();
    cfg.sessions
        .update(chat_id, |s| s.code_wait = Some(handle))
        .await;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<(u32, u32)>();
    let progress_bot = bot.clone();
    tokio::spawn(async move {
        while let Some((attempt, total)) = progress_rx.recv().await {
            let Some(message_id) = message_id else {
                continue;
            };
            let (text, kb) = ui::render_wait_progress(attempt, total);
            if let Err(err) = progress_bot
                .edit_message_text(chat_id, message_id, text)
                .reply_markup(kb)
                .await
            {
                tracing::debug!("progress not shown: {err}");
            }
        }
    });

    tokio::spawn(async move {
        let result = cfg
            .engine
            .await_rental_code(&mut ctx, &mut signal, move |attempt, total| {
                let _ = progress_tx.send((attempt, total));
            })
            .await;
        cfg.sessions.update(chat_id, |s| s.code_wait = None).await;

        let (text, kb) = match result {
            Ok(reply) => ui::render_rental(&reply),
            Err(err) => {
                tracing::error!(user_id = ctx.user_id(), "code wait failed: {err}");
                (ui::error_text(&err), ui::back_only())
            }
        };
        if let Err(err) = bot.send_message(chat_id, text).reply_markup(kb).await {
            tracing::warn!("code wait result not delivered: {err}");
        }
    });
}

pub(super) async fn cancel(cfg: &ConfigParameters, chat_id: ChatId) -> Outcome {
    if let Some(handle) = cfg.sessions.update(chat_id, |s| s.code_wait.take()).await {
        // The wait task posts the outcome.
        handle.cancel();
        return Ok(None);
    }
    let Some(mut ctx) = take_rental(cfg, chat_id).await else {
        return expired();
    };
    let reply = cfg.engine.cancel_rental(&mut ctx)?;
    Ok(Some(ui::render_rental(&reply)))
}

async fn take_return(cfg: &ConfigParameters, chat_id: ChatId) -> Option<ReturnContext> {
    cfg.sessions.update(chat_id, |s| s.returning.take()).await
}

async fn finish_return_step(
    cfg: &ConfigParameters,
    chat_id: ChatId,
    ctx: ReturnContext,
    result: Result<ReturnReply, EngineError>,
) -> Outcome {
    let keep = match &result {
        Ok(_) => !ctx.is_finished(),
        Err(err) => keeps_context(err),
    };
    if keep {
        cfg.sessions
            .update(chat_id, |s| s.returning = Some(ctx))
            .await;
    }
    result.map(|reply| Some(ui::render_return(&reply)))
}

pub(super) async fn start_return(
    cfg: &ConfigParameters,
    chat_id: ChatId,
    user_id: i64,
) -> Outcome {
    let (ctx, reply) = cfg.engine.start_return(user_id).await?;
    finish_return_step(cfg, chat_id, ctx, Ok(reply)).await
}

pub(super) async fn answer_update(
    cfg: &ConfigParameters,
    chat_id: ChatId,
    update: bool,
) -> Outcome {
    let Some(mut ctx) = take_return(cfg, chat_id).await else {
        return expired();
    };
    let result = cfg.engine.answer_update(&mut ctx, update, Utc::now()).await;
    finish_return_step(cfg, chat_id, ctx, result).await
}

pub(super) async fn choose_fields(
    cfg: &ConfigParameters,
    chat_id: ChatId,
    choice: FieldChoice,
) -> Outcome {
    let Some(mut ctx) = take_return(cfg, chat_id).await else {
        return expired();
    };
    let result = cfg.engine.choose_fields(&mut ctx, choice);
    finish_return_step(cfg, chat_id, ctx, result).await
}

pub(super) async fn submit_return_value(
    cfg: &ConfigParameters,
    chat_id: ChatId,
    raw: &str,
) -> Outcome {
    let Some(mut ctx) = take_return(cfg, chat_id).await else {
        return expired();
    };
    let result = cfg.engine.submit_value(&mut ctx, raw, Utc::now()).await;
    finish_return_step(cfg, chat_id, ctx, result).await
}

pub(super) async fn cancel_return(cfg: &ConfigParameters, chat_id: ChatId) -> Outcome {
    let Some(mut ctx) = take_return(cfg, chat_id).await else {
        return expired();
    };
    let reply = cfg.engine.cancel_return(&mut ctx)?;
    Ok(Some(ui::render_return(&reply)))
}
