use chrono::Utc;
use engine::{EngineError, NewUser, Registration, ReturnState};
use teloxide::{
    prelude::*,
    types::{CallbackQuery, ChatId, InlineKeyboardMarkup, User},
};

use crate::{
    ConfigParameters,
    parsing::{Action, Command, parse_command},
    state::Session,
    ui,
};

mod admin;
mod rental;

/// Text and keyboard of one bot message.
pub(crate) type Screen = (String, InlineKeyboardMarkup);

/// Result of an action: a screen to show, nothing when the action already
/// replied on its own, or the error to report.
pub(crate) type Outcome = Result<Option<Screen>, EngineError>;

pub(crate) async fn handle_message(
    bot: Bot,
    msg: Message,
    cfg: ConfigParameters,
) -> ResponseResult<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let user_id = telegram_id(from);
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if let Some(command) = parse_command(text) {
        return match command {
            Command::Start => handle_start(&bot, chat_id, from, &cfg).await,
            Command::Menu => {
                cfg.sessions.update(chat_id, Session::leave_prompts).await;
                let outcome = show_menu(&cfg, user_id).await;
                render(&bot, chat_id, &cfg, user_id, outcome, Reply::Send).await
            }
            Command::Cancel => {
                let was_open = cfg.sessions.update(chat_id, |s| s.clear()).await;
                let text = if was_open {
                    "Cancelled."
                } else {
                    "Nothing to cancel."
                };
                bot.send_message(chat_id, text).await?;
                let outcome = show_menu(&cfg, user_id).await;
                render(&bot, chat_id, &cfg, user_id, outcome, Reply::Send).await
            }
        };
    }

    let session = cfg.sessions.get(chat_id).await;
    let awaiting_value = session
        .returning
        .as_ref()
        .is_some_and(|ctx| matches!(ctx.state(), ReturnState::InputValue(_)));
    let outcome = if awaiting_value {
        rental::submit_return_value(&cfg, chat_id, text).await
    } else if let Some(pending) = session.pending {
        admin::handle_pending(&bot, &cfg, chat_id, user_id, pending, text).await
    } else {
        bot.send_message(chat_id, "Use /menu to pick an action.")
            .await?;
        return Ok(());
    };
    render(&bot, chat_id, &cfg, user_id, outcome, Reply::Send).await
}

pub(crate) async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    cfg: ConfigParameters,
) -> ResponseResult<()> {
    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let chat_id = message.chat().id;
    let user_id = telegram_id(&q.from);

    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(action) = q.data.as_deref().and_then(Action::decode) else {
        tracing::debug!(data = ?q.data, "unknown callback data");
        return Ok(());
    };

    cfg.sessions
        .update(chat_id, |s| s.hub_message_id = Some(message.id()))
        .await;
    let outcome = run_action(&bot, &cfg, chat_id, user_id, action).await;
    render(&bot, chat_id, &cfg, user_id, outcome, Reply::Edit).await
}

async fn run_action(
    bot: &Bot,
    cfg: &ConfigParameters,
    chat_id: ChatId,
    user_id: i64,
    action: Action,
) -> Outcome {
    match action {
        Action::Menu => {
            cfg.sessions.update(chat_id, Session::leave_prompts).await;
            show_menu(cfg, user_id).await
        }
        Action::ListAccounts => show_accounts(cfg, user_id).await,
        Action::MyAccount => show_my_account(cfg, user_id).await,
        Action::WhoAmI => {
            let user = cfg.engine.require_approved(user_id).await?;
            Ok(Some(ui::render_whoami(&user, cfg.engine.is_admin(user_id))))
        }
        Action::Rent => rental::start(cfg, chat_id, user_id).await,
        Action::RentAccount(account_id) => {
            rental::select_account(cfg, chat_id, account_id).await
        }
        Action::RentDuration(minutes) => rental::select_duration(cfg, chat_id, minutes).await,
        Action::CodeNeeded(needed) => rental::confirm_code(bot, cfg, chat_id, needed).await,
        Action::CancelRental => rental::cancel(cfg, chat_id).await,
        Action::Return => rental::start_return(cfg, chat_id, user_id).await,
        Action::ReturnUpdate(update) => rental::answer_update(cfg, chat_id, update).await,
        Action::ReturnFields(choice) => rental::choose_fields(cfg, chat_id, choice).await,
        Action::CancelReturn => rental::cancel_return(cfg, chat_id).await,
        Action::AddAccount
        | Action::DraftAnswer(_)
        | Action::EditAccounts
        | Action::EditAccount(_)
        | Action::EditField(..)
        | Action::EditMailbox(_)
        | Action::MailboxField(..)
        | Action::AccountHistory(_)
        | Action::DeleteAccounts
        | Action::DeleteAccount(_)
        | Action::Users
        | Action::PendingUsers
        | Action::Approve(_)
        | Action::Reject(_)
        | Action::DeleteUser(_)
        | Action::Broadcast => admin::run(bot, cfg, chat_id, user_id, action).await,
    }
}

async fn handle_start(
    bot: &Bot,
    chat_id: ChatId,
    from: &User,
    cfg: &ConfigParameters,
) -> ResponseResult<()> {
    let user_id = telegram_id(from);
    let new_user = NewUser {
        telegram_id: user_id,
        username: from.username.clone(),
        first_name: Some(from.first_name.clone()),
        last_name: from.last_name.clone(),
    };

    let registration = match cfg.engine.register_user(new_user, Utc::now()).await {
        Ok(registration) => registration,
        Err(err) => return report(bot, chat_id, cfg, user_id, err).await,
    };

    match registration {
        Registration::Created(user) if !user.is_approved => {
            tracing::info!(user_id, "new user waiting for approval");
            bot.send_message(
                chat_id,
                "Thanks for signing up! An admin has to approve you before you can rent.",
            )
            .await?;
            let (text, kb) = ui::pending_user_card(&user);
            for admin_id in cfg.engine.admins() {
                notify(bot, admin_id, text.clone(), Some(kb.clone())).await;
            }
            Ok(())
        }
        Registration::Existing(user) if !user.is_approved => {
            bot.send_message(chat_id, "⏳ Your account is still waiting for admin approval.")
                .await?;
            Ok(())
        }
        Registration::Created(user) | Registration::Existing(user) => {
            let screen = ui::render_menu(&user, cfg.engine.is_admin(user_id));
            render(bot, chat_id, cfg, user_id, Ok(Some(screen)), Reply::Send).await
        }
    }
}

async fn show_menu(cfg: &ConfigParameters, user_id: i64) -> Outcome {
    let user = cfg.engine.require_approved(user_id).await?;
    Ok(Some(ui::render_menu(&user, cfg.engine.is_admin(user_id))))
}

async fn show_accounts(cfg: &ConfigParameters, user_id: i64) -> Outcome {
    cfg.engine.require_approved(user_id).await?;
    let is_admin = cfg.engine.is_admin(user_id);
    let mut rows = Vec::new();
    for account in cfg.engine.accounts().await? {
        let mailbox = if is_admin {
            cfg.engine.mailbox(account.id).await?
        } else {
            None
        };
        rows.push((account, mailbox));
    }
    Ok(Some(ui::render_accounts(&rows, is_admin)))
}

async fn show_my_account(cfg: &ConfigParameters, user_id: i64) -> Outcome {
    cfg.engine.require_approved(user_id).await?;
    let account = cfg.engine.active_rental(user_id).await?;
    let mailbox = match &account {
        Some(account) => cfg.engine.mailbox(account.id).await?,
        None => None,
    };
    Ok(Some(ui::render_my_account(
        account.as_ref(),
        mailbox.as_ref(),
        cfg.engine.is_admin(user_id),
    )))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reply {
    /// Replace the message whose button was pressed.
    Edit,
    /// Post a new message below the user's text.
    Send,
}

async fn render(
    bot: &Bot,
    chat_id: ChatId,
    cfg: &ConfigParameters,
    user_id: i64,
    outcome: Outcome,
    reply: Reply,
) -> ResponseResult<()> {
    let (text, kb) = match outcome {
        Ok(Some(screen)) => screen,
        Ok(None) => return Ok(()),
        Err(err) => return report(bot, chat_id, cfg, user_id, err).await,
    };

    match reply {
        Reply::Edit => edit_or_send(bot, chat_id, cfg, text, kb).await,
        Reply::Send => send_hub(bot, chat_id, cfg, text, kb).await,
    }
}

/// Errors go out as a fresh message so the screen the user was on stays
/// usable. Invalid input keeps the conversation where it was.
async fn report(
    bot: &Bot,
    chat_id: ChatId,
    cfg: &ConfigParameters,
    user_id: i64,
    err: EngineError,
) -> ResponseResult<()> {
    match &err {
        EngineError::Database(db_err) => {
            tracing::error!(user_id, "storage failure: {db_err}");
            cfg.sessions.update(chat_id, |s| s.clear()).await;
        }
        EngineError::InvalidState(_) | EngineError::InvalidTransition(_) => {
            tracing::warn!(user_id, "{err}");
        }
        _ => tracing::debug!(user_id, "{err}"),
    }

    let request = bot.send_message(chat_id, ui::error_text(&err));
    if matches!(err, EngineError::InvalidInput(_)) {
        request.await?;
    } else {
        request.reply_markup(ui::back_only()).await?;
    }
    Ok(())
}

async fn edit_or_send(
    bot: &Bot,
    chat_id: ChatId,
    cfg: &ConfigParameters,
    text: String,
    kb: InlineKeyboardMarkup,
) -> ResponseResult<()> {
    let session = cfg.sessions.get(chat_id).await;
    if let Some(message_id) = session.hub_message_id
        && bot
            .edit_message_text(chat_id, message_id, text.clone())
            .reply_markup(kb.clone())
            .await
            .is_ok()
    {
        return Ok(());
    }

    send_hub(bot, chat_id, cfg, text, kb).await
}

async fn send_hub(
    bot: &Bot,
    chat_id: ChatId,
    cfg: &ConfigParameters,
    text: String,
    kb: InlineKeyboardMarkup,
) -> ResponseResult<()> {
    let sent = bot.send_message(chat_id, text).reply_markup(kb).await?;
    cfg.sessions
        .update(chat_id, |s| s.hub_message_id = Some(sent.id))
        .await;
    Ok(())
}

/// Message someone other than the sender. Failures are logged only: the
/// recipient may have blocked the bot.
pub(crate) async fn notify(
    bot: &Bot,
    telegram_id: i64,
    text: String,
    kb: Option<InlineKeyboardMarkup>,
) -> bool {
    let request = bot.send_message(ChatId(telegram_id), text);
    let sent = match kb {
        Some(kb) => request.reply_markup(kb).await,
        None => request.await,
    };
    match sent {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(telegram_id, "notification not delivered: {err}");
            false
        }
    }
}

/// Telegram user ids fit in 52 bits, the database keeps them as `i64`.
fn telegram_id(user: &User) -> i64 {
    user.id.0 as i64
}
