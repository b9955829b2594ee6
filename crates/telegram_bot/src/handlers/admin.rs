//! Inventory and user management, available to configured admins only.

use chrono::Utc;
use engine::{AccountField, EngineError, MailboxCredentials, parse_credentials_pair};
use teloxide::{prelude::*, types::ChatId};

use super::{Outcome, Screen, notify};
use crate::{
    ConfigParameters,
    parsing::{Action, MailboxEdit},
    state::{AccountDraft, DraftProgress, PendingAction},
    ui,
};

/// Screen with a single "back to menu" button.
fn notice(text: impl Into<String>) -> Option<Screen> {
    Some((text.into(), ui::back_only()))
}

async fn set_pending(cfg: &ConfigParameters, chat_id: ChatId, pending: PendingAction) {
    cfg.sessions
        .update(chat_id, |s| s.pending = Some(pending))
        .await;
}

async fn clear_pending(cfg: &ConfigParameters, chat_id: ChatId) {
    cfg.sessions.update(chat_id, |s| s.pending = None).await;
}

pub(super) async fn run(
    bot: &Bot,
    cfg: &ConfigParameters,
    chat_id: ChatId,
    user_id: i64,
    action: Action,
) -> Outcome {
    if !cfg.engine.is_admin(user_id) {
        return Err(EngineError::Forbidden("admin only".to_string()));
    }

    match action {
        Action::AddAccount => {
            let draft = AccountDraft::new();
            let (text, kb) = ui::draft_prompt(draft.step());
            set_pending(cfg, chat_id, PendingAction::NewAccount(draft)).await;
            Ok(Some((text, kb.unwrap_or_else(ui::back_only))))
        }
        Action::DraftAnswer(answer) => {
            let pending = cfg.sessions.get(chat_id).await.pending;
            let Some(PendingAction::NewAccount(mut draft)) = pending else {
                return Ok(notice("No account is being added."));
            };
            let progress = draft.submit_answer(answer);
            continue_draft(cfg, chat_id, user_id, draft, progress).await
        }
        Action::EditAccounts => {
            let accounts = cfg.engine.accounts().await?;
            Ok(Some(ui::render_account_picker(
                "Pick an account to edit:",
                &accounts,
                Action::EditAccount,
            )))
        }
        Action::EditAccount(account_id) => {
            clear_pending(cfg, chat_id).await;
            editor(cfg, account_id).await
        }
        Action::EditField(account_id, field) => {
            cfg.engine.account(account_id).await?;
            set_pending(
                cfg,
                chat_id,
                PendingAction::EditValue { account_id, field },
            )
            .await;
            Ok(notice(ui::field_prompt(field)))
        }
        Action::EditMailbox(account_id) => {
            clear_pending(cfg, chat_id).await;
            cfg.engine.account(account_id).await?;
            let mailbox = cfg.engine.mailbox(account_id).await?;
            Ok(Some(ui::render_mailbox_menu(account_id, mailbox.as_ref())))
        }
        Action::MailboxField(account_id, edit) => {
            cfg.engine.account(account_id).await?;
            set_pending(cfg, chat_id, PendingAction::Mailbox { account_id, edit }).await;
            Ok(notice(ui::mailbox_prompt(edit)))
        }
        Action::AccountHistory(account_id) => {
            let logs = cfg.engine.logs_for_account(user_id, account_id).await?;
            Ok(Some(ui::render_history(account_id, &logs)))
        }
        Action::DeleteAccounts => {
            let accounts = cfg.engine.accounts().await?;
            Ok(Some(ui::render_account_picker(
                "Pick an account to delete:",
                &accounts,
                Action::DeleteAccount,
            )))
        }
        Action::DeleteAccount(account_id) => {
            let account = cfg.engine.delete_account(user_id, account_id).await?;
            if let Some(rental) = &account.rental {
                let text = format!(
                    "Account {} was removed by an admin. Your rental has ended.",
                    account.login
                );
                notify(bot, rental.renter_id, text, None).await;
            }
            Ok(notice(format!(
                "Account #{} ({}) deleted.",
                account.id, account.login
            )))
        }
        Action::Users => {
            let users = cfg.engine.all_users(user_id).await?;
            Ok(Some(ui::render_users(&users, |id| cfg.engine.is_admin(id))))
        }
        Action::PendingUsers => {
            let users = cfg.engine.pending_users(user_id).await?;
            if users.is_empty() {
                return Ok(notice("No users are waiting for approval."));
            }
            for user in &users {
                let (text, kb) = ui::pending_user_card(user);
                notify(bot, user_id, text, Some(kb)).await;
            }
            Ok(notice(format!("{} user(s) waiting for approval.", users.len())))
        }
        Action::Approve(target_id) => {
            let user = cfg.engine.approve_user(user_id, target_id).await?;
            let (text, kb) = ui::render_menu(&user, cfg.engine.is_admin(target_id));
            notify(
                bot,
                target_id,
                format!("✅ Your account was approved.\n\n{text}"),
                Some(kb),
            )
            .await;
            Ok(notice(format!("{} approved.", user.display_name())))
        }
        Action::Reject(target_id) => {
            let user = cfg.engine.reject_user(user_id, target_id).await?;
            notify(
                bot,
                target_id,
                "❌ Your registration was rejected.".to_string(),
                None,
            )
            .await;
            Ok(notice(format!("{} rejected.", user.display_name())))
        }
        Action::DeleteUser(target_id) => {
            let released = cfg
                .engine
                .delete_user(user_id, target_id, Utc::now())
                .await?;
            let text = if released.is_empty() {
                format!("User {target_id} deleted.")
            } else {
                let ids: Vec<String> = released.iter().map(|id| format!("#{id}")).collect();
                format!(
                    "User {target_id} deleted. Released accounts: {}.",
                    ids.join(", ")
                )
            };
            Ok(notice(text))
        }
        Action::Broadcast => {
            set_pending(cfg, chat_id, PendingAction::Broadcast).await;
            Ok(notice("Send the message to broadcast to every user:"))
        }
        other => {
            tracing::warn!(?other, "not an admin action");
            Ok(None)
        }
    }
}

/// Typed answer to whatever the admin was asked last.
pub(super) async fn handle_pending(
    bot: &Bot,
    cfg: &ConfigParameters,
    chat_id: ChatId,
    user_id: i64,
    pending: PendingAction,
    text: &str,
) -> Outcome {
    if !cfg.engine.is_admin(user_id) {
        clear_pending(cfg, chat_id).await;
        return Err(EngineError::Forbidden("admin only".to_string()));
    }

    match pending {
        PendingAction::NewAccount(mut draft) => {
            let progress = draft.submit(text);
            continue_draft(cfg, chat_id, user_id, draft, progress).await
        }
        PendingAction::EditValue { account_id, field } => {
            let value = AccountField::parse(field, text)?;
            cfg.engine
                .update_account_field(user_id, account_id, value)
                .await?;
            clear_pending(cfg, chat_id).await;
            editor(cfg, account_id).await
        }
        PendingAction::Mailbox { account_id, edit } => {
            match edit {
                MailboxEdit::Replace => {
                    let (login, password) = parse_credentials_pair(text)?;
                    let credentials = MailboxCredentials { login, password };
                    cfg.engine
                        .set_mailbox(user_id, account_id, credentials)
                        .await?;
                }
                MailboxEdit::Login => {
                    cfg.engine
                        .update_mailbox_login(user_id, account_id, text)
                        .await?;
                }
                MailboxEdit::Password => {
                    cfg.engine
                        .update_mailbox_password(user_id, account_id, text)
                        .await?;
                }
            }
            clear_pending(cfg, chat_id).await;
            let mailbox = cfg.engine.mailbox(account_id).await?;
            Ok(Some(ui::render_mailbox_menu(account_id, mailbox.as_ref())))
        }
        PendingAction::Broadcast => {
            let message = engine::normalize_required_text(text, "message")?;
            clear_pending(cfg, chat_id).await;
            let recipients = cfg.engine.broadcast_recipients(user_id).await?;
            let mut delivered = 0;
            for recipient in &recipients {
                if notify(bot, *recipient, format!("📢 {message}"), None).await {
                    delivered += 1;
                }
            }
            tracing::info!(
                admin_id = user_id,
                delivered,
                total = recipients.len(),
                "broadcast sent"
            );
            Ok(notice(format!(
                "Delivered to {delivered} of {} users.",
                recipients.len()
            )))
        }
    }
}

async fn continue_draft(
    cfg: &ConfigParameters,
    chat_id: ChatId,
    admin_id: i64,
    draft: AccountDraft,
    progress: Result<DraftProgress, EngineError>,
) -> Outcome {
    // Invalid answers keep the draft on the same step.
    set_pending(cfg, chat_id, PendingAction::NewAccount(draft)).await;
    let (account, mailbox) = match progress? {
        DraftProgress::Ask(step) => {
            let (text, kb) = ui::draft_prompt(step);
            return Ok(Some((text, kb.unwrap_or_else(ui::back_only))));
        }
        DraftProgress::Complete { account, mailbox } => (account, mailbox),
    };

    clear_pending(cfg, chat_id).await;
    let account = cfg.engine.new_account(admin_id, account, mailbox).await?;
    let mailbox = cfg.engine.mailbox(account.id).await?;
    let (details, kb) = ui::render_account_editor(&account, mailbox.as_ref());
    Ok(Some((format!("✅ Account added.\n\n{details}"), kb)))
}

async fn editor(cfg: &ConfigParameters, account_id: i64) -> Outcome {
    let account = cfg.engine.account(account_id).await?;
    let mailbox = cfg.engine.mailbox(account_id).await?;
    Ok(Some(ui::render_account_editor(&account, mailbox.as_ref())))
}
