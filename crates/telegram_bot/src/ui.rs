use chrono::{DateTime, Utc};
use chrono_tz::Europe::Moscow;
use engine::{
    Account, AccountLog, EditableField, EngineError, FieldChoice, Mailbox, RentalReply,
    ReturnField, ReturnReply, User,
};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::{
    parsing::{Action, MailboxEdit},
    state::DraftStep,
};

fn button(label: impl Into<String>, action: Action) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, action.encode())
}

fn back_row() -> Vec<InlineKeyboardButton> {
    vec![button("⬅️ Menu", Action::Menu)]
}

pub(crate) fn back_only() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![back_row()])
}

/// Timestamps are shown in Moscow time, everything else stays UTC.
pub(crate) fn format_moscow(at: DateTime<Utc>) -> String {
    at.with_timezone(&Moscow).format("%d.%m.%Y %H:%M MSK").to_string()
}

pub(crate) fn format_duration(minutes: u32) -> String {
    let (hours, mins) = (minutes / 60, minutes % 60);
    match (hours, mins) {
        (0, mins) => format!("{mins} min"),
        (hours, 0) => format!("{hours} h"),
        (hours, mins) => format!("{hours} h {mins} min"),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn behavior(account: &Account) -> String {
    account
        .behavior
        .map_or_else(|| "-".to_string(), |b| b.to_string())
}

pub(crate) fn main_menu(is_admin: bool) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![
            button("🔍 Accounts", Action::ListAccounts),
            button("📦 My account", Action::MyAccount),
        ],
        vec![
            button("📥 Rent", Action::Rent),
            button("📤 Return", Action::Return),
        ],
        vec![button("👤 Who am I", Action::WhoAmI)],
    ];
    if is_admin {
        rows.push(vec![
            button("➕ Add account", Action::AddAccount),
            button("✏️ Edit account", Action::EditAccounts),
        ]);
        rows.push(vec![button("🗑 Delete account", Action::DeleteAccounts)]);
        rows.push(vec![
            button("📋 All users", Action::Users),
            button("🆕 Pending users", Action::PendingUsers),
        ]);
        rows.push(vec![button("📣 Broadcast", Action::Broadcast)]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub(crate) fn render_menu(user: &User, is_admin: bool) -> (String, InlineKeyboardMarkup) {
    let role = if is_admin { "admin" } else { "user" };
    let text = format!(
        "Hi {}! You are signed in as {role}.\nPick an action:",
        user.display_name()
    );
    (text, main_menu(is_admin))
}

pub(crate) fn account_summary(account: &Account) -> String {
    let status = match &account.rental {
        Some(rental) => format!("rented until {}", format_moscow(rental.ends_at())),
        None => "free".to_string(),
    };
    format!(
        "#{} • MMR {} • behavior {} • calibrated {} • {status}",
        account.id,
        account.mmr,
        behavior(account),
        yes_no(account.calibration),
    )
}

/// Full card with credentials. Only for admins and the current renter.
pub(crate) fn account_details(account: &Account, mailbox: Option<&Mailbox>) -> String {
    let mut text = format!(
        "Account #{}\nLogin: {}\nPassword: {}\nMMR: {}\nBehavior: {}\nCalibrated: {}",
        account.id,
        account.login,
        account.password,
        account.mmr,
        behavior(account),
        yes_no(account.calibration),
    );
    if let Some(mailbox) = mailbox {
        text.push_str(&format!(
            "\nMailbox: {}\nMailbox password: {}",
            mailbox.login.as_deref().unwrap_or("-"),
            mailbox.password.as_deref().unwrap_or("-"),
        ));
    }
    if let Some(rental) = &account.rental {
        text.push_str(&format!(
            "\nRenter: {}\nRented at: {}\nDuration: {}\nReturn by: {}",
            rental.renter_id,
            format_moscow(rental.rented_at),
            format_duration(u32::try_from(rental.duration_minutes).unwrap_or_default()),
            format_moscow(rental.ends_at()),
        ));
    }
    text
}

pub(crate) fn render_accounts(
    accounts: &[(Account, Option<Mailbox>)],
    is_admin: bool,
) -> (String, InlineKeyboardMarkup) {
    if accounts.is_empty() {
        return ("No accounts yet.".to_string(), back_only());
    }
    let blocks: Vec<String> = accounts
        .iter()
        .map(|(account, mailbox)| {
            if is_admin {
                account_details(account, mailbox.as_ref())
            } else {
                account_summary(account)
            }
        })
        .collect();
    let separator = if is_admin { "\n\n" } else { "\n" };
    (
        format!("Accounts:\n\n{}", blocks.join(separator)),
        back_only(),
    )
}

pub(crate) fn render_my_account(
    account: Option<&Account>,
    mailbox: Option<&Mailbox>,
    is_admin: bool,
) -> (String, InlineKeyboardMarkup) {
    let Some(account) = account else {
        return ("You have no rented account.".to_string(), back_only());
    };
    // Renters only see whether a mailbox exists, not its password.
    let text = if is_admin {
        account_details(account, mailbox)
    } else {
        let mut text = account_details(account, None);
        text.push_str(&format!("\nCode by email: {}", yes_no(mailbox.is_some())));
        text
    };
    let kb = InlineKeyboardMarkup::new(vec![
        vec![button("📤 Return", Action::Return)],
        back_row(),
    ]);
    (text, kb)
}

pub(crate) fn render_whoami(user: &User, is_admin: bool) -> (String, InlineKeyboardMarkup) {
    let text = format!(
        "ID: {}\nUsername: {}\nName: {}\nRole: {}\nApproved: {}\nRegistered: {}",
        user.telegram_id,
        user.username
            .as_deref()
            .map_or_else(|| "-".to_string(), |u| format!("@{u}")),
        [user.first_name.as_deref(), user.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" "),
        if is_admin { "admin" } else { "user" },
        yes_no(user.is_approved),
        format_moscow(user.registered_at),
    );
    (text, back_only())
}

pub(crate) fn render_rental(reply: &RentalReply) -> (String, InlineKeyboardMarkup) {
    let cancel_row = vec![button("✖️ Cancel", Action::CancelRental)];
    match reply {
        RentalReply::NoFreeAccounts => ("No free accounts right now.".to_string(), back_only()),
        RentalReply::ChooseAccount { accounts } => {
            let mut rows: Vec<Vec<InlineKeyboardButton>> = accounts
                .iter()
                .map(|account| {
                    vec![button(
                        format!(
                            "#{} • MMR {} • behavior {}",
                            account.id,
                            account.mmr,
                            behavior(account)
                        ),
                        Action::RentAccount(account.id),
                    )]
                })
                .collect();
            rows.push(cancel_row);
            (
                "Choose an account:".to_string(),
                InlineKeyboardMarkup::new(rows),
            )
        }
        RentalReply::ChooseDuration {
            account_id,
            durations,
        } => {
            let mut rows: Vec<Vec<InlineKeyboardButton>> = durations
                .chunks(3)
                .map(|chunk| {
                    chunk
                        .iter()
                        .map(|minutes| {
                            button(format_duration(*minutes), Action::RentDuration(*minutes))
                        })
                        .collect()
                })
                .collect();
            rows.push(cancel_row);
            (
                format!("Account #{account_id}. For how long?"),
                InlineKeyboardMarkup::new(rows),
            )
        }
        RentalReply::ConfirmCode { account } => (
            format!(
                "Account #{} is yours.\nLogin: {}\nPassword: {}\n\nDo you need a Steam Guard code?",
                account.id, account.login, account.password
            ),
            InlineKeyboardMarkup::new(vec![vec![
                button("✅ Yes", Action::CodeNeeded(true)),
                button("❌ No", Action::CodeNeeded(false)),
            ]]),
        ),
        RentalReply::WaitingForCode { account, attempts } => (
            format!(
                "Log in to account #{} now. Waiting for the code email ({attempts} checks)...",
                account.id
            ),
            InlineKeyboardMarkup::new(vec![cancel_row]),
        ),
        RentalReply::Rented { account, code } => {
            let mut text = format!(
                "✅ Rented account #{}\nLogin: {}\nPassword: {}",
                account.id, account.login, account.password
            );
            if let Some(rental) = &account.rental {
                text.push_str(&format!("\nReturn by: {}", format_moscow(rental.ends_at())));
            }
            if let Some(code) = code {
                text.push_str(&format!("\nSteam Guard code: {code}"));
            }
            (text, back_only())
        }
        RentalReply::CodeNotObtained { account } => (
            format!(
                "⚠️ No code arrived for account #{}. The rental stays active; \
                 contact an admin if you cannot log in.",
                account.id
            ),
            back_only(),
        ),
        RentalReply::Aborted { reason } => (format!("Rental aborted: {reason}."), back_only()),
        RentalReply::Cancelled => ("Rental cancelled.".to_string(), back_only()),
    }
}

pub(crate) fn render_wait_progress(attempt: u32, total: u32) -> (String, InlineKeyboardMarkup) {
    (
        format!("Checking the mailbox for a code: attempt {attempt} of {total}..."),
        InlineKeyboardMarkup::new(vec![vec![button("✖️ Cancel", Action::CancelRental)]]),
    )
}

fn return_field_name(field: ReturnField) -> &'static str {
    match field {
        ReturnField::Mmr => "MMR",
        ReturnField::Behavior => "behavior",
    }
}

pub(crate) fn render_return(reply: &ReturnReply) -> (String, InlineKeyboardMarkup) {
    let cancel_row = vec![button("✖️ Cancel", Action::CancelReturn)];
    match reply {
        ReturnReply::AskUpdate { account } => (
            format!(
                "Returning account #{} (MMR {}, behavior {}).\nDid MMR or behavior change?",
                account.id,
                account.mmr,
                behavior(account)
            ),
            InlineKeyboardMarkup::new(vec![
                vec![
                    button("✏️ Yes, update", Action::ReturnUpdate(true)),
                    button("📤 No, return", Action::ReturnUpdate(false)),
                ],
                cancel_row,
            ]),
        ),
        ReturnReply::ChooseFields => (
            "What changed?".to_string(),
            InlineKeyboardMarkup::new(vec![
                vec![
                    button("MMR", Action::ReturnFields(FieldChoice::Mmr)),
                    button("Behavior", Action::ReturnFields(FieldChoice::Behavior)),
                    button("Both", Action::ReturnFields(FieldChoice::Both)),
                ],
                cancel_row,
            ]),
        ),
        ReturnReply::AskValue(field) => (
            format!("Send the new {} as a number:", return_field_name(*field)),
            InlineKeyboardMarkup::new(vec![cancel_row]),
        ),
        ReturnReply::Returned { account } => (
            format!(
                "✅ Account #{} returned. MMR {}, behavior {}.",
                account.id,
                account.mmr,
                behavior(account)
            ),
            back_only(),
        ),
        ReturnReply::Aborted { reason } => (format!("Return aborted: {reason}."), back_only()),
        ReturnReply::Cancelled => ("Return cancelled.".to_string(), back_only()),
    }
}

pub(crate) fn render_account_picker(
    title: &str,
    accounts: &[Account],
    action: fn(i64) -> Action,
) -> (String, InlineKeyboardMarkup) {
    if accounts.is_empty() {
        return ("No accounts yet.".to_string(), back_only());
    }
    let mut rows: Vec<Vec<InlineKeyboardButton>> = accounts
        .iter()
        .map(|account| {
            let state = if account.is_free() { "free" } else { "rented" };
            let label = format!(
                "#{} • {} • MMR {} • {state}",
                account.id, account.login, account.mmr
            );
            vec![button(label, action(account.id))]
        })
        .collect();
    rows.push(back_row());
    (title.to_string(), InlineKeyboardMarkup::new(rows))
}

pub(crate) fn render_account_editor(
    account: &Account,
    mailbox: Option<&Mailbox>,
) -> (String, InlineKeyboardMarkup) {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = EditableField::ALL
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .map(|field| button(field.as_str(), Action::EditField(account.id, *field)))
                .collect()
        })
        .collect();
    rows.push(vec![
        button("📧 Mailbox", Action::EditMailbox(account.id)),
        button("🧾 History", Action::AccountHistory(account.id)),
    ]);
    rows.push(vec![button("⬅️ Accounts", Action::EditAccounts)]);
    (
        account_details(account, mailbox),
        InlineKeyboardMarkup::new(rows),
    )
}

pub(crate) fn render_mailbox_menu(
    account_id: i64,
    mailbox: Option<&Mailbox>,
) -> (String, InlineKeyboardMarkup) {
    let mut rows = vec![vec![button(
        "➕ New mailbox",
        Action::MailboxField(account_id, MailboxEdit::Replace),
    )]];
    let text = match mailbox {
        Some(mailbox) => {
            rows.push(vec![
                button("Login", Action::MailboxField(account_id, MailboxEdit::Login)),
                button(
                    "Password",
                    Action::MailboxField(account_id, MailboxEdit::Password),
                ),
            ]);
            format!(
                "Mailbox of account #{account_id}: {}",
                mailbox.login.as_deref().unwrap_or("-")
            )
        }
        None => format!("Account #{account_id} has no mailbox."),
    };
    rows.push(vec![button("⬅️ Account", Action::EditAccount(account_id))]);
    (text, InlineKeyboardMarkup::new(rows))
}

pub(crate) fn mailbox_prompt(edit: MailboxEdit) -> &'static str {
    match edit {
        MailboxEdit::Replace => "Send the mailbox as login:password",
        MailboxEdit::Login => "Send the new mailbox login:",
        MailboxEdit::Password => "Send the new mailbox password:",
    }
}

pub(crate) fn field_prompt(field: EditableField) -> &'static str {
    match field {
        EditableField::Login => "Send the new login:",
        EditableField::Password => "Send the new password:",
        EditableField::Mmr => "Send the new MMR (number):",
        EditableField::Behavior => "Send the new behavior (number):",
        EditableField::Calibration => "Is the account calibrated? (yes/no)",
    }
}

pub(crate) fn render_history(
    account_id: i64,
    logs: &[AccountLog],
) -> (String, InlineKeyboardMarkup) {
    let mut text = format!("History of account #{account_id}:\n");
    if logs.is_empty() {
        text.push_str("\nnothing yet");
    }
    for log in logs {
        text.push_str(&format!(
            "\n{} • user {} • {}",
            format_moscow(log.action_date),
            log.user_id,
            log.action.as_str()
        ));
    }
    let kb = InlineKeyboardMarkup::new(vec![vec![button(
        "⬅️ Account",
        Action::EditAccount(account_id),
    )]]);
    (text, kb)
}

pub(crate) fn draft_prompt(step: DraftStep) -> (String, Option<InlineKeyboardMarkup>) {
    let text = match step {
        DraftStep::Login => "Send the login of the new account:",
        DraftStep::Password => "Send the account password:",
        DraftStep::Behavior => "Send the behavior score (number):",
        DraftStep::Calibration => "Is the account calibrated?",
        DraftStep::Mmr => "Send the MMR (number):",
        DraftStep::HasMailbox => "Does the account use an email code (Steam Guard)?",
        DraftStep::MailboxLogin => "Send the mailbox login:",
        DraftStep::MailboxPassword => "Send the mailbox password:",
    };
    let kb = step.is_question().then(|| {
        InlineKeyboardMarkup::new(vec![vec![
            button("✅ Yes", Action::DraftAnswer(true)),
            button("❌ No", Action::DraftAnswer(false)),
        ]])
    });
    (format!("{text}\n/cancel to stop."), kb)
}

pub(crate) fn render_users(
    users: &[User],
    admin: impl Fn(i64) -> bool,
) -> (String, InlineKeyboardMarkup) {
    let mut text = format!("Users ({}):\n", users.len());
    let mut rows = Vec::new();
    for user in users {
        let role = if admin(user.telegram_id) {
            "admin"
        } else if user.is_approved {
            "approved"
        } else {
            "pending"
        };
        text.push_str(&format!(
            "\n{} • {} • {role}",
            user.telegram_id,
            user.display_name()
        ));
        if !admin(user.telegram_id) {
            rows.push(vec![button(
                format!("🗑 Delete {}", user.display_name()),
                Action::DeleteUser(user.telegram_id),
            )]);
        }
    }
    rows.push(back_row());
    (text, InlineKeyboardMarkup::new(rows))
}

pub(crate) fn pending_user_card(user: &User) -> (String, InlineKeyboardMarkup) {
    let text = format!(
        "New user waiting for approval:\nID: {}\nName: {}\nRegistered: {}",
        user.telegram_id,
        user.display_name(),
        format_moscow(user.registered_at)
    );
    let kb = InlineKeyboardMarkup::new(vec![
        vec![
            button("✅ Approve", Action::Approve(user.telegram_id)),
            button("❌ Reject", Action::Reject(user.telegram_id)),
        ],
        vec![button("📋 All pending", Action::PendingUsers)],
    ]);
    (text, kb)
}

/// Short message for the person who triggered the error.
pub(crate) fn error_text(err: &EngineError) -> String {
    match err {
        EngineError::Conflict(reason) => format!("⚠️ Not possible: {reason}."),
        EngineError::InvalidInput(reason) => format!("❌ {reason}. Try again."),
        EngineError::Forbidden(reason) if reason == "user not registered" => {
            "You are not registered yet. Send /start.".to_string()
        }
        EngineError::Forbidden(reason) if reason == "user not approved" => {
            "⏳ Your account is waiting for admin approval.".to_string()
        }
        EngineError::Forbidden(reason) => format!("⛔ Denied: {reason}."),
        EngineError::KeyNotFound(_) => "Not found, it may have been deleted.".to_string(),
        _ => "Something went wrong, back to the menu.".to_string(),
    }
}
