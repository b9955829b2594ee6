//! Callback data carried by inline buttons.
//!
//! Telegram limits callback data to 64 bytes, so every action is a short
//! `:`-separated token with at most two numeric arguments.

use engine::{EditableField, FieldChoice};

/// Longest payload Telegram accepts.
pub(crate) const MAX_CALLBACK_LEN: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MailboxEdit {
    Replace,
    Login,
    Password,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Action {
    Menu,
    ListAccounts,
    MyAccount,
    WhoAmI,
    Rent,
    RentAccount(i64),
    RentDuration(u32),
    CodeNeeded(bool),
    CancelRental,
    Return,
    ReturnUpdate(bool),
    ReturnFields(FieldChoice),
    CancelReturn,
    AddAccount,
    DraftAnswer(bool),
    EditAccounts,
    EditAccount(i64),
    EditField(i64, EditableField),
    EditMailbox(i64),
    MailboxField(i64, MailboxEdit),
    AccountHistory(i64),
    DeleteAccounts,
    DeleteAccount(i64),
    Users,
    PendingUsers,
    Approve(i64),
    Reject(i64),
    DeleteUser(i64),
    Broadcast,
}

impl Action {
    pub(crate) fn encode(self) -> String {
        match self {
            Self::Menu => "menu".to_string(),
            Self::ListAccounts => "acc:list".to_string(),
            Self::MyAccount => "acc:my".to_string(),
            Self::WhoAmI => "whoami".to_string(),
            Self::Rent => "rent".to_string(),
            Self::RentAccount(id) => format!("rent:acc:{id}"),
            Self::RentDuration(minutes) => format!("rent:dur:{minutes}"),
            Self::CodeNeeded(needed) => format!("rent:code:{}", flag(needed)),
            Self::CancelRental => "rent:cancel".to_string(),
            Self::Return => "ret".to_string(),
            Self::ReturnUpdate(update) => format!("ret:upd:{}", flag(update)),
            Self::ReturnFields(choice) => format!("ret:fields:{}", choice_token(choice)),
            Self::CancelReturn => "ret:cancel".to_string(),
            Self::AddAccount => "adm:add".to_string(),
            Self::DraftAnswer(answer) => format!("adm:add:{}", flag(answer)),
            Self::EditAccounts => "adm:edit".to_string(),
            Self::EditAccount(id) => format!("adm:edit:{id}"),
            Self::EditField(id, field) => format!("adm:field:{id}:{}", field.as_str()),
            Self::EditMailbox(id) => format!("adm:mail:{id}"),
            Self::MailboxField(id, edit) => format!("adm:mail:{id}:{}", mailbox_token(edit)),
            Self::AccountHistory(id) => format!("adm:log:{id}"),
            Self::DeleteAccounts => "adm:del".to_string(),
            Self::DeleteAccount(id) => format!("adm:del:{id}"),
            Self::Users => "usr:all".to_string(),
            Self::PendingUsers => "usr:pending".to_string(),
            Self::Approve(id) => format!("usr:ok:{id}"),
            Self::Reject(id) => format!("usr:no:{id}"),
            Self::DeleteUser(id) => format!("usr:del:{id}"),
            Self::Broadcast => "adm:bcast".to_string(),
        }
    }

    pub(crate) fn decode(data: &str) -> Option<Action> {
        if data.len() > MAX_CALLBACK_LEN {
            return None;
        }
        let parts: Vec<&str> = data.split(':').collect();
        let action = match parts.as_slice() {
            ["menu"] => Self::Menu,
            ["acc", "list"] => Self::ListAccounts,
            ["acc", "my"] => Self::MyAccount,
            ["whoami"] => Self::WhoAmI,
            ["rent"] => Self::Rent,
            ["rent", "acc", id] => Self::RentAccount(id.parse().ok()?),
            ["rent", "dur", minutes] => Self::RentDuration(minutes.parse().ok()?),
            ["rent", "code", needed] => Self::CodeNeeded(parse_flag(needed)?),
            ["rent", "cancel"] => Self::CancelRental,
            ["ret"] => Self::Return,
            ["ret", "upd", update] => Self::ReturnUpdate(parse_flag(update)?),
            ["ret", "fields", choice] => Self::ReturnFields(parse_choice(choice)?),
            ["ret", "cancel"] => Self::CancelReturn,
            ["adm", "add"] => Self::AddAccount,
            ["adm", "add", answer] => Self::DraftAnswer(parse_flag(answer)?),
            ["adm", "edit"] => Self::EditAccounts,
            ["adm", "edit", id] => Self::EditAccount(id.parse().ok()?),
            ["adm", "field", id, field] => {
                Self::EditField(id.parse().ok()?, EditableField::try_from(*field).ok()?)
            }
            ["adm", "mail", id] => Self::EditMailbox(id.parse().ok()?),
            ["adm", "mail", id, edit] => {
                Self::MailboxField(id.parse().ok()?, parse_mailbox_edit(edit)?)
            }
            ["adm", "log", id] => Self::AccountHistory(id.parse().ok()?),
            ["adm", "del"] => Self::DeleteAccounts,
            ["adm", "del", id] => Self::DeleteAccount(id.parse().ok()?),
            ["adm", "bcast"] => Self::Broadcast,
            ["usr", "all"] => Self::Users,
            ["usr", "pending"] => Self::PendingUsers,
            ["usr", "ok", id] => Self::Approve(id.parse().ok()?),
            ["usr", "no", id] => Self::Reject(id.parse().ok()?),
            ["usr", "del", id] => Self::DeleteUser(id.parse().ok()?),
            _ => return None,
        };
        Some(action)
    }
}

fn flag(value: bool) -> &'static str {
    if value { "y" } else { "n" }
}

fn parse_flag(token: &str) -> Option<bool> {
    match token {
        "y" => Some(true),
        "n" => Some(false),
        _ => None,
    }
}

fn choice_token(choice: FieldChoice) -> &'static str {
    match choice {
        FieldChoice::Mmr => "mmr",
        FieldChoice::Behavior => "behavior",
        FieldChoice::Both => "both",
    }
}

fn parse_choice(token: &str) -> Option<FieldChoice> {
    match token {
        "mmr" => Some(FieldChoice::Mmr),
        "behavior" => Some(FieldChoice::Behavior),
        "both" => Some(FieldChoice::Both),
        _ => None,
    }
}

fn mailbox_token(edit: MailboxEdit) -> &'static str {
    match edit {
        MailboxEdit::Replace => "new",
        MailboxEdit::Login => "login",
        MailboxEdit::Password => "password",
    }
}

fn parse_mailbox_edit(token: &str) -> Option<MailboxEdit> {
    match token {
        "new" => Some(MailboxEdit::Replace),
        "login" => Some(MailboxEdit::Login),
        "password" => Some(MailboxEdit::Password),
        _ => None,
    }
}

/// Slash commands understood in plain messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Start,
    Menu,
    Cancel,
}

pub(crate) fn parse_command(text: &str) -> Option<Command> {
    let first = text.split_whitespace().next()?;
    // Group chats append the bot name: `/start@rent_bot`.
    let name = first.strip_prefix('/')?.split('@').next()?;
    match name {
        "start" => Some(Command::Start),
        "menu" => Some(Command::Menu),
        "cancel" => Some(Command::Cancel),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_field_keeps_both_arguments() {
        let data = Action::EditField(42, EditableField::Calibration).encode();
        assert_eq!(data, "adm:field:42:calibration");
        assert_eq!(
            Action::decode(&data),
            Some(Action::EditField(42, EditableField::Calibration))
        );
    }

    #[test]
    fn mailbox_menu_and_mailbox_field_do_not_collide() {
        assert_eq!(Action::decode("adm:mail:7"), Some(Action::EditMailbox(7)));
        assert_eq!(
            Action::decode("adm:mail:7:password"),
            Some(Action::MailboxField(7, MailboxEdit::Password))
        );
    }

    #[test]
    fn malformed_data_is_ignored() {
        for data in [
            "",
            "rent:acc:abc",
            "rent:dur:-60",
            "rent:code:maybe",
            "adm:field:1:colour",
            "usr:ok",
            "menu:extra",
        ] {
            assert_eq!(Action::decode(data), None, "{data}");
        }
    }

    #[test]
    fn largest_ids_fit_in_callback_data() {
        let data = Action::EditField(i64::MIN, EditableField::Calibration).encode();
        assert!(data.len() <= MAX_CALLBACK_LEN);
        let data = Action::MailboxField(i64::MAX, MailboxEdit::Password).encode();
        assert!(data.len() <= MAX_CALLBACK_LEN);
    }

    #[test]
    fn commands_accept_bot_suffix_and_arguments() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/start@rent_bot ref"), Some(Command::Start));
        assert_eq!(parse_command(" /cancel"), Some(Command::Cancel));
        assert_eq!(parse_command("/stop"), None);
        assert_eq!(parse_command("start"), None);
    }
}
