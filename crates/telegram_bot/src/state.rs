use std::{collections::HashMap, sync::Arc};

use engine::{
    CancelHandle, EditableField, EngineError, MailboxCredentials, NewAccount, RentalContext,
    ReturnContext, normalize_required_text, parse_flag, parse_number,
};
use teloxide::types::{ChatId, MessageId};
use tokio::sync::Mutex;

use crate::parsing::MailboxEdit;

/// Questions of the add-account conversation, in the order they are asked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DraftStep {
    Login,
    Password,
    Behavior,
    Calibration,
    Mmr,
    HasMailbox,
    MailboxLogin,
    MailboxPassword,
}

impl DraftStep {
    /// Steps answered with yes/no buttons.
    pub(crate) fn is_question(self) -> bool {
        matches!(self, Self::Calibration | Self::HasMailbox)
    }
}

pub(crate) enum DraftProgress {
    Ask(DraftStep),
    Complete {
        account: NewAccount,
        mailbox: Option<MailboxCredentials>,
    },
}

/// Account being typed in by an admin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AccountDraft {
    step: DraftStep,
    login: String,
    password: String,
    behavior: Option<i32>,
    calibration: bool,
    mmr: i32,
    mailbox_login: String,
}

impl AccountDraft {
    pub(crate) fn new() -> Self {
        Self {
            step: DraftStep::Login,
            login: String::new(),
            password: String::new(),
            behavior: None,
            calibration: false,
            mmr: 0,
            mailbox_login: String::new(),
        }
    }

    pub(crate) fn step(&self) -> DraftStep {
        self.step
    }

    /// Record the answer to the current step.
    ///
    /// Invalid input leaves the draft on the same step.
    pub(crate) fn submit(&mut self, raw: &str) -> Result<DraftProgress, EngineError> {
        let next = match self.step {
            DraftStep::Login => {
                self.login = normalize_required_text(raw, "login")?;
                DraftStep::Password
            }
            DraftStep::Password => {
                self.password = normalize_required_text(raw, "password")?;
                DraftStep::Behavior
            }
            DraftStep::Behavior => {
                self.behavior = Some(parse_number(raw, "behavior")?);
                DraftStep::Calibration
            }
            DraftStep::Calibration => {
                self.calibration = parse_flag(raw);
                DraftStep::Mmr
            }
            DraftStep::Mmr => {
                self.mmr = parse_number(raw, "mmr")?;
                DraftStep::HasMailbox
            }
            DraftStep::HasMailbox => {
                if !parse_flag(raw) {
                    return Ok(self.complete(None));
                }
                DraftStep::MailboxLogin
            }
            DraftStep::MailboxLogin => {
                self.mailbox_login = normalize_required_text(raw, "mailbox login")?;
                DraftStep::MailboxPassword
            }
            DraftStep::MailboxPassword => {
                let password = normalize_required_text(raw, "mailbox password")?;
                let mailbox = MailboxCredentials {
                    login: self.mailbox_login.clone(),
                    password,
                };
                return Ok(self.complete(Some(mailbox)));
            }
        };
        self.step = next;
        Ok(DraftProgress::Ask(next))
    }

    pub(crate) fn submit_answer(&mut self, answer: bool) -> Result<DraftProgress, EngineError> {
        if !self.step.is_question() {
            return Err(EngineError::InvalidInput(
                "this step expects a typed value".to_string(),
            ));
        }
        self.submit(if answer { "yes" } else { "no" })
    }

    fn complete(&self, mailbox: Option<MailboxCredentials>) -> DraftProgress {
        DraftProgress::Complete {
            account: NewAccount {
                login: self.login.clone(),
                password: self.password.clone(),
                behavior: self.behavior,
                mmr: self.mmr,
                calibration: self.calibration,
            },
            mailbox,
        }
    }
}

/// Free text the chat is waiting for.
#[derive(Clone, Debug)]
pub(crate) enum PendingAction {
    NewAccount(AccountDraft),
    EditValue {
        account_id: i64,
        field: EditableField,
    },
    Mailbox {
        account_id: i64,
        edit: MailboxEdit,
    },
    Broadcast,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Session {
    pub hub_message_id: Option<MessageId>,
    pub pending: Option<PendingAction>,
    pub rental: Option<RentalContext>,
    /// Set while a code wait runs in the background for this chat.
    pub code_wait: Option<CancelHandle>,
    pub returning: Option<ReturnContext>,
}

impl Session {
    /// Drop every conversation of the chat.
    ///
    /// Returns whether something was open. A running code wait is cancelled;
    /// the rental it belongs to stays committed.
    pub(crate) fn clear(&mut self) -> bool {
        let open = self.pending.is_some()
            || self.rental.is_some()
            || self.code_wait.is_some()
            || self.returning.is_some();
        if let Some(handle) = self.code_wait.take() {
            handle.cancel();
        }
        self.pending = None;
        self.rental = None;
        self.returning = None;
        open
    }

    /// Back to the menu: forget questions waiting for typed answers.
    ///
    /// A running code wait and its rental are left alone.
    pub(crate) fn leave_prompts(&mut self) {
        self.pending = None;
        self.returning = None;
    }
}

#[derive(Clone, Default)]
pub(crate) struct SessionStore {
    inner: Arc<Mutex<HashMap<ChatId, Session>>>,
}

impl SessionStore {
    pub(crate) async fn get(&self, chat_id: ChatId) -> Session {
        let guard = self.inner.lock().await;
        guard.get(&chat_id).cloned().unwrap_or_default()
    }

    pub(crate) async fn update<F, T>(&self, chat_id: ChatId, f: F) -> T
    where
        F: FnOnce(&mut Session) -> T,
    {
        let mut guard = self.inner.lock().await;
        let session = guard.entry(chat_id).or_default();
        f(session)
    }
}
