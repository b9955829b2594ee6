//! The rental conversation.
//!
//! ```text
//! SelectAccount -> SelectDuration -> [ConfirmCode -> [WaitForCode]] -> Done
//! ```
//!
//! Nothing is written to the store before a duration is chosen. From that
//! point the account stays rented whatever happens to the conversation.

use chrono::{DateTime, Utc};

use crate::{
    Account, EngineError, LogAction, MailboxCredentials, ResultEngine,
    flows::code_wait::{CancelSignal, WaitOutcome, wait_for_code},
    ops::Engine,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RentalState {
    SelectAccount,
    SelectDuration,
    ConfirmCode,
    WaitForCode,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RentalEvent {
    NothingAvailable,
    AccountSelected,
    RentalCommitted { requires_code: bool },
    CodeRequired,
    CodeNotRequired,
    CodeReceived,
    AttemptsExhausted,
    Conflict,
    Cancelled,
}

impl RentalState {
    /// Transition table of the conversation.
    pub fn next(self, event: RentalEvent) -> ResultEngine<RentalState> {
        use RentalEvent as E;
        use RentalState as S;

        let next = match (self, event) {
            (S::Done, _) => None,
            (_, E::Cancelled | E::Conflict) => Some(S::Done),
            (S::SelectAccount, E::NothingAvailable) => Some(S::Done),
            (S::SelectAccount, E::AccountSelected) => Some(S::SelectDuration),
            (S::SelectDuration, E::RentalCommitted { requires_code: true }) => {
                Some(S::ConfirmCode)
            }
            (S::SelectDuration, E::RentalCommitted { requires_code: false }) => Some(S::Done),
            (S::ConfirmCode, E::CodeRequired) => Some(S::WaitForCode),
            (S::ConfirmCode, E::CodeNotRequired) => Some(S::Done),
            (S::WaitForCode, E::CodeReceived | E::AttemptsExhausted) => Some(S::Done),
            _ => None,
        };
        next.ok_or_else(|| EngineError::InvalidTransition(format!("{event:?} in {self:?}")))
    }
}

/// Per-user state of one rental conversation. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RentalContext {
    user_id: i64,
    state: RentalState,
    account_id: Option<i64>,
    duration_minutes: Option<u32>,
    mailbox: Option<MailboxCredentials>,
    code_wait_started_at: Option<DateTime<Utc>>,
}

impl RentalContext {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            state: RentalState::SelectAccount,
            account_id: None,
            duration_minutes: None,
            mailbox: None,
            code_wait_started_at: None,
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn state(&self) -> RentalState {
        self.state
    }

    pub fn account_id(&self) -> Option<i64> {
        self.account_id
    }

    pub fn duration_minutes(&self) -> Option<u32> {
        self.duration_minutes
    }

    pub fn requires_code(&self) -> bool {
        self.mailbox.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.state == RentalState::Done
    }

    fn apply(&mut self, event: RentalEvent) -> ResultEngine<()> {
        self.state = self.state.next(event)?;
        Ok(())
    }

    /// Fail unless `event` is valid right now, without moving.
    fn check(&self, event: RentalEvent) -> ResultEngine<()> {
        self.state.next(event).map(|_| ())
    }

    fn staged_account(&self) -> ResultEngine<i64> {
        self.account_id
            .ok_or_else(|| EngineError::InvalidState("no account staged".to_string()))
    }
}

/// What the transport should show after a step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RentalReply {
    NoFreeAccounts,
    ChooseAccount { accounts: Vec<Account> },
    ChooseDuration { account_id: i64, durations: Vec<u32> },
    /// Credentials are handed out; ask whether the login needs a code.
    ConfirmCode { account: Account },
    WaitingForCode { account: Account, attempts: u32 },
    Rented { account: Account, code: Option<String> },
    CodeNotObtained { account: Account },
    Aborted { reason: String },
    Cancelled,
}

impl Engine {
    /// Open a rental conversation for an approved user without a rental.
    pub async fn start_rental(&self, user_id: i64) -> ResultEngine<(RentalContext, RentalReply)> {
        self.require_approved(user_id).await?;
        if self.active_rental(user_id).await?.is_some() {
            return Err(EngineError::Conflict(
                "user already has an active rental".to_string(),
            ));
        }

        let mut ctx = RentalContext::new(user_id);
        let accounts = self.free_accounts().await?;
        if accounts.is_empty() {
            ctx.apply(RentalEvent::NothingAvailable)?;
            return Ok((ctx, RentalReply::NoFreeAccounts));
        }
        Ok((ctx, RentalReply::ChooseAccount { accounts }))
    }

    /// Stage an account. The store is not touched.
    pub async fn select_rental_account(
        &self,
        ctx: &mut RentalContext,
        account_id: i64,
    ) -> ResultEngine<RentalReply> {
        ctx.check(RentalEvent::AccountSelected)?;

        let available = match self.account(account_id).await {
            Ok(account) => account.is_free(),
            Err(EngineError::KeyNotFound(_)) => false,
            Err(err) => {
                ctx.apply(RentalEvent::Cancelled)?;
                return Err(err);
            }
        };
        if !available {
            ctx.apply(RentalEvent::Conflict)?;
            return Ok(RentalReply::Aborted {
                reason: "account is already rented".to_string(),
            });
        }

        ctx.apply(RentalEvent::AccountSelected)?;
        ctx.account_id = Some(account_id);
        Ok(RentalReply::ChooseDuration {
            account_id,
            durations: self.policy().durations.clone(),
        })
    }

    /// Commit the rental for the chosen duration.
    ///
    /// A duration outside the menu is rejected and the step can be retried.
    pub async fn select_rental_duration(
        &self,
        ctx: &mut RentalContext,
        duration_minutes: u32,
        now: DateTime<Utc>,
    ) -> ResultEngine<RentalReply> {
        ctx.check(RentalEvent::RentalCommitted {
            requires_code: false,
        })?;
        if !self.policy().durations.contains(&duration_minutes) {
            return Err(EngineError::InvalidInput(format!(
                "{duration_minutes} minutes is not an offered duration"
            )));
        }
        let account_id = ctx.staged_account()?;

        let commit = match self
            .commit_rental(ctx.user_id, account_id, duration_minutes, now)
            .await
        {
            Ok(commit) => commit,
            Err(EngineError::Conflict(reason)) => {
                ctx.apply(RentalEvent::Conflict)?;
                return Ok(RentalReply::Aborted { reason });
            }
            Err(err) => {
                ctx.apply(RentalEvent::Cancelled)?;
                return Err(err);
            }
        };

        let requires_code = commit.requires_code();
        ctx.apply(RentalEvent::RentalCommitted { requires_code })?;
        ctx.duration_minutes = Some(duration_minutes);
        if requires_code {
            ctx.mailbox = commit.mailbox;
            ctx.code_wait_started_at = Some(now);
            Ok(RentalReply::ConfirmCode {
                account: commit.account,
            })
        } else {
            Ok(RentalReply::Rented {
                account: commit.account,
                code: None,
            })
        }
    }

    /// Answer the "is a code needed" question.
    pub async fn confirm_code_required(
        &self,
        ctx: &mut RentalContext,
        required: bool,
        now: DateTime<Utc>,
    ) -> ResultEngine<RentalReply> {
        let event = if required {
            RentalEvent::CodeRequired
        } else {
            RentalEvent::CodeNotRequired
        };
        ctx.check(event)?;
        let account_id = ctx.staged_account()?;

        if !required {
            self.record_rental_outcome(ctx.user_id, account_id, LogAction::RentedWithoutCode, now)
                .await?;
        }
        let account = self.account(account_id).await?;
        ctx.apply(event)?;

        Ok(if required {
            RentalReply::WaitingForCode {
                account,
                attempts: self.policy().wait.attempts,
            }
        } else {
            RentalReply::Rented {
                account,
                code: None,
            }
        })
    }

    /// Poll the mailbox until a code arrives, the budget runs out or the
    /// user cancels.
    ///
    /// The account stays rented in every case. Outcomes are logged with the
    /// rental start as their date.
    pub async fn await_rental_code<F>(
        &self,
        ctx: &mut RentalContext,
        cancel: &mut CancelSignal,
        on_attempt: F,
    ) -> ResultEngine<RentalReply>
    where
        F: FnMut(u32, u32),
    {
        ctx.check(RentalEvent::CodeReceived)?;
        let account_id = ctx.staged_account()?;
        let (Some(credentials), Some(started_at)) = (ctx.mailbox.clone(), ctx.code_wait_started_at)
        else {
            return Err(EngineError::InvalidState(
                "code wait without mailbox".to_string(),
            ));
        };

        let outcome = wait_for_code(
            self.fetcher(),
            &credentials,
            started_at,
            &self.policy().wait,
            cancel,
            on_attempt,
        )
        .await;

        match outcome {
            WaitOutcome::Code(code) => {
                self.record_rental_outcome(
                    ctx.user_id,
                    account_id,
                    LogAction::RentedWithCode,
                    started_at,
                )
                .await?;
                ctx.apply(RentalEvent::CodeReceived)?;
                let account = self.account(account_id).await?;
                Ok(RentalReply::Rented {
                    account,
                    code: Some(code),
                })
            }
            WaitOutcome::Exhausted => {
                tracing::warn!(
                    user_id = ctx.user_id,
                    account_id,
                    "verification code not obtained"
                );
                self.record_rental_outcome(
                    ctx.user_id,
                    account_id,
                    LogAction::CodeNotObtained,
                    started_at,
                )
                .await?;
                ctx.apply(RentalEvent::AttemptsExhausted)?;
                let account = self.account(account_id).await?;
                Ok(RentalReply::CodeNotObtained { account })
            }
            WaitOutcome::Cancelled => {
                tracing::info!(user_id = ctx.user_id, account_id, "code wait cancelled");
                ctx.apply(RentalEvent::Cancelled)?;
                Ok(RentalReply::Cancelled)
            }
        }
    }

    /// Leave the conversation. Rentals already committed are kept.
    pub fn cancel_rental(&self, ctx: &mut RentalContext) -> ResultEngine<RentalReply> {
        ctx.apply(RentalEvent::Cancelled)?;
        Ok(RentalReply::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_with_code() {
        let state = RentalState::SelectAccount
            .next(RentalEvent::AccountSelected)
            .and_then(|s| s.next(RentalEvent::RentalCommitted { requires_code: true }))
            .and_then(|s| s.next(RentalEvent::CodeRequired))
            .and_then(|s| s.next(RentalEvent::CodeReceived))
            .unwrap();
        assert_eq!(state, RentalState::Done);
    }

    #[test]
    fn account_without_mailbox_finishes_on_commit() {
        assert_eq!(
            RentalState::SelectDuration
                .next(RentalEvent::RentalCommitted {
                    requires_code: false
                })
                .unwrap(),
            RentalState::Done
        );
    }

    #[test]
    fn cancel_is_accepted_until_done() {
        for state in [
            RentalState::SelectAccount,
            RentalState::SelectDuration,
            RentalState::ConfirmCode,
            RentalState::WaitForCode,
        ] {
            assert_eq!(state.next(RentalEvent::Cancelled).unwrap(), RentalState::Done);
        }
        assert!(matches!(
            RentalState::Done.next(RentalEvent::Cancelled),
            Err(EngineError::InvalidTransition(_))
        ));
    }

    #[test]
    fn steps_cannot_be_skipped() {
        assert!(RentalState::SelectAccount
            .next(RentalEvent::RentalCommitted {
                requires_code: false
            })
            .is_err());
        assert!(RentalState::SelectDuration
            .next(RentalEvent::CodeReceived)
            .is_err());
        assert!(RentalState::ConfirmCode
            .next(RentalEvent::AttemptsExhausted)
            .is_err());
    }

    #[test]
    fn new_context_has_nothing_staged() {
        let ctx = RentalContext::new(5);
        assert_eq!(ctx.state(), RentalState::SelectAccount);
        assert!(ctx.account_id().is_none());
        assert!(!ctx.requires_code());
        assert!(!ctx.is_finished());
    }
}
