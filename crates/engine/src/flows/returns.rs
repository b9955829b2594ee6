//! The return conversation.
//!
//! ```text
//! ConfirmUpdate -> [SelectFields -> InputValue(..)*] -> Done
//! ```
//!
//! The renter may revise the rating or behavior score before giving the
//! account back. Edits are staged in the context and written together with
//! the release.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::{
    Account, AccountEdits, EngineError, ResultEngine, ops::Engine, util::parse_number,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnField {
    Mmr,
    Behavior,
}

impl ReturnField {
    pub fn label(self) -> &'static str {
        match self {
            Self::Mmr => "mmr",
            Self::Behavior => "behavior",
        }
    }
}

/// Which fields the renter wants to revise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldChoice {
    Mmr,
    Behavior,
    Both,
}

impl FieldChoice {
    pub fn fields(self) -> &'static [ReturnField] {
        match self {
            Self::Mmr => &[ReturnField::Mmr],
            Self::Behavior => &[ReturnField::Behavior],
            Self::Both => &[ReturnField::Mmr, ReturnField::Behavior],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnState {
    ConfirmUpdate,
    SelectFields,
    InputValue(ReturnField),
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnEvent {
    UpdateRequested,
    UpdateDeclined,
    FieldsChosen(FieldChoice),
    ValueAccepted { next: Option<ReturnField> },
    Cancelled,
}

impl ReturnState {
    pub fn next(self, event: ReturnEvent) -> ResultEngine<ReturnState> {
        use ReturnEvent as E;
        use ReturnState as S;

        let next = match (self, event) {
            (S::Done, _) => None,
            (_, E::Cancelled) => Some(S::Done),
            (S::ConfirmUpdate, E::UpdateRequested) => Some(S::SelectFields),
            (S::ConfirmUpdate, E::UpdateDeclined) => Some(S::Done),
            (S::SelectFields, E::FieldsChosen(choice)) => {
                choice.fields().first().copied().map(S::InputValue)
            }
            (S::InputValue(_), E::ValueAccepted { next: Some(field) }) => {
                Some(S::InputValue(field))
            }
            (S::InputValue(_), E::ValueAccepted { next: None }) => Some(S::Done),
            _ => None,
        };
        next.ok_or_else(|| EngineError::InvalidTransition(format!("{event:?} in {self:?}")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnContext {
    user_id: i64,
    account_id: i64,
    rented_at: DateTime<Utc>,
    state: ReturnState,
    queue: VecDeque<ReturnField>,
    edits: AccountEdits,
}

impl ReturnContext {
    /// A conversation about the rental of `account_id` that began at `rented_at`.
    pub fn new(user_id: i64, account_id: i64, rented_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            account_id,
            rented_at,
            state: ReturnState::ConfirmUpdate,
            queue: VecDeque::new(),
            edits: AccountEdits::default(),
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn account_id(&self) -> i64 {
        self.account_id
    }

    pub fn rented_at(&self) -> DateTime<Utc> {
        self.rented_at
    }

    pub fn state(&self) -> ReturnState {
        self.state
    }

    pub fn edits(&self) -> AccountEdits {
        self.edits
    }

    pub fn is_finished(&self) -> bool {
        self.state == ReturnState::Done
    }

    fn apply(&mut self, event: ReturnEvent) -> ResultEngine<()> {
        self.state = self.state.next(event)?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnReply {
    AskUpdate { account: Account },
    ChooseFields,
    AskValue(ReturnField),
    Returned { account: Account },
    Aborted { reason: String },
    Cancelled,
}

impl Engine {
    /// Open a return conversation for the user's active rental.
    pub async fn start_return(&self, user_id: i64) -> ResultEngine<(ReturnContext, ReturnReply)> {
        self.require_approved(user_id).await?;
        let account = self
            .active_rental(user_id)
            .await?
            .ok_or_else(|| EngineError::Conflict("no active rental".to_string()))?;
        let rented_at = account
            .rental
            .as_ref()
            .map(|rental| rental.rented_at)
            .ok_or_else(|| {
                EngineError::InvalidState(format!("account {} has no rental", account.id))
            })?;
        let ctx = ReturnContext::new(user_id, account.id, rented_at);
        Ok((ctx, ReturnReply::AskUpdate { account }))
    }

    pub async fn answer_update(
        &self,
        ctx: &mut ReturnContext,
        wants_update: bool,
        now: DateTime<Utc>,
    ) -> ResultEngine<ReturnReply> {
        if wants_update {
            ctx.apply(ReturnEvent::UpdateRequested)?;
            return Ok(ReturnReply::ChooseFields);
        }
        ctx.state.next(ReturnEvent::UpdateDeclined)?;
        let reply = self.finish_return(ctx, now).await;
        ctx.apply(ReturnEvent::UpdateDeclined)?;
        reply
    }

    pub fn choose_fields(
        &self,
        ctx: &mut ReturnContext,
        choice: FieldChoice,
    ) -> ResultEngine<ReturnReply> {
        ctx.apply(ReturnEvent::FieldsChosen(choice))?;
        ctx.queue = choice.fields().iter().skip(1).copied().collect();
        match ctx.state {
            ReturnState::InputValue(field) => Ok(ReturnReply::AskValue(field)),
            state => Err(EngineError::InvalidState(format!(
                "unexpected {state:?} after choosing fields"
            ))),
        }
    }

    /// Accept a value typed for the current field.
    ///
    /// Input that is not a number fails with `InvalidInput` and leaves the
    /// context as it was so the same question can be asked again.
    pub async fn submit_value(
        &self,
        ctx: &mut ReturnContext,
        raw: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<ReturnReply> {
        let ReturnState::InputValue(field) = ctx.state else {
            return Err(EngineError::InvalidTransition(format!(
                "value submitted in {:?}",
                ctx.state
            )));
        };
        let value = parse_number(raw, field.label())?;
        match field {
            ReturnField::Mmr => ctx.edits.mmr = Some(value),
            ReturnField::Behavior => ctx.edits.behavior = Some(value),
        }

        let next = ctx.queue.pop_front();
        if let Some(next_field) = next {
            ctx.apply(ReturnEvent::ValueAccepted { next })?;
            return Ok(ReturnReply::AskValue(next_field));
        }
        let reply = self.finish_return(ctx, now).await;
        ctx.apply(ReturnEvent::ValueAccepted { next: None })?;
        reply
    }

    pub fn cancel_return(&self, ctx: &mut ReturnContext) -> ResultEngine<ReturnReply> {
        ctx.apply(ReturnEvent::Cancelled)?;
        Ok(ReturnReply::Cancelled)
    }

    async fn finish_return(
        &self,
        ctx: &ReturnContext,
        now: DateTime<Utc>,
    ) -> ResultEngine<ReturnReply> {
        let released = self
            .release_rental(
                ctx.user_id,
                ctx.account_id,
                Some(ctx.rented_at),
                ctx.edits,
                now,
            )
            .await;
        match released {
            Ok(account) => Ok(ReturnReply::Returned { account }),
            Err(EngineError::Conflict(reason)) => Ok(ReturnReply::Aborted { reason }),
            Err(err) => Err(err),
        }
    }
}
