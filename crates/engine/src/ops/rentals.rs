use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*, sea_query::Expr};

use crate::{
    Account, AccountStatus, EngineError, LogAction, MailboxCredentials, ResultEngine,
    account_logs, accounts,
};

use super::{Engine, with_tx};

/// A rental that was just written to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RentalCommit {
    pub account: Account,
    /// Present when the account has a usable mailbox, so a code may be needed.
    pub mailbox: Option<MailboxCredentials>,
}

impl RentalCommit {
    pub fn requires_code(&self) -> bool {
        self.mailbox.is_some()
    }
}

/// Attribute changes applied when an account goes back to the pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountEdits {
    pub mmr: Option<i32>,
    pub behavior: Option<i32>,
}

impl AccountEdits {
    pub fn is_empty(&self) -> bool {
        self.mmr.is_none() && self.behavior.is_none()
    }
}

/// Mark a free account as rented by `renter_id`.
///
/// The write only lands while the account is still free and the renter holds
/// no other rental, whatever the caller read before. Returns whether it did.
pub(super) async fn claim_account(
    db: &DatabaseTransaction,
    account_id: i64,
    renter_id: i64,
    minutes: i32,
    now: DateTime<Utc>,
) -> ResultEngine<bool> {
    let result = accounts::Entity::update_many()
        .col_expr(
            accounts::Column::Status,
            Expr::value(AccountStatus::Rented.as_str()),
        )
        .col_expr(accounts::Column::RenterId, Expr::value(renter_id))
        .col_expr(accounts::Column::RentedAt, Expr::value(now))
        .col_expr(accounts::Column::RentDuration, Expr::value(minutes))
        .filter(accounts::Column::Id.eq(account_id))
        .filter(accounts::Column::Status.eq(AccountStatus::Free.as_str()))
        .filter(Expr::cust_with_values(
            "NOT EXISTS (SELECT 1 FROM accounts AS held \
             WHERE held.renter_id = ? AND held.status = 'rented')",
            [renter_id],
        ))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Free `account_id` if it is still rented by `renter_id` and log `action`.
///
/// Returns `false` when the row changed in the meantime; nothing is written
/// in that case.
pub(super) async fn release_account(
    db: &DatabaseTransaction,
    account_id: i64,
    renter_id: i64,
    edits: &AccountEdits,
    action: LogAction,
    now: DateTime<Utc>,
) -> ResultEngine<bool> {
    let mut update = accounts::Entity::update_many()
        .col_expr(
            accounts::Column::Status,
            Expr::value(AccountStatus::Free.as_str()),
        )
        .col_expr(accounts::Column::RenterId, Expr::value(Option::<i64>::None))
        .col_expr(
            accounts::Column::RentedAt,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .col_expr(accounts::Column::RentDuration, Expr::value(Option::<i32>::None));
    if let Some(mmr) = edits.mmr {
        update = update.col_expr(accounts::Column::Mmr, Expr::value(mmr));
    }
    if let Some(behavior) = edits.behavior {
        update = update.col_expr(accounts::Column::Behavior, Expr::value(behavior));
    }

    let result = update
        .filter(accounts::Column::Id.eq(account_id))
        .filter(accounts::Column::Status.eq(AccountStatus::Rented.as_str()))
        .filter(accounts::Column::RenterId.eq(renter_id))
        .exec(db)
        .await?;
    if result.rows_affected != 1 {
        return Ok(false);
    }

    account_logs::entry(renter_id, account_id, action, now)
        .insert(db)
        .await?;
    Ok(true)
}

impl Engine {
    /// Assign a free account to an approved user.
    ///
    /// The write only lands if the account is still free and the user holds
    /// no other rental, so two renters racing for the same row cannot both
    /// win. Accounts without a mailbox are logged as rented right away; for
    /// the others the outcome is recorded once the code question is settled.
    pub async fn commit_rental(
        &self,
        user_id: i64,
        account_id: i64,
        duration_minutes: u32,
        now: DateTime<Utc>,
    ) -> ResultEngine<RentalCommit> {
        if !self.policy().durations.contains(&duration_minutes) {
            return Err(EngineError::InvalidInput(format!(
                "{duration_minutes} minutes is not an offered duration"
            )));
        }
        let minutes = i32::try_from(duration_minutes)
            .map_err(|_| EngineError::InvalidInput("duration is too large".to_string()))?;

        with_tx!(self, |db_tx| {
            self.require_approved_in(&db_tx, user_id).await?;

            let account = self
                .find_account(&db_tx, account_id)
                .await?
                .ok_or_else(|| {
                    EngineError::Conflict("account is no longer available".to_string())
                })?;
            if !account.is_free() {
                return Err(EngineError::Conflict("account is already rented".to_string()));
            }
            if self.find_active_rental(&db_tx, user_id).await?.is_some() {
                return Err(EngineError::Conflict(
                    "user already has an active rental".to_string(),
                ));
            }

            if !claim_account(&db_tx, account_id, user_id, minutes, now).await? {
                return Err(EngineError::Conflict("account is already rented".to_string()));
            }

            let mailbox = self
                .find_mailbox(&db_tx, account_id)
                .await?
                .and_then(|mailbox| mailbox.credentials());
            if mailbox.is_none() {
                account_logs::entry(user_id, account_id, LogAction::RentedWithoutCode, now)
                    .insert(&db_tx)
                    .await?;
            }

            let account = self.require_account(&db_tx, account_id).await?;
            tracing::info!(
                user_id,
                account_id,
                duration_minutes,
                requires_code = mailbox.is_some(),
                "rental committed"
            );
            Ok(RentalCommit { account, mailbox })
        })
    }

    /// Log how a rental with a mailbox ended up.
    pub async fn record_rental_outcome(
        &self,
        user_id: i64,
        account_id: i64,
        action: LogAction,
        now: DateTime<Utc>,
    ) -> ResultEngine<()> {
        if !action.is_rental_outcome() {
            return Err(EngineError::InvalidInput(format!(
                "\"{}\" is not a rental outcome",
                action.as_str()
            )));
        }
        with_tx!(self, |db_tx| {
            account_logs::entry(user_id, account_id, action, now)
                .insert(&db_tx)
                .await?;
            tracing::info!(user_id, account_id, action = action.as_str(), "rental outcome");
            Ok(())
        })
    }

    /// Give back the user's rental of `account_id`, applying `edits` to it.
    pub async fn return_account(
        &self,
        user_id: i64,
        account_id: i64,
        edits: AccountEdits,
        now: DateTime<Utc>,
    ) -> ResultEngine<Account> {
        self.release_rental(user_id, account_id, None, edits, now).await
    }

    /// Release one specific rental.
    ///
    /// With `started_at` set, a rental of the same account that began at a
    /// different time is a different rental and is left alone.
    pub(crate) async fn release_rental(
        &self,
        user_id: i64,
        account_id: i64,
        started_at: Option<DateTime<Utc>>,
        edits: AccountEdits,
        now: DateTime<Utc>,
    ) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            let account = self
                .find_account(&db_tx, account_id)
                .await?
                .filter(|account| account.is_rented_by(user_id))
                .ok_or_else(|| EngineError::Conflict("no active rental".to_string()))?;
            if let Some(started_at) = started_at
                && account
                    .rental
                    .as_ref()
                    .is_none_or(|rental| rental.rented_at != started_at)
            {
                return Err(EngineError::Conflict("rental already ended".to_string()));
            }

            if !release_account(&db_tx, account_id, user_id, &edits, LogAction::Returned, now)
                .await?
            {
                return Err(EngineError::Conflict("no active rental".to_string()));
            }

            let account = self.require_account(&db_tx, account_id).await?;
            tracing::info!(user_id, account_id, "account returned");
            Ok(account)
        })
    }
}
