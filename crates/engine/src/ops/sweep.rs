use chrono::{DateTime, Utc};
use sea_orm::{QueryFilter, TransactionTrait, prelude::*};

use crate::{Account, AccountStatus, LogAction, ResultEngine, accounts};

use super::{AccountEdits, Engine, rentals::release_account, with_tx};

/// A rental closed by the sweeper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredRental {
    pub account_id: i64,
    pub renter_id: i64,
    pub ended_at: DateTime<Utc>,
}

impl Engine {
    /// Free every rental whose end time is at or before `now`.
    ///
    /// Runs in one transaction. A row that was returned concurrently is
    /// skipped, so calling this twice for the same instant frees and logs
    /// each rental once.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> ResultEngine<Vec<ExpiredRental>> {
        with_tx!(self, |db_tx| {
            let rented = accounts::Entity::find()
                .filter(accounts::Column::Status.eq(AccountStatus::Rented.as_str()))
                .all(&db_tx)
                .await?;

            let mut expired = Vec::new();
            for model in rented {
                let account_id = model.id;
                let account = match Account::try_from(model) {
                    Ok(account) => account,
                    Err(err) => {
                        tracing::warn!(account_id, "skipping malformed rental: {err}");
                        continue;
                    }
                };
                let Some(rental) = account.rental else {
                    continue;
                };
                if !rental.is_expired(now) {
                    continue;
                }

                if release_account(
                    &db_tx,
                    account_id,
                    rental.renter_id,
                    &AccountEdits::default(),
                    LogAction::AutoReturned,
                    now,
                )
                .await?
                {
                    tracing::info!(account_id, renter_id = rental.renter_id, "rental expired");
                    expired.push(ExpiredRental {
                        account_id,
                        renter_id: rental.renter_id,
                        ended_at: rental.ends_at(),
                    });
                }
            }
            Ok(expired)
        })
    }
}
