use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};

use crate::{
    AccountStatus, EngineError, LogAction, NewUser, ResultEngine, User, accounts, users,
};

use super::{Engine, rentals::release_account, with_tx};

/// Result of a first-contact registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The user already existed; the stored profile is returned untouched.
    Existing(User),
    /// A new row was created. Admins are approved on creation.
    Created(User),
}

impl Registration {
    pub fn user(&self) -> &User {
        match self {
            Self::Existing(user) | Self::Created(user) => user,
        }
    }
}

impl Engine {
    pub(super) async fn find_user(
        &self,
        db: &DatabaseTransaction,
        telegram_id: i64,
    ) -> ResultEngine<Option<User>> {
        Ok(users::Entity::find_by_id(telegram_id)
            .one(db)
            .await?
            .map(User::from))
    }

    /// Fails with `Forbidden` unless the user is registered and approved.
    pub(super) async fn require_approved_in(
        &self,
        db: &DatabaseTransaction,
        telegram_id: i64,
    ) -> ResultEngine<User> {
        match self.find_user(db, telegram_id).await? {
            None => Err(EngineError::Forbidden("user not registered".to_string())),
            Some(user) if !user.is_approved => {
                Err(EngineError::Forbidden("user not approved".to_string()))
            }
            Some(user) => Ok(user),
        }
    }

    pub(super) fn require_admin(&self, telegram_id: i64) -> ResultEngine<()> {
        if !self.is_admin(telegram_id) {
            return Err(EngineError::Forbidden("admin only".to_string()));
        }
        Ok(())
    }

    /// Register a user on first contact.
    ///
    /// Ids in the admin allow-list are approved immediately, everybody else
    /// waits for an admin.
    pub async fn register_user(
        &self,
        profile: NewUser,
        now: DateTime<Utc>,
    ) -> ResultEngine<Registration> {
        with_tx!(self, |db_tx| {
            if let Some(existing) = self.find_user(&db_tx, profile.telegram_id).await? {
                return Ok(Registration::Existing(existing));
            }

            let user = User {
                telegram_id: profile.telegram_id,
                username: profile.username,
                first_name: profile.first_name,
                last_name: profile.last_name,
                is_approved: self.is_admin(profile.telegram_id),
                registered_at: now,
            };
            users::ActiveModel::from(&user).insert(&db_tx).await?;
            tracing::info!(
                user_id = user.telegram_id,
                approved = user.is_approved,
                "registered new user"
            );
            Ok(Registration::Created(user))
        })
    }

    pub async fn user(&self, telegram_id: i64) -> ResultEngine<User> {
        with_tx!(self, |db_tx| {
            self.find_user(&db_tx, telegram_id)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(format!("user {telegram_id}")))
        })
    }

    /// Return the user if registered and approved.
    pub async fn require_approved(&self, telegram_id: i64) -> ResultEngine<User> {
        with_tx!(self, |db_tx| {
            self.require_approved_in(&db_tx, telegram_id).await
        })
    }

    pub async fn approve_user(&self, admin_id: i64, target_id: i64) -> ResultEngine<User> {
        self.require_admin(admin_id)?;
        with_tx!(self, |db_tx| {
            let user = self
                .find_user(&db_tx, target_id)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(format!("user {target_id}")))?;
            if user.is_approved {
                return Err(EngineError::Conflict(format!(
                    "user {target_id} is already approved"
                )));
            }

            let active = users::ActiveModel {
                telegram_id: ActiveValue::Unchanged(target_id),
                is_approved: ActiveValue::Set(true),
                ..Default::default()
            };
            let model = active.update(&db_tx).await?;
            tracing::info!(admin_id, user_id = target_id, "user approved");
            Ok(User::from(model))
        })
    }

    /// Revoke the approval of a user. Admins cannot be rejected.
    pub async fn reject_user(&self, admin_id: i64, target_id: i64) -> ResultEngine<User> {
        self.require_admin(admin_id)?;
        if self.is_admin(target_id) {
            return Err(EngineError::Forbidden(
                "cannot reject an administrator".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            if self.find_user(&db_tx, target_id).await?.is_none() {
                return Err(EngineError::KeyNotFound(format!("user {target_id}")));
            }

            let active = users::ActiveModel {
                telegram_id: ActiveValue::Unchanged(target_id),
                is_approved: ActiveValue::Set(false),
                ..Default::default()
            };
            let model = active.update(&db_tx).await?;
            tracing::info!(admin_id, user_id = target_id, "user rejected");
            Ok(User::from(model))
        })
    }

    /// Delete a user, freeing every account they rent first.
    ///
    /// Deleting yourself or another admin is refused outright. Returns the ids
    /// of the accounts that were released.
    pub async fn delete_user(
        &self,
        admin_id: i64,
        target_id: i64,
        now: DateTime<Utc>,
    ) -> ResultEngine<Vec<i64>> {
        self.require_admin(admin_id)?;
        if admin_id == target_id {
            return Err(EngineError::Forbidden("cannot delete yourself".to_string()));
        }
        if self.is_admin(target_id) {
            return Err(EngineError::Forbidden(
                "cannot delete another administrator".to_string(),
            ));
        }

        with_tx!(self, |db_tx| {
            if self.find_user(&db_tx, target_id).await?.is_none() {
                return Err(EngineError::KeyNotFound(format!("user {target_id}")));
            }

            let rented = accounts::Entity::find()
                .filter(accounts::Column::RenterId.eq(target_id))
                .filter(accounts::Column::Status.eq(AccountStatus::Rented.as_str()))
                .all(&db_tx)
                .await?;

            let mut released = Vec::with_capacity(rented.len());
            for model in rented {
                if release_account(
                    &db_tx,
                    model.id,
                    target_id,
                    &super::AccountEdits::default(),
                    LogAction::ForceReturned,
                    now,
                )
                .await?
                {
                    released.push(model.id);
                }
            }

            users::Entity::delete_by_id(target_id).exec(&db_tx).await?;
            tracing::info!(
                admin_id,
                user_id = target_id,
                released = released.len(),
                "user deleted"
            );
            Ok(released)
        })
    }

    /// Users waiting for approval, oldest first.
    pub async fn pending_users(&self, admin_id: i64) -> ResultEngine<Vec<User>> {
        self.require_admin(admin_id)?;
        let models = users::Entity::find()
            .filter(users::Column::IsApproved.eq(false))
            .order_by_asc(users::Column::RegisteredAt)
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(User::from).collect())
    }

    pub async fn all_users(&self, admin_id: i64) -> ResultEngine<Vec<User>> {
        self.require_admin(admin_id)?;
        let models = users::Entity::find()
            .order_by_asc(users::Column::RegisteredAt)
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(User::from).collect())
    }

    /// Everybody registered except the sender.
    pub async fn broadcast_recipients(&self, admin_id: i64) -> ResultEngine<Vec<i64>> {
        self.require_admin(admin_id)?;
        let models = users::Entity::find()
            .filter(users::Column::TelegramId.ne(admin_id))
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(|m| m.telegram_id).collect())
    }
}
