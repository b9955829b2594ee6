use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};

use crate::{EngineError, Mailbox, MailboxCredentials, ResultEngine, emails};

use super::{Engine, with_tx};

impl Engine {
    pub(super) async fn find_mailbox(
        &self,
        db: &DatabaseTransaction,
        account_id: i64,
    ) -> ResultEngine<Option<Mailbox>> {
        Ok(emails::Entity::find()
            .filter(emails::Column::AccountId.eq(account_id))
            .one(db)
            .await?
            .map(Mailbox::from))
    }

    /// The mailbox attached to an account, if any.
    pub async fn mailbox(&self, account_id: i64) -> ResultEngine<Option<Mailbox>> {
        with_tx!(self, |db_tx| { self.find_mailbox(&db_tx, account_id).await })
    }

    /// Attach a mailbox to the account, replacing the current one.
    pub async fn set_mailbox(
        &self,
        admin_id: i64,
        account_id: i64,
        credentials: MailboxCredentials,
    ) -> ResultEngine<Mailbox> {
        self.require_admin(admin_id)?;
        with_tx!(self, |db_tx| {
            self.require_account(&db_tx, account_id).await?;

            let existing = self.find_mailbox(&db_tx, account_id).await?;
            let replacing = existing.is_some();
            let id = match existing {
                Some(existing) => ActiveValue::Unchanged(existing.id),
                None => ActiveValue::NotSet,
            };
            let active = emails::ActiveModel {
                id,
                login: ActiveValue::Set(Some(credentials.login)),
                password: ActiveValue::Set(Some(credentials.password)),
                account_id: ActiveValue::Set(account_id),
            };
            let model = if replacing {
                active.update(&db_tx).await?
            } else {
                active.insert(&db_tx).await?
            };
            tracing::info!(admin_id, account_id, replacing, "mailbox set");
            Ok(Mailbox::from(model))
        })
    }

    pub async fn update_mailbox_login(
        &self,
        admin_id: i64,
        account_id: i64,
        login: &str,
    ) -> ResultEngine<Mailbox> {
        let login = crate::normalize_required_text(login, "mailbox login")?;
        self.update_mailbox(admin_id, account_id, |active| {
            active.login = ActiveValue::Set(Some(login));
        })
        .await
    }

    pub async fn update_mailbox_password(
        &self,
        admin_id: i64,
        account_id: i64,
        password: &str,
    ) -> ResultEngine<Mailbox> {
        let password = crate::normalize_required_text(password, "mailbox password")?;
        self.update_mailbox(admin_id, account_id, |active| {
            active.password = ActiveValue::Set(Some(password));
        })
        .await
    }

    async fn update_mailbox(
        &self,
        admin_id: i64,
        account_id: i64,
        apply: impl FnOnce(&mut emails::ActiveModel),
    ) -> ResultEngine<Mailbox> {
        self.require_admin(admin_id)?;
        with_tx!(self, |db_tx| {
            let existing = self
                .find_mailbox(&db_tx, account_id)
                .await?
                .ok_or_else(|| {
                    EngineError::KeyNotFound(format!("mailbox of account {account_id}"))
                })?;

            let mut active = emails::ActiveModel {
                id: ActiveValue::Unchanged(existing.id),
                ..Default::default()
            };
            apply(&mut active);
            let model = active.update(&db_tx).await?;
            tracing::info!(admin_id, account_id, "mailbox updated");
            Ok(Mailbox::from(model))
        })
    }
}
