use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};

use crate::{
    Account, AccountStatus, EngineError, MailboxCredentials, ResultEngine, accounts, emails,
    util::{normalize_required_text, parse_flag, parse_number},
};

use super::{Engine, with_tx};

/// Data needed to add an account to the inventory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccount {
    pub login: String,
    pub password: String,
    pub behavior: Option<i32>,
    pub mmr: i32,
    pub calibration: bool,
}

/// Account attributes an admin may edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditableField {
    Login,
    Password,
    Mmr,
    Behavior,
    Calibration,
}

impl EditableField {
    pub const ALL: [EditableField; 5] = [
        Self::Login,
        Self::Password,
        Self::Mmr,
        Self::Behavior,
        Self::Calibration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Password => "password",
            Self::Mmr => "mmr",
            Self::Behavior => "behavior",
            Self::Calibration => "calibration",
        }
    }
}

impl TryFrom<&str> for EditableField {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown field: {value}")))
    }
}

/// A validated new value for one account attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountField {
    Login(String),
    Password(String),
    Mmr(i32),
    Behavior(i32),
    Calibration(bool),
}

impl AccountField {
    /// Validate free text typed for `field`.
    pub fn parse(field: EditableField, raw: &str) -> ResultEngine<Self> {
        Ok(match field {
            EditableField::Login => Self::Login(normalize_required_text(raw, "login")?),
            EditableField::Password => Self::Password(normalize_required_text(raw, "password")?),
            EditableField::Mmr => Self::Mmr(parse_number(raw, "mmr")?),
            EditableField::Behavior => Self::Behavior(parse_number(raw, "behavior")?),
            EditableField::Calibration => Self::Calibration(parse_flag(raw)),
        })
    }

    pub fn field(&self) -> EditableField {
        match self {
            Self::Login(_) => EditableField::Login,
            Self::Password(_) => EditableField::Password,
            Self::Mmr(_) => EditableField::Mmr,
            Self::Behavior(_) => EditableField::Behavior,
            Self::Calibration(_) => EditableField::Calibration,
        }
    }
}

impl Engine {
    pub(super) async fn find_account(
        &self,
        db: &DatabaseTransaction,
        account_id: i64,
    ) -> ResultEngine<Option<Account>> {
        accounts::Entity::find_by_id(account_id)
            .one(db)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    pub(super) async fn require_account(
        &self,
        db: &DatabaseTransaction,
        account_id: i64,
    ) -> ResultEngine<Account> {
        self.find_account(db, account_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("account {account_id}")))
    }

    /// Add a free account, optionally with its mailbox.
    pub async fn new_account(
        &self,
        admin_id: i64,
        new: NewAccount,
        mailbox: Option<MailboxCredentials>,
    ) -> ResultEngine<Account> {
        self.require_admin(admin_id)?;
        let mut account = Account {
            id: 0,
            login: normalize_required_text(&new.login, "login")?,
            password: normalize_required_text(&new.password, "password")?,
            behavior: new.behavior,
            mmr: new.mmr,
            calibration: new.calibration,
            rental: None,
        };

        with_tx!(self, |db_tx| {
            let model = accounts::ActiveModel::from(&account).insert(&db_tx).await?;
            account.id = model.id;

            if let Some(credentials) = mailbox {
                emails::ActiveModel {
                    id: ActiveValue::NotSet,
                    login: ActiveValue::Set(Some(credentials.login)),
                    password: ActiveValue::Set(Some(credentials.password)),
                    account_id: ActiveValue::Set(account.id),
                }
                .insert(&db_tx)
                .await?;
            }

            tracing::info!(admin_id, account_id = account.id, "account added");
            Ok(account)
        })
    }

    pub async fn account(&self, account_id: i64) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| { self.require_account(&db_tx, account_id).await })
    }

    /// All accounts, highest MMR first.
    pub async fn accounts(&self) -> ResultEngine<Vec<Account>> {
        accounts::Entity::find()
            .order_by_desc(accounts::Column::Mmr)
            .order_by_asc(accounts::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Accounts available for rent, highest MMR first.
    pub async fn free_accounts(&self) -> ResultEngine<Vec<Account>> {
        accounts::Entity::find()
            .filter(accounts::Column::Status.eq(AccountStatus::Free.as_str()))
            .order_by_desc(accounts::Column::Mmr)
            .order_by_asc(accounts::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// The account currently rented by the user, if any.
    pub async fn active_rental(&self, user_id: i64) -> ResultEngine<Option<Account>> {
        with_tx!(self, |db_tx| { self.find_active_rental(&db_tx, user_id).await })
    }

    pub(super) async fn find_active_rental(
        &self,
        db: &DatabaseTransaction,
        user_id: i64,
    ) -> ResultEngine<Option<Account>> {
        accounts::Entity::find()
            .filter(accounts::Column::RenterId.eq(user_id))
            .filter(accounts::Column::Status.eq(AccountStatus::Rented.as_str()))
            .one(db)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    pub async fn update_account_field(
        &self,
        admin_id: i64,
        account_id: i64,
        value: AccountField,
    ) -> ResultEngine<Account> {
        self.require_admin(admin_id)?;
        with_tx!(self, |db_tx| {
            self.require_account(&db_tx, account_id).await?;

            let field = value.field();
            let mut active = accounts::ActiveModel {
                id: ActiveValue::Unchanged(account_id),
                ..Default::default()
            };
            match value {
                AccountField::Login(login) => active.login = ActiveValue::Set(login),
                AccountField::Password(password) => active.password = ActiveValue::Set(password),
                AccountField::Mmr(mmr) => active.mmr = ActiveValue::Set(mmr),
                AccountField::Behavior(behavior) => {
                    active.behavior = ActiveValue::Set(Some(behavior));
                }
                AccountField::Calibration(flag) => active.calibration = ActiveValue::Set(flag),
            }
            let model = active.update(&db_tx).await?;
            tracing::info!(admin_id, account_id, field = field.as_str(), "account updated");
            Account::try_from(model)
        })
    }

    /// Delete an account and its mailbox.
    ///
    /// Rented accounts may be deleted too; the renter simply loses it.
    pub async fn delete_account(&self, admin_id: i64, account_id: i64) -> ResultEngine<Account> {
        self.require_admin(admin_id)?;
        with_tx!(self, |db_tx| {
            let account = self.require_account(&db_tx, account_id).await?;
            if let Some(rental) = &account.rental {
                tracing::warn!(
                    admin_id,
                    account_id,
                    renter_id = rental.renter_id,
                    "deleting a rented account"
                );
            }

            emails::Entity::delete_many()
                .filter(emails::Column::AccountId.eq(account_id))
                .exec(&db_tx)
                .await?;
            accounts::Entity::delete_by_id(account_id).exec(&db_tx).await?;
            tracing::info!(admin_id, account_id, "account deleted");
            Ok(account)
        })
    }
}
