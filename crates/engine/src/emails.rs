//! Mailbox credentials attached to an account.
//!
//! An account owns zero or one mailbox. The mailbox receives the verification
//! code needed to complete a login on accounts protected by a second factor.

use std::fmt;

use sea_orm::entity::prelude::*;

/// Login pair used to query the mailbox.
#[derive(Clone, PartialEq, Eq)]
pub struct MailboxCredentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for MailboxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCredentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    pub id: i64,
    pub account_id: i64,
    pub login: Option<String>,
    pub password: Option<String>,
}

impl Mailbox {
    /// Both halves are required to log in; a partial row yields `None`.
    pub fn credentials(&self) -> Option<MailboxCredentials> {
        let login = self.login.as_deref().filter(|s| !s.is_empty())?;
        let password = self.password.as_deref().filter(|s| !s.is_empty())?;
        Some(MailboxCredentials {
            login: login.to_string(),
            password: password.to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "emails")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub login: Option<String>,
    pub password: Option<String>,
    #[sea_orm(unique)]
    pub account_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Accounts,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Mailbox {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            account_id: model.account_id,
            login: model.login,
            password: model.password,
        }
    }
}
