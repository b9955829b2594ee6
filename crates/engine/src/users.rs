//! Bot users, identified by their telegram id.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_approved: bool,
    pub registered_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        match (&self.username, full.is_empty()) {
            (Some(username), true) => format!("@{username}"),
            (Some(username), false) => format!("{full} (@{username})"),
            (None, false) => full,
            (None, true) => self.telegram_id.to_string(),
        }
    }
}

/// Profile data captured on first contact.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewUser {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_approved: bool,
    pub registered_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for User {
    fn from(model: Model) -> Self {
        Self {
            telegram_id: model.telegram_id,
            username: model.username,
            first_name: model.first_name,
            last_name: model.last_name,
            is_approved: model.is_approved,
            registered_at: model.registered_at,
        }
    }
}

impl From<&User> for ActiveModel {
    fn from(value: &User) -> Self {
        Self {
            telegram_id: ActiveValue::Set(value.telegram_id),
            username: ActiveValue::Set(value.username.clone()),
            first_name: ActiveValue::Set(value.first_name.clone()),
            last_name: ActiveValue::Set(value.last_name.clone()),
            is_approved: ActiveValue::Set(value.is_approved),
            registered_at: ActiveValue::Set(value.registered_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            telegram_id: 42,
            username: None,
            first_name: None,
            last_name: None,
            is_approved: false,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn display_name_falls_back_to_id() {
        assert_eq!(user().display_name(), "42");
    }

    #[test]
    fn display_name_joins_names_and_username() {
        let user = User {
            username: Some("neo".to_string()),
            first_name: Some("Thomas".to_string()),
            last_name: Some("Anderson".to_string()),
            ..user()
        };
        assert_eq!(user.display_name(), "Thomas Anderson (@neo)");
    }
}
