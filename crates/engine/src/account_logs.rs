//! Append-only audit trail of rental events.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogAction {
    RentedWithoutCode,
    RentedWithCode,
    CodeNotObtained,
    Returned,
    AutoReturned,
    ForceReturned,
}

impl LogAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RentedWithoutCode => "rented without 2FA",
            Self::RentedWithCode => "rented with 2FA",
            Self::CodeNotObtained => "rental error: code not obtained",
            Self::Returned => "returned",
            Self::AutoReturned => "auto-returned",
            Self::ForceReturned => "force-returned",
        }
    }

    /// Outcomes that close the rental conversation.
    pub fn is_rental_outcome(self) -> bool {
        matches!(
            self,
            Self::RentedWithoutCode | Self::RentedWithCode | Self::CodeNotObtained
        )
    }
}

impl TryFrom<&str> for LogAction {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "rented without 2FA" => Ok(Self::RentedWithoutCode),
            "rented with 2FA" => Ok(Self::RentedWithCode),
            "rental error: code not obtained" => Ok(Self::CodeNotObtained),
            "returned" => Ok(Self::Returned),
            "auto-returned" => Ok(Self::AutoReturned),
            "force-returned" => Ok(Self::ForceReturned),
            other => Err(EngineError::InvalidState(format!(
                "invalid log action: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountLog {
    pub id: i64,
    pub user_id: i64,
    pub account_id: i64,
    pub action: LogAction,
    pub action_date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "account_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub account_id: i64,
    pub action_date: DateTimeUtc,
    pub action: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for AccountLog {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            account_id: model.account_id,
            action: LogAction::try_from(model.action.as_str())?,
            action_date: model.action_date,
        })
    }
}

/// Builds the row for a new log entry.
pub(crate) fn entry(
    user_id: i64,
    account_id: i64,
    action: LogAction,
    at: DateTime<Utc>,
) -> ActiveModel {
    ActiveModel {
        id: ActiveValue::NotSet,
        user_id: ActiveValue::Set(user_id),
        account_id: ActiveValue::Set(account_id),
        action_date: ActiveValue::Set(at),
        action: ActiveValue::Set(action.as_str().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_is_invalid_state() {
        assert_eq!(
            LogAction::try_from("taken"),
            Err(EngineError::InvalidState(
                "invalid log action: taken".to_string()
            ))
        );
    }

    #[test]
    fn only_rent_events_close_a_rental_conversation() {
        assert!(LogAction::CodeNotObtained.is_rental_outcome());
        assert!(!LogAction::Returned.is_rental_outcome());
    }
}
