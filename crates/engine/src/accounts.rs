//! The module contains `Account` struct and its implementation.

use chrono::{DateTime, Duration, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};

use crate::{EngineError, ResultEngine};

/// Availability of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountStatus {
    Free,
    Rented,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Rented => "rented",
        }
    }
}

impl TryFrom<&str> for AccountStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "free" => Ok(Self::Free),
            "rented" => Ok(Self::Rented),
            other => Err(EngineError::InvalidState(format!(
                "invalid account status: {other}"
            ))),
        }
    }
}

/// A time-bounded exclusive assignment of an account to a user.
///
/// Timestamps are always UTC. SQLite stores them as text and values written
/// without an offset are decoded as UTC, so `ends_at` compares like with like.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rental {
    pub renter_id: i64,
    pub rented_at: DateTime<Utc>,
    pub duration_minutes: i32,
}

impl Rental {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.rented_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at()
    }
}

/// A shared account that can be rented.
///
/// The rental fields only exist together: an account is rented iff `rental`
/// is `Some`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub login: String,
    pub password: String,
    pub behavior: Option<i32>,
    pub mmr: i32,
    pub calibration: bool,
    pub rental: Option<Rental>,
}

impl Account {
    pub fn status(&self) -> AccountStatus {
        match self.rental {
            Some(_) => AccountStatus::Rented,
            None => AccountStatus::Free,
        }
    }

    pub fn is_free(&self) -> bool {
        self.rental.is_none()
    }

    pub fn is_rented_by(&self, user_id: i64) -> bool {
        self.rental
            .as_ref()
            .is_some_and(|rental| rental.renter_id == user_id)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub login: String,
    pub password: String,
    pub behavior: Option<i32>,
    pub mmr: i32,
    pub calibration: bool,
    pub status: String,
    pub rented_at: Option<DateTimeUtc>,
    pub renter_id: Option<i64>,
    pub rent_duration: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::emails::Entity")]
    Emails,
}

impl Related<super::emails::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Emails.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let status = AccountStatus::try_from(model.status.as_str())?;
        let rental = match (status, model.renter_id, model.rented_at, model.rent_duration) {
            (AccountStatus::Free, None, None, None) => None,
            (AccountStatus::Rented, Some(renter_id), Some(rented_at), Some(duration_minutes)) => {
                Some(Rental {
                    renter_id,
                    rented_at,
                    duration_minutes,
                })
            }
            _ => {
                return Err(EngineError::InvalidState(format!(
                    "account {} violates the rental invariant",
                    model.id
                )));
            }
        };

        Ok(Self {
            id: model.id,
            login: model.login,
            password: model.password,
            behavior: model.behavior,
            mmr: model.mmr,
            calibration: model.calibration,
            rental,
        })
    }
}

impl From<&Account> for ActiveModel {
    fn from(value: &Account) -> Self {
        let rental = value.rental.as_ref();
        Self {
            id: ActiveValue::NotSet,
            login: ActiveValue::Set(value.login.clone()),
            password: ActiveValue::Set(value.password.clone()),
            behavior: ActiveValue::Set(value.behavior),
            mmr: ActiveValue::Set(value.mmr),
            calibration: ActiveValue::Set(value.calibration),
            status: ActiveValue::Set(value.status().as_str().to_string()),
            rented_at: ActiveValue::Set(rental.map(|r| r.rented_at)),
            renter_id: ActiveValue::Set(rental.map(|r| r.renter_id)),
            rent_duration: ActiveValue::Set(rental.map(|r| r.duration_minutes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn model() -> Model {
        Model {
            id: 7,
            login: "login".to_string(),
            password: "secret".to_string(),
            behavior: Some(9000),
            mmr: 4200,
            calibration: true,
            status: "free".to_string(),
            rented_at: None,
            renter_id: None,
            rent_duration: None,
        }
    }

    #[test]
    fn free_model_has_no_rental() {
        let account = Account::try_from(model()).unwrap();
        assert_eq!(account.status(), AccountStatus::Free);
        assert!(account.rental.is_none());
    }

    #[test]
    fn rented_model_requires_all_rental_fields() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let rented = Model {
            status: "rented".to_string(),
            rented_at: Some(at),
            renter_id: Some(11),
            rent_duration: Some(60),
            ..model()
        };
        let account = Account::try_from(rented.clone()).unwrap();
        assert!(account.is_rented_by(11));
        assert_eq!(
            account.rental.unwrap().ends_at(),
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap()
        );

        let broken = Model {
            rent_duration: None,
            ..rented
        };
        assert_eq!(
            Account::try_from(broken),
            Err(EngineError::InvalidState(
                "account 7 violates the rental invariant".to_string()
            ))
        );
    }

    #[test]
    fn free_model_with_leftover_renter_is_rejected() {
        let broken = Model {
            renter_id: Some(3),
            ..model()
        };
        assert!(Account::try_from(broken).is_err());
    }

    #[test]
    fn rental_expires_exactly_at_end() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let rental = Rental {
            renter_id: 1,
            rented_at: at,
            duration_minutes: 60,
        };
        assert!(!rental.is_expired(at + Duration::minutes(59)));
        assert!(rental.is_expired(at + Duration::minutes(60)));
    }
}
