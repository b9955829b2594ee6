#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};

use engine::{
    Account, CodeFetcher, Engine, FetchError, MailboxCredentials, NewAccount, NewUser,
    NoMailFetcher, RentalPolicy,
};
use migration::MigratorTrait;

pub const ADMIN: i64 = 1;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub async fn engine() -> Engine {
    engine_with(Arc::new(NoMailFetcher), RentalPolicy::default()).await
}

pub async fn engine_with(fetcher: Arc<dyn CodeFetcher>, policy: RentalPolicy) -> Engine {
    engine_with_db(fetcher, policy).await.0
}

pub async fn engine_with_db(
    fetcher: Arc<dyn CodeFetcher>,
    policy: RentalPolicy,
) -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .admins([ADMIN])
        .policy(policy)
        .fetcher(fetcher)
        .build()
        .await
        .unwrap();
    engine
        .register_user(
            NewUser {
                telegram_id: ADMIN,
                username: Some("admin".to_string()),
                ..NewUser::default()
            },
            t0(),
        )
        .await
        .unwrap();
    (engine, db)
}

pub async fn approved_user(engine: &Engine, telegram_id: i64) {
    engine
        .register_user(
            NewUser {
                telegram_id,
                username: Some(format!("user{telegram_id}")),
                ..NewUser::default()
            },
            t0(),
        )
        .await
        .unwrap();
    engine.approve_user(ADMIN, telegram_id).await.unwrap();
}

pub async fn add_account(engine: &Engine, login: &str, mmr: i32, with_mailbox: bool) -> Account {
    let mailbox = with_mailbox.then(|| MailboxCredentials {
        login: format!("{login}@mail.example"),
        password: "mailpass".to_string(),
    });
    engine
        .new_account(
            ADMIN,
            NewAccount {
                login: login.to_string(),
                password: "secret".to_string(),
                behavior: Some(10_000),
                mmr,
                calibration: false,
            },
            mailbox,
        )
        .await
        .unwrap()
}

/// Fetcher that finds a code on a given attempt, or never.
pub struct ScriptedFetcher {
    code_on: Option<usize>,
    calls: Mutex<usize>,
}

impl ScriptedFetcher {
    pub fn code_on(attempt: usize) -> Arc<Self> {
        Arc::new(Self {
            code_on: Some(attempt),
            calls: Mutex::new(0),
        })
    }

    pub fn never() -> Arc<Self> {
        Arc::new(Self {
            code_on: None,
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl CodeFetcher for ScriptedFetcher {
    fn fetch_latest_code(
        &self,
        _credentials: &MailboxCredentials,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Option<String>, FetchError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if self.code_on == Some(*calls) {
            return Ok(Some("F7K2Q".to_string()));
        }
        if *calls % 7 == 0 {
            return Err(FetchError::Connection("mail server timed out".to_string()));
        }
        Ok(None)
    }
}
