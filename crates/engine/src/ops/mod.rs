use std::{collections::HashSet, fmt, sync::Arc};

use sea_orm::DatabaseConnection;

use crate::{
    ResultEngine,
    flows::code_wait::{CodeFetcher, NoMailFetcher, WaitPolicy},
};

mod accounts;
mod audit;
mod mailboxes;
mod rentals;
mod sweep;
mod users;

pub use accounts::{AccountField, EditableField, NewAccount};
pub use rentals::{AccountEdits, RentalCommit};
pub use sweep::ExpiredRental;
pub use users::Registration;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Default menu of rental durations, in minutes.
pub const DEFAULT_DURATIONS: [u32; 6] = [60, 120, 180, 360, 720, 1440];

/// Knobs of the rental conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RentalPolicy {
    /// Durations a renter may pick, in minutes.
    pub durations: Vec<u32>,
    pub wait: WaitPolicy,
}

impl Default for RentalPolicy {
    fn default() -> Self {
        Self {
            durations: DEFAULT_DURATIONS.to_vec(),
            wait: WaitPolicy::default(),
        }
    }
}

/// Shared handle to the inventory store and the rental rules.
///
/// Cloning is cheap: the connection pool and the configuration are shared.
#[derive(Clone)]
pub struct Engine {
    database: DatabaseConnection,
    admins: Arc<HashSet<i64>>,
    policy: Arc<RentalPolicy>,
    fetcher: Arc<dyn CodeFetcher>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("admins", &self.admins)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Whether the id is in the configured admin allow-list.
    pub fn is_admin(&self, telegram_id: i64) -> bool {
        self.admins.contains(&telegram_id)
    }

    pub fn admins(&self) -> impl Iterator<Item = i64> + '_ {
        self.admins.iter().copied()
    }

    pub fn policy(&self) -> &RentalPolicy {
        &self.policy
    }

    pub(crate) fn fetcher(&self) -> Arc<dyn CodeFetcher> {
        Arc::clone(&self.fetcher)
    }
}

/// The builder for `Engine`
pub struct EngineBuilder {
    database: DatabaseConnection,
    admins: HashSet<i64>,
    policy: RentalPolicy,
    fetcher: Arc<dyn CodeFetcher>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            database: DatabaseConnection::default(),
            admins: HashSet::new(),
            policy: RentalPolicy::default(),
            fetcher: Arc::new(NoMailFetcher),
        }
    }
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Telegram ids allowed to administer the bot.
    pub fn admins(mut self, admins: impl IntoIterator<Item = i64>) -> EngineBuilder {
        self.admins = admins.into_iter().collect();
        self
    }

    pub fn policy(mut self, policy: RentalPolicy) -> EngineBuilder {
        self.policy = policy;
        self
    }

    /// Mailbox client used while waiting for a verification code.
    pub fn fetcher(mut self, fetcher: Arc<dyn CodeFetcher>) -> EngineBuilder {
        self.fetcher = fetcher;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        if self.policy.durations.is_empty() || self.policy.durations.contains(&0) {
            return Err(crate::EngineError::InvalidInput(
                "rental durations must be non-empty and positive".to_string(),
            ));
        }
        Ok(Engine {
            database: self.database,
            admins: Arc::new(self.admins),
            policy: Arc::new(self.policy),
            fetcher: self.fetcher,
        })
    }
}
