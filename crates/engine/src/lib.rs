//! Core of the account rental bot.
//!
//! The engine owns the inventory store (accounts, users, mailboxes and the
//! audit log), the rental and return conversations, the code-wait loop and the
//! auto-expiry sweeper. Transports drive it through [`Engine`] and render the
//! replies it returns; the engine never knows how a reply is displayed.

pub use account_logs::{AccountLog, LogAction};
pub use accounts::{Account, AccountStatus, Rental};
pub use emails::{Mailbox, MailboxCredentials};
pub use error::{EngineError, FetchError};
pub use flows::{
    code_wait::{
        CancelHandle, CancelSignal, CodeFetcher, NoMailFetcher, WaitOutcome, WaitPolicy,
        cancel_pair, wait_for_code,
    },
    rental::{RentalContext, RentalEvent, RentalReply, RentalState},
    returns::{ReturnContext, ReturnEvent, ReturnField, ReturnReply, ReturnState, FieldChoice},
};
pub use ops::{
    AccountEdits, AccountField, EditableField, Engine, EngineBuilder, ExpiredRental, NewAccount,
    Registration, RentalCommit, RentalPolicy,
};
pub use sweeper::Sweeper;
pub use users::{NewUser, User};
pub use util::{normalize_required_text, parse_credentials_pair, parse_flag, parse_number};

mod account_logs;
mod accounts;
mod emails;
mod error;
mod flows;
mod ops;
mod sweeper;
mod users;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
