pub mod ledger;
pub mod models;
mod service;

pub use ledger::{BalanceOperation, Ledger};
pub use service::AccountService;
