pub mod account;
pub mod config;
pub mod errors;
pub mod goal;
pub mod models;
pub mod money;
pub mod recurrence;
pub mod scheduler;
pub mod store;
pub mod transaction;
pub mod transfer;
