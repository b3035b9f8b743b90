pub mod installment;
pub mod models;
mod service;

pub use installment::InstallmentPlan;
pub use service::TransactionService;
