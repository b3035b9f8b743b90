mod models;
mod service;

pub use models::RunReport;
pub use service::RecurrenceScheduler;
