pub mod models;
mod service;

pub use service::GoalService;
