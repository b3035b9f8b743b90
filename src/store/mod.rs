//! Persistence boundary for the engine.
//!
//! Services never talk to a database directly: they receive a [`Store`] and
//! run every multi-step mutation inside an [`AtomicUnit`] obtained from
//! [`Store::begin`]. A unit that is dropped without [`AtomicUnit::commit`]
//! rolls back, so an early `?` return never leaves a row written without its
//! balance adjustment.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::account::models::Account;
use crate::errors::AppError;
use crate::goal::models::Goal;
use crate::models::PageQuery;
use crate::money::Money;
use crate::transaction::models::{Transaction, TransactionFilters, TransactionType};
use crate::transfer::models::BankTransfer;

/// Read surface plus the entry point for atomic writes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a new atomic unit.
    async fn begin(&self) -> Result<Box<dyn AtomicUnit>, AppError>;

    async fn get_account(&self, account_id: Uuid, owner_id: Uuid)
        -> Result<Option<Account>, AppError>;

    async fn list_accounts(&self, owner_id: Uuid) -> Result<Vec<Account>, AppError>;

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Transaction>, AppError>;

    /// Filtered page of a user's transactions, newest first, with the total
    /// count matching the filters.
    async fn list_transactions(
        &self,
        user_id: Uuid,
        filters: &TransactionFilters,
    ) -> Result<(Vec<Transaction>, i64), AppError>;

    /// Templates flagged recurring with a recurrence type.
    async fn recurring_templates(&self) -> Result<Vec<Transaction>, AppError>;

    /// Installment templates that have not generated their last installment.
    async fn installment_templates_in_progress(&self) -> Result<Vec<Transaction>, AppError>;

    /// Sum of `value_installment ?? value` for a user's transactions of one
    /// type released between `start` and `end` inclusive.
    async fn sum_transactions(
        &self,
        user_id: Uuid,
        transaction_type: TransactionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Money, AppError>;

    async fn get_transfer(
        &self,
        transfer_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BankTransfer>, AppError>;

    async fn list_transfers(
        &self,
        user_id: Uuid,
        page: &PageQuery,
    ) -> Result<(Vec<BankTransfer>, i64), AppError>;

    async fn get_goal(&self, goal_id: Uuid, user_id: Uuid) -> Result<Option<Goal>, AppError>;

    async fn list_goals(&self, user_id: Uuid) -> Result<Vec<Goal>, AppError>;

    async fn goals_by_user_and_month(
        &self,
        user_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<Goal>, AppError>;
}

/// A set of reads and writes that commit or roll back together.
///
/// `lock_*` reads take the row lock that serializes concurrent balance
/// mutations on the same account.
#[async_trait]
pub trait AtomicUnit: Send {
    async fn lock_account(
        &mut self,
        account_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Account>, AppError>;

    async fn set_balance(&mut self, account_id: Uuid, balance: Money) -> Result<(), AppError>;

    async fn insert_account(&mut self, account: &Account) -> Result<(), AppError>;

    async fn update_account(&mut self, account: &Account) -> Result<(), AppError>;

    async fn delete_account(&mut self, account_id: Uuid) -> Result<(), AppError>;

    /// Whether any transaction or transfer still references the account.
    async fn account_is_referenced(&mut self, account_id: Uuid) -> Result<bool, AppError>;

    /// Balance derived from scratch: signed transactions plus incoming minus
    /// outgoing transfers.
    async fn derived_balance(&mut self, account_id: Uuid) -> Result<Money, AppError>;

    async fn lock_transaction(
        &mut self,
        transaction_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Transaction>, AppError>;

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), AppError>;

    async fn update_transaction(&mut self, transaction: &Transaction) -> Result<(), AppError>;

    async fn delete_transaction(&mut self, transaction_id: Uuid) -> Result<(), AppError>;

    async fn occurrence_exists_on(
        &mut self,
        template_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool, AppError>;

    /// Whether the series already has a row for the 1-based `installment`,
    /// wherever its release date has since been moved.
    async fn installment_exists(
        &mut self,
        template_id: Uuid,
        installment: i32,
    ) -> Result<bool, AppError>;

    /// Release date of the newest occurrence generated from a template.
    async fn latest_occurrence_date(
        &mut self,
        template_id: Uuid,
    ) -> Result<Option<NaiveDate>, AppError>;

    async fn lock_transfer(
        &mut self,
        transfer_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BankTransfer>, AppError>;

    async fn insert_transfer(&mut self, transfer: &BankTransfer) -> Result<(), AppError>;

    async fn update_transfer(&mut self, transfer: &BankTransfer) -> Result<(), AppError>;

    async fn delete_transfer(&mut self, transfer_id: Uuid) -> Result<(), AppError>;

    async fn lock_goal(&mut self, goal_id: Uuid, user_id: Uuid)
        -> Result<Option<Goal>, AppError>;

    /// Goals of one user and type in a calendar month, serialized against
    /// concurrent goal writes for the same user.
    async fn goals_in_month(
        &mut self,
        user_id: Uuid,
        transaction_type: TransactionType,
        year: i32,
        month: u32,
    ) -> Result<Vec<Goal>, AppError>;

    async fn insert_goal(&mut self, goal: &Goal) -> Result<(), AppError>;

    async fn update_goal(&mut self, goal: &Goal) -> Result<(), AppError>;

    async fn delete_goal(&mut self, goal_id: Uuid) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
