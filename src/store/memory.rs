use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{AtomicUnit, Store};
use crate::account::models::Account;
use crate::errors::AppError;
use crate::goal::models::Goal;
use crate::models::PageQuery;
use crate::money::Money;
use crate::transaction::models::{Transaction, TransactionFilters, TransactionType};
use crate::transfer::models::BankTransfer;

#[derive(Debug, Clone, Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    transactions: HashMap<Uuid, Transaction>,
    transfers: HashMap<Uuid, BankTransfer>,
    goals: HashMap<Uuid, Goal>,
}

/// In-memory implementation for development and testing.
///
/// A unit holds the store-wide lock for its whole lifetime and works on a
/// private copy of the state, published only on commit. Units are therefore
/// fully serialized and a dropped unit leaves no trace.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Atomic unit over a [`MemoryStore`].
pub struct MemoryUnit {
    guard: OwnedMutexGuard<State>,
    working: State,
}

fn page<T>(mut rows: Vec<T>, offset: i64, limit: i64) -> (Vec<T>, i64) {
    let total = rows.len() as i64;
    let start = offset.clamp(0, total) as usize;
    let end = offset.saturating_add(limit).clamp(start as i64, total) as usize;
    (rows.drain(start..end).collect(), total)
}

fn not_found(what: &str, id: Uuid) -> AppError {
    AppError::NotFound(format!("{what} {id} not found"))
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn AtomicUnit>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnit { guard, working }))
    }

    async fn get_account(
        &self,
        account_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .get(&account_id)
            .filter(|a| a.owner_id == owner_id)
            .cloned())
    }

    async fn list_accounts(&self, owner_id: Uuid) -> Result<Vec<Account>, AppError> {
        let state = self.state.lock().await;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts)
    }

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .get(&transaction_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filters: &TransactionFilters,
    ) -> Result<(Vec<Transaction>, i64), AppError> {
        let state = self.state.lock().await;
        let mut rows: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.user_id == user_id && filters.matches(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.release_date
                .cmp(&a.release_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(page(rows, filters.offset(), filters.limit))
    }

    async fn recurring_templates(&self) -> Result<Vec<Transaction>, AppError> {
        let state = self.state.lock().await;
        let mut rows: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.is_template() && t.recurring && t.recurrence_rule().is_some())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn installment_templates_in_progress(&self) -> Result<Vec<Transaction>, AppError> {
        let state = self.state.lock().await;
        let mut rows: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| {
                t.is_template()
                    && t.is_installment_series()
                    && t.current_installment.unwrap_or(1) < t.number_installments.unwrap_or(1)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn sum_transactions(
        &self,
        user_id: Uuid,
        transaction_type: TransactionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Money, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .filter(|t| {
                t.user_id == user_id
                    && t.get_type().ok() == Some(transaction_type)
                    && t.release_date >= start
                    && t.release_date <= end
            })
            .map(Transaction::ledger_amount)
            .sum())
    }

    async fn get_transfer(
        &self,
        transfer_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BankTransfer>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .transfers
            .get(&transfer_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn list_transfers(
        &self,
        user_id: Uuid,
        query: &PageQuery,
    ) -> Result<(Vec<BankTransfer>, i64), AppError> {
        let state = self.state.lock().await;
        let mut rows: Vec<BankTransfer> = state
            .transfers
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.transfer_date
                .cmp(&a.transfer_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(page(rows, query.offset(), query.limit))
    }

    async fn get_goal(&self, goal_id: Uuid, user_id: Uuid) -> Result<Option<Goal>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .goals
            .get(&goal_id)
            .filter(|g| g.user_id == user_id)
            .cloned())
    }

    async fn list_goals(&self, user_id: Uuid) -> Result<Vec<Goal>, AppError> {
        let state = self.state.lock().await;
        let mut goals: Vec<Goal> = state
            .goals
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        goals.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(goals)
    }

    async fn goals_by_user_and_month(
        &self,
        user_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<Goal>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .goals
            .values()
            .filter(|g| g.user_id == user_id && g.year() == year && g.month() == month)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AtomicUnit for MemoryUnit {
    async fn lock_account(
        &mut self,
        account_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        Ok(self
            .working
            .accounts
            .get(&account_id)
            .filter(|a| a.owner_id == owner_id)
            .cloned())
    }

    async fn set_balance(&mut self, account_id: Uuid, balance: Money) -> Result<(), AppError> {
        let account = self
            .working
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| not_found("Account", account_id))?;
        account.balance = balance;
        account.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), AppError> {
        self.working.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), AppError> {
        let stored = self
            .working
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| not_found("Account", account.id))?;
        *stored = account.clone();
        Ok(())
    }

    async fn delete_account(&mut self, account_id: Uuid) -> Result<(), AppError> {
        self.working
            .accounts
            .remove(&account_id)
            .map(|_| ())
            .ok_or_else(|| not_found("Account", account_id))
    }

    async fn account_is_referenced(&mut self, account_id: Uuid) -> Result<bool, AppError> {
        let by_transaction = self
            .working
            .transactions
            .values()
            .any(|t| t.account_id == Some(account_id));
        let by_transfer = self.working.transfers.values().any(|t| {
            t.source_account_id == account_id || t.destination_account_id == account_id
        });
        Ok(by_transaction || by_transfer)
    }

    async fn derived_balance(&mut self, account_id: Uuid) -> Result<Money, AppError> {
        let from_transactions: Money = self
            .working
            .transactions
            .values()
            .filter(|t| t.account_id == Some(account_id))
            .map(Transaction::balance_effect)
            .sum::<Result<Money, AppError>>()?;
        let from_transfers: Money = self
            .working
            .transfers
            .values()
            .map(|t| t.effect_on(account_id))
            .sum();
        Ok(from_transactions + from_transfers)
    }

    async fn lock_transaction(
        &mut self,
        transaction_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        Ok(self
            .working
            .transactions
            .get(&transaction_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), AppError> {
        self.working
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> Result<(), AppError> {
        let stored = self
            .working
            .transactions
            .get_mut(&transaction.id)
            .ok_or_else(|| not_found("Transaction", transaction.id))?;
        *stored = transaction.clone();
        Ok(())
    }

    async fn delete_transaction(&mut self, transaction_id: Uuid) -> Result<(), AppError> {
        self.working
            .transactions
            .remove(&transaction_id)
            .map(|_| ())
            .ok_or_else(|| not_found("Transaction", transaction_id))
    }

    async fn occurrence_exists_on(
        &mut self,
        template_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool, AppError> {
        Ok(self
            .working
            .transactions
            .values()
            .any(|t| t.template_id == Some(template_id) && t.release_date == date))
    }

    async fn installment_exists(
        &mut self,
        template_id: Uuid,
        installment: i32,
    ) -> Result<bool, AppError> {
        Ok(self.working.transactions.values().any(|t| {
            t.template_id == Some(template_id) && t.current_installment == Some(installment)
        }))
    }

    async fn latest_occurrence_date(
        &mut self,
        template_id: Uuid,
    ) -> Result<Option<NaiveDate>, AppError> {
        Ok(self
            .working
            .transactions
            .values()
            .filter(|t| t.template_id == Some(template_id))
            .map(|t| t.release_date)
            .max())
    }

    async fn lock_transfer(
        &mut self,
        transfer_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BankTransfer>, AppError> {
        Ok(self
            .working
            .transfers
            .get(&transfer_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn insert_transfer(&mut self, transfer: &BankTransfer) -> Result<(), AppError> {
        self.working.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn update_transfer(&mut self, transfer: &BankTransfer) -> Result<(), AppError> {
        let stored = self
            .working
            .transfers
            .get_mut(&transfer.id)
            .ok_or_else(|| not_found("Transfer", transfer.id))?;
        *stored = transfer.clone();
        Ok(())
    }

    async fn delete_transfer(&mut self, transfer_id: Uuid) -> Result<(), AppError> {
        self.working
            .transfers
            .remove(&transfer_id)
            .map(|_| ())
            .ok_or_else(|| not_found("Transfer", transfer_id))
    }

    async fn lock_goal(&mut self, goal_id: Uuid, user_id: Uuid) -> Result<Option<Goal>, AppError> {
        Ok(self
            .working
            .goals
            .get(&goal_id)
            .filter(|g| g.user_id == user_id)
            .cloned())
    }

    async fn goals_in_month(
        &mut self,
        user_id: Uuid,
        transaction_type: TransactionType,
        year: i32,
        month: u32,
    ) -> Result<Vec<Goal>, AppError> {
        Ok(self
            .working
            .goals
            .values()
            .filter(|g| {
                g.user_id == user_id
                    && g.get_type().ok() == Some(transaction_type)
                    && g.year() == year
                    && g.month() == month
            })
            .cloned()
            .collect())
    }

    async fn insert_goal(&mut self, goal: &Goal) -> Result<(), AppError> {
        self.working.goals.insert(goal.id, goal.clone());
        Ok(())
    }

    async fn update_goal(&mut self, goal: &Goal) -> Result<(), AppError> {
        let stored = self
            .working
            .goals
            .get_mut(&goal.id)
            .ok_or_else(|| not_found("Goal", goal.id))?;
        *stored = goal.clone();
        Ok(())
    }

    async fn delete_goal(&mut self, goal_id: Uuid) -> Result<(), AppError> {
        self.working
            .goals
            .remove(&goal_id)
            .map(|_| ())
            .ok_or_else(|| not_found("Goal", goal_id))
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryUnit { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(owner_id: Uuid) -> Account {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            owner_id,
            name: "Checking".to_string(),
            balance: Money::ZERO,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn page_clamps_out_of_range_windows() {
        let rows: Vec<i32> = (1..=5).collect();
        assert_eq!(page(rows.clone(), 2, 2), (vec![3, 4], 5));
        assert_eq!(page(rows.clone(), 4, i64::MAX), (vec![5], 5));
        assert_eq!(page(rows, i64::MAX, i64::MAX), (vec![], 5));
    }

    #[tokio::test]
    async fn dropped_unit_rolls_back() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let acc = account(owner);

        let mut unit = store.begin().await.unwrap();
        unit.insert_account(&acc).await.unwrap();
        drop(unit);

        assert!(store.get_account(acc.id, owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_unit_is_visible() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let acc = account(owner);

        let mut unit = store.begin().await.unwrap();
        unit.insert_account(&acc).await.unwrap();
        unit.set_balance(acc.id, Money::from_cents(500)).await.unwrap();
        unit.commit().await.unwrap();

        let stored = store.get_account(acc.id, owner).await.unwrap().unwrap();
        assert_eq!(stored.balance, Money::from_cents(500));
        assert!(store.get_account(acc.id, Uuid::new_v4()).await.unwrap().is_none());
    }
}
