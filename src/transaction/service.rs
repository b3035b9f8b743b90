use chrono::{NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::installment::InstallmentPlan;
use super::models::{
    CreateTransactionDto, CreatedTransaction, Transaction, TransactionFilters,
    UpdateTransactionDto,
};
use crate::account::ledger::{BalanceOperation, Ledger};
use crate::errors::AppError;
use crate::models::Page;
use crate::money::Money;
use crate::recurrence::RecurrenceRule;
use crate::store::{AtomicUnit, Store};

/// Service layer for transaction business logic.
/// CRITICAL: All balance updates must be atomic to prevent data inconsistency.
pub struct TransactionService;

impl TransactionService {
    /// Create a transaction with atomic balance update.
    ///
    /// Installment purchases store the total in `value` and post only the
    /// first installment; the scheduler materializes the rest.
    pub async fn create_transaction(
        store: &dyn Store,
        user_id: Uuid,
        dto: CreateTransactionDto,
    ) -> Result<CreatedTransaction, AppError> {
        dto.validate()?;

        let name = dto.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::ValidationError(
                "Name cannot be empty".to_string(),
            ));
        }

        Self::validate_generation(dto.recurring, dto.recurring_type, dto.number_installments)?;

        let plan = match dto.number_installments {
            Some(count) if count > 1 => Some(InstallmentPlan::new(dto.value, count as u32)?),
            _ => None,
        };

        let now = Utc::now();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id,
            account_id: dto.account_id,
            payment_method_id: dto.payment_method_id,
            name,
            category: dto.category,
            transaction_type: dto.transaction_type.as_str().to_string(),
            value: dto.value,
            value_installment: plan.map(|p| p.base),
            last_installment_value: plan.map(|p| p.last),
            release_date: dto.release_date,
            number_installments: dto.number_installments,
            current_installment: dto.number_installments.map(|_| 1),
            recurring: dto.recurring,
            recurring_type: dto
                .recurring_type
                .filter(|_| dto.recurring)
                .map(|r| r.as_str().to_string()),
            template_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut unit = store.begin().await?;

        // 1. Verify the account before anything is written
        if let Some(account_id) = transaction.account_id {
            Ledger::lock_active(unit.as_mut(), account_id, user_id).await?;
        }

        // 2. Insert the transaction
        unit.insert_transaction(&transaction).await?;

        // 3. Update account balance if account_id is present
        if let Some(account_id) = transaction.account_id {
            Ledger::apply_effect(
                unit.as_mut(),
                account_id,
                user_id,
                transaction.balance_effect()?,
                BalanceOperation::Apply,
            )
            .await?;
        }

        // 4. Commit
        unit.commit().await?;

        info!(
            transaction_id = %transaction.id,
            %user_id,
            value = %transaction.value,
            installments = ?transaction.number_installments,
            recurring = transaction.recurring,
            "transaction created"
        );

        Ok(CreatedTransaction {
            transaction,
            installment_preview: plan.map(|p| p.preview()).unwrap_or_default(),
        })
    }

    /// Update a transaction with atomic balance adjustments.
    /// SCENARIOS:
    /// 1. Same account: apply only the net difference between old and new effect
    /// 2. Account changed: reverse on the old account, apply on the new one
    pub async fn update_transaction(
        store: &dyn Store,
        user_id: Uuid,
        transaction_id: Uuid,
        dto: UpdateTransactionDto,
    ) -> Result<Transaction, AppError> {
        dto.validate()?;
        dto.validate_value()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        let mut unit = store.begin().await?;

        // 1. Fetch and lock the existing transaction
        let old = unit
            .lock_transaction(transaction_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

        // 2. Determine final values
        let mut updated = old.clone();

        if let Some(name) = &dto.name {
            let trimmed = name.trim().to_string();
            if trimmed.is_empty() {
                return Err(AppError::ValidationError(
                    "Name cannot be empty".to_string(),
                ));
            }
            updated.name = trimmed;
        }
        if let Some(category) = &dto.category {
            updated.category = category.clone();
        }
        if let Some(transaction_type) = dto.transaction_type {
            updated.transaction_type = transaction_type.as_str().to_string();
        }
        if let Some(value) = dto.value {
            if old.is_installment_series() && value != old.value {
                return Err(AppError::InvalidOperation(
                    "The value of an installment series cannot be changed; delete and recreate it"
                        .to_string(),
                ));
            }
            updated.value = value;
        }
        if let Some(release_date) = dto.release_date {
            updated.release_date = release_date;
        }
        if let Some(account_id) = dto.account_id {
            updated.account_id = account_id;
        }
        if let Some(payment_method_id) = dto.payment_method_id {
            updated.payment_method_id = payment_method_id;
        }
        if let Some(recurring) = dto.recurring {
            updated.recurring = recurring;
        }
        if let Some(recurring_type) = dto.recurring_type {
            updated.recurring_type = recurring_type.map(|r| r.as_str().to_string());
        }

        if updated.recurring && !old.recurring && !old.is_template() {
            return Err(AppError::InvalidOperation(
                "A generated occurrence cannot become a recurring template".to_string(),
            ));
        }
        Self::validate_generation(
            updated.recurring,
            updated.recurrence_rule(),
            updated.number_installments,
        )?;
        if !updated.recurring {
            updated.recurring_type = None;
        }

        // 3. Validate the new account if changing
        if updated.account_id != old.account_id {
            if let Some(new_account_id) = updated.account_id {
                Ledger::lock_active(unit.as_mut(), new_account_id, user_id).await?;
            }
        }

        // 4. CRITICAL: Handle balance adjustments
        Self::handle_balance_update_for_modification(unit.as_mut(), &old, &updated).await?;

        // 5. Persist
        updated.updated_at = Utc::now();
        unit.update_transaction(&updated).await?;
        unit.commit().await?;

        info!(%transaction_id, %user_id, "transaction updated");
        Ok(updated)
    }

    /// Delete a transaction with atomic balance restoration.
    /// CRITICAL: Must restore account balance before deleting.
    pub async fn delete_transaction(
        store: &dyn Store,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<(), AppError> {
        let mut unit = store.begin().await?;

        // 1. Fetch and lock the transaction row
        let transaction = unit
            .lock_transaction(transaction_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

        // 2. Restore account balance if account exists
        if let Some(account_id) = transaction.account_id {
            let account_exists = unit
                .lock_account(account_id, transaction.user_id)
                .await?
                .is_some();

            if account_exists {
                Ledger::apply_effect(
                    unit.as_mut(),
                    account_id,
                    transaction.user_id,
                    transaction.balance_effect()?,
                    BalanceOperation::Reverse,
                )
                .await?;
            }
        }

        // 3. Delete the transaction
        unit.delete_transaction(transaction_id).await?;
        unit.commit().await?;

        info!(%transaction_id, %user_id, "transaction deleted");
        Ok(())
    }

    /// Get a single transaction by ID
    pub async fn get_transaction(
        store: &dyn Store,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, AppError> {
        store
            .get_transaction(transaction_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))
    }

    /// List transactions with filters
    pub async fn list_transactions(
        store: &dyn Store,
        user_id: Uuid,
        filters: &TransactionFilters,
    ) -> Result<Page<Transaction>, AppError> {
        filters.validate()?;

        let (data, total) = store.list_transactions(user_id, filters).await?;
        Ok(Page {
            data,
            total,
            page: filters.page,
            limit: filters.limit,
        })
    }

    /// Insert one generated occurrence of `template` dated `release_date` and
    /// post its balance effect. Runs inside the caller's unit.
    ///
    /// `installment` carries the 1-based position and amount when the
    /// template is an installment series.
    pub async fn create_occurrence(
        unit: &mut dyn AtomicUnit,
        template: &Transaction,
        release_date: NaiveDate,
        installment: Option<(i32, Money)>,
    ) -> Result<Transaction, AppError> {
        let now = Utc::now();
        let occurrence = Transaction {
            id: Uuid::new_v4(),
            user_id: template.user_id,
            account_id: template.account_id,
            payment_method_id: template.payment_method_id,
            name: template.name.clone(),
            category: template.category.clone(),
            transaction_type: template.transaction_type.clone(),
            value: template.value,
            value_installment: installment.map(|(_, amount)| amount),
            last_installment_value: installment.and(template.last_installment_value),
            release_date,
            number_installments: installment.and(template.number_installments),
            current_installment: installment.map(|(index, _)| index),
            recurring: false,
            recurring_type: None,
            template_id: Some(template.id),
            created_at: now,
            updated_at: now,
        };

        unit.insert_transaction(&occurrence).await?;

        if let Some(account_id) = occurrence.account_id {
            Ledger::apply_effect(
                unit,
                account_id,
                occurrence.user_id,
                occurrence.balance_effect()?,
                BalanceOperation::Apply,
            )
            .await?;
        }

        Ok(occurrence)
    }

    /// Handle the balance update scenarios during modification
    async fn handle_balance_update_for_modification(
        unit: &mut dyn AtomicUnit,
        old: &Transaction,
        new: &Transaction,
    ) -> Result<(), AppError> {
        let old_effect = old.balance_effect()?;
        let new_effect = new.balance_effect()?;

        // Scenario 1: Same account, amount/type may have changed
        if old.account_id == new.account_id {
            if let Some(account_id) = old.account_id {
                Ledger::apply(unit, account_id, old.user_id, new_effect - old_effect).await?;
            }
            return Ok(());
        }

        // Scenario 2: Account changed (including to/from no account)
        let involved: Vec<Uuid> = old.account_id.into_iter().chain(new.account_id).collect();
        Ledger::lock_in_order(unit, old.user_id, &involved).await?;

        if let Some(old_account_id) = old.account_id {
            Ledger::apply_effect(
                unit,
                old_account_id,
                old.user_id,
                old_effect,
                BalanceOperation::Reverse,
            )
            .await?;
        }
        if let Some(new_account_id) = new.account_id {
            Ledger::apply_effect(
                unit,
                new_account_id,
                new.user_id,
                new_effect,
                BalanceOperation::Apply,
            )
            .await?;
        }

        Ok(())
    }

    /// Recurring and installment generation are mutually exclusive, and a
    /// recurring template needs a rule.
    fn validate_generation(
        recurring: bool,
        rule: Option<RecurrenceRule>,
        number_installments: Option<i32>,
    ) -> Result<(), AppError> {
        if !recurring {
            return Ok(());
        }
        if rule.is_none() {
            return Err(AppError::ValidationError(
                "A recurring transaction needs a recurring type".to_string(),
            ));
        }
        if number_installments.is_some_and(|n| n > 1) {
            return Err(AppError::InvalidOperation(
                "A transaction cannot be both recurring and split into installments".to_string(),
            ));
        }
        Ok(())
    }
}
