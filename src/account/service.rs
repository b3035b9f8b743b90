use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::models::{
    Account, BalanceRecalculation, CreateAccountDto, UpdateAccountDto, WALLET_ACCOUNT_NAME,
};
use crate::errors::AppError;
use crate::money::Money;
use crate::store::Store;

/// Service layer for account business logic.
pub struct AccountService;

impl AccountService {
    /// List all accounts for a user.
    pub async fn list_accounts(store: &dyn Store, owner_id: Uuid) -> Result<Vec<Account>, AppError> {
        store.list_accounts(owner_id).await
    }

    /// Get an account by ID, ensuring the requesting user owns it.
    pub async fn get_account(
        store: &dyn Store,
        account_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Account, AppError> {
        store
            .get_account(account_id, owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    /// Create a new account. Balances always start at zero: the balance is
    /// derived from the transactions and transfers recorded afterwards.
    pub async fn create_account(
        store: &dyn Store,
        owner_id: Uuid,
        dto: &CreateAccountDto,
    ) -> Result<Account, AppError> {
        dto.validate()?;

        let name = dto.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::ValidationError(
                "Name cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            owner_id,
            name,
            balance: Money::ZERO,
            active: true,
            created_at: now,
            updated_at: now,
        };

        let mut unit = store.begin().await?;
        unit.insert_account(&account).await?;
        unit.commit().await?;

        info!(account_id = %account.id, %owner_id, "account created");
        Ok(account)
    }

    /// Create the default wallet account given to every newly registered user.
    pub async fn create_wallet_account(
        store: &dyn Store,
        owner_id: Uuid,
    ) -> Result<Account, AppError> {
        let dto = CreateAccountDto {
            name: WALLET_ACCOUNT_NAME.to_string(),
        };
        Self::create_account(store, owner_id, &dto).await
    }

    /// Update an account (partial update - PATCH semantics).
    pub async fn update_account(
        store: &dyn Store,
        account_id: Uuid,
        owner_id: Uuid,
        dto: &UpdateAccountDto,
    ) -> Result<Account, AppError> {
        dto.validate()?;

        let mut unit = store.begin().await?;
        let mut account = unit
            .lock_account(account_id, owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

        if let Some(name) = &dto.name {
            let trimmed = name.trim().to_string();
            if trimmed.is_empty() {
                return Err(AppError::ValidationError(
                    "Name cannot be empty".to_string(),
                ));
            }
            account.name = trimmed;
        }
        if let Some(active) = dto.active {
            account.active = active;
        }
        account.updated_at = Utc::now();

        unit.update_account(&account).await?;
        unit.commit().await?;

        Ok(account)
    }

    /// Delete an account. Accounts still referenced by transactions or
    /// transfers cannot be deleted (deactivate them instead).
    pub async fn delete_account(
        store: &dyn Store,
        account_id: Uuid,
        owner_id: Uuid,
    ) -> Result<(), AppError> {
        let mut unit = store.begin().await?;
        unit.lock_account(account_id, owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

        if unit.account_is_referenced(account_id).await? {
            return Err(AppError::Conflict(format!(
                "Account {account_id} is still referenced by transactions or transfers"
            )));
        }

        unit.delete_account(account_id).await?;
        unit.commit().await?;

        info!(%account_id, %owner_id, "account deleted");
        Ok(())
    }

    /// Recompute an account's balance from scratch and overwrite the cached
    /// value. Recovery path for detected drift; not used on the hot path.
    pub async fn recalculate_balance(
        store: &dyn Store,
        account_id: Uuid,
        owner_id: Uuid,
    ) -> Result<BalanceRecalculation, AppError> {
        let mut unit = store.begin().await?;
        let account = unit
            .lock_account(account_id, owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

        let recalculated = unit.derived_balance(account_id).await?;
        if recalculated != account.balance {
            unit.set_balance(account_id, recalculated).await?;
        }
        unit.commit().await?;

        let result = BalanceRecalculation {
            account_id,
            previous_balance: account.balance,
            recalculated_balance: recalculated,
        };
        if !result.drift().is_zero() {
            warn!(
                %account_id,
                previous = %result.previous_balance,
                recalculated = %result.recalculated_balance,
                "repaired account balance drift"
            );
        }
        Ok(result)
    }
}
