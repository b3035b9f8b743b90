use tracing::debug;
use uuid::Uuid;

use super::models::Account;
use crate::errors::AppError;
use crate::money::Money;
use crate::store::AtomicUnit;

/// Indicates whether to apply or reverse a balance effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOperation {
    Apply,
    Reverse,
}

impl BalanceOperation {
    pub fn adjust(self, effect: Money) -> Money {
        match self {
            BalanceOperation::Apply => effect,
            BalanceOperation::Reverse => -effect,
        }
    }
}

/// The only writer of account balances.
///
/// Every mutation is a read-modify-write on a row locked by the caller's
/// atomic unit, so two units touching the same account serialize instead of
/// overwriting each other's result.
pub struct Ledger;

impl Ledger {
    /// Add `delta` (signed) to the balance of `account_id`, returning the new
    /// balance. Fails with NotFound when the account does not belong to
    /// `owner_id`.
    pub async fn apply(
        unit: &mut dyn AtomicUnit,
        account_id: Uuid,
        owner_id: Uuid,
        delta: Money,
    ) -> Result<Money, AppError> {
        let account = unit
            .lock_account(account_id, owner_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Account {account_id} not found or access denied"))
            })?;

        if delta.is_zero() {
            return Ok(account.balance);
        }

        let new_balance = account.balance + delta;
        unit.set_balance(account_id, new_balance).await?;

        debug!(
            %account_id,
            %delta,
            old_balance = %account.balance,
            %new_balance,
            "account balance adjusted"
        );
        Ok(new_balance)
    }

    /// Apply or reverse a signed balance effect.
    pub async fn apply_effect(
        unit: &mut dyn AtomicUnit,
        account_id: Uuid,
        owner_id: Uuid,
        effect: Money,
        operation: BalanceOperation,
    ) -> Result<Money, AppError> {
        Self::apply(unit, account_id, owner_id, operation.adjust(effect)).await
    }

    /// Lock an account that is about to receive a new posting; it must belong
    /// to `owner_id` and be active.
    pub async fn lock_active(
        unit: &mut dyn AtomicUnit,
        account_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Account, AppError> {
        let account = unit
            .lock_account(account_id, owner_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Account {account_id} not found or access denied"))
            })?;
        if !account.active {
            return Err(AppError::InvalidOperation(format!(
                "Account {account_id} is inactive"
            )));
        }
        Ok(account)
    }

    /// Lock several accounts in ascending id order so that two units locking
    /// the same pair can never deadlock. Missing accounts are skipped.
    pub async fn lock_in_order(
        unit: &mut dyn AtomicUnit,
        owner_id: Uuid,
        account_ids: &[Uuid],
    ) -> Result<Vec<Account>, AppError> {
        let mut ids = account_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut locked = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = unit.lock_account(id, owner_id).await? {
                locked.push(account);
            }
        }
        Ok(locked)
    }

    pub async fn credit(
        unit: &mut dyn AtomicUnit,
        account_id: Uuid,
        owner_id: Uuid,
        amount: Money,
    ) -> Result<Money, AppError> {
        Self::apply(unit, account_id, owner_id, amount).await
    }

    pub async fn debit(
        unit: &mut dyn AtomicUnit,
        account_id: Uuid,
        owner_id: Uuid,
        amount: Money,
    ) -> Result<Money, AppError> {
        Self::apply(unit, account_id, owner_id, -amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_negates_effect() {
        let effect = Money::from_cents(-2_500);
        assert_eq!(BalanceOperation::Apply.adjust(effect), effect);
        assert_eq!(BalanceOperation::Reverse.adjust(effect), Money::from_cents(2_500));
    }
}
