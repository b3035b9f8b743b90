use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::money::Money;

/// Name given to the account every user receives on registration.
pub const WALLET_ACCOUNT_NAME: &str = "Wallet";

/// Database entity for accounts.
///
/// `balance` is derived state: it always equals the signed sum of the
/// transactions and transfers that reference the account. Only the ledger
/// writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub balance: Money,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating an account
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountDto {
    /// Account name (1-50 characters)
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,
}

/// Request body for updating an account (PATCH - all fields optional)
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountDto {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: Option<String>,

    pub active: Option<bool>,
}

/// Result of a balance recalculation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRecalculation {
    pub account_id: Uuid,
    /// Balance stored before the recalculation
    pub previous_balance: Money,
    /// Balance derived from transactions and transfers
    pub recalculated_balance: Money,
}

impl BalanceRecalculation {
    /// Difference that was repaired (zero when the cached balance was correct).
    pub fn drift(&self) -> Money {
        self.recalculated_balance - self.previous_balance
    }
}
