use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::deserialize_present;
use crate::money::Money;
use crate::transaction::models::validate_positive_amount;

/// Database entity for transfers between two accounts of the same user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BankTransfer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub payment_method_id: Uuid,
    pub amount: Money,
    pub transfer_date: NaiveDate,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankTransfer {
    /// Signed effect of this transfer on `account_id` (zero if unrelated).
    pub fn effect_on(&self, account_id: Uuid) -> Money {
        if self.source_account_id == self.destination_account_id {
            return Money::ZERO;
        }
        if account_id == self.source_account_id {
            -self.amount
        } else if account_id == self.destination_account_id {
            self.amount
        } else {
            Money::ZERO
        }
    }
}

/// Request body for creating a transfer
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransferDto {
    pub source_account_id: Uuid,

    pub destination_account_id: Uuid,

    pub payment_method_id: Uuid,

    #[validate(custom(
        function = "validate_positive_amount",
        message = "Amount must be positive with at most two decimals"
    ))]
    pub amount: Money,

    pub transfer_date: NaiveDate,

    #[validate(length(max = 200, message = "Description cannot exceed 200 characters"))]
    pub description: Option<String>,
}

/// Request body for updating a transfer (PATCH - all fields optional)
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransferDto {
    pub amount: Option<Money>,

    pub transfer_date: Option<NaiveDate>,

    pub payment_method_id: Option<Uuid>,

    /// Description (use null to clear)
    #[serde(default, deserialize_with = "deserialize_present")]
    pub description: Option<Option<String>>,
}

impl UpdateTransferDto {
    /// Validate amount if provided
    pub fn validate_amount(&self) -> Result<(), ValidationError> {
        if let Some(amount) = &self.amount {
            validate_positive_amount(amount)?;
        }
        if let Some(Some(description)) = &self.description {
            if description.chars().count() > 200 {
                return Err(ValidationError::new("description_too_long"));
            }
        }
        Ok(())
    }
}
