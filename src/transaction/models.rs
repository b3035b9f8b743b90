use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::error;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::errors::AppError;
use crate::models::{default_limit, default_page, deserialize_present};
use crate::money::Money;
use crate::recurrence::RecurrenceRule;

/// Transaction type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money spent (decreases account balance)
    #[default]
    Expense,
    /// Money received (increases account balance)
    Income,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Expense => "expense",
            TransactionType::Income => "income",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "expense" => Some(TransactionType::Expense),
            "income" => Some(TransactionType::Income),
            _ => None,
        }
    }

    /// Effect of `amount` on an account balance.
    pub fn signed(&self, amount: Money) -> Money {
        match self {
            TransactionType::Expense => -amount,
            TransactionType::Income => amount,
        }
    }
}

/// Validate that amount is positive and expressed in cents
pub(crate) fn validate_positive_amount(amount: &Money) -> Result<(), ValidationError> {
    if !amount.is_positive() {
        return Err(ValidationError::new("amount_must_be_positive"));
    }
    if !amount.has_cent_precision() {
        return Err(ValidationError::new("amount_has_more_than_two_decimals"));
    }
    Ok(())
}

/// Database model for transactions.
///
/// Installment templates keep the original total in `value`, the per-period
/// amount in `value_installment` and the remainder-bearing final amount in
/// `last_installment_value`. Generated occurrences point back to their
/// template through `template_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Option<Uuid>,
    pub payment_method_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub transaction_type: String,
    pub value: Money,
    pub value_installment: Option<Money>,
    pub last_installment_value: Option<Money>,
    pub release_date: NaiveDate,
    pub number_installments: Option<i32>,
    pub current_installment: Option<i32>,
    pub recurring: bool,
    pub recurring_type: Option<String>,
    pub template_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Parsed type column. An unknown value is a corrupt row, never a default.
    pub fn get_type(&self) -> Result<TransactionType, AppError> {
        TransactionType::parse(&self.transaction_type).ok_or_else(|| {
            error!(
                transaction_id = %self.id,
                transaction_type = %self.transaction_type,
                "unknown transaction type stored"
            );
            AppError::InternalError(format!(
                "Transaction {} has unknown type '{}'",
                self.id, self.transaction_type
            ))
        })
    }

    pub fn recurrence_rule(&self) -> Option<RecurrenceRule> {
        self.recurring_type.as_deref().and_then(RecurrenceRule::parse)
    }

    /// Amount this row moves on its account: the installment amount when the
    /// row belongs to a series, the full value otherwise.
    pub fn ledger_amount(&self) -> Money {
        self.value_installment.unwrap_or(self.value)
    }

    /// Signed effect of this row on its account balance.
    pub fn balance_effect(&self) -> Result<Money, AppError> {
        Ok(self.get_type()?.signed(self.ledger_amount()))
    }

    pub fn is_installment_series(&self) -> bool {
        self.number_installments.is_some_and(|n| n > 1)
    }

    pub fn is_template(&self) -> bool {
        self.template_id.is_none()
    }
}

/// One line of the installment schedule returned on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentPreview {
    pub installment: i32,
    pub value: Money,
}

/// Result of creating a transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    /// Empty unless the value was split into installments
    pub installment_preview: Vec<InstallmentPreview>,
}

/// Request body for creating a transaction
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionDto {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 50, message = "Category cannot exceed 50 characters"))]
    pub category: Option<String>,

    /// Transaction type (defaults to expense)
    #[serde(default)]
    pub transaction_type: TransactionType,

    /// Total value (must be positive)
    #[validate(custom(
        function = "validate_positive_amount",
        message = "Value must be positive with at most two decimals"
    ))]
    pub value: Money,

    pub release_date: NaiveDate,

    /// Split the value over this many monthly installments
    #[validate(range(min = 1, max = 600, message = "Installments must be between 1 and 600"))]
    pub number_installments: Option<i32>,

    pub account_id: Option<Uuid>,

    pub payment_method_id: Uuid,

    #[serde(default)]
    pub recurring: bool,

    pub recurring_type: Option<RecurrenceRule>,
}

/// Request body for updating a transaction (PATCH - all fields optional)
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransactionDto {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    /// Category (use null to clear)
    #[serde(default, deserialize_with = "deserialize_present")]
    pub category: Option<Option<String>>,

    pub transaction_type: Option<TransactionType>,

    pub value: Option<Money>,

    pub release_date: Option<NaiveDate>,

    /// Account ID (use null to remove account association)
    #[serde(default, deserialize_with = "deserialize_present")]
    pub account_id: Option<Option<Uuid>>,

    pub payment_method_id: Option<Uuid>,

    pub recurring: Option<bool>,

    /// Recurrence (use null to clear)
    #[serde(default, deserialize_with = "deserialize_present")]
    pub recurring_type: Option<Option<RecurrenceRule>>,
}

impl UpdateTransactionDto {
    /// Validate value if provided
    pub fn validate_value(&self) -> Result<(), ValidationError> {
        if let Some(value) = &self.value {
            validate_positive_amount(value)?;
        }
        if let Some(Some(category)) = &self.category {
            if category.chars().count() > 50 {
                return Err(ValidationError::new("category_too_long"));
            }
        }
        Ok(())
    }
}

/// Query parameters for listing transactions
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilters {
    /// Filter by start date (inclusive)
    pub start_date: Option<NaiveDate>,
    /// Filter by end date (inclusive)
    pub end_date: Option<NaiveDate>,
    pub account_id: Option<Uuid>,
    pub transaction_type: Option<TransactionType>,
    pub recurring: Option<bool>,

    #[validate(range(min = 1, max = 1_000_000, message = "Page must be between 1 and 1000000"))]
    #[serde(default = "default_page")]
    pub page: i64,

    /// Maximum results (1-100)
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl TransactionFilters {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit)
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.start_date.map_or(true, |d| transaction.release_date >= d)
            && self.end_date.map_or(true, |d| transaction.release_date <= d)
            && self
                .account_id
                .map_or(true, |id| transaction.account_id == Some(id))
            && self
                .transaction_type
                .map_or(true, |t| transaction.get_type().ok() == Some(t))
            && self.recurring.map_or(true, |r| transaction.recurring == r)
    }
}

impl Default for TransactionFilters {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            account_id: None,
            transaction_type: None,
            recurring: None,
            page: default_page(),
            limit: default_limit(),
        }
    }
}
