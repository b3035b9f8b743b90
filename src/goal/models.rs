use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::error;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::money::Money;
use crate::transaction::models::{validate_positive_amount, TransactionType};

/// Database entity for monthly goals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// Any day inside the month the goal applies to
    pub date: NaiveDate,
    pub transaction_type: String,
    pub value: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn get_type(&self) -> Result<TransactionType, AppError> {
        TransactionType::parse(&self.transaction_type).ok_or_else(|| {
            error!(
                goal_id = %self.id,
                transaction_type = %self.transaction_type,
                "unknown goal type stored"
            );
            AppError::InternalError(format!("Goal {} has unknown type", self.id))
        })
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }
}

/// Goal together with the actual total of its month.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalWithTotals {
    #[serde(flatten)]
    pub goal: Goal,
    /// Set for income goals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub income_total: Option<Money>,
    /// Set for expense goals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_total: Option<Money>,
}

impl GoalWithTotals {
    pub fn new(goal: Goal, total: Money) -> Result<Self, AppError> {
        let (income_total, expense_total) = match goal.get_type()? {
            TransactionType::Income => (Some(total), None),
            TransactionType::Expense => (None, Some(total)),
        };
        Ok(Self {
            goal,
            income_total,
            expense_total,
        })
    }
}

/// DTO for creating a new goal
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGoalDto {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    pub date: NaiveDate,

    pub transaction_type: TransactionType,

    #[validate(custom(
        function = "validate_positive_amount",
        message = "Value must be positive with at most two decimals"
    ))]
    pub value: Money,
}

/// DTO for updating a goal (all fields optional for PATCH semantics)
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGoalDto {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    pub date: Option<NaiveDate>,

    pub transaction_type: Option<TransactionType>,

    pub value: Option<Money>,
}

impl UpdateGoalDto {
    pub fn validate_value(&self) -> Result<(), validator::ValidationError> {
        if let Some(value) = &self.value {
            validate_positive_amount(value)?;
        }
        Ok(())
    }
}
