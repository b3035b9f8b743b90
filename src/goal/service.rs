use chrono::{Datelike, NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::models::{CreateGoalDto, Goal, GoalWithTotals, UpdateGoalDto};
use crate::errors::AppError;
use crate::recurrence::month_bounds;
use crate::store::{AtomicUnit, Store};
use crate::transaction::models::TransactionType;

/// Service layer for monthly goals.
pub struct GoalService;

impl GoalService {
    /// Create a goal. A user has at most one goal per type and month.
    pub async fn create_goal(
        store: &dyn Store,
        user_id: Uuid,
        dto: CreateGoalDto,
    ) -> Result<Goal, AppError> {
        dto.validate()?;

        let name = dto.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::ValidationError(
                "Name cannot be empty".to_string(),
            ));
        }

        let mut unit = store.begin().await?;
        Self::ensure_month_free(unit.as_mut(), user_id, dto.transaction_type, dto.date, None)
            .await?;

        let now = Utc::now();
        let goal = Goal {
            id: Uuid::new_v4(),
            user_id,
            name,
            date: dto.date,
            transaction_type: dto.transaction_type.as_str().to_string(),
            value: dto.value,
            created_at: now,
            updated_at: now,
        };
        unit.insert_goal(&goal).await?;
        unit.commit().await?;

        info!(goal_id = %goal.id, %user_id, "goal created");
        Ok(goal)
    }

    /// Update a goal (partial update - PATCH semantics).
    pub async fn update_goal(
        store: &dyn Store,
        user_id: Uuid,
        goal_id: Uuid,
        dto: UpdateGoalDto,
    ) -> Result<Goal, AppError> {
        dto.validate()?;
        dto.validate_value()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        let mut unit = store.begin().await?;
        let mut goal = unit
            .lock_goal(goal_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Goal not found".to_string()))?;

        if let Some(name) = &dto.name {
            let trimmed = name.trim().to_string();
            if trimmed.is_empty() {
                return Err(AppError::ValidationError(
                    "Name cannot be empty".to_string(),
                ));
            }
            goal.name = trimmed;
        }
        if let Some(value) = dto.value {
            goal.value = value;
        }

        let old_type = goal.get_type()?;
        let new_type = dto.transaction_type.unwrap_or(old_type);
        let new_date = dto.date.unwrap_or(goal.date);
        let moved = new_type != old_type
            || new_date.year() != goal.year()
            || new_date.month() != goal.month();
        if moved {
            Self::ensure_month_free(unit.as_mut(), user_id, new_type, new_date, Some(goal.id))
                .await?;
        }
        goal.transaction_type = new_type.as_str().to_string();
        goal.date = new_date;
        goal.updated_at = Utc::now();

        unit.update_goal(&goal).await?;
        unit.commit().await?;

        Ok(goal)
    }

    pub async fn delete_goal(
        store: &dyn Store,
        user_id: Uuid,
        goal_id: Uuid,
    ) -> Result<(), AppError> {
        let mut unit = store.begin().await?;
        unit.lock_goal(goal_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Goal not found".to_string()))?;
        unit.delete_goal(goal_id).await?;
        unit.commit().await?;

        info!(%goal_id, %user_id, "goal deleted");
        Ok(())
    }

    /// Get a goal together with the actual total of its month.
    pub async fn get_goal(
        store: &dyn Store,
        user_id: Uuid,
        goal_id: Uuid,
    ) -> Result<GoalWithTotals, AppError> {
        let goal = store
            .get_goal(goal_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Goal not found".to_string()))?;
        Self::with_totals(store, goal).await
    }

    pub async fn list_goals(store: &dyn Store, user_id: Uuid) -> Result<Vec<Goal>, AppError> {
        store.list_goals(user_id).await
    }

    /// Goals of one calendar month, each with its actual total.
    pub async fn goals_by_user_and_month(
        store: &dyn Store,
        user_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<GoalWithTotals>, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::ValidationError(format!(
                "Month must be between 1 and 12, got {month}"
            )));
        }

        let goals = store.goals_by_user_and_month(user_id, year, month).await?;
        let mut result = Vec::with_capacity(goals.len());
        for goal in goals {
            result.push(Self::with_totals(store, goal).await?);
        }
        Ok(result)
    }

    /// Sum of the goal type's transactions released in the goal's month.
    async fn with_totals(store: &dyn Store, goal: Goal) -> Result<GoalWithTotals, AppError> {
        let (first, last) = month_bounds(goal.date);
        let total = store
            .sum_transactions(goal.user_id, goal.get_type()?, first, last)
            .await?;
        GoalWithTotals::new(goal, total)
    }

    async fn ensure_month_free(
        unit: &mut dyn AtomicUnit,
        user_id: Uuid,
        transaction_type: TransactionType,
        date: NaiveDate,
        except: Option<Uuid>,
    ) -> Result<(), AppError> {
        let taken = unit
            .goals_in_month(user_id, transaction_type, date.year(), date.month())
            .await?
            .into_iter()
            .any(|g| Some(g.id) != except);

        if taken {
            return Err(AppError::Conflict(format!(
                "A {} goal already exists for {}/{}",
                transaction_type.as_str(),
                date.month(),
                date.year()
            )));
        }
        Ok(())
    }
}
