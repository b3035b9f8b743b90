use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use tracing::error;
use uuid::Uuid;

use super::{AtomicUnit, Store};
use crate::account::models::Account;
use crate::config::DatabaseConfig;
use crate::errors::AppError;
use crate::goal::models::Goal;
use crate::models::PageQuery;
use crate::money::Money;
use crate::recurrence::month_bounds;
use crate::transaction::models::{Transaction, TransactionFilters, TransactionType};
use crate::transfer::models::BankTransfer;

const ACCOUNT_COLUMNS: &str = "id, owner_id, name, balance, active, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, account_id, payment_method_id, name, category, \
     transaction_type, value, value_installment, last_installment_value, release_date, \
     number_installments, current_installment, recurring, recurring_type, template_id, \
     created_at, updated_at";

const TRANSFER_COLUMNS: &str = "id, user_id, source_account_id, destination_account_id, \
     payment_method_id, amount, transfer_date, description, created_at, updated_at";

const GOAL_COLUMNS: &str = "id, user_id, name, date, transaction_type, value, created_at, updated_at";

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Configure connection pool with production-ready settings
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to create pool: {e}")))?;
        Ok(Self::new(pool))
    }
}

/// Atomic unit backed by a database transaction.
pub struct PgUnit {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn internal(e: sqlx::Error) -> AppError {
    AppError::InternalError(e.to_string())
}

/// First and last day of a calendar month.
fn month_range(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), AppError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(month_bounds)
        .ok_or_else(|| AppError::ValidationError(format!("Invalid month {year}-{month}")))
}

fn ensure_affected(rows: u64, what: &str, id: Uuid) -> Result<(), AppError> {
    if rows == 0 {
        return Err(AppError::NotFound(format!("{what} {id} not found")));
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn AtomicUnit>, AppError> {
        let tx = self.pool.begin().await.map_err(internal)?;
        Ok(Box::new(PgUnit { tx }))
    }

    async fn get_account(
        &self,
        account_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND owner_id = $2"
        ))
        .bind(account_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)
    }

    async fn list_accounts(&self, owner_id: Uuid) -> Result<Vec<Account>, AppError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)
    }

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 AND user_id = $2"
        ))
        .bind(transaction_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filters: &TransactionFilters,
    ) -> Result<(Vec<Transaction>, i64), AppError> {
        let transaction_type = filters.transaction_type.map(|t| t.as_str());

        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE user_id = $1
              AND ($2::date IS NULL OR release_date >= $2)
              AND ($3::date IS NULL OR release_date <= $3)
              AND ($4::uuid IS NULL OR account_id = $4)
              AND ($5::text IS NULL OR transaction_type = $5)
              AND ($6::bool IS NULL OR recurring = $6)
            ORDER BY release_date DESC, created_at DESC
            LIMIT $7 OFFSET $8
            "#
        ))
        .bind(user_id)
        .bind(filters.start_date)
        .bind(filters.end_date)
        .bind(filters.account_id)
        .bind(transaction_type)
        .bind(filters.recurring)
        .bind(filters.limit)
        .bind(filters.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM transactions
            WHERE user_id = $1
              AND ($2::date IS NULL OR release_date >= $2)
              AND ($3::date IS NULL OR release_date <= $3)
              AND ($4::uuid IS NULL OR account_id = $4)
              AND ($5::text IS NULL OR transaction_type = $5)
              AND ($6::bool IS NULL OR recurring = $6)
            "#,
        )
        .bind(user_id)
        .bind(filters.start_date)
        .bind(filters.end_date)
        .bind(filters.account_id)
        .bind(transaction_type)
        .bind(filters.recurring)
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;

        Ok((transactions, total))
    }

    async fn recurring_templates(&self) -> Result<Vec<Transaction>, AppError> {
        sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE template_id IS NULL AND recurring AND recurring_type IS NOT NULL
            ORDER BY created_at ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(internal)
    }

    async fn installment_templates_in_progress(&self) -> Result<Vec<Transaction>, AppError> {
        sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE template_id IS NULL
              AND number_installments > 1
              AND COALESCE(current_installment, 1) < number_installments
            ORDER BY created_at ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(internal)
    }

    async fn sum_transactions(
        &self,
        user_id: Uuid,
        transaction_type: TransactionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Money, AppError> {
        let total = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(COALESCE(value_installment, value)), 0)
            FROM transactions
            WHERE user_id = $1 AND transaction_type = $2
              AND release_date >= $3 AND release_date <= $4
            "#,
        )
        .bind(user_id)
        .bind(transaction_type.as_str())
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        Ok(Money::new(total))
    }

    async fn get_transfer(
        &self,
        transfer_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BankTransfer>, AppError> {
        sqlx::query_as::<_, BankTransfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM bank_transfers WHERE id = $1 AND user_id = $2"
        ))
        .bind(transfer_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)
    }

    async fn list_transfers(
        &self,
        user_id: Uuid,
        query: &PageQuery,
    ) -> Result<(Vec<BankTransfer>, i64), AppError> {
        let transfers = sqlx::query_as::<_, BankTransfer>(&format!(
            r#"
            SELECT {TRANSFER_COLUMNS}
            FROM bank_transfers
            WHERE user_id = $1
            ORDER BY transfer_date DESC, created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(query.limit)
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bank_transfers WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(internal)?;

        Ok((transfers, total))
    }

    async fn get_goal(&self, goal_id: Uuid, user_id: Uuid) -> Result<Option<Goal>, AppError> {
        sqlx::query_as::<_, Goal>(&format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE id = $1 AND user_id = $2"
        ))
        .bind(goal_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)
    }

    async fn list_goals(&self, user_id: Uuid) -> Result<Vec<Goal>, AppError> {
        sqlx::query_as::<_, Goal>(&format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = $1 ORDER BY date DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)
    }

    async fn goals_by_user_and_month(
        &self,
        user_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<Goal>, AppError> {
        let (first, last) = month_range(year, month)?;
        sqlx::query_as::<_, Goal>(&format!(
            r#"
            SELECT {GOAL_COLUMNS} FROM goals
            WHERE user_id = $1 AND date >= $2 AND date <= $3
            ORDER BY transaction_type ASC
            "#
        ))
        .bind(user_id)
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)
    }
}

#[async_trait]
impl AtomicUnit for PgUnit {
    async fn lock_account(
        &mut self,
        account_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND owner_id = $2 FOR UPDATE"
        ))
        .bind(account_id)
        .bind(owner_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(internal)
    }

    async fn set_balance(&mut self, account_id: Uuid, balance: Money) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE accounts SET balance = $1, updated_at = NOW() WHERE id = $2")
                .bind(balance)
                .bind(account_id)
                .execute(&mut *self.tx)
                .await
                .map_err(internal)?;
        ensure_affected(result.rows_affected(), "Account", account_id)
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, owner_id, name, balance, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(account.id)
        .bind(account.owner_id)
        .bind(&account.name)
        .bind(account.balance)
        .bind(account.active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE accounts SET name = $2, active = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(account.active)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        ensure_affected(result.rows_affected(), "Account", account.id)
    }

    async fn delete_account(&mut self, account_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(account_id)
            .execute(&mut *self.tx)
            .await
            .map_err(internal)?;
        ensure_affected(result.rows_affected(), "Account", account_id)
    }

    async fn account_is_referenced(&mut self, account_id: Uuid) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM transactions WHERE account_id = $1)
                OR EXISTS(
                    SELECT 1 FROM bank_transfers
                    WHERE source_account_id = $1 OR destination_account_id = $1
                )
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(internal)
    }

    async fn derived_balance(&mut self, account_id: Uuid) -> Result<Money, AppError> {
        let unknown = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM transactions
            WHERE account_id = $1 AND transaction_type NOT IN ('expense', 'income')
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(internal)?;
        if unknown > 0 {
            error!(%account_id, rows = unknown, "unknown transaction type stored");
            return Err(AppError::InternalError(format!(
                "Account {account_id} has transactions of unknown type"
            )));
        }

        let balance = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT
                COALESCE((
                    SELECT SUM(CASE WHEN transaction_type = 'income'
                                    THEN COALESCE(value_installment, value)
                                    ELSE -COALESCE(value_installment, value) END)
                    FROM transactions WHERE account_id = $1
                ), 0)
                + COALESCE((
                    SELECT SUM(amount) FROM bank_transfers
                    WHERE destination_account_id = $1
                      AND source_account_id <> destination_account_id
                ), 0)
                - COALESCE((
                    SELECT SUM(amount) FROM bank_transfers
                    WHERE source_account_id = $1
                      AND source_account_id <> destination_account_id
                ), 0)
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(internal)?;
        Ok(Money::new(balance))
    }

    async fn lock_transaction(
        &mut self,
        transaction_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(transaction_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(internal)
    }

    async fn insert_transaction(&mut self, t: &Transaction) -> Result<(), AppError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO transactions ({TRANSACTION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#
        ))
        .bind(t.id)
        .bind(t.user_id)
        .bind(t.account_id)
        .bind(t.payment_method_id)
        .bind(&t.name)
        .bind(&t.category)
        .bind(&t.transaction_type)
        .bind(t.value)
        .bind(t.value_installment)
        .bind(t.last_installment_value)
        .bind(t.release_date)
        .bind(t.number_installments)
        .bind(t.current_installment)
        .bind(t.recurring)
        .bind(&t.recurring_type)
        .bind(t.template_id)
        .bind(t.created_at)
        .bind(t.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn update_transaction(&mut self, t: &Transaction) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                account_id = $2,
                payment_method_id = $3,
                name = $4,
                category = $5,
                transaction_type = $6,
                value = $7,
                value_installment = $8,
                last_installment_value = $9,
                release_date = $10,
                number_installments = $11,
                current_installment = $12,
                recurring = $13,
                recurring_type = $14,
                updated_at = $15
            WHERE id = $1
            "#,
        )
        .bind(t.id)
        .bind(t.account_id)
        .bind(t.payment_method_id)
        .bind(&t.name)
        .bind(&t.category)
        .bind(&t.transaction_type)
        .bind(t.value)
        .bind(t.value_installment)
        .bind(t.last_installment_value)
        .bind(t.release_date)
        .bind(t.number_installments)
        .bind(t.current_installment)
        .bind(t.recurring)
        .bind(&t.recurring_type)
        .bind(t.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        ensure_affected(result.rows_affected(), "Transaction", t.id)
    }

    async fn delete_transaction(&mut self, transaction_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = $1")
            .bind(transaction_id)
            .execute(&mut *self.tx)
            .await
            .map_err(internal)?;
        ensure_affected(result.rows_affected(), "Transaction", transaction_id)
    }

    async fn occurrence_exists_on(
        &mut self,
        template_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE template_id = $1 AND release_date = $2)",
        )
        .bind(template_id)
        .bind(date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(internal)
    }

    async fn installment_exists(
        &mut self,
        template_id: Uuid,
        installment: i32,
    ) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM transactions
                WHERE template_id = $1 AND current_installment = $2
            )
            "#,
        )
        .bind(template_id)
        .bind(installment)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(internal)
    }

    async fn latest_occurrence_date(
        &mut self,
        template_id: Uuid,
    ) -> Result<Option<NaiveDate>, AppError> {
        sqlx::query_scalar::<_, Option<NaiveDate>>(
            "SELECT MAX(release_date) FROM transactions WHERE template_id = $1",
        )
        .bind(template_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(internal)
    }

    async fn lock_transfer(
        &mut self,
        transfer_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BankTransfer>, AppError> {
        sqlx::query_as::<_, BankTransfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM bank_transfers WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(transfer_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(internal)
    }

    async fn insert_transfer(&mut self, t: &BankTransfer) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO bank_transfers ({TRANSFER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(t.id)
        .bind(t.user_id)
        .bind(t.source_account_id)
        .bind(t.destination_account_id)
        .bind(t.payment_method_id)
        .bind(t.amount)
        .bind(t.transfer_date)
        .bind(&t.description)
        .bind(t.created_at)
        .bind(t.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn update_transfer(&mut self, t: &BankTransfer) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE bank_transfers SET
                payment_method_id = $2,
                amount = $3,
                transfer_date = $4,
                description = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(t.id)
        .bind(t.payment_method_id)
        .bind(t.amount)
        .bind(t.transfer_date)
        .bind(&t.description)
        .bind(t.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        ensure_affected(result.rows_affected(), "Transfer", t.id)
    }

    async fn delete_transfer(&mut self, transfer_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM bank_transfers WHERE id = $1")
            .bind(transfer_id)
            .execute(&mut *self.tx)
            .await
            .map_err(internal)?;
        ensure_affected(result.rows_affected(), "Transfer", transfer_id)
    }

    async fn lock_goal(&mut self, goal_id: Uuid, user_id: Uuid) -> Result<Option<Goal>, AppError> {
        sqlx::query_as::<_, Goal>(&format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(goal_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(internal)
    }

    async fn goals_in_month(
        &mut self,
        user_id: Uuid,
        transaction_type: TransactionType,
        year: i32,
        month: u32,
    ) -> Result<Vec<Goal>, AppError> {
        // Row locks cannot cover goals that do not exist yet; serialize goal
        // writes per user with a transaction-scoped advisory lock instead.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(user_id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(internal)?;

        let (first, last) = month_range(year, month)?;
        sqlx::query_as::<_, Goal>(&format!(
            r#"
            SELECT {GOAL_COLUMNS} FROM goals
            WHERE user_id = $1 AND transaction_type = $2 AND date >= $3 AND date <= $4
            "#
        ))
        .bind(user_id)
        .bind(transaction_type.as_str())
        .bind(first)
        .bind(last)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(internal)
    }

    async fn insert_goal(&mut self, g: &Goal) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO goals ({GOAL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(g.id)
        .bind(g.user_id)
        .bind(&g.name)
        .bind(g.date)
        .bind(&g.transaction_type)
        .bind(g.value)
        .bind(g.created_at)
        .bind(g.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn update_goal(&mut self, g: &Goal) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE goals
            SET name = $2, date = $3, transaction_type = $4, value = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(g.id)
        .bind(&g.name)
        .bind(g.date)
        .bind(&g.transaction_type)
        .bind(g.value)
        .bind(g.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(internal)?;
        ensure_affected(result.rows_affected(), "Goal", g.id)
    }

    async fn delete_goal(&mut self, goal_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM goals WHERE id = $1")
            .bind(goal_id)
            .execute(&mut *self.tx)
            .await
            .map_err(internal)?;
        ensure_affected(result.rows_affected(), "Goal", goal_id)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await.map_err(internal)
    }
}
