use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::models::{BankTransfer, CreateTransferDto, UpdateTransferDto};
use crate::account::ledger::Ledger;
use crate::account::models::Account;
use crate::errors::AppError;
use crate::models::{Page, PageQuery};
use crate::store::{AtomicUnit, Store};

/// Service layer for transfers between two accounts of the same user.
/// CRITICAL: the debit, the credit and the row write always share one unit.
pub struct TransferService;

impl TransferService {
    pub async fn create_transfer(
        store: &dyn Store,
        user_id: Uuid,
        dto: CreateTransferDto,
    ) -> Result<BankTransfer, AppError> {
        dto.validate()?;

        if dto.source_account_id == dto.destination_account_id {
            return Err(AppError::InvalidOperation(
                "Source and destination accounts must be different".to_string(),
            ));
        }

        let mut unit = store.begin().await?;

        // 1. Lock both accounts in a stable order
        let (source, destination) = Self::lock_pair(
            unit.as_mut(),
            user_id,
            dto.source_account_id,
            dto.destination_account_id,
        )
        .await?;

        for account in [&source, &destination] {
            if !account.active {
                return Err(AppError::InvalidOperation(format!(
                    "Account {} is inactive",
                    account.id
                )));
            }
        }

        // 2. Check funds before touching any balance
        if dto.amount > source.balance {
            return Err(AppError::InsufficientFunds(format!(
                "Account {} has {} available, transfer needs {}",
                source.id, source.balance, dto.amount
            )));
        }

        // 3. Move the money
        Ledger::debit(unit.as_mut(), source.id, user_id, dto.amount).await?;
        Ledger::credit(unit.as_mut(), destination.id, user_id, dto.amount).await?;

        // 4. Record the transfer
        let now = Utc::now();
        let transfer = BankTransfer {
            id: Uuid::new_v4(),
            user_id,
            source_account_id: source.id,
            destination_account_id: destination.id,
            payment_method_id: dto.payment_method_id,
            amount: dto.amount,
            transfer_date: dto.transfer_date,
            description: dto.description,
            created_at: now,
            updated_at: now,
        };
        unit.insert_transfer(&transfer).await?;
        unit.commit().await?;

        info!(
            transfer_id = %transfer.id,
            %user_id,
            amount = %transfer.amount,
            "transfer created"
        );
        Ok(transfer)
    }

    /// Update a transfer. A changed amount moves only the difference:
    /// the source gives up `new - old` and the destination receives it.
    pub async fn update_transfer(
        store: &dyn Store,
        user_id: Uuid,
        transfer_id: Uuid,
        dto: UpdateTransferDto,
    ) -> Result<BankTransfer, AppError> {
        dto.validate()?;
        dto.validate_amount()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        let mut unit = store.begin().await?;
        let mut transfer = Self::lock_transfer(unit.as_mut(), user_id, transfer_id).await?;

        if let Some(amount) = dto.amount {
            let delta = amount - transfer.amount;
            if !delta.is_zero() {
                let (source, destination) = Self::lock_pair(
                    unit.as_mut(),
                    user_id,
                    transfer.source_account_id,
                    transfer.destination_account_id,
                )
                .await?;

                if delta.is_positive() && delta > source.balance {
                    return Err(AppError::InsufficientFunds(format!(
                        "Account {} has {} available, transfer increase needs {}",
                        source.id, source.balance, delta
                    )));
                }

                Ledger::apply(unit.as_mut(), source.id, user_id, -delta).await?;
                Ledger::apply(unit.as_mut(), destination.id, user_id, delta).await?;
            }
            transfer.amount = amount;
        }
        if let Some(transfer_date) = dto.transfer_date {
            transfer.transfer_date = transfer_date;
        }
        if let Some(payment_method_id) = dto.payment_method_id {
            transfer.payment_method_id = payment_method_id;
        }
        if let Some(description) = dto.description {
            transfer.description = description;
        }
        transfer.updated_at = Utc::now();

        unit.update_transfer(&transfer).await?;
        unit.commit().await?;

        info!(%transfer_id, %user_id, "transfer updated");
        Ok(transfer)
    }

    /// Delete a transfer, giving the amount back to the source account.
    pub async fn delete_transfer(
        store: &dyn Store,
        user_id: Uuid,
        transfer_id: Uuid,
    ) -> Result<(), AppError> {
        let mut unit = store.begin().await?;
        let transfer = Self::lock_transfer(unit.as_mut(), user_id, transfer_id).await?;

        let (source, destination) = Self::lock_pair(
            unit.as_mut(),
            user_id,
            transfer.source_account_id,
            transfer.destination_account_id,
        )
        .await?;

        Ledger::credit(unit.as_mut(), source.id, user_id, transfer.amount).await?;
        Ledger::debit(unit.as_mut(), destination.id, user_id, transfer.amount).await?;

        unit.delete_transfer(transfer_id).await?;
        unit.commit().await?;

        info!(%transfer_id, %user_id, "transfer deleted");
        Ok(())
    }

    pub async fn get_transfer(
        store: &dyn Store,
        user_id: Uuid,
        transfer_id: Uuid,
    ) -> Result<BankTransfer, AppError> {
        store
            .get_transfer(transfer_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer not found".to_string()))
    }

    /// List transfers, newest first
    pub async fn list_transfers(
        store: &dyn Store,
        user_id: Uuid,
        query: &PageQuery,
    ) -> Result<Page<BankTransfer>, AppError> {
        query.validate()?;

        let (data, total) = store.list_transfers(user_id, query).await?;
        Ok(Page {
            data,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    /// Lock a stored transfer. Rows whose source equals their destination
    /// are refused instead of being applied twice to the same account.
    async fn lock_transfer(
        unit: &mut dyn AtomicUnit,
        user_id: Uuid,
        transfer_id: Uuid,
    ) -> Result<BankTransfer, AppError> {
        let transfer = unit
            .lock_transfer(transfer_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer not found".to_string()))?;

        if transfer.source_account_id == transfer.destination_account_id {
            warn!(
                %transfer_id,
                account_id = %transfer.source_account_id,
                "refusing to modify transfer with identical source and destination"
            );
            return Err(AppError::InvalidOperation(
                "Transfer has the same source and destination account".to_string(),
            ));
        }
        Ok(transfer)
    }

    /// Lock source and destination in ascending id order and return them as
    /// `(source, destination)`.
    async fn lock_pair(
        unit: &mut dyn AtomicUnit,
        user_id: Uuid,
        source_id: Uuid,
        destination_id: Uuid,
    ) -> Result<(Account, Account), AppError> {
        let locked = Ledger::lock_in_order(unit, user_id, &[source_id, destination_id]).await?;

        let find = |id: Uuid| locked.iter().find(|a| a.id == id).cloned();
        let source = find(source_id).ok_or_else(|| {
            AppError::NotFound(format!("Source account {source_id} not found"))
        })?;
        let destination = find(destination_id).ok_or_else(|| {
            AppError::NotFound(format!("Destination account {destination_id} not found"))
        })?;
        Ok((source, destination))
    }
}
