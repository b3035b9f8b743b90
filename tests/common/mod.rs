#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use ledger_engine::account::models::{Account, CreateAccountDto};
use ledger_engine::account::AccountService;
use ledger_engine::config::SchedulerConfig;
use ledger_engine::money::Money;
use ledger_engine::recurrence::RecurrenceRule;
use ledger_engine::scheduler::RecurrenceScheduler;
use ledger_engine::store::{MemoryStore, Store};
use ledger_engine::transaction::models::{CreateTransactionDto, TransactionType};
use ledger_engine::transfer::models::CreateTransferDto;

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub user_id: Uuid,
    pub payment_method_id: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        TestApp {
            store: Arc::new(MemoryStore::new()),
            user_id: Uuid::new_v4(),
            payment_method_id: Uuid::new_v4(),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn scheduler(&self) -> RecurrenceScheduler {
        self.scheduler_with(SchedulerConfig::default())
    }

    pub fn scheduler_with(&self, config: SchedulerConfig) -> RecurrenceScheduler {
        RecurrenceScheduler::new(self.store.clone(), config)
    }

    pub async fn account(&self, name: &str) -> Account {
        AccountService::create_account(
            self.store(),
            self.user_id,
            &CreateAccountDto {
                name: name.to_string(),
            },
        )
        .await
        .expect("Should create account")
    }

    pub async fn balance(&self, account_id: Uuid) -> Money {
        AccountService::get_account(self.store(), account_id, self.user_id)
            .await
            .expect("Should load account")
            .balance
    }

    /// Balance recomputed from every transaction and transfer; must always
    /// equal the cached balance.
    pub async fn assert_consistent(&self, account_id: Uuid) {
        let result = AccountService::recalculate_balance(self.store(), account_id, self.user_id)
            .await
            .expect("Should recalculate balance");
        assert_eq!(
            result.previous_balance, result.recalculated_balance,
            "cached balance drifted from the recorded history"
        );
    }

    pub fn transaction(
        &self,
        transaction_type: TransactionType,
        value: &str,
        release_date: NaiveDate,
        account_id: Option<Uuid>,
    ) -> CreateTransactionDto {
        CreateTransactionDto {
            name: "Groceries".to_string(),
            category: None,
            transaction_type,
            value: money(value),
            release_date,
            number_installments: None,
            account_id,
            payment_method_id: self.payment_method_id,
            recurring: false,
            recurring_type: None,
        }
    }

    pub fn expense(&self, value: &str, release_date: NaiveDate, account_id: Uuid) -> CreateTransactionDto {
        self.transaction(TransactionType::Expense, value, release_date, Some(account_id))
    }

    pub fn income(&self, value: &str, release_date: NaiveDate, account_id: Uuid) -> CreateTransactionDto {
        self.transaction(TransactionType::Income, value, release_date, Some(account_id))
    }

    pub fn recurring(
        &self,
        dto: CreateTransactionDto,
        rule: RecurrenceRule,
    ) -> CreateTransactionDto {
        CreateTransactionDto {
            recurring: true,
            recurring_type: Some(rule),
            ..dto
        }
    }

    pub fn installments(&self, dto: CreateTransactionDto, count: i32) -> CreateTransactionDto {
        CreateTransactionDto {
            number_installments: Some(count),
            ..dto
        }
    }

    pub fn transfer(
        &self,
        source: Uuid,
        destination: Uuid,
        amount: &str,
        transfer_date: NaiveDate,
    ) -> CreateTransferDto {
        CreateTransferDto {
            source_account_id: source,
            destination_account_id: destination,
            payment_method_id: self.payment_method_id,
            amount: money(amount),
            transfer_date,
            description: None,
        }
    }
}

pub fn money(value: &str) -> Money {
    value.parse().expect("Should parse money")
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("Should be a valid date")
}
