use ledger_engine::account::AccountService;
use ledger_engine::errors::AppError;
use ledger_engine::money::Money;
use ledger_engine::recurrence::RecurrenceRule;
use ledger_engine::store::Store;
use ledger_engine::transaction::models::{Transaction, UpdateTransactionDto};
use ledger_engine::transaction::TransactionService;
use ledger_engine::transfer::models::UpdateTransferDto;
use ledger_engine::transfer::TransferService;

mod common;
use common::{date, money, TestApp};

#[tokio::test]
async fn test_wallet_account_starts_empty() {
    let app = TestApp::new();

    let wallet = AccountService::create_wallet_account(app.store(), app.user_id)
        .await
        .expect("Should create wallet");

    assert_eq!(wallet.name, "Wallet");
    assert_eq!(wallet.balance, Money::ZERO);
    assert!(wallet.active);
    let accounts = AccountService::list_accounts(app.store(), app.user_id)
        .await
        .unwrap();
    assert_eq!(accounts.len(), 1);
}

#[tokio::test]
async fn test_balance_matches_history_after_mixed_operations() {
    let app = TestApp::new();
    let checking = app.account("Checking").await;
    let savings = app.account("Savings").await;
    let card = app.account("Card").await;

    let salary = TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.recurring(
            app.income("2000.00", date(2025, 1, 1), checking.id),
            RecurrenceRule::Monthly,
        ),
    )
    .await
    .unwrap();
    let rent = TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.expense("750.00", date(2025, 1, 3), checking.id),
    )
    .await
    .unwrap();
    TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.installments(app.expense("299.99", date(2025, 1, 20), card.id), 7),
    )
    .await
    .unwrap();
    let transfer = TransferService::create_transfer(
        app.store(),
        app.user_id,
        app.transfer(checking.id, savings.id, "500.00", date(2025, 1, 10)),
    )
    .await
    .unwrap();

    let scheduler = app.scheduler();
    scheduler
        .process_recurring_transactions_on(date(2025, 4, 15))
        .await;
    scheduler
        .process_installment_transactions_on(date(2025, 4, 15))
        .await;

    TransactionService::update_transaction(
        app.store(),
        app.user_id,
        rent.transaction.id,
        UpdateTransactionDto {
            value: Some(money("775.50")),
            account_id: Some(Some(savings.id)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    TransferService::update_transfer(
        app.store(),
        app.user_id,
        transfer.id,
        UpdateTransferDto {
            amount: Some(money("650.00")),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    TransactionService::delete_transaction(app.store(), app.user_id, salary.transaction.id)
        .await
        .unwrap();

    // Salary Feb..Apr remain after the template is deleted
    assert_eq!(app.balance(checking.id).await, money("5350.00"));
    assert_eq!(app.balance(savings.id).await, money("-125.50"));
    // 299.99 / 7 = 42.85 per installment, three of them due by April 15
    assert_eq!(app.balance(card.id).await, money("-128.55"));

    for account in [checking.id, savings.id, card.id] {
        app.assert_consistent(account).await;
    }
}

#[tokio::test]
async fn test_recalculate_repairs_drift() {
    let app = TestApp::new();
    let account = app.account("Checking").await;
    TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.income("100.00", date(2025, 1, 1), account.id),
    )
    .await
    .unwrap();

    // Corrupt the cached balance behind the ledger's back
    let mut unit = app.store().begin().await.unwrap();
    unit.set_balance(account.id, money("123.45")).await.unwrap();
    unit.commit().await.unwrap();

    let result = AccountService::recalculate_balance(app.store(), account.id, app.user_id)
        .await
        .expect("Should recalculate");

    assert_eq!(result.previous_balance, money("123.45"));
    assert_eq!(result.recalculated_balance, money("100.00"));
    assert_eq!(result.drift(), money("-23.45"));
    assert_eq!(app.balance(account.id).await, money("100.00"));
}

#[tokio::test]
async fn test_recalculate_refuses_unknown_transaction_type() {
    let app = TestApp::new();
    let account = app.account("Checking").await;
    let created = TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.expense("10.00", date(2025, 1, 1), account.id),
    )
    .await
    .unwrap()
    .transaction;

    let mut unit = app.store().begin().await.unwrap();
    unit.update_transaction(&Transaction {
        transaction_type: "refund".to_string(),
        ..created
    })
    .await
    .unwrap();
    unit.commit().await.unwrap();

    let err = AccountService::recalculate_balance(app.store(), account.id, app.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InternalError(_)));
    // Nothing was overwritten
    assert_eq!(app.balance(account.id).await, money("-10.00"));
}
