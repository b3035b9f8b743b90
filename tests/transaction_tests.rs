use ledger_engine::account::models::UpdateAccountDto;
use ledger_engine::account::AccountService;
use ledger_engine::errors::AppError;
use ledger_engine::recurrence::RecurrenceRule;
use ledger_engine::transaction::models::{TransactionFilters, TransactionType, UpdateTransactionDto};
use ledger_engine::transaction::TransactionService;
use uuid::Uuid;

mod common;
use common::{date, money, TestApp};

#[tokio::test]
async fn test_expense_decreases_and_income_increases_balance() {
    let app = TestApp::new();
    let account = app.account("Checking").await;

    TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.income("1500.00", date(2025, 3, 1), account.id),
    )
    .await
    .expect("Should create income");
    TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.expense("42.17", date(2025, 3, 2), account.id),
    )
    .await
    .expect("Should create expense");

    assert_eq!(app.balance(account.id).await, money("1457.83"));
    app.assert_consistent(account.id).await;
}

#[tokio::test]
async fn test_expense_may_overdraw_account() {
    let app = TestApp::new();
    let account = app.account("Card").await;

    TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.expense("10.00", date(2025, 3, 1), account.id),
    )
    .await
    .expect("Expenses are not limited by the balance");

    assert_eq!(app.balance(account.id).await, money("-10.00"));
}

#[tokio::test]
async fn test_transaction_without_account_touches_no_balance() {
    let app = TestApp::new();
    let account = app.account("Checking").await;

    let created = TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.transaction(TransactionType::Expense, "12.00", date(2025, 3, 1), None),
    )
    .await
    .expect("Should create transaction");

    assert_eq!(created.transaction.account_id, None);
    assert!(created.installment_preview.is_empty());
    assert_eq!(app.balance(account.id).await, money("0.00"));
}

#[tokio::test]
async fn test_create_on_foreign_account_is_not_found() {
    let app = TestApp::new();
    let other = TestApp::new();
    let foreign = other.account("Theirs").await;

    // Same store, different owner
    let dto = app.expense("5.00", date(2025, 3, 1), foreign.id);
    let err = TransactionService::create_transaction(other.store(), app.user_id, dto)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(other.balance(foreign.id).await, money("0.00"));
}

#[tokio::test]
async fn test_create_on_inactive_account_is_rejected() {
    let app = TestApp::new();
    let account = app.account("Old card").await;
    AccountService::update_account(
        app.store(),
        account.id,
        app.user_id,
        &UpdateAccountDto {
            name: None,
            active: Some(false),
        },
    )
    .await
    .expect("Should deactivate account");

    let err = TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.expense("5.00", date(2025, 3, 1), account.id),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_non_positive_value_is_validation_error() {
    let app = TestApp::new();
    let account = app.account("Checking").await;

    for value in ["0.00", "-3.00", "1.001"] {
        let err = TransactionService::create_transaction(
            app.store(),
            app.user_id,
            app.expense(value, date(2025, 3, 1), account.id),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)), "value {value}");
    }
}

#[tokio::test]
async fn test_installment_split_posts_first_installment() {
    let app = TestApp::new();
    let account = app.account("Card").await;

    let dto = app.installments(app.expense("100.00", date(2025, 1, 15), account.id), 3);
    let created = TransactionService::create_transaction(app.store(), app.user_id, dto)
        .await
        .expect("Should create installment purchase");

    let template = &created.transaction;
    assert_eq!(template.value, money("100.00"));
    assert_eq!(template.value_installment, Some(money("33.33")));
    assert_eq!(template.last_installment_value, Some(money("33.34")));
    assert_eq!(template.current_installment, Some(1));

    let preview: Vec<_> = created.installment_preview.iter().map(|p| p.value).collect();
    assert_eq!(preview, vec![money("33.33"), money("33.33"), money("33.34")]);
    assert_eq!(preview.iter().sum::<ledger_engine::money::Money>(), money("100.00"));

    assert_eq!(app.balance(account.id).await, money("-33.33"));
    app.assert_consistent(account.id).await;
}

#[tokio::test]
async fn test_installment_below_one_cent_is_rejected() {
    let app = TestApp::new();
    let account = app.account("Card").await;

    let dto = app.installments(app.expense("0.02", date(2025, 1, 15), account.id), 3);
    let err = TransactionService::create_transaction(app.store(), app.user_id, dto)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidOperation(_)));
    assert_eq!(app.balance(account.id).await, money("0.00"));
}

#[tokio::test]
async fn test_recurring_requires_type() {
    let app = TestApp::new();
    let account = app.account("Checking").await;

    let mut dto = app.expense("9.99", date(2025, 1, 1), account.id);
    dto.recurring = true;
    let err = TransactionService::create_transaction(app.store(), app.user_id, dto)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_recurring_installments_are_mutually_exclusive() {
    let app = TestApp::new();
    let account = app.account("Checking").await;

    let dto = app.installments(
        app.recurring(
            app.expense("90.00", date(2025, 1, 1), account.id),
            RecurrenceRule::Monthly,
        ),
        3,
    );
    let err = TransactionService::create_transaction(app.store(), app.user_id, dto)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidOperation(_)));
    assert_eq!(app.balance(account.id).await, money("0.00"));
}

#[tokio::test]
async fn test_update_value_applies_net_delta() {
    let app = TestApp::new();
    let account = app.account("Checking").await;

    let created = TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.expense("50.00", date(2025, 3, 1), account.id),
    )
    .await
    .unwrap();

    TransactionService::update_transaction(
        app.store(),
        app.user_id,
        created.transaction.id,
        UpdateTransactionDto {
            value: Some(money("80.00")),
            ..Default::default()
        },
    )
    .await
    .expect("Should update value");
    assert_eq!(app.balance(account.id).await, money("-80.00"));

    TransactionService::update_transaction(
        app.store(),
        app.user_id,
        created.transaction.id,
        UpdateTransactionDto {
            transaction_type: Some(TransactionType::Income),
            ..Default::default()
        },
    )
    .await
    .expect("Should flip type");
    assert_eq!(app.balance(account.id).await, money("80.00"));
    app.assert_consistent(account.id).await;
}

#[tokio::test]
async fn test_update_moves_effect_between_accounts() {
    let app = TestApp::new();
    let checking = app.account("Checking").await;
    let savings = app.account("Savings").await;

    let created = TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.expense("25.00", date(2025, 3, 1), checking.id),
    )
    .await
    .unwrap();

    TransactionService::update_transaction(
        app.store(),
        app.user_id,
        created.transaction.id,
        UpdateTransactionDto {
            account_id: Some(Some(savings.id)),
            value: Some(money("30.00")),
            ..Default::default()
        },
    )
    .await
    .expect("Should move transaction");

    assert_eq!(app.balance(checking.id).await, money("0.00"));
    assert_eq!(app.balance(savings.id).await, money("-30.00"));

    // Detach from any account
    let updated = TransactionService::update_transaction(
        app.store(),
        app.user_id,
        created.transaction.id,
        UpdateTransactionDto {
            account_id: Some(None),
            ..Default::default()
        },
    )
    .await
    .expect("Should detach account");

    assert_eq!(updated.account_id, None);
    assert_eq!(app.balance(savings.id).await, money("0.00"));
    app.assert_consistent(checking.id).await;
    app.assert_consistent(savings.id).await;
}

#[tokio::test]
async fn test_update_rejects_installment_value_change() {
    let app = TestApp::new();
    let account = app.account("Card").await;

    let dto = app.installments(app.expense("120.00", date(2025, 1, 10), account.id), 4);
    let created = TransactionService::create_transaction(app.store(), app.user_id, dto)
        .await
        .unwrap();

    let err = TransactionService::update_transaction(
        app.store(),
        app.user_id,
        created.transaction.id,
        UpdateTransactionDto {
            value: Some(money("200.00")),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));

    let err = TransactionService::update_transaction(
        app.store(),
        app.user_id,
        created.transaction.id,
        UpdateTransactionDto {
            recurring: Some(true),
            recurring_type: Some(Some(RecurrenceRule::Monthly)),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));

    assert_eq!(app.balance(account.id).await, money("-30.00"));
}

#[tokio::test]
async fn test_failed_update_leaves_balance_untouched() {
    let app = TestApp::new();
    let account = app.account("Checking").await;

    let created = TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.expense("15.00", date(2025, 3, 1), account.id),
    )
    .await
    .unwrap();

    let err = TransactionService::update_transaction(
        app.store(),
        app.user_id,
        created.transaction.id,
        UpdateTransactionDto {
            value: Some(money("99.00")),
            account_id: Some(Some(Uuid::new_v4())),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(app.balance(account.id).await, money("-15.00"));
    let stored = TransactionService::get_transaction(app.store(), app.user_id, created.transaction.id)
        .await
        .unwrap();
    assert_eq!(stored.value, money("15.00"));
}

#[tokio::test]
async fn test_delete_restores_balance() {
    let app = TestApp::new();
    let account = app.account("Checking").await;

    let created = TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.income("200.00", date(2025, 3, 1), account.id),
    )
    .await
    .unwrap();
    assert_eq!(app.balance(account.id).await, money("200.00"));

    TransactionService::delete_transaction(app.store(), app.user_id, created.transaction.id)
        .await
        .expect("Should delete transaction");

    assert_eq!(app.balance(account.id).await, money("0.00"));
    let err = TransactionService::get_transaction(app.store(), app.user_id, created.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_get_foreign_transaction_is_not_found() {
    let app = TestApp::new();
    let account = app.account("Checking").await;

    let created = TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.expense("1.00", date(2025, 3, 1), account.id),
    )
    .await
    .unwrap();

    let err = TransactionService::get_transaction(app.store(), Uuid::new_v4(), created.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_list_filters_and_paginates() {
    let app = TestApp::new();
    let checking = app.account("Checking").await;
    let savings = app.account("Savings").await;

    for day in 1..=5 {
        TransactionService::create_transaction(
            app.store(),
            app.user_id,
            app.expense("1.00", date(2025, 3, day), checking.id),
        )
        .await
        .unwrap();
    }
    TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.income("9.00", date(2025, 3, 3), savings.id),
    )
    .await
    .unwrap();

    let page = TransactionService::list_transactions(
        app.store(),
        app.user_id,
        &TransactionFilters {
            account_id: Some(checking.id),
            limit: 2,
            page: 1,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.data[0].release_date, date(2025, 3, 5));
    assert_eq!(page.data[1].release_date, date(2025, 3, 4));

    let incomes = TransactionService::list_transactions(
        app.store(),
        app.user_id,
        &TransactionFilters {
            transaction_type: Some(TransactionType::Income),
            start_date: Some(date(2025, 3, 2)),
            end_date: Some(date(2025, 3, 3)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(incomes.total, 1);
    assert_eq!(incomes.data[0].account_id, Some(savings.id));

    let err = TransactionService::list_transactions(
        app.store(),
        app.user_id,
        &TransactionFilters {
            limit: 500,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_list_rejects_out_of_range_page() {
    let app = TestApp::new();
    let checking = app.account("Checking").await;
    TransactionService::create_transaction(
        app.store(),
        app.user_id,
        app.expense("1.00", date(2025, 3, 1), checking.id),
    )
    .await
    .unwrap();

    let err = TransactionService::list_transactions(
        app.store(),
        app.user_id,
        &TransactionFilters {
            page: i64::MAX,
            limit: 100,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    // The last accepted page is simply empty
    let last = TransactionService::list_transactions(
        app.store(),
        app.user_id,
        &TransactionFilters {
            page: 1_000_000,
            limit: 100,
            ..Default::default()
        },
    )
    .await
    .expect("Should list an empty page");
    assert_eq!(last.total, 1);
    assert!(last.data.is_empty());
}
