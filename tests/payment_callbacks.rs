mod support;

use code_shop::{
    entity::{
        audit_logs::{Column as AuditCol, Entity as AuditLogs},
        balance_transactions::{Column as LedgerCol, Entity as Ledger},
        codes::{Column as CodeCol, Entity as Codes},
        sea_orm_active_enums::OrderStatus,
    },
    error::AppError,
    gateway::Params,
    services::{
        ledger_service::verify_ledger,
        order_service::{place_product_order, place_topup_order},
        payment_service::{CallbackOutcome, handle_callback},
    },
    state::AppState,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use support::{
    balance_of, callback_for, create_user, paid_callback, postgres_app, product_with_codes,
    reload_order, sqlite_app, sqlite_file_app,
};

#[tokio::test]
async fn topup_is_credited_exactly_once() -> anyhow::Result<()> {
    let mut app = sqlite_app().await?;
    let state = &app.state;
    let user = create_user(state, 0).await?;
    let order = place_topup_order(&state.orm, user.id, 500).await?.order;

    let params = paid_callback(&order);
    let first = handle_callback(state, &params).await?;
    assert_eq!(first, CallbackOutcome::Processed(OrderStatus::Delivered));

    let again = handle_callback(state, &params).await?;
    assert_eq!(again, CallbackOutcome::Duplicate);

    assert_eq!(balance_of(state, user.id).await?, 500);
    let stored = reload_order(state, order.id).await?;
    assert_eq!(stored.status, OrderStatus::Delivered);
    assert!(stored.paid_at.is_some() && stored.delivered_at.is_some());
    assert_eq!(stored.trade_ref.as_deref(), params.get("trade_no").map(String::as_str));

    let entries = Ledger::find()
        .filter(LedgerCol::OrderId.eq(order.id))
        .count(&state.orm)
        .await?;
    assert_eq!(entries, 1);
    assert_eq!(app.drain_events(), vec!["balance_credited"]);
    Ok(())
}

async fn concurrent_callbacks_settle_once(state: AppState) -> anyhow::Result<()> {
    let user = create_user(&state, 0).await?;
    let product_id = product_with_codes(&state, 990, 3).await?;
    let order = place_product_order(&state.orm, &state.claims, user.id, product_id, false)
        .await?
        .order;
    let params = paid_callback(&order);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let state = state.clone();
            let params: Params = params.clone();
            tokio::spawn(async move { handle_callback(&state, &params).await })
        })
        .collect();

    let mut processed = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await?? {
            CallbackOutcome::Processed(status) => {
                assert_eq!(status, OrderStatus::Delivered);
                processed += 1;
            }
            CallbackOutcome::Duplicate => duplicates += 1,
            CallbackOutcome::Ignored => anyhow::bail!("success callback was ignored"),
        }
    }
    assert_eq!(processed, 1);
    assert_eq!(duplicates, 7);

    let linked = Codes::find()
        .filter(CodeCol::OrderId.eq(order.id))
        .count(&state.orm)
        .await?;
    assert_eq!(linked, 1);
    let sold = Codes::find()
        .filter(CodeCol::ProductId.eq(product_id))
        .filter(CodeCol::Sold.eq(true))
        .count(&state.orm)
        .await?;
    assert_eq!(sold, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callbacks_on_sqlite() -> anyhow::Result<()> {
    concurrent_callbacks_settle_once(sqlite_app().await?.state).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callbacks_on_sqlite_file() -> anyhow::Result<()> {
    let app = sqlite_file_app().await?;
    concurrent_callbacks_settle_once(app.state.clone()).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callbacks_on_postgres() -> anyhow::Result<()> {
    let Some(app) = postgres_app().await? else {
        return Ok(());
    };
    concurrent_callbacks_settle_once(app.state).await
}

#[tokio::test]
async fn amount_mismatch_leaves_order_pending() -> anyhow::Result<()> {
    let app = sqlite_app().await?;
    let state = &app.state;
    let user = create_user(state, 0).await?;
    let order = place_topup_order(&state.orm, user.id, 500).await?.order;

    let params = callback_for(&order, "4.99", "TRADE_SUCCESS");
    let err = handle_callback(state, &params).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::AmountMismatch {
            expected: 500,
            received: 499
        }
    ));

    assert_eq!(reload_order(state, order.id).await?.status, OrderStatus::Pending);
    assert_eq!(balance_of(state, user.id).await?, 0);
    let flagged = AuditLogs::find()
        .filter(AuditCol::Action.eq("amount_mismatch"))
        .count(&state.orm)
        .await?;
    assert_eq!(flagged, 1);

    // The correct notification still settles the order afterwards.
    let outcome = handle_callback(state, &paid_callback(&order)).await?;
    assert_eq!(outcome, CallbackOutcome::Processed(OrderStatus::Delivered));
    Ok(())
}

#[tokio::test]
async fn tampered_signature_is_rejected() -> anyhow::Result<()> {
    let app = sqlite_app().await?;
    let state = &app.state;
    let user = create_user(state, 0).await?;
    let order = place_topup_order(&state.orm, user.id, 500).await?.order;

    let mut params = paid_callback(&order);
    params.insert("money".into(), "5000.00".into());
    let err = handle_callback(state, &params).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidSignature));

    params.remove("sign");
    let err = handle_callback(state, &params).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidSignature));

    assert_eq!(reload_order(state, order.id).await?.status, OrderStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn non_success_status_is_ignored() -> anyhow::Result<()> {
    let app = sqlite_app().await?;
    let state = &app.state;
    let user = create_user(state, 0).await?;
    let order = place_topup_order(&state.orm, user.id, 500).await?.order;

    let params = callback_for(&order, "5.00", "WAIT_BUYER_PAY");
    assert_eq!(handle_callback(state, &params).await?, CallbackOutcome::Ignored);
    assert_eq!(reload_order(state, order.id).await?.status, OrderStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn unknown_correlation_id_is_not_found() -> anyhow::Result<()> {
    let app = sqlite_app().await?;
    let state = &app.state;
    let user = create_user(state, 0).await?;
    let mut order = place_topup_order(&state.orm, user.id, 500).await?.order;
    order.correlation_id = "CS20990101000000ffffffffffff".into();

    let err = handle_callback(state, &paid_callback(&order)).await.unwrap_err();
    assert!(matches!(err, AppError::OrderNotFound));
    Ok(())
}

#[tokio::test]
async fn paid_order_without_stock_is_flagged() -> anyhow::Result<()> {
    let mut app = sqlite_app().await?;
    let state = &app.state;
    let product_id = product_with_codes(state, 1000, 1).await?;
    let first_user = create_user(state, 0).await?;
    let second_user = create_user(state, 0).await?;

    let first = place_product_order(&state.orm, &state.claims, first_user.id, product_id, false)
        .await?
        .order;
    let second = place_product_order(&state.orm, &state.claims, second_user.id, product_id, false)
        .await?
        .order;

    let outcome = handle_callback(state, &paid_callback(&first)).await?;
    assert_eq!(outcome, CallbackOutcome::Processed(OrderStatus::Delivered));

    let outcome = handle_callback(state, &paid_callback(&second)).await?;
    assert_eq!(outcome, CallbackOutcome::Processed(OrderStatus::PaidNoStock));

    let stored = reload_order(state, second.id).await?;
    assert_eq!(stored.status, OrderStatus::PaidNoStock);
    assert!(stored.paid_at.is_some());
    assert!(stored.delivered_at.is_none());

    // Redelivery of the same notification must not flip it back.
    let outcome = handle_callback(state, &paid_callback(&second)).await?;
    assert_eq!(outcome, CallbackOutcome::Duplicate);
    assert_eq!(app.drain_events(), vec!["order_delivered", "order_no_stock"]);
    Ok(())
}

#[tokio::test]
async fn failed_topup_credit_keeps_payment() -> anyhow::Result<()> {
    let app = sqlite_app().await?;
    let state = &app.state;
    // A credit on top of this balance overflows, so delivery fails after payment.
    let user = create_user(state, i64::MAX - 5).await?;
    let order = place_topup_order(&state.orm, user.id, 100).await?.order;

    let outcome = handle_callback(state, &paid_callback(&order)).await?;
    assert_eq!(outcome, CallbackOutcome::Processed(OrderStatus::FailedDelivery));

    let stored = reload_order(state, order.id).await?;
    assert_eq!(stored.status, OrderStatus::FailedDelivery);
    assert!(stored.paid_at.is_some());
    assert_eq!(balance_of(state, user.id).await?, i64::MAX - 5);
    assert!(verify_ledger(&state.orm, user.id).await?.consistent);
    Ok(())
}
