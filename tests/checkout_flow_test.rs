mod common;

use assert_matches::assert_matches;
use coin_commerce::{
    entities::{
        coin_transaction::TransactionType,
        order::{self, OrderStatus},
    },
    errors::ServiceError,
    gateways::PaymentProvider,
    services::{
        checkout::CheckoutRequest,
        orders::{CreateOrderInput, OrderLine},
        settlement::SettlementDisposition,
    },
};
use common::{PromoSeed, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

#[tokio::test]
async fn fully_discounted_order_completes_immediately() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let package = app.seed_coin_package(dec!(20), 250).await;
    app.seed_promo(PromoSeed::percentage("FREEBIE", dec!(100)))
        .await;

    let outcome = app
        .services()
        .checkout
        .checkout(CheckoutRequest {
            user_id,
            items: Some(vec![OrderLine {
                product_id: package.id,
                quantity: 1,
            }]),
            promo_code: Some("FREEBIE".into()),
            is_free: true,
            provider: None,
        })
        .await
        .unwrap();

    assert!(outcome.session.is_none());
    assert_eq!(outcome.order.order.status, OrderStatus::Completed);
    assert!(outcome.order.order.is_free);
    assert_eq!(outcome.order.order.total, dec!(0));
    let settlement = outcome.settlement.expect("free order settles");
    assert_eq!(settlement.disposition, SettlementDisposition::Applied);
    assert!(settlement.promo_redeemed);

    let (entries, _) = app
        .services()
        .ledger
        .history(user_id, 1, 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].transaction_type, TransactionType::Purchase);
    assert_eq!(entries[0].amount, 250);
}

#[tokio::test]
async fn discounted_to_zero_cart_needs_no_provider() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let package = app.seed_coin_package(dec!(15), 150).await;
    app.seed_promo(PromoSeed::fixed("GIFTCARD", dec!(25))).await;
    app.services()
        .cart
        .add_item(user_id, package.id, 1)
        .await
        .unwrap();

    let outcome = app
        .services()
        .checkout
        .checkout(CheckoutRequest {
            user_id,
            items: None,
            promo_code: Some("GIFTCARD".into()),
            is_free: false,
            provider: None,
        })
        .await
        .unwrap();

    assert!(outcome.session.is_none());
    assert_eq!(outcome.order.order.status, OrderStatus::Completed);
    assert_eq!(outcome.order.order.total, dec!(0));
    assert_eq!(app.services().ledger.balance(user_id).await.unwrap().balance, 150);
    assert!(app.services().cart.list_items(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn free_claim_on_priced_order_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_standard(dec!(10)).await;
    let err = app
        .services()
        .orders
        .create_order(CreateOrderInput {
            user_id: Uuid::new_v4(),
            items: vec![OrderLine {
                product_id: product.id,
                quantity: 1,
            }],
            promo_code: None,
            is_free: true,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 0);
}

#[tokio::test]
async fn prices_are_snapshotted_and_duplicate_lines_merged() {
    let app = TestApp::new().await;
    let notebook = app.seed_standard(dec!(12)).await;
    let package = app.seed_coin_package(dec!(5), 100).await;

    let created = app
        .services()
        .orders
        .create_order(CreateOrderInput {
            user_id: Uuid::new_v4(),
            items: vec![
                OrderLine {
                    product_id: notebook.id,
                    quantity: 1,
                },
                OrderLine {
                    product_id: package.id,
                    quantity: 3,
                },
                OrderLine {
                    product_id: notebook.id,
                    quantity: 2,
                },
            ],
            promo_code: None,
            is_free: false,
        })
        .await
        .unwrap();

    let order = created.order;
    assert_eq!(order.order.subtotal, dec!(51));
    assert_eq!(order.order.total, dec!(51));
    assert_eq!(order.order.currency, "EGP");
    assert_eq!(order.items.len(), 2);
    let notebook_line = order
        .items
        .iter()
        .find(|item| item.product_id == notebook.id)
        .unwrap();
    assert_eq!(notebook_line.quantity, 3);
    let package_line = order
        .items
        .iter()
        .find(|item| item.product_id == package.id)
        .unwrap();
    assert_eq!(package_line.coins_total(), Some(300));
    assert!(created.settlement.is_none());
}

#[tokio::test]
async fn unknown_product_persists_nothing() {
    let app = TestApp::new().await;
    let product = app.seed_standard(dec!(10)).await;
    let err = app
        .services()
        .orders
        .create_order(CreateOrderInput {
            user_id: Uuid::new_v4(),
            items: vec![
                OrderLine {
                    product_id: product.id,
                    quantity: 1,
                },
                OrderLine {
                    product_id: Uuid::new_v4(),
                    quantity: 1,
                },
            ],
            promo_code: None,
            is_free: false,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 0);
}

#[tokio::test]
async fn unreachable_gateway_fails_the_order() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product = app.seed_standard(dec!(40)).await;

    let err = app
        .services()
        .checkout
        .checkout(CheckoutRequest {
            user_id,
            items: Some(vec![OrderLine {
                product_id: product.id,
                quantity: 1,
            }]),
            promo_code: None,
            is_free: false,
            provider: Some(PaymentProvider::Kashier),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(_));

    let orders = order::Entity::find()
        .filter(order::Column::UserId.eq(user_id))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);
}

#[tokio::test]
async fn unconfigured_provider_creates_no_order() {
    let app = TestApp::new().await;
    let product = app.seed_standard(dec!(40)).await;

    let err = app
        .services()
        .checkout
        .checkout(CheckoutRequest {
            user_id: Uuid::new_v4(),
            items: Some(vec![OrderLine {
                product_id: product.id,
                quantity: 1,
            }]),
            promo_code: None,
            is_free: false,
            provider: Some(PaymentProvider::Paypal),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BadRequest(_));
    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 0);
}

#[tokio::test]
async fn paid_checkout_requires_provider() {
    let app = TestApp::new().await;
    let product = app.seed_standard(dec!(40)).await;

    let err = app
        .services()
        .checkout
        .checkout(CheckoutRequest {
            user_id: Uuid::new_v4(),
            items: Some(vec![OrderLine {
                product_id: product.id,
                quantity: 1,
            }]),
            promo_code: None,
            is_free: false,
            provider: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 0);
}

#[tokio::test]
async fn cart_checkout_opens_session_and_settles_through_webhook() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let package = app.seed_coin_package(dec!(49.50), 500).await;
    app.services()
        .cart
        .add_item(user_id, package.id, 1)
        .await
        .unwrap();

    let outcome = app
        .services()
        .checkout
        .checkout(CheckoutRequest {
            user_id,
            items: None,
            promo_code: None,
            is_free: false,
            provider: Some(PaymentProvider::ApplePay),
        })
        .await
        .unwrap();

    let order_id = outcome.order.order.id;
    let session = outcome.session.expect("apple pay session");
    assert_eq!(session.provider, PaymentProvider::ApplePay);
    assert_eq!(session.reference, format!("merchant.test:{}", order_id));
    assert_eq!(outcome.order.order.status, OrderStatus::Pending);
    assert_eq!(
        outcome.order.order.payment_provider.as_deref(),
        Some("apple_pay")
    );
    // The cart is only cleared once payment succeeds
    assert_eq!(app.services().cart.list_items(user_id).await.unwrap().len(), 1);

    let body = common::apple_pay_event(order_id, "approved", "ap_txn_9");
    let response = app
        .signed_webhook("apple_pay", &body, common::APPLE_PAY_SECRET)
        .await;
    assert_eq!(response.status(), 200);

    let order = app.services().orders.get_order(order_id).await.unwrap();
    assert_eq!(order.order.status, OrderStatus::Completed);
    assert_eq!(app.services().ledger.balance(user_id).await.unwrap().balance, 500);
    assert!(app.services().cart.list_items(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let app = TestApp::new().await;
    let err = app
        .services()
        .checkout
        .checkout(CheckoutRequest {
            user_id: Uuid::new_v4(),
            items: None,
            promo_code: None,
            is_free: false,
            provider: Some(PaymentProvider::ApplePay),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
