//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::identity::{SESSION_HEADER, USER_HEADER};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::{CheckoutConfig, InMemoryNotifier};
use common::{SessionId, UserId};
use domain::{Money, Product, ProductId};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryStore, Store, UnitOfWork};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: InMemoryStore,
    state: Arc<api::AppState<InMemoryStore, InMemoryNotifier>>,
    notifier: InMemoryNotifier,
}

async fn setup() -> TestApp {
    let config = CheckoutConfig {
        lock_timeout: Duration::from_millis(500),
        ..CheckoutConfig::default()
    };
    let store = InMemoryStore::with_lock_timeout(config.lock_timeout);
    store
        .put_product(&Product::new(
            "SKU-001",
            "Widget",
            "A small widget",
            Money::from_cents(999),
            5,
        ))
        .await
        .unwrap();
    store
        .put_product(&Product::new(
            "SKU-002",
            "Gadget",
            "A useful gadget",
            Money::from_cents(2500),
            1,
        ))
        .await
        .unwrap();

    let notifier = InMemoryNotifier::new();
    let state = api::create_state(store.clone(), notifier.clone(), &config);
    let app = api::create_app(state.clone(), get_metrics_handle());
    TestApp {
        app,
        store,
        state,
        notifier,
    }
}

#[derive(Clone, Copy)]
struct Caller {
    session: SessionId,
    user: Option<UserId>,
}

impl Caller {
    fn guest() -> Self {
        Self {
            session: SessionId::new(),
            user: None,
        }
    }

    fn user() -> Self {
        Self {
            session: SessionId::new(),
            user: Some(UserId::new()),
        }
    }
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    caller: Option<Caller>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header(SESSION_HEADER, caller.session.to_string());
        if let Some(user) = caller.user {
            builder = builder.header(USER_HEADER, user.to_string());
        }
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn shipping() -> serde_json::Value {
    serde_json::json!({
        "recipient_name": "Ada Lovelace",
        "email": "ada@example.com",
        "street": "12 Analytical Way",
        "city": "London",
        "postal_code": "N1",
        "country": "GB"
    })
}

async fn add(app: &axum::Router, caller: Caller, product_id: &str, quantity: u32) -> StatusCode {
    let (status, _) = send(
        app,
        "POST",
        "/cart/items",
        Some(caller),
        Some(serde_json::json!({ "product_id": product_id, "quantity": quantity })),
    )
    .await;
    status
}

#[tokio::test]
async fn test_health_check() {
    let test = setup().await;

    let (status, json) = send(&test.app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "up");
}

#[tokio::test]
async fn test_health_check_while_rows_are_locked() {
    let test = setup().await;
    let mut tx = test.store.begin().await.unwrap();
    tx.lock_product(&ProductId::new("SKU-001")).await.unwrap();

    let (status, json) = send(&test.app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["store"], "up");
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let test = setup().await;

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_add_and_view_cart() {
    let test = setup().await;
    let caller = Caller::guest();

    assert_eq!(add(&test.app, caller, "SKU-001", 2).await, StatusCode::OK);
    assert_eq!(add(&test.app, caller, "SKU-001", 1).await, StatusCode::OK);

    let (status, json) = send(&test.app, "GET", "/cart", Some(caller), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lines"].as_array().unwrap().len(), 1);
    assert_eq!(json["lines"][0]["quantity"], 3);
    assert_eq!(json["lines"][0]["subtotal_cents"], 2997);
    assert_eq!(json["total_cents"], 2997);
    assert_eq!(json["total_quantity"], 3);
}

#[tokio::test]
async fn test_add_beyond_stock_is_conflict() {
    let test = setup().await;
    let caller = Caller::guest();

    assert_eq!(add(&test.app, caller, "SKU-002", 1).await, StatusCode::OK);
    let (status, json) = send(
        &test.app,
        "POST",
        "/cart/items",
        Some(caller),
        Some(serde_json::json!({ "product_id": "SKU-002", "quantity": 1 })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "insufficient_stock");
}

#[tokio::test]
async fn test_add_unknown_product_is_not_found() {
    let test = setup().await;

    assert_eq!(
        add(&test.app, Caller::guest(), "SKU-404", 1).await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_update_to_zero_removes_line() {
    let test = setup().await;
    let caller = Caller::guest();
    add(&test.app, caller, "SKU-001", 2).await;

    let (status, json) = send(
        &test.app,
        "PUT",
        "/cart/items/SKU-001",
        Some(caller),
        Some(serde_json::json!({ "quantity": 0 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["lines"].as_array().unwrap().is_empty());
    assert_eq!(json["total_cents"], 0);
}

#[tokio::test]
async fn test_remove_and_clear() {
    let test = setup().await;
    let caller = Caller::guest();
    add(&test.app, caller, "SKU-001", 1).await;
    add(&test.app, caller, "SKU-002", 1).await;

    let (status, json) = send(
        &test.app,
        "DELETE",
        "/cart/items/SKU-002",
        Some(caller),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lines"].as_array().unwrap().len(), 1);

    let (status, _) = send(&test.app, "DELETE", "/cart", Some(caller), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, json) = send(&test.app, "GET", "/cart", Some(caller), None).await;
    assert!(json["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_session_header_is_bad_request() {
    let test = setup().await;

    let (status, json) = send(&test.app, "GET", "/cart", None, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "bad_request");
}

#[tokio::test]
async fn test_checkout_creates_order() {
    let test = setup().await;
    let caller = Caller::guest();
    add(&test.app, caller, "SKU-001", 2).await;

    let (status, json) = send(&test.app, "POST", "/checkout", Some(caller), Some(shipping())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "PENDING");
    let order_id = json["order_id"].as_str().unwrap().to_string();

    let (status, order) = send(
        &test.app,
        "GET",
        &format!("/orders/{order_id}"),
        Some(caller),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["id"], order_id.as_str());
    assert_eq!(order["total_cents"], 1998);
    assert!(order["user_id"].is_null());
    assert_eq!(order["lines"][0]["product_name"], "Widget");
    assert_eq!(order["lines"][0]["quantity"], 2);
    assert_eq!(order["shipping"]["email"], "ada@example.com");

    assert_eq!(
        test.store
            .available_quantity(&ProductId::new("SKU-001"))
            .await,
        Some(3)
    );

    let (_, cart) = send(&test.app, "GET", "/cart", Some(caller), None).await;
    assert!(cart["lines"].as_array().unwrap().is_empty());

    assert!(
        test.notifier
            .wait_for_attempts(1, Duration::from_secs(2))
            .await
    );
}

#[tokio::test]
async fn test_checkout_empty_cart_is_unprocessable() {
    let test = setup().await;

    let (status, json) = send(
        &test.app,
        "POST",
        "/checkout",
        Some(Caller::guest()),
        Some(shipping()),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "empty_cart");
    assert_eq!(test.store.count_orders().await.unwrap(), 0);
}

#[tokio::test]
async fn test_checkout_insufficient_stock_is_conflict() {
    let test = setup().await;
    let first = Caller::guest();
    let second = Caller::guest();
    add(&test.app, first, "SKU-002", 1).await;
    add(&test.app, second, "SKU-002", 1).await;

    let (status, _) = send(&test.app, "POST", "/checkout", Some(first), Some(shipping())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send(&test.app, "POST", "/checkout", Some(second), Some(shipping())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "insufficient_stock");
    assert!(json["error"].as_str().unwrap().contains("Gadget"));

    let (_, cart) = send(&test.app, "GET", "/cart", Some(second), None).await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 1);
    assert_eq!(test.store.count_orders().await.unwrap(), 1);
}

#[tokio::test]
async fn test_checkout_rejects_blank_shipping() {
    let test = setup().await;
    let caller = Caller::guest();
    add(&test.app, caller, "SKU-001", 1).await;

    let mut body = shipping();
    body["recipient_name"] = serde_json::json!("");
    let (status, _) = send(&test.app, "POST", "/checkout", Some(caller), Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(test.store.count_orders().await.unwrap(), 0);
}

#[tokio::test]
async fn test_user_cart_is_persistent() {
    let test = setup().await;
    let caller = Caller::user();
    let user_id = caller.user.unwrap();
    add(&test.app, caller, "SKU-001", 1).await;

    // A new session for the same user sees the same cart.
    let other_device = Caller {
        session: SessionId::new(),
        user: Some(user_id),
    };
    let (_, cart) = send(&test.app, "GET", "/cart", Some(other_device), None).await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 1);
    assert_eq!(test.store.cart_rows(user_id).await.unwrap().len(), 1);

    let (status, json) = send(
        &test.app,
        "POST",
        "/checkout",
        Some(other_device),
        Some(shipping()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(test.store.cart_rows(user_id).await.unwrap().is_empty());

    let (_, order) = send(
        &test.app,
        "GET",
        &format!("/orders/{}", json["order_id"].as_str().unwrap()),
        Some(caller),
        None,
    )
    .await;
    assert_eq!(order["user_id"], user_id.to_string().as_str());
}

#[tokio::test]
async fn test_order_is_hidden_from_other_owners() {
    let test = setup().await;
    let buyer = Caller::user();
    add(&test.app, buyer, "SKU-001", 1).await;
    let (_, json) = send(&test.app, "POST", "/checkout", Some(buyer), Some(shipping())).await;
    let uri = format!("/orders/{}", json["order_id"].as_str().unwrap());

    for stranger in [Caller::user(), Caller::guest()] {
        let (status, json) = send(&test.app, "GET", &uri, Some(stranger), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "not_found");
    }

    let (status, _) = send(&test.app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&test.app, "GET", &uri, Some(buyer), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_guest_order_is_hidden_from_users() {
    let test = setup().await;
    let guest = Caller::guest();
    add(&test.app, guest, "SKU-001", 1).await;
    let (_, json) = send(&test.app, "POST", "/checkout", Some(guest), Some(shipping())).await;
    let uri = format!("/orders/{}", json["order_id"].as_str().unwrap());

    let (status, _) = send(&test.app, "GET", &uri, Some(Caller::user()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_cart_total_is_unprocessable() {
    let test = setup().await;
    test.store
        .put_product(&Product::new(
            "SKU-900",
            "Yacht",
            "A very large yacht",
            Money::from_cents(i64::MAX / 2),
            10,
        ))
        .await
        .unwrap();
    let caller = Caller::guest();
    assert_eq!(add(&test.app, caller, "SKU-001", 1).await, StatusCode::OK);

    let (status, json) = send(
        &test.app,
        "POST",
        "/cart/items",
        Some(caller),
        Some(serde_json::json!({ "product_id": "SKU-900", "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "total_overflow");

    let (status, cart) = send(&test.app, "GET", "/cart", Some(caller), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["total_cents"], 999);
}

#[tokio::test]
async fn test_get_nonexistent_order() {
    let test = setup().await;
    let fake_id = common::OrderId::new();

    let (status, json) = send(
        &test.app,
        "GET",
        &format!("/orders/{fake_id}"),
        Some(Caller::guest()),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");
}

#[tokio::test]
async fn test_invalid_order_id() {
    let test = setup().await;

    let (status, _) = send(
        &test.app,
        "GET",
        "/orders/not-a-uuid",
        Some(Caller::guest()),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_held_cart_lock_returns_service_unavailable() {
    let test = setup().await;
    let caller = Caller::guest();
    add(&test.app, caller, "SKU-001", 1).await;

    let owner = domain::CartOwner::Guest(caller.session);
    let _guard = test.state.locks.acquire(owner).await.unwrap();

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout")
                .header(SESSION_HEADER, caller.session.to_string())
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&shipping()).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(test.store.count_orders().await.unwrap(), 0);
}
