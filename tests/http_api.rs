use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;

use opensase_shop::auth::{issue_token, JwtIdentityResolver};
use opensase_shop::domain::aggregates::{Role, User};
use opensase_shop::domain::value_objects::UserId;
use opensase_shop::http::{router, AppState};
use opensase_shop::publisher::EventPublisher;
use opensase_shop::services::Services;
use opensase_shop::store::MemoryStore;
use opensase_shop::domain::aggregates::StatusPolicy;

const SECRET: &str = "integration-test-secret";

struct TestApp {
    app: Router,
    customer: String,
    other: String,
    admin: String,
}

impl TestApp {
    async fn spawn() -> Self {
        let store = MemoryStore::new();
        let customer = register(&store, "ana@example.com", Role::Customer).await;
        let other = register(&store, "luis@example.com", Role::Customer).await;
        let admin = register(&store, "root@example.com", Role::Admin).await;

        let services = Services::new(Arc::new(store), EventPublisher::disabled(), StatusPolicy::Permissive);
        let app = router(AppState { services, identity: Arc::new(JwtIdentityResolver::new(SECRET)) });
        Self { app, customer: token(customer, Role::Customer), other: token(other, Role::Customer), admin: token(admin, Role::Admin) }
    }

    async fn call(&self, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, value)
    }

    /// Category and one product priced at `price`; returns the product id.
    async fn seed_product(&self, category: &str, name: &str, price: &str) -> String {
        let (_, existing) = self.call(Method::GET, &format!("/api/categories/slug/{category}"), None, None).await;
        let category_id = match existing["id"].as_str() {
            Some(id) => id.to_string(),
            None => {
                let (status, created) = self.call(Method::POST, "/api/categories", Some(&self.admin), Some(json!({"name": category}))).await;
                assert_eq!(status, StatusCode::CREATED);
                created["id"].as_str().unwrap().to_string()
            }
        };
        let (status, product) = self
            .call(Method::POST, "/api/products", Some(&self.admin), Some(json!({"categoryId": category_id, "name": name, "price": price})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        product["id"].as_str().unwrap().to_string()
    }

    async fn address(&self, bearer: &str) -> String {
        let (status, address) = self
            .call(
                Method::POST,
                "/api/addresses",
                Some(bearer),
                Some(json!({"street": "Calle Mayor 1", "city": "Madrid", "province": "Madrid", "postalCode": "28013", "country": "ES"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        address["id"].as_str().unwrap().to_string()
    }
}

async fn register(store: &MemoryStore, email: &str, role: Role) -> UserId {
    let id = UserId::generate();
    store.add_user(User { id, email: email.into(), full_name: email.into(), role }).await;
    id
}

fn token(user: UserId, role: Role) -> String {
    issue_token(SECRET, user, role, chrono::Duration::minutes(10)).unwrap()
}

fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::spawn().await;
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn protected_endpoints_need_a_valid_token() {
    let app = TestApp::spawn().await;
    let (status, body) = app.call(Method::GET, "/api/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = app.call(Method::GET, "/api/cart?sessionId=abc", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(Method::GET, "/api/orders/admin", Some(&app.customer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn guest_cart_accepts_spanish_field_names() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("ropa", "Camiseta", "12.50").await;

    let (status, line) = app
        .call(Method::POST, "/api/cart", None, Some(json!({"productId": product, "cantidad": 2, "idSesion": "s-1"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(line["quantity"], 2);

    let (status, _) = app.call(Method::POST, "/api/cart", None, Some(json!({"productId": product, "quantity": 1, "sessionId": "s-1"}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, cart) = app.call(Method::GET, "/api/cart?idSesion=s-1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["totalItemCount"], 3);
    assert_eq!(money(&cart["subtotal"]), Decimal::from_str("37.50").unwrap());

    let (status, body) = app.call(Method::POST, "/api/cart", None, Some(json!({"productId": product, "quantity": 0, "sessionId": "s-1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = app.call(Method::POST, "/api/cart", None, Some(json!({"productId": product}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call(Method::DELETE, "/api/cart?sessionId=s-1", None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, cart) = app.call(Method::GET, "/api/cart?sessionId=s-1", None, None).await;
    assert_eq!(cart["totalItemCount"], 0);
}

#[tokio::test]
async fn login_transfer_then_checkout() {
    let app = TestApp::spawn().await;
    let shirt = app.seed_product("ropa", "Shirt", "10.00").await;
    let socks = app.seed_product("ropa", "Socks", "5.00").await;
    let address = app.address(&app.customer).await;

    app.call(Method::POST, "/api/cart", Some(&app.customer), Some(json!({"productId": shirt, "quantity": 1}))).await;
    app.call(Method::POST, "/api/cart", None, Some(json!({"productId": shirt, "quantity": 1, "sessionId": "guest"}))).await;
    app.call(Method::POST, "/api/cart", None, Some(json!({"productId": socks, "quantity": 1, "sessionId": "guest"}))).await;

    let (status, cart) = app.call(Method::POST, "/api/cart/transfer?sessionId=guest", Some(&app.customer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["lines"].as_array().unwrap().len(), 2);
    assert_eq!(cart["totalItemCount"], 3);

    let (status, _) = app.call(Method::POST, "/api/cart/transfer?sessionId=guest", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, order) = app.call(Method::POST, "/api/orders", Some(&app.customer), Some(json!({"direccionId": address}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "PENDING");
    assert_eq!(money(&order["total"]), Decimal::from_str("25.00").unwrap());
    assert_eq!(order["address"]["city"], "Madrid");

    let (_, cart) = app.call(Method::GET, "/api/cart", Some(&app.customer), None).await;
    assert_eq!(cart["totalItemCount"], 0);

    let (status, body) = app.call(Method::POST, "/api/orders", Some(&app.customer), Some(json!({"addressId": address}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot checkout an empty cart");

    let (status, _) = app.call(Method::GET, &format!("/api/orders/{}", order["id"].as_str().unwrap()), Some(&app.other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cross_user_line_update_is_forbidden() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("hogar", "Lamp", "30.00").await;
    let (_, line) = app.call(Method::POST, "/api/cart", Some(&app.customer), Some(json!({"productId": product}))).await;
    let uri = format!("/api/cart/{}", line["id"].as_str().unwrap());

    let (status, _) = app.call(Method::PUT, &uri, Some(&app.other), Some(json!({"quantity": 4}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::DELETE, &uri, Some(&app.other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app.call(Method::PUT, &uri, Some(&app.customer), Some(json!({"cantidad": 4}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["quantity"], 4);
    let (status, _) = app.call(Method::DELETE, &uri, Some(&app.customer), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_sets_order_status() {
    let app = TestApp::spawn().await;
    let product = app.seed_product("hogar", "Lamp", "30.00").await;
    let address = app.address(&app.customer).await;
    app.call(Method::POST, "/api/cart", Some(&app.customer), Some(json!({"productId": product}))).await;
    let (_, order) = app.call(Method::POST, "/api/orders", Some(&app.customer), Some(json!({"addressId": address}))).await;
    let id = order["id"].as_str().unwrap();

    let (status, _) = app.call(Method::PUT, &format!("/api/orders/admin/{id}/status"), Some(&app.customer), Some(json!({"status": "SHIPPED"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app.call(Method::PUT, &format!("/api/orders/admin/{id}/estado"), Some(&app.admin), Some(json!({"estado": "shipped"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "SHIPPED");

    let (status, _) = app.call(Method::PUT, &format!("/api/orders/admin/{id}/status"), Some(&app.admin), Some(json!({"status": "TELEPORTED"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, all) = app.call(Method::GET, "/api/orders/admin", Some(&app.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn category_tree_reports_totals() {
    let app = TestApp::spawn().await;
    let (_, root) = app.call(Method::POST, "/api/categories", Some(&app.admin), Some(json!({"name": "Mujer"}))).await;
    let root_id = root["id"].as_str().unwrap().to_string();
    let (_, child) = app
        .call(Method::POST, "/api/categories", Some(&app.admin), Some(json!({"name": "Vestidos", "parentId": root_id})))
        .await;
    let child_id = child["id"].as_str().unwrap().to_string();

    for i in 0..2 {
        app.call(Method::POST, "/api/products", Some(&app.admin), Some(json!({"categoryId": root_id, "name": format!("Top {i}"), "price": "9.99"}))).await;
    }
    app.call(Method::POST, "/api/products", Some(&app.admin), Some(json!({"categoryId": child_id, "name": "Vestido", "price": 20}))).await;

    let (status, node) = app.call(Method::GET, &format!("/api/categories/{root_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node["totalProducts"], 3);
    assert_eq!(node["subcategories"][0]["totalProducts"], 1);
    assert_eq!(node["subcategories"][0]["parentName"], "Mujer");

    let (_, roots) = app.call(Method::GET, "/api/categories/roots", None, None).await;
    assert_eq!(roots.as_array().unwrap().len(), 1);
    let (_, count) = app.call(Method::GET, "/api/categories/count", None, None).await;
    assert_eq!(count, 2);

    let (status, body) = app.call(Method::POST, "/api/categories", Some(&app.admin), Some(json!({"name": "Mujer"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _) = app
        .call(Method::PUT, &format!("/api/categories/{root_id}"), Some(&app.admin), Some(json!({"name": "Mujer", "parentId": root_id})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call(Method::POST, "/api/categories", Some(&app.customer), Some(json!({"name": "Hombre"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_input_gets_json_errors() {
    let app = TestApp::spawn().await;

    let (status, body) = app.call(Method::GET, "/api/categories/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert!(body["message"].is_string());

    let (status, body) = app.call(Method::POST, "/api/cart", None, Some(json!({"productId": "x", "sessionId": "s-1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, body) = app.call(Method::GET, "/api/products?categoryId=nope", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn category_rename_keeps_its_parent() {
    let app = TestApp::spawn().await;
    let (_, root) = app.call(Method::POST, "/api/categories", Some(&app.admin), Some(json!({"name": "Mujer"}))).await;
    let root_id = root["id"].as_str().unwrap().to_string();
    let (_, child) = app
        .call(Method::POST, "/api/categories", Some(&app.admin), Some(json!({"name": "Vestidos", "parentId": root_id})))
        .await;
    let uri = format!("/api/categories/{}", child["id"].as_str().unwrap());

    let (status, renamed) = app.call(Method::PUT, &uri, Some(&app.admin), Some(json!({"name": "Vestidos largos"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Vestidos largos");
    assert_eq!(renamed["parentId"], root_id.as_str());

    let (status, detached) = app.call(Method::PUT, &uri, Some(&app.admin), Some(json!({"name": "Vestidos largos", "parentId": null}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detached["parentId"], Value::Null);

    let (_, main) = app.call(Method::GET, "/api/categories/main", None, None).await;
    assert_eq!(main.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn product_search_count_and_delete() {
    let app = TestApp::spawn().await;
    let mug = app.seed_product("cocina", "Taza azul", "6.00").await;
    let teapot = app.seed_product("cocina", "Tetera", "18.00").await;

    let (status, found) = app.call(Method::GET, "/api/products/search?q=TAZA", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["id"], mug.as_str());
    let (_, count) = app.call(Method::GET, "/api/products/count", None, None).await;
    assert_eq!(count, 2);

    let (status, _) = app.call(Method::DELETE, &format!("/api/products/{mug}"), Some(&app.customer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::DELETE, &format!("/api/products/{mug}"), Some(&app.admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::GET, &format!("/api/products/{mug}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = app.call(Method::GET, &format!("/api/products/category/{}", found[0]["categoryId"].as_str().unwrap()), None, None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], teapot.as_str());
}

#[tokio::test]
async fn addresses_are_private_to_their_owner() {
    let app = TestApp::spawn().await;
    let id = app.address(&app.customer).await;
    let uri = format!("/api/addresses/{id}");

    let (status, _) = app.call(Method::GET, &uri, Some(&app.other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.call(Method::DELETE, &uri, Some(&app.other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, updated) = app.call(Method::PUT, &uri, Some(&app.customer), Some(json!({"city": "Sevilla"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["city"], "Sevilla");
    assert_eq!(updated["street"], "Calle Mayor 1");

    let (status, _) = app.call(Method::DELETE, &uri, Some(&app.customer), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, listed) = app.call(Method::GET, "/api/addresses", Some(&app.customer), None).await;
    assert!(listed.as_array().unwrap().is_empty());
}
