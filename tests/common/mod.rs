#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use fake::{
    faker::{
        internet::en::SafeEmail,
        name::en::{FirstName, LastName},
    },
    Fake,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tower::ServiceExt;

use box_office::{
    app,
    cache::CacheService,
    config::Config,
    database::Database,
    models::{
        catalog::CatalogItemInput,
        user::NewUser,
        CatalogItem, User,
    },
    services::{auth::hash_password, mailer::MemoryMailer},
    AppState,
};

pub const PASSWORD: &str = "password123";

/// Конфигурация для тестов: дешевый bcrypt, без подтверждения email.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("DATABASE_URL", "postgres://unused"),
        ("JWT_SECRET", "integration-test-secret"),
        ("BCRYPT_COST", "4"),
        ("REQUIRE_ACTIVATION", "false"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config should be valid")
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub mailer: MemoryMailer,
}

pub fn build_test_app(pool: PgPool) -> TestApp {
    build_test_app_with(pool, &[])
}

pub fn build_test_app_with(pool: PgPool, overrides: &[(&str, &str)]) -> TestApp {
    let mailer = MemoryMailer::default();
    let state = Arc::new(AppState::from_parts(
        Database::from_pool(pool),
        CacheService::disabled(),
        test_config(overrides),
        Arc::new(mailer.clone()),
    ));
    TestApp {
        router: app(state.clone()),
        state,
        mailer,
    }
}

/* ---------- fixtures ---------- */

pub async fn create_user(pool: &PgPool, balance: i64) -> User {
    let email: String = SafeEmail().fake();
    let new_user = NewUser {
        email: format!("{}.{}", uuid::Uuid::new_v4().simple(), email),
        password_hash: hash_password(PASSWORD, 4).expect("hashing should succeed"),
        first_name: FirstName().fake(),
        last_name: LastName().fake(),
        is_active: true,
        ..NewUser::default()
    };
    let user = User::create(pool, &new_user).await.expect("user creation should succeed");

    let delta = Decimal::from(balance) - user.balance;
    User::adjust_balance(pool, user.id, delta)
        .await
        .expect("balance adjustment should succeed");
    User::find_by_id(pool, user.id).await.unwrap().unwrap()
}

pub async fn create_admin(pool: &PgPool) -> User {
    let user = create_user(pool, 1000).await;
    sqlx::query("UPDATE users SET is_superuser = TRUE WHERE id = $1")
        .bind(user.id)
        .execute(pool)
        .await
        .unwrap();
    User::find_by_id(pool, user.id).await.unwrap().unwrap()
}

pub async fn create_advisor(pool: &PgPool) -> User {
    let user = create_user(pool, 1000).await;
    sqlx::query("UPDATE users SET is_advisor = TRUE WHERE id = $1")
        .bind(user.id)
        .execute(pool)
        .await
        .unwrap();
    User::find_by_id(pool, user.id).await.unwrap().unwrap()
}

pub fn item_input(title: &str, price: i64) -> CatalogItemInput {
    CatalogItemInput {
        title: title.to_string(),
        genre: Some("Drama".to_string()),
        duration: "2h".to_string(),
        category: "Movie".to_string(),
        description: None,
        poster: None,
        price: Decimal::from(price),
        scheduled_at: chrono::NaiveDate::from_ymd_opt(2026, 12, 24)
            .unwrap()
            .and_hms_opt(19, 30, 0)
            .unwrap(),
    }
}

pub async fn create_item(pool: &PgPool, title: &str, price: i64) -> CatalogItem {
    CatalogItem::create(pool, &item_input(title, price))
        .await
        .expect("item creation should succeed")
}

pub async fn balance_of(pool: &PgPool, user_id: i64) -> Decimal {
    User::find_by_id(pool, user_id).await.unwrap().unwrap().balance
}

/* ---------- HTTP ---------- */

pub fn basic_auth(user: &User) -> String {
    let raw = format!("{}:{}", user.email, PASSWORD);
    format!("Basic {}", general_purpose::STANDARD.encode(raw))
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, auth: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// POST формы. `ajax` добавляет `X-Requested-With: XMLHttpRequest`.
pub fn post_form(uri: &str, auth: &str, fields: &[(&str, &str)], ajax: bool) -> Request<Body> {
    let mut builder = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::AUTHORIZATION, auth);
    if ajax {
        builder = builder.header("x-requested-with", "XMLHttpRequest");
    }
    let body = serde_urlencoded::to_string(fields).unwrap();
    builder.body(Body::from(body)).unwrap()
}

pub fn dec(raw: &str) -> Decimal {
    raw.parse().unwrap()
}
