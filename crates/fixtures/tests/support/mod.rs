//! In-process stand-in for the nursery backend
//!
//! Keeps categories, plants and sales in memory, enforces the same foreign
//! keys as the real service (409 on delete while referenced) and counts
//! logins and requests so tests can assert on traffic.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use nursery_fixtures::FixtureConfig;

pub const ADMIN_TOKEN: &str = "tok-admin";
pub const USER_TOKEN: &str = "tok-user";

#[derive(Debug, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Plant {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
    pub category: i64,
}

#[derive(Debug, Clone)]
pub struct Sale {
    pub id: i64,
    pub plant: i64,
    pub quantity: i64,
}

#[derive(Debug)]
pub struct Backend {
    next_id: i64,
    pub categories: Vec<Category>,
    pub plants: Vec<Plant>,
    pub sales: Vec<Sale>,
    pub login_calls: usize,
    pub login_delay: Duration,
    /// `"METHOD /path"` -> count, for data routes only
    pub requests: HashMap<String, usize>,
    /// Paths of successful deletes, in order
    pub deleted: Vec<String>,
    /// Statuses answered to the next data requests, front first
    pub fail_next: Vec<u16>,
    pub reject_creates: Option<(u16, String)>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            next_id: 100,
            categories: Vec::new(),
            plants: Vec::new(),
            sales: Vec::new(),
            login_calls: 0,
            login_delay: Duration::from_millis(50),
            requests: HashMap::new(),
            deleted: Vec::new(),
            fail_next: Vec::new(),
            reject_creates: None,
        }
    }
}

impl Backend {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_category(&mut self, name: &str, parent: Option<i64>) -> i64 {
        let id = self.allocate();
        self.insert_category(id, name, parent);
        id
    }

    /// Insert with a chosen id, e.g. to place seed data below the protected threshold.
    pub fn insert_category(&mut self, id: i64, name: &str, parent: Option<i64>) {
        self.categories.push(Category {
            id,
            name: name.to_string(),
            parent,
        });
    }

    pub fn add_plant(&mut self, name: &str, category: i64, quantity: i64) -> i64 {
        let id = self.allocate();
        self.plants.push(Plant {
            id,
            name: name.to_string(),
            price: 100.0,
            quantity,
            category,
        });
        id
    }

    pub fn add_sale(&mut self, plant: i64, quantity: i64) -> i64 {
        let id = self.allocate();
        self.sales.push(Sale { id, plant, quantity });
        id
    }

    pub fn request_count(&self, key: &str) -> usize {
        self.requests.get(key).copied().unwrap_or(0)
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    fn category_json(&self, c: &Category) -> Value {
        let parent = c.parent.and_then(|pid| {
            self.categories
                .iter()
                .find(|p| p.id == pid)
                .map(|p| json!({ "id": p.id, "name": p.name }))
        });
        json!({ "id": c.id, "name": c.name, "parent": parent })
    }

    fn plant_json(&self, p: &Plant) -> Value {
        let category = self
            .categories
            .iter()
            .find(|c| c.id == p.category)
            .map(|c| json!({ "id": c.id, "name": c.name }));
        json!({
            "id": p.id,
            "name": p.name,
            "price": p.price,
            "quantity": p.quantity,
            "category": category,
        })
    }

    fn sale_json(&self, s: &Sale) -> Value {
        let plant = self
            .plants
            .iter()
            .find(|p| p.id == s.plant)
            .map(|p| json!({ "id": p.id, "name": p.name }));
        json!({ "id": s.id, "plant": plant, "quantity": s.quantity })
    }
}

type Shared = Arc<Mutex<Backend>>;

pub struct FakeBackend {
    pub addr: SocketAddr,
    pub state: Shared,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(Backend::default()));
        let app = Router::new().nest("/api", routes(state.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, handle }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Defaults pointed at this backend with millisecond retry backoff.
    pub fn config(&self) -> FixtureConfig {
        let mut config = FixtureConfig::default();
        config.api.base_url = self.base_url();
        config.api.retry_backoff_ms = 1;
        config
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Backend) -> R) -> R {
        f(&mut self.state.lock())
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn routes(state: Shared) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/health", get(health))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/page", get(page_categories))
        .route("/categories/:id", delete(delete_category))
        .route("/plants", get(list_plants))
        .route("/plants/category/:id", post(create_plant))
        .route("/plants/:id", delete(delete_plant))
        .route("/sales", get(list_sales))
        .route("/sales/plant/:id", post(create_sale))
        .route("/sales/:id", delete(delete_sale))
        .with_state(state)
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": status.as_u16(), "message": message }))).into_response()
}

/// Count the request, apply injected failures, then check the bearer token.
fn gate(backend: &mut Backend, headers: &HeaderMap, key: &str, admin_only: bool) -> Result<(), Response> {
    *backend.requests.entry(key.to_string()).or_default() += 1;

    if !backend.fail_next.is_empty() {
        let status = backend.fail_next.remove(0);
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Err(error(status, "injected failure"));
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(ADMIN_TOKEN) => Ok(()),
        Some(USER_TOKEN) if !admin_only => Ok(()),
        Some(USER_TOKEN) => Err(error(StatusCode::FORBIDDEN, "Forbidden")),
        _ => Err(error(StatusCode::UNAUTHORIZED, "Unauthorized")),
    }
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let delay = {
        let mut backend = state.lock();
        backend.login_calls += 1;
        backend.login_delay
    };
    tokio::time::sleep(delay).await;

    let user = body["username"].as_str().unwrap_or_default();
    let pass = body["password"].as_str().unwrap_or_default();
    match (user, pass) {
        ("admin", "admin123") => Json(json!({ "token": ADMIN_TOKEN })).into_response(),
        ("testuser", "test123") => Json(json!({ "token": USER_TOKEN })).into_response(),
        _ => error(StatusCode::UNAUTHORIZED, "Invalid credentials"),
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_categories(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut backend = state.lock();
    if let Err(r) = gate(&mut backend, &headers, "GET /categories", false) {
        return r;
    }
    let items: Vec<Value> = backend.categories.iter().map(|c| backend.category_json(c)).collect();
    Json(Value::Array(items)).into_response()
}

async fn page_categories(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut backend = state.lock();
    if let Err(r) = gate(&mut backend, &headers, "GET /categories/page", false) {
        return r;
    }
    let items: Vec<Value> = backend.categories.iter().map(|c| backend.category_json(c)).collect();
    let total = items.len();
    Json(json!({ "content": items, "totalElements": total, "totalPages": 1 })).into_response()
}

async fn create_category(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut backend = state.lock();
    if let Err(r) = gate(&mut backend, &headers, "POST /categories", true) {
        return r;
    }
    if let Some((status, message)) = backend.reject_creates.clone() {
        return error(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST), &message);
    }

    let name = body["name"].as_str().unwrap_or_default().to_string();
    let parent = body["parent"]["id"].as_i64();
    if name.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Category name is required");
    }
    if parent.map_or(false, |pid| !backend.categories.iter().any(|c| c.id == pid)) {
        return error(StatusCode::NOT_FOUND, "Parent category not found");
    }
    if backend.categories.iter().any(|c| c.name == name && c.parent == parent) {
        return error(StatusCode::BAD_REQUEST, "Category already exists");
    }

    let id = backend.add_category(&name, parent);
    let created = backend.categories.iter().find(|c| c.id == id).cloned();
    match created {
        Some(c) => (StatusCode::CREATED, Json(backend.category_json(&c))).into_response(),
        None => error(StatusCode::INTERNAL_SERVER_ERROR, "lost category"),
    }
}

async fn delete_category(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    let mut backend = state.lock();
    if let Err(r) = gate(&mut backend, &headers, "DELETE /categories", true) {
        return r;
    }
    if !backend.categories.iter().any(|c| c.id == id) {
        return error(StatusCode::NOT_FOUND, "Category not found");
    }
    if backend.categories.iter().any(|c| c.parent == Some(id)) {
        return error(StatusCode::CONFLICT, "Category has sub-categories");
    }
    if backend.plants.iter().any(|p| p.category == id) {
        return error(StatusCode::CONFLICT, "Category has plants");
    }
    backend.categories.retain(|c| c.id != id);
    backend.deleted.push(format!("/categories/{id}"));
    StatusCode::NO_CONTENT.into_response()
}

async fn list_plants(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut backend = state.lock();
    if let Err(r) = gate(&mut backend, &headers, "GET /plants", false) {
        return r;
    }
    let items: Vec<Value> = backend.plants.iter().map(|p| backend.plant_json(p)).collect();
    let total = items.len();
    Json(json!({ "content": items, "totalElements": total, "totalPages": 1 })).into_response()
}

async fn create_plant(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(category): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    let mut backend = state.lock();
    if let Err(r) = gate(&mut backend, &headers, "POST /plants", true) {
        return r;
    }
    if let Some((status, message)) = backend.reject_creates.clone() {
        return error(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST), &message);
    }
    if !backend.categories.iter().any(|c| c.id == category) {
        return error(StatusCode::NOT_FOUND, "Category not found");
    }

    let name = body["name"].as_str().unwrap_or_default().to_string();
    if backend.plants.iter().any(|p| p.name == name && p.category == category) {
        return error(StatusCode::BAD_REQUEST, "Plant already exists in this category");
    }
    let id = backend.add_plant(&name, category, body["quantity"].as_i64().unwrap_or(0));
    if let Some(plant) = backend.plants.iter_mut().find(|p| p.id == id) {
        plant.price = body["price"].as_f64().unwrap_or(0.0);
    }
    let created = backend.plants.iter().find(|p| p.id == id).cloned();
    match created {
        Some(p) => (StatusCode::CREATED, Json(backend.plant_json(&p))).into_response(),
        None => error(StatusCode::INTERNAL_SERVER_ERROR, "lost plant"),
    }
}

async fn delete_plant(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    let mut backend = state.lock();
    if let Err(r) = gate(&mut backend, &headers, "DELETE /plants", true) {
        return r;
    }
    if !backend.plants.iter().any(|p| p.id == id) {
        return error(StatusCode::NOT_FOUND, "Plant not found");
    }
    if backend.sales.iter().any(|s| s.plant == id) {
        return error(StatusCode::CONFLICT, "Plant has sales");
    }
    backend.plants.retain(|p| p.id != id);
    backend.deleted.push(format!("/plants/{id}"));
    StatusCode::NO_CONTENT.into_response()
}

async fn list_sales(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut backend = state.lock();
    if let Err(r) = gate(&mut backend, &headers, "GET /sales", false) {
        return r;
    }
    let items: Vec<Value> = backend.sales.iter().map(|s| backend.sale_json(s)).collect();
    Json(Value::Array(items)).into_response()
}

async fn create_sale(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(plant): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut backend = state.lock();
    if let Err(r) = gate(&mut backend, &headers, "POST /sales", true) {
        return r;
    }
    let quantity: i64 = query.get("quantity").and_then(|q| q.parse().ok()).unwrap_or(0);
    if quantity <= 0 {
        return error(StatusCode::BAD_REQUEST, "Quantity must be positive");
    }
    let Some(stock) = backend.plants.iter().find(|p| p.id == plant).map(|p| p.quantity) else {
        return error(StatusCode::NOT_FOUND, "Plant not found");
    };
    if quantity > stock {
        return error(StatusCode::BAD_REQUEST, "Insufficient stock");
    }

    if let Some(p) = backend.plants.iter_mut().find(|p| p.id == plant) {
        p.quantity -= quantity;
    }
    let id = backend.add_sale(plant, quantity);
    let created = backend.sales.iter().find(|s| s.id == id).cloned();
    match created {
        Some(s) => (StatusCode::CREATED, Json(backend.sale_json(&s))).into_response(),
        None => error(StatusCode::INTERNAL_SERVER_ERROR, "lost sale"),
    }
}

async fn delete_sale(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    let mut backend = state.lock();
    if let Err(r) = gate(&mut backend, &headers, "DELETE /sales", true) {
        return r;
    }
    if !backend.sales.iter().any(|s| s.id == id) {
        return error(StatusCode::NOT_FOUND, "Sale not found");
    }
    backend.sales.retain(|s| s.id != id);
    backend.deleted.push(format!("/sales/{id}"));
    StatusCode::NO_CONTENT.into_response()
}
