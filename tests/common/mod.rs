//! Mock Squirrels server for the integration tests.

#![allow(dead_code)]

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use squirrels_studio::context::RecordingNotifier;
use squirrels_studio::{ApiClient, AppContext, Explorer};

pub const PROJECT: &str = "/api/squirrels-v0/project/demo/v1";
pub const TOTAL_ROWS: usize = 25;
pub const TOKEN: &str = "tok-alice";
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

#[derive(Default)]
pub struct MockState {
    /// Answer authenticated calls as a different user
    pub impersonate: AtomicBool,
    /// Treat the bearer token as revoked
    pub reject_token: AtomicBool,
    /// Fail result requests with a 500
    pub fail_results: AtomicBool,
    /// Fail the slow (country=CA) refresh once its delay is over
    pub fail_slow_refresh: AtomicBool,
    pub result_hits: AtomicUsize,
}

enum Caller {
    Guest,
    User(&'static str),
    Rejected,
}

fn caller(state: &MockState, headers: &HeaderMap) -> Caller {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match bearer {
        None => Caller::Guest,
        Some(token) if token != TOKEN || state.reject_token.load(Ordering::SeqCst) => Caller::Rejected,
        Some(_) if state.impersonate.load(Ordering::SeqCst) => Caller::User("bob"),
        Some(_) => Caller::User("alice"),
    }
}

fn respond(caller: &Caller, status: StatusCode, body: Value) -> Response {
    match caller {
        Caller::User(name) => (status, [("Applied-Username", *name)], Json(body)).into_response(),
        _ => (status, Json(body)).into_response(),
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Not authenticated"}))).into_response()
}

fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

pub fn country_param() -> Value {
    json!({
        "widget_type": "single_select",
        "name": "country",
        "label": "Country",
        "trigger_refresh": true,
        "options": [{"id": "US", "label": "United States"}, {"id": "CA", "label": "Canada"}],
        "selected_id": "US"
    })
}

pub fn city_param(country: &str) -> Value {
    let options = match country {
        "CA" => json!([{"id": "TOR", "label": "Toronto"}, {"id": "VAN", "label": "Vancouver"}]),
        _ => json!([{"id": "NYC", "label": "New York"}, {"id": "SF", "label": "San Francisco"}]),
    };
    let first = options[0]["id"].clone();
    json!({
        "widget_type": "single_select",
        "name": "city",
        "label": "City",
        "parent_names": ["country"],
        "options": options,
        "selected_id": first
    })
}

pub fn year_param() -> Value {
    json!({"widget_type": "text", "name": "year", "label": "Year", "entered_text": "2024"})
}

fn table(total: usize, offset: usize, limit: usize, extra: &str) -> Value {
    let end = (offset + limit).min(total);
    let rows: Vec<Value> = (offset..end).map(|i| json!([i, format!("row {}{}", i, extra)])).collect();
    json!({
        "schema": {"fields": [
            {"name": "id", "type": "integer", "category": "dimension"},
            {"name": "label", "type": "string", "category": "misc"}
        ]},
        "total_num_rows": total,
        "data_details": {"num_rows": rows.len(), "orientation": "rows"},
        "data": rows
    })
}

async fn metadata() -> Json<Value> {
    Json(json!({
        "name": "demo",
        "version": "v1",
        "label": "Demo Project",
        "description": "Sales demo",
        "squirrels_version": "0.5.1"
    }))
}

async fn old_metadata() -> Json<Value> {
    Json(json!({"name": "old", "version": "v1", "squirrels_version": "0.4.0"}))
}

async fn catalog() -> Json<Value> {
    Json(json!({
        "parameters": [],
        "datasets": [{
            "name": "sales",
            "label": "Sales",
            "parameters_path": format!("{}/dataset/sales/parameters", PROJECT),
            "result_path": format!("{}/dataset/sales", PROJECT)
        }],
        "dashboards": [{
            "name": "map",
            "label": "Map",
            "parameters_path": format!("{}/dashboard/map/parameters", PROJECT),
            "result_path": format!("{}/dashboard/map", PROJECT),
            "result_format": "png"
        }],
        "connections": [{"name": "default", "label": "Warehouse"}],
        "models": [
            {"name": "orders", "model_type": "source", "is_queryable": true},
            {"name": "sales_fact", "model_type": "federate", "is_queryable": false},
            {"name": "broken_view", "model_type": "dbview", "is_queryable": false}
        ],
        "lineage": []
    }))
}

async fn sales_parameters(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let who = caller(&state, &headers);
    if let Caller::Rejected = who {
        return unauthorized();
    }
    let body = match query_value(&query, "x_parent_param") {
        Some("country") => {
            let country = query_value(&query, "country").unwrap_or("US").to_string();
            if country == "CA" {
                tokio::time::sleep(Duration::from_millis(300)).await;
                if state.fail_slow_refresh.load(Ordering::SeqCst) {
                    return respond(&who, StatusCode::INTERNAL_SERVER_ERROR, json!({"message": "refresh failed"}));
                }
            }
            json!({"parameters": [city_param(&country)]})
        }
        _ => json!({"parameters": [country_param(), city_param("US"), year_param()]}),
    };
    respond(&who, StatusCode::OK, body)
}

async fn sales_results(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    state.result_hits.fetch_add(1, Ordering::SeqCst);
    let who = caller(&state, &headers);
    if let Caller::Rejected = who {
        return unauthorized();
    }
    if state.fail_results.load(Ordering::SeqCst) {
        return respond(&who, StatusCode::INTERNAL_SERVER_ERROR, json!({"detail": "boom"}));
    }
    if query_value(&query, "year") == Some("fail") {
        return respond(&who, StatusCode::BAD_REQUEST, json!({"message": "bad year"}));
    }
    let offset = query_value(&query, "x_offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit = query_value(&query, "x_limit").and_then(|v| v.parse().ok()).unwrap_or(1000);
    respond(&who, StatusCode::OK, table(TOTAL_ROWS, offset, limit, ""))
}

async fn empty_parameters(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let who = caller(&state, &headers);
    if let Caller::Rejected = who {
        return unauthorized();
    }
    respond(&who, StatusCode::OK, json!({"parameters": []}))
}

async fn map_result(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    match caller(&state, &headers) {
        Caller::User(name) => (
            StatusCode::OK,
            [("Applied-Username", name), ("Content-Type", "image/png")],
            PNG_BYTES,
        )
            .into_response(),
        _ => unauthorized(),
    }
}

async fn query_models(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let who = caller(&state, &headers);
    if !matches!(who, Caller::User(_)) {
        return unauthorized();
    }
    let sql = query_value(&query, "x_sql_query").unwrap_or_default().to_string();
    respond(&who, StatusCode::OK, table(3, 0, 3, &format!(" {}", sql)))
}

async fn login(mut multipart: Multipart) -> Response {
    let mut fields = HashMap::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let value = field.text().await.unwrap_or_default();
        fields.insert(name, value);
    }
    let ok = fields.get("username").map(String::as_str) == Some("alice")
        && fields.get("password").map(String::as_str) == Some("pw");
    if ok {
        (
            [(header::SET_COOKIE, "sid=alice; Path=/")],
            Json(json!({"access_token": TOKEN, "username": "alice"})),
        )
            .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid username or password"})),
        )
            .into_response()
    }
}

async fn userinfo(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let who = caller(&state, &headers);
    match who {
        Caller::User(name) => respond(&who, StatusCode::OK, json!({"username": name, "access_level": "admin"})),
        _ => unauthorized(),
    }
}

/// Reports the Cookie header the client sent
async fn cookie_echo(headers: HeaderMap) -> Json<Value> {
    let cookie = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()).unwrap_or_default();
    Json(json!({"cookie": cookie}))
}

async fn user_fields(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let who = caller(&state, &headers);
    if !matches!(who, Caller::User(_)) {
        return unauthorized();
    }
    let fields = json!([
        {"name": "username", "type": "string"},
        {"name": "password", "type": "string"},
        {"name": "access_level", "type": "string", "enum": ["admin", "member", "guest"]},
        {"name": "team", "type": "string", "nullable": true, "default": null},
        {"name": "age", "type": "integer", "default": 30}
    ]);
    respond(&who, StatusCode::OK, fields)
}

async fn compiled_model(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let who = caller(&state, &headers);
    if let Caller::Rejected = who {
        return unauthorized();
    }
    match name.as_str() {
        "sales_fact" => {
            let country = query_value(&query, "country").unwrap_or("US");
            let body = json!({
                "language": "sql",
                "definition": format!("SELECT * FROM orders WHERE country = '{}'", country),
                "placeholders": {"country": country}
            });
            respond(&who, StatusCode::OK, body)
        }
        _ => respond(&who, StatusCode::BAD_REQUEST, json!({"message": format!("Could not compile {}", name)})),
    }
}

pub async fn spawn_server() -> (String, Arc<MockState>) {
    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route(PROJECT, get(metadata))
        .route("/api/squirrels-v0/project/old/v1", get(old_metadata))
        .route(&format!("{}/data-catalog", PROJECT), get(catalog))
        .route(&format!("{}/dataset/sales/parameters", PROJECT), get(sales_parameters))
        .route(&format!("{}/dataset/sales", PROJECT), get(sales_results))
        .route(&format!("{}/dashboard/map/parameters", PROJECT), get(empty_parameters))
        .route(&format!("{}/dashboard/map", PROJECT), get(map_result))
        .route(&format!("{}/parameters", PROJECT), get(empty_parameters))
        .route(&format!("{}/query-models", PROJECT), get(query_models))
        .route(&format!("{}/login", PROJECT), post(login))
        .route(&format!("{}/auth/userinfo", PROJECT), get(userinfo))
        .route(&format!("{}/auth/user-management/user-fields", PROJECT), get(user_fields))
        .route(&format!("{}/compiled-models/:name", PROJECT), get(compiled_model))
        .route(&format!("{}/cookie-echo", PROJECT), get(cookie_echo))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

pub struct Harness {
    pub explorer: Explorer,
    pub client: Arc<ApiClient>,
    pub ctx: Arc<AppContext>,
    pub notices: Arc<RecordingNotifier>,
    pub state: Arc<MockState>,
}

pub async fn harness() -> Harness {
    let (host, state) = spawn_server().await;
    let notices = Arc::new(RecordingNotifier::default());
    let ctx = Arc::new(AppContext::new(notices.clone()));
    let client = Arc::new(ApiClient::new(&host, ctx.clone()).unwrap());
    let explorer = Explorer::new(client.clone());
    Harness {
        explorer,
        client,
        ctx,
        notices,
        state,
    }
}
