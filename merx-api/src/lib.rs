use axum::{
    http::Method,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod error;
pub mod logs;
pub mod middleware;
pub mod orders;
pub mod payments;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let admin_routes = Router::new()
        .route("/api/admin/orders", get(admin::list_all_orders))
        .route("/api/admin/orders/{id}", get(admin::get_order))
        .route("/api/admin/orders/{id}/status", put(admin::update_order_status))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth_middleware,
        ));

    let customer_routes = Router::new()
        .route("/api/orders/mine", get(orders::list_my_orders))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::customer_auth_middleware,
        ));

    Router::new()
        .merge(auth::routes())
        .route("/api/orders", post(orders::create_order))
        .route("/api/orders/{id}", get(orders::get_order))
        .route("/api/payments/intent", post(payments::create_payment_intent))
        .route("/api/payments/confirm", post(payments::confirm_payment))
        .route("/api/logs", post(logs::ingest_client_log))
        .merge(customer_routes)
        .merge(admin_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
