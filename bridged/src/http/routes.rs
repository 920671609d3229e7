use crate::{http::handlers as h, state::AppState};
use axum::{
    Router,
    routing::{get, put},
};

pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(h::healthz))
        .route("/accessories", get(h::list_accessories))
        .route("/accessories/{uuid}", get(h::get_accessory))
        .route("/accessories/{uuid}/characteristics/{kind}", put(h::set_characteristic))
        .with_state(state)
}
