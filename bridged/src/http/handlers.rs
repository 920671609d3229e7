use std::str::FromStr;

use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use bridge_core::{
    accessory::{AccessorySnapshot, CharacteristicKind},
    model::DeviceUuid,
};

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn list_accessories(State(app): State<AppState>) -> impl IntoResponse {
    let snapshots: Vec<AccessorySnapshot> = app.host.list().iter().map(|a| a.snapshot()).collect();
    Json(snapshots)
}

pub async fn get_accessory(
    State(app): State<AppState>,
    Path(uuid): Path<String>,
) -> impl IntoResponse {
    match app.host.get(&DeviceUuid(uuid)) {
        Some(a) => Json(a.snapshot()).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown accessory").into_response(),
    }
}

#[derive(serde::Deserialize)]
pub struct SetCharacteristicBody {
    value: serde_json::Value,
}

pub async fn set_characteristic(
    State(app): State<AppState>,
    Path((uuid, kind)): Path<(String, String)>,
    Json(body): Json<SetCharacteristicBody>,
) -> impl IntoResponse {
    let Ok(kind) = CharacteristicKind::from_str(&kind) else {
        return (StatusCode::BAD_REQUEST, "unknown characteristic").into_response();
    };
    let Some(accessory) = app.host.get(&DeviceUuid(uuid)) else {
        return (StatusCode::NOT_FOUND, "unknown accessory").into_response();
    };
    let Some(characteristic) = accessory.characteristic(kind) else {
        return (StatusCode::NOT_FOUND, "characteristic not present").into_response();
    };

    let value = match kind.coerce(&body.value) {
        Ok(v) => v,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    tracing::info!(uuid = %accessory.identity, %kind, ?value, "set requested");
    match characteristic.handle_set(value) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}
