use crate::remi_api::alarm::Alarm;
use crate::remi_api::RemiInfo;
use crate::service::device::Device;
use crate::service::state::StateHandle;
use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

fn response_with_code<T: ToString + std::fmt::Display>(code: StatusCode, err: T) -> Response {
    if !code.is_success() {
        log::error!("err: {err:#}");
    }

    let mut response = Json(serde_json::json!({
        "code": code.as_u16(),
        "msg": format!("{err:#}")
    }))
    .into_response();
    *response.status_mut() = code;
    response
}

fn generic<T: ToString + std::fmt::Display>(err: T) -> Response {
    response_with_code(StatusCode::INTERNAL_SERVER_ERROR, err)
}

fn not_found<T: ToString + std::fmt::Display>(err: T) -> Response {
    response_with_code(StatusCode::NOT_FOUND, err)
}

fn bad_request<T: ToString + std::fmt::Display>(err: T) -> Response {
    response_with_code(StatusCode::BAD_REQUEST, err)
}

async fn resolve_device(state: &StateHandle, id: &str) -> Result<Device, Response> {
    state.resolve_device_read_only(id).await.map_err(not_found)
}

#[derive(Serialize)]
struct DeviceItem {
    id: String,
    name: String,
    temperature: Option<f64>,
    last_polled: Option<DateTime<Utc>>,
    info: Option<RemiInfo>,
}

/// Returns a json array of device information
async fn list_devices(State(state): State<StateHandle>) -> Result<Response, Response> {
    let devices: Vec<_> = state
        .devices()
        .await
        .into_iter()
        .map(|d| DeviceItem {
            name: d.name(),
            temperature: d.temperature().map(|t| t.as_celsius()),
            last_polled: d.last_polled,
            id: d.id,
            info: d.info,
        })
        .collect();

    Ok(Json(devices).into_response())
}

/// Returns the cached alarms of a given device
async fn device_list_alarms(
    State(state): State<StateHandle>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let device = resolve_device(&state, &id).await?;
    let alarms: Vec<Alarm> = state.bedtime_settings_for_device(&device.id).await;
    Ok(Json(alarms).into_response())
}

/// Turns on the night light of a given device
async fn device_light_on(
    State(state): State<StateHandle>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let device = resolve_device(&state, &id).await?;

    state
        .device_light_power_on(&device, true)
        .await
        .map_err(generic)?;

    Ok(response_with_code(StatusCode::OK, "ok"))
}

/// Turns off the night light of a given device
async fn device_light_off(
    State(state): State<StateHandle>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let device = resolve_device(&state, &id).await?;

    state
        .device_light_power_on(&device, false)
        .await
        .map_err(generic)?;

    Ok(response_with_code(StatusCode::OK, "ok"))
}

/// Sets the luminosity of a given device
async fn device_set_luminosity(
    State(state): State<StateHandle>,
    Path((id, level)): Path<(String, i64)>,
) -> Result<Response, Response> {
    let device = resolve_device(&state, &id).await?;

    state
        .device_set_luminosity(&device, level)
        .await
        .map_err(generic)?;

    Ok(response_with_code(StatusCode::OK, "ok"))
}

/// Sets the volume of a given device
async fn device_set_volume(
    State(state): State<StateHandle>,
    Path((id, level)): Path<(String, i64)>,
) -> Result<Response, Response> {
    let device = resolve_device(&state, &id).await?;

    state
        .device_set_volume(&device, level)
        .await
        .map_err(generic)?;

    Ok(response_with_code(StatusCode::OK, "ok"))
}

async fn toggle_alarm(state: &StateHandle, id: &str, enabled: bool) -> Result<Response, Response> {
    if id.trim().is_empty() {
        return Err(bad_request("alarm id must not be empty"));
    }
    let ack = state.toggle_alarm(id, enabled).await.map_err(generic)?;
    Ok(Json(ack).into_response())
}

/// Enables the given alarm
async fn alarm_on(
    State(state): State<StateHandle>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    toggle_alarm(&state, &id, true).await
}

/// Disables the given alarm
async fn alarm_off(
    State(state): State<StateHandle>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    toggle_alarm(&state, &id, false).await
}

/// Re-pulls device and alarm data and re-registers with Home Assistant
async fn refresh(State(state): State<StateHandle>) -> Result<Response, Response> {
    state.refresh_all().await.map_err(generic)?;
    Ok(response_with_code(StatusCode::OK, "ok"))
}

fn build_router(state: StateHandle) -> Router {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/device/{id}/alarms", get(device_list_alarms))
        .route("/api/device/{id}/light/on", get(device_light_on))
        .route("/api/device/{id}/light/off", get(device_light_off))
        .route(
            "/api/device/{id}/luminosity/{level}",
            get(device_set_luminosity),
        )
        .route("/api/device/{id}/volume/{level}", get(device_set_volume))
        .route("/api/alarm/{id}/on", get(alarm_on))
        .route("/api/alarm/{id}/off", get(alarm_off))
        .route("/api/refresh", get(refresh))
        .with_state(state)
}

#[cfg(test)]
#[test]
fn test_build_router() {
    // Route syntax is only validated when the router is built,
    // so an axum upgrade that changes it shows up here.
    let _ = build_router(StateHandle::default());
}

pub async fn run_http_server(state: StateHandle, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("run_http_server: binding to port {port}"))?;
    let addr = listener.local_addr()?;
    log::info!("http server addr is {addr:?}");
    if let Err(err) = axum::serve(listener, app).await {
        log::error!("http server stopped: {err:#}");
    }

    Ok(())
}
