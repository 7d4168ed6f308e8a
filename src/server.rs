//! REST control API.
//!
//! Thin glue over the load controller: each route translates 1:1 onto one
//! controller operation, and engine errors surface as 400 responses with a
//! `detail` message. Successful mutations also push the new settings to the
//! MQTT bridge when one is configured.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};

use crate::controller::LoadController;
use crate::error::LoadError;
use crate::kernels::ComputeKernel;
use crate::metrics::CpuMetrics;
use crate::mqtt::MqttPublisher;

pub struct AppState {
    pub controller: Arc<LoadController>,
    pub mqtt: Option<MqttPublisher>,
    /// Latest sample from the background monitor task.
    pub metrics: Arc<Mutex<CpuMetrics>>,
}

#[derive(Deserialize)]
struct ThreadLoadRequest {
    load_percent: f64,
}

#[derive(Deserialize)]
struct ThreadCountRequest {
    num_threads: i64,
}

#[derive(Deserialize)]
struct ComputationTypeRequest {
    computation_type: String,
}

#[derive(Serialize)]
struct ThreadsStatusResponse {
    num_threads: usize,
    loads: BTreeMap<usize, f64>,
}

#[derive(Serialize)]
struct ComputationTypeResponse {
    computation_type: &'static str,
    available_types: Vec<&'static str>,
}

impl ResponseError for LoadError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::BadRequest().json(serde_json::json!({ "detail": self.to_string() }))
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/threads", web::get().to(get_threads_status))
        .route("/api/threads", web::post().to(set_thread_count))
        .route("/api/threads/{thread_id}/load", web::put().to(set_thread_load))
        .route("/api/threads/load/all", web::post().to(set_all_thread_loads))
        .route("/api/cpu-metrics", web::get().to(get_cpu_metrics))
        .route("/api/computation-type", web::get().to(get_computation_type))
        .route("/api/computation-type", web::put().to(set_computation_type));
}

async fn get_threads_status(state: web::Data<AppState>) -> HttpResponse {
    let loads = state.controller.get_all_loads();
    HttpResponse::Ok().json(ThreadsStatusResponse {
        num_threads: loads.len(),
        loads: loads.into_iter().enumerate().collect(),
    })
}

async fn set_thread_count(
    state: web::Data<AppState>,
    body: web::Json<ThreadCountRequest>,
) -> Result<HttpResponse, LoadError> {
    let requested = body.num_threads;
    if requested <= 0 {
        return Err(LoadError::InvalidArgument(
            "number of threads must be positive".to_string(),
        ));
    }
    state.controller.set_num_threads(requested as usize)?;
    publish_settings(&state).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "num_threads": requested,
        "message": format!("Thread count set to {}", requested),
    })))
}

async fn set_thread_load(
    state: web::Data<AppState>,
    path: web::Path<usize>,
    body: web::Json<ThreadLoadRequest>,
) -> Result<HttpResponse, LoadError> {
    let thread_id = path.into_inner();
    state.controller.set_thread_load(thread_id, body.load_percent)?;
    publish_settings(&state).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "thread_id": thread_id,
        "load_percent": body.load_percent,
        "message": format!("Thread {} load set to {}%", thread_id, body.load_percent),
    })))
}

async fn set_all_thread_loads(
    state: web::Data<AppState>,
    body: web::Json<ThreadLoadRequest>,
) -> Result<HttpResponse, LoadError> {
    state.controller.set_all_loads(body.load_percent)?;
    publish_settings(&state).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "load_percent": body.load_percent,
        "num_threads": state.controller.get_num_threads(),
        "message": format!("All threads set to {}%", body.load_percent),
    })))
}

async fn get_cpu_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics.lock().unwrap().clone();
    HttpResponse::Ok().json(metrics)
}

async fn get_computation_type(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ComputationTypeResponse {
        computation_type: state.controller.get_kernel().as_str(),
        available_types: ComputeKernel::ALL.iter().map(|k| k.as_str()).collect(),
    })
}

async fn set_computation_type(
    state: web::Data<AppState>,
    body: web::Json<ComputationTypeRequest>,
) -> Result<HttpResponse, LoadError> {
    let kernel: ComputeKernel = body.computation_type.parse()?;
    state.controller.set_kernel(kernel);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "computation_type": kernel.as_str(),
        "message": format!("Computation type set to {}", kernel.as_str()),
    })))
}

async fn publish_settings(state: &AppState) {
    if let Some(mqtt) = &state.mqtt {
        let loads = state.controller.get_all_loads();
        mqtt.publish_load_settings(loads.len(), &loads).await;
    }
}
