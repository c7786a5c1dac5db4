//! JSON query surface over the current snapshot.
//!
//! | Route                     | Purpose                                   |
//! |---------------------------|-------------------------------------------|
//! | `GET /api/trains`         | every train in the snapshot plus summary  |
//! | `GET /api/trains/delayed` | significant trains only                   |
//! | `GET /api/summary`        | aggregate counts                          |
//! | `GET /api/train?number=`  | one train by advertised identifier        |
//! | `GET/POST /api/update`    | run a cycle now                           |
//! | `GET /api/start?interval=`| start the polling loop (minutes)          |
//! | `GET /api/stop`           | stop the polling loop                     |
//! | `GET /api/status`         | polling loop state                        |

use actix_web::http::{Method, StatusCode};
use actix_web::middleware::DefaultHeaders;
use actix_web::{HttpRequest, HttpResponse, Resource, web};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{MAX_INTERVAL_MINUTES, interval_from_minutes};
use crate::monitor::{CycleError, CycleResult, LoopState, Monitor};
use crate::record::NormalizedRecord;
use crate::summary::Summary;

const ENDPOINTS: [&str; 8] = [
    "/api/trains - Get all trains",
    "/api/trains/delayed - Get delayed trains only",
    "/api/summary - Get summary statistics",
    "/api/train?number=XXXX - Get specific train",
    "/api/update - Force data update",
    "/api/start?interval=1 - Start auto-update",
    "/api/stop - Stop auto-update",
    "/api/status - Auto-update state",
];

#[derive(Serialize)]
struct TrainsResponse<'a> {
    trains: &'a [NormalizedRecord],
    summary: Summary,
    total_count: usize,
    last_updated: Option<NaiveDateTime>,
}

#[derive(Serialize)]
struct DelayedResponse<'a> {
    trains: Vec<&'a NormalizedRecord>,
    count: usize,
    last_updated: Option<NaiveDateTime>,
}

#[derive(Serialize)]
struct TrainLookup<'a> {
    train: Option<&'a NormalizedRecord>,
    found: bool,
    last_updated: Option<NaiveDateTime>,
}

#[derive(Serialize)]
struct UpdateResponse {
    status: &'static str,
    message: String,
    timestamp: NaiveDateTime,
    #[serde(flatten)]
    result: Option<CycleResult>,
}

#[derive(Serialize)]
struct StatusResponse {
    state: &'static str,
    interval_minutes: Option<u64>,
    last_updated: Option<NaiveDateTime>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_endpoints: Option<[&'static str; 8]>,
}

#[derive(Deserialize)]
pub struct TrainQuery {
    number: Option<String>,
}

#[derive(Deserialize)]
pub struct StartQuery {
    interval: Option<u64>,
}

/// Registers every `/api` route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(endpoint("/trains").route(web::get().to(trains)))
            .service(endpoint("/trains/delayed").route(web::get().to(delayed_trains)))
            .service(endpoint("/summary").route(web::get().to(summary)))
            .service(endpoint("/train").route(web::get().to(train_by_number)))
            .service(
                endpoint("/update")
                    .route(web::get().to(force_update))
                    .route(web::post().to(force_update)),
            )
            .service(endpoint("/start").route(web::get().to(start)))
            .service(endpoint("/stop").route(web::get().to(stop)))
            .service(endpoint("/status").route(web::get().to(status))),
    );
}

/// Resource at `path` that already answers CORS preflight requests.
fn endpoint(path: &str) -> Resource {
    web::resource(path).route(web::method(Method::OPTIONS).to(preflight))
}

async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

/// Headers letting browser pages on other origins call the API.
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .add(("Access-Control-Allow-Headers", "Content-Type"))
}

async fn trains(monitor: web::Data<Monitor>) -> HttpResponse {
    let snapshot = monitor.store().current();
    HttpResponse::Ok().json(TrainsResponse {
        trains: &snapshot.records,
        summary: snapshot.summary(),
        total_count: snapshot.records.len(),
        last_updated: snapshot.last_updated,
    })
}

async fn delayed_trains(monitor: web::Data<Monitor>) -> HttpResponse {
    let snapshot = monitor.store().current();
    let trains: Vec<_> = snapshot.significant().collect();
    HttpResponse::Ok().json(DelayedResponse {
        count: trains.len(),
        trains,
        last_updated: snapshot.last_updated,
    })
}

async fn summary(monitor: web::Data<Monitor>) -> HttpResponse {
    HttpResponse::Ok().json(monitor.store().current().summary())
}

async fn train_by_number(monitor: web::Data<Monitor>, query: web::Query<TrainQuery>) -> HttpResponse {
    let Some(number) = query.number.as_deref().filter(|n| !n.is_empty()) else {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Train number required",
            available_endpoints: None,
        });
    };

    let snapshot = monitor.store().current();
    let train = snapshot.find_train(number);
    HttpResponse::Ok().json(TrainLookup {
        found: train.is_some(),
        train,
        last_updated: snapshot.last_updated,
    })
}

async fn force_update(monitor: web::Data<Monitor>) -> HttpResponse {
    let timestamp = Local::now().naive_local();
    match monitor.force_update().await {
        Ok(result) => HttpResponse::Ok().json(UpdateResponse {
            status: "success",
            message: "Data updated successfully".to_string(),
            timestamp,
            result: Some(result),
        }),
        Err(e) => {
            warn!(error = %e, "Forced update failed");
            let status = match e {
                CycleError::Fetch(_) => StatusCode::BAD_GATEWAY,
                CycleError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            HttpResponse::build(status).json(UpdateResponse {
                status: "error",
                message: e.to_string(),
                timestamp,
                result: None,
            })
        }
    }
}

async fn start(monitor: web::Data<Monitor>, query: web::Query<StartQuery>) -> HttpResponse {
    let minutes = query
        .interval
        .unwrap_or(monitor.config().interval_minutes)
        .max(1);
    if minutes > MAX_INTERVAL_MINUTES {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Interval out of range",
            available_endpoints: None,
        });
    }
    let started = monitor.into_inner().start(interval_from_minutes(minutes));

    HttpResponse::Ok().json(serde_json::json!({
        "status": if started { "started" } else { "already_running" },
        "interval": minutes,
    }))
}

async fn stop(monitor: web::Data<Monitor>) -> HttpResponse {
    monitor.stop();
    HttpResponse::Ok().json(serde_json::json!({ "status": "stopped" }))
}

async fn status(monitor: web::Data<Monitor>) -> HttpResponse {
    let (state, interval_minutes) = match monitor.state() {
        LoopState::Running { interval, .. } => ("running", Some(interval.as_secs() / 60)),
        LoopState::Stopped => ("stopped", None),
    };
    HttpResponse::Ok().json(StatusResponse {
        state,
        interval_minutes,
        last_updated: monitor.store().current().last_updated,
    })
}

/// Fallback for unknown paths; also answers CORS preflight requests.
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        return preflight().await;
    }
    HttpResponse::NotFound().json(ErrorResponse {
        error: "Unknown endpoint",
        available_endpoints: Some(ENDPOINTS),
    })
}
