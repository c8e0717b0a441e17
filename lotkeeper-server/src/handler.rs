//! Request routing and dispatch to the parking engine.

use crate::api::{
    CreateLotRequest, DailyStatsView, ErrorResponse, FeeResponse, LotQuery, LotView,
    MaintenanceRequest, MessageResponse, SlotResponse, StatusView, VehicleRequest,
};
use crate::error::ServerError;
use crate::metrics::Metrics;
use hyper::{Method, StatusCode};
use lotkeeper_core::{LotId, ParkingEngine};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Known endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    CreateLot,
    Park,
    Unpark,
    Status,
    Maintenance,
    Stats,
    Health,
}

impl Route {
    pub fn resolve(path: &str) -> Option<Self> {
        match path {
            "/createParkingLot" => Some(Route::CreateLot),
            "/parkVehicle" => Some(Route::Park),
            "/unparkVehicle" => Some(Route::Unpark),
            "/viewParkingLotStatus" => Some(Route::Status),
            "/toggleMaintenance" => Some(Route::Maintenance),
            "/getTotalStats" => Some(Route::Stats),
            "/health" => Some(Route::Health),
            _ => None,
        }
    }

    /// The only method the endpoint accepts.
    pub fn method(&self) -> Method {
        match self {
            Route::Status | Route::Stats | Route::Health => Method::GET,
            _ => Method::POST,
        }
    }

    /// Label used in metrics and logs.
    pub fn operation_name(&self) -> &'static str {
        match self {
            Route::CreateLot => "create_lot",
            Route::Park => "park_vehicle",
            Route::Unpark => "unpark_vehicle",
            Route::Status => "lot_status",
            Route::Maintenance => "toggle_maintenance",
            Route::Stats => "total_stats",
            Route::Health => "health",
        }
    }
}

/// A rendered HTTP response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    fn json<T: Serialize>(value: &T) -> Result<Self, ServerError> {
        Ok(Self {
            status: StatusCode::OK,
            content_type: "application/json",
            body: serde_json::to_vec(value)?,
        })
    }

    fn text(body: &'static str) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/plain",
            body: body.as_bytes().to_vec(),
        }
    }

    /// Renders an error as `{"code", "message"}`.
    pub fn error(err: &ServerError) -> Self {
        let payload = ErrorResponse {
            code: err.error_code(),
            message: err.to_string(),
        };
        Self {
            status: err.status(),
            content_type: "application/json",
            body: serde_json::to_vec(&payload).unwrap_or_default(),
        }
    }
}

/// Handles API requests against a parking engine.
pub struct RequestHandler {
    engine: Arc<ParkingEngine>,
    metrics: Option<Arc<Metrics>>,
}

impl RequestHandler {
    pub fn new(engine: Arc<ParkingEngine>) -> Self {
        Self {
            engine,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn engine(&self) -> &Arc<ParkingEngine> {
        &self.engine
    }

    /// Handles one request.
    pub fn handle(&self, method: &Method, path: &str, query: Option<&str>, body: &[u8]) -> Reply {
        let Some(route) = Route::resolve(path) else {
            let err = ServerError::RouteNotFound(path.to_string());
            if let Some(ref metrics) = self.metrics {
                metrics.errors_total.with_label_values(&[err.error_code()]).inc();
            }
            tracing::debug!("{} {} -> {}", method, path, err);
            return Reply::error(&err);
        };

        let op_name = route.operation_name();
        let timer = self.metrics.as_ref().map(|m| {
            m.request_duration
                .with_label_values(&[op_name])
                .start_timer()
        });

        let result = if *method == route.method() {
            self.dispatch(route, query, body)
        } else {
            Err(ServerError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            })
        };

        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[op_name]).inc();
            if let Err(ref e) = result {
                metrics.errors_total.with_label_values(&[e.error_code()]).inc();
            }
        }
        drop(timer);

        match result {
            Ok(reply) => reply,
            Err(e) => {
                if e.status().is_server_error() {
                    tracing::error!("{} failed: {}", op_name, e);
                } else {
                    tracing::warn!("{} rejected: {}", op_name, e);
                }
                Reply::error(&e)
            }
        }
    }

    fn dispatch(
        &self,
        route: Route,
        query: Option<&str>,
        body: &[u8],
    ) -> Result<Reply, ServerError> {
        match route {
            Route::CreateLot => {
                let req: CreateLotRequest = parse_body(body)?;
                let lot = self.engine.create_lot(req.total_spaces)?;
                if let Some(ref metrics) = self.metrics {
                    metrics.lots_created_total.inc();
                }
                Reply::json(&LotView::from(&lot))
            }

            Route::Park => {
                let req: VehicleRequest = parse_body(body)?;
                let slot_number = self
                    .engine
                    .park(LotId(req.parking_lot_id), &req.license_plate)?;
                if let Some(ref metrics) = self.metrics {
                    metrics.vehicles_parked_total.inc();
                }
                Reply::json(&SlotResponse { slot_number })
            }

            Route::Unpark => {
                let req: VehicleRequest = parse_body(body)?;
                let tx = self
                    .engine
                    .unpark(LotId(req.parking_lot_id), &req.license_plate)?;
                if let Some(ref metrics) = self.metrics {
                    metrics.fees_collected_total.inc_by(tx.fee as f64);
                }
                Reply::json(&FeeResponse { fee: tx.fee })
            }

            Route::Status => {
                let lot = lot_query(query, body)?;
                let status = self.engine.status(lot.lot_id())?;
                Reply::json(&StatusView::from(&status))
            }

            Route::Maintenance => {
                let req: MaintenanceRequest = parse_body(body)?;
                self.engine.set_maintenance(
                    LotId(req.parking_lot_id),
                    req.slot_number,
                    req.in_maintenance,
                )?;
                Reply::json(&MessageResponse {
                    message: "Maintenance mode toggled successfully".to_string(),
                })
            }

            Route::Stats => {
                let lot = lot_query(query, body)?;
                let stats = self.engine.report(lot.lot_id())?;
                let view: Vec<DailyStatsView> = stats.iter().map(DailyStatsView::from).collect();
                Reply::json(&view)
            }

            Route::Health => Ok(Reply::text("OK")),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ServerError::InvalidRequest("missing request body".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Reads the lot id from `?parkingLotID=` if present, else from the body.
fn lot_query(query: Option<&str>, body: &[u8]) -> Result<LotQuery, ServerError> {
    let from_query = query.and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "parkingLotID")
            .map(|(_, value)| value)
    });

    match from_query {
        Some(value) => value
            .parse()
            .map(|parking_lot_id| LotQuery { parking_lot_id })
            .map_err(|_| ServerError::InvalidRequest(format!("invalid parkingLotID '{}'", value))),
        None => parse_body(body),
    }
}
