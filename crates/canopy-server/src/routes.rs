//! warp filter tree

use crate::dto::{AnalyzeBody, PredictBody, ScanBody, SettingsBody, SyncBody, WatchBody};
use crate::handlers::{self, json_error};
use canopy_core::Canopy;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

/// Largest accepted JSON body
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

fn with_canopy(canopy: Canopy) -> impl Filter<Extract = (Canopy,), Error = Infallible> + Clone {
    warp::any().map(move || canopy.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Every `/api` route, with error recovery, CORS and request tracing
pub fn routes(canopy: Canopy) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path!("api" / "test")
        .and(warp::get())
        .map(handlers::health);

    let analyze = warp::path!("api" / "analyze")
        .and(warp::post())
        .and(json_body::<AnalyzeBody>())
        .and(with_canopy(canopy.clone()))
        .and_then(handlers::analyze);

    let predict = warp::path!("api" / "predict")
        .and(warp::post())
        .and(json_body::<PredictBody>())
        .and(with_canopy(canopy.clone()))
        .and_then(handlers::predict);

    let scan = warp::path!("api" / "guardian" / "scan")
        .and(warp::post())
        .and(json_body::<ScanBody>())
        .and(with_canopy(canopy.clone()))
        .and_then(handlers::scan);

    let sync = warp::path!("api" / "sync")
        .and(warp::post())
        .and(json_body::<SyncBody>())
        .and(with_canopy(canopy.clone()))
        .and_then(handlers::sync);

    let audits = warp::path!("api" / "audits" / String)
        .and(warp::get())
        .and(with_canopy(canopy.clone()))
        .and_then(handlers::list_audits);

    let watchlist = warp::path!("api" / "watchlist" / String)
        .and(warp::get())
        .and(with_canopy(canopy.clone()))
        .and_then(handlers::list_watchlist);

    let watch_add = warp::path!("api" / "watchlist")
        .and(warp::post())
        .and(json_body::<WatchBody>())
        .and(with_canopy(canopy.clone()))
        .and_then(handlers::add_watch_target);

    let watch_remove = warp::path!("api" / "watchlist" / String)
        .and(warp::delete())
        .and(with_canopy(canopy.clone()))
        .and_then(handlers::remove_watch_target);

    let settings_get = warp::path!("api" / "settings" / String)
        .and(warp::get())
        .and(with_canopy(canopy.clone()))
        .and_then(handlers::get_settings);

    let settings_put = warp::path!("api" / "settings" / String)
        .and(warp::put())
        .and(json_body::<SettingsBody>())
        .and(with_canopy(canopy.clone()))
        .and_then(handlers::put_settings);

    let evidence = warp::path!("api" / "evidence" / String / String)
        .and(warp::get())
        .and(with_canopy(canopy))
        .and_then(handlers::evidence);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    health
        .or(analyze)
        .or(predict)
        .or(scan)
        .or(sync)
        .or(audits)
        .or(watchlist)
        .or(watch_add)
        .or(watch_remove)
        .or(settings_get)
        .or(settings_put)
        .or(evidence)
        .recover(recover)
        .with(cors)
        .with(warp::trace::request())
}

/// Map warp rejections onto the JSON error shape
async fn recover(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "route not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("malformed request body: {e}"))
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string())
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "content-length required".to_string())
    } else if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected application/json".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        tracing::error!(?rejection, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(json_error(message, status))
}
