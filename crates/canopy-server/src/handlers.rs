//! Route handlers
//!
//! Every handler is infallible at the warp level; failures become JSON error
//! replies with the status picked by [`CanopyError::is_client_error`].

use crate::dto::{
    AnalyzeBody, AnalyzeResponse, ErrorBody, HealthResponse, PredictBody, PredictResponse, ScanBody,
    ScanResponse, SettingsBody, SyncBody, WatchBody,
};
use canopy_core::{Canopy, CanopyError, SyncOutcome, UserId, UserSettings, WatchTarget, WatchTargetId};
use canopy_evidence::{ArtifactSlot, EvidenceError, RequestId};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

pub(crate) fn json_error(message: impl Into<String>, status: StatusCode) -> Response {
    json_reply(
        &ErrorBody {
            success: false,
            error: message.into(),
        },
        status,
    )
}

fn error_reply(e: &CanopyError) -> Response {
    if e.is_client_error() {
        tracing::debug!(error = %e, "rejected request");
        json_error(e.to_string(), StatusCode::BAD_REQUEST)
    } else {
        tracing::error!(error = %e, "request failed");
        json_error(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn reply_with<T: Serialize>(result: Result<T, CanopyError>) -> Result<Response, Infallible> {
    Ok(match result {
        Ok(body) => json_reply(&body, StatusCode::OK),
        Err(e) => error_reply(&e),
    })
}

pub(crate) fn health() -> Response {
    json_reply(
        &HealthResponse {
            status: "ok",
            message: "Canopy audit pipeline is running",
            timestamp: chrono::Utc::now(),
        },
        StatusCode::OK,
    )
}

pub(crate) async fn analyze(body: AnalyzeBody, canopy: Canopy) -> Result<Response, Infallible> {
    let result = async {
        let request = body.into_request()?;
        let outcome = canopy.workflow().run(request).await?;
        Ok::<_, CanopyError>(AnalyzeResponse::from(outcome))
    }
    .await;
    reply_with(result)
}

pub(crate) async fn predict(body: PredictBody, canopy: Canopy) -> Result<Response, Infallible> {
    let result = async {
        let request = body.into_request()?;
        let outcome = canopy.guardian().predict(request).await?;
        Ok::<_, CanopyError>(PredictResponse::from(outcome))
    }
    .await;
    reply_with(result)
}

pub(crate) async fn scan(body: ScanBody, canopy: Canopy) -> Result<Response, Infallible> {
    let result = async {
        let user = body.user()?;
        let summary = canopy.guardian().scan_all(&user).await?;
        Ok::<_, CanopyError>(ScanResponse::from(summary))
    }
    .await;
    reply_with(result)
}

pub(crate) async fn sync(body: SyncBody, canopy: Canopy) -> Result<Response, Infallible> {
    let tx_hash = body.transaction_hash.unwrap_or_default();
    let outcome = match canopy.reconciler().sync(&tx_hash).await {
        Ok(outcome) => outcome,
        Err(e) => return Ok(error_reply(&e)),
    };
    Ok(match outcome {
        SyncOutcome::Resolved {
            token_id,
            contract_address,
            records_updated,
        } => json_reply(
            &json!({
                "success": true,
                "tokenId": token_id,
                "contractAddress": contract_address,
                "status": "UPDATED",
                "records_updated": records_updated,
            }),
            StatusCode::OK,
        ),
        SyncOutcome::Pending => json_reply(
            &json!({
                "success": false,
                "status": "PENDING",
                "message": "Transaction not yet mined",
            }),
            StatusCode::ACCEPTED,
        ),
        SyncOutcome::TokenNotFound => json_error("Token ID not found in logs", StatusCode::NOT_FOUND),
    })
}

pub(crate) async fn list_audits(user: String, canopy: Canopy) -> Result<Response, Infallible> {
    let user = UserId::from(user);
    reply_with(canopy.audits().list_by_user(&user).await.map_err(CanopyError::from))
}

pub(crate) async fn list_watchlist(user: String, canopy: Canopy) -> Result<Response, Infallible> {
    let user = UserId::from(user);
    reply_with(canopy.watchlist().list_by_user(&user).await.map_err(CanopyError::from))
}

pub(crate) async fn add_watch_target(body: WatchBody, canopy: Canopy) -> Result<Response, Infallible> {
    let (user, name, location) = match body.into_parts() {
        Ok(parts) => parts,
        Err(e) => return Ok(error_reply(&e)),
    };
    let target = WatchTarget::new(user, name, location.lat, location.lng);
    Ok(match canopy.watchlist().add(target.clone()).await {
        Ok(()) => {
            tracing::info!(id = %target.id, name = %target.name, "watch target added");
            json_reply(&target, StatusCode::CREATED)
        }
        Err(e) => error_reply(&e.into()),
    })
}

pub(crate) async fn remove_watch_target(id: String, canopy: Canopy) -> Result<Response, Infallible> {
    let Ok(id) = id.parse::<WatchTargetId>() else {
        return Ok(json_error(format!("invalid watch target id: {id}"), StatusCode::BAD_REQUEST));
    };
    Ok(match canopy.watchlist().remove(id).await {
        Ok(true) => json_reply(&json!({"success": true}), StatusCode::OK),
        Ok(false) => json_error(format!("watch target {id} not found"), StatusCode::NOT_FOUND),
        Err(e) => error_reply(&e.into()),
    })
}

pub(crate) async fn get_settings(user: String, canopy: Canopy) -> Result<Response, Infallible> {
    let user = UserId::from(user);
    let result = canopy
        .settings()
        .get(&user)
        .await
        .map(|s| s.unwrap_or_else(|| UserSettings::new(user)))
        .map_err(CanopyError::from);
    reply_with(result)
}

pub(crate) async fn put_settings(user: String, body: SettingsBody, canopy: Canopy) -> Result<Response, Infallible> {
    let user = UserId::from(user);
    let result = async {
        let mut settings = canopy
            .settings()
            .get(&user)
            .await?
            .unwrap_or_else(|| UserSettings::new(user.clone()));
        if let Some(phone) = body.phone_number {
            let phone = phone.trim().to_string();
            settings.phone_number = (!phone.is_empty()).then_some(phone);
        }
        if let Some(enabled) = body.notifications_enabled {
            settings.notifications_enabled = enabled;
        }
        canopy.settings().put(settings.clone()).await?;
        Ok::<_, CanopyError>(settings)
    }
    .await;
    reply_with(result)
}

pub(crate) async fn evidence(request_id: String, slot: String, canopy: Canopy) -> Result<Response, Infallible> {
    let Ok(request_id) = request_id.parse::<RequestId>() else {
        return Ok(json_error(format!("invalid request id: {request_id}"), StatusCode::BAD_REQUEST));
    };
    let slot_name = slot.strip_suffix(".png").unwrap_or(&slot);
    let Ok(slot) = slot_name.parse::<ArtifactSlot>() else {
        return Ok(json_error(format!("unknown evidence slot: {slot}"), StatusCode::BAD_REQUEST));
    };

    Ok(match canopy.collector().store().read(request_id, slot).await {
        Ok(bytes) => warp::reply::with_header(bytes, "content-type", "image/png").into_response(),
        Err(EvidenceError::NotFound(what)) => json_error(format!("evidence not found: {what}"), StatusCode::NOT_FOUND),
        Err(e) => error_reply(&e.into()),
    })
}
