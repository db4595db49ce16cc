//! HTTP surface tests over fake collaborators

use canopy_ledger::{MintReceipt, TokenId};
use canopy_server::routes;
use canopy_test_utils::{
    transfer_receipt, FixedWeather, Harness, MintScript, RecordingLedger, ScriptedAnalyzer, AMAZON_LAT, AMAZON_LNG,
    TEST_CONTRACT,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use warp::http::StatusCode;

async fn call(h: &Harness, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = warp::test::request().method(method).path(path);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.reply(&routes(h.canopy.clone())).await;
    let json = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
    (response.status(), json)
}

fn audit_body(user: &str) -> Value {
    json!({"lat": AMAZON_LAT, "lng": AMAZON_LNG, "userId": user})
}

#[tokio::test]
async fn health_check() {
    let h = Harness::new();
    let (status, body) = call(&h, "GET", "/api/test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn analyze_mints_and_lists_the_record() {
    let h = Harness::new();
    let (status, body) = call(&h, "POST", "/api/analyze", Some(audit_body("alice"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["action_taken"], "MINTED_NEW");
    assert_eq!(body["is_simulation"], false);
    assert_eq!(body["ai_data"]["biomass_score"], 92);
    assert_eq!(body["stages"].as_array().unwrap().last().unwrap(), "DONE");

    let (status, records) = call(&h, "GET", "/api/audits/alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["contractAddress"], TEST_CONTRACT);
}

#[tokio::test]
async fn simulation_skips_the_ledger() {
    let h = Harness::new();
    let mut body = audit_body("alice");
    body["mode"] = json!("SIMULATION");

    let (status, body) = call(&h, "POST", "/api/analyze", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action_taken"], "NONE");
    assert_eq!(body["is_simulation"], true);
    assert_eq!(body["blockchain_data"], Value::Null);
    assert!(h.ledger.mints().is_empty());
}

#[tokio::test]
async fn analyze_rejects_bad_input_with_400() {
    let h = Harness::new();
    let (status, body) = call(&h, "POST", "/api/analyze", Some(json!({"lng": 1, "userId": "alice"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let response = warp::test::request()
        .method("POST")
        .path("/api/analyze")
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&routes(h.canopy.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.analyzer.calls(), 0);
}

#[tokio::test]
async fn analyzer_failure_is_a_server_error() {
    let h = Harness::builder()
        .analyzer(ScriptedAnalyzer::new().with_audit_output("not json at all"))
        .build();
    let (status, body) = call(&h, "POST", "/api/analyze", Some(audit_body("alice"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = Harness::new();
    let (status, _) = call(&h, "GET", "/api/nothing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn predict_reports_risk_and_alerts() {
    let h = Harness::builder()
        .analyzer(ScriptedAnalyzer::new().with_dryness(72.0))
        .weather(FixedWeather::hot_and_windy())
        .default_phone("+15550100")
        .build();
    let (status, body) = call(
        &h,
        "POST",
        "/api/predict",
        Some(json!({"lat": AMAZON_LAT, "lng": AMAZON_LNG})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_data"]["risk_level"], "CRITICAL");
    assert_eq!(body["risk_data"]["risk_score"], 100);
    assert_eq!(body["actions"]["sms_sent"], true);
    assert_eq!(body["actions"]["nft_updated"], false);
    assert_eq!(h.sms.sent().len(), 1);
}

#[tokio::test]
async fn watchlist_scan_and_removal() {
    let h = Harness::builder().default_phone("+15550100").build();
    let (status, target) = call(
        &h,
        "POST",
        "/api/watchlist",
        Some(json!({"userId": "ranger", "name": "North Ridge", "lat": "34.1", "lng": -118.3})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = target["id"].as_str().unwrap().to_string();

    let (_, listed) = call(&h, "GET", "/api/watchlist/ranger", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, summary) = call(&h, "POST", "/api/guardian/scan", Some(json!({"userId": "ranger"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["scanned"], 1);
    assert_eq!(summary["alerts_sent"], 0);
    assert_eq!(summary["results"][0]["status"], "NORMAL");

    let (status, _) = call(&h, "DELETE", &format!("/api/watchlist/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&h, "DELETE", &format!("/api/watchlist/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&h, "DELETE", "/api/watchlist/not-an-id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scan_requires_a_user() {
    let h = Harness::new();
    let (status, _) = call(&h, "POST", "/api/guardian/scan", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settings_default_then_update() {
    let h = Harness::new();
    let (status, body) = call(&h, "GET", "/api/settings/ranger", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notificationsEnabled"], true);
    assert_eq!(body["phoneNumber"], Value::Null);

    let (status, body) = call(
        &h,
        "PUT",
        "/api/settings/ranger",
        Some(json!({"phoneNumber": " +15550199 ", "notificationsEnabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phoneNumber"], "+15550199");

    let (_, body) = call(&h, "GET", "/api/settings/ranger", None).await;
    assert_eq!(body["notificationsEnabled"], false);
}

#[tokio::test]
async fn sync_reports_pending_resolved_and_missing() {
    let h = Harness::builder()
        .ledger(RecordingLedger::new().with_mint(MintScript::Receipt(MintReceipt::new(
            Some("0xmint".into()),
            TEST_CONTRACT,
            TokenId::Pending,
        ))))
        .build();
    call(&h, "POST", "/api/analyze", Some(audit_body("alice"))).await;

    let (status, body) = call(&h, "POST", "/api/sync", Some(json!({"transactionHash": "0xmint"}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PENDING");

    h.chain.insert("0xmint", transfer_receipt("0xmint", TEST_CONTRACT, 9));
    let (status, body) = call(&h, "POST", "/api/sync", Some(json!({"transactionHash": "0xmint"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokenId"], "9");
    assert_eq!(body["records_updated"], 1);

    let mut approval = transfer_receipt("0xother", TEST_CONTRACT, 1);
    approval.logs[0].topics[0] = format!("0x{:064x}", 1);
    h.chain.insert("0xother", approval);
    let (status, _) = call(&h, "POST", "/api/sync", Some(json!({"transactionHash": "0xother"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&h, "POST", "/api/sync", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn evidence_is_served_as_png() {
    let h = Harness::new();
    let (_, body) = call(&h, "POST", "/api/analyze", Some(audit_body("alice"))).await;
    let request_id = body["request_id"].as_str().unwrap().to_string();

    let response = warp::test::request()
        .path(&format!("/api/evidence/{request_id}/ndvi_current.png"))
        .reply(&routes(h.canopy.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert!(response.body().starts_with(b"\x89PNG"));

    let (status, _) = call(&h, "GET", &format!("/api/evidence/{request_id}/ndmi_current"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&h, "GET", &format!("/api/evidence/{request_id}/thermal"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
