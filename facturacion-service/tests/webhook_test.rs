//! Webhook reconciliation: authentication, idempotent redelivery and
//! terminal-state protection.

mod common;

use common::{RelayPlan, TestApp, WEBHOOK_SECRET};
use serde_json::json;

/// Issue an invoice whose submission stays pending, leaving it SENT.
async fn issue_pending(app: &TestApp, number: &str) -> i64 {
    app.gateway.set_submit(RelayPlan::Pending {
        document_uuid: format!("receipt-{number}"),
    });
    let response = app
        .issue_invoice(&TestApp::creation_request("FE", number))
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "SENT");
    body["invoice_id"].as_i64().unwrap()
}

#[tokio::test]
async fn webhook_with_wrong_token_is_rejected_and_changes_nothing() {
    let app = TestApp::spawn().await;
    let invoice_id = issue_pending(&app, "4001").await;
    let before = app.invoice_status(invoice_id).await;

    let payload = json!({ "type": "invoice_accepted", "invoice_id": invoice_id });

    let response = app.post_webhook(Some("wrong-secret"), &payload).await;
    assert_eq!(response.status(), 401);

    let response = app.post_webhook(None, &payload).await;
    assert_eq!(response.status(), 401);

    let after = app.invoice_status(invoice_id).await;
    assert_eq!(after["invoice"]["status"], before["invoice"]["status"]);
    assert_eq!(
        after["events"].as_array().unwrap().len(),
        before["events"].as_array().unwrap().len()
    );

    app.cleanup().await;
}

#[tokio::test]
async fn accepted_webhook_finalizes_a_sent_invoice() {
    let app = TestApp::spawn().await;
    let invoice_id = issue_pending(&app, "4002").await;

    let payload = json!({
        "type": "invoice_accepted",
        "invoice_id": invoice_id,
        "cufe": "cufe-web-4002",
        "dian_uuid": "uuid-web-4002",
        "response_xml": "<ApplicationResponse/>"
    });

    let response = app.post_webhook(Some(WEBHOOK_SECRET), &payload).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "ACCEPTED");
    assert_eq!(body["applied"], true);

    let status = app.invoice_status(invoice_id).await;
    let invoice = &status["invoice"];
    assert_eq!(invoice["status"], "ACCEPTED");
    assert_eq!(invoice["cufe"], "cufe-web-4002");
    assert_eq!(invoice["dian_uuid"], "uuid-web-4002");
    assert!(invoice["xml_url"].as_str().is_some());

    let events = status["events"].as_array().unwrap();
    assert_eq!(events[0]["event_type"], "INVOICE_ACCEPTED");
    assert_eq!(events[0]["payload"]["source"], "webhook");

    app.cleanup().await;
}

#[tokio::test]
async fn redelivered_webhook_is_idempotent() {
    let app = TestApp::spawn().await;
    let invoice_id = issue_pending(&app, "4003").await;

    let payload = json!({
        "type": "invoice_accepted",
        "invoice_id": invoice_id,
        "cufe": "cufe-web-4003"
    });

    let first = app.post_webhook(Some(WEBHOOK_SECRET), &payload).await;
    assert_eq!(first.status(), 200);
    let first: serde_json::Value = first.json().await.unwrap();
    assert_eq!(first["applied"], true);

    let second = app.post_webhook(Some(WEBHOOK_SECRET), &payload).await;
    assert_eq!(second.status(), 200);
    let second: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second["applied"], false);
    assert_eq!(second["status"], "ACCEPTED");

    // One status change, two audit entries: issuance left 2 events, the two
    // deliveries appended exactly one each.
    let status = app.invoice_status(invoice_id).await;
    assert_eq!(status["invoice"]["status"], "ACCEPTED");
    let events = status["events"].as_array().unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0]["event_type"], "DIAN_STATUS_UPDATED");
    assert_eq!(events[0]["payload"]["applied"], false);
    assert_eq!(events[1]["event_type"], "INVOICE_ACCEPTED");

    app.cleanup().await;
}

#[tokio::test]
async fn terminal_status_is_never_regressed() {
    let app = TestApp::spawn().await;

    let response = app
        .issue_invoice(&TestApp::creation_request("FE", "4004"))
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ACCEPTED");
    let invoice_id = body["invoice_id"].as_i64().unwrap();

    for target in ["SENT", "DRAFT"] {
        let payload = json!({
            "type": "status_update",
            "invoice_id": invoice_id,
            "new_status": target,
            "message": "late status relay"
        });
        let response = app.post_webhook(Some(WEBHOOK_SECRET), &payload).await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["applied"], false);
        assert_eq!(body["status"], "ACCEPTED");
    }

    let status = app.invoice_status(invoice_id).await;
    assert_eq!(status["invoice"]["status"], "ACCEPTED");
    // Both attempts were audited on top of the issuance events.
    let events = status["events"].as_array().unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0]["event_type"], "DIAN_STATUS_UPDATED");
    assert_eq!(events[0]["payload"]["applied"], false);

    app.cleanup().await;
}

#[tokio::test]
async fn rejected_webhook_settles_a_sent_invoice() {
    let app = TestApp::spawn().await;
    let invoice_id = issue_pending(&app, "4005").await;

    let payload = json!({
        "type": "invoice_rejected",
        "invoice_id": invoice_id,
        "errors": ["Regla FAD06: NIT inválido"]
    });

    let response = app.post_webhook(Some(WEBHOOK_SECRET), &payload).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "REJECTED");
    assert_eq!(body["applied"], true);

    let status = app.invoice_status(invoice_id).await;
    let events = status["events"].as_array().unwrap();
    assert_eq!(events[0]["event_type"], "INVOICE_REJECTED");
    assert_eq!(events[0]["payload"]["data"]["errors"][0], "Regla FAD06: NIT inválido");

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_webhook_type_is_a_bad_request() {
    let app = TestApp::spawn().await;

    let payload = json!({ "type": "invoice_archived", "invoice_id": 1 });
    let response = app.post_webhook(Some(WEBHOOK_SECRET), &payload).await;
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn webhook_for_unknown_invoice_is_not_found() {
    let app = TestApp::spawn().await;

    let payload = json!({ "type": "invoice_accepted", "invoice_id": 9999 });
    let response = app.post_webhook(Some(WEBHOOK_SECRET), &payload).await;
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn webhook_without_any_identifier_is_rejected() {
    let app = TestApp::spawn().await;

    let payload = json!({ "type": "invoice_accepted" });
    let response = app.post_webhook(Some(WEBHOOK_SECRET), &payload).await;
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}
