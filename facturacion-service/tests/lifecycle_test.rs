//! Pipeline outcomes: acceptance, rejection, pending submissions and stage
//! failures reverting to DRAFT.

mod common;

use common::{RelayPlan, TestApp};

#[tokio::test]
async fn authority_rejection_settles_the_invoice_as_rejected() {
    let app = TestApp::spawn().await;
    app.gateway.set_submit(RelayPlan::Reject {
        response_code: "90".to_string(),
        response_message: "Documento rechazado".to_string(),
    });

    let response = app
        .issue_invoice(&TestApp::creation_request("FE", "3001"))
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "REJECTED");
    assert!(body["cufe"].is_null());
    let invoice_id = body["invoice_id"].as_i64().unwrap();

    let status = app.invoice_status(invoice_id).await;
    let events = status["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "INVOICE_REJECTED");
    assert_eq!(events[0]["payload"]["data"]["response_code"], "90");

    app.cleanup().await;
}

#[tokio::test]
async fn inconclusive_submission_leaves_the_invoice_sent() {
    let app = TestApp::spawn().await;
    app.gateway.set_submit(RelayPlan::Pending {
        document_uuid: "receipt-uuid-1".to_string(),
    });

    let response = app
        .issue_invoice(&TestApp::creation_request("FE", "3002"))
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "SENT");
    assert!(body["cufe"].is_null());
    assert_eq!(body["dian_uuid"], "receipt-uuid-1");

    let status = app.invoice_status(body["invoice_id"].as_i64().unwrap()).await;
    let events = status["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "INVOICE_SENT_TO_DIAN");

    app.cleanup().await;
}

#[tokio::test]
async fn submission_transport_error_reverts_to_draft() {
    let app = TestApp::spawn().await;
    app.gateway.set_submit(RelayPlan::TransportError {
        status_code: Some(502),
        reason: "relay unreachable".to_string(),
    });

    let response = app
        .issue_invoice(&TestApp::creation_request("FE", "3003"))
        .await;
    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "submission_error");
    assert!(body["error"].as_str().unwrap().contains("relay unreachable"));

    // The invoice exists, stayed DRAFT, and the last event records the
    // failure; no authority identifiers were assigned.
    let status = app.invoice_status(1).await;
    let invoice = &status["invoice"];
    assert_eq!(invoice["status"], "DRAFT");
    assert!(invoice["cufe"].is_null());
    assert!(invoice["dian_uuid"].is_null());

    let events = status["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "ERROR_OCCURRED");
    assert_eq!(events[0]["status"], "FAILED");
    assert_eq!(events[0]["payload"]["stage"], "submission_error");
    assert!(events[0]["payload"]["reason"]
        .as_str()
        .unwrap()
        .contains("relay unreachable"));

    app.cleanup().await;
}

#[tokio::test]
async fn render_failure_reverts_to_draft() {
    let app = TestApp::spawn().await;
    app.gateway.fail_render("missing UBL template");

    let response = app
        .issue_invoice(&TestApp::creation_request("FE", "3004"))
        .await;
    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "render_error");

    let status = app.invoice_status(1).await;
    assert_eq!(status["invoice"]["status"], "DRAFT");
    let events = status["events"].as_array().unwrap();
    assert_eq!(events[0]["event_type"], "ERROR_OCCURRED");
    assert_eq!(events[0]["payload"]["stage"], "render_error");

    app.cleanup().await;
}

#[tokio::test]
async fn signing_failure_reverts_to_draft() {
    let app = TestApp::spawn().await;
    app.gateway.fail_sign("certificate expired");

    let response = app
        .issue_invoice(&TestApp::creation_request("FE", "3005"))
        .await;
    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "signing_error");
    assert!(body["error"].as_str().unwrap().contains("certificate expired"));

    let status = app.invoice_status(1).await;
    assert_eq!(status["invoice"]["status"], "DRAFT");

    app.cleanup().await;
}

#[tokio::test]
async fn failed_issuance_can_be_retried_after_the_cause_clears() {
    let app = TestApp::spawn().await;
    app.gateway.set_submit(RelayPlan::TransportError {
        status_code: None,
        reason: "connection reset".to_string(),
    });

    let request = TestApp::creation_request("FE", "3006");
    let first = app.issue_invoice(&request).await;
    assert_eq!(first.status(), 500);

    // The draft still holds (series, number); a verbatim retry conflicts
    // instead of double-submitting.
    app.gateway.set_submit(RelayPlan::Accept {
        document_uuid: "cufe-retry-1".to_string(),
    });
    let retry_same = app.issue_invoice(&request).await;
    assert_eq!(retry_same.status(), 409);

    // A fresh attempt under a new number goes through.
    let fresh = app
        .issue_invoice(&TestApp::creation_request("FE", "3007"))
        .await;
    assert_eq!(fresh.status(), 201);
    let body: serde_json::Value = fresh.json().await.unwrap();
    assert_eq!(body["status"], "ACCEPTED");

    app.cleanup().await;
}
