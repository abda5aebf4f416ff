use posflow::domain::money::MinorUnits;
use posflow::domain::ports::{PaymentLinkAdmin, PaymentTransport, TerminalDirectory};
use posflow::domain::remote::{InitiateTerminalRequest, PaymentLinkStatus, RemoteStatus};
use posflow::error::TransportError;
use posflow::infrastructure::http::HttpTransport;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::new(server.uri(), Some("secret".to_string())).unwrap()
}

#[tokio::test]
async fn test_initiate_terminal_posts_minor_units() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/pos/terminal-payments"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(json!({
            "order_id": "ord_1",
            "terminal_id": "term_1",
            "amount": 5000,
            "currency": "GBP",
            "device_ids": ["d1"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"transaction_id": "txn_1", "status": "pending"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport(&server)
        .initiate_terminal(&InitiateTerminalRequest {
            order_id: "ord_1".to_string(),
            terminal_id: "term_1".to_string(),
            amount: MinorUnits(5000),
            currency: "GBP".to_string(),
            device_ids: Some(vec!["d1".to_string()]),
        })
        .await
        .unwrap();

    assert_eq!(response.transaction_id, "txn_1");
    assert_eq!(response.status.as_deref(), Some("pending"));
}

#[tokio::test]
async fn test_poll_decodes_receipt_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/pos/terminal-payments/txn_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "transaction_id": "txn_1",
                "status": "completed",
                "card_brand": "Visa",
                "card_last_four": "4242",
                "auth_code": "A1B2C3"
            }
        })))
        .mount(&server)
        .await;

    let response = transport(&server).poll_status("txn_1").await.unwrap();

    assert_eq!(response.status, RemoteStatus::Completed);
    assert_eq!(response.card_last_four.as_deref(), Some("4242"));
}

#[tokio::test]
async fn test_unsuccessful_envelope_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/pos/terminal-payments/txn_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "Transaction not found"
        })))
        .mount(&server)
        .await;

    let error = transport(&server).poll_status("txn_1").await.unwrap_err();
    assert_eq!(error, TransportError::Rejected("Transaction not found".to_string()));
}

#[tokio::test]
async fn test_http_error_status_carries_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/pos/terminal-payments/txn_1/cancel"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "success": false,
            "error": "Payment already completed"
        })))
        .mount(&server)
        .await;

    let error = transport(&server).cancel_terminal("txn_1").await.unwrap_err();
    assert_eq!(
        error,
        TransportError::Status {
            status: 409,
            message: "Payment already completed".to_string()
        }
    );
}

#[tokio::test]
async fn test_list_terminals_filters_by_location() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/pos/terminals"))
        .and(query_param("location_id", "loc_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [
                {"id": "t1", "display_name": "Counter", "provider": "dojo", "is_active": true},
                {"id": "t2", "display_name": "Back", "provider": "sumup", "is_active": false}
            ]
        })))
        .mount(&server)
        .await;

    let terminals = transport(&server).list_terminals(Some("loc_1")).await.unwrap();

    assert_eq!(terminals.len(), 2);
    assert!(terminals[0].is_active());
    assert!(!terminals[1].is_active());
}

#[tokio::test]
async fn test_payment_link_admin_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/pos/payment-links"))
        .and(query_param("order_id", "ord_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{
                "id": "pl_1",
                "checkout_url": "https://pay.example.test/pl_1",
                "amount": 2500,
                "status": "pending"
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/pos/payment-links/pl_1/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/pos/payment-links/pl_1/resend-email"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": null})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server);
    let links = transport.list_links("ord_1").await.unwrap();
    assert_eq!(links[0].status, PaymentLinkStatus::Pending);
    assert_eq!(links[0].amount, MinorUnits(2500));

    transport.resend_link_email("pl_1").await.unwrap();
    transport.cancel_link("pl_1").await.unwrap();
}

#[tokio::test]
async fn test_connection_failure_maps_to_transport_error() {
    let transport = HttpTransport::new("http://127.0.0.1:9", None).unwrap();
    let error = transport.poll_status("txn_1").await.unwrap_err();
    assert!(matches!(
        error,
        TransportError::Connection(_) | TransportError::Other(_)
    ));
}
