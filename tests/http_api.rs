mod common;

use axum::{body::Body, http::{Request, StatusCode}};
use common::{
    get, json_request, seed_event, send, spawn_app, CALLER_PRINCIPAL, OWNER_PRINCIPAL,
};
use serde_json::json;

fn as_caller(uri: &str, principal: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-caller-principal", principal)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_and_banner() {
    let app = spawn_app().await;
    let (status, body) = send(&app.state, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));

    let (status, _) = send(&app.state, get("/")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn create_then_fetch_round_trips() {
    let app = spawn_app().await;
    let (status, created) = send(
        &app.state,
        json_request(
            "POST",
            "/events",
            json!({
                "name": "Rust Meetup",
                "date": "2025-08-21",
                "location": "Almaty",
                "price": "0.02",
                "capacity": 50
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["booked_count"], 0);
    assert!(created["user"]["username"].as_str().unwrap().starts_with("organizer"));
    assert_eq!(created["user"]["age"], 30);

    let id = created["id"].as_i64().unwrap();
    let (status, fetched) = send(&app.state, get(&format!("/events/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn create_rejects_invalid_input() {
    let app = spawn_app().await;
    let bad_date = json!({"name": "X", "date": "21.08.2025", "location": "Y", "capacity": 1});
    let (status, _) = send(&app.state, json_request("POST", "/events", bad_date)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_price =
        json!({"name": "X", "date": "2025-08-21", "location": "Y", "price": "free", "capacity": 1});
    let (status, body) = send(&app.state, json_request("POST", "/events", bad_price)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("free"));

    let no_user = json!({"name": "X", "date": "2025-08-21", "location": "Y", "capacity": 1, "user_id": 99});
    let (status, _) = send(&app.state, json_request("POST", "/events", no_user)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_event_is_null() {
    let app = spawn_app().await;
    let (status, body) = send(&app.state, get("/events/12345")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}

#[tokio::test]
async fn put_with_price_leaves_other_fields() {
    let app = spawn_app().await;
    let event = seed_event(&app.state, Some("0.01"), 20, 3).await;

    let (status, updated) = send(
        &app.state,
        json_request("PUT", "/events", json!({"id": event.id, "price": "0.5"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], "0.5");
    assert_eq!(updated["name"], event.name.as_str());
    assert_eq!(updated["capacity"], 20);
    assert_eq!(updated["booked_count"], 3);

    let (status, patched) = send(
        &app.state,
        json_request("PATCH", "/events", json!({"id": event.id, "location": "Astana"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["location"], "Astana");
    assert_eq!(patched["price"], "0.5");
}

#[tokio::test]
async fn put_rejects_booked_count_over_capacity() {
    let app = spawn_app().await;
    let event = seed_event(&app.state, Some("0.01"), 10, 0).await;

    let (status, body) = send(
        &app.state,
        json_request("PUT", "/events", json!({"id": event.id, "booked_count": 50})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("capacity"));

    let (_, stored) = send(&app.state, get(&format!("/events/{}", event.id))).await;
    assert_eq!(stored["booked_count"], 0);

    let (status, _) = send(
        &app.state,
        json_request("PATCH", "/events", json!({"id": 9999, "booked_count": 50})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_twice_fails_the_second_time() {
    let app = spawn_app().await;
    let event = seed_event(&app.state, None, 1, 0).await;

    let (status, body) =
        send(&app.state, json_request("DELETE", "/events", json!({"id": event.id}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"deletedId": event.id}));

    let (status, body) =
        send(&app.state, json_request("DELETE", "/events", json!({"id": event.id}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn list_count_and_batch() {
    let app = spawn_app().await;
    let (status, created) = send(&app.state, json_request("POST", "/events/batch/3", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let prices: Vec<_> = created
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["price"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(prices, ["0.01", "0.02", "0.03"]);
    assert_eq!(created[2]["date"], "2025-08-12");
    assert_ne!(created[0]["user"]["id"], created[1]["user"]["id"]);

    let (_, count) = send(&app.state, get("/events/count")).await;
    assert_eq!(count, json!({"count": 3}));

    let (_, page) = send(&app.state, get("/events?limit=2&offset=1")).await;
    assert_eq!(page.as_array().unwrap().len(), 2);
    assert_eq!(page[0]["date"], "2025-08-11");
}

#[tokio::test]
async fn payout_requires_event_id() {
    let app = spawn_app().await;
    let (status, body) = send(&app.state, get("/payout")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Missing 'eventId' query parameter"}));

    let (status, _) = send(&app.state, get("/payout?eventId=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payout_success_response() {
    let app = spawn_app().await;
    let event = seed_event(&app.state, Some("0.01"), 10, 2).await;

    let (status, body) = send(
        &app.state,
        as_caller(&format!("/payout?eventId={}", event.id), CALLER_PRINCIPAL),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Transaction sent");
    assert_eq!(body["eventId"], event.id);
    assert_eq!(body["amount"], "0.01");
    assert_eq!(body["bookedCount"], 3);
    assert_eq!(body["txHash"].as_str().unwrap().len(), 66);
    assert!(body.get("payee").is_none());

    let sent = app.wallets.calls.sent.lock().unwrap().clone();
    assert_eq!(sent[0].0, app.wallets.address_of(CALLER_PRINCIPAL));
}

#[tokio::test]
async fn post_payout_route_is_equivalent() {
    let app = spawn_app().await;
    let event = seed_event(&app.state, Some("1"), 1, 0).await;

    let uri = format!("/payments/payout?eventId={}&email=fan@example.com", event.id);
    let request = Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(&app.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bookedCount"], 1);

    let (status, body) = send(&app.state, get(&format!("/payout?eventId={}", event.id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Event is fully booked"}));
}

#[tokio::test]
async fn payout_error_statuses() {
    let app = spawn_app().await;

    let (status, body) = send(&app.state, get("/payout?eventId=404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Event not found"}));

    let unpriced = seed_event(&app.state, None, 5, 0).await;
    let (status, body) = send(&app.state, get(&format!("/payout?eventId={}", unpriced.id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Event has no price set"}));

    let priced = seed_event(&app.state, Some("0.01"), 5, 0).await;
    app.wallets.fail_transfers(true);
    let (status, body) = send(&app.state, get(&format!("/payout?eventId={}", priced.id))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to send transaction");
    assert!(body["details"].as_str().unwrap().contains("insufficient funds"));
}

#[tokio::test]
async fn payment_link() {
    let app = spawn_app().await;
    let event = seed_event(&app.state, Some("0.01"), 5, 0).await;

    let (status, body) = send(&app.state, get(&format!("/payment/{}", event.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["paymentLink"],
        format!("http://localhost:8000/payment/{}", event.id)
    );

    let (status, body) = send(&app.state, get("/payment/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"success": false, "message": "Event not found"}));
}

#[tokio::test]
async fn whoami_and_addresses() {
    let app = spawn_app().await;

    let (_, body) = send(&app.state, get("/whoami")).await;
    assert_eq!(body, json!("2vxsx-fae"));
    let (_, body) = send(&app.state, as_caller("/whoami", CALLER_PRINCIPAL)).await;
    assert_eq!(body, json!(CALLER_PRINCIPAL));

    let (status, body) = send(&app.state, as_caller("/whoami", "NOT VALID")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (_, body) = send(&app.state, as_caller("/caller-address", CALLER_PRINCIPAL)).await;
    assert_eq!(
        body["address"],
        app.wallets.address_of(CALLER_PRINCIPAL).to_string()
    );

    let (_, service) = send(&app.state, get("/canister-address")).await;
    assert_ne!(service["address"], body["address"]);
}

#[tokio::test]
async fn address_balance() {
    let app = spawn_app().await;
    let address = "0x000000000000000000000000000000000000000a";
    let (status, body) = send(&app.state, get(&format!("/address-balance?address={address}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"balance": "10000000000000000"}));

    let (status, body) = send(&app.state, get("/address-balance?address=0x1234")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid Ethereum address"}));
}

#[tokio::test]
async fn transfer_from_service_wallet_is_owner_only() {
    let app = spawn_app().await;
    let to = "0x3535353535353535353535353535353535353535";
    let body = json!({"to": to, "value": "0.5"});

    let (status, _) = send(&app.state, json_request("POST", "/transfer-from-canister", body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.wallets.transfers(), 0);

    let mut request = json_request("POST", "/transfer-from-canister", body);
    request
        .headers_mut()
        .insert("x-caller-principal", OWNER_PRINCIPAL.parse().unwrap());
    let (status, text) = send(&app.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.as_str().unwrap().starts_with("transaction sent with hash: 0x"));

    let sent = app.wallets.calls.sent.lock().unwrap().clone();
    assert_eq!(sent[0].0, app.wallets.address_of(common::SERVICE_PRINCIPAL));
    assert_eq!(sent[0].1.to.to_string().to_lowercase(), to);
}

#[tokio::test]
async fn transfer_from_service_wallet_validates_body() {
    let app = spawn_app().await;
    let mut request =
        json_request("POST", "/transfer-from-canister", json!({"to": "0x3535353535353535353535353535353535353535"}));
    request
        .headers_mut()
        .insert("x-caller-principal", OWNER_PRINCIPAL.parse().unwrap());
    let (status, body) = send(&app.state, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Both \"to\" and \"value\" are required"}));
}

#[tokio::test]
async fn users_create_list_and_fetch() {
    let app = spawn_app().await;
    let (status, created) = send(
        &app.state,
        json_request("POST", "/users", json!({"username": "aigerim", "age": 27})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["username"], "aigerim");
    assert_eq!(created["age"], 27);
    let id = created["id"].as_i64().unwrap();

    let (status, fetched) = send(&app.state, get(&format!("/users/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (_, missing) = send(&app.state, get("/users/9999")).await;
    assert!(missing.is_null());

    send(&app.state, json_request("POST", "/users", json!({"username": "bolat", "age": 31}))).await;
    let (_, count) = send(&app.state, get("/users/count")).await;
    assert_eq!(count["count"], 2);
    let (_, page) = send(&app.state, get("/users?limit=1&offset=1")).await;
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["username"], "bolat");

    let (status, _) =
        send(&app.state, json_request("POST", "/users", json!({"username": "", "age": 20}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) =
        send(&app.state, json_request("POST", "/users", json!({"username": "x", "age": 400}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn users_partial_update_keeps_other_fields() {
    let app = spawn_app().await;
    let (_, created) = send(
        &app.state,
        json_request("POST", "/users", json!({"username": "dana", "age": 22})),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let (status, updated) =
        send(&app.state, json_request("PATCH", "/users", json!({"id": id, "age": 23}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated, json!({"id": id, "username": "dana", "age": 23}));

    let (status, updated) = send(
        &app.state,
        json_request("PUT", "/users", json!({"id": id, "username": "dana.k"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated, json!({"id": id, "username": "dana.k", "age": 23}));

    let (status, _) =
        send(&app.state, json_request("PUT", "/users", json!({"id": 9999, "age": 30}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn users_delete_is_verified_and_blocked_by_events() {
    let app = spawn_app().await;
    let event = seed_event(&app.state, Some("0.01"), 5, 0).await;
    let organizer = event.organizer.id;

    let (status, body) =
        send(&app.state, json_request("DELETE", "/users", json!({"id": organizer}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("1 event"));
    assert!(app.state.users.get_by_id(organizer).await.unwrap().is_some());

    app.state.events.delete(event.id).await.unwrap();
    let (status, body) =
        send(&app.state, json_request("DELETE", "/users", json!({"id": organizer}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"deletedId": organizer}));

    let (status, _) =
        send(&app.state, json_request("DELETE", "/users", json!({"id": organizer}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
