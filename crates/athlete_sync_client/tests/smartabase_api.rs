use athlete_sync_client::config::SmartabaseConfig;
use athlete_sync_client::smartabase::SmartabaseClient;
use athlete_sync_client::{
    AthletePlatform, EventPair, EventRow, EventUser, FormEvent, SyncClientError,
};
use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, group: Option<&str>) -> SmartabaseClient {
    let cfg = SmartabaseConfig {
        base_url: server.uri(),
        username: "coach".into(),
        password: SecretString::new("pw".into()),
        app_id: "firstbeat-sync".into(),
        form_name: "Firstbeat".into(),
        group_name: group.map(str::to_string),
        dedup_lookback_days: 30,
    };
    SmartabaseClient::new(&cfg).expect("client")
}

#[tokio::test]
async fn roster_follows_cursor_pages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/usersynchronise"))
        .and(query_param("informat", "json"))
        .and(header("X-APP-ID", "firstbeat-sync"))
        .and(body_partial_json(serde_json::json!({"cursor": "page2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "users": [{"firstName": "John", "lastName": "Roe", "userId": 43}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/usersynchronise"))
        .and(body_partial_json(serde_json::json!({"paginate": true, "groupName": "Alpine"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "users": [{"firstName": "Jane", "lastName": "Doe", "userId": 42}],
            "nextCursor": "page2"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let roster = client_for(&server, Some("Alpine"))
        .roster()
        .await
        .expect("roster");
    let ids: Vec<i64> = roster.iter().map(|r| r.user_id).collect();
    assert_eq!(ids, vec![42, 43]);

    let received = server.received_requests().await.unwrap();
    let auth = received[0].headers.get("authorization").cloned().unwrap();
    assert!(auth.to_str().unwrap().starts_with("Basic "));
}

#[tokio::test]
async fn roster_stops_on_repeated_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/usersynchronise"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "users": [{"firstName": "Jane", "lastName": "Doe", "userId": 42}],
            "nextCursor": "stuck"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let roster = client_for(&server, None).roster().await.expect("roster");
    assert_eq!(roster.len(), 2);
}

#[tokio::test]
async fn existing_ids_collects_id_pairs() {
    let server = MockServer::start().await;
    let since = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    Mock::given(method("POST"))
        .and(path("/api/v1/synchronise"))
        .and(body_partial_json(serde_json::json!({
            "formName": "Firstbeat",
            "userIds": [42, 43],
            "lastSynchronisationTimeOnServer": since.timestamp_millis()
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "export": {"events": [
                {"rows": [{"row": 0, "pairs": [{"key": "ID", "value": "900-11"}, {"key": "RMSSD", "value": "40"}]}]},
                {"rows": [{"row": 0, "pairs": [{"key": "ACWR", "value": "1.0"}]}]}
            ]}
        })))
        .mount(&server)
        .await;

    let ids = client_for(&server, None)
        .existing_measurement_ids("Firstbeat", &[43, 42, 42], since)
        .await
        .expect("ids");
    assert_eq!(ids.len(), 1);
    assert!(ids.contains("900-11"));
}

#[tokio::test]
async fn existing_ids_missing_export_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/synchronise"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let ids = client_for(&server, None)
        .existing_measurement_ids("Firstbeat", &[42], Utc::now())
        .await
        .expect("ids");
    assert!(ids.is_empty());
}

#[tokio::test]
async fn existing_ids_without_users_skips_request() {
    let server = MockServer::start().await;
    let ids = client_for(&server, None)
        .existing_measurement_ids("Firstbeat", &[], Utc::now())
        .await
        .expect("ids");
    assert!(ids.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

fn event() -> FormEvent {
    FormEvent {
        form_name: "Firstbeat".into(),
        start_date: "02/03/2026".into(),
        start_time: "6:55 AM".into(),
        finish_date: "02/03/2026".into(),
        finish_time: "7:05 AM".into(),
        user_id: EventUser { user_id: 42 },
        rows: vec![EventRow {
            row: 0,
            pairs: vec![EventPair {
                key: "ID".into(),
                value: Some("900-11".into()),
            }],
        }],
    }
}

#[tokio::test]
async fn insert_event_posts_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/eventimport"))
        .and(body_partial_json(serde_json::json!({
            "formName": "Firstbeat",
            "userId": {"userId": 42}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server, None)
        .insert_event(&event())
        .await
        .expect("insert");
}

#[tokio::test]
async fn insert_event_rejection_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/eventimport"))
        .respond_with(ResponseTemplate::new(500).set_body_string("form locked"))
        .mount(&server)
        .await;

    let err = client_for(&server, None)
        .insert_event(&event())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncClientError::Api { status: 500, ref body } if body == "form locked"));
}
