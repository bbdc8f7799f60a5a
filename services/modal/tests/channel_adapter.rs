//! REST channel behaviour against a mock HTTP server

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modal::channel::{
    ChannelConfig, ChannelError, DiscordChannel, FollowUpMessage, InteractionChannel,
    OpenFormRequest,
};
use modal::custom_id::{CURRENT_SCHEMA_VERSION, Feature, Flow, encode};
use modal::models::FormField;

const APP_ID: &str = "app-1";

fn channel_for(server: &MockServer, timeout: Duration) -> DiscordChannel {
    DiscordChannel::new(ChannelConfig {
        api_base: server.uri(),
        application_id: APP_ID.to_string(),
        timeout,
    })
}

fn form_request(custom_id: String) -> OpenFormRequest {
    OpenFormRequest {
        interaction_id: "i-1".to_string(),
        interaction_token: "tok-1".to_string(),
        custom_id,
        title: "Suggest something".to_string(),
        fields: vec![FormField::paragraph("idea", "Your idea")],
    }
}

fn race_body(code: i64) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({ "code": code, "message": "race" }))
}

#[tokio::test]
async fn test_open_form_posts_modal_callback() {
    let server = MockServer::start().await;
    let custom_id = encode(Feature::Suggestions, Flow::Create, "abc", CURRENT_SCHEMA_VERSION).unwrap();

    Mock::given(method("POST"))
        .and(path("/interactions/i-1/tok-1/callback"))
        .and(body_partial_json(json!({
            "type": 9,
            "data": { "custom_id": custom_id, "title": "Suggest something" }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let channel = channel_for(&server, Duration::from_secs(2));
    channel.open_form(&form_request(custom_id)).await.unwrap();
}

#[tokio::test]
async fn test_open_form_rejects_long_identifier_before_calling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let channel = channel_for(&server, Duration::from_secs(2));
    let result = channel.open_form(&form_request("x".repeat(101))).await;

    assert!(matches!(
        result,
        Err(ChannelError::IdentifierLengthExceeded { length: 101, .. })
    ));
}

#[tokio::test]
async fn test_open_form_rejects_undecodable_identifier_before_calling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let channel = channel_for(&server, Duration::from_secs(2));
    for custom_id in [
        "",
        "todo_create_modal",
        "modal:todo:v1:create",
        "modal:history:v1:create:abc",
        "modal:todo:v1:create:bad id",
    ] {
        let result = channel.open_form(&form_request(custom_id.to_string())).await;
        assert!(
            matches!(result, Err(ChannelError::IdentifierLengthExceeded { .. })),
            "{:?}",
            custom_id
        );
    }
}

#[tokio::test]
async fn test_rejected_request_keeps_status_and_hides_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/webhooks/{}/secret-token", APP_ID)))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let channel = channel_for(&server, Duration::from_secs(2));
    let err = channel
        .follow_up("secret-token", &FollowUpMessage::ephemeral("done"))
        .await
        .unwrap_err();

    match &err {
        ChannelError::RequestRejected { status, body, .. } => {
            assert_eq!(*status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!err.to_string().contains("secret-token"));
}

#[tokio::test]
async fn test_follow_up_is_ephemeral() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/webhooks/{}/tok-1", APP_ID)))
        .and(body_partial_json(json!({ "content": "done", "flags": 64 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let channel = channel_for(&server, Duration::from_secs(2));
    channel
        .follow_up("tok-1", &FollowUpMessage::ephemeral("done"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_acknowledge_swallows_races() {
    for code in [40060, 10062] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/interactions/i-1/tok-1/callback"))
            .and(body_partial_json(json!({ "type": 5, "data": { "flags": 64 } })))
            .respond_with(race_body(code))
            .expect(1)
            .mount(&server)
            .await;

        let channel = channel_for(&server, Duration::from_secs(2));
        assert!(channel.acknowledge("i-1", "tok-1").await.is_ok());
    }
}

#[tokio::test]
async fn test_acknowledge_propagates_other_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(race_body(50001))
        .mount(&server)
        .await;

    let channel = channel_for(&server, Duration::from_secs(2));
    let err = channel.acknowledge("i-1", "tok-1").await.unwrap_err();

    assert_eq!(err.error_code(), Some(50001));
    assert!(!err.is_acknowledgement_race());
}

#[tokio::test]
async fn test_reply_is_not_treated_as_race() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "type": 4, "data": { "content": "hi", "flags": 64 } })))
        .respond_with(race_body(40060))
        .mount(&server)
        .await;

    let channel = channel_for(&server, Duration::from_secs(2));
    let err = channel.reply_ephemeral("i-1", "tok-1", "hi").await.unwrap_err();
    assert!(err.is_acknowledgement_race());
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let channel = channel_for(&server, Duration::from_millis(200));
    let err = channel.acknowledge("i-1", "tok-1").await.unwrap_err();

    match err {
        ChannelError::Timeout { endpoint, timeout } => {
            assert_eq!(timeout, Duration::from_millis(200));
            assert!(!endpoint.contains("tok-1"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}
