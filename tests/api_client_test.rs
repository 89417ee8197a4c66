// tests/api_client_test.rs
// HTTP transport against an in-process admin API

mod common;

use hall_chat::api::{ApiClient, ChatBackend, ConversationQuery, MessageQuery};
use hall_chat::config::ChatSettings;
use hall_chat::stream::StreamEvent;
use hall_chat::types::ChatRequest;
use hall_chat::TransportErrorKind;

fn client_for(server: &common::TestServer) -> ApiClient {
    let settings = ChatSettings::for_base_url(&server.base_url).unwrap();
    ApiClient::from_settings(&settings)
}

#[tokio::test]
async fn test_list_conversations_sends_filters_and_token() {
    let server = common::spawn_server().await;
    let client = client_for(&server).with_token(Some("secret".into()));

    let conversations = client
        .list_conversations(ConversationQuery {
            page: 1,
            limit: 20,
            hall_id: Some(3),
        })
        .await
        .unwrap();

    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].id, 42);
    assert!(conversations[0].last_message_at.is_some());
    assert_eq!(conversations[1].topic, None);

    let queries = server.state.conversation_queries.lock().unwrap();
    assert_eq!(queries[0].get("page").map(String::as_str), Some("1"));
    assert_eq!(queries[0].get("limit").map(String::as_str), Some("20"));
    assert_eq!(queries[0].get("hallId").map(String::as_str), Some("3"));

    let auth = server.state.authorization.lock().unwrap();
    assert_eq!(auth[0].as_deref(), Some("Bearer secret"));
}

#[tokio::test]
async fn test_list_messages_decodes_records() {
    let server = common::spawn_server().await;
    let records = client_for(&server)
        .list_messages(MessageQuery {
            conversation_id: 4,
            page: 1,
            limit: 50,
        })
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 41);
    assert_eq!(records[1].url.as_deref(), Some("https://charts.example.com/may.png"));
}

#[tokio::test]
async fn test_send_chat_posts_camel_case_body() {
    let server = common::spawn_server().await;
    let response = client_for(&server)
        .send_chat(&ChatRequest {
            message: "Show revenue trends".into(),
            hall_ids: vec![3],
            conversation_id: None,
        })
        .await
        .unwrap();

    assert_eq!(response.stream_url.as_deref(), Some("stream/1"));
    assert_eq!(response.conversation_id, Some(42));

    let body = &server.state.chat_requests.lock().unwrap()[0];
    assert_eq!(body["message"], "Show revenue trends");
    assert_eq!(body["hallIds"], serde_json::json!([3]));
    assert!(body.get("conversationId").is_none());
}

#[tokio::test]
async fn test_status_codes_map_to_kinds() {
    let server = common::spawn_server().await;
    let client = client_for(&server);
    let request = ChatRequest {
        message: "hi".into(),
        hall_ids: vec![],
        conversation_id: Some(1),
    };

    for (status, kind) in [
        (429, TransportErrorKind::RateLimited),
        (401, TransportErrorKind::Unauthorized),
        (403, TransportErrorKind::Forbidden),
        (404, TransportErrorKind::NotFound),
        (502, TransportErrorKind::Server),
    ] {
        server.state.fail_chat_with(status);
        let err = client.send_chat(&request).await.unwrap_err();
        assert_eq!(err.kind, kind, "status {}", status);
        assert_eq!(err.status, status);
    }
}

#[tokio::test]
async fn test_unreachable_server_is_connectivity() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let settings = ChatSettings::for_base_url(&format!("http://127.0.0.1:{}/api", port)).unwrap();
    let err = ApiClient::from_settings(&settings)
        .list_conversations(ConversationQuery {
            page: 1,
            limit: 20,
            hall_id: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind, TransportErrorKind::Connectivity);
    assert_eq!(
        err.user_message(),
        "Unable to reach the server. Please check your connection."
    );
}

#[tokio::test]
async fn test_open_stream_delivers_events_in_order() {
    let server = common::spawn_server().await;
    server.state.stream(&[
        r#"{"type":"delta","delta":"Hel"}"#,
        r#"{"type":"delta","delta":"lo"}"#,
        r#"{"type":"done"}"#,
    ]);

    let mut channel = client_for(&server).open_stream("stream/1").unwrap();
    let mut events = Vec::new();
    while let Some(item) = channel.recv().await {
        let event = item.unwrap();
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }

    assert_eq!(
        events,
        vec![
            StreamEvent::Delta("Hel".into()),
            StreamEvent::Delta("lo".into()),
            StreamEvent::Done,
        ]
    );
    channel.close();
}
