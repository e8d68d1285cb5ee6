//! Hardware bridge correlation and expiry.

use std::time::Duration;

use codecraft_kernel::{outbox, ClientId, HardwareBridge, Inbox, KernelConfig};
use codecraft_types::{AgentEvent, AgentResponse, HardwareRequest, Registration, ServerEvent};
use serde_json::{Map, Value};

async fn bridge_with_agent() -> (HardwareBridge, Inbox<AgentEvent>) {
    let config = KernelConfig::default().with_auth_token("secret");
    let bridge = HardwareBridge::from_config(&config);
    let (sink, inbox) = outbox();
    let registration = Registration {
        agent_id: "pi".to_string(),
        name: None,
        platform: None,
        auth_token: "secret".to_string(),
    };
    bridge
        .register_agent(&registration, sink)
        .await
        .expect("register");
    (bridge, inbox)
}

fn request_id(inbox: &mut Inbox<AgentEvent>) -> String {
    match inbox.drain().pop() {
        Some(AgentEvent::Request { request_id, .. }) => request_id,
        other => panic!("expected a forwarded request, got {:?}", other),
    }
}

fn response(request_id: String) -> AgentResponse {
    let mut payload = Map::new();
    payload.insert("cameras".into(), Value::Array(vec![Value::from(0)]));
    AgentResponse {
        event: "camera_list_response".to_string(),
        request_id: Some(request_id),
        payload,
    }
}

fn relayed(inbox: &mut Inbox<ServerEvent>) -> Vec<ServerEvent> {
    inbox
        .drain()
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::HardwareRelay { .. }))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_expires_after_thirty_seconds() {
    let (bridge, mut agent) = bridge_with_agent().await;
    let (sink, mut client) = outbox();
    bridge.connect_client(ClientId(1), sink).await;

    bridge
        .forward(ClientId(1), Some("pi"), &HardwareRequest::ListCameras)
        .await
        .expect("forward");
    let id = request_id(&mut agent);

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(bridge.pending_len().await, 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(bridge.pending_len().await, 0);

    assert!(!bridge.relay("pi", response(id)).await);
    assert!(relayed(&mut client).is_empty());
}

#[tokio::test(start_paused = true)]
async fn timely_response_is_delivered_once() {
    let (bridge, mut agent) = bridge_with_agent().await;
    let (sink, mut client) = outbox();
    bridge.connect_client(ClientId(1), sink).await;

    bridge
        .forward(ClientId(1), Some("pi"), &HardwareRequest::ListCameras)
        .await
        .expect("forward");
    let id = request_id(&mut agent);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(bridge.relay("pi", response(id.clone())).await);
    assert!(!bridge.relay("pi", response(id)).await);

    let events = relayed(&mut client);
    assert_eq!(events.len(), 1);
    let ServerEvent::HardwareRelay { event, payload } = &events[0] else {
        unreachable!();
    };
    assert_eq!(*event, "hardware:camerasList");
    assert_eq!(payload["cameras"], Value::Array(vec![Value::from(0)]));

    // The expiry timer finds nothing left to remove.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(bridge.pending_len().await, 0);
}

#[tokio::test]
async fn offline_agent_cannot_be_used() {
    let (bridge, _agent) = bridge_with_agent().await;
    let connection = codecraft_kernel::AgentConnection {
        agent_id: "pi".to_string(),
        generation: 1,
    };
    let (sink, mut client) = outbox();
    bridge.connect_client(ClientId(9), sink).await;

    bridge.agent_disconnected(&connection).await;
    assert_eq!(
        client.drain(),
        vec![ServerEvent::AgentDisconnected {
            id: "pi".to_string()
        }]
    );

    assert_eq!(
        bridge.select_agent("pi").await.unwrap_err().to_string(),
        "Agent offline"
    );
    let err = bridge
        .forward(ClientId(9), Some("pi"), &HardwareRequest::CameraCapture)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No agent selected or agent offline");
}
