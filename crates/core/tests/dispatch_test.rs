//! Command dispatch: control messages and plugin artifact transfer.

use probehub_core::dispatch::{
    CommandDispatcher, TOPIC_LOAD_PLUGIN, TOPIC_UNLOAD_PLUGIN, TOPIC_UPDATE_CONFIG,
};
use probehub_core::frame::FrameCodec;
use probehub_core::managers::{AgentRegistry, PluginCatalog, SessionHandle};
use probehub_core::test_utils::{test_agent_info, test_descriptor, MockTransport};
use probehub_shared::{ControlMessage, HubError, PluginDescriptor};
use std::sync::Arc;
use std::time::Duration;

fn dispatcher_with(
    descriptors: Vec<PluginDescriptor>,
) -> (CommandDispatcher, Arc<AgentRegistry>) {
    let registry = Arc::new(AgentRegistry::new());
    let catalog = Arc::new(PluginCatalog::new(descriptors));
    (CommandDispatcher::new(registry.clone(), catalog), registry)
}

fn attach(registry: &AgentRegistry, agent_id: &str) -> Arc<MockTransport> {
    let transport = MockTransport::new();
    let session = SessionHandle::spawn(agent_id, transport.clone(), 16);
    registry.register(test_agent_info(agent_id), session);
    transport
}

#[tokio::test]
async fn load_plugin_ships_one_frame_with_control_and_artifact() {
    let artifact = vec![0xAAu8; 4096];
    let (dispatcher, registry) =
        dispatcher_with(vec![test_descriptor("coverage", Some(artifact.clone()))]);
    let transport = attach(&registry, "jvm-1");

    dispatcher.load_plugin("jvm-1", "coverage").await.unwrap();

    let binaries = transport.binaries.lock().unwrap();
    assert_eq!(binaries.len(), 1);
    assert!(transport.texts.lock().unwrap().is_empty());

    let (control, shipped) = FrameCodec::decode(&binaries[0]).unwrap();
    let message: ControlMessage = serde_json::from_slice(&control).unwrap();
    assert_eq!(message.destination, TOPIC_LOAD_PLUGIN);
    assert_eq!(message.payload, "coverage");
    assert_eq!(shipped.as_ref(), artifact.as_slice());
}

#[tokio::test]
async fn load_plugin_unknown_agent_sends_nothing() {
    let (dispatcher, _registry) = dispatcher_with(vec![test_descriptor("coverage", Some(vec![1]))]);

    let err = dispatcher.load_plugin("ghost", "coverage").await.unwrap_err();
    assert!(matches!(err, HubError::AgentNotFound(agent) if agent == "ghost"));
}

#[tokio::test]
async fn load_plugin_unknown_plugin_sends_nothing() {
    let (dispatcher, registry) = dispatcher_with(vec![]);
    let transport = attach(&registry, "jvm-1");

    let err = dispatcher.load_plugin("jvm-1", "ghost").await.unwrap_err();
    assert!(matches!(err, HubError::PluginNotFound(plugin) if plugin == "ghost"));
    assert_eq!(transport.send_count(), 0);
}

#[tokio::test]
async fn load_plugin_without_artifact_is_not_found() {
    let (dispatcher, registry) = dispatcher_with(vec![test_descriptor("control-only", None)]);
    let transport = attach(&registry, "jvm-1");

    let err = dispatcher
        .load_plugin("jvm-1", "control-only")
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::PluginNotFound(_)));
    assert_eq!(transport.send_count(), 0);
}

#[tokio::test]
async fn unload_plugin_sends_control_message() {
    let (dispatcher, registry) = dispatcher_with(vec![test_descriptor("coverage", None)]);
    let transport = attach(&registry, "jvm-1");

    dispatcher.unload_plugin("jvm-1", "coverage").await.unwrap();

    let texts = transport.texts.lock().unwrap();
    assert_eq!(texts.len(), 1);
    let message: ControlMessage = serde_json::from_str(&texts[0]).unwrap();
    assert_eq!(message.destination, TOPIC_UNLOAD_PLUGIN);
    assert_eq!(message.payload, "coverage");
}

#[tokio::test]
async fn update_config_sends_raw_config_as_payload() {
    let (dispatcher, registry) = dispatcher_with(vec![]);
    let transport = attach(&registry, "jvm-1");

    dispatcher
        .update_config("jvm-1", r#"{"level":"debug"}"#.to_string())
        .await
        .unwrap();

    let texts = transport.texts.lock().unwrap();
    assert_eq!(texts.len(), 1);
    let message: ControlMessage = serde_json::from_str(&texts[0]).unwrap();
    assert_eq!(message.destination, TOPIC_UPDATE_CONFIG);
    assert_eq!(message.payload, r#"{"level":"debug"}"#);
}

#[tokio::test]
async fn dispatch_to_closed_session_reports_session_closed() {
    let (dispatcher, registry) = dispatcher_with(vec![]);
    let session = SessionHandle::spawn("jvm-1", MockTransport::new(), 16);
    registry.register(test_agent_info("jvm-1"), session.clone());

    session.close();
    for _ in 0..200 {
        if session.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let err = dispatcher
        .update_config("jvm-1", "{}".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::SessionClosed(_)));
}

#[tokio::test]
async fn agent_info_round_trips_registration() {
    let (dispatcher, registry) = dispatcher_with(vec![]);
    attach(&registry, "jvm-1");

    let info = dispatcher.agent_info("jvm-1").unwrap();
    assert_eq!(info.id, "jvm-1");
    assert_eq!(info.name, "jvm-1-jvm");

    let err = dispatcher.agent_info("ghost").unwrap_err();
    assert!(matches!(err, HubError::AgentNotFound(_)));
}
