//! Integration tests for the ami-core message model and state machines.
//!
//! These tests push serialized actions and scripted server output through
//! the public API: splitter, classifier, parser, aggregator, correlator and
//! dispatcher together.

use std::sync::{Arc, Mutex};

use ami_core::{
    domain::{CallOutcome, Correlator, Dispatcher, ListAggregator, Listener, Offer},
    protocol::{
        classify, ActionId, ActionMessage, CoreShowChannelsAction, DbGetAction, EventMessage,
        FrameKind, FrameSplitter, IncomingMessage, LoginAction, OriginateAction, ResponseMessage,
        SetVarAction,
    },
};

/// Serializes `action`, splits it back out of a byte stream and parses it.
fn roundtrip(action: &ActionMessage) -> IncomingMessage {
    let wire = action.serialize();
    let mut splitter = FrameSplitter::new();
    let frames = splitter.feed(wire.as_bytes()).expect("feed must succeed");
    assert_eq!(frames.len(), 1, "one action must yield one frame");
    assert_eq!(splitter.buffered_len(), 0, "nothing may remain buffered");
    IncomingMessage::parse(&frames[0])
}

fn assert_same_fields(action: &ActionMessage, parsed: &IncomingMessage) {
    assert_eq!(parsed.envelope().keys(), action.envelope().keys());
    assert_eq!(parsed.envelope().variables(), action.envelope().variables());
}

#[test]
fn test_roundtrip_login_action() {
    let action: ActionMessage = LoginAction::new("admin", "s3cret").with_events("off").into();

    let parsed = roundtrip(&action);

    assert_same_fields(&action, &parsed);
    assert_eq!(parsed.key("Action"), Some("Login"));
    assert_eq!(parsed.action_id(), Some(action.action_id().as_str()));
}

#[test]
fn test_roundtrip_originate_preserves_variable_multiplicity() {
    let action: ActionMessage = OriginateAction::new("SIP/100")
        .dial_extension("200", "default", "1")
        .with_variable("A", "1")
        .with_variable("A", "2")
        .with_variable("B", "x=y")
        .into();

    let parsed = roundtrip(&action);

    assert_same_fields(&action, &parsed);
    assert_eq!(parsed.envelope().variable("a").map(|v| v.len()), Some(2));
    assert_eq!(parsed.envelope().variable("b").and_then(|v| v.first()), Some("x=y"));
}

#[test]
fn test_roundtrip_with_explicit_action_id() {
    let id = ActionId::new("call-42").unwrap();
    let action: ActionMessage = SetVarAction::new("FOO", "bar")
        .on_channel("SIP/100-1")
        .into();
    let action = action.action_id_override(id);

    let parsed = roundtrip(&action);

    assert_same_fields(&action, &parsed);
    assert_eq!(parsed.action_id(), Some("call-42"));
}

#[test]
fn test_roundtrip_keys_survive_case_changes() {
    let action = ActionMessage::new("Command").key("COMMAND", "core show version");

    let parsed = roundtrip(&action);

    assert_eq!(parsed.key("command"), Some("core show version"));
    assert_eq!(parsed.key("Command"), Some("core show version"));
}

#[test]
fn test_list_flow_through_aggregator_and_correlator() {
    // Arrange: an outstanding CoreShowChannels call and the server's answer
    // delivered in awkward chunks.
    let action: ActionMessage = CoreShowChannelsAction.into();
    let id = action.action_id().as_str().to_string();
    let correlator = Correlator::new();
    let dispatcher = Dispatcher::new();
    let results: Arc<Mutex<Vec<CallOutcome>>> = Arc::default();
    let sink = Arc::clone(&results);
    correlator
        .register(action.action_id().clone(), Box::new(move |o| sink.lock().unwrap().push(o)))
        .unwrap();
    let unrelated = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&unrelated);
    dispatcher.register(Listener::from_fn(move |e: &EventMessage| {
        seen.lock().unwrap().push(e.name().to_string());
        Ok(())
    }));

    let stream = format!(
        "Response: Success\r\nActionID: {id}\r\nEventList: start\r\nMessage: Channels will follow\r\n\r\n\
         Event: CoreShowChannel\r\nActionID: {id}\r\nChannel: SIP/100-1\r\n\r\n\
         Event: Hangup\r\nChannel: SIP/300-9\r\n\r\n\
         Event: CoreShowChannel\r\nActionID: {id}\r\nChannel: SIP/200-2\r\n\r\n\
         Event: CoreShowChannelsComplete\r\nActionID: {id}\r\nEventList: Complete\r\nListItems: 2\r\n\r\n"
    );

    // Act
    let mut splitter = FrameSplitter::new();
    let mut aggregator = ListAggregator::new();
    for chunk in stream.as_bytes().chunks(7) {
        for frame in splitter.feed(chunk).unwrap() {
            match classify(&frame) {
                FrameKind::Response => {
                    let response = ResponseMessage::parse(&frame);
                    if response.is_list() {
                        aggregator.open(response).unwrap();
                    } else {
                        correlator.resolve(response);
                    }
                }
                FrameKind::Event => match aggregator.offer(EventMessage::parse(&frame)) {
                    Offer::Completed(response) => {
                        assert!(correlator.resolve(response));
                    }
                    Offer::Unclaimed(event) => {
                        dispatcher.dispatch(&event);
                    }
                    Offer::Absorbed => {}
                },
                FrameKind::Malformed => panic!("unexpected malformed frame: {frame:?}"),
            }
        }
    }

    // Assert
    let results = results.lock().unwrap();
    assert_eq!(results.len(), 1);
    let response = results[0].as_ref().unwrap();
    assert!(response.is_complete());
    let channels: Vec<_> = response.events().iter().filter_map(|e| e.channel()).collect();
    assert_eq!(channels, vec!["SIP/100-1", "SIP/200-2"]);
    assert_eq!(*unrelated.lock().unwrap(), vec!["Hangup"]);
    assert_eq!(aggregator.open_count(), 0);
}

#[test]
fn test_db_get_list_closes_on_db_get_response() {
    let action: ActionMessage = DbGetAction::new("cidname", "5551234").into();
    let id = action.action_id().as_str();
    let mut aggregator = ListAggregator::new();
    aggregator
        .open(ResponseMessage::parse(&format!(
            "Response: Success\r\nActionID: {id}\r\nMessage: Result will follow"
        )))
        .unwrap();

    let offer = aggregator.offer(EventMessage::parse(&format!(
        "Event: DBGetResponse\r\nActionID: {id}\r\nFamily: cidname\r\nKey: 5551234\r\nVal: Alice"
    )));

    let Offer::Completed(response) = offer else {
        panic!("DBGetResponse must close the list");
    };
    assert_eq!(response.events()[0].key("val"), Some("Alice"));
}

#[test]
fn test_channel_variables_from_wire_frame() {
    let wire = "Event: Newchannel\r\nChannel: SIP/100-1\r\nChanVariable(sip/100-1): CALLERID=Bob\r\n\r\n";
    let mut splitter = FrameSplitter::new();

    let frames = splitter.feed(wire.as_bytes()).unwrap();
    let event = EventMessage::parse(&frames[0]);

    assert_eq!(
        event.all_channel_variables()["sip/100-1"]["callerid"],
        "Bob"
    );
}
