//! Integration tests: hooks installed in a simulated process, calls fired
//! through the probes, records checked at the sink.

use std::sync::Arc;

use xpcspy_agent::simulate::SimulatedProcess;
use xpcspy_agent::{AgentError, Handle, InstrumentationSession, MemorySink};
use xpcspy_shared::types::events::{DataEvent, HostMessage, SymbolEvent};
use xpcspy_shared::types::filter::{Direction, Filter};
use xpcspy_shared::utils::hex_to_bytes;

/// `{"name": "sync", "count": 3}`
const NAME_COUNT: &str = "62706c6973743030d20102030455636f756e74546e616d6510035473796e63080d13181a000000000000010100000000000000050000000000000000000000000000001f";

const SEND: &str = "xpc_connection_send_message";
const RECEIVE: &str = "_xpc_connection_call_event_handler";

fn install(
    process: SimulatedProcess,
    filter: Filter,
    should_decode: bool,
) -> (Arc<SimulatedProcess>, Arc<MemorySink>) {
    let process = Arc::new(process);
    let sink = Arc::new(MemorySink::new());
    let session = InstrumentationSession::init(&*process, process.clone(), sink.clone())
        .expect("session init");
    session
        .install_hooks(&*process, &filter, should_decode)
        .expect("install hooks");
    (process, sink)
}

fn symbols(sink: &MemorySink) -> Vec<SymbolEvent> {
    sink.records()
        .into_iter()
        .filter_map(|r| match r {
            HostMessage::Symbol(e) => Some(e),
            _ => None,
        })
        .collect()
}

fn data(sink: &MemorySink) -> Vec<DataEvent> {
    sink.records()
        .into_iter()
        .filter_map(|r| match r {
            HostMessage::Data(e) => Some(e),
            _ => None,
        })
        .collect()
}

#[test]
fn test_outgoing_filter_admits_matching_channel_only() {
    let mut process = SimulatedProcess::new();
    let sync = process.add_connection(Some("com.example.sync"), 100);
    let other = process.add_connection(Some("other.service"), 200);
    let message = process.add_dictionary(vec![]);

    let (process, sink) = install(process, Filter::new(Direction::Outgoing, "com.example.*"), true);

    assert_eq!(
        process.attached_symbols(),
        vec![
            "xpc_connection_send_message",
            "xpc_connection_send_message_with_reply",
            "xpc_connection_send_message_with_reply_sync",
            "xpc_connection_send_notification",
        ]
    );

    process.fire(SEND, &[sync.0, message.0]);
    process.fire(SEND, &[other.0, message.0]);
    assert_eq!(process.fire(RECEIVE, &[sync.0, message.0]), 0);

    let records = sink.records();
    assert_eq!(records[0], HostMessage::HooksInstalled);

    let symbols = symbols(&sink);
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0].symbolic_name, SEND);

    let data = data(&sink);
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].timestamp, symbols[0].timestamp);
    assert!(data[0].connection_description.contains("com.example.sync"));
}

#[test]
fn test_payload_is_spliced_below_its_key() {
    let mut process = SimulatedProcess::new();
    let conn = process.add_connection(Some("com.example.sync"), 100);
    let status = process.add_string("ok");
    let payload = process.add_data(&hex_to_bytes(NAME_COUNT).unwrap());
    let message = process.add_dictionary(vec![
        ("status".to_string(), status),
        ("payload".to_string(), payload),
    ]);

    let (process, sink) = install(process, Filter::default(), true);
    process.fire(SEND, &[conn.0, message.0]);

    let data = data(&sink);
    assert_eq!(data.len(), 1);
    let description = &data[0].message_description;

    let lines: Vec<&str> = description.lines().collect();
    let payload_line = lines
        .iter()
        .position(|l| l.contains("\"payload\" =>"))
        .unwrap();
    assert_eq!(
        lines[payload_line + 1],
        "Parsed bplist00 data for key 'payload': "
    );
    assert_eq!(
        &lines[payload_line + 2..payload_line + 6],
        &["{", "    count = 3;", "    name = sync;", "}"]
    );
    assert_eq!(lines.last(), Some(&"}>"));
    assert!(lines.iter().any(|l| l.contains("\"status\" =>")));
}

#[test]
fn test_decoding_disabled_keeps_raw_description() {
    let mut process = SimulatedProcess::new();
    let conn = process.add_connection(Some("com.example.sync"), 100);
    let payload = process.add_data(&hex_to_bytes(NAME_COUNT).unwrap());
    let message = process.add_dictionary(vec![("payload".to_string(), payload)]);

    let (process, sink) = install(process, Filter::default(), false);
    process.fire(SEND, &[conn.0, message.0]);

    let data = data(&sink);
    assert!(!data[0].message_description.contains("Parsed"));
}

#[test]
fn test_concurrent_calls_pair_by_timestamp() {
    let mut process = SimulatedProcess::new();
    let conn = process.add_connection(Some("com.example.sync"), 100);
    let payload = process.add_data(&hex_to_bytes(NAME_COUNT).unwrap());
    let message = process.add_dictionary(vec![("payload".to_string(), payload)]);

    let (process, sink) = install(process, Filter::default(), true);

    let threads: Vec<_> = (0..2)
        .map(|_| {
            let process = Arc::clone(&process);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    process.fire(SEND, &[conn.0, message.0]);
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let mut symbol_times: Vec<u64> = symbols(&sink).iter().map(|e| e.timestamp).collect();
    let mut data_times: Vec<u64> = data(&sink).iter().map(|e| e.timestamp).collect();
    assert_eq!(symbol_times.len(), 100);
    symbol_times.sort_unstable();
    data_times.sort_unstable();
    assert_eq!(symbol_times, data_times);
}

#[test]
fn test_symbol_precedes_data_for_each_call() {
    let mut process = SimulatedProcess::new();
    let conn = process.add_connection(Some("a"), 1);
    let message = process.add_dictionary(vec![]);

    let (process, sink) = install(process, Filter::default(), true);
    process.fire(SEND, &[conn.0, message.0]);
    process.fire(RECEIVE, &[conn.0, message.0]);

    let kinds: Vec<&str> = sink
        .records()
        .iter()
        .map(|r| match r {
            HostMessage::HooksInstalled => "installed",
            HostMessage::Symbol(_) => "symbol",
            HostMessage::Data(_) => "data",
        })
        .collect();
    assert_eq!(kinds, vec!["installed", "symbol", "data", "symbol", "data"]);
}

#[test]
fn test_peer_connections_need_match_all() {
    let mut process = SimulatedProcess::new();
    let peer = process.add_connection(None, 300);
    let message = process.add_dictionary(vec![]);

    let (process, sink) = install(process, Filter::new(Direction::All, "*"), true);
    process.fire(RECEIVE, &[peer.0, message.0]);
    assert_eq!(symbols(&sink).len(), 1);

    let mut process = SimulatedProcess::new();
    let peer = process.add_connection(None, 300);
    let message = process.add_dictionary(vec![]);

    let (process, sink) = install(process, Filter::new(Direction::All, "com.*"), true);
    process.fire(RECEIVE, &[peer.0, message.0]);
    assert!(symbols(&sink).is_empty());
}

#[test]
fn test_invalid_message_fails_only_that_call() {
    let mut process = SimulatedProcess::new();
    let conn = process.add_connection(Some("com.example.sync"), 100);
    let message = process.add_dictionary(vec![]);

    let (process, sink) = install(process, Filter::default(), true);
    process.fire(SEND, &[conn.0, 0xdead]);
    process.fire(SEND, &[conn.0, message.0]);

    // Both calls were admitted; only the second could be described.
    assert_eq!(symbols(&sink).len(), 2);
    let data = data(&sink);
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].timestamp, symbols(&sink)[1].timestamp);
}

#[test]
fn test_invalid_connection_is_dropped_before_symbol() {
    let mut process = SimulatedProcess::new();
    let message = process.add_dictionary(vec![]);

    let (process, sink) = install(process, Filter::new(Direction::All, "com.*"), true);
    process.fire(SEND, &[0xbad, message.0]);

    assert_eq!(sink.records(), vec![HostMessage::HooksInstalled]);
}

#[test]
fn test_missing_private_symbol_aborts_startup() {
    let process = Arc::new(SimulatedProcess::new().without_symbol(RECEIVE));
    let sink = Arc::new(MemorySink::new());

    match InstrumentationSession::init(&*process, process.clone(), sink.clone()) {
        Err(AgentError::UnresolvedSymbol { symbol }) => assert_eq!(symbol, RECEIVE),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("session started without {}", RECEIVE),
    }
    assert!(sink.is_empty());
}

#[test]
fn test_incoming_only_hooks_event_handler() {
    let process = SimulatedProcess::new();
    let (process, sink) = install(process, Filter::new(Direction::Incoming, "*"), true);

    assert_eq!(process.attached_symbols(), vec![RECEIVE]);
    assert_eq!(sink.records(), vec![HostMessage::HooksInstalled]);
    assert_eq!(process.fire(SEND, &[Handle::NULL.0, Handle::NULL.0]), 0);
}

#[test]
fn test_bplist15_payload_next_to_integer_status() {
    let blob = b"bplist15\x00\x00\x00\x00\x10\x00\x00\x00opaque".to_vec();
    let mut process = SimulatedProcess::new();
    process.register_plist15(&blob, "{\n    kind = refresh;\n}");
    let conn = process.add_connection(Some("com.example.sync"), 100);
    let status = process.add_int64(1);
    let payload = process.add_data(&blob);
    let message = process.add_dictionary(vec![
        ("status".to_string(), status),
        ("payload".to_string(), payload),
    ]);

    let (process, sink) = install(process, Filter::default(), true);
    process.fire(SEND, &[conn.0, message.0]);

    let description = data(&sink).remove(0).message_description;
    let lines: Vec<&str> = description.lines().collect();
    let payload_line = lines.iter().position(|l| l.contains("\"payload\"")).unwrap();
    assert_eq!(
        &lines[payload_line + 1..payload_line + 5],
        &[
            "Parsed bplist15 data for key 'payload': ",
            "{",
            "    kind = refresh;",
            "}"
        ]
    );
    assert_eq!(description.matches("Parsed").count(), 1);
}
