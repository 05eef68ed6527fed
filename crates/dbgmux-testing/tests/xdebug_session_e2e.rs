//! End-to-end: a short script-engine session over the XML wire
//!
//! The engine connects, announces itself, stops at the first statement, and
//! the stop location reaches subscribers with the URI stripped to a path.

use dbgmux_backends::xdebug::XdLink;
use dbgmux_core::DebugEvent;
use dbgmux_link::DebuggerLink;
use dbgmux_testing::fixtures::xdebug;
use dbgmux_testing::{mock_transport, EventCollector};

#[tokio::test]
async fn session_reaches_first_stop() {
    let (transport, mut backend) = mock_transport();
    let mut link = XdLink::new(transport);
    let mut events = EventCollector::new(link.subscribe());

    backend
        .emit_message(&xdebug::init("dbgmux", "file:///src/index.php"))
        .await;
    link.process_available().await.unwrap();

    assert!(link.debugger_has_started());
    let seen = events.take();
    assert!(seen.contains(&DebugEvent::AttachedToProcess));

    // the init sequence issued feature_set (1) and step_into (2)
    let written = backend.drain_text().await;
    assert!(written.contains("step_into -i 2"));

    backend
        .emit_message(&xdebug::response_break(2, "file:///src/index.php", 3))
        .await;
    link.process_available().await.unwrap();

    let seen = events.take();
    assert!(seen.iter().any(|e| matches!(
        e,
        DebugEvent::ProgramStopped { location: Some(loc) }
            if loc.file_id().unwrap().display_name() == "/src/index.php"
                && loc.line_number() == Some(3)
    )));
}
