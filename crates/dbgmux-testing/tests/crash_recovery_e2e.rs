//! End-to-end: backend crash cancels everything, session state resets
//!
//! Loss of the backend connection finishes every outstanding command with
//! failure, resets the link, and reports a restart condition. No command
//! survives implicitly.

use dbgmux_backends::mi::MiLink;
use dbgmux_core::{DebugEvent, Error};
use dbgmux_link::{DebuggerLink, Disposition, FnCommand, Payload};
use dbgmux_testing::fixtures::mi;
use dbgmux_testing::{mock_transport, EventCollector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn crash_fails_outstanding_commands() {
    let (transport, mut backend) = mock_transport();
    let mut link = MiLink::new(transport, Vec::new());
    let mut events = EventCollector::new(link.subscribe());

    backend.emit(mi::PROMPT).await;
    link.process_available().await.unwrap();
    backend.emit(mi::reading_symbols("/src/demo")).await;
    link.process_available().await.unwrap();
    events.discard();

    // two commands in flight, neither will ever complete
    let failures = Arc::new(AtomicUsize::new(0));
    for payload in ["-stack-list-frames", "-thread-info"] {
        let failures = failures.clone();
        link.send_command(Box::new(FnCommand::new(
            Payload::text(payload),
            move |success, _, _| {
                if !success {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
                Disposition::Dispose
            },
        )))
        .await
        .unwrap();
    }

    backend.close().await;
    let err = link.process_available().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    assert_eq!(failures.load(Ordering::SeqCst), 2, "both commands failed");
    assert!(!link.debugger_has_started(), "session state reset");

    let broadcast = events.take();
    assert!(broadcast
        .iter()
        .any(|e| matches!(e, DebugEvent::UserOutput { is_error: true, .. })));
    assert!(
        broadcast.contains(&DebugEvent::DebuggerRestarted),
        "symbols were loaded, so a restart condition is reported"
    );
}

#[tokio::test]
async fn stale_reply_after_restart_is_discarded() {
    let (transport, mut backend) = mock_transport();
    let mut link = MiLink::new(transport, Vec::new());

    backend.emit(mi::PROMPT).await;
    link.process_available().await.unwrap();

    // command 1 goes out, then the session restarts before the reply
    link.send_command(Box::new(FnCommand::new(
        Payload::text("-break-list"),
        |success, _, _| {
            assert!(!success, "only the cancellation may finish this command");
            Disposition::Dispose
        },
    )))
    .await
    .unwrap();
    link.restart().await.unwrap();

    // the old reply arrives anyway; it references an unknown transaction
    backend.emit(mi::PROMPT).await;
    link.process_available().await.unwrap();
    backend
        .emit(mi::empty_breakpoint_table_reply(1))
        .await;
    link.process_available().await.unwrap();

    // nothing blew up and nothing is outstanding
    assert!(link.debugger_has_started());
}
