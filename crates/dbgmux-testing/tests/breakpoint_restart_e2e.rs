//! End-to-end: breakpoint survives a backend restart
//!
//! Set a breakpoint at main.c:10 while stopped, let the backend confirm it
//! under index 3, restart the backend, and verify the saved list is
//! replayed: the breakpoint is re-set by file+line, the fresh fetch comes
//! back under index 7, and the user's condition is reapplied onto the new
//! index. `has_breakpoint_at(main.c:10)` holds before and after.

use dbgmux_backends::mi::MiLink;
use dbgmux_core::{DebugEvent, Location};
use dbgmux_link::DebuggerLink;
use dbgmux_testing::fixtures::mi;
use dbgmux_testing::{mock_transport, EventCollector, MockBackend};

async fn pump(link: &mut MiLink) {
    link.process_available().await.expect("pump");
}

fn conditioned_table_reply(id: u64, index: u32) -> String {
    format!(
        "{}^done,BreakpointTable={{nr_rows=\"1\",body=[bkpt={{number=\"{}\",\
         type=\"breakpoint\",disp=\"keep\",enabled=\"y\",func=\"main\",\
         file=\"main.c\",fullname=\"main.c\",line=\"10\",cond=\"x > 2\"}}]}}\n{}{}",
        mi::begin_command(id),
        index,
        mi::end_command(id),
        mi::PROMPT
    )
}

async fn start_session(link: &mut MiLink, backend: &mut MockBackend) {
    backend.emit(mi::PROMPT).await;
    pump(link).await;
    backend.emit(mi::reading_symbols("/src/demo")).await;
    backend.emit(mi::PROMPT).await;
    pump(link).await;
    backend.drain_text().await;
}

#[tokio::test]
async fn breakpoint_state_survives_restart() {
    let (transport, mut backend) = mock_transport();
    let mut link = MiLink::new(transport, Vec::new());
    let mut events = EventCollector::new(link.subscribe());

    // --- session one -------------------------------------------------
    start_session(&mut link, &mut backend).await;
    assert!(link.has_loaded_symbols());

    link.set_breakpoint(&Location::parse("main.c:10").unwrap(), false)
        .await
        .unwrap();
    let written = backend.drain_text().await;
    assert!(written.contains("-break-insert main.c:10"));

    // the backend echoes the change marker; the manager fetches the list
    backend.emit(mi::breakpoints_changed_marker()).await;
    pump(&mut link).await;
    let written = backend.drain_text().await;
    assert!(written.contains("-break-list"));

    backend.emit(conditioned_table_reply(1, 3)).await;
    pump(&mut link).await;

    let at = Location::parse("main.c:10").unwrap();
    assert!(link.breakpoint_manager().has_breakpoint_at(&at));
    assert_eq!(link.breakpoint_manager().breakpoints()[0].debugger_index, 3);
    assert!(link.breakpoint_manager().breakpoints()[0].enabled);
    events.discard();

    // --- restart -----------------------------------------------------
    link.restart().await.unwrap();
    assert!(events
        .take()
        .contains(&DebugEvent::DebuggerRestarted));

    // --- session two -------------------------------------------------
    backend.emit(mi::PROMPT).await;
    pump(&mut link).await;
    backend.emit(mi::reading_symbols("/src/demo")).await;
    backend.emit(mi::PROMPT).await;
    pump(&mut link).await;

    // symbol load triggered the replay, by file+line rather than the stale
    // index
    let written = backend.drain_text().await;
    assert!(written.contains("-break-insert main.c:10"));
    assert!(link.breakpoint_manager().has_saved_list());

    // the re-set echoes back; the fresh fetch returns the same count under
    // a new index
    backend.emit(mi::breakpoints_changed_marker()).await;
    pump(&mut link).await;
    backend.emit(conditioned_table_reply(2, 7)).await;
    pump(&mut link).await;

    // positional merge reapplied the condition onto index 7
    let written = backend.drain_text().await;
    assert!(written.contains("condition 7 x > 2"));
    assert!(!link.breakpoint_manager().has_saved_list());

    let bp = &link.breakpoint_manager().breakpoints()[0];
    assert_eq!(bp.debugger_index, 7);
    assert!(bp.enabled, "enabled flag preserved across restart");
    assert!(link.breakpoint_manager().has_breakpoint_at(&at));
}

#[tokio::test]
async fn restart_with_missing_breakpoint_keeps_saved_list() {
    let (transport, mut backend) = mock_transport();
    let mut link = MiLink::new(transport, Vec::new());

    start_session(&mut link, &mut backend).await;

    // two confirmed breakpoints
    backend.emit(mi::breakpoints_changed_marker()).await;
    pump(&mut link).await;
    backend
        .emit(format!(
            "{}^done,BreakpointTable={{nr_rows=\"2\",body=[\
             bkpt={{number=\"1\",type=\"breakpoint\",disp=\"keep\",enabled=\"y\",\
             file=\"a.c\",fullname=\"a.c\",line=\"1\"}},\
             bkpt={{number=\"2\",type=\"breakpoint\",disp=\"keep\",enabled=\"n\",\
             file=\"b.c\",fullname=\"b.c\",line=\"2\"}}]}}\n{}{}",
            mi::begin_command(1),
            mi::end_command(1),
            mi::PROMPT
        ))
        .await;
    pump(&mut link).await;
    assert_eq!(link.breakpoint_manager().breakpoints().len(), 2);

    link.restart().await.unwrap();
    start_session(&mut link, &mut backend).await;
    assert!(link.breakpoint_manager().has_saved_list());

    // only one of the two came back: no reapplication, saved list retained
    backend.emit(mi::breakpoints_changed_marker()).await;
    pump(&mut link).await;
    backend
        .emit(mi::breakpoint_table_reply(2, 9, "a.c", 1))
        .await;
    pump(&mut link).await;

    assert!(
        link.breakpoint_manager().has_saved_list(),
        "length mismatch preserves the saved list for the next cycle"
    );
    let written = backend.drain_text().await;
    assert!(
        !written.contains("disable 9"),
        "no positional state was applied on a mismatched fetch"
    );
}
