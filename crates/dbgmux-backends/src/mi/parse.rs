//! Parsers for MI command results
//!
//! These consume the `^done,...` result records a command saved while it
//! executed and produce domain values. A malformed record aborts only that
//! record: the command still completes with whatever was extracted.

use super::records::{parse_map, RecordCursor, Value};
use dbgmux_core::{Breakpoint, BreakpointAction, Location, StackArgument, StackFrame};
use tracing::debug;

/// Find the first saved result of the given class ("done", "error", ...)
/// and return its body.
pub fn result_body<'a>(results: &'a [String], class: &str) -> Option<&'a str> {
    results.iter().find_map(|r| {
        let rest = r.strip_prefix(class)?;
        if rest.is_empty() {
            Some("")
        } else {
            rest.strip_prefix(',')
        }
    })
}

fn parse_record(body: &str) -> Option<super::records::Map> {
    let record = format!("{}}}", body);
    let mut cur = RecordCursor::new(&record);
    match parse_map(&mut cur) {
        Ok(map) => Some(map),
        Err(err) => {
            debug!(%err, "skipping malformed result record");
            None
        }
    }
}

/// Parse `done,BreakpointTable={...,body=[bkpt={...},...]}` into the
/// (breakpoints, other) pair. Entries with a file+line location land in the
/// first list; watchpoints and location-less entries in the second.
pub fn parse_breakpoint_table(results: &[String]) -> (Vec<Breakpoint>, Vec<Breakpoint>) {
    let mut breakpoints = Vec::new();
    let mut other = Vec::new();

    let Some(body) = result_body(results, "done") else {
        return (breakpoints, other);
    };
    let Some(map) = parse_record(body) else {
        return (breakpoints, other);
    };
    let entries = map
        .get("BreakpointTable")
        .and_then(Value::as_map)
        .and_then(|t| t.get("body"))
        .and_then(Value::as_list);
    let Some(entries) = entries else {
        return (breakpoints, other);
    };

    for entry in entries {
        let Some(fields) = entry.as_map() else {
            continue;
        };
        let Some(bp) = breakpoint_from_fields(fields) else {
            debug!("skipping unparsable breakpoint entry");
            continue;
        };
        let is_watchpoint = fields
            .get("type")
            .and_then(Value::as_text)
            .map(|t| t.contains("watchpoint"))
            .unwrap_or(false);
        if !is_watchpoint && bp.location.is_valid_source() {
            breakpoints.push(bp);
        } else {
            other.push(bp);
        }
    }

    (breakpoints, other)
}

fn breakpoint_from_fields(fields: &super::records::Map) -> Option<Breakpoint> {
    let index = fields.get("number")?.as_text()?.parse().ok()?;

    let file = fields
        .get("fullname")
        .or_else(|| fields.get("file"))
        .and_then(Value::as_text);
    let line = fields
        .get("line")
        .and_then(Value::as_text)
        .and_then(|l| l.parse().ok());

    let location = match (file, line) {
        (Some(file), Some(line)) => Location::line(file, line),
        _ => match fields.get("addr").and_then(Value::as_text) {
            Some(addr) => Location::address(addr),
            None => return None,
        },
    };

    let mut bp = Breakpoint::pending(location);
    bp.debugger_index = index;
    bp.function_name = fields
        .get("func")
        .and_then(Value::as_text)
        .map(str::to_string);
    bp.enabled = fields.get("enabled").and_then(Value::as_text) != Some("n");
    bp.action = match fields.get("disp").and_then(Value::as_text) {
        Some("del") => BreakpointAction::RemoveAfterHit,
        Some("dis") => BreakpointAction::DisableAfterHit,
        _ => BreakpointAction::Keep,
    };
    bp.condition = fields
        .get("cond")
        .and_then(Value::as_text)
        .map(str::to_string);
    bp.ignore_count = fields
        .get("ignore")
        .and_then(Value::as_text)
        .and_then(|i| i.parse().ok())
        .unwrap_or(0);
    Some(bp)
}

/// Parse `done,stack=[frame={level="0",...},...]` into frame skeletons,
/// innermost first (the backend already enumerates level 0 first).
pub fn parse_stack_frames(results: &[String]) -> Vec<StackFrame> {
    let Some(body) = result_body(results, "done") else {
        return Vec::new();
    };
    let Some(map) = parse_record(body) else {
        return Vec::new();
    };
    let Some(frames) = map.get("stack").and_then(Value::as_list) else {
        return Vec::new();
    };

    frames
        .iter()
        .filter_map(|f| {
            let fields = f.as_map()?;
            let index = fields.get("level")?.as_text()?.parse().ok()?;
            let func = fields
                .get("func")
                .and_then(Value::as_text)
                .unwrap_or("??")
                .to_string();
            let location = fields
                .get("fullname")
                .or_else(|| fields.get("file"))
                .and_then(Value::as_text)
                .and_then(|file| {
                    let line = fields.get("line")?.as_text()?.parse().ok()?;
                    Some(Location::line(file, line))
                });
            Some(StackFrame::new(index, func, location))
        })
        .collect()
}

/// Parse `done,stack-args=[frame={level="0",args=[...]},...]` into
/// per-frame argument lists.
pub fn parse_stack_arguments(results: &[String]) -> Vec<(u32, Vec<StackArgument>)> {
    let Some(body) = result_body(results, "done") else {
        return Vec::new();
    };
    let Some(map) = parse_record(body) else {
        return Vec::new();
    };
    let Some(frames) = map.get("stack-args").and_then(Value::as_list) else {
        return Vec::new();
    };

    frames
        .iter()
        .filter_map(|f| {
            let fields = f.as_map()?;
            let index = fields.get("level")?.as_text()?.parse().ok()?;
            let args = fields
                .get("args")
                .and_then(Value::as_list)
                .map(|args| {
                    args.iter()
                        .filter_map(|a| {
                            let arg = a.as_map()?;
                            Some(StackArgument {
                                name: arg.get("name")?.as_text()?.to_string(),
                                value: arg
                                    .get("value")
                                    .and_then(Value::as_text)
                                    .unwrap_or("")
                                    .to_string(),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some((index, args))
        })
        .collect()
}

/// Parse `done,threads=[{id="1",name=...},...]` into (id, name) pairs.
pub fn parse_thread_list(results: &[String]) -> Vec<(u64, String)> {
    let Some(body) = result_body(results, "done") else {
        return Vec::new();
    };
    let Some(map) = parse_record(body) else {
        return Vec::new();
    };
    let Some(threads) = map.get("threads").and_then(Value::as_list) else {
        return Vec::new();
    };

    threads
        .iter()
        .filter_map(|t| {
            let fields = t.as_map()?;
            let id = fields.get("id")?.as_text()?.parse().ok()?;
            let name = fields
                .get("name")
                .or_else(|| fields.get("target-id"))
                .and_then(Value::as_text)
                .unwrap_or("")
                .to_string();
            Some((id, name))
        })
        .collect()
}

/// Parse the current frame from `done,frame={...}` (stop-location query).
pub fn parse_current_frame(results: &[String]) -> Option<Location> {
    let body = result_body(results, "done")?;
    let map = parse_record(body)?;
    let frame = map.get("frame")?.as_map()?;
    let file = frame
        .get("fullname")
        .or_else(|| frame.get("file"))
        .and_then(Value::as_text)?;
    let line = frame.get("line")?.as_text()?.parse().ok()?;
    Some(Location::line(file, line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(s: &str) -> Vec<String> {
        vec![s.to_string()]
    }

    #[test]
    fn test_parse_breakpoint_table() {
        let (bps, other) = parse_breakpoint_table(&results(
            "done,BreakpointTable={nr_rows=\"2\",body=[\
             bkpt={number=\"1\",type=\"breakpoint\",disp=\"keep\",enabled=\"y\",\
             func=\"main\",file=\"main.c\",fullname=\"/src/main.c\",line=\"10\",\
             cond=\"x > 2\",ignore=\"3\"},\
             bkpt={number=\"2\",type=\"hw watchpoint\",enabled=\"y\",addr=\"0x4010\"}]}",
        ));

        assert_eq!(bps.len(), 1);
        assert_eq!(other.len(), 1);

        let bp = &bps[0];
        assert_eq!(bp.debugger_index, 1);
        assert_eq!(bp.line_number(), Some(10));
        assert_eq!(bp.function_name.as_deref(), Some("main"));
        assert!(bp.enabled);
        assert_eq!(bp.action, BreakpointAction::Keep);
        assert_eq!(bp.condition.as_deref(), Some("x > 2"));
        assert_eq!(bp.ignore_count, 3);
    }

    #[test]
    fn test_disabled_and_temporary_flags() {
        let (bps, _) = parse_breakpoint_table(&results(
            "done,BreakpointTable={body=[\
             bkpt={number=\"4\",type=\"breakpoint\",disp=\"del\",enabled=\"n\",\
             file=\"a.c\",line=\"5\"}]}",
        ));
        assert_eq!(bps[0].action, BreakpointAction::RemoveAfterHit);
        assert!(!bps[0].enabled);
    }

    #[test]
    fn test_empty_table() {
        let (bps, other) =
            parse_breakpoint_table(&results("done,BreakpointTable={body=[]}"));
        assert!(bps.is_empty());
        assert!(other.is_empty());
    }

    #[test]
    fn test_malformed_table_yields_nothing() {
        let (bps, other) = parse_breakpoint_table(&results("done,BreakpointTable={body=[bk"));
        assert!(bps.is_empty());
        assert!(other.is_empty());
    }

    #[test]
    fn test_parse_stack_frames() {
        let frames = parse_stack_frames(&results(
            "done,stack=[\
             frame={level=\"0\",func=\"inner\",file=\"a.c\",fullname=\"/src/a.c\",line=\"3\"},\
             frame={level=\"1\",func=\"main\",file=\"a.c\",line=\"9\"}]",
        ));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].index, 0);
        assert_eq!(frames[0].function_name, "inner");
        assert_eq!(frames[1].location.as_ref().unwrap().line_number(), Some(9));
    }

    #[test]
    fn test_parse_stack_arguments() {
        let args = parse_stack_arguments(&results(
            "done,stack-args=[\
             frame={level=\"0\",args=[{name=\"x\",value=\"1\"},{name=\"y\",value=\"2\"}]},\
             frame={level=\"1\",args=[]}]",
        ));
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].0, 0);
        assert_eq!(args[0].1.len(), 2);
        assert_eq!(args[0].1[1].name, "y");
        assert!(args[1].1.is_empty());
    }

    #[test]
    fn test_parse_thread_list() {
        let threads = parse_thread_list(&results(
            "done,threads=[{id=\"1\",target-id=\"Thread 0x1\",name=\"worker\"},{id=\"2\",target-id=\"Thread 0x2\"}]",
        ));
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0], (1, "worker".to_string()));
        assert_eq!(threads[1], (2, "Thread 0x2".to_string()));
    }

    #[test]
    fn test_parse_current_frame() {
        let loc = parse_current_frame(&results(
            "done,frame={level=\"0\",func=\"main\",file=\"main.c\",fullname=\"/src/main.c\",line=\"22\"}",
        ))
        .unwrap();
        assert_eq!(loc.line_number(), Some(22));
    }

    #[test]
    fn test_error_result_is_not_done() {
        assert!(parse_current_frame(&results("error,msg=\"No stack.\"")).is_none());
    }
}
