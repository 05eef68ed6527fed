//! XML message parsing
//!
//! Each message is a complete small document with a root of `init` or
//! `response`. Everything interesting lives in attributes; error payloads
//! may be base64-encoded text. A malformed document aborts only that one
//! message.

use base64::Engine as _;
use dbgmux_core::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct XdBreakpoint {
    pub id: u32,
    pub filename: String,
    pub lineno: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XdFrame {
    pub level: u32,
    pub filename: String,
    pub lineno: u32,
    pub function: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XdDocument {
    /// Root element name: `init` or `response`.
    pub root: String,
    /// Root element attributes.
    pub attrs: HashMap<String, String>,
    /// `<breakpoint .../>` children of a breakpoint_list response.
    pub breakpoints: Vec<XdBreakpoint>,
    /// `<stack .../>` children of a stack_get response.
    pub frames: Vec<XdFrame>,
    /// `<error>` child message, base64-decoded when so encoded.
    pub error: Option<String>,
    /// Stop position from an engine `message` child (filename, lineno).
    pub stop_location: Option<(String, u32)>,
}

impl XdDocument {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn transaction_id(&self) -> Option<u64> {
        self.attr("transaction_id")?.parse().ok()
    }
}

fn attr_map(start: &BytesStart) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = String::from_utf8_lossy(&attr.value).to_string();
        map.insert(key, value);
    }
    map
}

fn local_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).to_string()
}

/// Parse one message into an [`XdDocument`].
pub fn parse_document(xml: &str) -> Result<XdDocument> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut doc = XdDocument::default();
    let mut depth = 0usize;
    let mut in_error = false;
    let mut error_encoding: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if handle_element(&mut doc, depth, &start) {
                    in_error = true;
                    error_encoding = attr_map(&start).get("encoding").cloned();
                }
                depth += 1;
            }
            Ok(Event::Empty(start)) => {
                handle_element(&mut doc, depth, &start);
            }
            Ok(Event::Text(text)) => {
                if in_error {
                    let raw = text
                        .unescape()
                        .map_err(|e| Error::Protocol(format!("bad XML text: {}", e)))?
                        .to_string();
                    let message = match error_encoding.as_deref() {
                        Some("base64") => base64::engine::general_purpose::STANDARD
                            .decode(raw.trim())
                            .ok()
                            .and_then(|bytes| String::from_utf8(bytes).ok())
                            .unwrap_or(raw),
                        _ => raw,
                    };
                    doc.error = Some(message);
                }
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                in_error = false;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Protocol(format!("malformed XML message: {}", e)));
            }
        }
    }

    if doc.root.is_empty() {
        return Err(Error::Protocol("XML message has no root element".to_string()));
    }
    Ok(doc)
}

/// Record an element's contribution to the document. Returns true when the
/// element opens an error payload (its text child is the message).
fn handle_element(doc: &mut XdDocument, depth: usize, start: &BytesStart) -> bool {
    let name = local_name(start);
    let attrs = attr_map(start);

    if depth == 0 {
        doc.root = name;
        doc.attrs = attrs;
        return false;
    }
    if depth != 1 {
        return false;
    }

    match name.as_str() {
        "breakpoint" => {
            if let Some(bp) = breakpoint_from(&attrs) {
                doc.breakpoints.push(bp);
            } else {
                debug!("skipping unparsable breakpoint element");
            }
        }
        "stack" => {
            if let Some(frame) = frame_from(&attrs) {
                doc.frames.push(frame);
            } else {
                debug!("skipping unparsable stack element");
            }
        }
        "error" => return true,
        "message" => {
            doc.stop_location = stop_location_from(&attrs);
        }
        _ => {}
    }
    false
}

fn breakpoint_from(attrs: &HashMap<String, String>) -> Option<XdBreakpoint> {
    Some(XdBreakpoint {
        id: attrs.get("id")?.parse().ok()?,
        filename: attrs.get("filename")?.clone(),
        lineno: attrs.get("lineno")?.parse().ok()?,
        enabled: attrs.get("state").map(String::as_str) != Some("disabled"),
    })
}

fn frame_from(attrs: &HashMap<String, String>) -> Option<XdFrame> {
    Some(XdFrame {
        level: attrs.get("level")?.parse().ok()?,
        filename: attrs.get("filename")?.clone(),
        lineno: attrs.get("lineno")?.parse().ok()?,
        function: attrs.get("where").cloned().unwrap_or_default(),
    })
}

fn stop_location_from(attrs: &HashMap<String, String>) -> Option<(String, u32)> {
    Some((
        attrs.get("filename")?.clone(),
        attrs.get("lineno")?.parse().ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_init() {
        let doc = parse_document(
            r#"<init xmlns="urn:debugger" idekey="dbgmux" fileuri="file:///src/index.php" language="PHP"/>"#,
        )
        .unwrap();
        assert_eq!(doc.root, "init");
        assert_eq!(doc.attr("idekey"), Some("dbgmux"));
        assert_eq!(doc.attr("fileuri"), Some("file:///src/index.php"));
    }

    #[test]
    fn test_parse_response_with_transaction_id() {
        let doc = parse_document(
            r#"<response command="step_into" transaction_id="7" status="break" reason="ok"/>"#,
        )
        .unwrap();
        assert_eq!(doc.root, "response");
        assert_eq!(doc.transaction_id(), Some(7));
        assert_eq!(doc.attr("status"), Some("break"));
    }

    #[test]
    fn test_parse_breakpoint_list() {
        let doc = parse_document(
            r#"<response command="breakpoint_list" transaction_id="3">
                 <breakpoint id="31" type="line" filename="file:///src/a.php" lineno="4" state="enabled"/>
                 <breakpoint id="32" type="line" filename="file:///src/b.php" lineno="9" state="disabled"/>
               </response>"#,
        )
        .unwrap();
        assert_eq!(doc.breakpoints.len(), 2);
        assert_eq!(doc.breakpoints[0].id, 31);
        assert!(doc.breakpoints[0].enabled);
        assert!(!doc.breakpoints[1].enabled);
        assert_eq!(doc.breakpoints[1].lineno, 9);
    }

    #[test]
    fn test_parse_stack() {
        let doc = parse_document(
            r#"<response command="stack_get" transaction_id="5">
                 <stack level="0" type="file" filename="file:///src/a.php" lineno="4" where="inner"/>
                 <stack level="1" type="file" filename="file:///src/a.php" lineno="9" where="{main}"/>
               </response>"#,
        )
        .unwrap();
        assert_eq!(doc.frames.len(), 2);
        assert_eq!(doc.frames[0].function, "inner");
        assert_eq!(doc.frames[1].lineno, 9);
    }

    #[test]
    fn test_parse_base64_error() {
        // "no such file" in base64
        let doc = parse_document(
            r#"<response command="source" transaction_id="2" status="break" reason="error">
                 <error code="100" encoding="base64">bm8gc3VjaCBmaWxl</error>
               </response>"#,
        )
        .unwrap();
        assert_eq!(doc.error.as_deref(), Some("no such file"));
    }

    #[test]
    fn test_parse_plain_error() {
        let doc = parse_document(
            r#"<response command="x" transaction_id="2"><error code="4">bad command</error></response>"#,
        )
        .unwrap();
        assert_eq!(doc.error.as_deref(), Some("bad command"));
    }

    #[test]
    fn test_stop_location_message() {
        let doc = parse_document(
            r#"<response command="run" transaction_id="9" status="break">
                 <message filename="file:///src/a.php" lineno="12"/>
               </response>"#,
        )
        .unwrap();
        assert_eq!(
            doc.stop_location,
            Some(("file:///src/a.php".to_string(), 12))
        );
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        assert!(parse_document("<response").is_err());
        assert!(parse_document("").is_err());
        assert!(parse_document("not xml at all").is_err());
    }
}
