//! XML scripting-language adapter
//!
//! The backend is a script engine's debug extension that connects to us and
//! speaks one small XML document per message, NUL-delimited at the
//! transport layer (SOH bytes are tolerated as delimiters too). Replies
//! carry the transaction ID natively in a `transaction_id` attribute;
//! commands are sent as `name -i <id> ...` text, NUL-terminated.

mod document;
mod link;

pub use document::{parse_document, XdBreakpoint, XdDocument, XdFrame};
pub use link::XdLink;

/// Strip the `file://` scheme the protocol wraps around paths.
pub(crate) fn uri_to_path(uri: &str) -> String {
    uri.strip_prefix("file://")
        .map(|rest| rest.to_string())
        .unwrap_or_else(|| uri.to_string())
}

pub(crate) fn path_to_uri(path: &str) -> String {
    if path.starts_with("file://") {
        path.to_string()
    } else {
        format!("file://{}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_conversions() {
        assert_eq!(uri_to_path("file:///src/a.php"), "/src/a.php");
        assert_eq!(uri_to_path("/src/a.php"), "/src/a.php");
        assert_eq!(path_to_uri("/src/a.php"), "file:///src/a.php");
        assert_eq!(path_to_uri("file:///src/a.php"), "file:///src/a.php");
    }
}
