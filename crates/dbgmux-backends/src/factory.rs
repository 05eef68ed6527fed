//! Backend selection
//!
//! The CLI's mode flags pick which adapter family to instantiate; beyond
//! this point everything is a `Box<dyn DebuggerLink>` and the caller never
//! sees the wire format again.

use crate::jdwp::JdwpLink;
use crate::mi::MiLink;
use crate::transport::Transport;
use crate::xdebug::XdLink;
use dbgmux_config::Config;
use dbgmux_link::DebuggerLink;
use std::time::Duration;

/// The four backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Line-oriented MI protocol debugger.
    #[default]
    Mi,
    /// Binary-protocol virtual machine.
    Jdwp,
    /// XML scripting-language engine.
    Xdebug,
}

impl BackendKind {
    /// Guess the backend from a program path (a VM config for `.jar`, a
    /// script engine for `.php`, native otherwise). Mode flags override.
    pub fn infer(program: &str) -> Self {
        match program.rsplit('.').next() {
            Some("jar") | Some("class") | Some("java") => BackendKind::Jdwp,
            Some("php") => BackendKind::Xdebug,
            _ => BackendKind::Mi,
        }
    }
}

/// Build the link for a backend family over an established transport.
///
/// The native (API-linked) family is constructed directly from an engine
/// instance via [`crate::native::NativeLink::new`]; it has no transport so
/// it does not come through here.
pub fn create_link(
    kind: BackendKind,
    transport: Box<dyn Transport>,
    config: &Config,
) -> Box<dyn DebuggerLink> {
    match kind {
        BackendKind::Mi => Box::new(MiLink::new(
            transport,
            config.stack.assert_patterns.clone(),
        )),
        BackendKind::Jdwp => Box::new(JdwpLink::new(
            transport,
            Duration::from_secs(config.jdwp.death_grace_secs),
            Duration::from_secs(config.jdwp.group_cull_secs),
        )),
        BackendKind::Xdebug => Box::new(XdLink::new(transport)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_from_program() {
        assert_eq!(BackendKind::infer("app.jar"), BackendKind::Jdwp);
        assert_eq!(BackendKind::infer("index.php"), BackendKind::Xdebug);
        assert_eq!(BackendKind::infer("/bin/demo"), BackendKind::Mi);
    }

    #[tokio::test]
    async fn test_create_each_kind() {
        let config = Config::default();
        for kind in [BackendKind::Mi, BackendKind::Jdwp, BackendKind::Xdebug] {
            let (ours, _theirs) = tokio::io::duplex(64);
            let (r, w) = tokio::io::split(ours);
            let link = create_link(
                kind,
                Box::new(crate::transport::StreamTransport::new(r, w)),
                &config,
            );
            // every adapter starts idle with its feature table in place
            assert!(!link.is_debugging());
            let _ = link.features();
        }
    }
}
