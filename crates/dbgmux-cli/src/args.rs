//! Command-line argument surface
//!
//! The flags only select which backend adapter to instantiate and seed the
//! initial session; everything else happens interactively.

use clap::Parser;
use dbgmux_backends::BackendKind;

#[derive(Debug, Parser)]
#[command(name = "dbgmux", about = "Multi-backend debugger front-end", version)]
pub struct Args {
    /// Program to debug (binary, jar, or script entry point)
    pub program: Option<String>,

    /// Core file to load alongside the program
    pub core: Option<String>,

    /// Breakpoints to set at startup, as file:line
    #[arg(short = 'b', value_name = "FILE:LINE")]
    pub breakpoints: Vec<String>,

    /// Source files to open at startup
    #[arg(short = 'f', value_name = "FILE")]
    pub files: Vec<String>,

    /// Force the MI line-protocol backend
    #[arg(long = "gdb", conflicts_with_all = ["java", "xdebug"])]
    pub gdb: bool,

    /// Force the VM backend
    #[arg(long = "java", conflicts_with_all = ["gdb", "xdebug"])]
    pub java: bool,

    /// Force the script-engine backend
    #[arg(long = "xdebug", conflicts_with_all = ["gdb", "java"])]
    pub xdebug: bool,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Mode flags win; otherwise the program's shape decides.
    pub fn backend_kind(&self) -> BackendKind {
        if self.gdb {
            BackendKind::Mi
        } else if self.java {
            BackendKind::Jdwp
        } else if self.xdebug {
            BackendKind::Xdebug
        } else {
            self.program
                .as_deref()
                .map(BackendKind::infer)
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flags_override_inference() {
        let args = Args::parse_from(["dbgmux", "app.jar", "--gdb"]);
        assert_eq!(args.backend_kind(), BackendKind::Mi);
    }

    #[test]
    fn test_inference_from_program() {
        let args = Args::parse_from(["dbgmux", "index.php"]);
        assert_eq!(args.backend_kind(), BackendKind::Xdebug);

        let args = Args::parse_from(["dbgmux"]);
        assert_eq!(args.backend_kind(), BackendKind::Mi);
    }

    #[test]
    fn test_breakpoint_args() {
        let args = Args::parse_from(["dbgmux", "demo", "-b", "a.c:1", "-b", "b.c:2"]);
        assert_eq!(args.breakpoints, vec!["a.c:1", "b.c:2"]);
    }
}
