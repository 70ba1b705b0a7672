//! Logging Setup
//!
//! Installs a `tracing_subscriber::fmt` subscriber writing to stderr. The
//! filter comes from `VISDRIVER_LOG` (same syntax as `RUST_LOG`), falling back
//! to the directives the host passes in.
//!
//! When the driver runs under Wine with Wine's own debug channels enabled, our
//! lines are interleaved with Wine's; they get a two-space indent so they can
//! be told apart.

use std::env;
use std::io::{self, Write};

use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives
pub const LOG_ENV: &str = "VISDRIVER_LOG";

const WINE_INDENT: &[u8] = b"  ";

/// Whether Wine debug output is interleaved with ours
pub fn wine_debug_output_enabled() -> bool {
    wine_debug_output_enabled_from(
        env::var("WINEUSERNAME").ok().as_deref(),
        env::var("WINEDEBUG").ok().as_deref(),
    )
}

fn wine_debug_output_enabled_from(wine_username: Option<&str>, wine_debug: Option<&str>) -> bool {
    wine_username.is_some() && wine_debug != Some("-all")
}

/// Writer that prefixes each formatted event with an indent
///
/// `fmt` asks for a fresh writer per event, so the prefix lands once per line.
struct EventWriter<W> {
    inner: W,
    indent: bool,
    started: bool,
}

impl<W: Write> EventWriter<W> {
    fn new(inner: W, indent: bool) -> Self {
        Self {
            inner,
            indent,
            started: false,
        }
    }
}

impl<W: Write> Write for EventWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.indent && !self.started && !buf.is_empty() {
            self.inner.write_all(WINE_INDENT)?;
        }
        self.started = true;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Install the global subscriber
///
/// Returns `false` if a subscriber was already installed (by us or the host).
pub fn init(default_directives: &str) -> bool {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directives));
    let indent = wine_debug_output_enabled();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(move || EventWriter::new(io::stderr(), indent))
        .try_init()
        .is_ok()
}
