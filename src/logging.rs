//! Tracing subscriber setup for the `bacreplay` binary.
//!
//! Logs always go to stderr so stdout stays clean for dump output and the
//! operator console.

use std::io::{self, IsTerminal};

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default filter directive for the given verbosity.
///
/// `quiet` wins over `verbose`. One `-v` gives debug, two or more give trace.
pub const fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "bacreplay=error";
    }
    match verbose {
        0 => "bacreplay=info",
        1 => "bacreplay=debug",
        _ => "bacreplay=trace",
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` replaces the default directive when set.
///
/// | Mode | TTY | Output |
/// |------|-----|--------|
/// | Robot | any | JSON lines |
/// | Human | yes | Colored full format |
/// | Human | no | Compact plain format |
pub fn init_logging(robot_mode: bool, verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    // A second call (tests, embedding) keeps the first subscriber.
    let result = if robot_mode {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .with_span_events(FmtSpan::NONE)
            .with_writer(io::stderr);
        tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()
    } else if io::stderr().is_terminal() {
        let fmt_layer = fmt::layer()
            .with_target(false)
            .with_span_events(FmtSpan::NONE)
            .with_writer(io::stderr);
        tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_span_events(FmtSpan::NONE)
            .compact()
            .with_writer(io::stderr);
        tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()
    };
    drop(result);
}
