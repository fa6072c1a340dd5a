use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Level used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "issue_pilot=debug,info"
    } else {
        "info"
    }
}

/// Install the global subscriber. Output goes to stderr so command output on
/// stdout stays machine-readable. Calling this twice is a no-op.
pub fn init_logging(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose);

    let _ = match format {
        LogFormat::Fmt => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
