use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Stderr logging for the CLI. `RUST_LOG` wins; otherwise `--debug` raises
/// the default from `warn` to `debug`. With `--json` log lines are JSON too.
pub fn init_cli_tracing(debug: bool, json: bool) {
    let default = if debug { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder
            .with_ansi(std::io::stderr().is_terminal())
            .compact()
            .try_init()
    };
}
