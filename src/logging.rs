use crate::error::{ExportError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "perfexport=info,warn",
        _ => "perfexport=debug,info",
    }
}

/// Logs go to stderr so stdout stays free for the exported data paths.
/// `RUST_LOG` overrides the `-v` level.
pub fn init_logging(verbosity: u8) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(verbosity)))
        .map_err(|err| ExportError::Config(format!("Invalid log filter: {err}")))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init()
        .map_err(|err| ExportError::Config(format!("Logging already initialized: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_directives(0), "warn");
        assert!(default_directives(1).contains("perfexport=info"));
        assert!(default_directives(5).contains("perfexport=debug"));
    }
}
