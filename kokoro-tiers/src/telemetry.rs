//! Tracing subscriber setup for hosts embedding the orchestrator.

use tracing_subscriber::EnvFilter;

use kokoro_core::config::GeneralConfig;

/// Install a global `fmt` subscriber writing to stderr.
///
/// `RUST_LOG` wins over `general.log_level`; an unparsable level falls back
/// to `info`. Returns `false` if a global subscriber was already installed.
pub fn init_tracing(general: &GeneralConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&general.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if general.json_logs {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_refused() {
        let general = GeneralConfig::default();
        let _ = init_tracing(&general);
        assert!(!init_tracing(&general));
    }
}
