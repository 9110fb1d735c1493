use tracing_subscriber::{EnvFilter, fmt};

/// Installs the stderr logger. `RUST_LOG` takes precedence over `--log-level`.
pub(crate) fn init(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|err| anyhow::anyhow!("invalid --log-level `{level}`: {err}"))?,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install logger: {err}"))
}
