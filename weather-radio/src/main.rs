use std::time::Duration;

use weather_radio::{daemon::Daemon, tracing};

/// Blocking reads (stdin) may still be parked when the daemon returns.
const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(Daemon::new().run());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}
