//! Server startup utilities.

use docket_config::AppConfig;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
        __           __        __
   ____/ /___  _____/ /_____  / /_
  / __  / __ \/ ___/ //_/ _ \/ __/
 / /_/ / /_/ / /__/ ,< /  __/ /_
 \__,_/\____/\___/_/|_|\___/\__/

    "#);
}

/// Prints the effective engine settings.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    let dispatcher = &config.jobs.dispatcher;
    let queue = &config.jobs.queue;
    info!("{}", separator);
    info!("Environment:      {}", config.app.environment);
    info!(
        "Worker pools:     io={} cpu={}",
        dispatcher.io_workers, dispatcher.cpu_workers
    );
    info!(
        "Job queue:        max_concurrent={} timeout={}s retry_limit={}",
        queue.max_concurrent_jobs, queue.job_timeout_secs, queue.retry_limit
    );
    info!(
        "Maintenance:      every {}s, long jobs after {}s",
        config.jobs.reclamation.interval_secs, config.jobs.reclamation.long_job_threshold_secs
    );
    info!("{}", separator);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_banner_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_banner();
    }

    #[test]
    fn test_print_startup_info_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_startup_info(&AppConfig::default());
    }
}
