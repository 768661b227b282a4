use std::fs::File;

use anyhow::{anyhow, bail, Context};
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::{dispatcher, subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Log everything to a new timestamped file in the current directory.
///
/// Fails without creating a file if a global subscriber is already installed.
pub fn init_logger() -> anyhow::Result<()> {
    if dispatcher::has_been_set() {
        bail!("a global tracing subscriber is already set, consider disabling logs");
    }
    let file_name = get_log_file_name()?;
    let file = File::create(&file_name).with_context(|| format!("creating {file_name}"))?;
    let writer = BoxMakeWriter::new(file);
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .map_err(|e| anyhow!("invalid time format: {e}"))?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).context(
        "could not set global default tracing subscriber, consider disabling logs if you are already setting one",
    )
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]:[minute]:[second]_hub_log.txt")
        .map_err(|e| anyhow!("invalid file name format: {e}"))?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("formatting log file name")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tracing::subscriber::NoSubscriber;

    use super::*;

    #[test]
    fn log_file_name() {
        let name = get_log_file_name().unwrap();
        assert!(name.ends_with("_hub_log.txt"), "{name}");
        assert_eq!(name.len(), "2025-01-01_00:00:00_hub_log.txt".len());
    }

    #[test]
    fn no_file_when_a_subscriber_is_already_set() {
        let _ = set_global_default(NoSubscriber::default());
        let before = get_log_file_name().unwrap();
        assert!(init_logger().is_err());
        let after = get_log_file_name().unwrap();
        assert!(!Path::new(&before).exists());
        assert!(!Path::new(&after).exists());
    }
}
