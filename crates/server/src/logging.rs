use chrono::{FixedOffset, Utc};
use snafu::{OptionExt, ResultExt};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{
    CreateLogFileSnafu, InstallSubscriberSnafu, InvalidLogLevelSnafu, InvalidUtcOffsetSnafu,
    ServerError,
};
use crate::settings::LogSettings;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats event timestamps in a fixed local offset instead of UTC.
#[derive(Debug, Clone, Copy)]
pub struct OffsetTimer {
    offset: FixedOffset,
}

impl OffsetTimer {
    pub fn from_hours(hours: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(hours.checked_mul(3600)?)?;
        Some(Self { offset })
    }
}

impl FormatTime for OffsetTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        write!(
            writer,
            "{}",
            Utc::now()
                .with_timezone(&self.offset)
                .format(TIMESTAMP_FORMAT)
        )
    }
}

/// Installs console and daily-rotated file output.
///
/// The returned guard flushes the file writer on drop and must live as long as
/// the process. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(settings: &LogSettings) -> Result<WorkerGuard, ServerError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_suffix("log")
        .max_log_files(settings.max_log_files.max(1))
        .build(&settings.dir)
        .context(CreateLogFileSnafu {
            stage: "build-rolling-appender",
            dir: settings.dir.clone(),
        })?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level).context(InvalidLogLevelSnafu {
            stage: "parse-log-level",
            level: settings.level.clone(),
        })?,
    };

    let timer = OffsetTimer::from_hours(settings.utc_offset_hours).context(
        InvalidUtcOffsetSnafu {
            stage: "build-log-timer",
            hours: settings.utc_offset_hours,
        },
    )?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_timer(timer))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer),
        )
        .try_init()
        .context(InstallSubscriberSnafu {
            stage: "install-subscriber",
        })?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_timer_rejects_out_of_range_offsets() {
        assert!(OffsetTimer::from_hours(9).is_some());
        assert!(OffsetTimer::from_hours(-11).is_some());
        assert!(OffsetTimer::from_hours(24).is_none());
    }

    #[test]
    fn offset_timer_writes_seconds_precision_timestamp() {
        let timer = OffsetTimer::from_hours(9).unwrap();
        let mut buffer = String::new();

        timer.format_time(&mut Writer::new(&mut buffer)).unwrap();

        // e.g. 2026-10-17 09:30:00
        assert_eq!(buffer.len(), 19);
        assert_eq!(&buffer[4..5], "-");
        assert_eq!(&buffer[10..11], " ");
    }
}
