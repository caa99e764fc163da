// Logs module - timestamped progress lines on stdout

use chrono::Local;
use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Timestamp layout used in front of every line
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders events as `<timestamp> -->  <message>`
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrowFormat;

impl<S, N> FormatEvent<S, N> for ArrowFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{}", format_prefix(Local::now()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Line prefix for a given instant
pub fn format_prefix<Tz>(now: chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("{} -->  ", now.format(TIMESTAMP_FORMAT))
}

/// Default filter directive: chatty when verbose, silent otherwise
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "info"
    } else {
        "off"
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the verbose flag.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .event_format(ArrowFormat)
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_prefix() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 5).unwrap();
        assert_eq!(format_prefix(now), "2024-03-09 23:59:05 -->  ");
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(true), "info");
        assert_eq!(default_directive(false), "off");
    }

    #[test]
    fn test_init_is_idempotent() {
        init(false);
        init(true);
    }
}
