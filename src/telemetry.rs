//! Tracing setup for the binary.

use crate::config::LogConfig;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::Layer as _;
use tracing_subscriber::fmt::format;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const MAX_MESSAGE_CHARS: usize = 280;

fn truncate_for_log(message: &str, max_chars: usize) -> (&str, bool) {
    match message.char_indices().nth(max_chars) {
        Some((byte_index, _character)) => (&message[..byte_index], true),
        None => (message, false),
    }
}

/// Initialize tracing: a compact terminal layer and, when `log_dir` is set, a
/// daily-rolling file layer.
///
/// Returns the file writer's guard. The caller holds it for the process
/// lifetime so buffered lines are flushed on exit.
pub fn init_tracing(log: &LogConfig) -> Option<WorkerGuard> {
    let terminal = tracing_subscriber::fmt::layer()
        .fmt_fields(field_formatter())
        .compact()
        .with_filter(build_env_filter(log.debug));

    match &log.log_dir {
        Some(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, "nfa-learning.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .fmt_fields(field_formatter())
                .compact()
                .with_filter(build_env_filter(log.debug));

            tracing_subscriber::registry()
                .with(terminal)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(terminal).init();
            None
        }
    }
}

/// Message fields are cut at [`MAX_MESSAGE_CHARS`]; other fields print as-is.
fn field_formatter() -> impl for<'writer> tracing_subscriber::fmt::FormatFields<'writer> + 'static {
    format::debug_fn(|writer, field, value| {
        let field_name = field.name();
        if field_name == "message" {
            let formatted = format!("{value:?}");
            let (truncated, was_truncated) = truncate_for_log(&formatted, MAX_MESSAGE_CHARS);
            if was_truncated {
                write!(writer, "{field_name}={truncated}...")
            } else {
                write!(writer, "{field_name}={formatted}")
            }
        } else {
            write!(writer, "{field_name}={value:?}")
        }
    })
}

/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `--debug`.
fn build_env_filter(debug: bool) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            tracing_subscriber::EnvFilter::new("debug")
        } else {
            tracing_subscriber::EnvFilter::new("info")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_for_log_handles_multibyte_characters() {
        let message = "abc→def";
        let (truncated, was_truncated) = truncate_for_log(message, 4);
        assert!(was_truncated);
        assert_eq!(truncated, "abc→");
    }

    #[test]
    fn truncate_for_log_returns_original_when_within_limit() {
        let message = "root updated";
        let (truncated, was_truncated) = truncate_for_log(message, 40);
        assert!(!was_truncated);
        assert_eq!(truncated, message);
    }
}
