use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Targets,
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

/// Target used for one line per wallet step. It reaches both the console and
/// the log file regardless of the other filters.
pub const TASK_RESULT_TARGET: &str = "task_result";

/// Installs the global subscriber: an hourly rolling file under `log_dir`
/// plus a colored console layer. `app_targets` are the crate targets whose
/// INFO lines should be shown on the console.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the process.
pub fn setup_logger(log_dir: &str, app_targets: &[&str]) -> Option<WorkerGuard> {
    if std::fs::create_dir_all(log_dir).is_err() {
        return None;
    }

    let file_appender = tracing_appender::rolling::hourly(log_dir, "app");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let mut file_filter = Targets::new()
        .with_target(TASK_RESULT_TARGET, Level::INFO)
        .with_target("core_logic", Level::INFO)
        .with_default(Level::WARN);
    let mut console_filter = Targets::new()
        .with_target(TASK_RESULT_TARGET, Level::INFO)
        .with_target("core_logic", Level::INFO)
        .with_default(Level::ERROR);
    for target in app_targets {
        file_filter = file_filter.with_target(*target, Level::DEBUG);
        console_filter = console_filter.with_target(*target, Level::INFO);
    }

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TerminalFormatter)
        .with_filter(console_filter);

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init();

    installed.ok().map(|_| guard)
}

// --- Formatters ---

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

fn highlight(msg: &str) -> String {
    let keywords = [
        ("SUCCESS", Style::new().fg(Color::LightGreen).bold()),
        ("FAILED", Style::new().fg(Color::LightRed).bold()),
        ("WAITING", Style::new().fg(Color::LightYellow).bold()),
        ("DONE", Style::new().fg(Color::LightCyan).bold()),
    ];

    let mut out = msg.to_string();
    for (word, style) in keywords {
        if out.contains(word) {
            out = out.replace(word, &style.paint(word).to_string());
        }
    }
    out
}

pub struct TerminalFormatter;

impl<S, N> FormatEvent<S, N> for TerminalFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let time = Local::now().format("%H:%M:%S");
        let level = *event.metadata().level();
        let level_style = match level {
            Level::ERROR => Style::new().fg(Color::Red),
            Level::WARN => Style::new().fg(Color::Yellow),
            _ => Style::new().dimmed(),
        };

        write!(
            writer,
            "{} {} {}",
            Style::new().dimmed().paint(time.to_string()),
            level_style.paint(format!("{:<5}", level)),
            highlight(&visitor.message)
        )?;
        writeln!(writer)
    }
}

pub struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let meta = event.metadata();

        write!(writer, "{} [{}] {}: ", timestamp, meta.level(), meta.target())?;

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        writeln!(writer, "{}", visitor.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_leaves_plain_text_alone() {
        assert_eq!(highlight("bridged 0.1 ETH"), "bridged 0.1 ETH");
        assert_ne!(highlight("SUCCESS bridged"), "SUCCESS bridged");
    }
}
