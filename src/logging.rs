use std::{fmt, sync::OnceLock};

use colored::{ColoredString, Colorize};
use serde_json::Value;
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self as tracing_fmt, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

const PAD: &str = "    ";

/// Collects an event's message and its structured fields, in record order.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Vec<(&'static str, ColoredString)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .push((field.name(), format!("\"{}\"", value).cyan()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name(), value.to_string().yellow()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name(), value.to_string().yellow()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.push((field.name(), value.to_string().purple()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(rendered);
            return;
        }
        // Payloads logged with `%value` are JSON; render those as a tree.
        let colored = match serde_json::from_str::<Value>(&rendered) {
            Ok(json @ (Value::Object(_) | Value::Array(_))) => render_json(&json, 2).normal(),
            _ => rendered.bright_black(),
        };
        self.fields.push((field.name(), colored));
    }
}

fn branch(is_last: bool) -> &'static str {
    if is_last { "└" } else { "├" }
}

fn render_json(value: &Value, indent: usize) -> String {
    let pad = PAD.repeat(indent);
    let close_pad = PAD.repeat(indent.saturating_sub(1));

    match value {
        Value::Object(map) if map.is_empty() => "{}".bright_black().to_string(),
        Value::Array(items) if items.is_empty() => "[]".bright_black().to_string(),
        Value::Object(map) => {
            let lines: Vec<String> = map
                .iter()
                .enumerate()
                .map(|(i, (key, v))| {
                    format!(
                        "{}{} {}: {}",
                        pad,
                        branch(i + 1 == map.len()),
                        key.white(),
                        render_json(v, indent + 1)
                    )
                })
                .collect();
            format!("{}\n{}\n{}{}", "{".bright_black(), lines.join("\n"), close_pad, "}".bright_black())
        }
        Value::Array(items) => {
            let lines: Vec<String> = items
                .iter()
                .enumerate()
                .map(|(i, v)| format!("{}{} {}", pad, branch(i + 1 == items.len()), render_json(v, indent + 1)))
                .collect();
            format!("{}\n{}\n{}{}", "[".bright_black(), lines.join("\n"), close_pad, "]".bright_black())
        }
        Value::String(s) => format!("\"{}\"", s).cyan().to_string(),
        Value::Number(n) => n.to_string().yellow().to_string(),
        Value::Bool(b) => b.to_string().purple().to_string(),
        Value::Null => "null".bright_black().to_string(),
    }
}

fn level_label(level: &Level) -> ColoredString {
    match *level {
        Level::TRACE => "TRACE".purple(),
        Level::DEBUG => "DEBUG".green(),
        Level::INFO => "INFO".blue(),
        Level::WARN => "WARN".yellow(),
        Level::ERROR => "ERROR".red(),
    }
}

struct TreeFormatter;

impl<S, N> FormatEvent<S, N> for TreeFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: tracing_fmt::format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{} [{}] {} ",
            chrono::Utc::now().to_rfc3339().dimmed(),
            level_label(meta.level()),
            meta.target().cyan().bold()
        )?;

        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        if let Some(message) = &collector.message {
            write!(writer, "{}", message.white())?;
        }
        for (i, (name, value)) in collector.fields.iter().enumerate() {
            let is_last = i + 1 == collector.fields.len();
            write!(writer, "\n{}{} {}: {}", PAD, branch(is_last), name.white(), value)?;
        }

        writeln!(writer)
    }
}

static TRACING: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_log() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_fmt::Subscriber::builder()
            .with_env_filter(filter)
            .event_format(TreeFormatter)
            .try_init();
    });
}
