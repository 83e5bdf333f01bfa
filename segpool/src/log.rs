//! Logging Infrastructure
//!
//! Structured logging for pool and registry events. Entries carry a level,
//! a target, a message and key-value fields, and render as plain text or
//! JSON.
//!
//! # Example
//!
//! ```rust,ignore
//! use segpool::log::{self, LogBuilder, LogLevel};
//!
//! log::info("registry ready");
//!
//! LogBuilder::new(LogLevel::Debug)
//!     .target("segpool::pool")
//!     .message("pool opened")
//!     .field_uint("size", 4096)
//!     .field_str("policy", "best-fit")
//!     .emit();
//! ```
//!
//! Call sites on hot paths check [`would_log`] before building an entry.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::config::LogConfig;

/// Log level enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace = 0,
    /// Debug level.
    Debug = 1,
    /// Info level.
    #[default]
    Info = 2,
    /// Warning level.
    Warn = 3,
    /// Error level.
    Error = 4,
    /// Off (no logging).
    Off = 5,
}

impl LogLevel {
    /// Get the level name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Off => "OFF",
        }
    }

    /// Get the level from a u8.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(LogLevel::Trace),
            1 => Some(LogLevel::Debug),
            2 => Some(LogLevel::Info),
            3 => Some(LogLevel::Warn),
            4 => Some(LogLevel::Error),
            5 => Some(LogLevel::Off),
            _ => None,
        }
    }

    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" | "ERR" => Some(LogLevel::Error),
            "OFF" | "NONE" => Some(LogLevel::Off),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain text format (human readable).
    #[default]
    Plain,
    /// JSON format (machine readable).
    Json,
}

impl LogFormat {
    /// Parse a format from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Some(LogFormat::Plain),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Where formatted entries are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSink {
    /// Standard error.
    #[default]
    Stderr,
    /// Standard output.
    Stdout,
    /// In-memory buffer, drained with [`take_captured`].
    Capture,
}

/// A value in a structured log entry.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    /// String value.
    String(String),
    /// Signed integer value.
    Int(i64),
    /// Unsigned integer value (sizes, offsets, counts).
    UInt(u64),
    /// Boolean value.
    Bool(bool),
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogValue::String(s) => write!(f, "{}", s),
            LogValue::Int(i) => write!(f, "{}", i),
            LogValue::UInt(u) => write!(f, "{}", u),
            LogValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl LogValue {
    fn to_json(&self) -> String {
        match self {
            LogValue::String(s) => format!("\"{}\"", escape_json(s)),
            other => other.to_string(),
        }
    }
}

/// A key-value field in a structured log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogField {
    /// Field key.
    pub key: &'static str,
    /// Field value.
    pub value: LogValue,
}

/// A log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level.
    pub level: LogLevel,
    /// Log message.
    pub message: String,
    /// Module/target name.
    pub target: Option<&'static str>,
    /// Structured fields.
    pub fields: Vec<LogField>,
    /// Timestamp (Unix milliseconds).
    pub timestamp: u64,
}

impl LogEntry {
    /// Create a new log entry.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            level,
            message: message.into(),
            target: None,
            fields: Vec::new(),
            timestamp,
        }
    }

    /// Format as plain text.
    pub fn format_plain(&self) -> String {
        let mut output = format!(
            "[{}.{:03}] {:<5} ",
            self.timestamp / 1000,
            self.timestamp % 1000,
            self.level.as_str()
        );
        if let Some(target) = self.target {
            output.push_str(&format!("[{}] ", target));
        }
        output.push_str(&self.message);

        if !self.fields.is_empty() {
            let fields: Vec<String> = self
                .fields
                .iter()
                .map(|field| format!("{}={}", field.key, field.value))
                .collect();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }
        output
    }

    /// Format as JSON.
    pub fn format_json(&self) -> String {
        let mut output = format!(
            "{{\"timestamp\":{},\"level\":\"{}\"",
            self.timestamp,
            self.level.as_str()
        );
        if let Some(target) = self.target {
            output.push_str(&format!(",\"target\":\"{}\"", escape_json(target)));
        }
        output.push_str(&format!(",\"message\":\"{}\"", escape_json(&self.message)));

        if !self.fields.is_empty() {
            let fields: Vec<String> = self
                .fields
                .iter()
                .map(|field| format!("\"{}\":{}", escape_json(field.key), field.value.to_json()))
                .collect();
            output.push_str(&format!(",\"fields\":{{{}}}", fields.join(",")));
        }
        output.push('}');
        output
    }

    /// Format according to the given format.
    pub fn format(&self, format: LogFormat) -> String {
        match format {
            LogFormat::Plain => self.format_plain(),
            LogFormat::Json => self.format_json(),
        }
    }
}

/// Escape a string for JSON output.
fn escape_json(s: &str) -> String {
    let mut output = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => output.push_str(&format!("\\u{:04x}", c as u32)),
            c => output.push(c),
        }
    }
    output
}

/// Minimum log level (atomic for fast checking).
static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Output settings.
#[derive(Debug, Default)]
struct Output {
    format: LogFormat,
    sink: LogSink,
    captured: Vec<String>,
}

static OUTPUT: OnceLock<Mutex<Output>> = OnceLock::new();

fn output() -> &'static Mutex<Output> {
    OUTPUT.get_or_init(|| Mutex::new(Output::default()))
}

/// Apply a logging configuration.
pub fn init(config: &LogConfig) {
    set_level(config.level);
    set_format(config.format);
}

/// Set the minimum log level.
pub fn set_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Get the current minimum log level.
pub fn level() -> LogLevel {
    LogLevel::from_u8(MIN_LEVEL.load(Ordering::SeqCst)).unwrap_or_default()
}

/// Set the output format.
pub fn set_format(format: LogFormat) {
    output().lock().format = format;
}

/// Set the output sink.
pub fn set_sink(sink: LogSink) {
    output().lock().sink = sink;
}

/// Drain entries written while the sink was [`LogSink::Capture`].
pub fn take_captured() -> Vec<String> {
    std::mem::take(&mut output().lock().captured)
}

/// Check if a log level would be logged.
pub fn would_log(level: LogLevel) -> bool {
    level != LogLevel::Off && level >= self::level()
}

/// Emit a log entry.
pub fn emit(entry: &LogEntry) {
    if !would_log(entry.level) {
        return;
    }

    let mut out = output().lock();
    let line = entry.format(out.format);
    match out.sink {
        LogSink::Stderr => {
            let _ = writeln!(std::io::stderr(), "{}", line);
        }
        LogSink::Stdout => {
            let _ = writeln!(std::io::stdout(), "{}", line);
        }
        LogSink::Capture => out.captured.push(line),
    }
}

/// Builder for log entries.
#[derive(Debug)]
pub struct LogBuilder {
    entry: LogEntry,
}

impl LogBuilder {
    /// Create a new log builder.
    pub fn new(level: LogLevel) -> Self {
        Self {
            entry: LogEntry::new(level, ""),
        }
    }

    /// Set the message.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.entry.message = msg.into();
        self
    }

    /// Set the target.
    pub fn target(mut self, target: &'static str) -> Self {
        self.entry.target = Some(target);
        self
    }

    /// Add a string field.
    pub fn field_str(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.entry.fields.push(LogField {
            key,
            value: LogValue::String(value.into()),
        });
        self
    }

    /// Add a signed integer field.
    pub fn field_int(mut self, key: &'static str, value: i64) -> Self {
        self.entry.fields.push(LogField {
            key,
            value: LogValue::Int(value),
        });
        self
    }

    /// Add an unsigned integer field.
    pub fn field_uint(mut self, key: &'static str, value: u64) -> Self {
        self.entry.fields.push(LogField {
            key,
            value: LogValue::UInt(value),
        });
        self
    }

    /// Add a boolean field.
    pub fn field_bool(mut self, key: &'static str, value: bool) -> Self {
        self.entry.fields.push(LogField {
            key,
            value: LogValue::Bool(value),
        });
        self
    }

    /// Emit the log entry.
    pub fn emit(self) {
        emit(&self.entry);
    }
}

/// Log a message at the given level.
pub fn log(level: LogLevel, message: impl Into<String>) {
    if would_log(level) {
        emit(&LogEntry::new(level, message));
    }
}

/// Log a debug message.
pub fn debug(message: impl Into<String>) {
    log(LogLevel::Debug, message);
}

/// Log an info message.
pub fn info(message: impl Into<String>) {
    log(LogLevel::Info, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Off);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("TRACE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("Info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("none"), Some(LogLevel::Off));
        assert_eq!(LogLevel::parse("invalid"), None);
        assert_eq!(LogLevel::parse("0"), None);
        assert_eq!(LogLevel::parse("5"), None);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("plain"), Some(LogFormat::Plain));
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_entry_format_plain() {
        let entry = LogBuilder::new(LogLevel::Info)
            .target("segpool::pool")
            .message("pool opened")
            .field_uint("size", 1000)
            .field_str("policy", "best-fit")
            .entry;

        let plain = entry.format_plain();
        assert!(plain.contains("INFO"));
        assert!(plain.contains("[segpool::pool]"));
        assert!(plain.contains("pool opened {size=1000, policy=best-fit}"));
    }

    #[test]
    fn test_entry_format_json() {
        let entry = LogBuilder::new(LogLevel::Warn)
            .message("force-closed \"pool\"")
            .field_int("delta", -3)
            .field_bool("leaked", true)
            .entry;

        let json = entry.format_json();
        assert!(json.contains("\"level\":\"WARN\""));
        assert!(json.contains("\"message\":\"force-closed \\\"pool\\\"\""));
        assert!(json.contains("\"fields\":{\"delta\":-3,\"leaked\":true}"));
    }

    #[test]
    fn test_escape_json() {
        assert_eq!(escape_json("hello"), "hello");
        assert_eq!(escape_json("line1\nline2"), "line1\\nline2");
        assert_eq!(escape_json("path\\to"), "path\\\\to");
    }

    #[test]
    fn test_would_log() {
        let original = level();
        set_level(LogLevel::Warn);
        assert!(!would_log(LogLevel::Debug));
        assert!(would_log(LogLevel::Warn));
        assert!(would_log(LogLevel::Error));
        assert!(!would_log(LogLevel::Off));
        set_level(original);
    }

    #[test]
    fn test_capture_sink() {
        set_sink(LogSink::Capture);
        LogBuilder::new(LogLevel::Error)
            .target("segpool::test")
            .message("captured entry")
            .emit();
        let lines = take_captured();
        set_sink(LogSink::Stderr);

        assert!(lines.iter().any(|line| line.contains("captured entry")));
    }
}
