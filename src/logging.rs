use std::env;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "trace" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }
}

/// One JSON object per line: stdout for info and debug, stderr otherwise.
#[derive(Clone)]
pub struct Logger {
    service: Arc<str>,
    environment: Arc<str>,
    host: Arc<str>,
    min_level: LogLevel,
}

static LOGGER: OnceCell<Logger> = OnceCell::new();

pub fn init_logger(service: &'static str) -> &'static Logger {
    LOGGER.get_or_init(|| Logger::from_env(service))
}

/// The process logger, or `None` when the embedding binary never set one up.
/// Library code logs through this and stays silent in tests.
pub fn logger() -> Option<&'static Logger> {
    LOGGER.get()
}

impl Logger {
    fn from_env(service: &str) -> Self {
        let environment = env::var("APP_ENV")
            .or_else(|_| env::var("RUST_ENV"))
            .unwrap_or_else(|_| "development".to_string());
        let host = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .or_else(|| env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown".to_string());
        let min_level = env::var("LOG_LEVEL")
            .map(|value| LogLevel::parse(&value))
            .unwrap_or(LogLevel::Info);
        Self::new(service, &environment, &host, min_level)
    }

    fn new(service: &str, environment: &str, host: &str, min_level: LogLevel) -> Self {
        Self {
            service: Arc::from(service),
            environment: Arc::from(environment),
            host: Arc::from(host),
            min_level,
        }
    }

    /// Builds the line for `event`, or `None` when `level` is filtered out.
    /// Object contexts are flattened into the line; anything else lands under
    /// `context`.
    fn render<T: Serialize>(&self, level: LogLevel, event: &str, context: T) -> Option<String> {
        if level > self.min_level {
            return None;
        }

        let mut line = Map::new();
        line.insert(
            "timestamp".into(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        line.insert("service".into(), Value::String(self.service.to_string()));
        line.insert("env".into(), Value::String(self.environment.to_string()));
        line.insert("host".into(), Value::String(self.host.to_string()));
        line.insert("level".into(), Value::String(level.as_str().into()));
        line.insert("event".into(), Value::String(event.into()));

        match serde_json::to_value(context).unwrap_or(Value::Null) {
            Value::Object(fields) => line.extend(fields),
            Value::Null => {}
            other => {
                line.insert("context".into(), other);
            }
        }
        Some(Value::Object(line).to_string())
    }

    fn emit<T: Serialize>(&self, level: LogLevel, event: &str, context: T) {
        let Some(line) = self.render(level, event, context) else {
            return;
        };
        match level {
            LogLevel::Error | LogLevel::Warn => eprintln!("{line}"),
            LogLevel::Info | LogLevel::Debug => println!("{line}"),
        }
    }

    pub fn debug<T: Serialize>(&self, event: &str, context: T) {
        self.emit(LogLevel::Debug, event, context);
    }

    pub fn info<T: Serialize>(&self, event: &str, context: T) {
        self.emit(LogLevel::Info, event, context);
    }

    pub fn warn<T: Serialize>(&self, event: &str, context: T) {
        self.emit(LogLevel::Warn, event, context);
    }

    pub fn error<T: Serialize>(&self, event: &str, context: T) {
        self.emit(LogLevel::Error, event, context);
    }
}
