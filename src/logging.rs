use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub fn init_logging(config: &Config) {
    let default_directive = if config.debug_enabled {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        "request summary"
    );

    if status.is_server_error() {
        warn!(method = %method, path = %path, "request failed outside the protocol layer");
    }

    response
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured event capability injected into the dispatcher and the tool registry.
pub trait EventSink: Send + Sync {
    fn log(&self, level: EventLevel, context: &str, message: &str, data: Option<&Value>);
}

/// Forwards events to the global `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn log(&self, level: EventLevel, context: &str, message: &str, data: Option<&Value>) {
        let data = data.map(Value::to_string).unwrap_or_default();
        match level {
            EventLevel::Debug => debug!(context = %context, data = %data, "{message}"),
            EventLevel::Info => info!(context = %context, data = %data, "{message}"),
            EventLevel::Warn => warn!(context = %context, data = %data, "{message}"),
            EventLevel::Error => error!(context = %context, data = %data, "{message}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use serde_json::Value;

    use super::{EventLevel, EventSink};

    #[derive(Debug, Clone)]
    pub struct RecordedEvent {
        pub level: EventLevel,
        pub context: String,
        pub message: String,
        pub data: Option<Value>,
    }

    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<RecordedEvent>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<RecordedEvent> {
            self.events.lock().expect("events lock").clone()
        }

        pub fn messages(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .map(|event| event.message)
                .collect()
        }
    }

    impl EventSink for RecordingSink {
        fn log(&self, level: EventLevel, context: &str, message: &str, data: Option<&Value>) {
            self.events.lock().expect("events lock").push(RecordedEvent {
                level,
                context: context.to_string(),
                message: message.to_string(),
                data: data.cloned(),
            });
        }
    }
}
