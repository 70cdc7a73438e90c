//! Logging sinks from the participant configuration.
//!
//! Stdout and file sinks are plain fmt layers (files through a
//! non-blocking appender); the remote sink forwards records as `LogMsg`
//! wire messages so peers can observe them.

use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

use vib_core::config::{LogLevel, LogSinkType, LoggingConfig};
use vib_core::ServiceDescriptor;
use vib_wire::{LogMsg, Message};

use crate::bus::BusHandle;

/// Target used when re-emitting logs received from peers; the remote layer
/// skips it to keep two remote sinks from ping-ponging records.
pub(crate) const REMOTE_LOG_TARGET: &str = "vib::remote_log";

/// Keeps the non-blocking file writers alive.
pub(crate) struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

fn level_filter(level: LogLevel) -> Option<LevelFilter> {
    match level {
        LogLevel::Trace => Some(LevelFilter::TRACE),
        LogLevel::Debug => Some(LevelFilter::DEBUG),
        LogLevel::Info => Some(LevelFilter::INFO),
        LogLevel::Warn => Some(LevelFilter::WARN),
        // Critical folds into error; tracing has no severity above it.
        LogLevel::Error | LogLevel::Critical => Some(LevelFilter::ERROR),
        LogLevel::Off => None,
    }
}

/// Build and install the configured sinks. Returns `None` when nothing is
/// configured; installation is skipped when the process already has a
/// global subscriber.
pub(crate) fn init(
    config: &LoggingConfig,
    participant_name: &str,
    bus: BusHandle,
    logger_descriptor: ServiceDescriptor,
) -> Option<LoggingGuard> {
    let mut guards = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    for sink in &config.sinks {
        let Some(level) = level_filter(sink.level) else { continue };
        match sink.sink_type {
            LogSinkType::Stdout => {
                layers.push(tracing_subscriber::fmt::layer().with_filter(level).boxed());
            }
            LogSinkType::File => {
                let file_name = sink
                    .log_name
                    .clone()
                    .unwrap_or_else(|| format!("{participant_name}.log"));
                let appender = tracing_appender::rolling::never(".", file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                guards.push(guard);
                layers.push(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer)
                        .with_filter(level)
                        .boxed(),
                );
            }
            LogSinkType::Remote => {
                layers.push(
                    RemoteLayer { bus: bus.clone(), descriptor: logger_descriptor.clone() }
                        .with_filter(level)
                        .boxed(),
                );
            }
        }
    }

    if layers.is_empty() {
        return None;
    }

    let subscriber = Registry::default().with(layers);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("a global tracing subscriber is already installed; configured sinks not active");
    }
    Some(LoggingGuard { _file_guards: guards })
}

/// Forwards log records as wire messages.
struct RemoteLayer {
    bus: BusHandle,
    descriptor: ServiceDescriptor,
}

impl<S: tracing::Subscriber> Layer<S> for RemoteLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target() == REMOTE_LOG_TARGET {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.bus.send(
            &self.descriptor,
            Message::LogMsg(LogMsg {
                level: meta.level().to_string(),
                target: meta.target().to_string(),
                body: visitor.message,
            }),
        );
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}
