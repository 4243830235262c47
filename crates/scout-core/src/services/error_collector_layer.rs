use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{
    Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::Layer;

use crate::models::{ErrorEntry, ErrorLevel, ErrorStore};

/// Visitor to extract fields from tracing events
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: HashMap::new(),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value_str = format!("{:?}", value);

        if field.name() == "message" {
            self.message = Some(value_str);
        } else {
            self.fields.insert(field.name().to_string(), value_str);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), value.to_string());
        }
    }
}

/// Tracing layer that collects WARN and ERROR events into an [`ErrorStore`],
/// so reconciliation misses and dropped streams surface in a diagnostics log
/// even without any UI attached.
pub struct ErrorCollectorLayer {
    store: Arc<ErrorStore>,
}

impl ErrorCollectorLayer {
    pub fn new(store: Arc<ErrorStore>) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for ErrorCollectorLayer
where
    S: Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();

        // Only capture WARN and ERROR levels
        if !matches!(*metadata.level(), Level::WARN | Level::ERROR) {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        self.store.add_entry(ErrorEntry {
            timestamp: SystemTime::now(),
            level: if *metadata.level() == Level::ERROR {
                ErrorLevel::Error
            } else {
                ErrorLevel::Warning
            },
            message: visitor.message.unwrap_or_default(),
            target: metadata.target().to_string(),
            file: metadata.file().map(String::from),
            line: metadata.line(),
            fields: visitor.fields,
        });
    }
}
