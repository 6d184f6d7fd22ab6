//! Prints received notifications to stdout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use knmi_notify::{consumer_fn, EventConsumer, NotificationEvent};

/// Output format for received notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One summary line per notification
    Summary,
    /// The full notification as a JSON line
    Json,
}

/// Render one notification.
pub fn format_event(event: &NotificationEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => event.to_value().to_string(),
        OutputFormat::Summary => format!(
            "{}  {:<48} {}",
            event.time().unwrap_or("-"),
            event.dataset().as_str(),
            event.data.filename().unwrap_or("-")
        ),
    }
}

/// A consumer that prints every notification and counts them in `received`.
pub fn printer(format: OutputFormat, received: Arc<AtomicU64>) -> Arc<dyn EventConsumer> {
    consumer_fn(move |event| {
        let received = Arc::clone(&received);
        async move {
            println!("{}", format_event(&event, format));
            received.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    })
}
