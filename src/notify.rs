//! User-visible notifications.
//!
//! The controller reports soft conditions (nothing to advance to, master scene
//! not in view) through a [`Notifier`] instead of failing. The CLI prints them
//! with [`ConsoleNotifier`]; tests collect them with [`MemoryNotifier`].

use std::sync::Mutex;

use console::style;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Sink for operator-facing messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.notify(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.notify(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.notify(Level::Error, message);
    }
}

/// Prints notifications to stderr, prefixed with the module title.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: Level, message: &str) {
        let prefix = match level {
            Level::Info => style("Easy Phasey:").cyan(),
            Level::Warn => style("Easy Phasey:").yellow(),
            Level::Error => style("Easy Phasey:").red().bold(),
        };
        eprintln!("{} {}", prefix, message);
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<(Level, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(level, _)| *level == Level::Warn)
            .map(|(_, message)| message)
            .collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, level: Level, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((level, message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_notifier_records_levels() {
        let notifier = MemoryNotifier::new();
        notifier.info("saved");
        notifier.warn("not in view");
        notifier.error("failed");

        assert_eq!(notifier.messages().len(), 3);
        assert_eq!(notifier.warnings(), vec!["not in view".to_string()]);
    }
}
