//! Verification logs.
//!
//! Inconsistencies that do not prevent reading an archive, such as a local
//! header disagreeing with its central directory record, are recorded on a
//! [`VerifyLog`] instead of failing. Every message is also emitted with
//! `log::warn!`.

use std::fmt;
use std::sync::Arc;

/// A sink for verification messages.
pub trait VerifyLog: Send + fmt::Debug {
    /// Records a message.
    fn log(&mut self, message: String);

    /// Returns the recorded messages.
    fn logs(&self) -> &[String];
}

/// Creates a fresh verify log for an archive or entry.
pub type VerifyLogFactory = Arc<dyn Fn() -> Box<dyn VerifyLog> + Send + Sync>;

/// Discards every message.
#[derive(Debug, Default)]
struct DevNull;

impl VerifyLog for DevNull {
    fn log(&mut self, _message: String) {}

    fn logs(&self) -> &[String] {
        &[]
    }
}

/// Keeps every message.
#[derive(Debug, Default)]
struct Unlimited {
    messages: Vec<String>,
}

impl VerifyLog for Unlimited {
    fn log(&mut self, message: String) {
        self.messages.push(message);
    }

    fn logs(&self) -> &[String] {
        &self.messages
    }
}

/// Constructors for the built-in logs.
pub struct VerifyLogs;

impl VerifyLogs {
    /// A log that discards everything.
    pub fn devnull() -> Box<dyn VerifyLog> {
        Box::new(DevNull)
    }

    /// A log that keeps everything.
    pub fn unlimited() -> Box<dyn VerifyLog> {
        Box::new(Unlimited::default())
    }

    /// Factory for [`devnull`](Self::devnull) logs.
    pub fn devnull_factory() -> VerifyLogFactory {
        Arc::new(Self::devnull)
    }

    /// Factory for [`unlimited`](Self::unlimited) logs.
    pub fn unlimited_factory() -> VerifyLogFactory {
        Arc::new(Self::unlimited)
    }
}

pub(crate) fn record(log: &mut dyn VerifyLog, message: String) {
    log::warn!("{}", message);
    log.log(message);
}
