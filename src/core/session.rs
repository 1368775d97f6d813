use tokio::sync::mpsc;

/// One event on the session's ordered log stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    Line(String),
    /// Pipeline-fatal failure; the surface renders this as a blocking notice.
    Fatal(String),
    /// The session is over and the trigger may re-enable.
    Done,
}

/// Cloneable handle for appending to the session log from any task.
/// The receiver may be gone once the surface shuts down; appends are
/// best-effort.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<LogEvent>,
}

impl LogSink {
    pub fn new(tx: mpsc::UnboundedSender<LogEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (LogSink, mpsc::UnboundedReceiver<LogEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn line(&self, message: impl Into<String>) {
        let _ = self.tx.send(LogEvent::Line(message.into()));
    }

    pub fn fatal(&self, message: impl Into<String>) {
        let _ = self.tx.send(LogEvent::Fatal(message.into()));
    }

    pub fn done(&self) {
        let _ = self.tx.send(LogEvent::Done);
    }
}

/// Request-scoped context shared by the translator and executor stages.
/// Holds nothing beyond the current command and the log sink.
#[derive(Debug, Clone)]
pub struct Session {
    command: String,
    log: LogSink,
}

impl Session {
    pub fn new(command: impl Into<String>, log: LogSink) -> Self {
        Self {
            command: command.into(),
            log,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }
}
