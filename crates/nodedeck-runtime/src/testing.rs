//! Scripted executor for tests

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use nodedeck_core::Result;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::exec::{CommandOutput, CommandSpec, Executor, LineStream};

type Handler = Box<dyn Fn(&CommandSpec) -> Option<Result<CommandOutput>> + Send + Sync>;

/// Records every command and answers from registered handlers.
///
/// Handlers are consulted newest first; the first one returning `Some` wins.
/// Commands no handler claims succeed with empty output.
#[derive(Default, Clone)]
pub struct MockExecutor {
    handlers: Arc<Mutex<Vec<Handler>>>,
    calls: Arc<Mutex<Vec<CommandSpec>>>,
    stream_lines: Arc<Mutex<Vec<String>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It may perform filesystem side effects.
    pub fn on<F>(&self, handler: F)
    where
        F: Fn(&CommandSpec) -> Option<Result<CommandOutput>> + Send + Sync + 'static,
    {
        self.handlers.lock().push(Box::new(handler));
    }

    /// Answer every call whose command line contains `needle`
    pub fn respond(&self, needle: &str, output: CommandOutput) {
        let needle = needle.to_string();
        self.on(move |spec| {
            spec.display()
                .contains(&needle)
                .then(|| Ok(output.clone()))
        });
    }

    /// Lines yielded by `spawn_lines`
    pub fn set_stream_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.stream_lines.lock() = lines.into_iter().map(Into::into).collect();
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Command lines of every recorded call
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.lock().iter().map(CommandSpec::display).collect()
    }

    /// Recorded calls whose program name is `tool`
    pub fn calls_to(&self, tool: &str) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.tool_name() == tool)
            .cloned()
            .collect()
    }

    pub fn was_called(&self, needle: &str) -> bool {
        self.command_lines().iter().any(|l| l.contains(needle))
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().push(spec.clone());
        let handlers = self.handlers.lock();
        for handler in handlers.iter().rev() {
            if let Some(result) = handler(spec) {
                return result;
            }
        }
        Ok(CommandOutput::ok(""))
    }

    async fn spawn_lines(&self, spec: &CommandSpec) -> Result<LineStream> {
        self.calls.lock().push(spec.clone());
        let lines = self.stream_lines.lock().clone();
        Ok(stream::iter(lines.into_iter().map(Ok)).boxed())
    }
}
