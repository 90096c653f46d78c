//! Per-execution context.

use crate::exec::JdbcParameterBindings;
use crate::session::Session;
use relmap_proto::{CacheMode, QueryOptions};

/// Everything one execution needs besides the compiled select.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub session: &'a Session,
    pub options: &'a QueryOptions,
    /// Values for parameters not bound at translation time. Layered over the
    /// compiled select's own bindings.
    pub bindings: Option<&'a JdbcParameterBindings>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(session: &'a Session, options: &'a QueryOptions) -> Self {
        Self {
            session,
            options,
            bindings: None,
        }
    }

    pub fn with_bindings(mut self, bindings: &'a JdbcParameterBindings) -> Self {
        self.bindings = Some(bindings);
        self
    }

    /// Query options override the session; the session defaults to normal.
    pub fn cache_mode(&self) -> CacheMode {
        self.options.cache_mode.unwrap_or(self.session.cache_mode())
    }
}
