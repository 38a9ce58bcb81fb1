//! Span helpers that tag log output with process and job context.

use tracing::{Span, span::Entered};

use crate::init::build_sha;

/// Guard that keeps the process-level tracing span entered for its lifetime.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the process-level span, tagged with the running command.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        let span: &'static Span = Box::leak(Box::new(
            tracing::info_span!("scanbatch", command = %command, build_sha = %build_sha()),
        ));
        let guard = span.enter();
        Self { _guard: guard }
    }
}

/// Build the span a single batch run executes inside.
#[must_use]
pub fn job_span(job_id: impl std::fmt::Display, mode: &str) -> Span {
    tracing::info_span!("job", job_id = %job_id, mode = %mode)
}
