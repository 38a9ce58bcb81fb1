//! Command handlers grouped by concern.

pub(crate) mod dispatch;
pub(crate) mod env;
pub(crate) mod run;
