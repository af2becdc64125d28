//! Ambient trace context
//!
//! The current context lives in task-local storage. Futures enter it with
//! [`scope`], plain closures (including code on non-runtime threads) with
//! [`sync_scope`]. The previous value is restored when the scope ends, on
//! every exit path including panics.

use super::context::TraceContext;
use std::future::Future;
use tokio::task::futures::TaskLocalFuture;

tokio::task_local! {
    static CURRENT: Option<TraceContext>;
}

/// Context of the enclosing scope, if any
pub fn current() -> Option<TraceContext> {
    CURRENT.try_with(Clone::clone).ok().flatten()
}

/// Run `f` with `context` as the ambient context
pub fn scope<F: Future>(context: Option<TraceContext>, f: F) -> TaskLocalFuture<Option<TraceContext>, F> {
    CURRENT.scope(context, f)
}

/// Run a closure with `context` as the ambient context
pub fn sync_scope<F, R>(context: Option<TraceContext>, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT.sync_scope(context, f)
}
