//! Stack growth for the recursive evaluator.
//!
//! Midas calls recurse through `execute`/`evaluate` on the host stack, so a
//! program well inside `max_call_depth` can still exhaust a small thread stack.
//! Both entry points go through [`ensure_sufficient_stack`], which moves onto a
//! freshly allocated segment when the remaining space drops below the red zone.

/// Grow once less than this much stack remains.
const RED_ZONE: usize = 100 * 1024;

/// Size of each new stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
