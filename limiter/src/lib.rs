use std::sync::Arc;
use std::time::Duration;

use middleware::{fixed_window::FixedWindowGuard, global::GlobalLimiter};
use window::FixedWindowLimiter;

pub mod window;

pub mod middleware {
    pub mod fixed_window;
    pub mod global;
}

pub fn global_middleware(permits_per_second: u32) -> GlobalLimiter {
    GlobalLimiter::new(permits_per_second)
}

pub fn fixed_window_middleware(
    limiter: Arc<FixedWindowLimiter>,
    limit: u32,
    window: Duration,
) -> FixedWindowGuard {
    FixedWindowGuard::new(limiter, limit, window)
}
