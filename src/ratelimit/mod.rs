//! Rate limiting logic and state management.

mod limiter;
mod registry;
mod window;

pub use limiter::{LimiterMetrics, LimiterSettings, RateLimiter, DEFAULT_MAX_ENTRIES};
pub use registry::LimiterRegistry;
pub use window::{Consumed, RateLimited, WindowEntry, MAX_DURATION_SECS};
