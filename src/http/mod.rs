//! HTTP surface: caller identification, admission control and the service routes.

mod client_key;
mod guard;
mod routes;
mod server;

pub use client_key::{client_key, UNKNOWN_CLIENT};
pub use guard::{check_rate_limit, enforce, retry_after_secs, RateLimitRejection, REMAINING_HEADER};
pub use routes::{render_table, router, AppState, ConsumeResponse, MetricsResponse};
pub use server::HttpServer;
