//! ewp-limiter - Fixed-window rate limiting for eatwhilepregnant.com
//!
//! This crate implements per-caller admission control for named resources
//! (search, feedback, suggest, ...). Each limiter keeps a fixed-window counter
//! per caller key in a bounded LRU cache, and the HTTP layer turns exhausted
//! quotas into `429 Too Many Requests` responses with a `Retry-After` header.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
