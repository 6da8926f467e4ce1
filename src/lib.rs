//! feed-masher: combine multiple RSS and Atom feeds into one Atom feed.
//!
//! The library exposes the aggregation pipeline ([`feed`]), the pluggable
//! source resolution layer ([`resolver`]), and the HTTP surface ([`server`])
//! used by the `feed-masher` binary.

pub mod config;
pub mod feed;
pub mod resolver;
pub mod server;
pub mod util;
