//! Library surface for the `kestreld` binary, split out so the HTTP
//! adapter and configuration loader can be exercised directly from
//! integration tests without spawning the real process.

pub mod config;
pub mod http_adapter;
