/// Re-export `Config` from `waypost-core` for use within this crate.
///
/// Environment parsing lives in `waypost-core` so integration tests can build
/// a config without the server.
pub use waypost_core::config::{ClickHouseConfig, Config};
