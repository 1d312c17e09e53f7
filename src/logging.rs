//! Logging setup for Ikd.
//!
//! Logging behavior is controlled by the `DEBUG_IKD` environment variable.
//! If `DEBUG_IKD` is not set or is set to a falsy value ("0", "false", or empty),
//! logging stays disabled; otherwise a debug-level subscriber is installed.

use ctor::ctor;
use tracing::Level;

#[ctor]
fn set_debug_level() {
    // If DEBUG_IKD is not set or set to a falsy value, leave logging disabled.
    if std::env::var("DEBUG_IKD").map_or(true, |v| v == "0" || v == "false" || v.is_empty()) {
        // Logging macros will not output anything.
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    }
}
