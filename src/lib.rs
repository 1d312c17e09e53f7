pub mod errors;
pub mod geometry;
pub mod ikd_tree;
#[cfg(feature = "setup_tracing")]
mod logging;
