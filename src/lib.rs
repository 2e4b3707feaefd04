pub(crate) mod api;
pub mod config;
pub mod error;
pub mod fixes;
pub mod json_scan;
pub mod observability;
pub mod repair;
pub mod routing;
pub mod session;
pub mod state;
pub mod stream;
pub mod toolcall;
pub mod transport;

mod util;
