//! mcpgate CLI library: argument parsing, configuration resolution, the
//! OpenAPI downstream bridge, shutdown handling, and the wiring that
//! assembles them into a running gateway. Split from `main.rs` so that
//! integration tests in `tests/` can exercise these modules through the
//! crate's public API, the way `turbomcp-proxy` splits its CLI into a
//! library crate plus a thin binary entry point.

pub mod args;
pub mod config;
pub mod openapi_downstream;
pub mod shutdown;
pub mod wiring;
