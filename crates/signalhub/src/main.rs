//! Signalhub.
//!
//! Signalhub is a web service aggregating trending signals from social platforms, news APIs and
//! other providers into one ranked feed. Aggregates are cached in a local and an optional shared
//! remote tier, and every session is served cached results within a freshness window.

#![warn(
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;


fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
