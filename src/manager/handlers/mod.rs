//! Ingress pipelines and the event loop driver.

mod events;
mod inside;
mod run_loop;
mod switch;
mod timeout;

pub use timeout::BUFFER_CHECK_INTERVAL;
