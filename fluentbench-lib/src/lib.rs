#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod aggregate;
pub mod clock;
pub mod collector;
pub mod config;
pub mod dispatch;
pub mod forward;
pub mod probe;
pub mod record;
pub mod report;
pub mod run;
pub mod sink;
pub mod utils;
