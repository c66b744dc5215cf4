//! Test suites for the broker daemon.

mod support;
mod unit;
