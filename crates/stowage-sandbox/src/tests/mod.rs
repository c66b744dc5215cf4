//! Test suites for the sandbox primitives.

mod exec_behaviour;
mod support;
mod unit;
