//! Shared test harness modules for the conflator CLI.
#![expect(
    clippy::panic,
    reason = "Tests assert panic branches to surface unexpected CLI outcomes"
)]

use super::*;

mod conflate_steps;
mod helpers;
