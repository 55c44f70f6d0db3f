//! Cross-module scheduler tests run against the simulated host architecture.

mod helpers;
mod scenarios;
