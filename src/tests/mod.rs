//! # Scenario Tests
//!
//! End-to-end checks that run whole files through loading, selection and the
//! derivations, plus configuration-driven model runs. Per-function unit tests
//! live next to the code they cover.

mod derivation_tests;
mod fixtures;
mod model_tests;
