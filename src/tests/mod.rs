//! Scheduler test suite, run from `main` once the scheduler is enabled.

pub mod comprehensive;

pub use comprehensive::run_test_suite;
