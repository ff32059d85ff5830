//! The array IR and everything that runs on it once a program has been
//! parsed: shared analyses, and the optimization passes that rewrite pipeline
//! regions.

pub mod analysis;
pub mod ir;
pub mod optimization;
