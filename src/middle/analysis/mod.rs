//! Read-only analyses over the IR shared by the optimization passes.

pub mod uses_var;
