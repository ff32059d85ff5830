//! Array IR tooling: a textual frontend, the IR itself, and the store
//! reordering pass that schedules pipeline regions for locality.

pub mod frontend;
pub mod index;
pub mod middle;
pub mod registry;
