pub mod reorder_stores;
pub mod verify;
