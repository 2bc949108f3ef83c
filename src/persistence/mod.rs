//! Alert buffering and group bookkeeping used by the dispatcher.

pub mod error;
pub mod marker;
pub mod memory;
pub mod traits;

pub use marker::MemoryGroupMarker;
pub use memory::MemoryAlertBuffer;
