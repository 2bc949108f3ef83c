//! Alert sources feeding the dispatcher.

pub mod json_lines;
pub mod memory;
pub mod traits;

pub use json_lines::forward_json_lines;
pub use memory::MemoryAlertSource;
