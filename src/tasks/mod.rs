pub mod diff;
pub mod model;
pub mod storage;

pub use model::{Task, TaskPriority, TaskStatus};
pub use storage::TaskStorage;
