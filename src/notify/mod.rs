pub mod model;
pub mod storage;

pub use model::Notification;
pub use storage::NotificationStore;
