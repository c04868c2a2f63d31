pub mod daemon;
pub mod notifications;
pub mod tasks;
