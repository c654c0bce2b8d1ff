pub mod error;
pub mod events;
pub mod job;
pub mod settings;
pub mod subtitle;
pub mod types;
