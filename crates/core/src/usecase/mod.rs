pub mod app_service;
pub mod busy;
pub mod export;
pub mod job_controller;
pub mod links;
pub mod translation;

pub use app_service::AppService;
pub use busy::{BusyFlag, BusyHolder};
pub use job_controller::{JobController, PollSettings};
pub use links::{LinkResolution, LinkResolver};
pub use translation::TranslationRunner;
