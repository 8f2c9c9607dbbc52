// Quill - feedback-driven social post pipeline
// Library exports

pub mod app;
pub mod calendar;
pub mod config;
pub mod engage;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod providers;
pub mod publish;
pub mod review;
pub mod store;
pub mod trends;
