//! Core module - Instance registry, lifecycle, pipelines, files and logs

mod actor;
pub mod console;
pub mod error;
pub mod files;
pub mod instance;
pub mod lifecycle;
pub mod logs;
pub mod pipeline;
pub mod profile;
mod registry;
pub mod resource;
pub mod scanner;
pub mod settings;

pub use actor::{DeleteMode, InstanceEvent};
pub use files::FileId;
pub use instance::{InstanceId, ProjectRequest, Template};
pub use registry::{ConfirmGate, InstanceRegistry};
pub use settings::Settings;
