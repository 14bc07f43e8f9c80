pub mod api;
pub mod capability;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod readiness;
pub mod state;

pub use config::LprServiceConfig;
pub use error::{ApiError, PipelineError};
pub use pipeline::DetectionPipeline;
pub use state::LprServiceState;
