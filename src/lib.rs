pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod handler;
pub mod model;
pub mod prompt;
pub mod request;
pub mod stats;
pub mod util;
pub mod validate;

pub use error::BlogError;
pub use handler::BlogHandler;
pub use model::{GenerationConfig, LlmBackend};
pub use request::{AudienceSet, GenerationRequest, GenerationResult, RawBlogRequest};
