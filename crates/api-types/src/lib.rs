pub mod health;
pub mod setup;
pub mod types;

pub use health::HealthResponse;
pub use setup::{ErrorResponse, SetupFields, SetupRequest, SetupResponse};
pub use types::{Provider, UnknownProvider};
