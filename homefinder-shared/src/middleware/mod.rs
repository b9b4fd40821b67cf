pub mod auth_extractor;
pub mod tracing_layer;

pub use auth_extractor::OptionalAuthUser;
pub use tracing_layer::init_tracing;
