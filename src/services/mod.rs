pub mod generator;
pub mod providers;
pub mod reason_text;
pub mod recommendations;

pub use generator::{GenerationOptions, RecommendationGenerator};
pub use reason_text::{ReasonDescriber, ReasonTextClient, ReasonTextSource};
pub use recommendations::{RecommendationService, ServiceSettings};
