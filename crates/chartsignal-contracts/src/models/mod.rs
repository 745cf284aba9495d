mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, CAPABILITY_JSON, CAPABILITY_VISION};
pub use selectors::{ModelSelection, ModelSelector};
