//! Data shared between the `firewatch` components.
pub mod prediction;
pub mod settings;

/// Error type.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
