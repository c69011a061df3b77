pub mod providers;
pub mod registry;

pub use providers::openai::OpenAiProvider;
pub use registry::ProviderRegistry;
