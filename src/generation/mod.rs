//! Generation invocation: the response cache and the k-sample batch sampler.

pub mod cache;
pub mod sampler;

pub use cache::{cache_key, CacheSnapshot, CacheStats, ResponseCache};
pub use sampler::{
    generation_error_text, is_generation_error, Sampler, SamplerSettings,
    GENERATION_ERROR_PREFIX,
};
