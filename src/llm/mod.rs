pub mod gemini;
pub mod media;
pub mod types;

pub use gemini::GeminiImageClient;
pub use types::{ImageSynthesizer, SynthesisError, SynthesisRequest, SynthesizedImage};
