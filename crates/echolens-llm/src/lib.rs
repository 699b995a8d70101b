pub mod gemini;
pub mod sse;

pub mod mock;

pub use gemini::{GeminiConfig, GeminiProvider};
pub use mock::{MockProvider, MockResponse};
