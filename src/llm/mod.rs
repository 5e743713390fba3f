pub mod embedding;
pub mod gemini;
pub mod provider;
