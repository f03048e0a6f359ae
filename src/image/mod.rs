//! Image payloads and the generation provider seam.

mod provider;
pub mod providers;
mod types;

pub use provider::ImageProvider;
pub use types::{
    EncodedImage, GenerationRequest, ImageFormat, CARTOON_PROMPT, DATA_URL_SEPARATOR,
};
