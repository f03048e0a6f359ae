//! Image provider trait.

use crate::error::Result;
use crate::image::types::{EncodedImage, GenerationRequest};
use async_trait::async_trait;

/// Trait for image generation providers.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Sends the source image and instruction, returning the first image the
    /// service produced.
    async fn generate(&self, request: &GenerationRequest) -> Result<EncodedImage>;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str;

    /// Checks if the provider is reachable and authenticated.
    async fn health_check(&self) -> Result<()>;
}

