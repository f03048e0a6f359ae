#![warn(missing_docs)]
//! Cartoonify - turn a photo into a 3D animated movie style cartoon portrait.
//!
//! The crate drives a single linear workflow: pick a source image, make sure an
//! API credential is ready, send one request to the Gemini image model, and show
//! the result next to the original with a download action.
//!
//! # Quick Start
//!
//! ```no_run
//! use cartoonify::{cartoonify, EncodedImage, GeminiProvider};
//!
//! #[tokio::main]
//! async fn main() -> cartoonify::Result<()> {
//!     let provider = GeminiProvider::builder().build()?;
//!     let source = EncodedImage::from_path("portrait.jpg")?;
//!     let image = cartoonify(&provider, &source.to_data_url()).await?;
//!     std::fs::write("cartoonified-image.png", &image.data)?;
//!     Ok(())
//! }
//! ```
//!
//! # Workflow
//!
//! For interactive front ends, [`Workflow::spawn`] runs the state machine as a
//! task and publishes a [`View`] after every change:
//!
//! ```no_run
//! use std::sync::Arc;
//! use cartoonify::{ApiKey, EnvCredentials, FileSink, GeminiProvider, View, Workflow};
//!
//! #[tokio::main]
//! async fn main() -> cartoonify::Result<()> {
//!     let key = ApiKey::from_env();
//!     let provider = GeminiProvider::builder().api_key_slot(key.clone()).build()?;
//!     let handle = Workflow::spawn(
//!         Arc::new(provider),
//!         Arc::new(EnvCredentials::new(key)),
//!         Arc::new(FileSink::new(".")),
//!     );
//!
//!     handle.select_source("data:image/png;base64,iVBORw0KGgo=").await?;
//!     if let View::Result { .. } = handle.settled().await? {
//!         handle.download().await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini`: Gemini (Google) provider
//! - `cli`: Command-line interface

mod error;

pub mod credentials;
pub mod download;
pub mod image;
pub mod session;
pub mod workflow;

// Re-export error types at crate root
pub use error::{CartoonifyError, Result, CREDENTIAL_ERROR_PHRASES, INVALID_KEY_MESSAGE};

pub use credentials::{ApiKey, CredentialGate, EnvCredentials, KeyPicker, API_KEY_ENV_VARS};
pub use download::{FileSink, ImageSink, DOWNLOAD_FILENAME};
pub use image::{EncodedImage, GenerationRequest, ImageFormat, ImageProvider, CARTOON_PROMPT};
pub use session::{cartoonify, Session, View};
pub use workflow::{Workflow, WorkflowHandle};

#[cfg(feature = "gemini")]
pub use image::providers::{GeminiModel, GeminiProvider, GeminiProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::credentials::{CredentialGate, EnvCredentials};
    pub use crate::download::{FileSink, ImageSink};
    pub use crate::error::{CartoonifyError, Result};
    pub use crate::image::{EncodedImage, ImageProvider};
    pub use crate::session::{Session, View};
    pub use crate::workflow::{Workflow, WorkflowHandle};

    #[cfg(feature = "gemini")]
    pub use crate::image::providers::GeminiProvider;
}
