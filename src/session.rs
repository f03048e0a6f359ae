//! Session state and the view it selects.
//!
//! [`Session`] holds everything the workflow tracks between events: the source
//! image, the latest result, the busy flag, the error text and whether a
//! credential is ready. [`Session::view`] turns that into exactly one [`View`].

use crate::download::{ImageSink, DOWNLOAD_FILENAME};
use crate::error::{CartoonifyError, Result};
use crate::image::{EncodedImage, GenerationRequest, ImageProvider};

/// What the user should be shown, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// The last action failed.
    Error {
        /// Message to display.
        message: String,
        /// True when the credential is not ready and re-selection should be offered.
        offer_key_selection: bool,
    },
    /// No credential selected; prompt for one.
    KeyMissing,
    /// A request is in flight.
    Busy,
    /// A generated image is available.
    Result {
        /// The source image as a data URL, shown next to the result.
        original: Option<String>,
        /// The generated image.
        generated: EncodedImage,
    },
    /// Nothing attempted yet.
    Empty,
}

impl View {
    /// Short lowercase name, used in logs and JSON output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::KeyMissing => "key_missing",
            Self::Busy => "busy",
            Self::Result { .. } => "result",
            Self::Empty => "empty",
        }
    }
}

/// Transient state for one cartoonify session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    source: Option<String>,
    generated: Option<EncodedImage>,
    busy: bool,
    error: Option<String>,
    key_ready: bool,
    attempt: u64,
    trigger_pending: bool,
}

impl Session {
    /// Creates an empty session with no credential ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the view for the current state.
    pub fn view(&self) -> View {
        if let Some(message) = &self.error {
            return View::Error {
                message: message.clone(),
                offer_key_selection: !self.key_ready,
            };
        }
        if !self.key_ready {
            return View::KeyMissing;
        }
        if self.busy {
            return View::Busy;
        }
        if let Some(generated) = &self.generated {
            return View::Result {
                original: self.source.clone(),
                generated: generated.clone(),
            };
        }
        View::Empty
    }

    /// Returns the source data URL, if one was chosen.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Returns the generated image, if the last attempt succeeded.
    pub fn generated(&self) -> Option<&EncodedImage> {
        self.generated.as_ref()
    }

    /// Returns true while a request is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Returns the current error message.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns true if a credential is ready.
    pub fn key_ready(&self) -> bool {
        self.key_ready
    }

    /// Chooses a new source image, discarding everything from the previous one.
    ///
    /// Any in-flight attempt is superseded: its completion will be ignored.
    pub fn set_source(&mut self, data_url: impl Into<String>) {
        self.source = Some(data_url.into());
        self.generated = None;
        self.error = None;
        self.busy = false;
        self.attempt += 1;
        self.trigger_pending = true;
    }

    /// Returns to the image-selection state. The credential stays as it is.
    pub fn reset(&mut self) {
        self.source = None;
        self.generated = None;
        self.error = None;
        self.busy = false;
        self.attempt += 1;
        self.trigger_pending = false;
    }

    /// Records the result of a readiness check.
    pub fn set_key_ready(&mut self, ready: bool) {
        if ready && !self.key_ready {
            self.trigger_pending = true;
        }
        self.key_ready = ready;
    }

    /// Records a successful credential selection.
    pub fn key_selected(&mut self) {
        self.error = None;
        self.set_key_ready(true);
    }

    /// Records a credential picker that failed to open.
    pub fn key_selection_failed(&mut self, err: &CartoonifyError) {
        self.error = Some(err.to_string());
        self.key_ready = false;
    }

    /// Returns true if a new attempt should start: a source is present, the
    /// credential is ready, and the image or readiness changed since the last one.
    pub fn needs_attempt(&self) -> bool {
        self.trigger_pending && self.key_ready && self.source.is_some()
    }

    /// Starts an attempt, returning its id and the source to send.
    ///
    /// Clears the previous error and result and sets busy.
    pub fn begin_attempt(&mut self) -> Option<(u64, String)> {
        if !self.needs_attempt() {
            return None;
        }
        let source = self.source.clone()?;
        self.trigger_pending = false;
        self.error = None;
        self.generated = None;
        self.busy = true;
        self.attempt += 1;
        Some((self.attempt, source))
    }

    /// Applies the outcome of attempt `attempt`. Returns false if the attempt
    /// was superseded and the outcome dropped.
    pub fn complete(&mut self, attempt: u64, outcome: Result<EncodedImage>) -> bool {
        if attempt != self.attempt || !self.busy {
            tracing::debug!(attempt, current = self.attempt, "dropping stale outcome");
            return false;
        }
        self.busy = false;
        match outcome {
            Ok(image) => {
                tracing::info!(mime_type = %image.mime_type, size = image.size(), "image generated");
                self.generated = Some(image);
            }
            Err(err) => {
                if err.is_credential_error() {
                    tracing::warn!("credential rejected: {err}");
                    self.key_ready = false;
                } else {
                    tracing::warn!("generation failed: {err}");
                }
                self.error = Some(err.user_message());
            }
        }
        true
    }

    /// Runs one attempt to completion against `provider`, if one is due.
    pub async fn run(&mut self, provider: &dyn ImageProvider) -> bool {
        let Some((attempt, source)) = self.begin_attempt() else {
            return false;
        };
        let outcome = cartoonify(provider, &source).await;
        self.complete(attempt, outcome)
    }

    /// Saves the generated image through `sink`.
    ///
    /// Returns `Ok(false)` without touching the sink when there is nothing to save.
    pub async fn download(&self, sink: &dyn ImageSink) -> Result<bool> {
        let Some(image) = &self.generated else {
            return Ok(false);
        };
        sink.save(DOWNLOAD_FILENAME, image).await?;
        Ok(true)
    }
}

/// Decodes `data_url` and asks `provider` for the cartoon version.
///
/// A malformed data URL fails before any request is made.
pub async fn cartoonify(provider: &dyn ImageProvider, data_url: &str) -> Result<EncodedImage> {
    let source = EncodedImage::from_data_url(data_url)?;
    let request = GenerationRequest::cartoon(source);
    provider.generate(&request).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::image::CARTOON_PROMPT;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) const SOURCE: &str = "data:image/jpeg;base64,aGVsbG8=";

    pub(crate) fn generated() -> EncodedImage {
        EncodedImage::new("image/png", vec![0x89, b'P', b'N', b'G'])
    }

    /// Provider double with a scripted outcome.
    pub(crate) struct StubProvider {
        pub(crate) calls: AtomicUsize,
        outcome: Box<dyn Fn() -> Result<EncodedImage> + Send + Sync>,
    }

    impl StubProvider {
        pub(crate) fn new(outcome: impl Fn() -> Result<EncodedImage> + Send + Sync + 'static) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome: Box::new(outcome),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageProvider for StubProvider {
        async fn generate(&self, request: &GenerationRequest) -> Result<EncodedImage> {
            assert_eq!(request.prompt, CARTOON_PROMPT);
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }

        fn name(&self) -> &str {
            "stub"
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Sink double recording every save.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) saved: Mutex<Vec<(String, EncodedImage)>>,
    }

    #[async_trait]
    impl ImageSink for RecordingSink {
        async fn save(&self, filename: &str, image: &EncodedImage) -> Result<()> {
            self.saved
                .lock()
                .unwrap()
                .push((filename.to_string(), image.clone()));
            Ok(())
        }
    }

    fn ready_session(source: &str) -> Session {
        let mut session = Session::new();
        session.set_key_ready(true);
        session.set_source(source);
        session
    }

    #[test]
    fn test_initial_view_is_key_missing() {
        assert_eq!(Session::new().view(), View::KeyMissing);
    }

    #[test]
    fn test_ready_without_attempt_is_empty() {
        let mut session = Session::new();
        session.set_key_ready(true);
        assert_eq!(session.view(), View::Empty);
        assert!(!session.needs_attempt());
    }

    #[tokio::test]
    async fn test_key_missing_never_calls_provider() {
        let provider = StubProvider::new(|| Ok(generated()));
        let mut session = Session::new();
        session.set_source(SOURCE);

        assert!(!session.run(&provider).await);
        assert_eq!(session.view(), View::KeyMissing);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_source_never_calls_provider() {
        let provider = StubProvider::new(|| Ok(generated()));
        let mut session = ready_session("data:image/png,aGVsbG8=");

        assert!(session.run(&provider).await);
        assert_eq!(provider.calls(), 0);
        assert_eq!(
            session.view(),
            View::Error {
                message: "Invalid image data URL format.".into(),
                offer_key_selection: false,
            }
        );
        assert!(session.key_ready());
    }

    #[tokio::test]
    async fn test_success_shows_exact_image() {
        let provider = StubProvider::new(|| Ok(generated()));
        let mut session = ready_session(SOURCE);

        assert!(session.run(&provider).await);
        assert_eq!(provider.calls(), 1);
        assert!(!session.is_busy());
        assert_eq!(session.error(), None);
        assert_eq!(
            session.view(),
            View::Result {
                original: Some(SOURCE.to_string()),
                generated: generated(),
            }
        );
    }

    #[tokio::test]
    async fn test_no_image_error() {
        let provider = StubProvider::new(|| Err(CartoonifyError::NoImage));
        let mut session = ready_session(SOURCE);

        session.run(&provider).await;
        assert_eq!(
            session.view(),
            View::Error {
                message: "The model did not return an image. Please try again.".into(),
                offer_key_selection: false,
            }
        );
        assert!(session.key_ready());
    }

    #[tokio::test]
    async fn test_invalid_key_resets_readiness() {
        let provider = StubProvider::new(|| {
            Err(CartoonifyError::Api {
                status: 400,
                message: "API key not valid. Please pass a valid API key.".into(),
            })
        });
        let mut session = ready_session(SOURCE);

        session.run(&provider).await;
        assert!(!session.key_ready());
        assert_eq!(
            session.view(),
            View::Error {
                message: crate::error::INVALID_KEY_MESSAGE.into(),
                offer_key_selection: true,
            }
        );

        // Re-selecting the key clears the error and re-triggers the attempt.
        session.key_selected();
        assert!(session.needs_attempt());
    }

    #[tokio::test]
    async fn test_unclassified_error_surfaces_raw_message() {
        let provider = StubProvider::new(|| {
            Err(CartoonifyError::Api {
                status: 503,
                message: "overloaded".into(),
            })
        });
        let mut session = ready_session(SOURCE);

        session.run(&provider).await;
        assert_eq!(session.error(), Some("API error: 503 - overloaded"));
        assert!(session.key_ready());
        // A failure does not re-trigger on its own.
        assert!(!session.needs_attempt());
    }

    #[test]
    fn test_begin_attempt_clears_previous_outcome() {
        let mut session = ready_session(SOURCE);
        let (attempt, source) = session.begin_attempt().unwrap();
        assert_eq!(source, SOURCE);
        assert_eq!(session.view(), View::Busy);

        session.complete(attempt, Ok(generated()));
        assert!(session.generated().is_some());

        session.set_key_ready(false);
        session.set_key_ready(true);
        session.begin_attempt().unwrap();
        assert_eq!(session.error(), None);
        assert_eq!(session.generated(), None);
        assert!(session.is_busy());
    }

    #[test]
    fn test_stale_outcome_is_dropped() {
        let mut session = ready_session(SOURCE);
        let (first, _) = session.begin_attempt().unwrap();

        session.set_source("data:image/png;base64,d29ybGQ=");
        let (second, _) = session.begin_attempt().unwrap();

        assert!(!session.complete(first, Ok(generated())));
        assert_eq!(session.view(), View::Busy);
        assert!(session.complete(second, Err(CartoonifyError::NoImage)));
    }

    #[test]
    fn test_error_wins_over_result() {
        let mut session = ready_session(SOURCE);
        session.generated = Some(generated());
        session.error = Some("boom".into());
        assert_eq!(
            session.view(),
            View::Error {
                message: "boom".into(),
                offer_key_selection: false,
            }
        );
    }

    #[test]
    fn test_key_missing_wins_over_busy() {
        let mut session = ready_session(SOURCE);
        session.begin_attempt().unwrap();
        session.key_ready = false;
        assert_eq!(session.view(), View::KeyMissing);
    }

    #[test]
    fn test_dialog_failure_forces_not_ready() {
        let mut session = Session::new();
        session.set_key_ready(true);
        session.key_selection_failed(&CartoonifyError::Dialog("no picker".into()));
        assert_eq!(
            session.view(),
            View::Error {
                message: "could not open key selection: no picker".into(),
                offer_key_selection: true,
            }
        );
    }

    #[test]
    fn test_reset_returns_to_empty() {
        let mut session = ready_session(SOURCE);
        let (attempt, _) = session.begin_attempt().unwrap();
        session.complete(attempt, Ok(generated()));

        session.reset();
        assert_eq!(session.view(), View::Empty);
        assert_eq!(session.source(), None);
        assert!(!session.needs_attempt());
    }

    #[tokio::test]
    async fn test_download_noop_without_result() {
        let sink = RecordingSink::default();
        let session = ready_session(SOURCE);
        assert!(!session.download(&sink).await.unwrap());
        assert!(sink.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_saves_exact_payload_once() {
        let provider = StubProvider::new(|| Ok(generated()));
        let sink = RecordingSink::default();
        let mut session = ready_session(SOURCE);
        session.run(&provider).await;

        assert!(session.download(&sink).await.unwrap());
        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, DOWNLOAD_FILENAME);
        assert_eq!(saved[0].1, generated());
    }

    #[test]
    fn test_view_names() {
        assert_eq!(View::Busy.name(), "busy");
        assert_eq!(View::KeyMissing.name(), "key_missing");
    }
}
