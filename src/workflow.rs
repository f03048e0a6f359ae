//! Event loop that drives a [`Session`].
//!
//! A [`Workflow`] runs as a single tokio task. It takes commands from
//! [`WorkflowHandle`]s, runs the generation request in a child task and
//! publishes a [`View`] after every state change. A new source image while a
//! request is in flight cancels that request and starts over.

use crate::credentials::CredentialGate;
use crate::download::ImageSink;
use crate::error::{CartoonifyError, Result};
use crate::image::{EncodedImage, ImageProvider};
use crate::session::{cartoonify, Session, View};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

enum Command {
    CheckReady(oneshot::Sender<bool>),
    SelectKey(oneshot::Sender<()>),
    SelectSource(String, oneshot::Sender<()>),
    Download(oneshot::Sender<Result<bool>>),
    Reset(oneshot::Sender<()>),
}

struct InFlight {
    attempt: u64,
    task: JoinHandle<Result<EncodedImage>>,
}

/// Owns the session and its collaborators.
pub struct Workflow {
    session: Session,
    provider: Arc<dyn ImageProvider>,
    gate: Arc<dyn CredentialGate>,
    sink: Arc<dyn ImageSink>,
    views: watch::Sender<View>,
    in_flight: Option<InFlight>,
}

impl Workflow {
    /// Starts the event loop on the current tokio runtime.
    ///
    /// The readiness check runs before any command is handled. The loop stops
    /// once every handle has been dropped.
    pub fn spawn(
        provider: Arc<dyn ImageProvider>,
        gate: Arc<dyn CredentialGate>,
        sink: Arc<dyn ImageSink>,
    ) -> WorkflowHandle {
        let session = Session::new();
        let (views, view_rx) = watch::channel(session.view());
        let (tx, rx) = mpsc::channel(16);

        let workflow = Self {
            session,
            provider,
            gate,
            sink,
            views,
            in_flight: None,
        };
        tokio::spawn(workflow.run(rx));

        WorkflowHandle {
            commands: tx,
            views: view_rx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.check_ready().await;
        self.settle();

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle(command).await;
                }
                (attempt, outcome) = wait_in_flight(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.session.complete(attempt, outcome);
                }
            }
            self.settle();
        }

        self.cancel_in_flight();
        tracing::debug!("workflow stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::CheckReady(reply) => {
                let ready = self.check_ready().await;
                let _ = reply.send(ready);
            }
            Command::SelectKey(reply) => {
                match self.gate.open_select_key().await {
                    Ok(()) => self.session.key_selected(),
                    Err(err) => {
                        tracing::warn!("key selection failed: {err}");
                        self.session.key_selection_failed(&err);
                    }
                }
                self.settle();
                let _ = reply.send(());
            }
            Command::SelectSource(data_url, reply) => {
                self.cancel_in_flight();
                self.session.set_source(data_url);
                self.settle();
                let _ = reply.send(());
            }
            Command::Download(reply) => {
                let _ = reply.send(self.session.download(self.sink.as_ref()).await);
            }
            Command::Reset(reply) => {
                self.cancel_in_flight();
                self.session.reset();
                self.settle();
                let _ = reply.send(());
            }
        }
    }

    async fn check_ready(&mut self) -> bool {
        let ready = match self.gate.has_selected_key().await {
            Ok(ready) => ready,
            Err(err) => {
                tracing::warn!("readiness check failed: {err}");
                false
            }
        };
        self.session.set_key_ready(ready);
        self.settle();
        ready
    }

    /// Starts an attempt if one is due, then publishes the view.
    fn settle(&mut self) {
        if self.in_flight.is_none() {
            if let Some((attempt, source)) = self.session.begin_attempt() {
                tracing::info!(attempt, "starting generation");
                let provider = Arc::clone(&self.provider);
                let task =
                    tokio::spawn(async move { cartoonify(provider.as_ref(), &source).await });
                self.in_flight = Some(InFlight { attempt, task });
            }
        }
        self.views.send_if_modified(|current| {
            let next = self.session.view();
            if *current == next {
                return false;
            }
            tracing::debug!(view = next.name(), "view changed");
            *current = next;
            true
        });
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            tracing::info!(attempt = in_flight.attempt, "cancelling in-flight generation");
            in_flight.task.abort();
        }
    }
}

async fn wait_in_flight(in_flight: &mut Option<InFlight>) -> (u64, Result<EncodedImage>) {
    match in_flight {
        Some(in_flight) => {
            let outcome = match (&mut in_flight.task).await {
                Ok(outcome) => outcome,
                Err(err) => Err(CartoonifyError::Task(err.to_string())),
            };
            (in_flight.attempt, outcome)
        }
        None => std::future::pending().await,
    }
}

/// Cloneable front end for a running [`Workflow`].
#[derive(Clone)]
pub struct WorkflowHandle {
    commands: mpsc::Sender<Command>,
    views: watch::Receiver<View>,
}

impl WorkflowHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| CartoonifyError::WorkflowClosed)?;
        rx.await.map_err(|_| CartoonifyError::WorkflowClosed)
    }

    /// Re-queries the credential gate. Returns the readiness it reported.
    pub async fn check_ready(&self) -> Result<bool> {
        self.request(Command::CheckReady).await
    }

    /// Opens the host's credential picker.
    pub async fn select_key(&self) -> Result<()> {
        self.request(Command::SelectKey).await
    }

    /// Chooses a new source image (`data:<mime>;base64,<payload>`).
    ///
    /// Returns once the image is accepted; generation continues in the background.
    pub async fn select_source(&self, data_url: impl Into<String>) -> Result<()> {
        let data_url = data_url.into();
        self.request(|tx| Command::SelectSource(data_url, tx)).await
    }

    /// Saves the generated image. `Ok(false)` if there was nothing to save.
    pub async fn download(&self) -> Result<bool> {
        self.request(Command::Download).await?
    }

    /// Drops the source image and any result, cancelling an in-flight request.
    pub async fn reset(&self) -> Result<()> {
        self.request(Command::Reset).await
    }

    /// Returns the latest published view.
    pub fn view(&self) -> View {
        self.views.borrow().clone()
    }

    /// Returns a receiver notified on every view change.
    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.views.clone()
    }

    /// Waits until no request is in flight and returns the view.
    pub async fn settled(&self) -> Result<View> {
        let mut views = self.views.clone();
        let view = views
            .wait_for(|view| *view != View::Busy)
            .await
            .map_err(|_| CartoonifyError::WorkflowClosed)?;
        Ok(view.clone())
    }
}
