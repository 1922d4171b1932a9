use std::sync::Arc;

use anyhow::{anyhow, Result};
use shared::protocol::{FopEvent, FopSnapshot, UiEvent};
use storage::AthleteRepository;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    config::FopConfig, field_of_play::FieldOfPlay, scheduler::TokioScheduler, tone::ToneSink,
};

const UI_EVENT_CAPACITY: usize = 256;

pub(crate) enum Command {
    Event(FopEvent),
    Snapshot(oneshot::Sender<FopSnapshot>),
    Shutdown,
}

/// Cloneable front door of one platform's controller task.
#[derive(Clone)]
pub struct FopHandle {
    platform: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<UiEvent>,
}

impl FopHandle {
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Queues an input event. Never blocks.
    pub fn post(&self, event: FopEvent) {
        if self.commands.send(Command::Event(event)).is_err() {
            warn!(platform = %self.platform, "field of play stopped; event dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Result<FopSnapshot> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(reply))
            .map_err(|_| anyhow!("field of play '{}' stopped", self.platform))?;
        response
            .await
            .map_err(|_| anyhow!("field of play '{}' dropped the snapshot request", self.platform))
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Starts the controller task of one platform.
pub fn spawn_field_of_play(
    platform: impl Into<String>,
    config: FopConfig,
    repo: Arc<dyn AthleteRepository>,
    tones: Box<dyn ToneSink>,
) -> (FopHandle, JoinHandle<()>) {
    let platform: String = platform.into();
    let (commands, mut inbox) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(UI_EVENT_CAPACITY);

    let scheduler = TokioScheduler::new(commands.clone());
    let mut fop = FieldOfPlay::new(
        platform.clone(),
        config,
        repo,
        scheduler,
        tones,
        events.clone(),
    );

    let handle = FopHandle {
        platform: Arc::from(platform.as_str()),
        commands,
        events,
    };

    let task = tokio::spawn(async move {
        info!(platform = %fop.platform(), "field of play started");
        while let Some(command) = inbox.recv().await {
            match command {
                Command::Event(event) => fop.handle(event),
                Command::Snapshot(reply) => {
                    let _ = reply.send(fop.snapshot());
                }
                Command::Shutdown => break,
            }
        }
        info!(platform = %fop.platform(), "field of play stopped");
    });

    (handle, task)
}
