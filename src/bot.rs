//! IntakeBot — the main message loop.
//!
//! Inbound messages from every channel are fanned out into per-user lanes.
//! A lane is an unbounded queue plus one worker task, so a user's messages
//! are handled and answered strictly in arrival order while other users
//! proceed in parallel. A lane with nothing to do for `LANE_IDLE` closes and
//! is recreated on that user's next message; the new worker starts only
//! after the old one has finished draining.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse};
use crate::commands::{CommandAction, CommandRegistry, Route};
use crate::error::Error;
use crate::intake::{IntakeManager, prompts};

/// How long an idle lane worker waits before exiting.
const LANE_IDLE: Duration = Duration::from_secs(300);

struct Lane {
    tx: mpsc::UnboundedSender<IncomingMessage>,
    /// Resolves once the lane's worker has exited.
    done: oneshot::Receiver<()>,
}

/// Open lanes keyed by `channel:user_id`, plus their workers.
struct Lanes {
    open: HashMap<String, Lane>,
    workers: JoinSet<String>,
}

impl Lanes {
    fn new() -> Self {
        Self {
            open: HashMap::new(),
            workers: JoinSet::new(),
        }
    }

    /// Collect finished workers and forget their lanes.
    fn reap(&mut self) {
        while let Some(joined) = self.workers.try_join_next() {
            match joined {
                Ok(key) => {
                    // A replacement lane may already sit under this key.
                    if self.open.get(&key).is_some_and(|lane| lane.tx.is_closed()) {
                        self.open.remove(&key);
                    }
                }
                Err(e) => warn!("Lane worker failed: {}", e),
            }
        }
    }

    /// Close every lane and wait for queued messages to be answered.
    async fn close(mut self) {
        self.open.clear();
        while self.workers.join_next().await.is_some() {}
    }
}

/// Routes messages to commands or the intake flow and sends the replies.
pub struct IntakeBot {
    channels: Arc<ChannelManager>,
    commands: CommandRegistry,
    intake: Arc<IntakeManager>,
    lane_idle: Duration,
}

impl IntakeBot {
    pub fn new(
        channels: Arc<ChannelManager>,
        commands: CommandRegistry,
        intake: Arc<IntakeManager>,
    ) -> Self {
        Self {
            channels,
            commands,
            intake,
            lane_idle: LANE_IDLE,
        }
    }

    /// Override how long an idle lane lingers before its worker exits.
    pub fn with_lane_idle(mut self, idle: Duration) -> Self {
        self.lane_idle = idle;
        self
    }

    /// Run until Ctrl+C or until every channel stream ends. Messages already
    /// queued in a lane are still answered before returning.
    pub async fn run(self) -> Result<(), Error> {
        let bot = Arc::new(self);
        let mut message_stream = bot.channels.start_all().await?;
        let mut lanes = Lanes::new();

        info!("Intake bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            bot.dispatch(&mut lanes, message);
        }

        info!("Intake bot shutting down...");
        lanes.close().await;
        bot.channels.shutdown_all().await?;

        Ok(())
    }

    /// Queue `message` on its user's lane, opening one if needed.
    fn dispatch(self: &Arc<Self>, lanes: &mut Lanes, message: IncomingMessage) {
        lanes.reap();

        let key = format!("{}:{}", message.channel, message.user_id);
        let message = match lanes.open.get(&key) {
            Some(lane) => match lane.tx.send(message) {
                Ok(()) => return,
                // Worker went idle and closed; open a fresh lane below.
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };
        let previous = lanes.open.remove(&key).map(|lane| lane.done);

        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        lanes
            .workers
            .spawn(Arc::clone(self).lane_worker(key.clone(), rx, previous, done_tx));
        if tx.send(message).is_err() {
            warn!(lane = %key, "New lane closed before first message");
        }
        lanes.open.insert(key, Lane { tx, done: done_rx });
    }

    async fn lane_worker(
        self: Arc<Self>,
        key: String,
        mut rx: mpsc::UnboundedReceiver<IncomingMessage>,
        previous: Option<oneshot::Receiver<()>>,
        _done: oneshot::Sender<()>,
    ) -> String {
        if let Some(previous) = previous {
            // The retired worker may still be draining this user's messages.
            let _ = previous.await;
        }
        debug!(lane = %key, "Lane opened");
        loop {
            match tokio::time::timeout(self.lane_idle, rx.recv()).await {
                Ok(Some(message)) => self.process(&message).await,
                Ok(None) => break,
                Err(_) => {
                    // Refuse new sends, then finish whatever already arrived.
                    rx.close();
                    while let Ok(message) = rx.try_recv() {
                        self.process(&message).await;
                    }
                    break;
                }
            }
        }
        debug!(lane = %key, "Lane closed");
        key
    }

    async fn process(&self, message: &IncomingMessage) {
        let Some(reply) = self.handle_message(message).await else {
            return;
        };
        if let Err(e) = self
            .channels
            .respond(message, OutgoingResponse::text(reply))
            .await
        {
            error!(channel = %message.channel, user_id = %message.user_id, "Failed to send reply: {}", e);
        }
    }

    /// Compute the reply for one message. `None` means stay silent.
    pub async fn handle_message(&self, message: &IncomingMessage) -> Option<String> {
        let user_id = message.user_id.as_str();
        match self.commands.route(&message.content) {
            Route::Command { name, action } => {
                debug!(user_id, command = %name, "Command received");
                match action {
                    CommandAction::Reply(text) => Some(text.to_string()),
                    CommandAction::StartFlow => Some(self.intake.on_start_flow(user_id).await),
                }
            }
            Route::Text => {
                match self
                    .intake
                    .on_text_event(user_id, &message.event_id, &message.content)
                    .await
                {
                    Ok(reply) => reply.map(|r| r.text),
                    Err(e) => {
                        error!(user_id, request_id = %message.event_id, "Request not saved: {}", e);
                        Some(prompts::SAVE_FAILED.to_string())
                    }
                }
            }
        }
    }
}
