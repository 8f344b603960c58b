//! Handshake Session
//!
//! Binds a [`PairingHandler`] to a [`DeviceLink`]: subscribes to the auth
//! characteristic, writes the frames the handler asks for, applies the
//! write-failure and deadline policies, and publishes the outcome.

use super::events::SessionEvent;
use super::handler::{PairingHandler, Transition};
use super::state::{FailureReason, PairingOutcome, SessionState};
use crate::cipher::PreSharedKey;
use crate::codec::Frame;
use crate::config::{SessionConfig, WriteFailurePolicy};
use crate::link::{DeviceLink, Notification, NotificationReceiver};
use crate::link::{AUTH_CHARACTERISTIC_UUID, SERVICE_UUID};
use crate::{PairingError, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Resolves to the session outcome
///
/// Obtained from [`HandshakeSession::outcome`]; stays usable after the
/// session itself has been consumed or dropped. A session dropped before it
/// finished resolves to `Failed(LinkError)`.
#[derive(Debug, Clone)]
pub struct OutcomeWatcher {
    rx: watch::Receiver<Option<PairingOutcome>>,
}

impl OutcomeWatcher {
    /// Outcome if already known
    pub fn current(&self) -> Option<PairingOutcome> {
        *self.rx.borrow()
    }

    /// Wait for the session to finish
    pub async fn wait(mut self) -> PairingOutcome {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => *outcome,
            Err(_) => None,
        };
        outcome.unwrap_or(PairingOutcome::Failed(FailureReason::LinkError))
    }
}

/// One pairing handshake with one connected device
pub struct HandshakeSession<L: DeviceLink + ?Sized> {
    /// Connected peer
    link: Arc<L>,

    /// Protocol state machine
    handler: PairingHandler,

    /// Policies
    config: SessionConfig,

    /// Notification subscription, present between start and the terminal state
    notifications: Option<NotificationReceiver>,

    /// Event channel sender
    event_tx: mpsc::UnboundedSender<SessionEvent>,

    /// Event channel receiver, until taken by the caller
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,

    /// Outcome publisher
    outcome_tx: watch::Sender<Option<PairingOutcome>>,
}

impl<L: DeviceLink + ?Sized> HandshakeSession<L> {
    /// Create a session bound to a connected device
    pub fn new(link: Arc<L>, key: PreSharedKey, config: SessionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outcome_tx, _) = watch::channel(None);

        Self {
            link,
            handler: PairingHandler::new(key, config.max_link_errors),
            config,
            notifications: None,
            event_tx,
            event_rx: Some(event_rx),
            outcome_tx,
        }
    }

    /// Take the event receiver (only the first call returns it)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx.take()
    }

    pub fn current_state(&self) -> SessionState {
        self.handler.state()
    }

    /// Last error seen that did not necessarily end the session
    pub fn last_error(&self) -> Option<&str> {
        self.handler.last_error()
    }

    /// Watcher resolving to `Authenticated` or `Failed(reason)`
    pub fn outcome(&self) -> OutcomeWatcher {
        OutcomeWatcher {
            rx: self.outcome_tx.subscribe(),
        }
    }

    /// Subscribe to the auth characteristic and send activation and key
    ///
    /// # Errors
    ///
    /// `AlreadyStarted` if called twice (state unchanged). A failed
    /// subscription is returned as well, after failing the session with
    /// `link_error`.
    pub async fn start(&mut self) -> Result<()> {
        let frames = self.handler.start()?;
        self.publish(Transition {
            from: SessionState::Idle,
            to: SessionState::AwaitingHello,
            reply: None,
        });

        let peer = self.link.peer();
        info!("Pairing with {}", peer);

        match self
            .link
            .subscribe(SERVICE_UUID, AUTH_CHARACTERISTIC_UUID)
            .await
        {
            Ok(rx) => self.notifications = Some(rx),
            Err(e) => {
                error!("Failed to subscribe to {}: {}", peer, e);
                self.handler.record_error(e.to_string());
                self.force_fail(FailureReason::LinkError).await;
                return Err(e);
            }
        }

        let _ = self.event_tx.send(SessionEvent::Started { peer });

        let mut failed_writes = 0;
        for frame in frames.iter() {
            if !self.send(frame).await {
                failed_writes += 1;
            }
            if self.handler.state().is_terminal() {
                return Ok(());
            }
        }

        if failed_writes == frames.len() {
            warn!("Neither activation nor key reached the device");
            self.force_fail(FailureReason::LinkError).await;
        }

        Ok(())
    }

    /// Feed one notification into the handshake
    ///
    /// # Errors
    ///
    /// `NotStarted` before `start()`. Protocol failures are not errors here:
    /// they end the session and show up in [`current_state`](Self::current_state).
    pub async fn on_notification(&mut self, notification: Notification) -> Result<()> {
        if self.handler.state() == SessionState::Idle {
            return Err(PairingError::NotStarted);
        }

        if self.handler.state().is_terminal() {
            debug!("Session already finished, dropping notification");
            return Ok(());
        }

        if let Notification::Error(message) = &notification {
            let _ = self.event_tx.send(SessionEvent::LinkError {
                message: message.clone(),
            });
        }

        let transition = self.handler.handle_notification(&notification);
        self.publish(transition);

        if let Some(frame) = transition.reply {
            self.send(&frame).await;
        }

        if transition.changed() && transition.to.is_terminal() {
            self.finish().await;
        }

        Ok(())
    }

    /// Drive the handshake from the link's notifications until it ends
    ///
    /// Starts the session if needed. With `state_timeout_secs` set, every
    /// state gets that long to be left before the session fails with
    /// `timeout`. A closed notification stream fails with `link_error`.
    pub async fn run(mut self) -> PairingOutcome {
        if self.handler.state() == SessionState::Idle {
            if let Err(e) = self.start().await {
                warn!("Handshake could not start: {}", e.user_message());
            }
        }

        let state_timeout = self.config.state_timeout();
        let mut state = self.handler.state();
        let mut deadline = state_timeout.map(|t| Instant::now() + t);

        while !self.handler.state().is_terminal() {
            let Some(rx) = self.notifications.as_mut() else {
                self.force_fail(FailureReason::LinkError).await;
                break;
            };

            let next = match deadline {
                Some(at) => match timeout_at(at, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("No answer from device while {}", state);
                        self.force_fail(FailureReason::Timeout).await;
                        break;
                    }
                },
                None => rx.recv().await,
            };

            match next {
                Some(notification) => {
                    if let Err(e) = self.on_notification(notification).await {
                        warn!("Dropped notification: {}", e);
                    }
                }
                None => {
                    info!("Notification stream closed by {}", self.link.peer());
                    self.handler.record_error("notification stream closed");
                    self.force_fail(FailureReason::LinkError).await;
                }
            }

            if self.handler.state() != state {
                state = self.handler.state();
                deadline = state_timeout.map(|t| Instant::now() + t);
            }
        }

        self.handler
            .state()
            .outcome()
            .unwrap_or(PairingOutcome::Failed(FailureReason::LinkError))
    }

    /// Stop listening and discard the session
    pub async fn abort(mut self) {
        if self.notifications.take().is_some() {
            debug!("Aborting handshake in state {}", self.handler.state());
            if let Err(e) = self.link.unsubscribe().await {
                warn!("Failed to unsubscribe: {}", e);
            }
        }
    }

    /// Fail the session from outside the protocol (deadline, link loss)
    pub async fn force_fail(&mut self, reason: FailureReason) {
        let transition = self.handler.fail(reason);
        self.publish(transition);
        if transition.changed() {
            self.finish().await;
        }
    }

    /// Write one frame, returning whether it went out
    ///
    /// Errors the link does not classify as transient end the session
    /// whatever the write-failure policy says.
    async fn send(&mut self, frame: &Frame) -> bool {
        let command = frame.command();
        let value = frame.to_transport(self.config.frame_layout);

        match self
            .link
            .write(SERVICE_UUID, AUTH_CHARACTERISTIC_UUID, &value)
            .await
        {
            Ok(()) => {
                debug!("Sent frame {:?}", frame);
                let _ = self.event_tx.send(SessionEvent::FrameSent { command });
                true
            }
            Err(e) => {
                warn!(
                    "Write of command {:02x}{:02x} failed: {}",
                    command[0], command[1], e
                );
                self.handler.record_error(e.to_string());
                let _ = self.event_tx.send(SessionEvent::WriteFailed {
                    command,
                    message: e.to_string(),
                });

                if self.config.write_failure == WriteFailurePolicy::Fail || !e.is_recoverable() {
                    self.force_fail(FailureReason::LinkError).await;
                }
                false
            }
        }
    }

    fn publish(&self, transition: Transition) {
        if transition.changed() {
            let _ = self.event_tx.send(SessionEvent::StateChanged {
                from: transition.from,
                to: transition.to,
            });
        }
    }

    /// Release the subscription and publish the outcome
    async fn finish(&mut self) {
        let Some(outcome) = self.handler.state().outcome() else {
            return;
        };

        if self.notifications.take().is_some() {
            if let Err(e) = self.link.unsubscribe().await {
                warn!("Failed to unsubscribe: {}", e);
            }
        }

        match outcome {
            PairingOutcome::Authenticated => info!("Paired with {}", self.link.peer()),
            PairingOutcome::Failed(reason) => {
                info!("Pairing with {} failed: {}", self.link.peer(), reason)
            }
        }

        self.outcome_tx.send_replace(Some(outcome));
        let _ = self.event_tx.send(SessionEvent::Completed { outcome });
    }
}

impl<L: DeviceLink + ?Sized> std::fmt::Debug for HandshakeSession<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeSession")
            .field("link", &self.link)
            .field("state", &self.handler.state())
            .field("config", &self.config)
            .finish()
    }
}
