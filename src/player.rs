//! The runtime loop: one task owns the controller and reacts to transport
//! events, fade/seek deadlines, render ticks and shutdown.

use std::io::Result as IoResult;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::command::{Command, MediaCommand, SystemCommand};
use crate::controller::{PlaybackController, PlayerStatus};
use crate::error::CommandParseError;
use crate::framebuffer::{FramebufferSurface, FRAME_INTERVAL};
use crate::media_library::MediaResolver;
use crate::surface::Surface;
use crate::transport::{CommandFailure, PlayerLink, TransportEvent};

/// A surface the loop can drive frame by frame.
pub trait RenderTarget: Surface {
    fn set_time(&mut self, now: Duration);
    fn needs_redraw(&self) -> bool;
    fn render(&mut self) -> IoResult<()>;
}

impl RenderTarget for FramebufferSurface {
    fn set_time(&mut self, now: Duration) {
        FramebufferSurface::set_time(self, now);
    }

    fn needs_redraw(&self) -> bool {
        FramebufferSurface::needs_redraw(self)
    }

    fn render(&mut self) -> IoResult<()> {
        FramebufferSurface::render(self)
    }
}

pub struct Player<S: RenderTarget, R> {
    controller: PlaybackController<S, R>,
    link: PlayerLink,
    epoch: Instant,
}

impl<S: RenderTarget, R: MediaResolver> Player<S, R> {
    pub fn new(controller: PlaybackController<S, R>, link: PlayerLink) -> Self {
        Self {
            controller,
            link,
            epoch: Instant::now(),
        }
    }

    pub fn controller(&self) -> &PlaybackController<S, R> {
        &self.controller
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Applies one transport event at `now` and fires anything that came due.
    pub fn handle_event(&mut self, now: Duration, event: TransportEvent) {
        self.controller.surface_mut().set_time(now);
        match event {
            TransportEvent::Media { session, tokens } => {
                let parsed = MediaCommand::parse(&tokens).map(Command::Media);
                self.dispatch(now, session, &tokens, parsed);
            }
            TransportEvent::System { session, tokens } => {
                let parsed = SystemCommand::parse(&tokens).map(Command::System);
                self.dispatch(now, session, &tokens, parsed);
            }
            TransportEvent::AdminConnected { session } => {
                info!(%session, "controller connected");
            }
            TransportEvent::AdminDisconnected => self.controller.admin_disconnected(now),
        }
        self.advance(now);
    }

    pub fn advance(&mut self, now: Duration) {
        self.controller.surface_mut().set_time(now);
        self.controller.advance(now);
        self.publish_status();
    }

    fn dispatch(
        &mut self,
        now: Duration,
        session: String,
        tokens: &[String],
        parsed: Result<Command, CommandParseError>,
    ) {
        let outcome = parsed
            .map_err(|e| e.to_string())
            .and_then(|command| self.controller.handle(now, command).map_err(|e| e.to_string()));

        if let Err(error) = outcome {
            let command = tokens.join(" ");
            warn!(%session, %command, %error, "command rejected");
            let failure = CommandFailure {
                session,
                command,
                error,
            };
            if self.link.failures.send(failure).is_err() {
                debug!("nobody is listening for command errors");
            }
        }
    }

    fn publish_status(&self) {
        let next = self.controller.status();
        self.link.status.send_if_modified(|current| {
            if current.differs_from(&next) {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    fn draw(&mut self) {
        let now = self.now();
        let surface = self.controller.surface_mut();
        surface.set_time(now);
        if !surface.needs_redraw() {
            return;
        }
        if let Err(e) = surface.render() {
            warn!(error = %e, "failed to render frame");
        }
    }

    /// Runs until `shutdown` fires or every transport handle is gone.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> PlayerStatus {
        let mut frames = tokio::time::interval(FRAME_INTERVAL);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("player running");
        loop {
            let deadline = self.controller.next_deadline().map(|due| self.epoch + due);
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                event = self.link.events.recv() => match event {
                    Some(event) => {
                        let now = self.now();
                        self.handle_event(now, event);
                    }
                    None => {
                        info!("all transports closed");
                        break;
                    }
                },
                _ = timer => {
                    let now = self.now();
                    self.advance(now);
                }
                _ = frames.tick() => self.draw(),
            }
        }

        self.controller.status()
    }
}
