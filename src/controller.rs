use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::command::{Command, MediaCommand, SystemCommand, VolumeCommand};
use crate::error::PlayerError;
use crate::image_item::ImageItem;
use crate::media_library::{media_path, MediaEntry, MediaId, MediaKind, MediaResolver};
use crate::surface::{Playhead, Surface};
use crate::timer::earliest;
use crate::transition::{Crossfade, Lifecycle};
use crate::video_item::{clamp_volume, VideoItem};

/// What the kiosk is currently presenting. Only [`PlaybackController`]
/// writes it, and only through `transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveMedia {
    Idle,
    ShowingImage,
    PlayingVideo,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub data_folder: PathBuf,
    pub fade_duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatus {
    pub state: ActiveMedia,
    pub media: Option<MediaEntry>,
    pub position: Option<f64>,
    pub volume: f64,
    pub seeking: bool,
}

impl PlayerStatus {
    /// Compares everything except the playhead position, which moves on its own.
    pub fn differs_from(&self, other: &PlayerStatus) -> bool {
        self.state != other.state
            || self.media != other.media
            || self.volume != other.volume
            || self.seeking != other.seeking
    }
}

pub struct PlaybackController<S: Surface, R> {
    config: ControllerConfig,
    surface: S,
    library: R,
    state: ActiveMedia,
    current: Option<MediaEntry>,
    volume: f64,
    images: Crossfade<ImageItem<S::Image>>,
    videos: Crossfade<VideoItem<S::Video>>,
}

impl<S: Surface, R: MediaResolver> PlaybackController<S, R> {
    pub fn new(config: ControllerConfig, surface: S, library: R) -> Self {
        let fade = config.fade_duration;
        Self {
            config,
            surface,
            library,
            state: ActiveMedia::Idle,
            current: None,
            volume: 1.0,
            images: Crossfade::new("image", fade),
            videos: Crossfade::new("video", fade),
        }
    }

    pub fn state(&self) -> ActiveMedia {
        self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn images(&self) -> &Crossfade<ImageItem<S::Image>> {
        &self.images
    }

    pub fn videos(&self) -> &Crossfade<VideoItem<S::Video>> {
        &self.videos
    }

    pub fn handle(&mut self, now: Duration, command: Command) -> Result<(), PlayerError> {
        debug!(%command, state = ?self.state, "handling command");
        match command {
            Command::Media(command) => self.handle_media(now, command),
            Command::System(command) => {
                self.handle_system(command);
                Ok(())
            }
        }
    }

    pub fn handle_media(&mut self, now: Duration, command: MediaCommand) -> Result<(), PlayerError> {
        match command {
            MediaCommand::Play(None) => self.resume(),
            MediaCommand::Play(Some(id)) => return self.play(now, id),
            MediaCommand::Stop => self.stop_active(now),
            MediaCommand::Pause => {
                if let Some(video) = self.playing_video() {
                    video.pause();
                }
            }
            MediaCommand::Fwd => {
                if let Some(video) = self.playing_video() {
                    video.fwd();
                }
            }
            MediaCommand::Rew => {
                if let Some(video) = self.playing_video() {
                    video.rew(now);
                }
            }
            MediaCommand::Seek(seconds) => {
                if seconds >= 0.0 {
                    if let Some(video) = self.playing_video() {
                        video.seek(now, seconds, true);
                    }
                }
            }
            MediaCommand::Sync(millis) => {
                if let Some(video) = self.playing_video() {
                    let outcome = video.seek(now, millis / 1000.0, false);
                    trace!(millis, ?outcome, "sync");
                }
            }
        }
        Ok(())
    }

    pub fn handle_system(&mut self, command: SystemCommand) {
        let SystemCommand::Volume(volume) = command;
        match volume {
            VolumeCommand::Mute => {
                if let Some(video) = self.videos.active_mut() {
                    video.mute();
                }
            }
            VolumeCommand::Unmute => {
                if let Some(video) = self.videos.active_mut() {
                    video.unmute();
                }
            }
            VolumeCommand::Set(level) => {
                self.volume = clamp_volume(level);
                if let Some(video) = self.videos.active_mut() {
                    video.set_volume(self.volume);
                }
            }
        }
    }

    /// The remote controller went away: nothing stays on screen without it.
    pub fn admin_disconnected(&mut self, now: Duration) {
        info!("controller disconnected, stopping media");
        self.stop_active(now);
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        earliest(self.images.next_deadline(), self.videos.next_deadline())
    }

    pub fn advance(&mut self, now: Duration) {
        self.images.advance(now);
        self.videos.advance(now);
    }

    pub fn status(&self) -> PlayerStatus {
        let video = self.videos.active();
        PlayerStatus {
            state: self.state,
            media: self.current.clone(),
            position: video.map(|video| video.layer().position()),
            volume: self.volume,
            seeking: video.is_some_and(|video| video.is_seeking()),
        }
    }

    fn play(&mut self, now: Duration, id: MediaId) -> Result<(), PlayerError> {
        let Some(entry) = self.library.resolve(id) else {
            warn!(%id, "requested media not found");
            self.surface
                .show_error(&format!("Image or video is not available on this kiosk: {}", id));
            return Ok(());
        };

        let path = media_path(&self.config.data_folder, &entry.file_name);
        match &entry.kind {
            MediaKind::Image => {
                self.stop_active(now);
                let layer = self.surface.create_image(&path);
                self.images.show(now, ImageItem::new(layer, path));
                self.transition(ActiveMedia::ShowingImage);
            }
            MediaKind::Video => {
                self.stop_active(now);
                let layer = self.surface.create_video(&path);
                let mut video = VideoItem::new(layer, path);
                video.set_volume(self.volume);
                self.videos.show(now, video);
                if let Some(video) = self.videos.active_mut() {
                    if let Err(err) = video.play() {
                        warn!(%err, "video playback did not start");
                    }
                    video.unmute();
                }
                self.transition(ActiveMedia::PlayingVideo);
            }
            MediaKind::Unsupported(media_type) => {
                return Err(PlayerError::UnsupportedMediaType {
                    id,
                    media_type: media_type.clone(),
                });
            }
        }

        info!(%id, file = %entry.file_name, "now showing");
        self.current = Some(entry);
        Ok(())
    }

    fn resume(&mut self) {
        if let Some(video) = self.playing_video() {
            if let Err(err) = video.play() {
                warn!(%err, "video playback did not resume");
            }
        }
    }

    fn stop_active(&mut self, now: Duration) {
        match self.state {
            ActiveMedia::Idle => return,
            ActiveMedia::ShowingImage => self.images.hide(now),
            ActiveMedia::PlayingVideo => self.videos.hide(now),
        }
        self.current = None;
        self.transition(ActiveMedia::Idle);
    }

    fn playing_video(&mut self) -> Option<&mut VideoItem<S::Video>> {
        if self.state != ActiveMedia::PlayingVideo {
            return None;
        }
        // An ended video may already be fading out on its own.
        match self.videos.active_lifecycle() {
            Some(Lifecycle::Created | Lifecycle::Visible) => self.videos.active_mut(),
            _ => None,
        }
    }

    fn transition(&mut self, next: ActiveMedia) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "media state changed");
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_library::MediaLibrary;
    use crate::surface::mock::{Call, MockSurface};
    use crate::transition::SETTLE_DELAY;

    const FADE: Duration = Duration::from_secs(1);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn library() -> MediaLibrary {
        MediaLibrary::new([
            entry(1, "lobby.png", MediaKind::Image),
            entry(2, "poster.jpg", MediaKind::Image),
            entry(3, "intro.mp4", MediaKind::Video),
            entry(4, "tour.mp4", MediaKind::Video),
            entry(5, "manual.pdf", MediaKind::Unsupported("pdf".to_string())),
        ])
    }

    fn entry(id: u32, file_name: &str, kind: MediaKind) -> MediaEntry {
        MediaEntry {
            id: MediaId(id),
            file_name: file_name.to_string(),
            kind,
        }
    }

    fn controller() -> PlaybackController<MockSurface, MediaLibrary> {
        PlaybackController::new(
            ControllerConfig {
                data_folder: PathBuf::from("/srv/kiosk"),
                fade_duration: FADE,
            },
            MockSurface::default(),
            library(),
        )
    }

    fn media(controller: &mut PlaybackController<MockSurface, MediaLibrary>, now: Duration, command: MediaCommand) {
        controller.handle(now, Command::Media(command)).unwrap();
    }

    #[test]
    fn starts_idle() {
        let controller = controller();
        assert_eq!(controller.state(), ActiveMedia::Idle);
        assert!(controller.next_deadline().is_none());
    }

    #[test]
    fn unknown_media_reports_without_changing_state() {
        let mut controller = controller();
        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(1))));
        controller.surface().clear();

        media(&mut controller, ms(100), MediaCommand::Play(Some(MediaId(99))));

        assert_eq!(controller.state(), ActiveMedia::ShowingImage);
        let calls = controller.surface().calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Error(message) if message.contains("99")));
    }

    #[test]
    fn image_play_shows_image_from_media_folder() {
        let mut controller = controller();
        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(1))));

        assert_eq!(controller.state(), ActiveMedia::ShowingImage);
        let shown = controller.images().active().map(|image| image.path().to_path_buf());
        assert_eq!(shown, Some(PathBuf::from("/srv/kiosk/media/lobby.png")));
        assert_eq!(controller.status().media.map(|m| m.id), Some(MediaId(1)));
    }

    #[test]
    fn video_play_replaces_image_and_unmutes() {
        let mut controller = controller();
        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(1))));
        controller.advance(SETTLE_DELAY);
        media(&mut controller, ms(200), MediaCommand::Play(Some(MediaId(3))));

        assert_eq!(controller.state(), ActiveMedia::PlayingVideo);
        let calls = controller.surface().calls();
        let hide_image = calls
            .iter()
            .position(|c| *c == Call::Opacity("lobby.png".into(), 0.0))
            .unwrap();
        let attach_video = calls
            .iter()
            .position(|c| *c == Call::Attach("intro.mp4".into()))
            .unwrap();
        assert!(hide_image < attach_video);
        assert!(calls.contains(&Call::Play("intro.mp4".into())));
        assert_eq!(calls.last(), Some(&Call::Muted("intro.mp4".into(), false)));

        controller.advance(ms(1_200));
        assert!(controller.surface().calls().contains(&Call::Detach("lobby.png".into())));
        assert!(controller.images().active().is_none());
    }

    #[test]
    fn unsupported_type_fails_and_keeps_current_media() {
        let mut controller = controller();
        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(3))));
        controller.surface().clear();

        let err = controller
            .handle(ms(10), Command::Media(MediaCommand::Play(Some(MediaId(5)))))
            .unwrap_err();

        assert!(matches!(
            err,
            PlayerError::UnsupportedMediaType { id: MediaId(5), ref media_type } if media_type == "pdf"
        ));
        assert_eq!(controller.state(), ActiveMedia::PlayingVideo);
        assert!(controller.surface().calls().is_empty());
    }

    #[test]
    fn stop_returns_to_idle_and_is_a_no_op_when_idle() {
        let mut controller = controller();
        media(&mut controller, ms(0), MediaCommand::Stop);
        assert!(controller.surface().calls().is_empty());
        assert_eq!(controller.state(), ActiveMedia::Idle);

        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(2))));
        media(&mut controller, ms(100), MediaCommand::Stop);
        assert_eq!(controller.state(), ActiveMedia::Idle);

        media(&mut controller, ms(200), MediaCommand::Play(Some(MediaId(4))));
        media(&mut controller, ms(300), MediaCommand::Stop);
        assert_eq!(controller.state(), ActiveMedia::Idle);
        assert!(controller.status().media.is_none());

        controller.advance(ms(5_000));
        let calls = controller.surface().calls();
        assert!(calls.contains(&Call::Detach("poster.jpg".into())));
        assert!(calls.contains(&Call::Detach("tour.mp4".into())));
    }

    #[test]
    fn transport_commands_are_ignored_without_a_playing_video() {
        let ignored = [
            MediaCommand::Pause,
            MediaCommand::Fwd,
            MediaCommand::Rew,
            MediaCommand::Seek(12.0),
            MediaCommand::Sync(12_000.0),
        ];

        let mut controller = controller();
        for command in ignored.clone() {
            media(&mut controller, ms(0), command);
        }
        assert!(controller.surface().calls().is_empty());

        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(1))));
        controller.advance(ms(100));
        controller.surface().clear();
        for command in ignored {
            media(&mut controller, ms(200), command);
        }
        controller.advance(ms(10_000));
        assert!(controller.surface().calls().is_empty());
        assert_eq!(controller.state(), ActiveMedia::ShowingImage);
    }

    #[test]
    fn seek_is_instant_and_sync_is_in_milliseconds() {
        let mut controller = controller();
        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(3))));
        let head = controller.surface().video_state("intro.mp4");

        media(&mut controller, ms(10), MediaCommand::Seek(42.0));
        assert_eq!(head.borrow().position, 42.0);
        assert_eq!(head.borrow().rate, 1.0);

        media(&mut controller, ms(20), MediaCommand::Seek(-1.0));
        assert_eq!(head.borrow().position, 42.0);

        // 43 000 ms is one second ahead: a graduated catch-up at 1.1.
        media(&mut controller, ms(30), MediaCommand::Sync(43_000.0));
        assert!(controller.status().seeking);
        controller.advance(ms(30 + 100));
        assert_eq!(head.borrow().rate, 1.1);
        assert_eq!(head.borrow().position, 42.0);

        media(&mut controller, ms(200), MediaCommand::Pause);
        assert!(!controller.status().seeking);
        assert!(controller.surface().calls().contains(&Call::Pause("intro.mp4".into())));
    }

    #[test]
    fn bare_play_resumes_the_current_video_only() {
        let mut controller = controller();
        media(&mut controller, ms(0), MediaCommand::Play(None));
        assert!(controller.surface().calls().is_empty());

        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(3))));
        media(&mut controller, ms(100), MediaCommand::Pause);
        controller.surface().clear();

        media(&mut controller, ms(200), MediaCommand::Play(None));
        let calls = controller.surface().calls();
        assert!(calls.contains(&Call::Play("intro.mp4".into())));
        assert!(!calls.iter().any(|c| matches!(c, Call::Attach(_))));
        assert_eq!(controller.state(), ActiveMedia::PlayingVideo);
    }

    #[test]
    fn volume_applies_in_any_state_and_carries_over() {
        let mut controller = controller();
        controller.handle_system(SystemCommand::Volume(VolumeCommand::Set(1.5)));
        assert_eq!(controller.status().volume, 1.0);
        controller.handle_system(SystemCommand::Volume(VolumeCommand::Set(0.25)));
        controller.handle_system(SystemCommand::Volume(VolumeCommand::Mute));
        assert!(controller.surface().calls().is_empty());

        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(3))));
        assert!(controller.surface().calls().contains(&Call::Volume("intro.mp4".into(), 0.25)));

        controller.handle_system(SystemCommand::Volume(VolumeCommand::Mute));
        controller.handle_system(SystemCommand::Volume(VolumeCommand::Set(-0.5)));
        let calls = controller.surface().calls();
        assert!(calls.contains(&Call::Muted("intro.mp4".into(), true)));
        assert_eq!(calls.last(), Some(&Call::Volume("intro.mp4".into(), 0.0)));
    }

    #[test]
    fn disconnect_forces_stop() {
        let mut controller = controller();
        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(3))));
        controller.admin_disconnected(ms(500));
        assert_eq!(controller.state(), ActiveMedia::Idle);

        controller.advance(ms(2_000));
        assert!(controller.surface().calls().contains(&Call::Detach("intro.mp4".into())));
        assert_eq!(controller.videos().attached(), 0);
    }

    #[test]
    fn ended_video_fades_out_and_ignores_transport() {
        let mut controller = controller();
        media(&mut controller, ms(0), MediaCommand::Play(Some(MediaId(3))));
        controller.advance(SETTLE_DELAY);
        controller.surface().video_state("intro.mp4").borrow_mut().ended = true;

        controller.advance(ms(100));
        controller.surface().clear();
        media(&mut controller, ms(150), MediaCommand::Fwd);
        assert!(controller.surface().calls().is_empty());

        controller.advance(ms(1_100));
        assert!(controller.surface().calls().contains(&Call::Detach("intro.mp4".into())));
    }
}
