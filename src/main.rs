use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io::Result as IoResult;
use std::path::PathBuf;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pi_kiosk::controller::{ControllerConfig, PlaybackController};
use pi_kiosk::error::SettingsError;
use pi_kiosk::framebuffer::{Framebuffer, FramebufferSurface, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use pi_kiosk::http_server;
use pi_kiosk::media_library::MediaLibrary;
use pi_kiosk::mqtt_client::{self, MqttClient};
use pi_kiosk::player::Player;
use pi_kiosk::settings::Settings;
use pi_kiosk::surface::Surface;
use pi_kiosk::transport;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder holding settings.json, media.json and the media/ directory
    #[arg(short, long, default_value = ".")]
    data_folder: PathBuf,

    /// Framebuffer device path
    #[arg(short, long, default_value = "/dev/fb0")]
    framebuffer: PathBuf,

    /// Framebuffer width in pixels
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: u32,

    /// Framebuffer height in pixels
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: u32,

    /// MQTT broker URL
    #[arg(long, default_value = "mqtt://localhost:1883")]
    mqtt_broker: String,

    /// Kiosk ID (derived from the hostname if not provided)
    #[arg(long)]
    kiosk_id: Option<String>,

    /// Disable MQTT remote control
    #[arg(long)]
    no_mqtt: bool,

    /// HTTP server port for local control
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Crossfade length in seconds, overriding settings.json
    #[arg(long)]
    fade_seconds: Option<f64>,
}

fn setup_signal_handler(tx: oneshot::Sender<()>) -> IoResult<thread::JoinHandle<()>> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    Ok(thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "received signal, shutting down");
            let _ = tx.send(());
        }
    }))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> IoResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let kiosk_id = args.kiosk_id.clone().unwrap_or_else(mqtt_client::generate_kiosk_id);

    info!(
        %kiosk_id,
        data_folder = %args.data_folder.display(),
        framebuffer = %args.framebuffer.display(),
        "starting kiosk player"
    );

    let (mut settings, settings_error) = Settings::load(&args.data_folder);
    let on_screen_error = match settings_error {
        Some(e @ SettingsError::Read { .. }) => {
            warn!(error = %e, "using default settings");
            None
        }
        Some(e @ SettingsError::Parse { .. }) => {
            error!(error = %e, "invalid settings, using defaults");
            Some(e.to_string())
        }
        Some(e @ SettingsError::Invalid { .. }) => {
            error!(error = %e, "ignoring invalid settings entries");
            Some(e.to_string())
        }
        None => None,
    };
    if let Some(seconds) = args.fade_seconds {
        settings.fade_seconds = seconds;
    }
    debug!(
        fullscreen = settings.fullscreen,
        mouse_enabled = settings.mouse_enabled,
        "window options have no effect on the framebuffer"
    );

    let library = MediaLibrary::load(&args.data_folder).unwrap_or_else(|e| {
        warn!(error = %e, "no media library, every play request will be reported as missing");
        MediaLibrary::default()
    });

    let device = Framebuffer::open(&args.framebuffer, args.width, args.height)?;
    let background = settings.background_path(&args.data_folder);
    let mut surface = FramebufferSurface::new(device, settings.fade_duration())
        .with_background(background.as_deref())
        .with_rotation(settings.rotate_content_180_degrees);
    if let Some(message) = on_screen_error {
        surface.show_error(&message);
    }

    let controller = PlaybackController::new(
        ControllerConfig {
            data_folder: args.data_folder.clone(),
            fade_duration: settings.fade_duration(),
        },
        surface,
        library,
    );
    let (handle, link) = transport::link(100, controller.status());

    if args.no_mqtt {
        info!("MQTT control disabled");
    } else {
        let mqtt = MqttClient::new(&args.mqtt_broker, kiosk_id.clone(), handle.clone())
            .await
            .map_err(std::io::Error::other)?;
        mqtt.run_publishers(&handle);
    }

    let http_port = args.http_port;
    let http_handle = handle.clone();
    tokio::spawn(async move {
        http_server::run_http_server(http_port, http_handle).await;
    });
    drop(handle);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    setup_signal_handler(shutdown_tx)?;

    let status = Player::new(controller, link).run(shutdown_rx).await;
    info!(state = ?status.state, "player stopped");
    Ok(())
}
