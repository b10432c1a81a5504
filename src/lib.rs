//! Kiosk media player for a Raspberry Pi framebuffer.
//!
//! A remote controller sends short text commands (`play 3`, `seek 12.5`,
//! `volume mute`) over MQTT or HTTP. The player shows exactly one image or
//! video at a time, crossfades between them, and keeps a playing video in
//! step with the controller's clock by nudging its playback rate.

pub mod command;
pub mod controller;
pub mod error;
pub mod framebuffer;
pub mod http_server;
pub mod image_item;
pub mod media_library;
pub mod mqtt_client;
pub mod player;
pub mod seek;
pub mod settings;
pub mod surface;
pub mod text;
pub mod timer;
pub mod transition;
pub mod transport;
pub mod video_item;
