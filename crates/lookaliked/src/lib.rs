//! lookaliked — enrollment and matching daemon.
//!
//! A single engine thread owns the camera and the pipeline; the D-Bus
//! interface forwards requests to it over a channel.

pub mod dbus_interface;
pub mod engine;
