//! Keeps a network camera's RTSP feed on screen.
//!
//! An external player (`cvlc` by default) does the decoding; this crate
//! picks a reachable camera address, launches the player in its own process
//! group, restarts it with backoff when it dies, and follows the camera when
//! it moves to another address.

pub mod backoff;
pub mod config;
pub mod lock;
pub mod logging;
pub mod network;
pub mod player;
pub mod resolver;
pub mod signals;
pub mod status;
pub mod supervisor;
