//! NowPlaying OSC - relay Spotify "now playing" into the VRChat chatbox
//!
//! The binary wires these modules together; the library target exists so the
//! relay core can be driven from tests and other front ends.

pub mod cli;
pub mod config;
pub mod osc;
pub mod paths;
pub mod playback;
pub mod relay;
pub mod setup;
pub mod sniffer;
