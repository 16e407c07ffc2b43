//! Local media acquisition and track lifecycle.
//!
//! Requests camera/microphone (and, on demand, screen-capture) tracks from
//! the host environment and guarantees deterministic release: every track
//! acquired must be stopped on every exit path, including error paths, or
//! the camera/microphone stays held indefinitely. The concrete capture
//! stack is an external collaborator behind the [`MediaDevices`] trait;
//! [`SimulatedDevices`] is the deterministic backend used by tests and
//! demos.

pub mod devices;
pub mod error;
pub mod track;

pub use devices::{MediaConstraints, MediaDevices, ScreenOutcome, SimulatedDevices};
pub use error::{MediaError, Result};
pub use track::{LocalTrack, MediaStreamHandle, MediaTrackSet, StreamId, TrackId, TrackKind, TrackSource};
