//! Device acquisition seam.
//!
//! [`MediaDevices`] is the boundary to the host capture stack. Both
//! acquisition calls suspend until the host (permission prompt, device
//! open) responds; the session layer must stay responsive to teardown while
//! they are pending and discard late results.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{MediaError, Result};
use crate::track::{LocalTrack, MediaTrackSet, TrackKind, TrackSource};

/// Capture constraints for the camera/microphone request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self { audio: true, video: true, width: 1280, height: 720 }
    }
}

/// Host capture stack boundary.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request the local camera and microphone. On failure nothing remains
    /// acquired; a partially-opened device is released before returning.
    async fn acquire_camera_and_microphone(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaTrackSet>;

    /// Request a screen-capture video track. Dismissal of the picker is
    /// reported as [`MediaError::ScreenShareCancelled`].
    async fn acquire_screen(&self) -> Result<Arc<LocalTrack>>;
}

/// Scripted outcome for the next `acquire_screen` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenOutcome {
    Granted,
    Cancelled,
    Denied,
    NotSupported,
}

/// Deterministic device backend for tests and in-process demos.
///
/// Outcomes are scripted per call; unscripted calls succeed. All tracks it
/// hands out are ordinary [`LocalTrack`]s, so liveness and enabled flags
/// behave exactly as with a real backend.
pub struct SimulatedDevices {
    camera_failures: Mutex<VecDeque<MediaError>>,
    screen_outcomes: Mutex<VecDeque<ScreenOutcome>>,
    acquisition_delays: Mutex<VecDeque<std::time::Duration>>,
    issued: Mutex<Vec<MediaTrackSet>>,
}

impl SimulatedDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            camera_failures: Mutex::new(VecDeque::new()),
            screen_outcomes: Mutex::new(VecDeque::new()),
            acquisition_delays: Mutex::new(VecDeque::new()),
            issued: Mutex::new(Vec::new()),
        })
    }

    /// Make the next camera/microphone acquisition fail.
    pub async fn fail_next_acquisition(&self, error: MediaError) {
        self.camera_failures.lock().await.push_back(error);
    }

    /// Script the outcome of the next screen acquisition.
    pub async fn script_screen(&self, outcome: ScreenOutcome) {
        self.screen_outcomes.lock().await.push_back(outcome);
    }

    /// Hold the next camera/microphone acquisition open for `delay` before
    /// it resolves, like a permission prompt the user has not answered yet.
    pub async fn delay_next_acquisition(&self, delay: std::time::Duration) {
        self.acquisition_delays.lock().await.push_back(delay);
    }

    /// Every track set this backend has handed out, including sets the
    /// caller has since discarded. Lets tests verify release on all paths.
    pub async fn issued_tracks(&self) -> Vec<MediaTrackSet> {
        self.issued.lock().await.clone()
    }
}

#[async_trait]
impl MediaDevices for SimulatedDevices {
    async fn acquire_camera_and_microphone(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaTrackSet> {
        let delay = self.acquisition_delays.lock().await.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.camera_failures.lock().await.pop_front() {
            debug!(%err, "scripted acquisition failure");
            return Err(err);
        }
        if !constraints.audio && !constraints.video {
            return Err(MediaError::DeviceNotFound { device: "capture" });
        }
        let set = MediaTrackSet::new(
            LocalTrack::new(TrackKind::Audio, TrackSource::Microphone),
            LocalTrack::new(TrackKind::Video, TrackSource::Camera),
        );
        self.issued.lock().await.push(set.clone());
        info!(stream = %set.stream_id, "camera and microphone acquired");
        Ok(set)
    }

    async fn acquire_screen(&self) -> Result<Arc<LocalTrack>> {
        let outcome = self
            .screen_outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or(ScreenOutcome::Granted);
        match outcome {
            ScreenOutcome::Granted => {
                let track = LocalTrack::new(TrackKind::Video, TrackSource::Screen);
                info!(track = %track.id(), "screen capture acquired");
                Ok(track)
            }
            ScreenOutcome::Cancelled => Err(MediaError::ScreenShareCancelled),
            ScreenOutcome::Denied => Err(MediaError::PermissionDenied { device: "screen" }),
            ScreenOutcome::NotSupported => Err(MediaError::NotSupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquisition_yields_camera_and_microphone_tracks() {
        let devices = SimulatedDevices::new();
        let set = devices
            .acquire_camera_and_microphone(MediaConstraints::default())
            .await
            .unwrap();
        assert_eq!(set.audio.kind(), TrackKind::Audio);
        assert_eq!(set.audio.source(), TrackSource::Microphone);
        assert_eq!(set.video.source(), TrackSource::Camera);
        assert!(set.any_live());
    }

    #[tokio::test]
    async fn scripted_failures_surface_in_order() {
        let devices = SimulatedDevices::new();
        devices
            .fail_next_acquisition(MediaError::PermissionDenied { device: "camera" })
            .await;
        devices.fail_next_acquisition(MediaError::DeviceInUse { device: "camera" }).await;

        let first = devices
            .acquire_camera_and_microphone(MediaConstraints::default())
            .await
            .unwrap_err();
        assert_eq!(first, MediaError::PermissionDenied { device: "camera" });

        let second = devices
            .acquire_camera_and_microphone(MediaConstraints::default())
            .await
            .unwrap_err();
        assert_eq!(second, MediaError::DeviceInUse { device: "camera" });

        // Unscripted calls succeed again.
        assert!(devices
            .acquire_camera_and_microphone(MediaConstraints::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn screen_cancellation_is_reported_as_such() {
        let devices = SimulatedDevices::new();
        devices.script_screen(ScreenOutcome::Cancelled).await;
        let err = devices.acquire_screen().await.unwrap_err();
        assert_eq!(err, MediaError::ScreenShareCancelled);
        assert!(!err.is_fatal_to_call());
    }
}
