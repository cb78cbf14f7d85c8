//! Energy-based turn detection
//!
//! Classifies each inbound frame as voiced or silent by RMS energy and
//! tracks how long the current silence run is. A turn ends after a
//! configured stretch of silence (700 ms by default), but only when the
//! turn also contained a minimum amount of actual speech (400 ms by
//! default). The dual condition keeps short noise bursts from triggering
//! a turn end on their own.

use super::audio::FRAME_MS;

/// Tunable thresholds for turn and barge-in detection.
///
/// All values were tuned empirically against 20 ms PCM16 frames at 16 kHz
/// and can be overridden through the server configuration.
#[derive(Debug, Clone)]
pub struct TurnDetectorConfig {
    /// Frames with RMS energy below this are classified as silent.
    pub silence_threshold_rms: f32,
    /// Energy above this during an AI turn triggers barge-in. Higher than
    /// the silence threshold so background noise does not interrupt.
    pub interrupt_threshold_rms: f32,
    /// Milliseconds of consecutive silence that end a turn.
    pub turn_end_silence_ms: u32,
    /// Minimum milliseconds of voiced audio required before a turn can end.
    pub min_speech_ms: u32,
}

impl Default for TurnDetectorConfig {
    fn default() -> Self {
        Self {
            silence_threshold_rms: 500.0,
            interrupt_threshold_rms: 800.0,
            turn_end_silence_ms: 700,
            min_speech_ms: 400,
        }
    }
}

impl TurnDetectorConfig {
    /// Consecutive silent frames needed to end a turn (35 by default).
    pub fn silence_frames_needed(&self) -> u32 {
        self.turn_end_silence_ms / FRAME_MS
    }

    /// Voiced frames required before a turn may end (20 by default).
    pub fn min_voiced_frames(&self) -> u32 {
        self.min_speech_ms / FRAME_MS
    }
}

/// Frame classification counters for one turn.
#[derive(Debug)]
pub struct TurnDetector {
    config: TurnDetectorConfig,
    silence_frame_count: u32,
    voiced_frame_count: u32,
}

impl TurnDetector {
    pub fn new(config: TurnDetectorConfig) -> Self {
        Self {
            config,
            silence_frame_count: 0,
            voiced_frame_count: 0,
        }
    }

    pub fn config(&self) -> &TurnDetectorConfig {
        &self.config
    }

    pub fn silence_frame_count(&self) -> u32 {
        self.silence_frame_count
    }

    pub fn voiced_frame_count(&self) -> u32 {
        self.voiced_frame_count
    }

    /// Record one frame's energy. Returns true if the frame was voiced.
    pub fn observe(&mut self, energy: f32) -> bool {
        let voiced = energy >= self.config.silence_threshold_rms;
        if voiced {
            self.silence_frame_count = 0;
            self.voiced_frame_count += 1;
        } else {
            self.silence_frame_count += 1;
        }
        voiced
    }

    /// Whether the counters currently satisfy the turn-end condition.
    /// The caller is responsible for also checking the session state.
    pub fn turn_ended(&self) -> bool {
        self.silence_frame_count >= self.config.silence_frames_needed()
            && self.voiced_frame_count >= self.config.min_voiced_frames()
    }

    /// Reset counters for a new turn.
    pub fn reset(&mut self) {
        self.silence_frame_count = 0;
        self.voiced_frame_count = 0;
    }
}
