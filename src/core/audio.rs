//! PCM audio primitives
//!
//! The gateway works on raw PCM 16-bit little-endian mono audio at 16 kHz.
//! Clients are expected to send 20 ms frames (320 samples / 640 bytes); the
//! energy computation tolerates other sizes, but the frame-count based turn
//! detection thresholds assume the 20 ms cadence.

use std::io::Cursor;

/// Audio sample rate in Hz.
pub const SAMPLE_RATE: u32 = 16_000;

/// Duration of one audio frame in milliseconds.
pub const FRAME_MS: u32 = 20;

/// Samples per frame (320 at 16 kHz / 20 ms).
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize * FRAME_MS as usize) / 1000;

/// Bytes per frame (640 for 16-bit samples).
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Compute the root-mean-square energy of a PCM16 LE frame.
///
/// Returns 0.0 for an empty frame. A trailing odd byte is ignored.
pub fn rms_energy(frame: &[u8]) -> f32 {
    let num_samples = frame.len() / 2;
    if num_samples == 0 {
        return 0.0;
    }

    let sum_squares: f64 = frame
        .chunks_exact(2)
        .map(|pair| {
            let sample = i16::from_le_bytes([pair[0], pair[1]]) as f64;
            sample * sample
        })
        .sum();

    (sum_squares / num_samples as f64).sqrt() as f32
}

/// Encode raw PCM16 LE mono bytes as an in-memory WAV file.
///
/// Used to wrap buffered turn audio for STT upload.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
