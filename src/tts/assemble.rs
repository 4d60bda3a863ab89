//! Final-track assembly for chunked synthesis: a silent base track with
//! each group's audio overlaid at its declared start time.

use crate::error::{DubberError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::debug;

/// Read mono 16-bit samples from a synthesis temp file.
///
/// Providers hand back either a WAV container (RIFF header) or raw
/// little-endian PCM; both decode to the same sample vector. `sample_rate`
/// is what the request asked for and is verified against WAV headers.
pub fn read_pcm_samples(path: &Path, sample_rate: u32) -> Result<Vec<i16>> {
    let bytes = std::fs::read(path)?;

    if bytes.len() >= 4 && &bytes[..4] == b"RIFF" {
        let reader = WavReader::new(std::io::Cursor::new(bytes))
            .map_err(|e| DubberError::SynthesisFailed(format!("Unreadable WAV chunk: {e}")))?;
        let spec = reader.spec();
        if spec.sample_rate != sample_rate {
            return Err(DubberError::SynthesisFailed(format!(
                "Chunk sample rate {} does not match requested {}",
                spec.sample_rate, sample_rate
            )));
        }
        let channels = spec.channels.max(1) as usize;
        let samples: Vec<i16> = match spec.sample_format {
            SampleFormat::Int => reader
                .into_samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| DubberError::SynthesisFailed(format!("WAV decode error: {e}")))?,
            SampleFormat::Float => {
                return Err(DubberError::SynthesisFailed(
                    "Float PCM chunks are not supported".to_string(),
                ))
            }
        };
        // Downmix to mono by taking the first channel.
        if channels > 1 {
            return Ok(samples.iter().step_by(channels).copied().collect());
        }
        return Ok(samples);
    }

    // Raw signed 16-bit little-endian PCM.
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Overlay each `(start_seconds, samples)` group onto a silent mono base
/// track of `total_duration` seconds and write the result as 16-bit WAV.
///
/// Returns the actual duration of the written file.
pub fn assemble_groups(
    groups: &[(f64, Vec<i16>)],
    total_duration: f64,
    sample_rate: u32,
    output_path: &Path,
) -> Result<f64> {
    let base_len = (total_duration * sample_rate as f64).ceil() as usize;

    // The base track may need to grow if a group's real audio runs past the
    // planned end time.
    let mut track: Vec<i16> = vec![0; base_len];
    for (start_seconds, samples) in groups {
        let offset = (start_seconds * sample_rate as f64).round() as usize;
        let needed = offset + samples.len();
        if needed > track.len() {
            track.resize(needed, 0);
        }
        for (i, sample) in samples.iter().enumerate() {
            track[offset + i] = track[offset + i].saturating_add(*sample);
        }
    }

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output_path, spec)
        .map_err(|e| DubberError::SynthesisFailed(format!("Cannot write output WAV: {e}")))?;
    for sample in &track {
        writer
            .write_sample(*sample)
            .map_err(|e| DubberError::SynthesisFailed(format!("WAV write error: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| DubberError::SynthesisFailed(format!("WAV finalize error: {e}")))?;

    let duration = track.len() as f64 / sample_rate as f64;
    debug!(
        "Assembled {} groups into {:.2}s of audio at {}",
        groups.len(),
        duration,
        output_path.display()
    );
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_raw_pcm(path: &Path, samples: &[i16]) {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_read_raw_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk.pcm");
        write_raw_pcm(&path, &[1, -2, 300]);

        let samples = read_pcm_samples(&path, 16_000).unwrap();
        assert_eq!(samples, vec![1, -2, 300]);
    }

    #[test]
    fn test_read_wav_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for s in [10i16, 20, 30] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let samples = read_pcm_samples(&path, 16_000).unwrap();
        assert_eq!(samples, vec![10, 20, 30]);
    }

    #[test]
    fn test_read_wav_rejects_rate_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.finalize().unwrap();

        assert!(read_pcm_samples(&path, 16_000).is_err());
    }

    #[test]
    fn test_assemble_places_groups_at_start_times() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");
        let rate = 1_000u32;

        // 1 s of signal at t=0 and t=5.
        let signal = vec![1000i16; rate as usize];
        let groups = vec![(0.0, signal.clone()), (5.0, signal)];

        let duration = assemble_groups(&groups, 6.0, rate, &output).unwrap();
        assert!((duration - 6.0).abs() < 0.01);

        let reader = WavReader::open(&output).unwrap();
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 6 * rate as usize);
        assert_eq!(samples[0], 1000);
        assert_eq!(samples[5 * rate as usize + 10], 1000);
        // Silence between the groups.
        assert_eq!(samples[3 * rate as usize], 0);
    }

    #[test]
    fn test_assemble_grows_for_overrunning_audio() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");
        let rate = 1_000u32;

        // Planned 2 s, but the group at t=1 carries 3 s of audio.
        let groups = vec![(1.0, vec![500i16; 3 * rate as usize])];
        let duration = assemble_groups(&groups, 2.0, rate, &output).unwrap();
        assert!((duration - 4.0).abs() < 0.01);
    }

    #[test]
    fn test_assemble_empty_is_silent_track() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");
        let duration = assemble_groups(&[], 0.0, 16_000, &output).unwrap();
        assert_eq!(duration, 0.0);
        assert!(output.exists());
    }
}
