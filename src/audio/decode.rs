// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! In-memory audio decoding. Assets are fetched as bytes first and decoded here, so
//! the same path serves files on disk and anything else a fetcher can produce.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use super::buffer::{AudioBuffer, ResamplingFailed};

/// Error types for decoding audio data.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Audio data error: {0}")]
    AudioError(#[from] SymphoniaError),

    #[error("No audio track found")]
    NoTrack,

    #[error("Sample rate not specified")]
    UnknownSampleRate,

    #[error("Audio data contains no samples")]
    Empty,

    #[error(transparent)]
    Resampling(#[from] ResamplingFailed),

    #[error("Decoding was interrupted: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}

/// Runs [decode_audio_data] on the blocking pool.
pub async fn decode_audio_data_blocking(
    bytes: Vec<u8>,
    extension: Option<String>,
    target_rate: u32,
) -> Result<AudioBuffer, DecodeError> {
    let task = tokio::task::spawn_blocking(move || {
        decode_audio_data(bytes, extension.as_deref(), target_rate)
    });
    task.await?
}

/// Decodes an encoded audio asset (WAV, FLAC, MP3, ...) into a mono buffer at the
/// target sample rate. The extension, if known, helps symphonia pick a format.
pub fn decode_audio_data(
    bytes: Vec<u8>,
    extension: Option<&str>,
    target_rate: u32,
) -> Result<AudioBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::UnknownSampleRate)?;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs().make(&track.codec_params, &decoder_opts)?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut channel_count: u16 = 0;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        channel_count = spec.channels.count() as u16;
        let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(samples.samples());
    }

    if interleaved.is_empty() || channel_count == 0 {
        return Err(DecodeError::Empty);
    }

    let buffer = AudioBuffer::from_interleaved(&interleaved, channel_count, sample_rate);
    debug!(
        channels = channel_count,
        sample_rate,
        target_rate,
        frames = buffer.len(),
        "Decoded audio data"
    );

    Ok(buffer.resampled(target_rate)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::wav_bytes;

    #[test]
    fn test_decode_wav() -> Result<(), Box<dyn std::error::Error>> {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 1000.0) - 0.5).collect();
        let bytes = wav_bytes(&samples, 1, 8000)?;

        let buffer = decode_audio_data(bytes, Some("wav"), 8000)?;

        assert_eq!(8000, buffer.sample_rate());
        assert_eq!(1000, buffer.len());
        for (expected, actual) in samples.iter().zip(buffer.samples()) {
            assert!((expected - actual).abs() < 1e-3);
        }
        Ok(())
    }

    #[test]
    fn test_decode_stereo_mixes_down_and_resamples() -> Result<(), Box<dyn std::error::Error>> {
        let interleaved: Vec<f32> = (0..2000)
            .map(|i| if i % 2 == 0 { 0.5 } else { 0.25 })
            .collect();
        let bytes = wav_bytes(&interleaved, 2, 8000)?;

        let buffer = decode_audio_data(bytes, Some("wav"), 16000)?;

        assert_eq!(16000, buffer.sample_rate());
        assert_eq!(2000, buffer.len());
        assert!((buffer.samples()[1000] - 0.375).abs() < 5e-3);
        Ok(())
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_audio_data(b"definitely not audio".to_vec(), Some("wav"), 44100);
        assert!(result.is_err());
    }
}
