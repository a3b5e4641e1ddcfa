//! # Audio Capture Module
//!
//! This module handles real-time audio capture using CPAL (Cross-Platform Audio Library).
//! It opens the default input device, downmixes whatever it delivers to mono
//! and streams fixed-size blocks to the analysis thread.
//!
//! ## Features
//! - Automatic audio device selection
//! - f32 and i16 input formats, any channel count
//! - Sample rate chosen as close as the device allows to the detector's rate
//! - Hop-sized blocks over a bounded channel; the callback never blocks

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfigRange};
use crossbeam_channel::Sender;

/// Cuts a mono sample stream into blocks of a fixed length.
#[derive(Debug, Clone)]
pub struct BlockSplitter {
    pending: Vec<f32>,
    block: usize,
}

impl BlockSplitter {
    pub fn new(block: usize) -> Self {
        Self {
            pending: Vec::with_capacity(block * 2),
            block: block.max(1),
        }
    }

    /// Appends interleaved samples, averaging each frame of `channels`
    /// samples down to one.
    pub fn push_interleaved<T: Copy>(&mut self, data: &[T], channels: usize, convert: impl Fn(T) -> f32) {
        let channels = channels.max(1);
        for frame in data.chunks_exact(channels) {
            let sum: f32 = frame.iter().map(|&s| convert(s)).sum();
            self.pending.push(sum / channels as f32);
        }
    }

    /// Removes and returns the next complete block, if any.
    pub fn next_block(&mut self) -> Option<Vec<f32>> {
        if self.pending.len() < self.block {
            return None;
        }
        Some(self.pending.drain(..self.block).collect())
    }
}

/// Starts audio capture from the default input device.
///
/// Blocks of `step` mono samples are sent on `sender`; when the channel is
/// full the block is dropped. The stream stops when the returned handle is
/// dropped.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Audio stream handle and the rate the device runs at
/// * `Err(e)` - No input device, no usable format, or the stream failed to start
pub fn start_audio_capture(
    sender: Sender<Vec<f32>>,
    target_rate: u32,
    step: usize,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    log::info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported = find_supported_config(configs, target_rate)
        .ok_or_else(|| anyhow!("No f32 or i16 input format found"))?;

    let rate = target_rate.clamp(supported.min_sample_rate().0, supported.max_sample_rate().0);
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.with_sample_rate(cpal::SampleRate(rate)).into();

    log::info!(
        "Selected {} Hz, {} channel(s), {:?} (requested {} Hz)",
        rate,
        config.channels,
        sample_format,
        target_rate
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, sender, step, |s| s)?,
        SampleFormat::I16 => {
            build_stream::<i16>(&device, &config, sender, step, |s| s as f32 / 32768.0)?
        }
        other => return Err(anyhow!("Unsupported sample format {:?}", other)),
    };

    stream.play()?;

    Ok((stream, rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sender: Sender<Vec<f32>>,
    step: usize,
    convert: fn(T) -> f32,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + Send + 'static,
{
    let channels = config.channels as usize;
    let mut splitter = BlockSplitter::new(step);
    let mut dropped: usize = 0;

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            splitter.push_interleaved(data, channels, convert);

            while let Some(block) = splitter.next_block() {
                if sender.try_send(block).is_err() {
                    dropped += 1;
                    if dropped.is_power_of_two() {
                        log::warn!("Analysis is falling behind, {} blocks dropped", dropped);
                    }
                }
            }
        },
        |err| log::error!("An error occurred on the audio stream: {}", err),
        None,
    )?;

    Ok(stream)
}

/// Finds the best supported input configuration for the target sample rate.
///
/// Only f32 and i16 formats qualify. Fewer channels are preferred, then the
/// range closest to `target_rate`, then f32 over i16.
pub fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16))
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let distance = if target_rate < min {
                min - target_rate
            } else {
                target_rate.saturating_sub(max)
            };
            let format_rank = u8::from(c.sample_format() != SampleFormat::F32);
            (c.channels(), distance, format_rank)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_prefers_mono_in_range() {
        let configs = vec![
            range(2, 8000, 48000, SampleFormat::F32),
            range(1, 44100, 48000, SampleFormat::F32),
            range(1, 8000, 48000, SampleFormat::I16),
        ];
        let best = find_supported_config(configs, 11025).unwrap();
        assert_eq!(best.channels(), 1);
        assert_eq!(best.sample_format(), SampleFormat::I16);
    }

    #[test]
    fn test_rejects_other_formats() {
        let configs = vec![range(1, 8000, 48000, SampleFormat::U8)];
        assert!(find_supported_config(configs, 11025).is_none());
    }

    #[test]
    fn test_splitter_downmixes_and_blocks() {
        let mut splitter = BlockSplitter::new(3);
        splitter.push_interleaved(&[1.0f32, 0.0, 0.5, 0.5], 2, |s| s);
        assert!(splitter.next_block().is_none());

        splitter.push_interleaved(&[-1.0f32, -1.0, 0.2, 0.2], 2, |s| s);
        assert_eq!(splitter.next_block(), Some(vec![0.5, 0.5, -1.0]));
        assert!(splitter.next_block().is_none());

        splitter.push_interleaved(&[16384i16, 0, 0], 1, |s| s as f32 / 32768.0);
        assert_eq!(splitter.next_block(), Some(vec![0.2, 0.5, 0.0]));
    }
}
