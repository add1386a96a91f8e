//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};
use opl_engine::{AudioBlock, Sink, SinkError};
use opl_ir::PcmFormat;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::AudioError;

/// Spins before falling back to sleeping while the ring is full.
const SPIN_LIMIT: u32 = 64;
const BACKOFF: Duration = Duration::from_millis(1);
/// Extra time allowed for the device to drain on close.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// CPAL-based live output.
///
/// Rendered samples go through a lock-free ring (about 100 ms) to the device
/// callback. `accept` blocks until the whole block has been queued.
pub struct CpalOutput {
    stream: Stream,
    producer: HeapProd<i16>,
    format: PcmFormat,
    capacity: usize,
    failed: Arc<AtomicBool>,
    closed: bool,
}

impl CpalOutput {
    /// Layout the default device can play: `format` itself when the device
    /// supports its rate, otherwise the same layout at the device's default
    /// rate.
    pub fn playable_format(format: PcmFormat) -> Result<PcmFormat, AudioError> {
        let device = default_device()?;
        let ranges = output_ranges(&device)?;
        let default_rate = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?
            .sample_rate()
            .0;
        let rate = pick_rate(&ranges, format.channels, format.sample_rate, default_rate).ok_or(
            AudioError::UnsupportedConfig {
                sample_rate: format.sample_rate,
                channels: format.channels,
                device_rate: Some(default_rate),
            },
        )?;
        if rate != format.sample_rate {
            info!(wanted = format.sample_rate, rate, "falling back to the device default rate");
        }
        Ok(PcmFormat {
            sample_rate: rate,
            ..format
        })
    }

    /// Open the default output device for `format` and start the stream.
    pub fn open(format: PcmFormat) -> Result<Self, AudioError> {
        if !format.is_supported() {
            return Err(AudioError::UnsupportedConfig {
                sample_rate: format.sample_rate,
                channels: format.channels,
                device_rate: None,
            });
        }

        let device = default_device()?;
        let ranges = output_ranges(&device)?;
        if !supports(&ranges, format.channels, format.sample_rate) {
            return Err(AudioError::UnsupportedConfig {
                sample_rate: format.sample_rate,
                channels: format.channels,
                device_rate: device.default_output_config().ok().map(|c| c.sample_rate().0),
            });
        }

        let rate = cpal::SampleRate(format.sample_rate);
        let config = StreamConfig {
            channels: format.channels,
            sample_rate: rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = (format.sample_rate as usize / 10).max(1) * format.channels as usize;
        let rb = HeapRb::<i16>::new(capacity);
        let (producer, mut consumer) = rb.split();

        let failed = Arc::new(AtomicBool::new(false));
        let failed_cb = failed.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = match consumer.try_pop() {
                            Some(v) => v as f32 / 32768.0,
                            None => 0.0,
                        };
                    }
                },
                move |err| {
                    warn!(%err, "audio stream error");
                    failed_cb.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        debug!(rate = format.sample_rate, channels = format.channels, capacity, "audio stream started");

        Ok(Self {
            stream,
            producer,
            format,
            capacity,
            failed,
            closed: false,
        })
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    fn check(&self) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if self.failed.load(Ordering::Relaxed) {
            return Err(AudioError::Playback("stream stopped".into()).into());
        }
        Ok(())
    }

    fn drain(&self) {
        let ring_time = Duration::from_secs_f64(
            self.capacity as f64 / (self.format.sample_rate as f64 * self.format.channels as f64),
        );
        let deadline = Instant::now() + ring_time + DRAIN_GRACE;
        while !self.producer.is_empty() && !self.failed.load(Ordering::Relaxed) {
            if Instant::now() >= deadline {
                warn!(queued = self.producer.occupied_len(), "audio did not drain before close");
                break;
            }
            std::thread::sleep(BACKOFF);
        }
    }
}

fn default_device() -> Result<Device, AudioError> {
    cpal::default_host().default_output_device().ok_or(AudioError::NoDevice)
}

fn output_ranges(device: &Device) -> Result<Vec<SupportedStreamConfigRange>, AudioError> {
    Ok(device
        .supported_output_configs()
        .map_err(|e| AudioError::DeviceInit(e.to_string()))?
        .collect())
}

/// Whether any f32 range plays `channels` at `rate`.
fn supports(ranges: &[SupportedStreamConfigRange], channels: u16, rate: u32) -> bool {
    ranges.iter().any(|range| {
        range.channels() == channels
            && range.sample_format() == SampleFormat::F32
            && range.min_sample_rate().0 <= rate
            && rate <= range.max_sample_rate().0
    })
}

/// `wanted` when the device plays it, else `fallback` when that works.
fn pick_rate(ranges: &[SupportedStreamConfigRange], channels: u16, wanted: u32, fallback: u32) -> Option<u32> {
    [wanted, fallback].into_iter().find(|&rate| supports(ranges, channels, rate))
}

impl Sink for CpalOutput {
    fn accept(&mut self, block: &AudioBlock) -> Result<(), SinkError> {
        self.check()?;

        let mut pending = block.samples();
        let mut spins = 0;
        while !pending.is_empty() {
            let pushed = self.producer.push_slice(pending);
            pending = &pending[pushed..];
            if pending.is_empty() {
                break;
            }
            if pushed == 0 {
                if spins < SPIN_LIMIT {
                    spins += 1;
                    std::hint::spin_loop();
                } else {
                    self.check()?;
                    std::thread::sleep(BACKOFF);
                }
            } else {
                spins = 0;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.drain();
        self.stream
            .pause()
            .map_err(|e| AudioError::Playback(e.to_string()))?;
        debug!("audio stream paused");
        Ok(())
    }
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
    fn wanted_rate_is_kept_when_supported() {
        let ranges = [range(2, 8000, 96000, SampleFormat::F32)];
        assert_eq!(pick_rate(&ranges, 2, 49716, 48000), Some(49716));
    }

    #[test]
    fn falls_back_to_default_rate() {
        let ranges = [range(2, 44100, 44100, SampleFormat::F32), range(2, 48000, 48000, SampleFormat::F32)];
        assert_eq!(pick_rate(&ranges, 2, 49716, 48000), Some(48000));
    }

    #[test]
    fn channel_count_must_match() {
        let ranges = [range(1, 8000, 96000, SampleFormat::F32)];
        assert_eq!(pick_rate(&ranges, 2, 49716, 48000), None);
        assert_eq!(pick_rate(&ranges, 1, 49716, 48000), Some(49716));
    }

    #[test]
    fn only_f32_ranges_count() {
        let ranges = [range(2, 8000, 96000, SampleFormat::I16)];
        assert!(!supports(&ranges, 2, 48000));
        assert_eq!(pick_rate(&ranges, 2, 49716, 48000), None);
    }
}
