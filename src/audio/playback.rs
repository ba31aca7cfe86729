//! Clip playback to system speakers via cpal.

use crate::audio::decode::decode_clip;
use crate::audio::output::{AudioSink, PlaybackRequest};
use crate::audio::tap::SignalTap;
use crate::config::PlaybackConfig;
use crate::error::{Result, SpeechError};
use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Plays decoded clips on an output device and mirrors them into a [`SignalTap`].
pub struct DevicePlayback {
    device: cpal::Device,
    stream_config: StreamConfig,
    tap: Option<SignalTap>,
}

impl DevicePlayback {
    /// Open the configured (or default) output device.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn new(config: &PlaybackConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .is_some_and(|desc| desc.name() == name)
                })
                .ok_or_else(|| SpeechError::Audio(format!("output device '{name}' not found")))?
        } else {
            host.default_output_device()
                .ok_or_else(|| SpeechError::Audio("no default output device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        Ok(Self {
            device,
            stream_config: StreamConfig {
                channels: 1,
                sample_rate: config.output_sample_rate,
                buffer_size: cpal::BufferSize::Default,
            },
            tap: None,
        })
    }

    /// Mirror rendered samples into `tap` for live lip-sync.
    pub fn with_tap(mut self, tap: SignalTap) -> Self {
        self.tap = Some(tap);
        self
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| SpeechError::Audio(format!("cannot enumerate devices: {e}")))?;
        Ok(devices
            .filter_map(|d| d.description().ok().map(|desc| desc.name().to_owned()))
            .collect())
    }
}

#[async_trait]
impl AudioSink for DevicePlayback {
    async fn play(&self, request: PlaybackRequest, cancel: CancellationToken) -> Result<()> {
        let out_rate = self.stream_config.sample_rate;
        let decoded = decode_clip(&request.clip)?.resampled(out_rate);
        drop(request);

        let device = self.device.clone();
        let stream_config = self.stream_config.clone();
        let tap = self.tap.clone();

        tokio::task::spawn_blocking(move || {
            play_blocking(&device, &stream_config, decoded.samples, tap.as_ref(), &cancel)
        })
        .await
        .map_err(|e| SpeechError::Playback(format!("playback task failed: {e}")))?
    }

    fn name(&self) -> &str {
        "device"
    }
}

/// Progress shared with the output callback.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

fn play_blocking(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    samples: Vec<f32>,
    tap: Option<&SignalTap>,
    cancel: &CancellationToken,
) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let buffer = Arc::new(Mutex::new(PlaybackBuffer {
        samples,
        position: 0,
        finished: false,
    }));
    let buffer_clone = Arc::clone(&buffer);
    let callback_tap = tap.cloned();

    let stream = device
        .build_output_stream(
            stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let Ok(mut buf) = buffer_clone.lock() else {
                    return;
                };
                for sample in data.iter_mut() {
                    if buf.position < buf.samples.len() {
                        *sample = buf.samples[buf.position];
                        buf.position += 1;
                    } else {
                        *sample = 0.0;
                        buf.finished = true;
                    }
                }
                if let Some(tap) = &callback_tap {
                    tap.push(data);
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| SpeechError::Audio(format!("failed to build output stream: {e}")))?;

    if let Some(tap) = tap {
        tap.begin(stream_config.sample_rate);
    }
    let result = stream
        .play()
        .map_err(|e| SpeechError::Audio(format!("failed to start output stream: {e}")))
        .and_then(|()| wait_for_drain(&buffer, cancel));

    drop(stream);
    if let Some(tap) = tap {
        tap.end();
    }
    result
}

fn wait_for_drain(buffer: &Mutex<PlaybackBuffer>, cancel: &CancellationToken) -> Result<()> {
    loop {
        std::thread::sleep(Duration::from_millis(10));
        if cancel.is_cancelled() {
            return Err(SpeechError::Cancelled);
        }
        let buf = buffer
            .lock()
            .map_err(|e| SpeechError::Playback(format!("playback buffer lock poisoned: {e}")))?;
        if buf.finished {
            return Ok(());
        }
    }
}
