//! Plays synthesized speech through the default output device.

use anyhow::{Context, Result};
use companion_core::speech::{PCM_SAMPLE_RATE, Utterance};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Input frames handed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;
/// Room in the output ring, in seconds of device audio.
const BUFFER_SECONDS: usize = 60;

pub struct Speaker {
    // Dropping the stream stops playback.
    _stream: cpal::Stream,
    producer: HeapProd<f32>,
    resampler: FastFixedIn<f32>,
}

impl Speaker {
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .context("No default audio output device")?;
        tracing::info!("Using output device: {:?}", device.name()?);

        let config: cpal::StreamConfig = device
            .default_output_config()
            .context("Failed to get default output config")?
            .config();
        let channels = config.channels as usize;
        let output_rate = config.sample_rate.0 as f64;
        tracing::info!("Output stream config: {:?}", &config);

        let (producer, mut consumer) =
            HeapRb::<f32>::new(output_rate as usize * BUFFER_SECONDS).split();

        // Mono speech is copied to every channel; silence when the ring is dry.
        let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                frame.fill(consumer.try_pop().unwrap_or(0.0));
            }
        };
        let stream = device.build_output_stream(
            &config,
            output_data_fn,
            move |err| tracing::error!("An error occurred on output stream: {}", err),
            None,
        )?;
        stream.play()?;

        let resampler = FastFixedIn::<f32>::new(
            output_rate / PCM_SAMPLE_RATE as f64,
            1.0,
            PolynomialDegree::Cubic,
            RESAMPLE_CHUNK,
            1,
        )?;

        Ok(Self {
            _stream: stream,
            producer,
            resampler,
        })
    }

    /// Queues every clip of `utterance` back to back.
    pub fn play(&mut self, utterance: &Utterance) {
        for clip in &utterance.clips {
            for chunk in clip.samples.chunks(RESAMPLE_CHUNK) {
                let mut chunk = chunk.to_vec();
                chunk.resize(RESAMPLE_CHUNK, 0.0);

                match self.resampler.process(&[chunk.as_slice()], None) {
                    Ok(resampled) => {
                        if let Some(samples) = resampled.first() {
                            let pushed = self.producer.push_slice(samples);
                            if pushed < samples.len() {
                                tracing::warn!(
                                    dropped = samples.len() - pushed,
                                    "output buffer full; dropping samples"
                                );
                            }
                        }
                    }
                    Err(e) => tracing::warn!("Failed to resample speech: {}", e),
                }
            }
        }
    }
}
