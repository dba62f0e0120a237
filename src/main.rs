//! Loopback demo: a synthetic tone through a local stream, straight into a
//! remote stream, on a simulated clock.
//!
//! Usage: `pcm-rtp-loopback [config.json]`

use std::f32::consts::TAU;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pcm_rtp_bridge::config::PayloadRegistration;
use pcm_rtp_bridge::{BridgeConfig, LocalStream, RemoteStream};

const INPUT_SAMPLE_RATE: u32 = 44100;
const INPUT_CHANNELS: usize = 2;
const TONE_HZ: f32 = 440.0;
const DURATION_MS: u64 = 2000;
/// Capture callbacks in real devices rarely deliver a fixed size.
const CHUNK_FRAMES: [usize; 4] = [441, 512, 300, 211];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        error!("Loopback failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => BridgeConfig::load(&path)?,
        None => BridgeConfig::default(),
    };

    if config.remote.payload_types.is_empty() {
        let codec = &config.local.codec;
        config.remote.payload_types.push(PayloadRegistration {
            payload_type: config.local.payload_type,
            codec: codec.codec,
            sample_rate: codec.sample_rate,
            channels: codec.channels,
        });
    }

    info!(
        codec = %config.local.codec.codec,
        frame_ms = config.local.codec.frame_ms,
        payload_type = config.local.payload_type,
        "Starting loopback"
    );

    let mut local = LocalStream::new(config.local.clone()).context("Local stream")?;
    let mut remote = RemoteStream::new(config.remote.clone()).context("Remote stream")?;

    let mut now_ms = 0u64;
    let mut phase = 0.0f32;
    let mut chunk_idx = 0usize;
    let mut sent = 0u64;
    let mut received_frames = 0usize;
    let mut peak = 0.0f32;
    // Sub-millisecond remainder of the simulated clock, in input frames.
    let mut pending_frames = 0usize;

    while now_ms < DURATION_MS {
        let frames = CHUNK_FRAMES[chunk_idx % CHUNK_FRAMES.len()];
        chunk_idx += 1;

        let mut chunk = Vec::with_capacity(frames * INPUT_CHANNELS);
        for _ in 0..frames {
            let value = phase.sin() * 0.5;
            phase = (phase + TAU * TONE_HZ / INPUT_SAMPLE_RATE as f32) % TAU;
            chunk.extend(std::iter::repeat_n(value, INPUT_CHANNELS));
        }

        pending_frames += frames;
        let per_ms = INPUT_SAMPLE_RATE as usize / 1000;
        now_ms += (pending_frames / per_ms) as u64;
        pending_frames %= per_ms;

        let signal = local.input_f32(&chunk, now_ms, INPUT_SAMPLE_RATE, INPUT_CHANNELS)?;
        if !signal.is_ready() {
            continue;
        }

        while local.pacing_signal(now_ms).is_ready() {
            let packet = match local.output_at(now_ms) {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => {
                    warn!("Encode failed: {}", e);
                    break;
                }
            };
            sent += 1;

            let decode_signal = remote.input_at(&packet, now_ms)?;
            if !decode_signal.is_ready() {
                continue;
            }
            match remote.output_f32(now_ms) {
                Ok(Some((samples, format))) => {
                    received_frames += samples.len() / format.channels;
                    peak = samples.iter().fold(peak, |acc, s| acc.max(s.abs()));
                }
                Ok(None) => {}
                Err(e) => warn!("Decode failed: {}", e),
            }
        }
    }

    info!(
        packets_sent = sent,
        next_sequence = local.next_sequence(),
        received_frames,
        peak,
        "Loopback finished"
    );
    Ok(())
}
