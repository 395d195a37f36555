//! Synthetic input for running without audio hardware

use meshwave_core::MockHandle;
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Name of the simulated input device
pub const TONE_DEVICE_NAME: &str = "Test Tone";

const SAMPLE_RATE: f32 = 44_100.0;
const BLOCK_SIZE: usize = 512;

/// Sweeps a sine between 40 Hz and 12 kHz, with a beat pulsing every half second
pub struct ToneGenerator {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ToneGenerator {
    /// Start pushing blocks into every session opened through `handle`
    pub fn spawn(handle: MockHandle) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let thread = thread::Builder::new()
            .name("test-tone".to_string())
            .spawn(move || {
                let mut block = vec![0.0f32; BLOCK_SIZE];
                let mut phase = 0.0f32;
                let mut t = 0usize;
                let block_duration = Duration::from_secs_f32(BLOCK_SIZE as f32 / SAMPLE_RATE);

                while flag.load(Ordering::Relaxed) {
                    t = fill_block(&mut block, &mut phase, t);
                    handle.push_samples(&block);
                    thread::sleep(block_duration);
                }
                debug!("Test tone stopped");
            })?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }
}

impl Drop for ToneGenerator {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Fill one block starting at sample `t`, returning the next sample position
fn fill_block(block: &mut [f32], phase: &mut f32, t: usize) -> usize {
    let sweep_samples = (SAMPLE_RATE * 8.0) as usize;
    let beat_samples = (SAMPLE_RATE * 0.5) as usize;

    for (i, sample) in block.iter_mut().enumerate() {
        let n = t + i;
        // Exponential sweep, repeating every 8 seconds
        let position = (n % sweep_samples) as f32 / sweep_samples as f32;
        let frequency = 40.0 * (12_000.0f32 / 40.0).powf(position);
        *phase = (*phase + TAU * frequency / SAMPLE_RATE) % TAU;

        let beat_position = (n % beat_samples) as f32 / beat_samples as f32;
        let kick = (-beat_position * 20.0).exp() * (TAU * 60.0 * n as f32 / SAMPLE_RATE).sin();

        *sample = 0.4 * phase.sin() + 0.5 * kick;
    }
    t + block.len()
}
