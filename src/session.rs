use crate::capture::CaptureSource;
use crate::detection::ops::foreground_ratio;
use crate::detection::MotionStrategy;
use crate::error::MotionError;
use crate::output::Display;
use anyhow::{Context, Result};
use image::DynamicImage;
use std::time::{Duration, Instant};

/// Polled once per frame; returning true ends the session
pub trait CancellationSource {
    fn is_requested(&mut self) -> bool;
}

/// Never cancels
pub struct Never;

impl CancellationSource for Never {
    fn is_requested(&mut self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// Target frames per second, 0 disables pacing
    pub fps: u32,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fps: 33,
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    FrameBudget,
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStats {
    pub frames: u64,
    /// Frames that produced a mask (excludes warm-up)
    pub masks: u64,
    /// Mean share of foreground pixels over all masks
    pub mean_foreground: f64,
    pub stop: StopReason,
}

/// Run one detection session until cancellation, frame budget or end of input
///
/// A capture failure other than an exhausted replay source is fatal and is
/// returned as an error. Cancellation is checked before each frame, so a
/// detector is never left halfway through an update.
pub fn run_session<C, D>(
    capture: &mut C,
    strategy: &mut dyn MotionStrategy,
    display: &mut D,
    cancel: &mut dyn CancellationSource,
    config: &SessionConfig,
) -> Result<SessionStats>
where
    C: CaptureSource + ?Sized,
    D: Display + ?Sized,
{
    let frame_duration =
        (config.fps > 0).then(|| Duration::from_secs_f32(1.0 / config.fps as f32));
    let mut frame_count = 0u64;
    let mut mask_count = 0u64;
    let mut foreground_total = 0.0f64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_process_time = Duration::ZERO;
    let mut total_display_time = Duration::ZERO;
    let mut phase = strategy.phase();

    tracing::info!("Starting {} session", strategy.name());

    let stop = loop {
        if cancel.is_requested() {
            break StopReason::Cancelled;
        }
        if config.max_frames.is_some_and(|max| frame_count >= max) {
            break StopReason::FrameBudget;
        }

        let loop_start = Instant::now();

        // Capture frame
        let capture_start = Instant::now();
        let frame = match capture.capture_frame() {
            Ok(frame) => frame,
            Err(e) if matches!(e.downcast_ref::<MotionError>(), Some(MotionError::EndOfStream)) => {
                break StopReason::EndOfStream;
            }
            Err(e) => return Err(e.context("Failed to capture frame")),
        };
        total_capture_time += capture_start.elapsed();

        // Detection
        let process_start = Instant::now();
        let step = strategy
            .process(&frame)
            .with_context(|| format!("{} failed on frame {}", strategy.name(), frame_count))?;
        total_process_time += process_start.elapsed();

        let next_phase = strategy.phase();
        if next_phase != phase {
            tracing::info!("{}: {:?} -> {:?}", strategy.name(), phase, next_phase);
            phase = next_phase;
        }

        // Display
        let display_start = Instant::now();
        for panel in &step.panels {
            display.show(panel.label, &panel.image)?;
        }
        if let Some(mask) = step.mask {
            mask_count += 1;
            foreground_total += foreground_ratio(&mask);
            display.show(step.mask_label, &DynamicImage::ImageLuma8(mask))?;
        }
        display.end_frame()?;
        total_display_time += display_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_process_ms = total_process_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_display_ms = total_display_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_capture_ms + avg_process_ms + avg_display_ms;
            let foreground = if mask_count > 0 {
                foreground_total / mask_count as f64 * 100.0
            } else {
                0.0
            };

            tracing::info!(
                "Frame {}: capture={:.1}ms, detect={:.1}ms, display={:.1}ms, fps={:.1}, foreground={:.1}%",
                frame_count,
                avg_capture_ms,
                avg_process_ms,
                avg_display_ms,
                1000.0 / total_ms.max(f64::EPSILON),
                foreground
            );
        }

        // Frame rate limiting
        if let Some(frame_duration) = frame_duration {
            let elapsed = loop_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    };

    strategy.stop();
    tracing::info!(
        "{}: {:?} -> {:?} ({:?}) after {} frames",
        strategy.name(),
        phase,
        strategy.phase(),
        stop,
        frame_count
    );

    Ok(SessionStats {
        frames: frame_count,
        masks: mask_count,
        mean_foreground: if mask_count > 0 {
            foreground_total / mask_count as f64
        } else {
            0.0
        },
        stop,
    })
}
