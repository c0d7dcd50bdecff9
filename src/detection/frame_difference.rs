use super::ops::{absdiff, threshold_binary, to_gray};
use super::ring_buffer::{RingBuffer, Sequence};
use super::types::{Mask, MotionStrategy, Panel, Phase, Step};
use crate::error::{MotionError, Result};
use image::{DynamicImage, GrayImage, RgbImage};

/// Largest ring the detector accepts; keeps `2 * capacity` inside a `Sequence`
const MAX_CAPACITY: u32 = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDifferenceSettings {
    /// Frames between the compared pair (N)
    pub lag_window: u32,
    /// Extra ring slots kept beyond the lag window
    pub tolerance: u32,
    /// Absolute difference above which a pixel counts as motion
    pub threshold: u8,
}

impl Default for FrameDifferenceSettings {
    fn default() -> Self {
        Self {
            lag_window: 20,
            tolerance: 80,
            threshold: 50,
        }
    }
}

impl FrameDifferenceSettings {
    pub fn capacity(&self) -> u32 {
        self.lag_window.saturating_add(self.tolerance)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lag_window == 0 {
            return Err(MotionError::InvalidSettings(
                "lag window must be at least one frame".into(),
            ));
        }
        if self.tolerance == 0 {
            return Err(MotionError::InvalidSettings(
                "ring tolerance must be at least one slot".into(),
            ));
        }
        if self.capacity() > MAX_CAPACITY {
            return Err(MotionError::InvalidSettings(format!(
                "ring capacity {} exceeds {}",
                self.capacity(),
                MAX_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Result of comparing a frame against the one `lag_window` frames earlier
pub struct FrameDifference {
    pub old_frame: GrayImage,
    pub difference: GrayImage,
    pub mask: Mask,
}

/// Fixed-lag frame differencing backed by a ring of past grayscale frames
pub struct FrameDifferenceDetector {
    settings: FrameDifferenceSettings,
    ring: RingBuffer<GrayImage>,
    /// Sequence number given to the next frame
    cur: Sequence,
    stopped: bool,
}

impl FrameDifferenceDetector {
    pub fn new(settings: FrameDifferenceSettings) -> Result<Self> {
        settings.validate()?;
        tracing::info!(
            "Frame difference: lag={}, ring capacity={}, threshold={}",
            settings.lag_window,
            settings.capacity(),
            settings.threshold
        );
        Ok(Self {
            settings,
            ring: RingBuffer::with_capacity(settings.capacity() as usize),
            cur: 0,
            stopped: false,
        })
    }

    pub fn settings(&self) -> &FrameDifferenceSettings {
        &self.settings
    }

    /// Trailing read cursor, defined once the lag window has been filled
    pub fn trailing_sequence(&self) -> Option<Sequence> {
        self.cur.checked_sub(self.settings.lag_window)
    }

    pub fn phase(&self) -> Phase {
        // The counter only sits at zero before the first frame; remapping
        // never lands below the ring capacity.
        if self.stopped {
            Phase::Stopped
        } else if self.cur == 0 {
            Phase::Idle
        } else if self.trailing_sequence().is_some() {
            Phase::SteadyState
        } else {
            Phase::WarmingUp
        }
    }

    /// Convert `frame` to grayscale and run [`Self::detect_gray`]
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Option<FrameDifference>> {
        self.detect_gray(to_gray(frame))
    }

    /// Store `gray` and compare it against the frame `lag_window` steps back
    ///
    /// Returns `None` while the lag window is still filling.
    pub fn detect_gray(&mut self, gray: GrayImage) -> Result<Option<FrameDifference>> {
        let _span = tracing::debug_span!("frame_difference", seq = self.cur).entered();

        let result = match self.trailing_sequence() {
            Some(old) => self.compare(&gray, old)?,
            None => None,
        };

        let was_filled = self.ring.is_filled();
        self.ring.write(self.cur, gray);
        if !was_filled && self.ring.is_filled() {
            tracing::debug!(
                "Ring of {} frames filled, overwriting oldest from now on",
                self.ring.capacity()
            );
        }
        self.advance();

        Ok(result)
    }

    fn compare(&self, gray: &GrayImage, old: Sequence) -> Result<Option<FrameDifference>> {
        let Some(old_frame) = self.ring.read(old) else {
            // Slot never written: still warming up for this offset.
            tracing::debug!("Trailing slot {} not populated, skipping", self.ring.slot(old));
            return Ok(None);
        };

        let difference = absdiff(gray, old_frame)?;
        let mask = threshold_binary(&difference, self.settings.threshold);

        Ok(Some(FrameDifference {
            old_frame: old_frame.clone(),
            difference,
            mask,
        }))
    }

    fn advance(&mut self) {
        self.cur = match self.cur.checked_add(1) {
            Some(next) => next,
            None => {
                let capacity = self.ring.capacity() as u64;
                let next_slot = (self.cur as u64 + 1) % capacity;
                let remapped = (capacity + next_slot) as Sequence;
                tracing::debug!(
                    "Sequence counter exhausted, remapping to {} (slot {})",
                    remapped,
                    next_slot
                );
                remapped
            }
        };
    }
}

impl MotionStrategy for FrameDifferenceDetector {
    fn name(&self) -> &'static str {
        "frame difference"
    }

    fn process(&mut self, frame: &RgbImage) -> Result<Step> {
        if self.stopped {
            return Err(MotionError::Stopped);
        }
        let gray = to_gray(frame);
        let mut panels = vec![Panel::new("Frame", DynamicImage::ImageLuma8(gray.clone()))];

        let mask = match self.detect_gray(gray)? {
            Some(FrameDifference {
                old_frame,
                difference,
                mask,
            }) => {
                panels.push(Panel::new("Old Frame", DynamicImage::ImageLuma8(old_frame)));
                panels.push(Panel::new("Difference", DynamicImage::ImageLuma8(difference)));
                Some(mask)
            }
            None => None,
        };

        Ok(Step {
            panels,
            mask,
            mask_label: "Motion",
        })
    }

    fn phase(&self) -> Phase {
        FrameDifferenceDetector::phase(self)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn flat(value: u8) -> GrayImage {
        GrayImage::from_pixel(4, 4, Luma([value]))
    }

    fn detector(lag_window: u32, tolerance: u32) -> FrameDifferenceDetector {
        FrameDifferenceDetector::new(FrameDifferenceSettings {
            lag_window,
            tolerance,
            threshold: 50,
        })
        .unwrap()
    }

    #[test]
    fn warm_up_yields_no_mask_until_lag_is_reached() {
        let mut det = detector(20, 80);
        for i in 0..20 {
            assert!(det.detect_gray(flat(i as u8)).unwrap().is_none(), "frame {i}");
        }
        assert!(det.detect_gray(flat(0)).unwrap().is_some());
        assert!(det.detect_gray(flat(0)).unwrap().is_some());
    }

    #[test]
    fn identical_frames_give_empty_mask() {
        let mut det = detector(2, 1);
        for _ in 0..2 {
            det.detect_gray(flat(90)).unwrap();
        }
        let out = det.detect_gray(flat(90)).unwrap().unwrap();
        assert!(out.mask.iter().all(|&v| v == 0));
    }

    #[test]
    fn compares_against_frame_lag_steps_back() {
        let mut det = detector(2, 1);
        det.detect_gray(flat(10)).unwrap();
        det.detect_gray(flat(200)).unwrap();
        let out = det.detect_gray(flat(70)).unwrap().unwrap();

        assert_eq!(out.old_frame.get_pixel(0, 0)[0], 10);
        assert_eq!(out.difference.get_pixel(0, 0)[0], 60);
        assert!(out.mask.iter().all(|&v| v == 255));
    }

    #[test]
    fn difference_at_threshold_is_not_motion() {
        let mut det = detector(1, 1);
        det.detect_gray(flat(100)).unwrap();
        let out = det.detect_gray(flat(150)).unwrap().unwrap();
        assert!(out.mask.iter().all(|&v| v == 0));
    }

    #[test]
    fn keeps_lag_across_ring_wraparound() {
        let mut det = detector(3, 2);
        let values: Vec<u8> = (0..25).map(|i| (i * 37 % 251) as u8).collect();
        for (i, &v) in values.iter().enumerate() {
            let out = det.detect_gray(flat(v)).unwrap();
            if i < 3 {
                assert!(out.is_none());
            } else {
                let out = out.unwrap();
                assert_eq!(out.old_frame.get_pixel(0, 0)[0], values[i - 3]);
            }
        }
    }

    #[test]
    fn counter_exhaustion_keeps_slot_semantics() {
        let mut det = detector(2, 1);
        let capacity = det.settings().capacity();

        // Resume a warmed-up session just below the counter limit, keeping
        // the slot alignment of the frames already stored.
        det.detect_gray(flat(1)).unwrap();
        det.detect_gray(flat(2)).unwrap();
        let start = u32::MAX - 3;
        let aligned = start - (start % capacity) + (det.cur % capacity);
        det.cur = aligned;

        let mut history = vec![1u8, 2];
        for step in 0..10u8 {
            let value = 20 + step * 20;
            let out = det.detect_gray(flat(value)).unwrap().unwrap();
            assert_eq!(
                out.old_frame.get_pixel(0, 0)[0],
                history[history.len() - 2],
                "step {step}"
            );
            history.push(value);
        }
        assert!(det.cur < 2 * capacity + 10);
        assert_eq!(det.phase(), Phase::SteadyState);
    }

    #[test]
    fn remap_lands_on_congruent_slot() {
        let mut det = detector(2, 3);
        det.cur = u32::MAX;
        let expected_slot = ((u32::MAX as u64 + 1) % 5) as u32;
        det.advance();
        assert_eq!(det.cur % 5, expected_slot);
        assert!(det.cur >= 5);
    }

    #[test]
    fn rejects_degenerate_settings() {
        let zero_lag = FrameDifferenceSettings {
            lag_window: 0,
            ..Default::default()
        };
        assert!(FrameDifferenceDetector::new(zero_lag).is_err());

        let huge = FrameDifferenceSettings {
            lag_window: 1 << 16,
            tolerance: 1,
            threshold: 50,
        };
        assert!(FrameDifferenceDetector::new(huge).is_err());
    }

    #[test]
    fn phases_advance_through_warm_up_once() {
        let mut det = detector(3, 4);
        let mut phases = vec![det.phase()];
        for i in 0..5u8 {
            det.detect_gray(flat(i * 10)).unwrap();
            phases.push(det.phase());
        }
        assert_eq!(
            phases,
            [
                Phase::Idle,
                Phase::WarmingUp,
                Phase::WarmingUp,
                Phase::SteadyState,
                Phase::SteadyState,
                Phase::SteadyState,
            ]
        );

        // Wrapping the ring many times never goes back to warm-up.
        for i in 0..40u8 {
            det.detect_gray(flat(i)).unwrap();
            assert_eq!(det.phase(), Phase::SteadyState, "frame {i}");
        }
    }

    #[test]
    fn phases_survive_counter_boundary() {
        // Capacity 7 does not divide 2^32, so the remap is not a plain wrap.
        let mut det = detector(3, 4);
        det.cur = u32::MAX - 20;
        let values: Vec<u8> = (0..60).map(|i| (i * 53 % 256) as u8).collect();
        for (i, &v) in values.iter().enumerate() {
            let out = det.detect_gray(flat(v)).unwrap();
            if i < 3 {
                assert!(out.is_none(), "frame {i}");
                continue;
            }
            let out = out.unwrap();
            assert_eq!(out.old_frame.get_pixel(0, 0)[0], values[i - 3], "frame {i}");
            assert_eq!(det.phase(), Phase::SteadyState);
        }
    }

    #[test]
    fn stopped_detector_rejects_frames() {
        let mut det = detector(1, 1);
        det.process(&RgbImage::new(4, 4)).unwrap();
        det.stop();
        assert_eq!(det.phase(), Phase::Stopped);
        assert!(matches!(
            det.process(&RgbImage::new(4, 4)),
            Err(MotionError::Stopped)
        ));
    }
}
