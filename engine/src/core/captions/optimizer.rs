//! Timing Optimizer
//!
//! Repairs aligned captions so that every consumer can rely on:
//!
//! - `end > start`
//! - `duration >= min_duration`
//! - `start(i+1) >= end(i) + min_gap`
//!
//! The pass is forward-only. A segment that starts too early is pushed later,
//! never the other way round, so dense input accumulates drift toward the end.
//! Running the pass twice changes nothing.

use thiserror::Error;
use tracing::debug;

use super::models::CaptionSegment;
use crate::core::TimeSec;

/// Shortest display window ever produced
const MIN_VISIBLE: TimeSec = 0.001;

/// Slack for floating point comparisons in [`validate_timing`]
const TOLERANCE: TimeSec = 1e-6;

/// Rewrites segment times to satisfy the ordering, gap and duration rules
pub fn optimize(
    mut segments: Vec<CaptionSegment>,
    min_duration: TimeSec,
    min_gap: TimeSec,
) -> Vec<CaptionSegment> {
    let min_duration = min_duration.max(MIN_VISIBLE);
    let min_gap = min_gap.max(0.0);

    let mut prev_end: Option<TimeSec> = None;
    let mut max_drift: TimeSec = 0.0;

    for segment in segments.iter_mut() {
        let original_start = if segment.start_time.is_finite() {
            segment.start_time
        } else {
            prev_end.map_or(0.0, |end| end + min_gap)
        };
        let original_duration = (segment.end_time - segment.start_time).max(0.0);
        let original_duration = if original_duration.is_finite() {
            original_duration
        } else {
            min_duration
        };

        let mut start = original_start;
        if let Some(end) = prev_end {
            let floor = end + min_gap;
            if start < floor {
                start = floor;
            }
        }

        let end = if start == original_start && segment.end_time.is_finite() {
            segment.end_time.max(start + min_duration)
        } else {
            (start + original_duration).max(start + min_duration)
        };

        max_drift = max_drift.max(start - original_start);
        segment.set_times(start, end);
        prev_end = Some(end);
    }

    debug!(segments = segments.len(), max_drift, "Optimized caption timing");
    segments
}

/// First timing rule a segment list violates
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimingViolation {
    #[error("Segment {index} ends at or before its start ({start:.3}~{end:.3}s)")]
    NonPositiveDuration {
        index: usize,
        start: TimeSec,
        end: TimeSec,
    },

    #[error("Segment {index} lasts {duration:.3}s, shorter than {min:.3}s")]
    TooShort {
        index: usize,
        duration: TimeSec,
        min: TimeSec,
    },

    #[error("Segment {index} starts {gap:.3}s after the previous one, less than {min:.3}s")]
    InsufficientGap {
        index: usize,
        gap: TimeSec,
        min: TimeSec,
    },
}

/// Checks the invariants [`optimize`] establishes
pub fn validate_timing(
    segments: &[CaptionSegment],
    min_duration: TimeSec,
    min_gap: TimeSec,
) -> Result<(), TimingViolation> {
    let mut prev_end: Option<TimeSec> = None;
    for (index, segment) in segments.iter().enumerate() {
        let duration = segment.end_time - segment.start_time;
        if !(duration > 0.0) {
            return Err(TimingViolation::NonPositiveDuration {
                index,
                start: segment.start_time,
                end: segment.end_time,
            });
        }
        if duration + TOLERANCE < min_duration {
            return Err(TimingViolation::TooShort {
                index,
                duration,
                min: min_duration,
            });
        }
        if let Some(end) = prev_end {
            let gap = segment.start_time - end;
            if gap + TOLERANCE < min_gap {
                return Err(TimingViolation::InsufficientGap {
                    index,
                    gap,
                    min: min_gap,
                });
            }
        }
        prev_end = Some(segment.end_time);
    }
    Ok(())
}
