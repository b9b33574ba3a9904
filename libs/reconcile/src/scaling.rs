//! Target-tracking auto-scaling model.
//!
//! Given the current task count `n` and the average CPU utilization `u`, the
//! policy proposes `ceil(n * u / target)` tasks, clamped to the bounds. The
//! proposal is applied only once the relevant cooldown has passed:
//!
//! - scale-out waits `scale_out_cooldown` after the previous scale-out;
//! - scale-in waits `scale_in_cooldown` after the previous activity of
//!   either direction.
//!
//! Time is a [`Duration`] offset from the start of the run so that runs are
//! reproducible.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Scaling model errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScalingError {
    #[error("invalid scaling bounds: min {min} > max {max}")]
    InvalidBounds { min: u32, max: u32 },

    #[error("invalid target utilization {0}% (must be in (0, 100])")]
    InvalidTarget(f64),

    #[error("initial count {count} is outside [{min}, {max}]")]
    InitialOutOfBounds { count: u32, min: u32, max: u32 },
}

/// Inclusive task-count bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScalingBounds {
    min: u32,
    max: u32,
}

impl ScalingBounds {
    pub fn new(min: u32, max: u32) -> Result<Self, ScalingError> {
        if min > max {
            return Err(ScalingError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn contains(&self, count: u32) -> bool {
        (self.min..=self.max).contains(&count)
    }

    pub fn clamp(&self, count: u32) -> u32 {
        count.clamp(self.min, self.max)
    }
}

/// CPU target-tracking policy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetTracking {
    pub target_percent: f64,
    pub scale_in_cooldown: Duration,
    pub scale_out_cooldown: Duration,
}

impl TargetTracking {
    pub fn new(
        target_percent: f64,
        scale_in_cooldown: Duration,
        scale_out_cooldown: Duration,
    ) -> Result<Self, ScalingError> {
        if !(target_percent > 0.0 && target_percent <= 100.0) {
            return Err(ScalingError::InvalidTarget(target_percent));
        }
        Ok(Self {
            target_percent,
            scale_in_cooldown,
            scale_out_cooldown,
        })
    }

    /// Task count the policy wants for the observed utilization.
    ///
    /// Non-finite or negative readings carry no signal and keep `current`.
    pub fn proposed(&self, bounds: &ScalingBounds, current: u32, cpu_percent: f64) -> u32 {
        if !cpu_percent.is_finite() || cpu_percent < 0.0 {
            return bounds.clamp(current);
        }
        let raw = f64::from(current) * cpu_percent / self.target_percent;
        // Absorb float noise so that u == target keeps the count unchanged.
        let wanted = (raw - 1e-9).ceil().max(0.0);
        let wanted = if wanted >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            wanted as u32
        };
        bounds.clamp(wanted)
    }
}

/// Direction of a scaling activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingDirection {
    Out,
    In,
}

impl std::fmt::Display for ScalingDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Out => f.write_str("scale-out"),
            Self::In => f.write_str("scale-in"),
        }
    }
}

/// A change of task count decided by the policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingActivity {
    #[serde(rename = "at_secs", serialize_with = "as_secs")]
    pub at: Duration,
    pub direction: ScalingDirection,
    pub from: u32,
    pub to: u32,
    pub cpu_percent: f64,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Stateful target-tracking evaluator.
#[derive(Debug, Clone)]
pub struct ScalingSimulator {
    bounds: ScalingBounds,
    policy: TargetTracking,
    current: u32,
    last_scale_out: Option<Duration>,
    last_activity: Option<Duration>,
}

impl ScalingSimulator {
    pub fn new(
        bounds: ScalingBounds,
        policy: TargetTracking,
        initial: u32,
    ) -> Result<Self, ScalingError> {
        if !bounds.contains(initial) {
            return Err(ScalingError::InitialOutOfBounds {
                count: initial,
                min: bounds.min(),
                max: bounds.max(),
            });
        }
        Ok(Self {
            bounds,
            policy,
            current: initial,
            last_scale_out: None,
            last_activity: None,
        })
    }

    /// Current task count.
    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn bounds(&self) -> &ScalingBounds {
        &self.bounds
    }

    /// Feed one utilization sample taken at `at`.
    ///
    /// Returns the activity if the count changed.
    pub fn observe(&mut self, at: Duration, cpu_percent: f64) -> Option<ScalingActivity> {
        let wanted = self.policy.proposed(&self.bounds, self.current, cpu_percent);

        let direction = match wanted.cmp(&self.current) {
            std::cmp::Ordering::Greater => ScalingDirection::Out,
            std::cmp::Ordering::Less => ScalingDirection::In,
            std::cmp::Ordering::Equal => return None,
        };

        let (since, cooldown) = match direction {
            ScalingDirection::Out => (self.last_scale_out, self.policy.scale_out_cooldown),
            ScalingDirection::In => (self.last_activity, self.policy.scale_in_cooldown),
        };
        if let Some(since) = since {
            if at.saturating_sub(since) < cooldown {
                return None;
            }
        }

        let activity = ScalingActivity {
            at,
            direction,
            from: self.current,
            to: wanted,
            cpu_percent,
        };

        self.current = wanted;
        self.last_activity = Some(at);
        if direction == ScalingDirection::Out {
            self.last_scale_out = Some(at);
        }

        Some(activity)
    }

    /// Feed a constant load every `step` for `duration` (inclusive of t=0).
    pub fn run_constant_load(
        &mut self,
        cpu_percent: f64,
        duration: Duration,
        step: Duration,
    ) -> Vec<ScalingActivity> {
        let mut activities = Vec::new();
        if step.is_zero() {
            return activities;
        }

        let mut at = Duration::ZERO;
        while at <= duration {
            if let Some(activity) = self.observe(at, cpu_percent) {
                activities.push(activity);
            }
            at += step;
        }
        activities
    }
}
