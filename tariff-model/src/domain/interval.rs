use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::ModelError;

/// Flow direction of a metered interval, as seen from the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Import,
    Export,
}

/// Native unit of the values in an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Energy per sample.
    Kwh,
    /// Average or instantaneous power per sample.
    Kw,
    /// Reactive energy per sample.
    Kvarh,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Kwh => "kwh",
            Unit::Kw => "kw",
            Unit::Kvarh => "kvarh",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kwh" => Ok(Unit::Kwh),
            "kw" => Ok(Unit::Kw),
            "kvarh" => Ok(Unit::Kvarh),
            other => Err(ModelError::UnknownUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub ts: OffsetDateTime,
    pub value: f64,
}

/// Time-ordered measurements for one meter channel.
///
/// Values are already net/gross adjusted upstream; this type only guarantees
/// ordering and knows its dominant sampling step.
#[derive(Debug, Clone)]
pub struct Interval {
    samples: Vec<Sample>,
    direction: Direction,
    unit: Unit,
    frequency: Option<Duration>,
}

impl Interval {
    pub fn new(samples: Vec<Sample>, direction: Direction, unit: Unit) -> Result<Self, ModelError> {
        if let Some(pos) = samples.windows(2).position(|w| w[1].ts <= w[0].ts) {
            return Err(ModelError::NonMonotonic { index: pos + 1 });
        }

        let frequency = dominant_step(&samples);
        Ok(Self {
            samples,
            direction,
            unit,
            frequency,
        })
    }

    pub fn from_pairs<I>(pairs: I, direction: Direction, unit: Unit) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = (OffsetDateTime, f64)>,
    {
        let samples = pairs
            .into_iter()
            .map(|(ts, value)| Sample { ts, value })
            .collect();
        Self::new(samples, direction, unit)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn timestamps(&self) -> impl Iterator<Item = OffsetDateTime> + '_ {
        self.samples.iter().map(|s| s.ts)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Most common spacing between consecutive samples, if there are at least two.
    pub fn frequency(&self) -> Option<Duration> {
        self.frequency
    }

    pub fn sample_minutes(&self) -> Option<f64> {
        self.frequency.map(|d| d.as_seconds_f64() / 60.0)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// Ties go to the shortest step: BTreeMap iterates ascending and only a strictly
// larger count replaces the current best.
fn dominant_step(samples: &[Sample]) -> Option<Duration> {
    let mut counts: BTreeMap<Duration, usize> = BTreeMap::new();
    for w in samples.windows(2) {
        *counts.entry(w[1].ts - w[0].ts).or_default() += 1;
    }

    let mut best: Option<(Duration, usize)> = None;
    for (step, n) in counts {
        match best {
            Some((_, m)) if m >= n => {}
            _ => best = Some((step, n)),
        }
    }
    best.map(|(step, _)| step)
}
