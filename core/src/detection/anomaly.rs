//! Anomaly classification over the learned baseline.
//!
//! Every scan sample is compared against the baseline for its bin. A sample
//! rising far enough above the learned mean, or sitting above the strong
//! floor outright, is "active"; active samples are classified into one
//! category and scored for the mode controller. The
//! baseline itself is updated after classification, so a signal is judged
//! against what the band looked like before it appeared.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use crate::config::AnomalyConfig;
use crate::detection::BaselineMap;
use crate::scanning::SpectrumSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCategory {
    /// Absolute power above the strong threshold.
    Strong,
    /// First sighting of this bin.
    New,
    /// Repeated short hits in one bin.
    Burst,
    /// Activity spread across several nearby bins.
    Hopping,
    /// A known bin well above its learned mean.
    Surge,
}

/// One flagged observation, scored for DF triage.
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub frequency_hz: f64,
    pub power_delta_db: f64,
    pub category: AnomalyCategory,
    pub priority_score: f64,
    pub first_seen: f64,
    pub last_seen: f64,
}

pub struct AnomalyEngine {
    config: AnomalyConfig,
    baseline: BaselineMap,
    /// Recent active-hit timestamps per bin, bounded by the tracker window.
    tracker: HashMap<i64, Vec<f64>>,
    history: VecDeque<Anomaly>,
    first_flagged: HashMap<i64, f64>,
    last_flagged: HashMap<i64, f64>,
}

impl AnomalyEngine {
    pub fn new(config: AnomalyConfig) -> Self {
        let baseline = BaselineMap::new(config.bin_hz, config.ema_weight, config.retention_s);
        Self {
            config,
            baseline,
            tracker: HashMap::new(),
            history: VecDeque::new(),
            first_flagged: HashMap::new(),
            last_flagged: HashMap::new(),
        }
    }

    /// Classify one sample; `None` means the band looks like its baseline.
    pub fn observe(&mut self, sample: &SpectrumSample) -> Option<Anomaly> {
        let now = sample.timestamp;
        self.prune_tracker(now);

        let bin = self.baseline.bin(sample.frequency_hz);
        let entry = self.baseline.lookup(sample.frequency_hz, now);
        let reference = entry
            .as_ref()
            .map(|entry| entry.mean_power_dbm)
            .unwrap_or(self.config.floor_estimate_dbm);
        let delta = sample.power_dbm - reference;

        // a carrier above the strong floor never blends into its baseline
        let strong = sample.power_dbm > self.config.strong_dbm;
        if delta < self.config.activity_delta_db && !strong {
            self.baseline.update(sample.frequency_hz, sample.power_dbm, now);
            return None;
        }
        self.tracker.entry(bin).or_default().push(now);

        let category = if entry.is_none() {
            Some(AnomalyCategory::New)
        } else if strong {
            Some(AnomalyCategory::Strong)
        } else if delta >= self.config.surge_db {
            Some(AnomalyCategory::Surge)
        } else if self.is_burst(bin) {
            Some(AnomalyCategory::Burst)
        } else if self.is_hopping(bin) {
            Some(AnomalyCategory::Hopping)
        } else {
            None
        };
        self.baseline.update(sample.frequency_hz, sample.power_dbm, now);
        let category = category?;

        let score = self.score(category, delta, bin, now);
        let first_seen = *self.first_flagged.entry(bin).or_insert(now);
        self.last_flagged.insert(bin, now);
        let anomaly = Anomaly {
            frequency_hz: sample.frequency_hz,
            power_delta_db: delta,
            category,
            priority_score: score,
            first_seen,
            last_seen: now,
        };
        log::debug!(
            "anomaly {:?} at {:.3} MHz, +{delta:.1} dB, score {score:.1}",
            category,
            sample.frequency_hz / 1.0e6
        );
        self.history.push_back(anomaly.clone());
        while self.history.len() > self.config.history_cap {
            self.history.pop_front();
        }
        Some(anomaly)
    }

    pub fn history(&self) -> impl Iterator<Item = &Anomaly> {
        self.history.iter()
    }

    pub fn baseline_len(&self) -> usize {
        self.baseline.len()
    }

    fn score(&self, category: AnomalyCategory, delta: f64, bin: i64, now: f64) -> f64 {
        let weights = &self.config.weights;
        let base = match category {
            AnomalyCategory::Strong => weights.strong,
            AnomalyCategory::New => weights.new,
            AnomalyCategory::Burst => weights.burst,
            AnomalyCategory::Hopping => weights.hopping,
            AnomalyCategory::Surge => weights.surge,
        };
        let recency = match self.last_flagged.get(&bin) {
            Some(last) => {
                let age = now - last;
                if age < weights.recency_window_s {
                    weights.recency * (1.0 - age / weights.recency_window_s)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        base + weights.delta * delta.max(0.0) + recency
    }

    /// A trailing run of hits in this bin with small enough gaps.
    fn is_burst(&self, bin: i64) -> bool {
        let hits = match self.tracker.get(&bin) {
            Some(hits) => hits,
            None => return false,
        };
        let mut run = 1;
        for pair in hits.windows(2).rev() {
            if pair[1] - pair[0] > self.config.burst_max_gap_s {
                break;
            }
            run += 1;
        }
        run >= self.config.burst_min_hits
    }

    /// Enough distinct active bins inside the hop neighborhood.
    fn is_hopping(&self, bin: i64) -> bool {
        let reach = (self.config.neighborhood_hz / self.config.bin_hz).round() as i64;
        let active = self
            .tracker
            .keys()
            .filter(|other| (*other - bin).abs() <= reach)
            .count();
        active >= self.config.hop_min_bins
    }

    fn prune_tracker(&mut self, now: f64) {
        let cutoff = now - self.config.window_s;
        self.tracker.retain(|_, hits| {
            hits.retain(|hit| *hit >= cutoff);
            !hits.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(frequency_hz: f64, power_dbm: f64, timestamp: f64) -> SpectrumSample {
        SpectrumSample {
            frequency_hz,
            power_dbm,
            timestamp,
            receiver_id: 0,
        }
    }

    fn engine() -> AnomalyEngine {
        AnomalyEngine::new(AnomalyConfig::default())
    }

    #[test]
    fn first_sighting_is_new() {
        let mut engine = engine();
        let anomaly = engine.observe(&sample(146.0e6, -60.0, 0.0)).unwrap();
        assert_eq!(anomaly.category, AnomalyCategory::New);
        assert!(anomaly.priority_score > 0.0);
    }

    #[test]
    fn steady_carrier_settles_into_the_baseline() {
        let mut engine = engine();
        assert!(engine.observe(&sample(146.0e6, -60.0, 0.0)).is_some());
        for step in 1..50 {
            let result = engine.observe(&sample(146.0e6, -60.0, step as f64));
            assert!(result.is_none(), "flagged again at step {step}");
        }
    }

    #[test]
    fn persistent_strong_carrier_keeps_reading_strong() {
        let mut engine = engine();
        let first = engine.observe(&sample(146.0e6, -30.0, 0.0)).unwrap();
        assert_eq!(first.category, AnomalyCategory::New);
        // the baseline learns the carrier, but strong never fades with it
        for step in 1..100 {
            let anomaly = engine.observe(&sample(146.0e6, -30.0, step as f64)).unwrap();
            assert_eq!(anomaly.category, AnomalyCategory::Strong, "at step {step}");
        }
    }

    #[test]
    fn fluctuation_inside_the_surge_band_never_surges() {
        let mut engine = engine();
        engine.observe(&sample(146.0e6, -80.0, 0.0));
        for step in 1..40 {
            let power = if step % 2 == 0 { -80.0 } else { -71.0 };
            if let Some(anomaly) = engine.observe(&sample(146.0e6, power, step as f64 * 10.0)) {
                assert_ne!(anomaly.category, AnomalyCategory::Surge, "at step {step}");
            }
        }
    }

    #[test]
    fn strong_signal_outranks_surge() {
        let mut engine = engine();
        // learn a quiet bin, then light it up above the strong threshold
        for step in 0..20 {
            engine.observe(&sample(146.0e6, -80.0, step as f64));
        }
        let anomaly = engine.observe(&sample(146.0e6, -30.0, 20.0)).unwrap();
        assert_eq!(anomaly.category, AnomalyCategory::Strong);
    }

    #[test]
    fn surge_on_a_known_quiet_bin() {
        let mut engine = engine();
        for step in 0..20 {
            engine.observe(&sample(146.0e6, -85.0, step as f64));
        }
        let anomaly = engine.observe(&sample(146.0e6, -65.0, 20.0)).unwrap();
        assert_eq!(anomaly.category, AnomalyCategory::Surge);
        assert!(anomaly.power_delta_db >= 15.0);
    }

    #[test]
    fn evicted_bin_reads_as_new_not_surge() {
        let mut engine = engine();
        engine.observe(&sample(146.0e6, -80.0, 0.0));
        let later = 90_000.0; // past the retention window
        let anomaly = engine.observe(&sample(146.0e6, -60.0, later)).unwrap();
        assert_eq!(anomaly.category, AnomalyCategory::New);
    }

    #[test]
    fn spread_activity_reads_as_hopping() {
        let mut engine = engine();
        let bins = [433.90e6, 433.92e6, 433.94e6];
        for (index, freq) in bins.iter().enumerate() {
            engine.observe(&sample(*freq, -80.0, index as f64));
        }
        // tracker window passes; baselines remain
        let mut last = None;
        for (index, freq) in bins.iter().enumerate() {
            last = engine.observe(&sample(*freq, -70.0, 400.0 + index as f64));
        }
        assert_eq!(last.unwrap().category, AnomalyCategory::Hopping);
    }

    #[test]
    fn repeated_hits_in_one_bin_read_as_burst() {
        let mut engine = engine();
        engine.observe(&sample(915.0e6, -80.0, 0.0));
        let mut last = None;
        for hit in 0..4 {
            last = engine.observe(&sample(915.0e6, -70.0, 400.0 + 0.5 * hit as f64));
        }
        assert_eq!(last.unwrap().category, AnomalyCategory::Burst);
    }

    #[test]
    fn bigger_excursions_score_higher() {
        let mut engine = engine();
        for step in 0..20 {
            engine.observe(&sample(146.0e6, -85.0, step as f64));
            engine.observe(&sample(440.0e6, -85.0, step as f64));
        }
        let small = engine.observe(&sample(146.0e6, -68.0, 20.0)).unwrap();
        let large = engine.observe(&sample(440.0e6, -60.0, 20.0)).unwrap();
        assert_eq!(small.category, AnomalyCategory::Surge);
        assert_eq!(large.category, AnomalyCategory::Surge);
        assert!(large.priority_score > small.priority_score);
    }

    #[test]
    fn history_is_bounded() {
        let mut config = AnomalyConfig::default();
        config.history_cap = 4;
        let mut engine = AnomalyEngine::new(config);
        for step in 0..10 {
            let freq = 100.0e6 + step as f64 * 10.0e6;
            assert!(engine.observe(&sample(freq, -50.0, step as f64)).is_some());
        }
        assert_eq!(engine.history().count(), 4);
    }
}
