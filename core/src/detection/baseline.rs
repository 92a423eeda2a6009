//! Long-lived RF baseline. Power per frequency bin, learned as an
//! exponential moving average and aged out after the retention window.

use std::collections::HashMap;

/// Learned state for one frequency bin.
#[derive(Debug, Clone)]
pub struct BaselineEntry {
    pub mean_power_dbm: f64,
    pub last_seen: f64,
    pub seen_count: u64,
}

pub struct BaselineMap {
    entries: HashMap<i64, BaselineEntry>,
    bin_hz: f64,
    ema_weight: f64,
    retention_s: f64,
}

impl BaselineMap {
    pub fn new(bin_hz: f64, ema_weight: f64, retention_s: f64) -> Self {
        Self {
            entries: HashMap::new(),
            bin_hz,
            ema_weight,
            retention_s,
        }
    }

    /// Bin index for a frequency; observations quantize to bin centers.
    pub fn bin(&self, frequency_hz: f64) -> i64 {
        (frequency_hz / self.bin_hz).round() as i64
    }

    /// Current baseline for a frequency, with stale entries evicted first so
    /// a long-silent bin reads as never seen.
    pub fn lookup(&mut self, frequency_hz: f64, now: f64) -> Option<BaselineEntry> {
        let bin = self.bin(frequency_hz);
        if let Some(entry) = self.entries.get(&bin) {
            if now - entry.last_seen > self.retention_s {
                self.entries.remove(&bin);
                return None;
            }
        }
        self.entries.get(&bin).cloned()
    }

    /// Fold one observation into the bin's moving average.
    pub fn update(&mut self, frequency_hz: f64, power_dbm: f64, now: f64) {
        let weight = self.ema_weight;
        let bin = self.bin(frequency_hz);
        self.entries
            .entry(bin)
            .and_modify(|entry| {
                entry.mean_power_dbm =
                    (1.0 - weight) * entry.mean_power_dbm + weight * power_dbm;
                entry.last_seen = now;
                entry.seen_count += 1;
            })
            .or_insert(BaselineEntry {
                mean_power_dbm: power_dbm,
                last_seen: now,
                seen_count: 1,
            });
    }

    /// Drop every bin unseen for longer than the retention window.
    pub fn evict_stale(&mut self, now: f64) {
        let retention = self.retention_s;
        self.entries
            .retain(|_, entry| now - entry.last_seen <= retention);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_seeds_the_mean() {
        let mut map = BaselineMap::new(10_000.0, 0.1, 3600.0);
        map.update(146.0e6, -80.0, 0.0);
        let entry = map.lookup(146.0e6, 1.0).unwrap();
        assert_eq!(entry.mean_power_dbm, -80.0);
        assert_eq!(entry.seen_count, 1);
    }

    #[test]
    fn ema_moves_a_tenth_of_the_way() {
        let mut map = BaselineMap::new(10_000.0, 0.1, 3600.0);
        map.update(146.0e6, -80.0, 0.0);
        map.update(146.0e6, -70.0, 1.0);
        let entry = map.lookup(146.0e6, 2.0).unwrap();
        assert!((entry.mean_power_dbm + 79.0).abs() < 1e-9);
    }

    #[test]
    fn nearby_frequencies_share_a_bin() {
        let mut map = BaselineMap::new(10_000.0, 0.1, 3600.0);
        map.update(146.000_0e6, -80.0, 0.0);
        assert!(map.lookup(146.004_0e6, 1.0).is_some());
        assert!(map.lookup(146.020_0e6, 1.0).is_none());
    }

    #[test]
    fn stale_entries_age_out() {
        let mut map = BaselineMap::new(10_000.0, 0.1, 100.0);
        map.update(146.0e6, -80.0, 0.0);
        assert!(map.lookup(146.0e6, 50.0).is_some());
        assert!(map.lookup(146.0e6, 200.0).is_none());
        assert!(map.is_empty());
    }
}
