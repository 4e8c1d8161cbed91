/// Token state tracking and bonding-curve signal classification
///
/// The tracker is owned by the single sequential consumer, so it holds no
/// locks. Entries are kept in insertion order so the sweep can drop the
/// oldest batch without scanning timestamps.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::TrackerSettings;
use crate::core::types::{EventKind, LaunchEvent, PendingSignal, SignalType};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTokenState {
    pub address: String,
    pub last_bonding_percent: f64,
    pub pre_graduation_signaled: bool,
    pub first_seen_at: DateTime<Utc>,
    /// Position in insertion order, used to recognise stale order entries
    sequence: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub tracked: usize,
    pub created_seen: u64,
    pub trades_seen: u64,
    pub graduations_seen: u64,
    pub pre_graduation_signals: u64,
    pub post_graduation_signals: u64,
    pub evicted: u64,
}

pub struct TokenStateTracker {
    min_percent: f64,
    max_percent: f64,
    high_water_mark: usize,
    eviction_batch: usize,
    tokens: HashMap<String, TrackedTokenState>,
    insertion_order: VecDeque<(u64, String)>,
    next_sequence: u64,
    stats: TrackerStats,
}

impl TokenStateTracker {
    pub fn new(settings: &TrackerSettings) -> Self {
        info!(
            "🧠 Token tracker window {:.0}-{:.0}%, high water mark {}, eviction batch {}",
            settings.pre_graduation_min_percent,
            settings.pre_graduation_max_percent,
            settings.high_water_mark,
            settings.eviction_batch
        );

        Self {
            min_percent: settings.pre_graduation_min_percent,
            max_percent: settings.pre_graduation_max_percent,
            high_water_mark: settings.high_water_mark,
            eviction_batch: settings.eviction_batch,
            tokens: HashMap::new(),
            insertion_order: VecDeque::new(),
            next_sequence: 0,
            stats: TrackerStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&TrackedTokenState> {
        self.tokens.get(address)
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            tracked: self.tokens.len(),
            ..self.stats.clone()
        }
    }

    /// Classifies one event. Must be called in delivery order.
    pub fn observe(&mut self, event: LaunchEvent) -> Option<PendingSignal> {
        match event.kind {
            EventKind::Created => {
                self.stats.created_seen += 1;
                debug!(token = %event.token_address, "Token created");
                None
            }
            EventKind::Trade => {
                self.stats.trades_seen += 1;
                self.observe_trade(event)
            }
            EventKind::Graduated => {
                self.stats.graduations_seen += 1;
                if self.tokens.remove(&event.token_address).is_some() {
                    debug!(token = %event.token_address, "Stopped tracking graduated token");
                }
                self.stats.post_graduation_signals += 1;
                Some(PendingSignal {
                    signal_type: SignalType::PostGraduation,
                    event,
                })
            }
        }
    }

    fn observe_trade(&mut self, event: LaunchEvent) -> Option<PendingSignal> {
        let pct = event.bonding_curve_percent;
        let in_window = pct >= self.min_percent && pct <= self.max_percent;

        match self.tokens.get_mut(&event.token_address) {
            Some(state) => {
                state.last_bonding_percent = pct;
                if !in_window || state.pre_graduation_signaled {
                    return None;
                }
                state.pre_graduation_signaled = true;
            }
            None => {
                if !in_window {
                    return None;
                }
                self.insert(&event.token_address, pct);
            }
        }

        self.stats.pre_graduation_signals += 1;
        debug!(token = %event.token_address, percent = pct, "Pre-graduation window reached");
        Some(PendingSignal {
            signal_type: SignalType::PreGraduation,
            event,
        })
    }

    fn insert(&mut self, address: &str, pct: f64) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.compact_order();
        self.tokens.insert(
            address.to_string(),
            TrackedTokenState {
                address: address.to_string(),
                last_bonding_percent: pct,
                pre_graduation_signaled: true,
                first_seen_at: Utc::now(),
                sequence,
            },
        );
        self.insertion_order.push_back((sequence, address.to_string()));

        // Bounded at insert time so a frame backlog cannot outrun the sweep
        self.evict_over_high_water();
    }

    /// Periodic maintenance: compacts the order queue and drops the oldest
    /// `eviction_batch` entries while the table holds more than
    /// `high_water_mark` tokens. Graduation status and recency of updates are
    /// not considered, so an evicted token that trades in the window again is
    /// signaled again. Returns the number evicted.
    pub fn sweep(&mut self) -> usize {
        self.compact_order();
        self.evict_over_high_water()
    }

    fn evict_over_high_water(&mut self) -> usize {
        let mut evicted = 0;
        while self.tokens.len() > self.high_water_mark {
            // The newest entry always survives
            let budget = self.eviction_batch.min(self.tokens.len() - 1);
            let batch = self.evict_oldest(budget);
            if batch == 0 {
                break;
            }
            evicted += batch;
        }

        if evicted > 0 {
            self.stats.evicted += evicted as u64;
            info!(
                evicted,
                remaining = self.tokens.len(),
                "🧹 Evicted oldest tracked tokens"
            );
        }
        evicted
    }

    fn evict_oldest(&mut self, budget: usize) -> usize {
        let mut evicted = 0;
        while evicted < budget {
            let Some((sequence, address)) = self.insertion_order.pop_front() else {
                break;
            };
            let live = self
                .tokens
                .get(&address)
                .map_or(false, |state| state.sequence == sequence);
            if live {
                self.tokens.remove(&address);
                evicted += 1;
            }
        }
        evicted
    }

    /// Removes order entries whose token graduated or was re-inserted
    fn compact_order(&mut self) {
        if self.insertion_order.len() <= self.tokens.len() * 2 + 64 {
            return;
        }
        let tokens = &self.tokens;
        self.insertion_order.retain(|(sequence, address)| {
            tokens.get(address).map_or(false, |state| state.sequence == *sequence)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> TokenStateTracker {
        TokenStateTracker::new(&TrackerSettings::default())
    }

    fn small_tracker(high_water_mark: usize, eviction_batch: usize) -> TokenStateTracker {
        TokenStateTracker::new(&TrackerSettings {
            high_water_mark,
            eviction_batch,
            ..Default::default()
        })
    }

    fn trade(address: &str, pct: f64) -> LaunchEvent {
        LaunchEvent::new(EventKind::Trade, address, pct)
    }

    fn graduated(address: &str) -> LaunchEvent {
        LaunchEvent::new(EventKind::Graduated, address, 100.0)
    }

    #[test]
    fn test_single_pre_graduation_signal_across_curve() {
        let mut tracker = tracker();
        let signals: Vec<_> = [10.0, 25.0, 45.0, 55.0, 70.0]
            .into_iter()
            .filter_map(|pct| tracker.observe(trade("MintA", pct)))
            .collect();

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::PreGraduation);
        assert_eq!(signals[0].event.bonding_curve_percent, 45.0);
        assert_eq!(tracker.get("MintA").unwrap().last_bonding_percent, 70.0);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let mut tracker = tracker();
        assert!(tracker.observe(trade("Low", 40.0)).is_some());
        assert!(tracker.observe(trade("High", 60.0)).is_some());
        assert!(tracker.observe(trade("Below", 39.99)).is_none());
        assert!(tracker.observe(trade("Above", 60.01)).is_none());
    }

    #[test]
    fn test_second_in_window_trade_is_noop() {
        let mut tracker = tracker();
        assert!(tracker.observe(trade("MintB", 45.0)).is_some());
        assert!(tracker.observe(trade("MintB", 50.0)).is_none());

        let state = tracker.get("MintB").unwrap();
        assert!(state.pre_graduation_signaled);
        assert_eq!(state.last_bonding_percent, 50.0);
        assert_eq!(tracker.stats().pre_graduation_signals, 1);
    }

    #[test]
    fn test_out_of_window_trade_does_not_create_entry() {
        let mut tracker = tracker();
        assert!(tracker.observe(trade("MintC", 12.0)).is_none());
        assert!(tracker.get("MintC").is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_created_event_is_observational() {
        let mut tracker = tracker();
        assert!(tracker
            .observe(LaunchEvent::new(EventKind::Created, "MintD", 0.0))
            .is_none());
        assert!(tracker.is_empty());
        assert_eq!(tracker.stats().created_seen, 1);
    }

    #[test]
    fn test_graduation_without_prior_tracking_signals() {
        let mut tracker = tracker();
        let signal = tracker.observe(graduated("MintE")).unwrap();
        assert_eq!(signal.signal_type, SignalType::PostGraduation);
        assert_eq!(signal.event.token_address, "MintE");
    }

    #[test]
    fn test_repeated_graduations_pass_through() {
        let mut tracker = tracker();
        assert!(tracker.observe(graduated("MintF")).is_some());
        assert!(tracker.observe(graduated("MintF")).is_some());
        assert_eq!(tracker.stats().post_graduation_signals, 2);
    }

    #[test]
    fn test_graduation_removes_entry_and_rearms() {
        let mut tracker = tracker();
        assert!(tracker.observe(trade("MintG", 45.0)).is_some());
        assert!(tracker.observe(graduated("MintG")).is_some());
        assert!(tracker.get("MintG").is_none());

        let rearmed = tracker.observe(trade("MintG", 45.0)).unwrap();
        assert_eq!(rearmed.signal_type, SignalType::PreGraduation);
    }

    #[test]
    fn test_sweep_below_high_water_mark_is_noop() {
        let mut tracker = small_tracker(10, 5);
        for i in 0..10 {
            tracker.observe(trade(&format!("Mint{i}"), 50.0));
        }
        assert_eq!(tracker.sweep(), 0);
        assert_eq!(tracker.len(), 10);
    }

    #[test]
    fn test_insert_over_high_water_mark_evicts_oldest_batch() {
        let mut tracker = small_tracker(10, 5);
        for i in 0..10 {
            tracker.observe(trade(&format!("Mint{i}"), 50.0));
        }
        // Recent updates do not protect old entries
        tracker.observe(trade("Mint0", 55.0));
        assert_eq!(tracker.len(), 10);

        assert!(tracker.observe(trade("Mint10", 50.0)).is_some());
        assert_eq!(tracker.len(), 6);
        for i in 0..5 {
            assert!(tracker.get(&format!("Mint{i}")).is_none());
        }
        for i in 5..11 {
            assert!(tracker.get(&format!("Mint{i}")).is_some());
        }
        assert_eq!(tracker.stats().evicted, 5);
        assert_eq!(tracker.sweep(), 0);
    }

    #[test]
    fn test_sustained_inserts_never_exceed_high_water_mark() {
        let mut tracker = small_tracker(100, 50);
        for i in 0..10_000 {
            assert!(tracker.observe(trade(&format!("Mint{i}"), 45.0)).is_some());
            assert!(tracker.len() <= 100);
            assert!(tracker.insertion_order.len() <= 2 * tracker.len() + 65);
        }
        // The latest insert is never the one evicted
        assert!(tracker.get("Mint9999").is_some());
        assert!(tracker.stats().evicted >= 9_900);
    }

    #[test]
    fn test_batch_larger_than_table_keeps_newest() {
        let mut tracker = small_tracker(1, 500);
        tracker.observe(trade("A", 45.0));
        tracker.observe(trade("B", 45.0));

        assert_eq!(tracker.len(), 1);
        assert!(tracker.get("B").is_some());
    }

    #[test]
    fn test_eviction_allows_duplicate_pre_graduation_signal() {
        let mut tracker = small_tracker(2, 2);
        for address in ["A", "B", "C"] {
            assert!(tracker.observe(trade(address, 45.0)).is_some());
        }
        assert_eq!(tracker.stats().evicted, 2);

        // "A" was evicted while still on the curve
        assert!(tracker.observe(trade("A", 50.0)).is_some());
        assert!(tracker.observe(trade("C", 50.0)).is_none());
    }

    #[test]
    fn test_eviction_skips_graduated_and_reinserted_entries() {
        let mut tracker = small_tracker(3, 2);
        tracker.observe(trade("A", 45.0));
        tracker.observe(trade("B", 45.0));
        tracker.observe(graduated("A"));
        tracker.observe(trade("A", 45.0)); // re-inserted at the back
        tracker.observe(trade("C", 45.0));
        // Order: A(stale), B, A, C, D
        tracker.observe(trade("D", 45.0));

        assert_eq!(tracker.stats().evicted, 2);
        assert!(tracker.get("B").is_none());
        assert!(tracker.get("A").is_none());
        assert!(tracker.get("C").is_some());
        assert!(tracker.get("D").is_some());
    }

    #[test]
    fn test_order_queue_stays_bounded_under_churn() {
        let mut tracker = small_tracker(1000, 500);
        for i in 0..10_000 {
            let address = format!("Mint{}", i % 3);
            tracker.observe(trade(&address, 45.0));
            tracker.observe(graduated(&address));
        }
        tracker.sweep();
        assert!(tracker.is_empty());
        assert!(tracker.insertion_order.len() <= 64);
    }
}
