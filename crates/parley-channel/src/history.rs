//! Bounded, serially numbered message log.

use std::collections::VecDeque;

use parley_core::Payload;
use serde_json::Value;
use tracing::debug;

/// A persisted message: payload plus the serial and timestamp it was
/// broadcast with.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRecord {
    /// Position in the log, assigned once.
    pub serial: u64,
    /// Unix milliseconds.
    pub timestamp: i64,
    /// Message fields as persisted.
    pub payload: Payload,
}

impl HistoryRecord {
    /// Client-facing form, as it appears inside a `history` reply.
    pub fn to_wire(&self) -> Value {
        let mut map = self.payload.as_map().clone();
        let _ = map.insert("_serial".into(), Value::from(self.serial));
        let _ = map.insert("_time".into(), Value::from(self.timestamp));
        Value::Object(map)
    }
}

/// Append log that trims in bulk once it grows past `max_len`.
///
/// Serials start at 1 and are never reused, including after a trim.
#[derive(Debug)]
pub struct HistoryLog {
    records: VecDeque<HistoryRecord>,
    last_serial: u64,
    max_len: usize,
    retain_ratio: f64,
}

impl HistoryLog {
    /// Empty log holding at most `max_len` records.
    pub fn new(max_len: usize, retain_ratio: f64) -> Self {
        Self {
            records: VecDeque::with_capacity(max_len.saturating_add(1)),
            last_serial: 0,
            max_len,
            retain_ratio,
        }
    }

    /// Store a payload under the next serial, then enforce the cap.
    pub fn append(&mut self, timestamp: i64, payload: Payload) -> u64 {
        self.last_serial += 1;
        self.records.push_back(HistoryRecord {
            serial: self.last_serial,
            timestamp,
            payload,
        });
        let _ = self.enforce_cap();
        self.last_serial
    }

    /// Once longer than the cap, keep only the newest
    /// `ceil(max_len * retain_ratio)` records. Returns how many were dropped.
    pub fn enforce_cap(&mut self) -> usize {
        if self.records.len() <= self.max_len {
            return 0;
        }
        let keep = self.retained_len();
        let evicted = self.records.len() - keep;
        drop(self.records.drain(..evicted));
        debug!(evicted, kept = keep, last_serial = self.last_serial, "history trimmed");
        evicted
    }

    /// Length the log is cut back to on overflow.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    /// Records kept after a trim: `ceil(max_len * retain_ratio)`, at least one.
    pub fn retained_len(&self) -> usize {
        let keep = (self.max_len as f64 * self.retain_ratio).ceil() as usize;
        keep.clamp(1, self.max_len.max(1))
    }

    /// Records with `first <= serial <= last`, oldest first.
    pub fn retrieve(&self, first: u64, last: u64) -> Vec<&HistoryRecord> {
        self.records
            .iter()
            .filter(|r| r.serial >= first && r.serial <= last)
            .collect()
    }

    /// Serial of the most recent append (`0` before any).
    pub fn last_serial(&self) -> u64 {
        self.last_serial
    }

    /// Records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(log: &mut HistoryLog, n: u64) {
        for i in 1..=n {
            let _ = log.append(i64::try_from(i).unwrap() * 100, Payload::text(format!("m{i}")));
        }
    }

    #[test]
    fn serials_start_at_one() {
        let mut log = HistoryLog::new(50, 0.7);
        assert_eq!(log.last_serial(), 0);
        assert_eq!(log.append(0, Payload::text("a")), 1);
        assert_eq!(log.append(0, Payload::text("b")), 2);
        assert_eq!(log.last_serial(), 2);
    }

    #[test]
    fn at_cap_nothing_is_trimmed() {
        let mut log = HistoryLog::new(50, 0.7);
        fill(&mut log, 50);
        assert_eq!(log.len(), 50);
    }

    #[test]
    fn overflow_trims_to_seventy_percent() {
        let mut log = HistoryLog::new(50, 0.7);
        fill(&mut log, 51);
        assert_eq!(log.len(), 35);
        let serials: Vec<u64> = log.retrieve(0, u64::MAX).iter().map(|r| r.serial).collect();
        assert_eq!(serials, (17..=51).collect::<Vec<_>>());
    }

    #[test]
    fn serials_never_reused_across_trims() {
        let mut log = HistoryLog::new(5, 0.7);
        let mut previous = 0;
        for i in 0..100 {
            let serial = log.append(i, Payload::new());
            assert!(serial > previous);
            previous = serial;
            assert!(log.len() <= 5);
        }
        let kept: Vec<u64> = log.retrieve(0, u64::MAX).iter().map(|r| r.serial).collect();
        assert!(kept.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(kept.last(), Some(&100));
    }

    #[test]
    fn retrieve_is_inclusive() {
        let mut log = HistoryLog::new(50, 0.7);
        fill(&mut log, 10);
        let got: Vec<u64> = log.retrieve(3, 5).iter().map(|r| r.serial).collect();
        assert_eq!(got, vec![3, 4, 5]);
        assert!(log.retrieve(11, 20).is_empty());
        assert!(log.retrieve(5, 3).is_empty());
    }

    #[test]
    fn record_wire_form() {
        let mut log = HistoryLog::new(50, 0.7);
        let _ = log.append(1_700, Payload::text("hi").with("name", "Alice"));
        let wire = log.retrieve(0, u64::MAX)[0].to_wire();
        assert_eq!(
            wire,
            serde_json::json!({"text": "hi", "name": "Alice", "_serial": 1, "_time": 1_700})
        );
    }

    #[test]
    fn retained_len_never_zero() {
        assert_eq!(HistoryLog::new(1, 0.1).retained_len(), 1);
        assert_eq!(HistoryLog::new(10, 1.0).retained_len(), 10);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn serials_increase_and_trim_keeps_newest(cap in 1usize..80, appends in 0u64..300) {
                let mut log = HistoryLog::new(cap, 0.7);
                let retained = (cap * 7).div_ceil(10);
                let mut previous = 0;
                for i in 1..=appends {
                    let before = log.len();
                    let serial = log.append(0, Payload::new());
                    prop_assert!(serial > previous);
                    prop_assert_eq!(serial, i);
                    previous = serial;

                    if before + 1 > cap {
                        prop_assert_eq!(log.len(), retained);
                    } else {
                        prop_assert_eq!(log.len(), before + 1);
                    }
                    let kept: Vec<u64> =
                        log.retrieve(0, u64::MAX).iter().map(|r| r.serial).collect();
                    let newest: Vec<u64> = (serial + 1 - kept.len() as u64..=serial).collect();
                    prop_assert_eq!(kept, newest);
                }
            }
        }
    }
}
