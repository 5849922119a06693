//! Per-kind success/failure counters.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

use crate::models::AnnotationKind;

#[derive(Debug, Default)]
struct Counter {
    success: AtomicUsize,
    failure: AtomicUsize,
}

/// Append-only counters, safe to share across tasks.
#[derive(Debug, Default)]
pub struct AnnotationStats {
    counters: [Counter; 4],
}

fn slot(kind: AnnotationKind) -> usize {
    match kind {
        AnnotationKind::Classification => 0,
        AnnotationKind::Keywords => 1,
        AnnotationKind::Labels => 2,
        AnnotationKind::Comments => 3,
    }
}

impl AnnotationStats {
    pub fn record_success(&self, kind: AnnotationKind) {
        self.counters[slot(kind)]
            .success
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: AnnotationKind) {
        self.counters[slot(kind)]
            .failure
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let read = |kind| {
            let c = &self.counters[slot(kind)];
            KindStats {
                success: c.success.load(Ordering::Relaxed),
                failure: c.failure.load(Ordering::Relaxed),
            }
        };
        StatsSnapshot {
            classification: read(AnnotationKind::Classification),
            keywords: read(AnnotationKind::Keywords),
            labels: read(AnnotationKind::Labels),
            comments: read(AnnotationKind::Comments),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub success: usize,
    pub failure: usize,
}

/// Point-in-time copy of [`AnnotationStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub classification: KindStats,
    pub keywords: KindStats,
    pub labels: KindStats,
    pub comments: KindStats,
}

impl StatsSnapshot {
    pub fn get(&self, kind: AnnotationKind) -> KindStats {
        match kind {
            AnnotationKind::Classification => self.classification,
            AnnotationKind::Keywords => self.keywords,
            AnnotationKind::Labels => self.labels,
            AnnotationKind::Comments => self.comments,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = AnnotationKind::ALL
            .iter()
            .map(|&kind| {
                let s = self.get(kind);
                format!("{}: {} ok / {} failed", kind, s.success, s.failure)
            })
            .collect();
        f.write_str(&parts.join(", "))
    }
}
