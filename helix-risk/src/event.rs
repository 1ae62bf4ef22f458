use chrono::{DateTime, Utc};
use helix_instrument::symbol::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single entry in the risk event journal (spec §4.C risk report).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskEvent {
    pub at: DateTime<Utc>,
    pub kind: RiskEventKind,
    pub symbol: Option<Symbol>,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum RiskEventKind {
    OrderRejected,
    RiskWarning,
    PositionClosed,
}

const JOURNAL_CAP: usize = 1000;
const JOURNAL_TRIM_TO: usize = 500;

/// Bounded event journal: grows up to [`JOURNAL_CAP`] entries, then drops the oldest half in
/// one pass rather than evicting one-at-a-time (matches the original risk manager's
/// `risk_events = risk_events[-500:]` behaviour).
#[derive(Debug, Default, Clone)]
pub struct RiskEventJournal {
    events: VecDeque<RiskEvent>,
}

impl RiskEventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: RiskEvent) {
        self.events.push_back(event);
        if self.events.len() > JOURNAL_CAP {
            let excess = self.events.len() - JOURNAL_TRIM_TO;
            self.events.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn recent(&self, count: usize) -> Vec<&RiskEvent> {
        self.events.iter().rev().take(count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> RiskEvent {
        RiskEvent { at: Utc::now(), kind: RiskEventKind::RiskWarning, symbol: None, detail: "x".into() }
    }

    #[test]
    fn trims_to_half_once_over_cap() {
        let mut journal = RiskEventJournal::new();
        for _ in 0..1001 {
            journal.record(event());
        }
        assert_eq!(journal.len(), JOURNAL_TRIM_TO);
    }
}
