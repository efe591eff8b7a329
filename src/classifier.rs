use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fetcher::{ControlState, PageContent};
use crate::matcher::{MatchSignals, Signal, TextMatcher};

/// Why a page was judged out of stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    SoldOut,
    Waitlist,
    NoPositiveSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    InStock,
    /// Maybe in stock. Never triggers a notification on its own.
    Candidate,
    OutOfStock(Reason),
}

impl Verdict {
    pub fn in_stock(&self) -> bool {
        matches!(self, Verdict::InStock)
    }

    pub fn is_candidate(&self) -> bool {
        matches!(self, Verdict::Candidate)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::InStock => write!(f, "in stock"),
            Verdict::Candidate => write!(f, "candidate"),
            Verdict::OutOfStock(reason) => write!(f, "not in stock ({:?})", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StockClassifier {
    matcher: TextMatcher,
}

impl StockClassifier {
    pub fn new(matcher: TextMatcher) -> Self {
        Self { matcher }
    }

    pub fn classify(&self, content: &PageContent) -> Verdict {
        let signals = self.matcher.scan(content.html());
        match content {
            PageContent::Rendered { buy_control, .. } => Self::resolve(*buy_control, signals),
            PageContent::Cheap { .. } => Self::screen(signals),
        }
    }

    /// Full precedence for a rendered page: actionable control, then sold-out
    /// phrasing, then waitlist phrasing, otherwise closed.
    pub fn resolve(control: ControlState, signals: MatchSignals) -> Verdict {
        if control.is_actionable() {
            return Verdict::InStock;
        }
        match signals.signal() {
            Signal::SoldOut => Verdict::OutOfStock(Reason::SoldOut),
            Signal::WaitlistOnly => Verdict::OutOfStock(Reason::Waitlist),
            // Buy text without a live control is not enough
            Signal::Buyable | Signal::Indeterminate => Verdict::OutOfStock(Reason::NoPositiveSignal),
        }
    }

    /// Text-only rule for static HTML. Buy phrasing can only nominate a candidate.
    pub fn screen(signals: MatchSignals) -> Verdict {
        match signals.signal() {
            Signal::SoldOut => Verdict::OutOfStock(Reason::SoldOut),
            Signal::WaitlistOnly => Verdict::OutOfStock(Reason::Waitlist),
            Signal::Buyable => Verdict::Candidate,
            Signal::Indeterminate => Verdict::OutOfStock(Reason::NoPositiveSignal),
        }
    }
}
