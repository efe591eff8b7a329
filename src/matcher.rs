use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::config::MatcherConfig;

/// Which phrase families were found in a page. Groups are independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSignals {
    pub buy: bool,
    pub sold_out: bool,
    pub waitlist: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buyable,
    SoldOut,
    WaitlistOnly,
    Indeterminate,
}

impl MatchSignals {
    /// Collapse the independent groups into one signal. Any negative phrasing
    /// outranks buy phrasing.
    pub fn signal(&self) -> Signal {
        if self.sold_out {
            Signal::SoldOut
        } else if self.waitlist {
            Signal::WaitlistOnly
        } else if self.buy {
            Signal::Buyable
        } else {
            Signal::Indeterminate
        }
    }
}

/// One phrase family compiled to a single case-insensitive alternation.
#[derive(Debug, Clone)]
pub struct PhraseGroup {
    regex: Regex,
}

impl PhraseGroup {
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Result<Self> {
        let alternatives: Vec<String> = phrases
            .iter()
            .map(|p| phrase_pattern(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();

        // An empty group must never match; no position is both a boundary and not
        let pattern = if alternatives.is_empty() {
            r"\b\B".to_string()
        } else {
            format!("(?:{})", alternatives.join("|"))
        };

        let regex = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, content: &str) -> bool {
        self.regex.is_match(content)
    }

    pub fn as_regex(&self) -> &Regex {
        &self.regex
    }
}

/// "Add to Cart" -> `Add[\s\-_]+to[\s\-_]+Cart`, so hyphen and spacing
/// variants match too.
fn phrase_pattern(phrase: &str) -> String {
    phrase
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[\s\-_]+")
}

#[derive(Debug, Clone)]
pub struct TextMatcher {
    buy: PhraseGroup,
    sold_out: PhraseGroup,
    waitlist: PhraseGroup,
}

impl TextMatcher {
    pub fn new(config: &MatcherConfig) -> Result<Self> {
        Ok(Self {
            buy: PhraseGroup::new(&config.buy_phrases)?,
            sold_out: PhraseGroup::new(&config.sold_out_phrases)?,
            waitlist: PhraseGroup::new(&config.waitlist_phrases)?,
        })
    }

    /// Scan the whole document; no structural parsing.
    pub fn scan(&self, content: &str) -> MatchSignals {
        MatchSignals {
            buy: self.buy.is_match(content),
            sold_out: self.sold_out.is_match(content),
            waitlist: self.waitlist.is_match(content),
        }
    }
}
