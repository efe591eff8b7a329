use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Result;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// false -> true. The only edge that notifies.
    Rising,
    /// true -> false. Re-arms the product.
    Falling,
    Steady,
}

impl Transition {
    pub fn should_notify(&self) -> bool {
        matches!(self, Transition::Rising)
    }
}

/// Last known in-stock flag per product.
///
/// The key set is fixed at construction; every product starts out of stock
/// and nothing survives a restart.
#[derive(Debug, Clone)]
pub struct TransitionTracker {
    order: Vec<String>,
    states: HashMap<String, bool>,
}

impl TransitionTracker {
    pub fn new<I, S>(products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Vec::new();
        let mut states = HashMap::new();
        for product in products {
            let url = product.into();
            if states.insert(url.clone(), false).is_none() {
                order.push(url);
            }
        }
        Self { order, states }
    }

    /// Store the verdict and report which edge it was.
    pub fn record(&mut self, url: &str, in_stock: bool) -> Result<Transition> {
        let previous = self.states.get_mut(url).ok_or_else(|| AppError::UnknownProduct {
            url: url.to_string(),
        })?;

        let transition = match (*previous, in_stock) {
            (false, true) => Transition::Rising,
            (true, false) => Transition::Falling,
            _ => Transition::Steady,
        };
        *previous = in_stock;
        Ok(transition)
    }

    pub fn get(&self, url: &str) -> Option<bool> {
        self.states.get(url).copied()
    }

    /// Forget everything, as a process restart would.
    pub fn reset(&mut self) {
        for state in self.states.values_mut() {
            *state = false;
        }
    }

    pub fn snapshot(&self) -> Vec<(String, bool)> {
        self.order
            .iter()
            .map(|url| (url.clone(), self.states.get(url).copied().unwrap_or(false)))
            .collect()
    }

    pub fn in_stock_count(&self) -> usize {
        self.states.values().filter(|s| **s).count()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
