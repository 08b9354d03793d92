//! Sequential provider selection

use std::sync::Arc;

use crate::domain::Notification;
use crate::error::{KuryrError, Result};
use crate::provider::{ProviderDriver, Selector, SelectorBuilder};

/// Walks the candidate list in binding order.
pub struct SeqSelector {
    index: usize,
    providers: Vec<Arc<dyn ProviderDriver>>,
}

impl Selector for SeqSelector {
    fn next(&mut self, _n: &Notification) -> Result<Arc<dyn ProviderDriver>> {
        if self.index == self.providers.len() {
            return Err(KuryrError::record_not_found("no available provider"));
        }
        let provider = self.providers[self.index].clone();
        self.index += 1;
        Ok(provider)
    }
}

#[derive(Clone)]
pub struct SeqSelectorBuilder {
    providers: Vec<Arc<dyn ProviderDriver>>,
}

impl SeqSelectorBuilder {
    pub fn new(providers: Vec<Arc<dyn ProviderDriver>>) -> Self {
        Self { providers }
    }
}

impl SelectorBuilder for SeqSelectorBuilder {
    fn build(&self) -> Result<Box<dyn Selector>> {
        Ok(Box::new(SeqSelector { index: 0, providers: self.providers.clone() }))
    }
}
