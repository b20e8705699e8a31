//! Ordered chain of dependent selections.
//!
//! Each field may only hold a value while every earlier field holds one.
//! Option-backed fields load their candidates from the values above them;
//! any change upstream clears the field, its candidates and everything
//! below it. Refresh results are tagged with the upstream key and a
//! per-field sequence number so that only the latest request for the
//! current key is ever applied.

use std::{fmt, marker::PhantomData};

use serde::{Deserialize, Serialize};

use crate::error::SelectionError;

pub trait ChainField: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const ORDER: &'static [Self];

    fn index(self) -> usize;

    fn label(self) -> &'static str;

    fn is_required(self) -> bool {
        true
    }

    fn has_options(self) -> bool {
        false
    }

    fn validate(self, _value: &str) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionItem {
    pub value: String,
    pub label: String,
}

impl OptionItem {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPhase {
    Empty,
    Loading,
    Ready,
    Selected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket<F> {
    pub field: F,
    /// Values of every earlier field at the time the request was issued.
    pub upstream: Vec<String>,
    seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { candidates: usize },
    Failed { reason: String },
    Stale,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    value: Option<String>,
    options: Option<Vec<OptionItem>>,
    loading: bool,
    seq: u64,
}

#[derive(Debug, Clone)]
pub struct SelectionChain<F: ChainField> {
    slots: Vec<Slot>,
    next_seq: u64,
    _field: PhantomData<F>,
}

impl<F: ChainField> Default for SelectionChain<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ChainField> SelectionChain<F> {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::default(); F::ORDER.len()],
            next_seq: 0,
            _field: PhantomData,
        }
    }

    pub fn value(&self, field: F) -> Option<&str> {
        self.slots[field.index()].value.as_deref()
    }

    pub fn options(&self, field: F) -> &[OptionItem] {
        self.slots[field.index()].options.as_deref().unwrap_or_default()
    }

    pub fn is_loading(&self, field: F) -> bool {
        self.slots[field.index()].loading
    }

    pub fn phase(&self, field: F) -> FieldPhase {
        let slot = &self.slots[field.index()];
        if slot.value.is_some() {
            FieldPhase::Selected
        } else if slot.loading {
            FieldPhase::Loading
        } else if slot.options.is_some() {
            FieldPhase::Ready
        } else {
            FieldPhase::Empty
        }
    }

    /// Stores `value` (blank input clears the field) and clears every
    /// downstream field. Returns the downstream fields that lost state.
    pub fn set(&mut self, field: F, value: Option<String>) -> Result<Vec<F>, SelectionError> {
        let value = value
            .map(|raw| raw.trim().to_string())
            .filter(|v| !v.is_empty());

        if let Some(candidate) = value.as_deref() {
            if let Some(missing) = self.first_empty_before(field) {
                return Err(SelectionError::UpstreamEmpty {
                    field: field.label(),
                    missing: missing.label(),
                });
            }
            field
                .validate(candidate)
                .map_err(|reason| SelectionError::InvalidValue {
                    field: field.label(),
                    reason,
                })?;
            if field.has_options() {
                let slot = &self.slots[field.index()];
                if slot.loading {
                    return Err(SelectionError::OptionsLoading {
                        field: field.label(),
                    });
                }
                let offered = self.options(field).iter().any(|o| o.value == candidate);
                if !offered {
                    return Err(SelectionError::NotAnOption {
                        field: field.label(),
                        value: candidate.to_string(),
                    });
                }
            }
        }

        self.slots[field.index()].value = value;
        Ok(self.clear_downstream(field))
    }

    /// Marks `field` as loading and returns the ticket its result must be
    /// applied with. The field's previous candidates and value are dropped.
    pub fn begin_refresh(&mut self, field: F) -> Result<RefreshTicket<F>, SelectionError> {
        if !field.has_options() {
            return Err(SelectionError::NoOptionSource {
                field: field.label(),
            });
        }
        if let Some(missing) = self.first_empty_before(field) {
            return Err(SelectionError::UpstreamEmpty {
                field: field.label(),
                missing: missing.label(),
            });
        }

        let upstream = self.upstream_values(field).unwrap_or_default();
        let seq = self.bump_seq();
        let slot = &mut self.slots[field.index()];
        slot.value = None;
        slot.options = None;
        slot.loading = true;
        slot.seq = seq;
        self.clear_downstream(field);

        Ok(RefreshTicket {
            field,
            upstream,
            seq,
        })
    }

    /// Applies a refresh result if the ticket is still the latest request
    /// for its field and the upstream values have not moved since.
    pub fn complete_refresh(
        &mut self,
        ticket: &RefreshTicket<F>,
        result: Result<Vec<OptionItem>, String>,
    ) -> RefreshOutcome {
        let current_upstream = self.upstream_values(ticket.field);
        let slot = &mut self.slots[ticket.field.index()];
        if slot.seq != ticket.seq || current_upstream.as_ref() != Some(&ticket.upstream) {
            return RefreshOutcome::Stale;
        }

        slot.loading = false;
        match result {
            Ok(items) => {
                let candidates = items.len();
                slot.options = Some(items);
                RefreshOutcome::Applied { candidates }
            }
            Err(reason) => {
                slot.options = None;
                RefreshOutcome::Failed { reason }
            }
        }
    }

    pub fn current_step(&self) -> usize {
        F::ORDER
            .iter()
            .position(|f| self.slots[f.index()].value.is_none())
            .unwrap_or(F::ORDER.len())
    }

    pub fn missing_required(&self) -> Vec<F> {
        F::ORDER
            .iter()
            .copied()
            .filter(|f| f.is_required() && self.slots[f.index()].value.is_none())
            .collect()
    }

    pub fn upstream_values(&self, field: F) -> Option<Vec<String>> {
        F::ORDER[..field.index()]
            .iter()
            .map(|f| self.slots[f.index()].value.clone())
            .collect()
    }

    pub fn is_consistent(&self) -> bool {
        let mut seen_empty = false;
        for field in F::ORDER {
            let slot = &self.slots[field.index()];
            if slot.value.is_none() {
                seen_empty = true;
            } else if seen_empty {
                return false;
            }
        }
        true
    }

    fn first_empty_before(&self, field: F) -> Option<F> {
        F::ORDER[..field.index()]
            .iter()
            .copied()
            .find(|f| self.slots[f.index()].value.is_none())
    }

    fn clear_downstream(&mut self, field: F) -> Vec<F> {
        let mut cleared = Vec::new();
        for &later in &F::ORDER[field.index() + 1..] {
            let seq = self.bump_seq();
            let slot = &mut self.slots[later.index()];
            let had_state = slot.value.is_some() || slot.options.is_some() || slot.loading;
            slot.value = None;
            slot.options = None;
            slot.loading = false;
            slot.seq = seq;
            if had_state {
                cleared.push(later);
            }
        }
        cleared
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[cfg(test)]
#[path = "tests/chain_tests.rs"]
mod tests;
