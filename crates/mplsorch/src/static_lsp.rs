//! Static LSP configuration store.
//!
//! Holds administrator-configured label bindings, keyed by incoming label.
//! Each binding owns its outgoing nexthop definitions in configuration
//! order. The store is decoupled from the forwarding table: the two only
//! share the incoming label as a lookup key.

use log::debug;
use std::collections::BTreeMap;

use crate::consistency::{self, Sibling};
use crate::error::{MplsError, Result};
use crate::label::MplsLabel;
use crate::nexthop::NexthopDescriptor;

/// One configured outgoing nexthop of a static binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticNhlfe {
    /// Incoming label of the owning binding (lookup key, not ownership).
    in_label: MplsLabel,
    nexthop: NexthopDescriptor,
    out_label: MplsLabel,
}

impl StaticNhlfe {
    fn new(in_label: MplsLabel, nexthop: NexthopDescriptor, out_label: MplsLabel) -> Self {
        Self {
            in_label,
            nexthop,
            out_label,
        }
    }

    /// Returns the incoming label of the owning binding.
    pub fn in_label(&self) -> MplsLabel {
        self.in_label
    }

    /// Returns the nexthop.
    pub fn nexthop(&self) -> &NexthopDescriptor {
        &self.nexthop
    }

    /// Returns the outgoing label.
    pub fn out_label(&self) -> MplsLabel {
        self.out_label
    }

    fn as_sibling(&self) -> Sibling {
        Sibling {
            out_label: self.out_label,
            family: self.nexthop.family(),
        }
    }
}

/// A static binding: incoming label plus its outgoing definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticLsp {
    in_label: MplsLabel,
    nhlfes: Vec<StaticNhlfe>,
}

impl StaticLsp {
    fn new(in_label: MplsLabel) -> Self {
        Self {
            in_label,
            nhlfes: Vec::new(),
        }
    }

    /// Returns the incoming label.
    pub fn in_label(&self) -> MplsLabel {
        self.in_label
    }

    /// Returns the outgoing definitions in configuration order.
    pub fn nhlfes(&self) -> &[StaticNhlfe] {
        &self.nhlfes
    }

    /// Finds the definition for a nexthop.
    pub fn find(&self, nexthop: &NexthopDescriptor) -> Option<&StaticNhlfe> {
        self.nhlfes.iter().find(|n| &n.nexthop == nexthop)
    }

    fn position(&self, nexthop: &NexthopDescriptor) -> Option<usize> {
        self.nhlfes.iter().position(|n| &n.nexthop == nexthop)
    }

    fn siblings_of<'a>(
        &'a self,
        nexthop: &'a NexthopDescriptor,
    ) -> impl Iterator<Item = Sibling> + 'a {
        self.nhlfes
            .iter()
            .filter(move |n| &n.nexthop != nexthop)
            .map(StaticNhlfe::as_sibling)
    }
}

/// Outcome of adding a static definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticChange {
    /// A new definition was appended.
    Added,
    /// An existing definition's out label was rewritten.
    Updated,
    /// The definition already existed with the same out label.
    Unchanged,
}

/// Static LSP table for one VRF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticLspTable {
    lsps: BTreeMap<MplsLabel, StaticLsp>,
}

impl StaticLspTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of bindings.
    pub fn len(&self) -> usize {
        self.lsps.len()
    }

    /// Returns true if no bindings are configured.
    pub fn is_empty(&self) -> bool {
        self.lsps.is_empty()
    }

    /// Returns the binding for an incoming label.
    pub fn get(&self, in_label: MplsLabel) -> Option<&StaticLsp> {
        self.lsps.get(&in_label)
    }

    /// Iterates bindings in incoming label order.
    pub fn iter(&self) -> impl Iterator<Item = &StaticLsp> {
        self.lsps.values()
    }

    /// Checks whether adding `(out_label, nexthop)` to `in_label` keeps the
    /// binding consistent. Does not mutate.
    pub fn check(
        &self,
        in_label: MplsLabel,
        out_label: MplsLabel,
        nexthop: &NexthopDescriptor,
    ) -> Result<()> {
        nexthop.validate()?;
        match self.lsps.get(&in_label) {
            None => Ok(()),
            Some(slsp) => consistency::check_siblings(
                in_label,
                out_label,
                nexthop.family(),
                slsp.siblings_of(nexthop),
            ),
        }
    }

    /// Adds a definition, or updates the out label of an existing one.
    ///
    /// The consistency check runs first; on failure nothing is modified.
    pub fn add(
        &mut self,
        in_label: MplsLabel,
        out_label: MplsLabel,
        nexthop: &NexthopDescriptor,
    ) -> Result<StaticChange> {
        self.check(in_label, out_label, nexthop)?;

        let slsp = self
            .lsps
            .entry(in_label)
            .or_insert_with(|| StaticLsp::new(in_label));

        match slsp.position(nexthop) {
            Some(idx) => {
                let snhlfe = &mut slsp.nhlfes[idx];
                if snhlfe.out_label == out_label {
                    return Ok(StaticChange::Unchanged);
                }
                debug!(
                    "Static LSP {}: out-label via {} {} -> {}",
                    in_label, nexthop, snhlfe.out_label, out_label
                );
                snhlfe.out_label = out_label;
                Ok(StaticChange::Updated)
            }
            None => {
                slsp.nhlfes
                    .push(StaticNhlfe::new(in_label, nexthop.clone(), out_label));
                debug!("Static LSP {}: added {} via {}", in_label, out_label, nexthop);
                Ok(StaticChange::Added)
            }
        }
    }

    /// Removes one definition. Removing the last one removes the binding.
    pub fn remove(
        &mut self,
        in_label: MplsLabel,
        nexthop: &NexthopDescriptor,
    ) -> Result<StaticNhlfe> {
        let not_found = || MplsError::BindingNotFound {
            in_label,
            nexthop: nexthop.to_string(),
        };

        let slsp = self.lsps.get_mut(&in_label).ok_or_else(not_found)?;
        let idx = slsp.position(nexthop).ok_or_else(not_found)?;
        let removed = slsp.nhlfes.remove(idx);

        if slsp.nhlfes.is_empty() {
            self.lsps.remove(&in_label);
            debug!("Static LSP {}: last nexthop removed, binding deleted", in_label);
        }

        Ok(removed)
    }
}
