//! Comparing local archive iteration versions against target versions

use serde::Serialize;
use std::collections::BTreeMap;

/// An archive that is behind its target iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingArchive {
    /// Archive file name
    pub name: String,
    /// Local iteration version, `None` when the archive is missing or unreadable
    pub current: Option<u32>,
    /// Iteration version the installation should reach
    pub target: u32,
}

/// Result of comparing an installation to a set of targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateCheck {
    /// Versions found in the installation
    pub current: BTreeMap<String, u32>,
    /// Archives below target, ordered by name
    pub pending: Vec<PendingArchive>,
}

impl UpdateCheck {
    /// List every target archive whose local version is lower than its
    /// target or that is absent locally. Local archives without a target are
    /// left alone.
    pub fn compute(current: &BTreeMap<String, u32>, targets: &BTreeMap<String, u32>) -> Self {
        let pending = targets
            .iter()
            .filter_map(|(name, &target)| {
                let local = current.get(name).copied();
                match local {
                    Some(version) if version >= target => None,
                    _ => Some(PendingArchive {
                        name: name.clone(),
                        current: local,
                        target,
                    }),
                }
            })
            .collect();

        Self {
            current: current.clone(),
            pending,
        }
    }

    /// Whether no archive is behind its target
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// Names of archives that are missing entirely
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.pending
            .iter()
            .filter(|p| p.current.is_none())
            .map(|p| p.name.as_str())
    }
}
