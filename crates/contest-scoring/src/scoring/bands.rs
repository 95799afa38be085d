use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use super::domain::{BandId, BandKey, BandRef, MedalBand};
use super::error::NotFoundError;

/// An active band whose bounds can never contain an aggregate. It is kept as
/// configured and reported instead of being rejected or corrected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedBandWarning {
    pub key: BandKey,
    pub id: Option<BandId>,
    pub label: String,
    pub min: f64,
    pub max: f64,
}

impl fmt::Display for MalformedBandWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "medal band '{}' ({}) has min {} above max {} and will never match",
            self.label,
            self.id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| self.key.to_string()),
            self.min,
            self.max
        )
    }
}

/// Result of inserting or replacing a band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandUpsert {
    pub key: BandKey,
    pub inserted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<MalformedBandWarning>,
}

/// A band as held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredBand {
    pub key: BandKey,
    pub band: MedalBand,
    /// Local edits not yet confirmed by the band store.
    pub unsaved: bool,
    #[serde(skip)]
    revision: u64,
}

/// Work for a band store synchronisation: bands to save and ids to delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandSyncPlan {
    pub saves: Vec<PendingBand>,
    pub deletions: Vec<BandId>,
}

impl BandSyncPlan {
    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.deletions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingBand {
    pub key: BandKey,
    pub band: MedalBand,
    pub revision: u64,
}

/// Ordered, possibly overlapping medal bands.
///
/// Entries stay in insertion order; replacing a band keeps its position, so a
/// stable sort on `order` resolves ties by insertion.
#[derive(Debug, Default)]
pub struct MedalBandRegistry {
    entries: Vec<RegisteredBand>,
    next_key: u64,
    revision: u64,
    pending_deletions: Vec<BandId>,
}

impl MedalBandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from bands loaded out of the band store. Bands without
    /// an id become drafts.
    pub fn from_persisted(bands: impl IntoIterator<Item = MedalBand>) -> Self {
        let mut registry = Self::new();
        for band in bands {
            let unsaved = band.id.is_none();
            let key = registry.allocate_key();
            let revision = registry.next_revision();
            if let Some(warning) = malformed_warning(key, &band) {
                warn!(%warning, "loaded malformed medal band");
            }
            registry.entries.push(RegisteredBand {
                key,
                band,
                unsaved,
                revision,
            });
        }
        registry
    }

    /// Inserts a draft when `band.id` is absent, otherwise replaces the band
    /// holding that id. Malformed bands are accepted and reported.
    pub fn upsert_band(&mut self, band: MedalBand) -> Result<BandUpsert, NotFoundError> {
        let revision = self.next_revision();
        let (key, inserted) = match &band.id {
            Some(id) => {
                let entry = self
                    .entries
                    .iter_mut()
                    .find(|entry| entry.band.id.as_ref() == Some(id))
                    .ok_or_else(|| NotFoundError::Band(id.clone()))?;
                entry.band = band.clone();
                entry.unsaved = true;
                entry.revision = revision;
                (entry.key, false)
            }
            None => {
                let key = self.allocate_key();
                self.entries.push(RegisteredBand {
                    key,
                    band: band.clone(),
                    unsaved: true,
                    revision,
                });
                (key, true)
            }
        };

        Ok(self.finish_upsert(key, inserted, &band))
    }

    /// Replaces an unsaved draft addressed by its registry key.
    pub fn replace_draft(
        &mut self,
        key: BandKey,
        mut band: MedalBand,
    ) -> Result<BandUpsert, NotFoundError> {
        let revision = self.next_revision();
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.key == key && entry.band.id.is_none())
            .ok_or(NotFoundError::Draft(key))?;

        band.id = None;
        entry.band = band.clone();
        entry.unsaved = true;
        entry.revision = revision;

        Ok(self.finish_upsert(key, false, &band))
    }

    /// Removes a band. Persisted ids are queued for deletion from the band
    /// store; confirming the removal with the user is the caller's job.
    pub fn remove_band(&mut self, reference: &BandRef) -> Result<MedalBand, NotFoundError> {
        let position = self
            .position(reference)
            .ok_or_else(|| not_found(reference))?;
        let entry = self.entries.remove(position);
        if let Some(id) = &entry.band.id {
            self.pending_deletions.push(id.clone());
        }
        Ok(entry.band)
    }

    pub fn get(&self, reference: &BandRef) -> Option<&RegisteredBand> {
        self.position(reference).map(|index| &self.entries[index])
    }

    /// Every band, active or not, in insertion order.
    pub fn bands(&self) -> &[RegisteredBand] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active bands sorted ascending by `order`, ties in insertion order. This
    /// is the precedence the classifier applies.
    pub fn active_bands_ordered(&self) -> Vec<MedalBand> {
        let mut active: Vec<&RegisteredBand> = self
            .entries
            .iter()
            .filter(|entry| entry.band.active)
            .collect();
        active.sort_by_key(|entry| entry.band.order);
        active.into_iter().map(|entry| entry.band.clone()).collect()
    }

    /// Active bands that can never match.
    pub fn malformed_bands(&self) -> Vec<MalformedBandWarning> {
        self.entries
            .iter()
            .filter_map(|entry| malformed_warning(entry.key, &entry.band))
            .collect()
    }

    pub fn pending_deletions(&self) -> &[BandId] {
        &self.pending_deletions
    }

    pub fn sync_plan(&self) -> BandSyncPlan {
        let saves = self
            .entries
            .iter()
            .filter(|entry| entry.unsaved)
            .map(|entry| PendingBand {
                key: entry.key,
                band: entry.band.clone(),
                revision: entry.revision,
            })
            .collect();

        BandSyncPlan {
            saves,
            deletions: self.pending_deletions.clone(),
        }
    }

    /// Records that the band store saved `key` at `revision` under `id`. A draft
    /// adopts the id even when it was edited meanwhile, but then stays unsaved.
    /// A band removed while its save was in flight has the new row queued for
    /// deletion.
    pub(crate) fn confirm_saved(&mut self, key: BandKey, revision: u64, id: BandId) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.key == key) else {
            if !self.pending_deletions.contains(&id) {
                debug!(band_id = %id, "band removed while its save was in flight");
                self.pending_deletions.push(id);
            }
            return false;
        };

        if entry.band.id.is_none() {
            entry.band.id = Some(id);
        }
        if entry.revision == revision {
            entry.unsaved = false;
            true
        } else {
            false
        }
    }

    pub(crate) fn confirm_deleted(&mut self, id: &BandId) {
        self.pending_deletions.retain(|pending| pending != id);
    }

    fn finish_upsert(&self, key: BandKey, inserted: bool, band: &MedalBand) -> BandUpsert {
        let warning = malformed_warning(key, band);
        if let Some(warning) = &warning {
            warn!(%warning, "accepted malformed medal band");
        }
        BandUpsert {
            key,
            inserted,
            warning,
        }
    }

    fn position(&self, reference: &BandRef) -> Option<usize> {
        self.entries.iter().position(|entry| match reference {
            BandRef::Persisted(id) => entry.band.id.as_ref() == Some(id),
            BandRef::Draft(key) => entry.key == *key && entry.band.id.is_none(),
        })
    }

    fn allocate_key(&mut self) -> BandKey {
        self.next_key += 1;
        BandKey(self.next_key)
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

fn malformed_warning(key: BandKey, band: &MedalBand) -> Option<MalformedBandWarning> {
    (band.active && band.is_malformed()).then(|| MalformedBandWarning {
        key,
        id: band.id.clone(),
        label: band.label.clone(),
        min: band.min,
        max: band.max,
    })
}

fn not_found(reference: &BandRef) -> NotFoundError {
    match reference {
        BandRef::Persisted(id) => NotFoundError::Band(id.clone()),
        BandRef::Draft(key) => NotFoundError::Draft(*key),
    }
}
