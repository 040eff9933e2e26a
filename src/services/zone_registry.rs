//! Named screen regions with late-bound geometry
//!
//! Geometry is owned by the layout collaborator and queried on every lookup
//! through a `BoundsProvider`. Zones are kept in registration order; overlap is
//! resolved by first-registered-wins.

use crate::domain::types::{Bounds, ZoneId};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Supplies a zone's current rectangle, or None while it is not measurable
pub trait BoundsProvider: Send + Sync {
    fn bounds(&self) -> Option<Bounds>;
}

impl<F> BoundsProvider for F
where
    F: Fn() -> Option<Bounds> + Send + Sync,
{
    fn bounds(&self) -> Option<Bounds> {
        self()
    }
}

/// Fixed geometry (config-defined layouts, tests)
impl BoundsProvider for Bounds {
    fn bounds(&self) -> Option<Bounds> {
        Some(*self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ZoneError {
    #[error("zone id must not be empty")]
    EmptyId,
    #[error("zone {0} is already registered")]
    Duplicate(ZoneId),
}

#[derive(Clone)]
struct Zone {
    id: ZoneId,
    provider: Arc<dyn BoundsProvider>,
}

pub struct ZoneRegistry {
    zones: RwLock<Vec<Zone>>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self { zones: RwLock::new(Vec::new()) }
    }

    /// Register a zone, replacing the provider if the id already exists
    ///
    /// A replaced zone keeps its original position in the lookup order.
    pub fn register<P>(&self, id: impl Into<ZoneId>, provider: P) -> Result<(), ZoneError>
    where
        P: BoundsProvider + 'static,
    {
        let id = Self::validate(id.into())?;
        let provider: Arc<dyn BoundsProvider> = Arc::new(provider);

        let mut zones = self.zones.write();
        if let Some(existing) = zones.iter_mut().find(|z| z.id == id) {
            debug!(zone = %id, "zone_provider_replaced");
            existing.provider = provider;
        } else {
            debug!(zone = %id, position = %zones.len(), "zone_registered");
            zones.push(Zone { id, provider });
        }
        Ok(())
    }

    /// Register a zone, failing if the id already exists
    pub fn register_unique<P>(&self, id: impl Into<ZoneId>, provider: P) -> Result<(), ZoneError>
    where
        P: BoundsProvider + 'static,
    {
        let id = Self::validate(id.into())?;

        let mut zones = self.zones.write();
        if zones.iter().any(|z| z.id == id) {
            return Err(ZoneError::Duplicate(id));
        }
        debug!(zone = %id, position = %zones.len(), "zone_registered");
        zones.push(Zone { id, provider: Arc::new(provider) });
        Ok(())
    }

    fn validate(id: ZoneId) -> Result<ZoneId, ZoneError> {
        if id.as_str().trim().is_empty() {
            return Err(ZoneError::EmptyId);
        }
        Ok(id)
    }

    /// Remove a zone. Returns false if it was not registered.
    pub fn unregister(&self, id: &str) -> bool {
        let mut zones = self.zones.write();
        let before = zones.len();
        zones.retain(|z| z.id.as_str() != id);
        let removed = zones.len() != before;
        if removed {
            debug!(zone = %id, "zone_unregistered");
        }
        removed
    }

    /// First zone, in registration order, whose bounds contain the point
    ///
    /// Providers are called outside the registry lock so they may consult
    /// the registry themselves.
    pub fn find_zone_at_point(&self, x: f64, y: f64) -> Option<ZoneId> {
        let zones: SmallVec<[Zone; 8]> = self.zones.read().iter().cloned().collect();

        zones
            .into_iter()
            .find(|zone| zone.provider.bounds().is_some_and(|b| b.contains(x, y)))
            .map(|zone| zone.id)
    }

    /// Current bounds of a single zone
    pub fn bounds_of(&self, id: &str) -> Option<Bounds> {
        let provider = self.zones.read().iter().find(|z| z.id.as_str() == id)?.provider.clone();
        provider.bounds()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.zones.read().iter().any(|z| z.id.as_str() == id)
    }

    /// Registered ids in lookup order
    pub fn zone_ids(&self) -> Vec<ZoneId> {
        self.zones.read().iter().map(|z| z.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.zones.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.read().is_empty()
    }
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::new()
    }
}
