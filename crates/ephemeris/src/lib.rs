//! Ephemeris engine: heliocentric positions, Earth-relative distances,
//! line-of-sight occlusion, and light-time latencies derived from the
//! static catalog.
//!
//! Positions are pure functions of the catalog and an instant; the engine
//! additionally keeps a time-bucketed distance snapshot behind a
//! single-writer/many-reader lock so the relay hot path never recomputes
//! the full table per request. Occlusion checks for admission are always
//! evaluated live against request-time geometry.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use lightlag_catalog::{BodyClass, Catalog, CelestialObject};
use lightlag_core::constants::AU_KM;
use lightlag_core::units::light_time_seconds;
use lightlag_core::vector::Vector3;

mod propagate;
mod time;

pub use propagate::heliocentric_position;
pub use time::julian_centuries_tdb;

/// Occlusion margin applied to the Sun's radius (corona).
const SUN_OCCLUSION_MARGIN: f64 = 1.05;
/// Occlusion margin applied to planets and dwarf planets (atmosphere/limb).
const PLANET_OCCLUSION_MARGIN: f64 = 1.02;

/// Errors surfaced while evaluating the ephemeris.
#[derive(Debug, Error)]
pub enum EphemerisError {
    #[error("unknown body `{0}`")]
    UnknownBody(String),
    #[error("parent chain for `{body}` exceeds the supported depth")]
    ParentChainTooDeep { body: String },
}

/// One row of the Earth-relative distance table.
#[derive(Debug, Clone)]
pub struct DistanceEntry {
    pub name: String,
    pub class: BodyClass,
    pub parent: Option<String>,
    pub distance_km: f64,
    pub latency_seconds: f64,
    pub occluded: bool,
    pub occluded_by: Option<String>,
}

/// A full distance table computed at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub computed_at: DateTime<Utc>,
    pub entries: Vec<DistanceEntry>,
}

impl Snapshot {
    /// Case-insensitive lookup of one body's entry.
    pub fn entry(&self, name: &str) -> Option<&DistanceEntry> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }
}

/// The engine. Shared via `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct Ephemeris {
    catalog: Arc<Catalog>,
    refresh_interval: TimeDelta,
    cache: RwLock<Option<Arc<Snapshot>>>,
}

impl Ephemeris {
    pub fn new(catalog: Arc<Catalog>, refresh_interval: std::time::Duration) -> Ephemeris {
        Ephemeris {
            catalog,
            refresh_interval: TimeDelta::from_std(refresh_interval)
                .unwrap_or_else(|_| TimeDelta::hours(1)),
            cache: RwLock::new(None),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Heliocentric position in AU at a UTC instant.
    pub fn position_of(&self, name: &str, t: DateTime<Utc>) -> Result<Vector3, EphemerisError> {
        let object = self.object(name)?;
        heliocentric_position(&self.catalog, object, julian_centuries_tdb(t))
    }

    /// Distance from Earth in km at a UTC instant.
    pub fn distance_from_earth_km(
        &self,
        name: &str,
        t: DateTime<Utc>,
    ) -> Result<f64, EphemerisError> {
        let centuries = julian_centuries_tdb(t);
        let earth = self.position_at(self.object("earth")?, centuries)?;
        let body = self.position_at(self.object(name)?, centuries)?;
        Ok(body.distance(&earth) * AU_KM)
    }

    /// One-way light-time in seconds from Earth at a UTC instant.
    pub fn one_way_latency_seconds(
        &self,
        name: &str,
        t: DateTime<Utc>,
    ) -> Result<f64, EphemerisError> {
        Ok(light_time_seconds(self.distance_from_earth_km(name, t)?))
    }

    /// Whether `target` is hidden from `observer` by an intervening body at
    /// the given instant; returns the occluder's name if so.
    pub fn occluder_between(
        &self,
        observer: &str,
        target: &str,
        t: DateTime<Utc>,
    ) -> Result<Option<String>, EphemerisError> {
        if observer.eq_ignore_ascii_case(target) {
            return Ok(None);
        }
        let centuries = julian_centuries_tdb(t);
        let positions = self.all_positions(centuries)?;
        let observer = self.object(observer)?;
        let target = self.object(target)?;
        Ok(occluder_for(&positions, observer, target))
    }

    /// The cached distance table, recomputed first if older than the
    /// refresh interval.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Result<Arc<Snapshot>, EphemerisError> {
        {
            let slot = self.cache.read().unwrap();
            if let Some(snapshot) = slot.as_ref() {
                if now - snapshot.computed_at <= self.refresh_interval {
                    return Ok(snapshot.clone());
                }
            }
        }

        let mut slot = self.cache.write().unwrap();
        // Another writer may have refreshed while we waited.
        if let Some(snapshot) = slot.as_ref() {
            if now - snapshot.computed_at <= self.refresh_interval {
                return Ok(snapshot.clone());
            }
        }
        let snapshot = Arc::new(self.compute_snapshot(now)?);
        *slot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Cached Earth-relative entry for one body.
    pub fn cached_entry(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<DistanceEntry, EphemerisError> {
        let snapshot = self.snapshot(now)?;
        snapshot
            .entry(name)
            .cloned()
            .ok_or_else(|| EphemerisError::UnknownBody(name.to_string()))
    }

    fn object(&self, name: &str) -> Result<&CelestialObject, EphemerisError> {
        self.catalog
            .get(name)
            .ok_or_else(|| EphemerisError::UnknownBody(name.to_string()))
    }

    fn position_at(
        &self,
        object: &CelestialObject,
        centuries: f64,
    ) -> Result<Vector3, EphemerisError> {
        heliocentric_position(&self.catalog, object, centuries)
    }

    fn all_positions(
        &self,
        centuries: f64,
    ) -> Result<Vec<(&CelestialObject, Vector3)>, EphemerisError> {
        self.catalog
            .iter()
            .map(|o| Ok((o, self.position_at(o, centuries)?)))
            .collect()
    }

    fn compute_snapshot(&self, now: DateTime<Utc>) -> Result<Snapshot, EphemerisError> {
        let centuries = julian_centuries_tdb(now);
        let positions = self.all_positions(centuries)?;
        let earth_pos = positions
            .iter()
            .find(|(o, _)| o.name == "earth")
            .map(|(_, p)| *p)
            .ok_or_else(|| EphemerisError::UnknownBody("earth".to_string()))?;

        let earth = self.object("earth")?;
        let entries = positions
            .iter()
            .map(|(object, pos)| {
                let distance_km = pos.distance(&earth_pos) * AU_KM;
                let occluded_by = if object.name == "earth" {
                    None
                } else {
                    occluder_for(&positions, earth, object)
                };
                DistanceEntry {
                    name: object.name.clone(),
                    class: object.class,
                    parent: object.parent.clone(),
                    distance_km,
                    latency_seconds: light_time_seconds(distance_km),
                    occluded: occluded_by.is_some(),
                    occluded_by,
                }
            })
            .collect();

        Ok(Snapshot {
            computed_at: now,
            entries,
        })
    }
}

/// Scan for the first catalog body blocking the observer→target sight line.
fn occluder_for(
    positions: &[(&CelestialObject, Vector3)],
    observer: &CelestialObject,
    target: &CelestialObject,
) -> Option<String> {
    let lookup = |name: &str| {
        positions
            .iter()
            .find(|(o, _)| o.name == name)
            .map(|(_, p)| *p)
    };
    let observer_pos = lookup(&observer.name)?;
    let target_pos = lookup(&target.name)?;

    let sight = target_pos.sub(&observer_pos);
    let target_distance = sight.norm();
    if target_distance == 0.0 {
        return None;
    }
    let direction = sight.scale(1.0 / target_distance);

    for (object, pos) in positions {
        if object.name == target.name || object.name == observer.name {
            continue;
        }
        let to_object = pos.sub(&observer_pos);
        if to_object.norm() >= target_distance {
            continue;
        }
        let projection = to_object.dot(&direction);
        if projection <= 0.0 {
            continue;
        }
        let perpendicular_au = to_object.sub(&direction.scale(projection)).norm();
        let margin = match object.class {
            BodyClass::Star => SUN_OCCLUSION_MARGIN,
            BodyClass::Planet | BodyClass::DwarfPlanet => PLANET_OCCLUSION_MARGIN,
            _ => 1.0,
        };
        if perpendicular_au * AU_KM < object.radius_km * margin {
            return Some(object.name.clone());
        }
    }
    None
}
