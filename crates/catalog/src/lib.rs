//! Celestial object catalog: body classes, J2000 orbital elements with
//! per-century rates, and physical data for every body the proxy can
//! simulate.
//!
//! The catalog is immutable after construction and shared read-only across
//! the serving path. Custom bodies can be merged over the built-in table
//! from a YAML file or a directory of TOML records.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod bodies;

pub use bodies::builtin_objects;

/// Classification of a catalogued body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyClass {
    Star,
    Planet,
    DwarfPlanet,
    Moon,
    Asteroid,
    Spacecraft,
}

impl BodyClass {
    /// Plural key used by the status API grouping.
    pub fn plural(&self) -> &'static str {
        match self {
            BodyClass::Star => "stars",
            BodyClass::Planet => "planets",
            BodyClass::DwarfPlanet => "dwarf_planets",
            BodyClass::Moon => "moons",
            BodyClass::Asteroid => "asteroids",
            BodyClass::Spacecraft => "spacecrafts",
        }
    }
}

/// Keplerian elements at the J2000 epoch plus per-century rates.
///
/// Heliocentric orbits express `a` in AU with `lp` (longitude of
/// perihelion); parent-relative orbits express `a` in km with `w` (argument
/// of perigee). `b`, `c`, `s`, `f` are the mean-anomaly correction
/// coefficients (degrees) applied as `ΔM = b·T² + c·cos(f·T) + s·sin(f·T)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OrbitalElements {
    pub a: f64,
    pub e: f64,
    pub i: f64,
    pub l: f64,
    #[serde(default)]
    pub lp: f64,
    #[serde(default)]
    pub n: f64,
    #[serde(default)]
    pub w: f64,
    #[serde(default)]
    pub da: f64,
    #[serde(default)]
    pub de: f64,
    #[serde(default)]
    pub di: f64,
    #[serde(default)]
    pub dl: f64,
    #[serde(default)]
    pub dlp: f64,
    #[serde(default)]
    pub dn: f64,
    #[serde(default)]
    pub dw: f64,
    #[serde(default)]
    pub b: f64,
    #[serde(default)]
    pub c: f64,
    #[serde(default)]
    pub s: f64,
    #[serde(default)]
    pub f: f64,
}

/// Operational status of a spacecraft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Active,
    Extended,
    Retired,
}

/// Extra metadata carried only by spacecraft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpacecraftInfo {
    pub launch_date: Option<NaiveDate>,
    pub mission_status: MissionStatus,
    #[serde(default)]
    pub transmitter_frequency_hz: Option<f64>,
    #[serde(default)]
    pub transmitter_active: bool,
}

/// One immutable catalog row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CelestialObject {
    pub name: String,
    pub class: BodyClass,
    /// Parent body for moons and parent-relative spacecraft. `None` means
    /// heliocentric (the Sun itself carries `None` and sits at the origin).
    #[serde(default)]
    pub parent: Option<String>,
    pub radius_km: f64,
    pub mass_kg: f64,
    pub elements: OrbitalElements,
    #[serde(default)]
    pub spacecraft: Option<SpacecraftInfo>,
}

impl CelestialObject {
    /// Whether the orbit is expressed relative to a parent body (km) rather
    /// than the Sun (AU).
    pub fn is_parent_relative(&self) -> bool {
        self.parent.is_some()
    }
}

/// Errors raised while constructing or loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate body name `{0}`")]
    DuplicateName(String),
    #[error("body `{body}` references unknown parent `{parent}`")]
    UnknownParent { body: String, parent: String },
    #[error("catalog has no Sun entry")]
    MissingSun,
    #[error("catalog has no Earth entry")]
    MissingEarth,
    #[error("the Sun must not have a parent")]
    SunHasParent,
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse TOML catalog record: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Validated, immutable body table with case-insensitive lookup.
#[derive(Debug)]
pub struct Catalog {
    objects: Vec<CelestialObject>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// The built-in solar-system table.
    pub fn builtin() -> Catalog {
        Catalog::from_objects(builtin_objects()).expect("built-in catalog is valid")
    }

    /// Build a catalog from explicit rows, validating the §3 invariants.
    pub fn from_objects(objects: Vec<CelestialObject>) -> Result<Catalog, CatalogError> {
        let mut index = HashMap::with_capacity(objects.len());
        for (i, obj) in objects.iter().enumerate() {
            if index.insert(obj.name.to_lowercase(), i).is_some() {
                return Err(CatalogError::DuplicateName(obj.name.clone()));
            }
        }
        for obj in &objects {
            if let Some(parent) = &obj.parent {
                if !index.contains_key(&parent.to_lowercase()) {
                    return Err(CatalogError::UnknownParent {
                        body: obj.name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }
        let sun = index.get("sun").ok_or(CatalogError::MissingSun)?;
        if objects[*sun].parent.is_some() {
            return Err(CatalogError::SunHasParent);
        }
        if !index.contains_key("earth") {
            return Err(CatalogError::MissingEarth);
        }
        Ok(Catalog { objects, index })
    }

    /// Load extra bodies from a YAML file or a directory of TOML records and
    /// merge them over the built-in table (same name replaces).
    pub fn builtin_with_overrides<P: AsRef<Path>>(path: P) -> Result<Catalog, CatalogError> {
        let mut objects = builtin_objects();
        for record in load_records(path.as_ref())? {
            match objects
                .iter()
                .position(|o| o.name.eq_ignore_ascii_case(&record.name))
            {
                Some(i) => objects[i] = record,
                None => objects.push(record),
            }
        }
        Catalog::from_objects(objects)
    }

    /// Case-insensitive lookup by name.
    pub fn get(&self, name: &str) -> Option<&CelestialObject> {
        self.index
            .get(&name.to_lowercase())
            .map(|&i| &self.objects[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// Whether `moon` is a catalogued moon whose parent is `planet`.
    pub fn is_moon_of(&self, moon: &str, planet: &str) -> bool {
        self.get(moon)
            .filter(|m| m.class == BodyClass::Moon)
            .and_then(|m| m.parent.as_deref())
            .is_some_and(|p| p.eq_ignore_ascii_case(planet))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CelestialObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

fn load_records(path: &Path) -> Result<Vec<CelestialObject>, CatalogError> {
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|ext| ext == "toml").unwrap_or(false))
            .collect();
        entries.sort();
        let mut records = Vec::new();
        for entry in entries {
            let contents = std::fs::read_to_string(&entry)?;
            records.push(toml::from_str(&contents)?);
        }
        Ok(records)
    } else {
        let reader = File::open(path)?;
        Ok(serde_yaml::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_catalog_validates() {
        let catalog = Catalog::builtin();
        assert!(catalog.len() > 30, "expected a full table, got {}", catalog.len());
        assert!(catalog.get("Sun").is_some());
        assert!(catalog.get("EARTH").is_some());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.get("mArS").unwrap().name, "mars");
        assert!(catalog.get("vulcan").is_none());
    }

    #[test]
    fn moons_reference_their_parents() {
        let catalog = Catalog::builtin();
        assert!(catalog.is_moon_of("phobos", "mars"));
        assert!(catalog.is_moon_of("europa", "jupiter"));
        assert!(!catalog.is_moon_of("europa", "mars"));
        // Spacecraft are not moons even when parented.
        assert!(!catalog.is_moon_of("iss", "earth"));
    }

    #[test]
    fn every_parent_resolves() {
        let catalog = Catalog::builtin();
        for obj in catalog.iter() {
            if let Some(parent) = &obj.parent {
                assert!(catalog.contains(parent), "{} orphaned from {}", obj.name, parent);
            }
        }
    }

    #[test]
    fn spacecraft_carry_metadata() {
        let catalog = Catalog::builtin();
        let v1 = catalog.get("voyager-1").unwrap();
        assert_eq!(v1.class, BodyClass::Spacecraft);
        let info = v1.spacecraft.as_ref().unwrap();
        assert!(info.transmitter_active);
        assert!(info.launch_date.is_some());
        // Escape trajectory
        assert!(v1.elements.e > 1.0);
        assert!(v1.elements.a < 0.0);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut objects = builtin_objects();
        let dup = objects[3].clone();
        objects.push(dup);
        assert!(matches!(
            Catalog::from_objects(objects),
            Err(CatalogError::DuplicateName(_))
        ));
    }

    #[test]
    fn unknown_parent_rejected() {
        let mut objects = builtin_objects();
        for obj in objects.iter_mut() {
            if obj.name == "moon" {
                obj.parent = Some("nibiru".to_string());
            }
        }
        assert!(matches!(
            Catalog::from_objects(objects),
            Err(CatalogError::UnknownParent { .. })
        ));
    }

    #[test]
    fn yaml_overrides_merge_over_builtin() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "- name: relay-1\n  class: spacecraft\n  parent: mars\n  radius_km: 0.002\n  mass_kg: 1200.0\n  elements:\n    a: 9500.0\n    e: 0.001\n    i: 0.5\n    l: 10.0\n    dl: 40000000.0\n  spacecraft:\n    launch_date: 2031-03-14\n    mission_status: active\n    transmitter_active: true"
        )
        .unwrap();

        let catalog = Catalog::builtin_with_overrides(file.path()).unwrap();
        let relay = catalog.get("relay-1").unwrap();
        assert_eq!(relay.parent.as_deref(), Some("mars"));
        assert!(relay.is_parent_relative());
    }
}
