//! Parameter grids
//!
//! A [`ParamGrid`] is a union of [`ParamSpace`]s. Each space is a cartesian
//! product over its keys, enumerated with the rightmost key varying fastest;
//! spaces are concatenated in declaration order without de-duplication.

use crate::error::{KolosalError, Result};
use crate::params::{HasParams, ParamMap, ParamValue};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// One mapping from qualified parameter name to candidate values.
///
/// Keys keep their declaration order, including when read from a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSpace {
    entries: Vec<(String, Vec<ParamValue>)>,
}

impl ParamSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter and its candidates
    pub fn add<V, I>(mut self, name: impl Into<String>, values: I) -> Self
    where
        V: Into<ParamValue>,
        I: IntoIterator<Item = V>,
    {
        self.entries
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn entries(&self) -> &[(String, Vec<ParamValue>)] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// True when the space declares no keys (it still expands to one point)
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of points in this space, `None` on overflow
    pub fn n_points(&self) -> Option<usize> {
        self.entries
            .iter()
            .try_fold(1usize, |acc, (_, values)| acc.checked_mul(values.len()))
    }

    fn validate(&self, position: usize) -> Result<()> {
        let mut seen = BTreeSet::new();
        for (name, values) in &self.entries {
            if !seen.insert(name.as_str()) {
                return Err(KolosalError::ConfigError(format!(
                    "parameter '{}' is declared twice in grid mapping {}",
                    name, position
                )));
            }
            if values.is_empty() {
                return Err(KolosalError::ConfigError(format!(
                    "parameter '{}' has no candidate values in grid mapping {}",
                    name, position
                )));
            }
        }
        Ok(())
    }

    fn point_at(&self, counters: &[usize]) -> GridPoint {
        GridPoint {
            entries: self
                .entries
                .iter()
                .zip(counters)
                .map(|((name, values), &i)| (name.clone(), values[i].clone()))
                .collect(),
        }
    }
}

impl Serialize for ParamSpace {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

struct ParamSpaceVisitor;

impl<'de> Visitor<'de> for ParamSpaceVisitor {
    type Value = ParamSpace;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from parameter name to a list of candidate values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<ParamSpace, A::Error> {
        // Entries are pushed as read so duplicates survive to validation
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, values)) = access.next_entry::<String, Vec<ParamValue>>()? {
            entries.push((name, values));
        }
        Ok(ParamSpace { entries })
    }
}

impl<'de> Deserialize<'de> for ParamSpace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(ParamSpaceVisitor)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum GridRepr {
    Many(Vec<ParamSpace>),
    One(ParamSpace),
}

impl From<GridRepr> for ParamGrid {
    fn from(repr: GridRepr) -> Self {
        match repr {
            GridRepr::Many(spaces) => ParamGrid { spaces },
            GridRepr::One(space) => ParamGrid { spaces: vec![space] },
        }
    }
}

impl From<ParamGrid> for GridRepr {
    fn from(mut grid: ParamGrid) -> Self {
        if grid.spaces.len() == 1 {
            GridRepr::One(grid.spaces.remove(0))
        } else {
            GridRepr::Many(grid.spaces)
        }
    }
}

/// A union of parameter spaces.
///
/// Deserialises from either one JSON object or an array of objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "GridRepr", into = "GridRepr")]
pub struct ParamGrid {
    spaces: Vec<ParamSpace>,
}

impl From<ParamSpace> for ParamGrid {
    fn from(space: ParamSpace) -> Self {
        Self { spaces: vec![space] }
    }
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a space; its points follow those of earlier spaces
    pub fn add_space(mut self, space: ParamSpace) -> Self {
        self.spaces.push(space);
        self
    }

    pub fn spaces(&self) -> &[ParamSpace] {
        &self.spaces
    }

    /// Load a grid from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Structural checks: at least one mapping, no empty value lists, no repeated keys
    pub fn validate(&self) -> Result<()> {
        if self.spaces.is_empty() {
            return Err(KolosalError::ConfigError(
                "parameter grid has no mappings".to_string(),
            ));
        }
        for (position, space) in self.spaces.iter().enumerate() {
            space.validate(position)?;
        }
        Ok(())
    }

    /// Number of grid points, computed without expanding
    pub fn len(&self) -> Result<usize> {
        self.validate()?;
        self.spaces
            .iter()
            .try_fold(0usize, |acc, space| {
                space.n_points().and_then(|n| acc.checked_add(n))
            })
            .ok_or_else(|| KolosalError::ConfigError("parameter grid size overflows usize".to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Every qualified name used anywhere in the grid
    pub fn names(&self) -> BTreeSet<&str> {
        self.spaces.iter().flat_map(ParamSpace::names).collect()
    }

    /// Lazy enumeration in canonical order
    pub fn iter(&self) -> GridIter<'_> {
        GridIter {
            spaces: &self.spaces,
            space: 0,
            counters: Vec::new(),
            fresh: true,
        }
    }

    /// Validate and materialise every point
    pub fn expand(&self) -> Result<Vec<GridPoint>> {
        let n = self.len()?;
        let mut points = Vec::with_capacity(n);
        points.extend(self.iter());
        Ok(points)
    }

    /// Reject names that are not in `known`
    pub fn check_names<S: AsRef<str>>(&self, known: &[S]) -> Result<()> {
        let known: BTreeSet<&str> = known.iter().map(AsRef::as_ref).collect();
        for name in self.names() {
            if !known.contains(name) {
                return Err(KolosalError::ConfigError(format!(
                    "grid parameter '{}' does not resolve to any stage parameter (known: {})",
                    name,
                    known.iter().copied().collect::<Vec<_>>().join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Expand after checking every name resolves on `target`
    pub fn expand_for<T: HasParams + ?Sized>(&self, target: &T) -> Result<Vec<GridPoint>> {
        self.validate()?;
        self.check_names(&target.param_names())?;
        self.expand()
    }
}

impl<'a> IntoIterator for &'a ParamGrid {
    type Item = GridPoint;
    type IntoIter = GridIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Odometer over the spaces of a grid
#[derive(Debug, Clone)]
pub struct GridIter<'a> {
    spaces: &'a [ParamSpace],
    space: usize,
    counters: Vec<usize>,
    fresh: bool,
}

impl GridIter<'_> {
    fn next_space(&mut self) {
        self.space += 1;
        self.fresh = true;
    }
}

impl Iterator for GridIter<'_> {
    type Item = GridPoint;

    fn next(&mut self) -> Option<GridPoint> {
        let spaces = self.spaces;
        loop {
            let space = spaces.get(self.space)?;

            if self.fresh {
                self.fresh = false;
                if space.entries.iter().any(|(_, values)| values.is_empty()) {
                    self.next_space();
                    continue;
                }
                self.counters = vec![0; space.entries.len()];
                return Some(space.point_at(&self.counters));
            }

            // rightmost key varies fastest
            let mut pos = self.counters.len();
            loop {
                if pos == 0 {
                    self.next_space();
                    break;
                }
                pos -= 1;
                self.counters[pos] += 1;
                if self.counters[pos] < space.entries[pos].1.len() {
                    return Some(space.point_at(&self.counters));
                }
                self.counters[pos] = 0;
            }
        }
    }
}

/// One concrete assignment of values, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridPoint {
    entries: Vec<(String, ParamValue)>,
}

impl GridPoint {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_param_map(&self) -> ParamMap {
        self.entries.iter().cloned().collect()
    }

    /// Set every assignment on `target`, in declaration order
    pub fn apply_to<T: HasParams + ?Sized>(&self, target: &mut T) -> Result<()> {
        for (name, value) in &self.entries {
            target.set_param(name, value)?;
        }
        Ok(())
    }
}

impl<S: Into<String>, V: Into<ParamValue>> FromIterator<(S, V)> for GridPoint {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect(),
        }
    }
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

impl Serialize for GridPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
