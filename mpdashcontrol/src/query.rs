//! Tag filters and track selections carried by requests.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::model::{Tag, Track};

/// Ordered tag → value filter.
///
/// `null` values never make it in; an explicit empty string is kept and matches tracks
/// whose tag is empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceQuery {
    pairs: Vec<(Tag, String)>,
}

impl ResourceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `tag` (replacing any previous value) and returns the query.
    pub fn with(mut self, tag: Tag, value: impl Into<String>) -> Self {
        self.insert(tag, value);
        self
    }

    pub fn insert(&mut self, tag: Tag, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((tag, value)),
        }
    }

    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &str)> {
        self.pairs.iter().map(|(t, v)| (*t, v.as_str()))
    }

    /// Keeps only the listed tags, preserving order.
    pub fn restricted(&self, allowed: &[Tag]) -> Self {
        Self {
            pairs: self
                .pairs
                .iter()
                .filter(|(t, _)| allowed.contains(t))
                .cloned()
                .collect(),
        }
    }

    /// Reads every known tag from a JSON object. Unknown keys are ignored.
    ///
    /// Numbers and booleans are accepted as their textual form; arrays and objects
    /// are rejected.
    pub fn from_json(map: &Map<String, Value>) -> Result<Self, String> {
        let mut query = ResourceQuery::new();
        for (key, value) in map {
            let Ok(tag) = key.parse::<Tag>() else {
                continue;
            };
            match value {
                Value::Null => {}
                Value::String(s) => query.insert(tag, s.clone()),
                Value::Number(n) => query.insert(tag, n.to_string()),
                Value::Bool(b) => query.insert(tag, b.to_string()),
                _ => return Err(format!("Invalid value for '{}'", key)),
            }
        }
        Ok(query)
    }

    /// Same as [`from_json`](Self::from_json) for already-decoded string pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut query = ResourceQuery::new();
        for (key, value) in pairs {
            if let Ok(tag) = key.parse::<Tag>() {
                query.insert(tag, value);
            }
        }
        query
    }

    /// `true` when every filter equals the track's tag exactly.
    pub fn matches(&self, track: &Track) -> bool {
        self.iter()
            .all(|(tag, value)| track.tag(tag).unwrap_or_default() == value)
    }

    /// Arguments for `find`/`list`/`count`: tag, value, tag, value, ...
    pub fn to_args(&self) -> Vec<String> {
        self.pairs
            .iter()
            .flat_map(|(t, v)| [t.as_str().to_string(), v.clone()])
            .collect()
    }
}

impl Serialize for ResourceQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.pairs.len()))?;
        for (tag, value) in &self.pairs {
            map.serialize_entry(tag.as_str(), value)?;
        }
        map.end()
    }
}

/// What an insert or append acts upon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackSelection {
    Playlist(String),
    File(String),
    Search(ResourceQuery),
}

impl TrackSelection {
    /// Parses a request body. `playlist` wins over `file`, which wins over tag filters.
    pub fn from_json(map: &Map<String, Value>) -> Result<Self, String> {
        if let Some(value) = map.get("playlist").filter(|v| !v.is_null()) {
            return match value {
                Value::String(name) => Ok(TrackSelection::Playlist(name.clone())),
                _ => Err("Invalid parameter, 'playlist'".to_string()),
            };
        }

        if let Some(Value::String(file)) = map.get("file") {
            if !file.is_empty() {
                return Ok(TrackSelection::File(file.clone()));
            }
        }

        let query = ResourceQuery::from_json(map)?;
        if query.is_empty() {
            return Err("Nothing selected: expected 'playlist', 'file' or tag filters".to_string());
        }
        Ok(TrackSelection::Search(query))
    }
}

impl Serialize for TrackSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TrackSelection::Playlist(name) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("playlist", name)?;
                map.end()
            }
            TrackSelection::File(file) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("file", file)?;
                map.end()
            }
            TrackSelection::Search(query) => query.serialize(serializer),
        }
    }
}
