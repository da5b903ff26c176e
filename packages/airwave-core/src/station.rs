//! Station and collection data model.
//!
//! A [`Station`] holds the basic data of one radio station; a [`Collection`]
//! is the ordered list of stations the user curates, stamped with a
//! modification timestamp. The collection is edited by the external
//! collaborator that owns the persisted copy; inside the engine it is only
//! replaced wholesale via [`crate::services::CollectionSynchronizer`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::now_millis;

/// A single radio station.
///
/// The `id` is stable for the station's lifetime; all other fields are
/// mutable through external edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Station {
    /// Stable unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Stream URIs in priority order; the first is the primary stream.
    pub stream_uris: Vec<String>,
    /// MIME type of the stream content (e.g. `audio/mpeg`).
    pub stream_content_type: String,
    /// Station image location.
    pub image: String,
    /// Small station image location.
    pub small_image: String,
    /// Whether the user starred this station.
    pub starred: bool,
    /// Whether playback of this station is active (persisted display state).
    pub is_playing: bool,
    /// The name was edited manually and must not be overwritten by updates.
    pub name_manually_set: bool,
    /// The image was chosen manually and must not be overwritten by updates.
    pub image_manually_set: bool,
    /// Station homepage.
    pub homepage: String,
    /// Remote location this station was imported from.
    pub remote_station_location: String,
    /// Identifier of this station in the radio-browser.info directory.
    pub radio_browser_station_uuid: String,
    /// Last modification, Unix millis.
    pub modification_millis: u64,
}

impl Default for Station {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: String::new(),
            stream_uris: Vec::new(),
            stream_content_type: String::new(),
            image: String::new(),
            small_image: String::new(),
            starred: false,
            is_playing: false,
            name_manually_set: false,
            image_manually_set: false,
            homepage: String::new(),
            remote_station_location: String::new(),
            radio_browser_station_uuid: String::new(),
            modification_millis: now_millis(),
        }
    }
}

impl Station {
    /// Creates a station with the given name and a single stream URI.
    #[must_use]
    pub fn new(name: impl Into<String>, stream_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stream_uris: vec![stream_uri.into()],
            ..Self::default()
        }
    }

    /// Returns the primary stream URI, if any.
    #[must_use]
    pub fn stream_uri(&self) -> Option<&str> {
        self.stream_uris.first().map(String::as_str)
    }
}

/// The ordered set of stations plus its modification timestamp.
///
/// Order is display and playback order. `modification_millis` strictly
/// increases on every persisted station edit; playback-state writes leave
/// it untouched (see [`crate::services::CollectionSynchronizer`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Stations in display/playback order.
    pub stations: Vec<Station>,
    /// Last persisted mutation, Unix millis.
    pub modification_millis: u64,
}

impl Collection {
    /// Creates a collection from stations, stamped with the current time.
    #[must_use]
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations,
            modification_millis: now_millis(),
        }
    }

    /// Looks up a station by its stable id.
    #[must_use]
    pub fn station_by_id(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    /// Returns the position of a station in playback order.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.stations.iter().position(|s| s.id == id)
    }

    /// Returns the number of stations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Returns true if the collection holds no stations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Sets the `is_playing` flag on the station with the given id and
    /// clears it everywhere else. Does not bump `modification_millis`:
    /// playback-state writes must not look like station edits.
    pub fn mark_playing(&mut self, station_id: Option<&str>, is_playing: bool) {
        for station in &mut self.stations {
            station.is_playing =
                is_playing && station_id.is_some_and(|id| id == station.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection_of(names: &[&str]) -> Collection {
        Collection::new(
            names
                .iter()
                .map(|n| Station::new(*n, format!("http://radio.example/{n}")))
                .collect(),
        )
    }

    #[test]
    fn station_ids_are_unique() {
        let a = Station::new("a", "http://radio.example/a");
        let b = Station::new("b", "http://radio.example/b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn primary_stream_uri_is_first() {
        let mut station = Station::new("x", "http://radio.example/primary");
        station.stream_uris.push("http://radio.example/backup".into());
        assert_eq!(station.stream_uri(), Some("http://radio.example/primary"));

        let empty = Station::default();
        assert_eq!(empty.stream_uri(), None);
    }

    #[test]
    fn lookup_by_id_and_index() {
        let collection = collection_of(&["a", "b", "c"]);
        let id = collection.stations[1].id.clone();
        assert_eq!(collection.station_by_id(&id).unwrap().name, "b");
        assert_eq!(collection.index_of(&id), Some(1));
        assert_eq!(collection.index_of("missing"), None);
    }

    #[test]
    fn mark_playing_sets_exactly_one_station() {
        let mut collection = collection_of(&["a", "b", "c"]);
        let id = collection.stations[2].id.clone();
        let before = collection.modification_millis;

        collection.mark_playing(Some(&id), true);
        let playing: Vec<_> = collection.stations.iter().filter(|s| s.is_playing).collect();
        assert_eq!(playing.len(), 1);
        assert_eq!(playing[0].name, "c");

        collection.mark_playing(Some(&id), false);
        assert!(collection.stations.iter().all(|s| !s.is_playing));

        // playback-state writes never look like station edits
        assert_eq!(collection.modification_millis, before);
    }

    #[test]
    fn serializes_to_camel_case() {
        let station = Station::new("FM4", "http://radio.example/fm4");
        let json = serde_json::to_value(&station).unwrap();
        assert!(json.get("streamUris").is_some());
        assert!(json.get("modificationMillis").is_some());
        assert!(json.get("stream_uris").is_none());
    }
}
