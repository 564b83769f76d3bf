//! Typed views of the records the daemon sends back.
//!
//! The daemon answers with flat `key: value` lines. The helpers here group them into
//! records and lift the keys the dashboard cares about into typed fields; anything else
//! is kept verbatim (lower-cased key) in `extra`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use utoipa::ToSchema;

/// Raw `key: value` pairs of one response, in wire order.
pub type Pairs = Vec<(String, String)>;

/// Browsable / searchable tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    Artist,
    AlbumArtist,
    Album,
    Title,
    Name,
    Genre,
    OriginalDate,
    Label,
    File,
}

impl Tag {
    pub const ALL: [Tag; 9] = [
        Tag::Artist,
        Tag::AlbumArtist,
        Tag::Album,
        Tag::Title,
        Tag::Name,
        Tag::Genre,
        Tag::OriginalDate,
        Tag::Label,
        Tag::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Artist => "artist",
            Tag::AlbumArtist => "albumartist",
            Tag::Album => "album",
            Tag::Title => "title",
            Tag::Name => "name",
            Tag::Genre => "genre",
            Tag::OriginalDate => "originaldate",
            Tag::Label => "label",
            Tag::File => "file",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown tag '{}'", s))
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Playback toggles exposed as `repeat`/`random`/`single`/`consume`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackOption {
    Repeat,
    Random,
    Single,
    Consume,
}

impl PlaybackOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackOption::Repeat => "repeat",
            PlaybackOption::Random => "random",
            PlaybackOption::Single => "single",
            PlaybackOption::Consume => "consume",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Play,
    Pause,
    #[default]
    Stop,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayState::Play => "play",
            PlayState::Pause => "pause",
            PlayState::Stop => "stop",
        }
    }
}

impl FromStr for PlayState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "play" => Ok(PlayState::Play),
            "pause" => Ok(PlayState::Pause),
            "stop" => Ok(PlayState::Stop),
            other => Err(format!("unknown playback state '{}'", other)),
        }
    }
}

fn serialize_flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "1" } else { "0" })
}

fn parse_flag(value: &str) -> bool {
    // `single` may also be "oneshot"
    value != "0"
}

/// Groups pairs into records, a new record starting at every `starts` key.
///
/// Pairs seen before the first start key are dropped.
pub fn split_records(pairs: Pairs, starts: &[&str]) -> Vec<Pairs> {
    let mut records: Vec<Pairs> = Vec::new();
    for (key, value) in pairs {
        if starts.iter().any(|s| key.eq_ignore_ascii_case(s)) {
            records.push(Vec::new());
        }
        if let Some(current) = records.last_mut() {
            current.push((key, value));
        }
    }
    records
}

/// A song known to the daemon.
#[derive(Clone, Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct Track {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub albumartist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub originaldate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Track {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }

    /// Builds a track from one record. Returns `None` when the record has no `file`.
    pub fn from_pairs(pairs: Pairs) -> Option<Self> {
        let mut track = Track::default();
        let mut has_file = false;

        for (key, value) in pairs {
            let key = key.to_lowercase();
            let slot = match key.as_str() {
                "file" => {
                    if !has_file {
                        track.file = value;
                        has_file = true;
                    }
                    continue;
                }
                "duration" => {
                    track.duration = value.parse().ok().or(track.duration);
                    continue;
                }
                "time" => {
                    if track.duration.is_none() {
                        track.duration = value.parse().ok();
                    }
                    track.extra.entry(key).or_insert(value);
                    continue;
                }
                "title" => &mut track.title,
                "artist" => &mut track.artist,
                "albumartist" => &mut track.albumartist,
                "album" => &mut track.album,
                "genre" => &mut track.genre,
                "originaldate" => &mut track.originaldate,
                "label" => &mut track.label,
                "name" => &mut track.name,
                "track" => &mut track.track,
                _ => {
                    track.extra.entry(key).or_insert(value);
                    continue;
                }
            };
            // multi-valued tags keep their first value
            if slot.is_none() {
                *slot = Some(value);
            }
        }

        has_file.then_some(track)
    }

    /// Value of a browsable tag, if the track carries it.
    pub fn tag(&self, tag: Tag) -> Option<&str> {
        match tag {
            Tag::Artist => self.artist.as_deref(),
            Tag::AlbumArtist => self.albumartist.as_deref(),
            Tag::Album => self.album.as_deref(),
            Tag::Title => self.title.as_deref(),
            Tag::Name => self.name.as_deref(),
            Tag::Genre => self.genre.as_deref(),
            Tag::OriginalDate => self.originaldate.as_deref(),
            Tag::Label => self.label.as_deref(),
            Tag::File => Some(self.file.as_str()),
        }
    }

    /// Leading integer of the `track` tag ("3/12" gives 3).
    pub fn ordinal(&self) -> Option<u32> {
        let raw = self.track.as_deref()?.trim();
        let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    /// Title for display: `title`, then stream `name`, then the file's base name.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_else(|| self.file.rsplit('/').next().unwrap_or(&self.file))
    }
}

/// Album track order: ordinal first, tracks without ordinal last, then title.
pub fn sort_album_tracks(tracks: &mut [Track]) {
    tracks.sort_by(|a, b| {
        let by_ordinal = match (a.ordinal(), b.ordinal()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        by_ordinal.then_with(|| a.display_title().cmp(b.display_title()))
    });
}

pub fn sort_by_title(tracks: &mut [Track]) {
    tracks.sort_by(|a, b| a.display_title().cmp(b.display_title()));
}

/// One entry of the playback queue.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct QueueEntry {
    pub pos: u32,
    pub id: u32,
    #[serde(flatten)]
    pub track: Track,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<PlayState>,
}

impl QueueEntry {
    pub fn from_pairs(pairs: Pairs) -> Option<Self> {
        let mut pos = None;
        let mut id = None;
        let mut rest = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match key.to_lowercase().as_str() {
                "pos" => pos = value.parse().ok(),
                "id" => id = value.parse().ok(),
                _ => rest.push((key, value)),
            }
        }
        Some(QueueEntry {
            pos: pos?,
            id: id?,
            track: Track::from_pairs(rest)?,
            current: None,
        })
    }
}

/// Result of `status`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct PlaybackStatus {
    pub state: PlayState,
    pub volume: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub songid: Option<u32>,
    pub playlistlength: u32,
    #[serde(serialize_with = "serialize_flag")]
    #[schema(value_type = String, example = "0")]
    pub repeat: bool,
    #[serde(serialize_with = "serialize_flag")]
    #[schema(value_type = String, example = "0")]
    pub random: bool,
    #[serde(serialize_with = "serialize_flag")]
    #[schema(value_type = String, example = "0")]
    pub single: bool,
    #[serde(serialize_with = "serialize_flag")]
    #[schema(value_type = String, example = "0")]
    pub consume: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updating_db: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlaybackStatus {
    pub fn from_pairs(pairs: Pairs) -> Self {
        let mut status = PlaybackStatus::default();
        let mut legacy_time: Option<(f64, f64)> = None;

        for (key, value) in pairs {
            match key.to_lowercase().as_str() {
                "state" => status.state = value.parse().unwrap_or_default(),
                // -1 when no mixer is available
                "volume" => status.volume = value.parse::<i32>().ok().and_then(|v| u8::try_from(v).ok()),
                "song" => status.song = value.parse().ok(),
                "songid" => status.songid = value.parse().ok(),
                "playlistlength" => status.playlistlength = value.parse().unwrap_or(0),
                "repeat" => status.repeat = parse_flag(&value),
                "random" => status.random = parse_flag(&value),
                "single" => status.single = parse_flag(&value),
                "consume" => status.consume = parse_flag(&value),
                "elapsed" => status.elapsed = value.parse().ok(),
                "duration" => status.duration = value.parse().ok(),
                "time" => {
                    if let Some((e, d)) = value.split_once(':') {
                        legacy_time = e.parse().ok().zip(d.parse().ok());
                    }
                }
                "updating_db" => status.updating_db = value.parse().ok(),
                "error" => status.error = Some(value),
                _ => {}
            }
        }

        if let Some((elapsed, duration)) = legacy_time {
            status.elapsed.get_or_insert(elapsed);
            status.duration.get_or_insert(duration);
        }
        if status.song.is_none() {
            status.elapsed = None;
            status.duration = None;
        }
        status
    }

    pub fn option(&self, option: PlaybackOption) -> bool {
        match option {
            PlaybackOption::Repeat => self.repeat,
            PlaybackOption::Random => self.random,
            PlaybackOption::Single => self.single,
            PlaybackOption::Consume => self.consume,
        }
    }
}

/// Result of `stats`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Stats {
    pub artists: u64,
    pub albums: u64,
    pub songs: u64,
    pub uptime: u64,
    pub playtime: u64,
    pub db_playtime: u64,
    pub db_update: u64,
}

impl Stats {
    pub fn from_pairs(pairs: Pairs) -> Self {
        let mut stats = Stats::default();
        for (key, value) in pairs {
            let Ok(n) = value.parse::<u64>() else {
                continue;
            };
            match key.to_lowercase().as_str() {
                "artists" => stats.artists = n,
                "albums" => stats.albums = n,
                "songs" => stats.songs = n,
                "uptime" => stats.uptime = n,
                "playtime" => stats.playtime = n,
                "db_playtime" => stats.db_playtime = n,
                "db_update" => stats.db_update = n,
                _ => {}
            }
        }
        stats
    }
}

/// An audio output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Output {
    pub outputid: u32,
    pub outputname: String,
    #[serde(serialize_with = "serialize_flag")]
    #[schema(value_type = String, example = "0")]
    pub outputenabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

impl Output {
    pub fn from_pairs(pairs: Pairs) -> Option<Self> {
        let mut id = None;
        let mut name = String::new();
        let mut enabled = false;
        let mut plugin = None;
        for (key, value) in pairs {
            match key.to_lowercase().as_str() {
                "outputid" => id = value.parse().ok(),
                "outputname" => name = value,
                "outputenabled" => enabled = parse_flag(&value),
                "plugin" => plugin = Some(value),
                _ => {}
            }
        }
        Some(Output {
            outputid: id?,
            outputname: name,
            outputenabled: enabled,
            plugin,
        })
    }
}

/// One row of a `count` answer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CountRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub songs: u64,
    pub playtime: u64,
}

impl CountRow {
    pub fn from_pairs(pairs: Pairs) -> Self {
        let mut row = CountRow::default();
        for (key, value) in pairs {
            match key.to_lowercase().as_str() {
                "songs" => row.songs = value.parse().unwrap_or(0),
                "playtime" => row.playtime = value.parse().unwrap_or(0),
                _ => row.group = Some(value),
            }
        }
        row
    }
}

/// Stored playlist summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct StoredPlaylist {
    pub playlist: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "last-modified")]
    pub last_modified: Option<String>,
}

/// Embedded cover art.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Picture {
    pub mime: String,
    pub data: Vec<u8>,
}

impl Picture {
    /// MIME type sniffed from the magic bytes, used when the daemon sends none.
    pub fn sniff_mime(data: &[u8]) -> &'static str {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            "image/jpeg"
        } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            "image/png"
        } else if data.starts_with(b"GIF8") {
            "image/gif"
        } else if data.len() > 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            "image/webp"
        } else {
            "application/octet-stream"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Pairs {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_track_from_pairs_keeps_unknown_tags() {
        let track = Track::from_pairs(pairs(&[
            ("file", "a/b.flac"),
            ("Title", "Song"),
            ("Artist", "One"),
            ("Artist", "Two"),
            ("Track", "3/12"),
            ("duration", "201.5"),
            ("MUSICBRAINZ_TRACKID", "xyz"),
        ]))
        .unwrap();

        assert_eq!(track.file, "a/b.flac");
        assert_eq!(track.artist.as_deref(), Some("One"));
        assert_eq!(track.ordinal(), Some(3));
        assert_eq!(track.duration, Some(201.5));
        assert_eq!(track.extra.get("musicbrainz_trackid").map(String::as_str), Some("xyz"));
    }

    #[test]
    fn test_track_without_file_is_rejected() {
        assert!(Track::from_pairs(pairs(&[("Title", "x")])).is_none());
    }

    #[test]
    fn test_display_title_fallbacks() {
        let mut track = Track::new("music/dir/song.mp3");
        assert_eq!(track.display_title(), "song.mp3");
        track.name = Some("Radio".into());
        assert_eq!(track.display_title(), "Radio");
        track.title = Some("Real".into());
        assert_eq!(track.display_title(), "Real");
    }

    #[test]
    fn test_album_sort_ordinal_then_title() {
        let mk = |title: &str, no: Option<&str>| Track {
            title: Some(title.into()),
            track: no.map(String::from),
            ..Track::new(title)
        };
        let mut tracks = vec![
            mk("Zeta", None),
            mk("Beta", Some("2")),
            mk("Alpha", None),
            mk("Gamma", Some("1/9")),
            mk("Delta", Some("2")),
        ];
        sort_album_tracks(&mut tracks);
        let titles: Vec<_> = tracks.iter().map(|t| t.display_title()).collect();
        assert_eq!(titles, vec!["Gamma", "Beta", "Delta", "Alpha", "Zeta"]);
    }

    #[test]
    fn test_split_records() {
        let records = split_records(
            pairs(&[
                ("file", "a"),
                ("Pos", "0"),
                ("Id", "10"),
                ("file", "b"),
                ("Pos", "1"),
                ("Id", "11"),
            ]),
            &["file"],
        );
        assert_eq!(records.len(), 2);
        let entry = QueueEntry::from_pairs(records[1].clone()).unwrap();
        assert_eq!((entry.pos, entry.id), (1, 11));
        assert_eq!(entry.track.file, "b");
    }

    #[test]
    fn test_status_serializes_flags_as_strings() {
        let status = PlaybackStatus::from_pairs(pairs(&[
            ("volume", "-1"),
            ("repeat", "1"),
            ("random", "0"),
            ("single", "oneshot"),
            ("consume", "0"),
            ("playlistlength", "3"),
            ("state", "pause"),
            ("song", "1"),
            ("songid", "101"),
            ("time", "12:300"),
        ]));
        assert_eq!(status.volume, None);
        assert_eq!(status.elapsed, Some(12.0));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["repeat"], "1");
        assert_eq!(json["random"], "0");
        assert_eq!(json["single"], "1");
        assert_eq!(json["state"], "pause");
        assert!(json["volume"].is_null());
    }

    #[test]
    fn test_status_drops_times_when_stopped() {
        let status = PlaybackStatus::from_pairs(pairs(&[("state", "stop"), ("elapsed", "3.0")]));
        assert_eq!(status.elapsed, None);
        assert_eq!(status.state, PlayState::Stop);
    }

    #[test]
    fn test_count_row_group() {
        let row = CountRow::from_pairs(pairs(&[("Artist", "X"), ("songs", "4"), ("playtime", "900")]));
        assert_eq!(row.group.as_deref(), Some("X"));
        assert_eq!(row.songs, 4);
    }

    #[test]
    fn test_tag_parse() {
        assert_eq!("AlbumArtist".parse::<Tag>(), Ok(Tag::AlbumArtist));
        assert!("composer".parse::<Tag>().is_err());
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(Picture::sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(Picture::sniff_mime(b"nope"), "application/octet-stream");
    }
}
