//! OpenAPI description of the JSON API.

use serde::Deserialize;
use utoipa::{OpenApi, ToSchema};

use crate::api::{ErrorResponse, TitleEntry};
use crate::model::{CountRow, Output, PlayState, PlaybackStatus, QueueEntry, Stats, StoredPlaylist, Track};

/// Body accepted by `POST /api/{action}`, as JSON or as a form field `data=<json>`.
///
/// Every field is optional; each action reads only the ones it needs.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ActionRequest {
    /// Queue position for `play`
    #[schema(example = 0)]
    pub id: Option<i64>,
    /// Queue ids for `remove`
    pub ids: Option<Vec<u32>>,
    /// Relative change for `volume`
    #[schema(example = 5)]
    pub volume: Option<i64>,
    /// Absolute level for `volume`, 0 to 100
    pub setvol: Option<i64>,
    /// `1` or `0` for `repeat`, `random`, `single` and `consume`
    #[schema(value_type = Option<String>, example = "1")]
    pub enabled: Option<String>,
    pub outputid: Option<u32>,
    /// Range start for `delete` and `move`
    pub from: Option<i64>,
    /// Range end for `delete` and `move`
    pub to: Option<i64>,
    /// Seconds into the current song for `seek`
    pub time: Option<f64>,
    /// Alternative to `time`, 0 to 100
    pub percentage: Option<f64>,
    /// Playlist name for `save`
    pub name: Option<String>,
    /// Stored playlist for `append`, `insert` and `removeplaylist`
    pub playlist: Option<String>,
    /// Path or URI for `add`
    pub entry: Option<String>,
    /// Single file for `append` and `insert`
    pub file: Option<String>,
    pub artist: Option<String>,
    pub albumartist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub genre: Option<String>,
    pub originaldate: Option<String>,
    pub label: Option<String>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MPDash API",
        version = "1.0.0",
        description = r#"
# MPDash JSON API

Reads the state of an MPD daemon and drives it.

## Read endpoints (`GET /api/{endpoint}`)

- `status`, `stats`, `outputs`, `playlists`, `queue`
- `info?pos=N` or `info?file=...` for one track
- `albumartists`, `artists`, `albums?artist=...`, `titles?album=...`
- `count?group=album&artist=...`
- `search?q=...` (at least three characters)
- `art?file=...`: embedded cover, `204` when the file has none

## Actions (`POST /api/{action}`)

- Transport: `play`, `pause`, `stop`, `next`, `previous`, `seek`
- Queue: `add`, `append`, `insert`, `clear`, `delete`, `move`, `remove`, `shuffle`
- Options: `repeat`, `random`, `single`, `consume`, `volume`
- Outputs: `enableoutput`, `disableoutput`
- Playlists and database: `save`, `removeplaylist`, `update`

Errors carry `{"error": "..."}`; a daemon that cannot be reached answers `503`.
        "#,
    ),
    paths(
        crate::mpdashserver_ext::api_get,
        crate::mpdashserver_ext::api_post,
    ),
    components(schemas(
        ActionRequest,
        ErrorResponse,
        TitleEntry,
        Track,
        QueueEntry,
        PlayState,
        PlaybackStatus,
        Stats,
        Output,
        CountRow,
        StoredPlaylist,
    )),
    tags(
        (name = "mpd", description = "MPD daemon state and control")
    )
)]
pub struct ApiDoc;
