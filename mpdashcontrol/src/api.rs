//! JSON API: read endpoints (`GET {prefix}/api/{endpoint}`) and actions
//! (`POST {prefix}/api/{action}`).

use std::collections::HashMap;
use std::str::FromStr;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};
use url::form_urlencoded;
use utoipa::ToSchema;

use crate::errors::MpdError;
use crate::model::{PlayState, PlaybackOption, QueueEntry, Tag, Track};
use crate::query::{ResourceQuery, TrackSelection};
use crate::queue::QueueEngine;
use crate::session::DaemonSession;
use crate::views::MIN_SEARCH_LEN;

/// JSON body of every error reply
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Daemon(#[from] MpdError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Daemon(MpdError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Daemon(MpdError::Command { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Daemon(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("API error: {}", self);
        } else {
            debug!("API error: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Successful answer of a read endpoint.
#[derive(Debug)]
pub enum ApiReply {
    Json(Value),
    Image { mime: String, data: Vec<u8> },
    NoContent,
}

/// Trimmed-down track used by listing endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct TitleEntry {
    pub track: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub file: Option<String>,
    pub artist: Option<String>,
    pub albumartist: Option<String>,
    pub album: Option<String>,
}

impl From<Track> for TitleEntry {
    fn from(track: Track) -> Self {
        Self {
            track: track.track,
            title: track.title,
            name: track.name,
            file: Some(track.file),
            artist: track.artist,
            albumartist: track.albumartist,
            album: track.album,
        }
    }
}

impl TitleEntry {
    fn title_only(title: String) -> Self {
        Self {
            track: None,
            title: Some(title),
            name: None,
            file: None,
            artist: None,
            albumartist: None,
            album: None,
        }
    }
}

fn to_json<T: Serialize>(value: T) -> ApiResult<ApiReply> {
    serde_json::to_value(value)
        .map(ApiReply::Json)
        .map_err(|e| ApiError::Daemon(MpdError::protocol(e.to_string())))
}

/// Queue listing with the current entry marked by its playback state.
pub async fn list_queue(session: &dyn DaemonSession) -> ApiResult<Vec<QueueEntry>> {
    let mut queue = session.playlist_info(None).await?;
    let status = session.status().await?;
    if let Some(song) = status.song {
        if let Some(entry) = queue.get_mut(song as usize) {
            entry.current = Some(status.state);
        }
    }
    Ok(queue)
}

/// Query string pairs, last value wins.
pub fn query_map(pairs: &[(String, String)]) -> HashMap<&str, &str> {
    pairs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

/// Serves `GET {prefix}/api/{endpoint}`.
pub async fn get_endpoint(
    session: &dyn DaemonSession,
    endpoint: &str,
    query: &[(String, String)],
) -> ApiResult<ApiReply> {
    let params = query_map(query);
    let filter = ResourceQuery::from_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    match endpoint {
        "albumartists" => to_json(session.list(Tag::AlbumArtist, &ResourceQuery::new()).await?),
        "albums" => {
            let filter = filter.restricted(&[Tag::Artist, Tag::AlbumArtist]);
            to_json(session.list(Tag::Album, &filter).await?)
        }
        "artists" => to_json(session.list(Tag::Artist, &ResourceQuery::new()).await?),

        "art" => {
            let file = params
                .get("file")
                .ok_or_else(|| ApiError::bad_request("Missing 'file' parameter"))?;
            match session.picture(file).await {
                Ok(Some(picture)) => Ok(ApiReply::Image {
                    mime: picture.mime,
                    data: picture.data,
                }),
                Ok(None) => Ok(ApiReply::NoContent),
                Err(e) if e.is_command() => Ok(ApiReply::NoContent),
                Err(e) => Err(e.into()),
            }
        }

        "count" => {
            let group = params
                .get("group")
                .map(|g| Tag::from_str(g).map_err(ApiError::BadRequest))
                .transpose()?;
            let rows = session.count(&filter, group).await?;
            match group {
                Some(_) => to_json(rows),
                None => to_json(rows.into_iter().next().unwrap_or_default()),
            }
        }

        "info" => {
            if let Some(pos) = params.get("pos") {
                let pos: u32 = pos
                    .parse()
                    .map_err(|_| ApiError::bad_request("Invalid parameter, 'pos'"))?;
                let entry = session.playlist_info(Some(pos)).await?.into_iter().next();
                return match entry {
                    Some(entry) => to_json(entry),
                    None => Err(ApiError::bad_request("Could not find details")),
                };
            }
            if filter.is_empty() {
                return Err(ApiError::bad_request("Could not find details"));
            }
            match session.find(&filter).await?.into_iter().next() {
                Some(track) => to_json(track),
                None => Err(ApiError::bad_request("Could not find details")),
            }
        }

        "outputs" => to_json(session.outputs().await?),

        "search" => {
            let term = params
                .get("query")
                .ok_or_else(|| ApiError::bad_request("Missing parameter, 'query'"))?
                .trim();
            if term.chars().count() < MIN_SEARCH_LEN {
                return Err(ApiError::bad_request(format!(
                    "Parameter 'query' needs at least {} characters",
                    MIN_SEARCH_LEN
                )));
            }
            let tracks = session.search(None, term).await?;
            to_json(tracks.into_iter().map(TitleEntry::from).collect::<Vec<_>>())
        }

        "playlists" => to_json(
            session
                .list_playlists()
                .await?
                .into_iter()
                .map(|p| p.playlist)
                .collect::<Vec<_>>(),
        ),

        "queue" => to_json(list_queue(session).await?),

        "stats" => {
            let stats = session.stats().await?;
            let version = session.version().await?;
            let updating_db = session.status().await?.updating_db;
            let mut value = serde_json::to_value(stats)
                .map_err(|e| ApiError::Daemon(MpdError::protocol(e.to_string())))?;
            if let Value::Object(map) = &mut value {
                map.insert("mpd_version".to_string(), json!(version));
                map.insert("updating_db".to_string(), json!(updating_db));
            }
            Ok(ApiReply::Json(value))
        }

        "status" => {
            let status = session.status().await?;
            let current = session.current_song().await?;
            let connection = session.peer().await?;
            let queue = list_queue(session).await?;
            let version = session.version().await?;
            Ok(ApiReply::Json(json!({
                "status": status,
                "currentsong": current.map(|t| json!(t)).unwrap_or_else(|| json!({})),
                "connection": connection,
                "queue": queue,
                "version": version,
            })))
        }

        "titles" => {
            if let Some(playlist) = params.get("playlist") {
                let tracks = session.list_playlist_info(playlist).await?;
                return to_json(tracks.into_iter().map(TitleEntry::from).collect::<Vec<_>>());
            }
            let filter = filter.restricted(&[
                Tag::Artist,
                Tag::AlbumArtist,
                Tag::Album,
                Tag::Genre,
                Tag::OriginalDate,
                Tag::Label,
            ]);
            let entries: Vec<TitleEntry> = if filter.is_empty() {
                session
                    .list(Tag::Title, &ResourceQuery::new())
                    .await?
                    .into_iter()
                    .map(TitleEntry::title_only)
                    .collect()
            } else {
                session
                    .find(&filter)
                    .await?
                    .into_iter()
                    .map(TitleEntry::from)
                    .collect()
            };
            to_json(entries)
        }

        other => Err(ApiError::NotFound(format!("Unknown endpoint: {}", other))),
    }
}

/// Actions accepted by `POST {prefix}/api/{action}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Add,
    Append,
    Clear,
    Delete,
    Insert,
    Move,
    Next,
    Pause,
    Play,
    Previous,
    Remove,
    RemovePlaylist,
    Save,
    Seek,
    SetOption(PlaybackOption),
    SetOutput(bool),
    Shuffle,
    Stop,
    Update,
    Volume,
}

impl FromStr for Action {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "add" => Action::Add,
            "append" => Action::Append,
            "clear" => Action::Clear,
            "delete" => Action::Delete,
            "insert" => Action::Insert,
            "move" => Action::Move,
            "next" => Action::Next,
            "pause" => Action::Pause,
            "play" => Action::Play,
            "previous" | "prev" => Action::Previous,
            "remove" => Action::Remove,
            "removeplaylist" => Action::RemovePlaylist,
            "save" => Action::Save,
            "seek" => Action::Seek,
            "repeat" => Action::SetOption(PlaybackOption::Repeat),
            "random" => Action::SetOption(PlaybackOption::Random),
            "single" => Action::SetOption(PlaybackOption::Single),
            "consume" => Action::SetOption(PlaybackOption::Consume),
            "enableoutput" => Action::SetOutput(true),
            "disableoutput" => Action::SetOutput(false),
            "shuffle" => Action::Shuffle,
            "stop" => Action::Stop,
            "update" => Action::Update,
            "volume" => Action::Volume,
            other => {
                return Err(ApiError::NotFound(format!(
                    "Unrecognised POST path: /{}",
                    other
                )));
            }
        })
    }
}

/// Decodes a POST body: JSON object, or a form whose `data` field holds one.
/// An empty body is `{}`.
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> ApiResult<Map<String, Value>> {
    let is_form = content_type
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    let text = if is_form && !body.is_empty() {
        form_urlencoded::parse(body)
            .find(|(k, _)| k == "data")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| ApiError::bad_request("Missing form field 'data'"))?
    } else {
        String::from_utf8(body.to_vec())
            .map_err(|_| ApiError::bad_request("Request body is not UTF-8"))?
    };

    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::bad_request("Request body must be a JSON object")),
        Err(e) => Err(ApiError::bad_request(format!("Invalid JSON: {}", e))),
    }
}

fn int_param(body: &Map<String, Value>, key: &str) -> ApiResult<Option<i64>> {
    let invalid = || ApiError::bad_request(format!("Invalid parameter, '{}'", key));
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn required_int(body: &Map<String, Value>, key: &str) -> ApiResult<i64> {
    int_param(body, key)?.ok_or_else(|| ApiError::bad_request(format!("Missing parameter, '{}'", key)))
}

fn required_u32(body: &Map<String, Value>, key: &str) -> ApiResult<u32> {
    u32::try_from(required_int(body, key)?)
        .map_err(|_| ApiError::bad_request(format!("Invalid parameter, '{}'", key)))
}

fn float_param(body: &Map<String, Value>, key: &str) -> ApiResult<Option<f64>> {
    let invalid = || ApiError::bad_request(format!("Invalid parameter, '{}'", key));
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn required_string(body: &Map<String, Value>, key: &str) -> ApiResult<String> {
    match body.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        None | Some(Value::Null) => Err(ApiError::bad_request(format!(
            "Missing parameter, '{}'",
            key
        ))),
        Some(_) => Err(ApiError::bad_request(format!("Invalid parameter, '{}'", key))),
    }
}

fn enabled_param(body: &Map<String, Value>) -> ApiResult<bool> {
    match body.get("enabled") {
        None | Some(Value::Null) => Ok(true),
        Some(Value::String(s)) if s == "1" => Ok(true),
        Some(Value::String(s)) if s == "0" => Ok(false),
        Some(Value::Number(n)) if n.as_i64() == Some(1) => Ok(true),
        Some(Value::Number(n)) if n.as_i64() == Some(0) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ApiError::bad_request(
            "Parameter, 'enabled', should be '1' or '0'",
        )),
    }
}

fn selection(body: &Map<String, Value>) -> ApiResult<TrackSelection> {
    TrackSelection::from_json(body).map_err(ApiError::BadRequest)
}

/// Runs one POST action and returns its JSON result.
pub async fn post_action(
    session: &dyn DaemonSession,
    engine: &QueueEngine,
    action: Action,
    body: &Map<String, Value>,
) -> ApiResult<Value> {
    debug!("POST action {:?} {:?}", action, body);

    let result = match action {
        Action::Add => {
            let entry = required_string(body, "entry")?;
            session.add(&entry).await?;
            json!({ "added": 1 })
        }

        Action::Append => json!({ "appended": engine.append(&selection(body)?).await? }),
        Action::Insert => json!({ "inserted": engine.insert(&selection(body)?).await? }),

        Action::Clear => json!({ "removed": engine.clear().await? }),

        Action::Delete => {
            let from = required_int(body, "from")?;
            let to = required_int(body, "to")?;
            json!({ "removed": engine.delete_range(from, to).await? })
        }

        Action::Move => {
            let from = required_u32(body, "from")?;
            let to = required_u32(body, "to")?;
            engine.move_entry(from, to).await?;
            json!({})
        }

        Action::Remove => {
            let removed = match body.get("ids") {
                Some(Value::Array(raw)) => {
                    let ids = raw
                        .iter()
                        .map(|v| match v {
                            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                            Value::String(s) => s.trim().parse().ok(),
                            _ => None,
                        })
                        .collect::<Option<Vec<u32>>>()
                        .ok_or_else(|| ApiError::bad_request("Invalid parameter, 'ids'"))?;
                    engine.remove_by_id(&ids).await?
                }
                Some(_) => return Err(ApiError::bad_request("Invalid parameter, 'ids'")),
                None => {
                    let mut removed = 0;
                    for tag in [Tag::Artist, Tag::AlbumArtist, Tag::Album, Tag::Title, Tag::Name] {
                        if let Some(Value::String(value)) = body.get(tag.as_str()) {
                            removed += engine.remove_by_field(tag, value).await?;
                        }
                    }
                    removed
                }
            };
            json!({ "removed": removed })
        }

        Action::Next => {
            session.next().await?;
            json!({})
        }

        Action::Previous => {
            session.previous().await?;
            json!({})
        }

        Action::Stop => {
            session.stop().await?;
            json!({})
        }

        Action::Shuffle => {
            session.shuffle().await?;
            json!({})
        }

        Action::Pause => {
            let status = session.status().await?;
            if status.state == PlayState::Stop && status.playlistlength > 0 {
                session.play(Some(0)).await?;
            } else {
                session.pause().await?;
            }
            json!({})
        }

        Action::Play => {
            let pos = match int_param(body, "id")? {
                Some(pos) => Some(
                    u32::try_from(pos).map_err(|_| ApiError::bad_request("Invalid parameter, 'id'"))?,
                ),
                None => None,
            };
            session.play(pos).await?;
            json!({})
        }

        Action::Seek => {
            if let Some(time) = float_param(body, "time")? {
                session.seek_current(time).await?;
            } else if let Some(percentage) = float_param(body, "percentage")? {
                let duration = session
                    .status()
                    .await?
                    .duration
                    .ok_or_else(|| ApiError::bad_request("Nothing is playing"))?;
                session
                    .seek_current(percentage.clamp(0.0, 100.0) / 100.0 * duration)
                    .await?;
            } else {
                return Err(ApiError::bad_request(
                    "Missing parameter 'time' or 'percentage'",
                ));
            }
            json!({})
        }

        Action::SetOption(option) => {
            session.set_option(option, enabled_param(body)?).await?;
            json!({})
        }

        Action::SetOutput(enabled) => {
            let id = required_u32(body, "outputid")?;
            session.set_output(id, enabled).await?;
            json!({})
        }

        Action::Save => {
            let name = required_string(body, "name")?;
            session.save(&name).await?;
            json!({ "saved": name })
        }

        Action::RemovePlaylist => {
            let name = required_string(body, "playlist")?;
            session.remove_playlist(&name).await?;
            json!({ "removed": name })
        }

        Action::Update => json!({ "updating_db": session.update().await? }),

        Action::Volume => {
            if let Some(delta) = int_param(body, "volume")? {
                let delta = i32::try_from(delta.clamp(-100, 100)).unwrap_or_default();
                session.change_volume(delta).await?;
            } else if let Some(volume) = int_param(body, "setvol")? {
                let volume = u8::try_from(volume)
                    .ok()
                    .filter(|v| *v <= 100)
                    .ok_or_else(|| ApiError::bad_request("Invalid parameter, 'setvol'"))?;
                session.set_volume(volume).await?;
            }
            json!({ "volume": session.status().await?.volume })
        }
    };

    Ok(result)
}
