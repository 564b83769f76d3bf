//! Dashboard views: run a matched route against the daemon and build a [`Page`].

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::MpdResult;
use crate::model::{
    Output, PlayState, PlaybackStatus, QueueEntry, Tag, Track, sort_album_tracks, sort_by_title,
};
use crate::query::{ResourceQuery, TrackSelection};
use crate::resolver::{Facet, RouteMatch, Shape, View, encode_path, encode_query};
use crate::session::DaemonSession;

/// Shortest accepted search term, in characters.
pub const MIN_SEARCH_LEN: usize = 3;

/// Everything a view needs besides the route.
#[derive(Clone)]
pub struct ViewContext {
    pub session: Arc<dyn DaemonSession>,
    pub prefix: String,
    pub files_url: Option<String>,
}

impl ViewContext {
    pub fn href<S: AsRef<str>>(&self, segments: &[S], shape: Shape) -> String {
        format!("{}{}", self.prefix, encode_path(segments, shape))
    }

    pub fn api(&self, action: &str) -> String {
        format!("{}/api/{}", self.prefix, action)
    }

    /// Link to a track's detail page, through the richest hierarchy its tags allow.
    pub fn track_href(&self, track: &Track) -> Option<String> {
        let album = track.album.as_deref().filter(|a| !a.is_empty())?;
        let title = track.title.as_deref().filter(|t| !t.is_empty())?;

        for facet in [Facet::AlbumArtists, Facet::Artists] {
            if let Some(value) = track.tag(facet.tag()).filter(|v| !v.is_empty()) {
                return Some(self.href(&[facet.segment(), value, album, title], Shape::Item));
            }
        }
        Some(self.href(&["albums", album, title], Shape::Item))
    }

    fn album_href(&self, track: &Track) -> Option<String> {
        let album = track.album.as_deref().filter(|a| !a.is_empty())?;
        for facet in [Facet::AlbumArtists, Facet::Artists] {
            if let Some(value) = track.tag(facet.tag()).filter(|v| !v.is_empty()) {
                return Some(self.href(&[facet.segment(), value, album], Shape::Collection));
            }
        }
        Some(self.href(&["albums", album], Shape::Collection))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Link {
    pub label: String,
    pub href: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Crumb {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackItem {
    #[serde(flatten)]
    pub track: Track,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueueItem {
    #[serde(flatten)]
    pub entry: QueueEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Property {
    pub key: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusPanel {
    pub status: PlaybackStatus,
    pub current: Option<Track>,
    pub outputs: Vec<Output>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "lowercase")]
pub enum PageBody {
    Links(Vec<Link>),
    Tracks {
        ordered: bool,
        tracks: Vec<TrackItem>,
    },
    Queue(Vec<QueueItem>),
    Properties(Vec<Property>),
    Status(StatusPanel),
    Message(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
    pub title: String,
    pub breadcrumbs: Vec<Crumb>,
    /// What the "add after current" / "append" buttons act upon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<TrackSelection>,
    pub body: PageBody,
    /// Seconds after which the browser should reload the page.
    #[serde(skip)]
    pub refresh: Option<u64>,
}

impl Page {
    fn new(title: impl Into<String>, body: PageBody) -> Self {
        Self {
            title: title.into(),
            breadcrumbs: Vec::new(),
            selection: None,
            body,
            refresh: None,
        }
    }

    fn with_crumbs(mut self, crumbs: Vec<Crumb>) -> Self {
        if let Some(last) = crumbs.last() {
            self.title = last.label.clone();
        }
        self.breadcrumbs = crumbs;
        self
    }

    fn with_selection(mut self, selection: TrackSelection) -> Self {
        self.selection = Some(selection);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Page(Box<Page>),
    /// Absolute location for a 301.
    Redirect(String),
    NotFound,
}

impl From<Page> for Resolution {
    fn from(page: Page) -> Self {
        Resolution::Page(Box::new(page))
    }
}

fn crumb(label: &str, href: Option<String>) -> Crumb {
    Crumb {
        label: label.to_string(),
        href,
    }
}

/// Redirect location carrying the request's query string.
fn with_query(mut location: String, query: &[(String, String)]) -> String {
    if !query.is_empty() {
        location.push('?');
        location.push_str(&encode_query(query));
    }
    location
}

fn value_links(ctx: &ViewContext, root: &str, values: Vec<String>) -> Vec<Link> {
    values
        .into_iter()
        .filter(|v| !v.is_empty())
        .map(|v| Link {
            href: ctx.href(&[root, v.as_str()], Shape::Collection),
            label: v,
        })
        .collect()
}

/// Reload hint while something plays: the time left in the song, at most 30 s.
fn refresh_hint(status: &PlaybackStatus) -> Option<u64> {
    if status.state != PlayState::Play {
        return None;
    }
    let left = match (status.elapsed, status.duration) {
        (Some(elapsed), Some(duration)) if duration > elapsed => (duration - elapsed).ceil() as u64,
        _ => 30,
    };
    Some(left.clamp(1, 30))
}

fn properties(ctx: &ViewContext, track: &Track) -> Vec<Property> {
    let Ok(Value::Object(map)) = serde_json::to_value(track) else {
        return Vec::new();
    };

    // serde_json maps iterate in key order
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            let href = match key.as_str() {
                "artist" => Some(ctx.href(&["artists", value.as_str()], Shape::Collection)),
                "albumartist" => Some(ctx.href(&["albumartists", value.as_str()], Shape::Collection)),
                "genre" => Some(ctx.href(&["genres", value.as_str()], Shape::Collection)),
                "originaldate" => Some(ctx.href(&["dates", value.as_str()], Shape::Collection)),
                "label" => Some(ctx.href(&["labels", value.as_str()], Shape::Collection)),
                "album" => ctx.album_href(track),
                "title" => ctx.track_href(track),
                "file" => ctx
                    .files_url
                    .as_ref()
                    .map(|base| format!("{}/{}", base, value.trim_start_matches('/'))),
                _ => None,
            }
            .filter(|_| !value.is_empty());
            Property { key, value, href }
        })
        .collect()
}

fn track_items(ctx: &ViewContext, tracks: Vec<Track>) -> Vec<TrackItem> {
    tracks
        .into_iter()
        .map(|track| TrackItem {
            href: ctx.track_href(&track),
            track,
        })
        .collect()
}

/// Items of an album listing, linking below `base` (the album's own path).
fn album_items(ctx: &ViewContext, base: &[&str], tracks: Vec<Track>) -> Vec<TrackItem> {
    tracks
        .into_iter()
        .map(|track| {
            let href = track.title.as_deref().filter(|t| !t.is_empty()).map(|title| {
                let mut segments = base.to_vec();
                segments.push(title);
                ctx.href(&segments, Shape::Item)
            });
            TrackItem { track, href }
        })
        .collect()
}

/// Runs the view of a matched route.
pub async fn render_view(
    ctx: &ViewContext,
    route: &RouteMatch,
    query: &[(String, String)],
) -> MpdResult<Resolution> {
    let session = &ctx.session;
    let cap = |i: usize| route.captures.get(i).map(String::as_str).unwrap_or_default();
    debug!("Rendering {:?} {:?}", route.view, route.captures);

    let resolution: Resolution = match route.view {
        View::Status => {
            let status = session.status().await?;
            let current = session.current_song().await?;
            let outputs = session.outputs().await?;
            let refresh = refresh_hint(&status);
            let mut page = Page::new(
                "Status",
                PageBody::Status(StatusPanel {
                    status,
                    current,
                    outputs,
                }),
            );
            page.refresh = refresh;
            page.into()
        }

        View::Queue => {
            let status = session.status().await?;
            let mut entries = session.playlist_info(None).await?;
            if let Some(song) = status.song {
                if let Some(entry) = entries.get_mut(song as usize) {
                    entry.current = Some(status.state);
                }
            }
            let items = entries
                .into_iter()
                .map(|entry| QueueItem {
                    href: ctx.track_href(&entry.track),
                    entry,
                })
                .collect();
            let mut page = Page::new("Queue", PageBody::Queue(items));
            page.refresh = refresh_hint(&status);
            page.into()
        }

        View::Search => {
            let term = query
                .iter()
                .rev()
                .find(|(k, _)| k == "s")
                .map(|(_, v)| v.trim())
                .unwrap_or_default();

            if term.chars().count() < MIN_SEARCH_LEN {
                Page::new(
                    "Search Results",
                    PageBody::Message(format!(
                        "Type at least {} characters to search.",
                        MIN_SEARCH_LEN
                    )),
                )
                .into()
            } else {
                let mut tracks = session.search(None, term).await?;
                sort_by_title(&mut tracks);
                Page::new(
                    "Search Results",
                    PageBody::Tracks {
                        ordered: false,
                        tracks: track_items(ctx, tracks),
                    },
                )
                .into()
            }
        }

        View::Playlists => {
            let names = session
                .list_playlists()
                .await?
                .into_iter()
                .map(|p| p.playlist)
                .collect();
            Page::new("Playlists", PageBody::Links(value_links(ctx, "playlists", names))).into()
        }

        View::Playlist => {
            let name = cap(0);
            match session.list_playlist_info(name).await {
                Ok(tracks) => Page::new(
                    name,
                    PageBody::Tracks {
                        ordered: true,
                        tracks: track_items(ctx, tracks),
                    },
                )
                .with_crumbs(vec![
                    crumb("Playlists", Some(ctx.href(&["playlists"], Shape::Collection))),
                    crumb(name, None),
                ])
                .with_selection(TrackSelection::Playlist(name.to_string()))
                .into(),
                Err(e) if e.is_not_found() => Resolution::NotFound,
                Err(e) => return Err(e),
            }
        }

        View::FacetValues(facet) => {
            let values = session.list(facet.tag(), &ResourceQuery::new()).await?;
            Page::new(
                facet.label(),
                PageBody::Links(value_links(ctx, facet.segment(), values)),
            )
            .into()
        }

        View::FacetValue(facet) => {
            let value = cap(0);
            let filter = ResourceQuery::new().with(facet.tag(), value);
            let albums = session.list(Tag::Album, &filter).await?;

            let mut links = vec![Link {
                label: "All tracks".to_string(),
                href: ctx.href(&["tracks", facet.tag().as_str(), value], Shape::Collection),
            }];
            links.extend(
                albums
                    .into_iter()
                    .filter(|a| !a.is_empty())
                    .map(|album| Link {
                        href: ctx.href(&[facet.segment(), value, album.as_str()], Shape::Collection),
                        label: album,
                    }),
            );

            Page::new(value, PageBody::Links(links))
                .with_crumbs(vec![
                    crumb(facet.label(), Some(ctx.href(&[facet.segment()], Shape::Collection))),
                    crumb(value, None),
                ])
                .with_selection(TrackSelection::Search(filter))
                .into()
        }

        View::FacetAlbum(facet) => {
            let (value, album) = (cap(0), cap(1));
            // "tracks" is the all-tracks link of a facet value
            if album == "tracks" {
                return Ok(Resolution::Redirect(with_query(
                    ctx.href(&["tracks", facet.tag().as_str(), value], Shape::Collection),
                    query,
                )));
            }
            let filter = ResourceQuery::new()
                .with(facet.tag(), value)
                .with(Tag::Album, album);
            let mut tracks = session.find(&filter).await?;
            sort_album_tracks(&mut tracks);

            Page::new(
                album,
                PageBody::Tracks {
                    ordered: true,
                    tracks: album_items(ctx, &[facet.segment(), value, album], tracks),
                },
            )
            .with_crumbs(vec![
                crumb(facet.label(), Some(ctx.href(&[facet.segment()], Shape::Collection))),
                crumb(value, Some(ctx.href(&[facet.segment(), value], Shape::Collection))),
                crumb(album, None),
            ])
            .with_selection(TrackSelection::Search(filter))
            .into()
        }

        View::FacetTrack(facet) => {
            let (value, album, title) = (cap(0), cap(1), cap(2));
            let filter = ResourceQuery::new()
                .with(facet.tag(), value)
                .with(Tag::Album, album)
                .with(Tag::Title, title);
            match session.find(&filter).await?.into_iter().next() {
                Some(track) => Page::new(title, PageBody::Properties(properties(ctx, &track)))
                    .with_crumbs(vec![
                        crumb(facet.label(), Some(ctx.href(&[facet.segment()], Shape::Collection))),
                        crumb(value, Some(ctx.href(&[facet.segment(), value], Shape::Collection))),
                        crumb(
                            album,
                            Some(ctx.href(&[facet.segment(), value, album], Shape::Collection)),
                        ),
                        crumb(title, None),
                    ])
                    .with_selection(TrackSelection::File(track.file.clone()))
                    .into(),
                None => Resolution::NotFound,
            }
        }

        View::Albums => {
            let albums = session.list(Tag::Album, &ResourceQuery::new()).await?;
            Page::new("Albums", PageBody::Links(value_links(ctx, "albums", albums))).into()
        }

        View::AlbumTracks => {
            let album = cap(0);
            let filter = ResourceQuery::new().with(Tag::Album, album);
            let mut tracks = session.find(&filter).await?;
            sort_album_tracks(&mut tracks);

            Page::new(
                album,
                PageBody::Tracks {
                    ordered: true,
                    tracks: album_items(ctx, &["albums", album], tracks),
                },
            )
            .with_crumbs(vec![
                crumb("Albums", Some(ctx.href(&["albums"], Shape::Collection))),
                crumb(album, None),
            ])
            .with_selection(TrackSelection::Search(filter))
            .into()
        }

        View::AlbumTrack => {
            let (album, title) = (cap(0), cap(1));
            let filter = ResourceQuery::new()
                .with(Tag::Album, album)
                .with(Tag::Title, title);
            match session.find(&filter).await?.into_iter().next() {
                Some(track) => Page::new(title, PageBody::Properties(properties(ctx, &track)))
                    .with_crumbs(vec![
                        crumb("Albums", Some(ctx.href(&["albums"], Shape::Collection))),
                        crumb(album, Some(ctx.href(&["albums", album], Shape::Collection))),
                        crumb(title, None),
                    ])
                    .with_selection(TrackSelection::File(track.file.clone()))
                    .into(),
                None => Resolution::NotFound,
            }
        }

        View::Titles => {
            let titles = session.list(Tag::Title, &ResourceQuery::new()).await?;
            let links = titles
                .into_iter()
                .filter(|t| !t.is_empty())
                .map(|t| Link {
                    href: ctx.href(&["tracks", "title", t.as_str()], Shape::Collection),
                    label: t,
                })
                .collect();
            Page::new("Tracks", PageBody::Links(links)).into()
        }

        View::TracksByTag => {
            let (raw_tag, value) = (cap(0), cap(1));
            match raw_tag.parse::<Tag>() {
                Ok(Tag::Album) => Resolution::Redirect(with_query(
                    ctx.href(&["albums", value], Shape::Collection),
                    query,
                )),
                Ok(tag) => {
                    let filter = ResourceQuery::new().with(tag, value);
                    let mut tracks = session.find(&filter).await?;
                    sort_by_title(&mut tracks);
                    Page::new(
                        value,
                        PageBody::Tracks {
                            ordered: false,
                            tracks: track_items(ctx, tracks),
                        },
                    )
                    .with_crumbs(vec![
                        crumb("Tracks", Some(ctx.href(&["tracks"], Shape::Collection))),
                        crumb(tag.as_str(), None),
                        crumb(value, None),
                    ])
                    .with_selection(TrackSelection::Search(filter))
                    .into()
                }
                Err(_) => Resolution::NotFound,
            }
        }
    };

    Ok(resolution)
}
