//! Daemon session: the single shared handle every request goes through.
//!
//! [`MpdSession`] connects lazily. Before each call an existing connection is probed
//! with `ping`; if the probe fails (or nothing is connected yet) exactly one connection
//! attempt is made. All calls are serialized through one async mutex.

use std::time::Duration;

use async_trait::async_trait;
use mpdashconfig::get_config;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::errors::{MpdError, MpdResult};
use crate::model::{
    CountRow, Output, PlaybackOption, PlaybackStatus, Picture, QueueEntry, Stats,
    StoredPlaylist, Tag, Track, split_records,
};
use crate::protocol::{Command, MpdConnection, Response, version_at_least};
use crate::query::ResourceQuery;

// ACK code for an unknown command
const ACK_ERROR_UNKNOWN: u32 = 5;

/// Query and command surface of the daemon used by the dashboard.
#[async_trait]
pub trait DaemonSession: Send + Sync {
    /// Protocol version announced by the daemon.
    async fn version(&self) -> MpdResult<String>;
    /// `host:port` of the connected peer.
    async fn peer(&self) -> MpdResult<String>;
    /// Drops the current connection (if any) and connects again.
    async fn reconnect(&self) -> MpdResult<()>;

    async fn status(&self) -> MpdResult<PlaybackStatus>;
    async fn current_song(&self) -> MpdResult<Option<Track>>;
    async fn stats(&self) -> MpdResult<Stats>;

    /// Exact match on every tag of `query`.
    async fn find(&self, query: &ResourceQuery) -> MpdResult<Vec<Track>>;
    /// Case-insensitive substring search; `None` searches any tag.
    async fn search(&self, scope: Option<Tag>, term: &str) -> MpdResult<Vec<Track>>;
    /// Distinct values of `tag` among tracks matching `filter`.
    async fn list(&self, tag: Tag, filter: &ResourceQuery) -> MpdResult<Vec<String>>;
    async fn count(&self, filter: &ResourceQuery, group: Option<Tag>) -> MpdResult<Vec<CountRow>>;

    /// Whole queue, or the single entry at `pos`.
    async fn playlist_info(&self, pos: Option<u32>) -> MpdResult<Vec<QueueEntry>>;
    async fn add(&self, uri: &str) -> MpdResult<()>;
    /// Adds `uri` at `pos` (end of queue when `None`) and returns the new id.
    async fn add_id(&self, uri: &str, pos: Option<u32>) -> MpdResult<u32>;
    /// Deletes positions `start..end`.
    async fn delete_range(&self, start: u32, end: u32) -> MpdResult<()>;
    async fn delete_id(&self, id: u32) -> MpdResult<()>;
    async fn move_entry(&self, from: u32, to: u32) -> MpdResult<()>;
    async fn clear(&self) -> MpdResult<()>;
    async fn shuffle(&self) -> MpdResult<()>;

    async fn load(&self, playlist: &str) -> MpdResult<()>;
    async fn save(&self, playlist: &str) -> MpdResult<()>;
    async fn remove_playlist(&self, playlist: &str) -> MpdResult<()>;
    async fn list_playlists(&self) -> MpdResult<Vec<StoredPlaylist>>;
    async fn list_playlist(&self, playlist: &str) -> MpdResult<Vec<String>>;
    async fn list_playlist_info(&self, playlist: &str) -> MpdResult<Vec<Track>>;

    async fn play(&self, pos: Option<u32>) -> MpdResult<()>;
    /// Toggles pause.
    async fn pause(&self) -> MpdResult<()>;
    async fn stop(&self) -> MpdResult<()>;
    async fn next(&self) -> MpdResult<()>;
    async fn previous(&self) -> MpdResult<()>;
    async fn seek_current(&self, seconds: f64) -> MpdResult<()>;
    async fn change_volume(&self, delta: i32) -> MpdResult<()>;
    async fn set_volume(&self, volume: u8) -> MpdResult<()>;
    async fn set_option(&self, option: PlaybackOption, enabled: bool) -> MpdResult<()>;

    async fn outputs(&self) -> MpdResult<Vec<Output>>;
    async fn set_output(&self, id: u32, enabled: bool) -> MpdResult<()>;
    /// Starts a database update and returns its job id.
    async fn update(&self) -> MpdResult<u32>;
    /// Cover art for `uri`, `None` when the daemon has none.
    async fn picture(&self, uri: &str) -> MpdResult<Option<Picture>>;
}

struct Connected {
    conn: MpdConnection<TcpStream>,
    peer: String,
}

/// TCP session to a running MPD.
pub struct MpdSession {
    host: String,
    port: u16,
    timeout: Duration,
    slot: Mutex<Option<Connected>>,
}

impl MpdSession {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            slot: Mutex::new(None),
        }
    }

    /// Session using `mpd.host`, `mpd.port` and `mpd.timeout_secs`.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            config.get_mpd_host(),
            config.get_mpd_port(),
            config.get_mpd_timeout(),
        )
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> MpdResult<Connected> {
        let address = self.address();
        let attempt = async {
            let stream = TcpStream::connect(&address).await?;
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| address.clone());
            let conn = MpdConnection::handshake(stream).await?;
            Ok::<_, MpdError>(Connected { conn, peer })
        };

        match timeout(self.timeout, attempt).await {
            Ok(Ok(connected)) => {
                info!(
                    "Connected to MPD on {} (version {})",
                    connected.peer,
                    connected.conn.version()
                );
                Ok(connected)
            }
            Ok(Err(e)) => {
                warn!("Cannot connect to MPD at {}: {}", address, e);
                Err(MpdError::Unavailable(address))
            }
            Err(_) => {
                warn!("Connection to MPD at {} timed out", address);
                Err(MpdError::Unavailable(address))
            }
        }
    }

    /// Makes sure `slot` holds a live connection: ping, then one reconnect.
    async fn ensure(&self, slot: &mut Option<Connected>) -> MpdResult<()> {
        if let Some(connected) = slot.as_mut() {
            match timeout(self.timeout, connected.conn.execute(&Command::new("ping"))).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => debug!("MPD ping failed: {}", e),
                Err(_) => debug!("MPD ping timed out"),
            }
            *slot = None;
        }

        *slot = Some(self.connect().await?);
        Ok(())
    }

    /// Sends one command on an ensured slot; drops the connection when it broke.
    async fn exec(&self, slot: &mut Option<Connected>, command: &Command) -> MpdResult<Response> {
        let Some(connected) = slot.as_mut() else {
            return Err(MpdError::Unavailable(self.address()));
        };

        let result = match timeout(self.timeout, connected.conn.execute(command)).await {
            Ok(result) => result,
            Err(_) => Err(MpdError::Timeout(self.timeout)),
        };

        if let Err(e) = &result {
            if e.breaks_connection() {
                warn!("MPD connection lost during '{}': {}", command.name(), e);
                *slot = None;
            }
        }
        result
    }

    async fn run(&self, command: Command) -> MpdResult<Response> {
        let mut slot = self.slot.lock().await;
        self.ensure(&mut slot).await?;
        self.exec(&mut slot, &command).await
    }

    async fn run_ok(&self, command: Command) -> MpdResult<()> {
        self.run(command).await.map(|_| ())
    }

    async fn tracks(&self, command: Command) -> MpdResult<Vec<Track>> {
        let response = self.run(command).await?;
        Ok(split_records(response.pairs, &["file"])
            .into_iter()
            .filter_map(Track::from_pairs)
            .collect())
    }
}

#[async_trait]
impl DaemonSession for MpdSession {
    async fn version(&self) -> MpdResult<String> {
        let mut slot = self.slot.lock().await;
        self.ensure(&mut slot).await?;
        slot.as_ref()
            .map(|c| c.conn.version().to_string())
            .ok_or_else(|| MpdError::Unavailable(self.address()))
    }

    async fn peer(&self) -> MpdResult<String> {
        let mut slot = self.slot.lock().await;
        self.ensure(&mut slot).await?;
        slot.as_ref()
            .map(|c| c.peer.clone())
            .ok_or_else(|| MpdError::Unavailable(self.address()))
    }

    async fn reconnect(&self) -> MpdResult<()> {
        let mut slot = self.slot.lock().await;
        *slot = None;
        *slot = Some(self.connect().await?);
        Ok(())
    }

    async fn status(&self) -> MpdResult<PlaybackStatus> {
        let response = self.run(Command::new("status")).await?;
        Ok(PlaybackStatus::from_pairs(response.pairs))
    }

    async fn current_song(&self) -> MpdResult<Option<Track>> {
        let response = self.run(Command::new("currentsong")).await?;
        Ok(Track::from_pairs(response.pairs))
    }

    async fn stats(&self) -> MpdResult<Stats> {
        let response = self.run(Command::new("stats")).await?;
        Ok(Stats::from_pairs(response.pairs))
    }

    async fn find(&self, query: &ResourceQuery) -> MpdResult<Vec<Track>> {
        self.tracks(Command::new("find").args(query.to_args())).await
    }

    async fn search(&self, scope: Option<Tag>, term: &str) -> MpdResult<Vec<Track>> {
        let scope = scope.map(|t| t.as_str()).unwrap_or("any");
        self.tracks(Command::new("search").arg(scope).arg(term)).await
    }

    async fn list(&self, tag: Tag, filter: &ResourceQuery) -> MpdResult<Vec<String>> {
        let response = self
            .run(Command::new("list").arg(tag).args(filter.to_args()))
            .await?;
        Ok(response.values(tag.as_str()))
    }

    async fn count(&self, filter: &ResourceQuery, group: Option<Tag>) -> MpdResult<Vec<CountRow>> {
        let mut command = Command::new("count").args(filter.to_args());
        if let Some(group) = group {
            command = command.arg("group").arg(group);
        }
        let response = self.run(command).await?;

        let records = match group {
            Some(group) => split_records(response.pairs, &[group.as_str()]),
            None => vec![response.pairs],
        };
        Ok(records.into_iter().map(CountRow::from_pairs).collect())
    }

    async fn playlist_info(&self, pos: Option<u32>) -> MpdResult<Vec<QueueEntry>> {
        let mut command = Command::new("playlistinfo");
        if let Some(pos) = pos {
            command = command.arg(pos);
        }
        let response = self.run(command).await?;
        Ok(split_records(response.pairs, &["file"])
            .into_iter()
            .filter_map(QueueEntry::from_pairs)
            .collect())
    }

    async fn add(&self, uri: &str) -> MpdResult<()> {
        self.run_ok(Command::new("add").arg(uri)).await
    }

    async fn add_id(&self, uri: &str, pos: Option<u32>) -> MpdResult<u32> {
        let mut command = Command::new("addid").arg(uri);
        if let Some(pos) = pos {
            command = command.arg(pos);
        }
        let response = self.run(command).await?;
        response
            .get("Id")
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| MpdError::protocol("addid returned no Id"))
    }

    async fn delete_range(&self, start: u32, end: u32) -> MpdResult<()> {
        self.run_ok(Command::new("delete").arg(format!("{}:{}", start, end)))
            .await
    }

    async fn delete_id(&self, id: u32) -> MpdResult<()> {
        self.run_ok(Command::new("deleteid").arg(id)).await
    }

    async fn move_entry(&self, from: u32, to: u32) -> MpdResult<()> {
        self.run_ok(Command::new("move").arg(from).arg(to)).await
    }

    async fn clear(&self) -> MpdResult<()> {
        self.run_ok(Command::new("clear")).await
    }

    async fn shuffle(&self) -> MpdResult<()> {
        self.run_ok(Command::new("shuffle")).await
    }

    async fn load(&self, playlist: &str) -> MpdResult<()> {
        self.run_ok(Command::new("load").arg(playlist)).await
    }

    async fn save(&self, playlist: &str) -> MpdResult<()> {
        self.run_ok(Command::new("save").arg(playlist)).await
    }

    async fn remove_playlist(&self, playlist: &str) -> MpdResult<()> {
        self.run_ok(Command::new("rm").arg(playlist)).await
    }

    async fn list_playlists(&self) -> MpdResult<Vec<StoredPlaylist>> {
        let response = self.run(Command::new("listplaylists")).await?;
        Ok(split_records(response.pairs, &["playlist"])
            .into_iter()
            .filter_map(|record| {
                let mut playlist = None;
                let mut last_modified = None;
                for (key, value) in record {
                    match key.to_lowercase().as_str() {
                        "playlist" => playlist = Some(value),
                        "last-modified" => last_modified = Some(value),
                        _ => {}
                    }
                }
                Some(StoredPlaylist {
                    playlist: playlist?,
                    last_modified,
                })
            })
            .collect())
    }

    async fn list_playlist(&self, playlist: &str) -> MpdResult<Vec<String>> {
        let response = self.run(Command::new("listplaylist").arg(playlist)).await?;
        Ok(response.values("file"))
    }

    async fn list_playlist_info(&self, playlist: &str) -> MpdResult<Vec<Track>> {
        self.tracks(Command::new("listplaylistinfo").arg(playlist))
            .await
    }

    async fn play(&self, pos: Option<u32>) -> MpdResult<()> {
        let mut command = Command::new("play");
        if let Some(pos) = pos {
            command = command.arg(pos);
        }
        self.run_ok(command).await
    }

    async fn pause(&self) -> MpdResult<()> {
        self.run_ok(Command::new("pause")).await
    }

    async fn stop(&self) -> MpdResult<()> {
        self.run_ok(Command::new("stop")).await
    }

    async fn next(&self) -> MpdResult<()> {
        self.run_ok(Command::new("next")).await
    }

    async fn previous(&self) -> MpdResult<()> {
        self.run_ok(Command::new("previous")).await
    }

    async fn seek_current(&self, seconds: f64) -> MpdResult<()> {
        self.run_ok(Command::new("seekcur").arg(format!("{:.3}", seconds.max(0.0))))
            .await
    }

    async fn change_volume(&self, delta: i32) -> MpdResult<()> {
        match self.run_ok(Command::new("volume").arg(delta)).await {
            // `volume` only exists on recent daemons
            Err(MpdError::Command { code, .. }) if code == ACK_ERROR_UNKNOWN => {
                let current = self.status().await?.volume.unwrap_or(0);
                let target = (i32::from(current) + delta).clamp(0, 100);
                self.set_volume(target as u8).await
            }
            other => other,
        }
    }

    async fn set_volume(&self, volume: u8) -> MpdResult<()> {
        self.run_ok(Command::new("setvol").arg(volume.min(100))).await
    }

    async fn set_option(&self, option: PlaybackOption, enabled: bool) -> MpdResult<()> {
        self.run_ok(Command::new(option.as_str()).arg(if enabled { 1 } else { 0 }))
            .await
    }

    async fn outputs(&self) -> MpdResult<Vec<Output>> {
        let response = self.run(Command::new("outputs")).await?;
        Ok(split_records(response.pairs, &["outputid"])
            .into_iter()
            .filter_map(Output::from_pairs)
            .collect())
    }

    async fn set_output(&self, id: u32, enabled: bool) -> MpdResult<()> {
        let name = if enabled { "enableoutput" } else { "disableoutput" };
        self.run_ok(Command::new(name).arg(id)).await
    }

    async fn update(&self) -> MpdResult<u32> {
        let response = self.run(Command::new("update")).await?;
        response
            .get("updating_db")
            .and_then(|job| job.parse().ok())
            .ok_or_else(|| MpdError::protocol("update returned no job id"))
    }

    async fn picture(&self, uri: &str) -> MpdResult<Option<Picture>> {
        let mut slot = self.slot.lock().await;
        self.ensure(&mut slot).await?;

        let name = match slot.as_ref() {
            Some(c) if version_at_least(c.conn.version(), 0, 22) => "readpicture",
            _ => "albumart",
        };

        let mut data: Vec<u8> = Vec::new();
        let mut mime: Option<String> = None;
        loop {
            let command = Command::new(name).arg(uri).arg(data.len());
            let response = match self.exec(&mut slot, &command).await {
                Ok(response) => response,
                Err(e) if e.is_not_found() => return Ok(None),
                Err(e) => return Err(e),
            };

            let Some(chunk) = response.binary.as_ref().filter(|c| !c.is_empty()) else {
                break;
            };
            data.extend_from_slice(chunk);
            if mime.is_none() {
                mime = response.get("type").map(str::to_string);
            }

            let size: usize = response
                .get("size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(data.len());
            if data.len() >= size {
                break;
            }
        }

        if data.is_empty() {
            return Ok(None);
        }
        let mime = mime.unwrap_or_else(|| Picture::sniff_mime(&data).to_string());
        Ok(Some(Picture { mime, data }))
    }
}
