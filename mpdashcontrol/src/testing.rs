//! In-memory daemon used by the tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::{ACK_ERROR_NO_EXIST, MpdError, MpdResult};
use crate::model::{
    CountRow, Output, PlayState, PlaybackOption, PlaybackStatus, Picture, QueueEntry, Stats,
    StoredPlaylist, Tag, Track,
};
use crate::query::ResourceQuery;
use crate::session::DaemonSession;

#[derive(Default)]
struct State {
    library: Vec<Track>,
    queue: Vec<(u32, Track)>,
    next_id: u32,
    current: Option<usize>,
    state: PlayState,
    volume: u8,
    options: [bool; 4],
    playlists: BTreeMap<String, Vec<String>>,
    outputs: Vec<Output>,
    pictures: BTreeMap<String, Picture>,
    calls: Vec<String>,
    unavailable: bool,
}

pub struct MemoryDaemon {
    state: Mutex<State>,
}

fn no_exist(command: &str, message: impl Into<String>) -> MpdError {
    MpdError::Command {
        code: ACK_ERROR_NO_EXIST,
        command: command.to_string(),
        message: message.into(),
    }
}

fn option_index(option: PlaybackOption) -> usize {
    match option {
        PlaybackOption::Repeat => 0,
        PlaybackOption::Random => 1,
        PlaybackOption::Single => 2,
        PlaybackOption::Consume => 3,
    }
}

pub fn track(file: &str, artist: &str, album: &str, title: &str, no: Option<&str>) -> Track {
    Track {
        artist: Some(artist.to_string()),
        albumartist: Some(artist.to_string()),
        album: Some(album.to_string()),
        title: Some(title.to_string()),
        track: no.map(str::to_string),
        ..Track::new(file)
    }
}

impl MemoryDaemon {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 100,
                volume: 50,
                outputs: vec![Output {
                    outputid: 0,
                    outputname: "Speakers".to_string(),
                    outputenabled: true,
                    plugin: Some("alsa".to_string()),
                }],
                ..Default::default()
            }),
        }
    }

    /// Library with two albums by "Foo" and one by "Bar".
    pub fn with_library() -> Self {
        let daemon = Self::new();
        daemon.set_library(vec![
            track("foo/a/2.flac", "Foo", "Foo", "Second", Some("2/3")),
            track("foo/a/1.flac", "Foo", "Foo", "First", Some("1/3")),
            track("foo/a/x.flac", "Foo", "Foo", "Bonus", None),
            track("foo/b/1.flac", "Foo", "Live", "Opening", Some("1")),
            track("bar/c/1.flac", "Bar", "Rock/Roll", "Anthem", Some("1")),
        ]);
        daemon
    }

    pub fn set_library(&self, library: Vec<Track>) {
        self.lock().library = library;
    }

    /// Fills the queue with `files`, ids starting at 100.
    pub fn set_queue(&self, files: &[&str]) {
        let mut state = self.lock();
        state.queue.clear();
        state.next_id = 100;
        for file in files {
            let id = state.next_id;
            state.next_id += 1;
            let track = state
                .library
                .iter()
                .find(|t| t.file == *file)
                .cloned()
                .unwrap_or_else(|| Track::new(*file));
            state.queue.push((id, track));
        }
    }

    pub fn set_current(&self, pos: Option<usize>, state: PlayState) {
        let mut s = self.lock();
        s.current = pos;
        s.state = state;
    }

    pub fn add_playlist(&self, name: &str, files: &[&str]) {
        self.lock()
            .playlists
            .insert(name.to_string(), files.iter().map(|f| f.to_string()).collect());
    }

    pub fn add_picture(&self, file: &str, mime: &str, data: &[u8]) {
        self.lock().pictures.insert(
            file.to_string(),
            Picture {
                mime: mime.to_string(),
                data: data.to_vec(),
            },
        );
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn queue_ids(&self) -> Vec<u32> {
        self.lock().queue.iter().map(|(id, _)| *id).collect()
    }

    pub fn queue_files(&self) -> Vec<String> {
        self.lock().queue.iter().map(|(_, t)| t.file.clone()).collect()
    }

    /// Names of the commands received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, name: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == name).count()
    }

    /// `true` when a queue-mutating command was received.
    pub fn mutated(&self) -> bool {
        const MUTATIONS: [&str; 9] = [
            "add", "addid", "delete", "deleteid", "move", "clear", "shuffle", "load", "swap",
        ];
        self.lock()
            .calls
            .iter()
            .any(|c| MUTATIONS.contains(&c.as_str()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn call(&self, name: &str) -> MpdResult<std::sync::MutexGuard<'_, State>> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(MpdError::Unavailable("memory".to_string()));
        }
        state.calls.push(name.to_string());
        Ok(state)
    }
}

impl State {
    fn status(&self) -> PlaybackStatus {
        let current = self.current.filter(|p| *p < self.queue.len());
        PlaybackStatus {
            state: if current.is_some() { self.state } else { PlayState::Stop },
            volume: Some(self.volume),
            song: current.map(|p| p as u32),
            songid: current.map(|p| self.queue[p].0),
            playlistlength: self.queue.len() as u32,
            repeat: self.options[0],
            random: self.options[1],
            single: self.options[2],
            consume: self.options[3],
            elapsed: current.map(|_| 10.0),
            duration: current.map(|_| 200.0),
            ..Default::default()
        }
    }

    fn entries(&self) -> Vec<QueueEntry> {
        self.queue
            .iter()
            .enumerate()
            .map(|(pos, (id, track))| QueueEntry {
                pos: pos as u32,
                id: *id,
                track: track.clone(),
                current: None,
            })
            .collect()
    }

    fn remove_at(&mut self, pos: usize) {
        self.queue.remove(pos);
        if let Some(cur) = self.current {
            if cur == pos {
                self.current = None;
            } else if cur > pos {
                self.current = Some(cur - 1);
            }
        }
    }

    fn insert_at(&mut self, pos: usize, track: Track) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.insert(pos, (id, track));
        if let Some(cur) = self.current {
            if cur >= pos {
                self.current = Some(cur + 1);
            }
        }
        id
    }

    fn lookup(&self, uri: &str) -> Track {
        self.library
            .iter()
            .find(|t| t.file == uri)
            .cloned()
            .unwrap_or_else(|| Track::new(uri))
    }
}

#[async_trait]
impl DaemonSession for MemoryDaemon {
    async fn version(&self) -> MpdResult<String> {
        self.call("version")?;
        Ok("0.23.5".to_string())
    }

    async fn peer(&self) -> MpdResult<String> {
        self.call("peer")?;
        Ok("127.0.0.1:6600".to_string())
    }

    async fn reconnect(&self) -> MpdResult<()> {
        self.call("reconnect").map(|_| ())
    }

    async fn status(&self) -> MpdResult<PlaybackStatus> {
        Ok(self.call("status")?.status())
    }

    async fn current_song(&self) -> MpdResult<Option<Track>> {
        let state = self.call("currentsong")?;
        Ok(state
            .current
            .and_then(|p| state.queue.get(p))
            .map(|(_, t)| t.clone()))
    }

    async fn stats(&self) -> MpdResult<Stats> {
        let state = self.call("stats")?;
        Ok(Stats {
            songs: state.library.len() as u64,
            ..Default::default()
        })
    }

    async fn find(&self, query: &ResourceQuery) -> MpdResult<Vec<Track>> {
        let state = self.call("find")?;
        Ok(state
            .library
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }

    async fn search(&self, scope: Option<Tag>, term: &str) -> MpdResult<Vec<Track>> {
        let state = self.call("search")?;
        let needle = term.to_lowercase();
        let tags: Vec<Tag> = scope.map(|t| vec![t]).unwrap_or_else(|| Tag::ALL.to_vec());
        Ok(state
            .library
            .iter()
            .filter(|t| {
                tags.iter().any(|tag| {
                    t.tag(*tag)
                        .is_some_and(|v| v.to_lowercase().contains(&needle))
                })
            })
            .cloned()
            .collect())
    }

    async fn list(&self, tag: Tag, filter: &ResourceQuery) -> MpdResult<Vec<String>> {
        let state = self.call("list")?;
        let mut values: Vec<String> = state
            .library
            .iter()
            .filter(|t| filter.matches(t))
            .filter_map(|t| t.tag(tag).map(str::to_string))
            .collect();
        values.sort();
        values.dedup();
        Ok(values)
    }

    async fn count(&self, filter: &ResourceQuery, group: Option<Tag>) -> MpdResult<Vec<CountRow>> {
        let state = self.call("count")?;
        let mut rows: BTreeMap<Option<String>, CountRow> = BTreeMap::new();
        for t in state.library.iter().filter(|t| filter.matches(t)) {
            let key = group.map(|g| t.tag(g).unwrap_or_default().to_string());
            let row = rows.entry(key.clone()).or_insert_with(|| CountRow {
                group: key,
                ..Default::default()
            });
            row.songs += 1;
            row.playtime += t.duration.unwrap_or(0.0) as u64;
        }
        if rows.is_empty() && group.is_none() {
            rows.insert(None, CountRow::default());
        }
        Ok(rows.into_values().collect())
    }

    async fn playlist_info(&self, pos: Option<u32>) -> MpdResult<Vec<QueueEntry>> {
        let state = self.call("playlistinfo")?;
        let entries = state.entries();
        match pos {
            None => Ok(entries),
            Some(p) => entries
                .into_iter()
                .nth(p as usize)
                .map(|e| vec![e])
                .ok_or_else(|| no_exist("playlistinfo", "Bad song index")),
        }
    }

    async fn add(&self, uri: &str) -> MpdResult<()> {
        let mut state = self.call("add")?;
        let track = state.lookup(uri);
        let end = state.queue.len();
        state.insert_at(end, track);
        Ok(())
    }

    async fn add_id(&self, uri: &str, pos: Option<u32>) -> MpdResult<u32> {
        let mut state = self.call("addid")?;
        let end = state.queue.len();
        let pos = pos.map(|p| p as usize).unwrap_or(end);
        if pos > end {
            return Err(MpdError::Command {
                code: 2,
                command: "addid".to_string(),
                message: "Bad song index".to_string(),
            });
        }
        let track = state.lookup(uri);
        Ok(state.insert_at(pos, track))
    }

    async fn delete_range(&self, start: u32, end: u32) -> MpdResult<()> {
        let mut state = self.call("delete")?;
        let (start, end) = (start as usize, end as usize);
        if start > end || end > state.queue.len() {
            return Err(no_exist("delete", "Bad song index"));
        }
        for pos in (start..end).rev() {
            state.remove_at(pos);
        }
        Ok(())
    }

    async fn delete_id(&self, id: u32) -> MpdResult<()> {
        let mut state = self.call("deleteid")?;
        let pos = state
            .queue
            .iter()
            .position(|(i, _)| *i == id)
            .ok_or_else(|| no_exist("deleteid", "No such song"))?;
        state.remove_at(pos);
        Ok(())
    }

    async fn move_entry(&self, from: u32, to: u32) -> MpdResult<()> {
        let mut state = self.call("move")?;
        let (from, to) = (from as usize, to as usize);
        if from >= state.queue.len() || to >= state.queue.len() {
            return Err(no_exist("move", "Bad song index"));
        }
        let entry = state.queue.remove(from);
        state.queue.insert(to, entry);
        Ok(())
    }

    async fn clear(&self) -> MpdResult<()> {
        let mut state = self.call("clear")?;
        state.queue.clear();
        state.current = None;
        Ok(())
    }

    async fn shuffle(&self) -> MpdResult<()> {
        let mut state = self.call("shuffle")?;
        state.queue.reverse();
        Ok(())
    }

    async fn load(&self, playlist: &str) -> MpdResult<()> {
        let mut state = self.call("load")?;
        let files = state
            .playlists
            .get(playlist)
            .cloned()
            .ok_or_else(|| no_exist("load", "No such playlist"))?;
        for file in files {
            let track = state.lookup(&file);
            let end = state.queue.len();
            state.insert_at(end, track);
        }
        Ok(())
    }

    async fn save(&self, playlist: &str) -> MpdResult<()> {
        let mut state = self.call("save")?;
        if state.playlists.contains_key(playlist) {
            return Err(MpdError::Command {
                code: 56,
                command: "save".to_string(),
                message: "Playlist already exists".to_string(),
            });
        }
        let files = state.queue.iter().map(|(_, t)| t.file.clone()).collect();
        state.playlists.insert(playlist.to_string(), files);
        Ok(())
    }

    async fn remove_playlist(&self, playlist: &str) -> MpdResult<()> {
        let mut state = self.call("rm")?;
        state
            .playlists
            .remove(playlist)
            .map(|_| ())
            .ok_or_else(|| no_exist("rm", "No such playlist"))
    }

    async fn list_playlists(&self) -> MpdResult<Vec<StoredPlaylist>> {
        let state = self.call("listplaylists")?;
        Ok(state
            .playlists
            .keys()
            .map(|name| StoredPlaylist {
                playlist: name.clone(),
                last_modified: None,
            })
            .collect())
    }

    async fn list_playlist(&self, playlist: &str) -> MpdResult<Vec<String>> {
        let state = self.call("listplaylist")?;
        state
            .playlists
            .get(playlist)
            .cloned()
            .ok_or_else(|| no_exist("listplaylist", "No such playlist"))
    }

    async fn list_playlist_info(&self, playlist: &str) -> MpdResult<Vec<Track>> {
        let state = self.call("listplaylistinfo")?;
        let files = state
            .playlists
            .get(playlist)
            .ok_or_else(|| no_exist("listplaylistinfo", "No such playlist"))?;
        Ok(files.iter().map(|f| state.lookup(f)).collect())
    }

    async fn play(&self, pos: Option<u32>) -> MpdResult<()> {
        let mut state = self.call("play")?;
        let pos = pos.map(|p| p as usize).or(state.current).unwrap_or(0);
        if pos >= state.queue.len() {
            return Err(no_exist("play", "Bad song index"));
        }
        state.current = Some(pos);
        state.state = PlayState::Play;
        Ok(())
    }

    async fn pause(&self) -> MpdResult<()> {
        let mut state = self.call("pause")?;
        state.state = match state.state {
            PlayState::Play => PlayState::Pause,
            PlayState::Pause => PlayState::Play,
            PlayState::Stop => PlayState::Stop,
        };
        Ok(())
    }

    async fn stop(&self) -> MpdResult<()> {
        let mut state = self.call("stop")?;
        state.state = PlayState::Stop;
        Ok(())
    }

    async fn next(&self) -> MpdResult<()> {
        let mut state = self.call("next")?;
        let len = state.queue.len();
        state.current = state.current.map(|c| c + 1).filter(|c| *c < len);
        Ok(())
    }

    async fn previous(&self) -> MpdResult<()> {
        let mut state = self.call("previous")?;
        state.current = state.current.map(|c| c.saturating_sub(1));
        Ok(())
    }

    async fn seek_current(&self, _seconds: f64) -> MpdResult<()> {
        let state = self.call("seekcur")?;
        if state.current.is_none() {
            return Err(no_exist("seekcur", "Not playing"));
        }
        Ok(())
    }

    async fn change_volume(&self, delta: i32) -> MpdResult<()> {
        let mut state = self.call("volume")?;
        state.volume = (i32::from(state.volume) + delta).clamp(0, 100) as u8;
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> MpdResult<()> {
        let mut state = self.call("setvol")?;
        state.volume = volume.min(100);
        Ok(())
    }

    async fn set_option(&self, option: PlaybackOption, enabled: bool) -> MpdResult<()> {
        let mut state = self.call(option.as_str())?;
        state.options[option_index(option)] = enabled;
        Ok(())
    }

    async fn outputs(&self) -> MpdResult<Vec<Output>> {
        Ok(self.call("outputs")?.outputs.clone())
    }

    async fn set_output(&self, id: u32, enabled: bool) -> MpdResult<()> {
        let name = if enabled { "enableoutput" } else { "disableoutput" };
        let mut state = self.call(name)?;
        let output = state
            .outputs
            .iter_mut()
            .find(|o| o.outputid == id)
            .ok_or_else(|| no_exist(name, "No such audio output"))?;
        output.outputenabled = enabled;
        Ok(())
    }

    async fn update(&self) -> MpdResult<u32> {
        self.call("update")?;
        Ok(1)
    }

    async fn picture(&self, uri: &str) -> MpdResult<Option<Picture>> {
        Ok(self.call("readpicture")?.pictures.get(uri).cloned())
    }
}
