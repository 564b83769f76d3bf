//! Position-sensitive mutations of the daemon's play queue.
//!
//! The queue lives in the daemon and can change between two calls; every operation
//! reads what it needs right before mutating and reports counts from what the daemon
//! answered, never from a local copy.

use std::sync::Arc;

use tracing::debug;

use crate::errors::MpdResult;
use crate::model::Tag;
use crate::query::TrackSelection;
use crate::session::DaemonSession;

#[derive(Clone)]
pub struct QueueEngine {
    session: Arc<dyn DaemonSession>,
}

impl QueueEngine {
    pub fn new(session: Arc<dyn DaemonSession>) -> Self {
        Self { session }
    }

    async fn queue_length(&self) -> MpdResult<u32> {
        Ok(self.session.status().await?.playlistlength)
    }

    /// URIs a selection stands for, in queue order.
    async fn resolve(&self, selection: &TrackSelection) -> MpdResult<Vec<String>> {
        match selection {
            TrackSelection::Playlist(name) => self.session.list_playlist(name).await,
            TrackSelection::File(uri) => Ok(vec![uri.clone()]),
            TrackSelection::Search(query) => Ok(self
                .session
                .find(query)
                .await?
                .into_iter()
                .map(|t| t.file)
                .collect()),
        }
    }

    async fn add_from(&self, uris: &[String], start: u32) -> MpdResult<usize> {
        let mut count = 0;
        for (i, uri) in uris.iter().enumerate() {
            self.session.add_id(uri, Some(start + i as u32)).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Inserts the selection right after the current song (at the top when nothing is
    /// selected). Returns how many tracks were added.
    pub async fn insert(&self, selection: &TrackSelection) -> MpdResult<usize> {
        let uris = self.resolve(selection).await?;
        if uris.is_empty() {
            return Ok(0);
        }

        let start = self
            .session
            .status()
            .await?
            .song
            .map(|song| song + 1)
            .unwrap_or(0);
        debug!("Inserting {} tracks at {}", uris.len(), start);
        self.add_from(&uris, start).await
    }

    /// Appends the selection at the end of the queue.
    ///
    /// A stored playlist is loaded with a single `load`; its count is the growth of
    /// the queue.
    pub async fn append(&self, selection: &TrackSelection) -> MpdResult<usize> {
        if let TrackSelection::Playlist(name) = selection {
            let before = self.queue_length().await?;
            self.session.load(name).await?;
            let after = self.queue_length().await?;
            return Ok(after.saturating_sub(before) as usize);
        }

        let uris = self.resolve(selection).await?;
        if uris.is_empty() {
            return Ok(0);
        }
        let start = self.queue_length().await?;
        self.add_from(&uris, start).await
    }

    /// Deletes each id; ids the daemon rejects are skipped and not counted.
    pub async fn remove_by_id(&self, ids: &[u32]) -> MpdResult<usize> {
        let mut removed = 0;
        for id in ids {
            match self.session.delete_id(*id).await {
                Ok(()) => removed += 1,
                Err(e) if e.is_command() => debug!("Skipping id {}: {}", id, e),
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    /// Deletes every queue entry whose `tag` is exactly `value`.
    pub async fn remove_by_field(&self, tag: Tag, value: &str) -> MpdResult<usize> {
        let ids: Vec<u32> = self
            .session
            .playlist_info(None)
            .await?
            .into_iter()
            .filter(|entry| entry.track.tag(tag) == Some(value))
            .map(|entry| entry.id)
            .collect();
        self.remove_by_id(&ids).await
    }

    /// Deletes positions `from..to`, clamped to the queue. Returns how much the queue
    /// shrank.
    pub async fn delete_range(&self, from: i64, to: i64) -> MpdResult<usize> {
        let before = self.queue_length().await?;
        let start = from.max(0);
        let end = to.min(i64::from(before));
        if start >= end {
            return Ok(0);
        }

        self.session.delete_range(start as u32, end as u32).await?;
        let after = self.queue_length().await?;
        Ok(before.saturating_sub(after) as usize)
    }

    pub async fn move_entry(&self, from: u32, to: u32) -> MpdResult<()> {
        self.session.move_entry(from, to).await
    }

    /// Empties the queue and returns how many entries it held.
    pub async fn clear(&self) -> MpdResult<usize> {
        let before = self.queue_length().await?;
        self.session.clear().await?;
        Ok(before as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayState;
    use crate::query::ResourceQuery;
    use crate::testing::MemoryDaemon;

    fn engine(daemon: &Arc<MemoryDaemon>) -> QueueEngine {
        QueueEngine::new(daemon.clone())
    }

    #[tokio::test]
    async fn test_insert_after_current() {
        let daemon = Arc::new(MemoryDaemon::with_library());
        daemon.set_queue(&["q0", "q1", "q2"]);
        daemon.set_current(Some(1), PlayState::Play);

        let inserted = engine(&daemon)
            .insert(&TrackSelection::File("X.mp3".into()))
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(daemon.queue_files(), vec!["q0", "q1", "X.mp3", "q2"]);
    }

    #[tokio::test]
    async fn test_insert_without_current_goes_first() {
        let daemon = Arc::new(MemoryDaemon::with_library());
        daemon.set_queue(&["q0"]);

        let selection = TrackSelection::Search(ResourceQuery::new().with(Tag::Album, "Live"));
        assert_eq!(engine(&daemon).insert(&selection).await.unwrap(), 1);
        assert_eq!(daemon.queue_files(), vec!["foo/b/1.flac", "q0"]);
    }

    #[tokio::test]
    async fn test_insert_empty_selection_does_not_mutate() {
        let daemon = Arc::new(MemoryDaemon::with_library());
        daemon.set_queue(&["q0"]);

        let selection = TrackSelection::Search(ResourceQuery::new().with(Tag::Album, "Nope"));
        assert_eq!(engine(&daemon).insert(&selection).await.unwrap(), 0);
        assert!(!daemon.mutated());
    }

    #[tokio::test]
    async fn test_insert_playlist_keeps_order() {
        let daemon = Arc::new(MemoryDaemon::with_library());
        daemon.set_queue(&["q0", "q1"]);
        daemon.set_current(Some(0), PlayState::Play);
        daemon.add_playlist("mix", &["m1", "m2"]);

        assert_eq!(
            engine(&daemon)
                .insert(&TrackSelection::Playlist("mix".into()))
                .await
                .unwrap(),
            2
        );
        assert_eq!(daemon.queue_files(), vec!["q0", "m1", "m2", "q1"]);
        assert_eq!(daemon.count_calls("load"), 0);
    }

    #[tokio::test]
    async fn test_append_playlist_loads_once() {
        let daemon = Arc::new(MemoryDaemon::with_library());
        daemon.set_queue(&["q0"]);
        daemon.add_playlist("mix", &["m1", "m2", "m3"]);

        let appended = engine(&daemon)
            .append(&TrackSelection::Playlist("mix".into()))
            .await
            .unwrap();
        assert_eq!(appended, 3);
        assert_eq!(daemon.count_calls("load"), 1);
        assert_eq!(daemon.count_calls("addid"), 0);
    }

    #[tokio::test]
    async fn test_append_search_at_end() {
        let daemon = Arc::new(MemoryDaemon::with_library());
        daemon.set_queue(&["q0"]);
        daemon.set_current(Some(0), PlayState::Play);

        let selection = TrackSelection::Search(
            ResourceQuery::new()
                .with(Tag::Artist, "Foo")
                .with(Tag::Album, "Foo"),
        );
        assert_eq!(engine(&daemon).append(&selection).await.unwrap(), 3);
        assert_eq!(daemon.queue_files().len(), 4);
        assert_eq!(daemon.queue_files()[0], "q0");
    }

    #[tokio::test]
    async fn test_remove_by_id_skips_unknown() {
        let daemon = Arc::new(MemoryDaemon::new());
        daemon.set_queue(&["a", "b", "c", "d", "e", "f"]);
        // ids 100..=105; keep only 105 among the requested ones
        let removed = engine(&daemon).remove_by_id(&[105, 999]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(daemon.queue_ids(), vec![100, 101, 102, 103, 104]);
    }

    #[tokio::test]
    async fn test_remove_by_id_propagates_unavailable() {
        let daemon = Arc::new(MemoryDaemon::new());
        daemon.set_unavailable(true);
        assert!(engine(&daemon).remove_by_id(&[1]).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_by_field() {
        let daemon = Arc::new(MemoryDaemon::with_library());
        daemon.set_queue(&["foo/a/1.flac", "bar/c/1.flac", "foo/b/1.flac"]);

        let removed = engine(&daemon)
            .remove_by_field(Tag::Artist, "Foo")
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(daemon.queue_files(), vec!["bar/c/1.flac"]);
    }

    #[tokio::test]
    async fn test_delete_range_clamps() {
        let daemon = Arc::new(MemoryDaemon::new());
        let files: Vec<String> = (0..10).map(|i| format!("f{}", i)).collect();
        let refs: Vec<&str> = files.iter().map(String::as_str).collect();
        daemon.set_queue(&refs);

        assert_eq!(engine(&daemon).delete_range(-3, 1000).await.unwrap(), 10);
        assert!(daemon.queue_ids().is_empty());
    }

    #[tokio::test]
    async fn test_delete_empty_range_is_noop() {
        let daemon = Arc::new(MemoryDaemon::new());
        daemon.set_queue(&["a", "b"]);

        assert_eq!(engine(&daemon).delete_range(5, 8).await.unwrap(), 0);
        assert_eq!(daemon.count_calls("delete"), 0);
    }

    #[tokio::test]
    async fn test_move_keeps_ids() {
        let daemon = Arc::new(MemoryDaemon::new());
        daemon.set_queue(&["a", "b", "c"]);

        engine(&daemon).move_entry(0, 2).await.unwrap();
        let mut ids = daemon.queue_ids();
        assert_eq!(ids, vec![101, 102, 100]);
        ids.sort();
        assert_eq!(ids, vec![100, 101, 102]);
        assert!(engine(&daemon).move_entry(0, 7).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_returns_previous_length() {
        let daemon = Arc::new(MemoryDaemon::new());
        daemon.set_queue(&["a", "b", "c"]);
        assert_eq!(engine(&daemon).clear().await.unwrap(), 3);
        assert!(daemon.queue_ids().is_empty());
    }
}
