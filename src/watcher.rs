//! File watching functionality using the notify crate.

use crate::error::{Error, Result};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

/// Kind of change observed for the tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileEventKind {
    Created,
    Modified,
    Removed,
    /// The file was moved away from (or onto) its path.
    Renamed,
    Other,
}

impl FileEventKind {
    fn from_notify(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => FileEventKind::Created,
            EventKind::Remove(_) => FileEventKind::Removed,
            EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Renamed,
            EventKind::Modify(_) => FileEventKind::Modified,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => FileEventKind::Other,
        }
    }

    /// Removal and rename end tailing of this file.
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, FileEventKind::Removed | FileEventKind::Renamed)
    }

    /// Folds two plain changes into the more specific one.
    fn merge(self, other: Self) -> Self {
        fn rank(kind: FileEventKind) -> u8 {
            match kind {
                FileEventKind::Modified => 2,
                FileEventKind::Created => 1,
                _ => 0,
            }
        }

        if rank(other) > rank(self) { other } else { self }
    }
}

/// A change subscription scoped to a single file.
///
/// The parent directory is watched so that removal and renaming of the file
/// itself are reported; events for sibling files are filtered out.
pub(crate) struct FileWatch {
    watcher: Mutex<Option<RecommendedWatcher>>,
    queue: tokio::sync::Mutex<EventQueue>,
    watch_dir: PathBuf,
    file_name: OsString,
}

struct EventQueue {
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    /// A removal, rename or error found while collapsing a backlog, handed
    /// out by the next `next_change`.
    deferred: Option<notify::Result<FileEventKind>>,
}

impl FileWatch {
    /// Subscribes to changes of `path`.
    pub(crate) fn new(path: &Path) -> Result<Self> {
        let watch_error = |source| Error::Watch {
            path: path.to_path_buf(),
            source,
        };

        let file_name = path
            .file_name()
            .ok_or_else(|| {
                watch_error(
                    notify::Error::generic("path has no file name to watch")
                        .add_path(path.to_path_buf()),
                )
            })?
            .to_os_string();
        let watch_dir = watch_dir_for(path);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(watch_error)?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        Ok(Self::with_receiver(Some(watcher), rx, watch_dir, file_name))
    }

    /// A subscription fed from a channel the test owns.
    #[cfg(test)]
    pub(crate) fn from_channel(
        path: &Path,
        receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    ) -> Self {
        let file_name = path.file_name().unwrap_or_default().to_os_string();
        Self::with_receiver(None, receiver, watch_dir_for(path), file_name)
    }

    fn with_receiver(
        watcher: Option<RecommendedWatcher>,
        receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
        watch_dir: PathBuf,
        file_name: OsString,
    ) -> Self {
        Self {
            watcher: Mutex::new(watcher),
            queue: tokio::sync::Mutex::new(EventQueue {
                receiver,
                deferred: None,
            }),
            watch_dir,
            file_name,
        }
    }

    /// Waits for the next change to the tracked file.
    ///
    /// Notifications that piled up while the reader was busy are collapsed
    /// into the one returned here, so a caught-up reader wakes once per
    /// backlog. A removal, rename or error behind plain changes is returned
    /// by the following call instead, after the reader has retried.
    ///
    /// Returns `None` once the subscription has been released. Cancel safe.
    pub(crate) async fn next_change(&self) -> Option<notify::Result<FileEventKind>> {
        let mut queue = self.queue.lock().await;
        if let Some(deferred) = queue.deferred.take() {
            return Some(deferred);
        }

        let first = loop {
            let res = queue.receiver.recv().await?;
            if let Some(change) = self.classify(res) {
                break change;
            }
        };

        let mut merged = match first {
            Ok(kind) if !kind.is_terminal() => kind,
            other => return Some(other),
        };

        while let Ok(res) = queue.receiver.try_recv() {
            match self.classify(res) {
                Some(Ok(kind)) if !kind.is_terminal() => merged = merged.merge(kind),
                Some(next) => {
                    queue.deferred = Some(next);
                    break;
                }
                None => {}
            }
        }

        Some(Ok(merged))
    }

    /// Maps a raw notification to a change of the tracked file, if it is one.
    fn classify(&self, res: notify::Result<Event>) -> Option<notify::Result<FileEventKind>> {
        match res {
            Ok(event) if is_event_relevant_to_file(&event, &self.file_name) => {
                trace!(kind = ?event.kind, paths = ?event.paths, "change notification");
                Some(Ok(FileEventKind::from_notify(&event.kind)))
            }
            Ok(event) => {
                trace!(kind = ?event.kind, paths = ?event.paths, "skipping unrelated notification");
                None
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// Stops watching and drops the underlying watcher. Only the first call
    /// does anything.
    pub(crate) fn release(&self) -> notify::Result<()> {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match watcher {
            // Dropping the watcher drops the channel sender, waking any
            // pending `next_change` with `None`.
            Some(mut watcher) => watcher.unwatch(&self.watch_dir),
            None => Ok(()),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    #[cfg(test)]
    pub(crate) fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }
}

/// Directory to watch for `path`. A bare file name lives in the current directory.
fn watch_dir_for(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Check if a notify event is relevant to a specific file
pub(crate) fn is_event_relevant_to_file(event: &Event, target_file_name: &OsStr) -> bool {
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(target_file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TempLogFile;
    use notify::event::{AccessKind, AccessMode, CreateKind, DataChange, RemoveKind, RenameMode};
    use std::time::Duration;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        Event {
            kind,
            paths: paths.iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    fn name(s: &str) -> OsString {
        OsString::from(s)
    }

    async fn next_kind(watch: &FileWatch) -> FileEventKind {
        tokio::time::timeout(Duration::from_secs(5), watch.next_change())
            .await
            .expect("timed out waiting for a change")
            .expect("subscription closed")
            .expect("watcher error")
    }

    #[test]
    fn test_event_kind_classification() {
        assert_eq!(
            FileEventKind::from_notify(&EventKind::Create(CreateKind::File)),
            FileEventKind::Created
        );
        assert_eq!(
            FileEventKind::from_notify(&EventKind::Remove(RemoveKind::File)),
            FileEventKind::Removed
        );
        assert_eq!(
            FileEventKind::from_notify(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            FileEventKind::Renamed
        );
        assert_eq!(
            FileEventKind::from_notify(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            FileEventKind::Renamed
        );
        assert_eq!(
            FileEventKind::from_notify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            FileEventKind::Modified
        );
        assert_eq!(
            FileEventKind::from_notify(&EventKind::Any),
            FileEventKind::Other
        );
    }

    #[test]
    fn test_is_event_relevant_to_file_exact_match() {
        let event = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/tmp/test.log"],
        );

        assert!(is_event_relevant_to_file(&event, &name("test.log")));
        assert!(!is_event_relevant_to_file(&event, &name("other.log")));
    }

    #[test]
    fn test_is_event_relevant_to_rename_pair() {
        let event = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/tmp/test.log", "/tmp/test.log.1"],
        );

        assert!(is_event_relevant_to_file(&event, &name("test.log")));
        assert!(is_event_relevant_to_file(&event, &name("test.log.1")));
        assert!(!is_event_relevant_to_file(&event, &name("test")));
    }

    #[test]
    fn test_is_event_relevant_to_file_no_file_name() {
        let root = event(EventKind::Any, &["/"]);
        let empty = event(EventKind::Any, &[]);

        assert!(!is_event_relevant_to_file(&root, &name("test.log")));
        assert!(!is_event_relevant_to_file(&empty, &name("test.log")));
    }

    #[test]
    fn test_is_event_relevant_to_file_case_sensitivity() {
        let event = event(EventKind::Any, &["/tmp/Test.Log"]);

        assert!(!is_event_relevant_to_file(&event, &name("test.log")));
        assert!(is_event_relevant_to_file(&event, &name("Test.Log")));
    }

    #[test]
    fn test_watch_dir_for_paths() {
        assert_eq!(watch_dir_for(Path::new("/var/log/app.log")), PathBuf::from("/var/log"));
        assert_eq!(watch_dir_for(Path::new("logs/app.log")), PathBuf::from("logs"));
        assert_eq!(watch_dir_for(Path::new("app.log")), PathBuf::from("."));
    }

    #[tokio::test]
    async fn test_file_watch_rejects_path_without_file_name() {
        let result = FileWatch::new(Path::new("/"));
        assert!(matches!(result, Err(Error::Watch { .. })));
    }

    #[tokio::test]
    async fn test_backlog_collapses_into_one_change() {
        let (tx, rx) = mpsc::unbounded_channel();
        let watch = FileWatch::from_channel(Path::new("/tmp/app.log"), rx);

        for _ in 0..200 {
            tx.send(Ok(event(EventKind::Access(AccessKind::Open(AccessMode::Write)), &["/tmp/app.log"])))
                .unwrap();
            tx.send(Ok(event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/tmp/app.log"],
            )))
            .unwrap();
            tx.send(Ok(event(EventKind::Any, &["/tmp/other.log"]))).unwrap();
        }

        assert_eq!(next_kind(&watch).await, FileEventKind::Modified);

        let again = tokio::time::timeout(Duration::from_millis(100), watch.next_change()).await;
        assert!(again.is_err(), "collapsed backlog must not wake the watch again");
    }

    #[tokio::test]
    async fn test_removal_behind_backlog_is_reported_next() {
        let (tx, rx) = mpsc::unbounded_channel();
        let watch = FileWatch::from_channel(Path::new("/tmp/app.log"), rx);

        let modified = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        tx.send(Ok(event(modified, &["/tmp/app.log"]))).unwrap();
        tx.send(Ok(event(modified, &["/tmp/app.log"]))).unwrap();
        tx.send(Ok(event(EventKind::Remove(RemoveKind::File), &["/tmp/app.log"])))
            .unwrap();
        tx.send(Ok(event(modified, &["/tmp/app.log"]))).unwrap();

        assert_eq!(next_kind(&watch).await, FileEventKind::Modified);
        assert_eq!(next_kind(&watch).await, FileEventKind::Removed);
    }

    #[tokio::test]
    async fn test_error_behind_backlog_is_reported_next() {
        let (tx, rx) = mpsc::unbounded_channel();
        let watch = FileWatch::from_channel(Path::new("/tmp/app.log"), rx);

        tx.send(Ok(event(EventKind::Create(CreateKind::File), &["/tmp/app.log"])))
            .unwrap();
        tx.send(Err(notify::Error::generic("queue overflow"))).unwrap();

        assert_eq!(next_kind(&watch).await, FileEventKind::Created);
        let next = watch.next_change().await.expect("subscription closed");
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_file_watch_missing_directory_fails() {
        let result = FileWatch::new(Path::new("/definitely/not/a/dir/app.log"));
        assert!(matches!(result, Err(Error::Watch { .. })));
    }

    #[tokio::test]
    async fn test_file_watch_reports_modification() {
        let file = TempLogFile::new().unwrap();
        let watch = FileWatch::new(file.path()).unwrap();
        assert_eq!(watch.watch_dir(), file.path().parent().unwrap());

        file.append(b"line\n").unwrap();

        // Opening for append may be reported before the write itself.
        let mut kind = next_kind(&watch).await;
        while kind == FileEventKind::Other {
            kind = next_kind(&watch).await;
        }
        assert_eq!(kind, FileEventKind::Modified);
    }

    #[tokio::test]
    async fn test_file_watch_ignores_sibling_files() {
        let file = TempLogFile::new().unwrap();
        let watch = FileWatch::new(file.path()).unwrap();

        std::fs::write(file.sibling("other.log"), b"noise").unwrap();

        let result = tokio::time::timeout(Duration::from_millis(200), watch.next_change()).await;
        assert!(result.is_err(), "sibling events must not wake the watch");
    }

    #[tokio::test]
    async fn test_file_watch_reports_removal() {
        let file = TempLogFile::new().unwrap();
        let watch = FileWatch::new(file.path()).unwrap();

        file.remove().unwrap();

        let mut kind = next_kind(&watch).await;
        while kind != FileEventKind::Removed {
            kind = next_kind(&watch).await;
        }
    }

    #[tokio::test]
    async fn test_release_wakes_waiter_and_is_idempotent() {
        let file = TempLogFile::new().unwrap();
        let watch = FileWatch::new(file.path()).unwrap();
        assert!(watch.is_active());

        watch.release().unwrap();
        assert!(!watch.is_active());
        watch.release().unwrap();

        let next = tokio::time::timeout(Duration::from_secs(1), watch.next_change())
            .await
            .expect("released watch must not block");
        assert!(next.is_none());
    }
}
