//! Per-session uploaded file storage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use weft_proto::FileUrl;

/// One uploaded file, held in memory for the owning widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFileRec {
    /// Engine-assigned identity.
    pub file_id: SmolStr,
    /// Name the browser reported.
    pub name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

type FileKey = (SmolStr, SmolStr);

/// Holds uploaded files for every (session, widget) pair of a runtime.
///
/// Shared across sessions; per-session cleanup happens on session close so
/// an abandoned browser tab cannot pin its uploads forever.
#[derive(Debug, Default)]
pub struct UploadedFileManager {
    files: Mutex<FxHashMap<FileKey, Vec<UploadedFileRec>>>,
    next_id: AtomicU64,
}

impl UploadedFileManager {
    /// Empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint upload/delete URLs for the named files of one session.
    #[must_use]
    pub fn file_urls(&self, session_id: &str, file_names: &[String]) -> Vec<FileUrl> {
        file_names
            .iter()
            .map(|_| {
                let file_id = self.mint_file_id();
                FileUrl {
                    upload_url: format!("/_upload/{session_id}/{file_id}"),
                    delete_url: format!("/_upload/{session_id}/{file_id}"),
                    file_id,
                }
            })
            .collect()
    }

    /// Store one uploaded file, returning its id.
    pub fn add_file(
        &self,
        session_id: &str,
        widget_id: &str,
        name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> SmolStr {
        let file_id = self.mint_file_id();
        let rec = UploadedFileRec {
            file_id: file_id.clone(),
            name: name.into(),
            bytes,
        };
        self.lock()
            .entry((SmolStr::new(session_id), SmolStr::new(widget_id)))
            .or_default()
            .push(rec);
        file_id
    }

    /// All files of one widget, in upload order.
    #[must_use]
    pub fn get_files(&self, session_id: &str, widget_id: &str) -> Vec<UploadedFileRec> {
        self.lock()
            .get(&(SmolStr::new(session_id), SmolStr::new(widget_id)))
            .cloned()
            .unwrap_or_default()
    }

    /// Drop one file.
    pub fn remove_file(&self, session_id: &str, widget_id: &str, file_id: &str) {
        let mut files = self.lock();
        if let Some(recs) = files.get_mut(&(SmolStr::new(session_id), SmolStr::new(widget_id))) {
            recs.retain(|rec| rec.file_id != file_id);
        }
    }

    /// Drop everything a session uploaded.
    pub fn remove_session_files(&self, session_id: &str) {
        self.lock().retain(|(session, _), _| session != session_id);
    }

    fn mint_file_id(&self) -> SmolStr {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        SmolStr::new(format!("file-{id}"))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FxHashMap<FileKey, Vec<UploadedFileRec>>> {
        self.files.lock().expect("upload store lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_are_scoped_to_session_and_widget() {
        let uploads = UploadedFileManager::new();
        uploads.add_file("s1", "w1", "a.csv", vec![1]);
        uploads.add_file("s1", "w2", "b.csv", vec![2]);
        uploads.add_file("s2", "w1", "c.csv", vec![3]);

        assert_eq!(uploads.get_files("s1", "w1").len(), 1);
        assert_eq!(uploads.get_files("s1", "w2").len(), 1);

        uploads.remove_session_files("s1");
        assert!(uploads.get_files("s1", "w1").is_empty());
        assert_eq!(uploads.get_files("s2", "w1").len(), 1);
    }

    #[test]
    fn urls_are_unique_per_request() {
        let uploads = UploadedFileManager::new();
        let urls = uploads.file_urls("s1", &["a.csv".to_string(), "b.csv".to_string()]);
        assert_eq!(urls.len(), 2);
        assert_ne!(urls[0].file_id, urls[1].file_id);
        assert!(urls[0].upload_url.contains("s1"));
    }
}
