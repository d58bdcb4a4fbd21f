//! File-backed conversation store.
//!
//! One file per conversation at `<am_root>/llm-conv-<tabId>-<conversationId>.json`.
//! The store itself is stateless across calls; per-conversation
//! single-writer discipline is enforced by the Conversation Engine, not
//! here. All file I/O goes through the `FileWriter` trait so the atomic
//! write path (temp sibling → fsync → rename → directory fsync) can be
//! fault-injected in tests without touching a real disk.

pub mod model;

use crate::error::StoreError;
use model::{Conversation, ConversationSummary};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Abstracts the filesystem operations `Save` performs, so atomicity can
/// be exercised by fault injection around the rename step without a real
/// crash.
pub trait FileWriter: Send + Sync {
    /// Write `data` to a temp sibling of the final path.
    fn write_tmp(&self, tmp_path: &Path, data: &[u8]) -> std::io::Result<()>;
    /// Fsync the temp file so its contents are durable before rename.
    fn fsync_file(&self, path: &Path) -> std::io::Result<()>;
    /// Atomically rename the temp file onto the final path.
    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;
    /// Fsync the containing directory so the rename itself is durable.
    fn fsync_dir(&self, dir: &Path) -> std::io::Result<()>;
}

/// Production `FileWriter` using real filesystem syscalls.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsWriter;

impl FileWriter for FsWriter {
    fn write_tmp(&self, tmp_path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = tmp_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(tmp_path, data)
    }

    fn fsync_file(&self, path: &Path) -> std::io::Result<()> {
        File::open(path)?.sync_all()
    }

    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        fs::rename(from, to)
    }

    fn fsync_dir(&self, dir: &Path) -> std::io::Result<()> {
        // Not all platforms support opening a directory for fsync (notably
        // Windows); treat failure to open as a no-op rather than an error.
        match File::open(dir) {
            Ok(f) => f.sync_all(),
            Err(_) => Ok(()),
        }
    }
}

/// Startup validation counters, surfaced via the Health Monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationCounters {
    /// Files that parsed successfully.
    pub conversations_validated: u64,
    /// Files that failed to parse.
    pub conversations_corrupted: u64,
}

/// File-backed conversation store.
pub struct ConversationStore<W: FileWriter = FsWriter> {
    root: PathBuf,
    writer: W,
}

impl ConversationStore<FsWriter> {
    /// Construct a store rooted at `root`, creating the directory (mode
    /// 0755) if it doesn't exist yet.
    pub fn new(root: PathBuf) -> std::io::Result<Self> {
        Self::with_writer(root, FsWriter)
    }
}

impl<W: FileWriter> ConversationStore<W> {
    /// Construct a store with a custom writer, for fault-injection tests.
    pub fn with_writer(root: PathBuf, writer: W) -> std::io::Result<Self> {
        fs::create_dir_all(&root)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&root, fs::Permissions::from_mode(0o755))?;
        }
        Ok(Self { root, writer })
    }

    fn path_for(&self, tab_id: &str, conversation_id: &str) -> PathBuf {
        self.root.join(Conversation::file_name(tab_id, conversation_id))
    }

    /// Serialize `conversation` and write it atomically: write to a temp
    /// sibling, fsync, rename onto the final path, fsync the directory.
    /// Callers never observe a partially written file.
    pub fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let final_path = self.path_for(&conversation.tab_id, &conversation.conversation_id);
        let tmp_path = final_path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(conversation)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        self.writer
            .write_tmp(&tmp_path, &json)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        self.writer
            .fsync_file(&tmp_path)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        self.writer
            .rename(&tmp_path, &final_path)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        self.writer
            .fsync_dir(&self.root)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    /// Read and parse a single conversation.
    pub fn load(&self, tab_id: &str, conversation_id: &str) -> Result<Conversation, StoreError> {
        let path = self.path_for(tab_id, conversation_id);
        if !path.exists() {
            return Err(StoreError::NotFound);
        }
        let content = fs::read_to_string(&path).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    /// Enumerate conversation files belonging to `tab_id`.
    pub fn list_for_tab(&self, tab_id: &str) -> Vec<ConversationSummary> {
        let prefix = format!("llm-conv-{tab_id}-");
        let mut out = Vec::new();
        let Ok(entries) = fs::read_dir(&self.root) else {
            return out;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            if let Ok(content) = fs::read_to_string(entry.path()) {
                if let Ok(conv) = serde_json::from_str::<Conversation>(&content) {
                    out.push(ConversationSummary::from(&conv));
                }
            }
        }
        out
    }

    /// Delete conversation files older than `retention_days` by mtime.
    /// Returns the number of files deleted.
    pub fn cleanup(&self, retention_days: u64) -> usize {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(retention_days * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut deleted = 0;
        let Ok(entries) = fs::read_dir(&self.root) else {
            return 0;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    if modified < cutoff {
                        if fs::remove_file(&path).is_ok() {
                            deleted += 1;
                        }
                    }
                }
            }
        }
        deleted
    }

    /// Scan existing files on startup, computing validation counters.
    pub fn validate_existing(&self) -> ValidationCounters {
        let mut counters = ValidationCounters::default();
        let Ok(entries) = fs::read_dir(&self.root) else {
            return counters;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<Conversation>(&content) {
                    Ok(_) => counters.conversations_validated += 1,
                    Err(_) => counters.conversations_corrupted += 1,
                },
                Err(_) => counters.conversations_corrupted += 1,
            }
        }
        counters
    }
}
