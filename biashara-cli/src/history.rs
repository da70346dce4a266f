// biashara-cli/src/history.rs

use anyhow::{Context, Result, anyhow};
use biashara_core::utils::preview;
use biashara_core::{ChatMessage, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Saved threads live next to `Biashara.toml`.
const HISTORY_SUBDIR: &str = ".biashara/history";
const PREVIEW_CHARS: usize = 70;

/// One conversation thread as stored on disk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConversationHistory {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_updated_at: now,
            messages,
        }
    }

    pub fn touch(&mut self) {
        self.last_updated_at = Utc::now();
    }

    /// The first user question, flattened to one line.
    pub fn preview(&self) -> String {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.content.as_deref())
            .map(|content| preview(content, PREVIEW_CHARS))
            .unwrap_or_else(|| "[No user messages]".to_string())
    }
}

/// Saved conversations under one project root.
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(project_root: &Path) -> Self {
        Self {
            dir: project_root.join(HISTORY_SUBDIR),
        }
    }

    fn file_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn save(&self, history: &ConversationHistory) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create history directory at {:?}", self.dir))?;
        let file_path = self.file_path(history.id);
        let file = File::create(&file_path)
            .with_context(|| format!("Failed to create history file at {:?}", file_path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, history)
            .with_context(|| format!("Failed to serialize history to {:?}", file_path))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush writer for {:?}", file_path))?;
        Ok(())
    }

    pub fn load(&self, id: Uuid) -> Result<ConversationHistory> {
        let file_path = self.file_path(id);
        if !file_path.is_file() {
            return Err(anyhow!("No saved conversation with ID {}", id));
        }
        let file = File::open(&file_path)
            .with_context(|| format!("Failed to open history file at {:?}", file_path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to deserialize history from {:?}", file_path))
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        let file_path = self.file_path(id);
        if !file_path.is_file() {
            return Err(anyhow!("No saved conversation with ID {}", id));
        }
        fs::remove_file(&file_path)
            .with_context(|| format!("Failed to delete history file at {:?}", file_path))
    }

    /// Every readable saved conversation, most recently updated first.
    /// Unreadable files are skipped with a warning.
    pub fn list(&self) -> Result<Vec<ConversationHistory>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut histories = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read history directory at {:?}", self.dir))?
        {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };
            match self.load(id) {
                Ok(history) => histories.push(history),
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable history file"),
            }
        }

        histories.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(histories)
    }
}
