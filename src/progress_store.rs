use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::progress::ProgressPayload;

/// Progress record of one book as the local store keeps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedProgress {
    pub progress: f64,
    pub position: String,
    #[serde(default)]
    pub finished: bool,
    pub last_read: chrono::DateTime<chrono::Utc>,
}

impl SavedProgress {
    pub fn to_payload(&self) -> ProgressPayload {
        ProgressPayload {
            progress: self.progress,
            position: self.position.clone(),
            finished: self.finished,
        }
    }
}

/// JSON file of reading progress keyed by book id.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressStore {
    books: HashMap<String, SavedProgress>,
    #[serde(skip)]
    file_path: Option<PathBuf>,
}

impl ProgressStore {
    pub fn ephemeral() -> Self {
        Self {
            books: HashMap::new(),
            file_path: None,
        }
    }

    pub fn with_file(file_path: impl Into<PathBuf>) -> Self {
        Self {
            books: HashMap::new(),
            file_path: Some(file_path.into()),
        }
    }

    pub fn load_or_ephemeral(file_path: Option<&Path>) -> Self {
        match file_path {
            Some(path) => Self::load_from_file(path).unwrap_or_else(|e| {
                log::error!("Failed to load progress store from {}: {}", path.display(), e);
                Self::with_file(path)
            }),
            None => Self::ephemeral(),
        }
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let mut store: Self = serde_json::from_str(&content)?;
            store.file_path = Some(path.to_path_buf());
            Ok(store)
        } else {
            Ok(Self::with_file(path))
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get(&self, book_id: &str) -> Option<&SavedProgress> {
        self.books.get(book_id)
    }

    pub fn most_recent(&self) -> Option<(&str, &SavedProgress)> {
        self.books
            .iter()
            .max_by_key(|(_, saved)| saved.last_read)
            .map(|(id, saved)| (id.as_str(), saved))
    }

    /// Records the payload and writes the store through to disk.
    pub fn update(&mut self, book_id: &str, payload: &ProgressPayload) -> anyhow::Result<()> {
        self.books.insert(
            book_id.to_string(),
            SavedProgress {
                progress: payload.progress,
                position: payload.position.clone(),
                finished: payload.finished,
                last_read: chrono::Utc::now(),
            },
        );
        self.save()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SavedProgress)> {
        self.books.iter()
    }
}
