use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::{self, LocalStore};

pub const ASSETS_KEY: &str = "recent_assets";
pub const MAX_ASSETS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: String,
    pub filename: String,
    pub public_url: String,
    pub content_type: String,
    pub file_size: u64,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub format: Option<String>,
    pub upload_timestamp: String,
    pub processing_status: String,
}

impl Asset {
    /// Reads an upload response. `asset_id`, `filename`, `public_url`,
    /// `content_type` and `file_size` are mandatory.
    pub fn from_upload_response(value: &Value) -> Option<Asset> {
        let asset_id = match value.get("asset_id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let text = |key: &str| value.get(key).and_then(|v| v.as_str()).map(|v| v.to_string());
        let dimension = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok())
        };

        Some(Asset {
            asset_id,
            filename: text("filename")?,
            public_url: text("public_url")?,
            content_type: text("content_type")?,
            file_size: value.get("file_size")?.as_u64()?,
            width: dimension("width"),
            height: dimension("height"),
            format: text("format"),
            upload_timestamp: text("upload_timestamp").unwrap_or_else(|| Utc::now().to_rfc3339()),
            processing_status: text("processing_status").unwrap_or_else(|| "uploaded".to_string()),
        })
    }

    /// Picker label: file name plus a short identifier preview.
    pub fn label(&self) -> String {
        let preview: String = self.asset_id.chars().take(8).collect();
        if preview.len() < self.asset_id.len() {
            format!("{} ({}...)", self.filename, preview)
        } else {
            format!("{} ({})", self.filename, preview)
        }
    }

    pub fn dimensions(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{w}x{h}")),
            _ => None,
        }
    }
}

/// Recently uploaded assets, newest first, capped at [`MAX_ASSETS`].
#[derive(Debug, Default)]
pub struct AssetRegistry {
    store: Option<LocalStore>,
    items: Vec<Asset>,
}

impl AssetRegistry {
    pub fn open(store: LocalStore) -> Self {
        let mut items: Vec<Asset> = storage::load_list_or_empty(&store, ASSETS_KEY);
        items.truncate(MAX_ASSETS);
        Self {
            store: Some(store),
            items,
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Adds an asset as the most recent entry. Re-adding an identifier
    /// replaces the earlier entry instead of duplicating it.
    pub fn add(&mut self, asset: Asset) -> Asset {
        self.items.retain(|a| a.asset_id != asset.asset_id);
        self.items.insert(0, asset.clone());
        self.items.truncate(MAX_ASSETS);
        self.persist();
        log::debug!("registered asset {}", asset.asset_id);
        asset
    }

    pub fn recent(&self, limit: usize) -> &[Asset] {
        &self.items[..limit.min(self.items.len())]
    }

    pub fn get(&self, asset_id: &str) -> Option<&Asset> {
        self.items.iter().find(|a| a.asset_id == asset_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        if let Some(store) = &self.store {
            if let Err(err) = store.remove(ASSETS_KEY) {
                log::warn!("could not clear {ASSETS_KEY}: {err}");
            }
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            storage::save_best_effort(store, ASSETS_KEY, &self.items);
        }
    }
}
