use crate::errors::CoreError;

use super::traits::KeyValueStorage;

/// Which Web Storage area to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebStorageArea {
    /// `window.sessionStorage`: per tab, survives reloads.
    Session,
    /// `window.localStorage`: shared by every tab of the origin.
    Local,
}

/// Browser storage (wasm32 only).
///
/// Holds no JS handles. The `Storage` object is looked up on every call.
#[derive(Debug, Clone, Copy)]
pub struct WebStorage {
    area: WebStorageArea,
}

impl WebStorage {
    pub fn session() -> Self {
        Self {
            area: WebStorageArea::Session,
        }
    }

    pub fn local() -> Self {
        Self {
            area: WebStorageArea::Local,
        }
    }

    fn storage(&self) -> Result<web_sys::Storage, CoreError> {
        let window = web_sys::window()
            .ok_or_else(|| CoreError::Storage("no window object".into()))?;
        let storage = match self.area {
            WebStorageArea::Session => window.session_storage(),
            WebStorageArea::Local => window.local_storage(),
        };
        storage
            .map_err(|_| CoreError::Storage(format!("{} access denied", self.name())))?
            .ok_or_else(|| CoreError::Storage(format!("{} not available", self.name())))
    }
}

impl KeyValueStorage for WebStorage {
    fn name(&self) -> &str {
        match self.area {
            WebStorageArea::Session => "sessionStorage",
            WebStorageArea::Local => "localStorage",
        }
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, CoreError> {
        self.storage()?
            .get_item(key)
            .map_err(|_| CoreError::Storage(format!("failed to read '{key}'")))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.storage()?
            .set_item(key, value)
            .map_err(|_| CoreError::Storage(format!("failed to write '{key}' (quota exceeded?)")))
    }

    fn remove_item(&self, key: &str) -> Result<(), CoreError> {
        self.storage()?
            .remove_item(key)
            .map_err(|_| CoreError::Storage(format!("failed to remove '{key}'")))
    }
}
