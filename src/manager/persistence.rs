// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Desired mode persistence
//!
//! The desired transport survives restarts in a small JSON document under the
//! `modbus_mode` key. Other keys of that document belong to other components
//! and are kept as they are when the mode is saved.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_json::{Map, Value};

use super::ManagerError;
use crate::transport::Transport;

/// Key holding the mode in the persisted document
pub const MODE_KEY: &str = "modbus_mode";

/// Storage of the desired transport.
pub trait ModePersistence: Send + Sync {
    /// Saved mode; `Rtu` when nothing usable is stored.
    fn read_desired_mode(&self) -> Transport;

    fn save_desired_mode(&self, mode: Transport) -> Result<(), ManagerError>;
}

/// [`ModePersistence`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonModeFile {
    path: PathBuf,
}

impl JsonModeFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Option<Map<String, Value>> {
        let contents = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) | Err(_) => {
                warn!("Ignoring unreadable mode file {:?}", self.path);
                None
            }
        }
    }
}

impl ModePersistence for JsonModeFile {
    fn read_desired_mode(&self) -> Transport {
        let mode = self
            .read_document()
            .and_then(|document| document.get(MODE_KEY).cloned())
            .and_then(|value| value.as_str().and_then(|s| s.parse().ok()));
        match mode {
            Some(mode) => {
                debug!("Saved Modbus mode is {}", mode);
                mode
            }
            None => {
                debug!("No saved Modbus mode in {:?}, using rtu", self.path);
                Transport::Rtu
            }
        }
    }

    fn save_desired_mode(&self, mode: Transport) -> Result<(), ManagerError> {
        let mut document = self.read_document().unwrap_or_default();
        document.insert(MODE_KEY.to_string(), Value::String(mode.to_string()));

        let contents = serde_json::to_string_pretty(&Value::Object(document))
            .map_err(|e| ManagerError::Persistence(e.to_string()))?;
        fs::write(&self.path, contents).map_err(|e| {
            ManagerError::Persistence(format!("cannot write {:?}: {}", self.path, e))
        })?;
        debug!("Saved Modbus mode {} to {:?}", mode, self.path);
        Ok(())
    }
}
