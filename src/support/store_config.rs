//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::Error;

/// Tunables for the mailbox store.
///
/// This is normally loaded from a `store.toml` next to the data it governs.
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long, in milliseconds, to wait for a mailbox path lock or for the
    /// store's writer slot before giving up with `LockTimeout`.
    pub lock_timeout_ms: u64,

    /// The number of messages fetched from the backend at a time when
    /// iterating a range of messages.
    pub fetch_batch_size: usize,

    /// Options specific to the SQLite backend.
    pub sqlite: SqliteConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 10_000,
            fetch_batch_size: 64,
            sqlite: SqliteConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// How long, in milliseconds, SQLite itself waits on a locked database.
    pub busy_timeout_ms: u64,

    /// The value for `PRAGMA journal_mode`.
    pub journal_mode: String,

    /// The value for `PRAGMA journal_size_limit`.
    pub journal_size_limit: i64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 10_000,
            journal_mode: "WAL".to_owned(),
            journal_size_limit: 1024 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(Into::into)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// The batch size, clamped so that iteration always makes progress.
    pub fn batch_size(&self) -> usize {
        self.fetch_batch_size.max(1)
    }
}

impl SqliteConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
