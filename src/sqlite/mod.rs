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

//! A backend on a single SQLite database file.
//!
//! Every mapper owns its own connection. The outermost unit of work on a
//! connection is a `BEGIN IMMEDIATE` transaction, which also serialises
//! writers across processes; nested units are savepoints.
//!
//! This backend has no cross-mailbox message identity table and no attachment
//! storage, so it does not offer those capabilities.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rusqlite::OptionalExtension as _;

use crate::model::*;
use crate::store::*;
use crate::support::error::Error;
use crate::support::store_config::StoreConfig;

mod annotation;
mod ids;
mod mailbox;
mod message;
mod migrations;
mod types;

use self::types::*;

static MIGRATION_V1: &str = include_str!("store.v1.sql");

/// The raw mapper over one SQLite connection.
///
/// One type implements every mapper trait this backend supports. It is not
/// `Sync`; each thread opens its own.
pub struct SqliteMapper {
    cxn: rusqlite::Connection,
    /// The number of units of work currently open on `cxn`.
    depth: Cell<u32>,
    locker: Arc<PathLocker>,
    batch_size: usize,
    db_path: String,
    busy_timeout: Duration,
}

impl SqliteMapper {
    fn open(
        path: &Path,
        config: &StoreConfig,
        locker: Arc<PathLocker>,
    ) -> Result<Self, Error> {
        let mut cxn = rusqlite::Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE,
        )?;

        cxn.busy_timeout(config.sqlite.busy_timeout())?;
        cxn.pragma_update(None, "foreign_keys", true)?;
        cxn.pragma_update(
            None,
            "journal_mode",
            config.sqlite.journal_mode.as_str(),
        )?;
        cxn.pragma_update(
            None,
            "journal_size_limit",
            config.sqlite.journal_size_limit,
        )?;

        migrations::apply_migrations(
            &mut cxn,
            &path.display().to_string(),
            &[MIGRATION_V1],
        )?;

        Ok(Self {
            cxn,
            depth: Cell::new(0),
            locker,
            batch_size: config.batch_size(),
            db_path: path.display().to_string(),
            busy_timeout: config.sqlite.busy_timeout(),
        })
    }

    /// Maps failure to get the database write lock within the busy timeout
    /// to `LockTimeout`.
    fn contention(&self, e: rusqlite::Error) -> Error {
        match e {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                warn!(
                    "Gave up waiting {:?} for write lock on {}",
                    self.busy_timeout, self.db_path
                );
                Error::LockTimeout {
                    path: self.db_path.clone(),
                    timeout: self.busy_timeout,
                }
            },
            e => e.into(),
        }
    }

    /// Runs `f` as a mutation of the mailbox at `path`.
    ///
    /// This joins the connection's unit of work (opening one if there is
    /// none) and then takes the path lock, in that order.
    fn write<R>(
        &self,
        operation: &'static str,
        path: &MailboxPath,
        f: impl FnOnce(&rusqlite::Connection) -> Result<R, Error>,
    ) -> Result<R, Error> {
        in_unit_of_work(self, operation, || {
            self.locker.execute_with_lock(path, || f(&self.cxn))
        })
    }

    /// Like `write`, for mutations not tied to one mailbox.
    fn write_global<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&rusqlite::Connection) -> Result<R, Error>,
    ) -> Result<R, Error> {
        in_unit_of_work(self, operation, || f(&self.cxn))
    }

    fn require_mailbox(&self, id: MailboxId) -> Result<(), Error> {
        self.cxn
            .prepare_cached("SELECT 1 FROM `mailbox` WHERE `id` = ?")?
            .query_row((id,), |_| Ok(()))
            .optional()?
            .ok_or_else(|| Error::NxMailbox(id.to_string()))
    }
}

/// Increments the store-wide counter `name` and returns the new value.
fn next_counter(
    cxn: &rusqlite::Connection,
    name: &str,
) -> Result<i64, Error> {
    cxn.prepare_cached(
        "UPDATE `counter` SET `value` = `value` + 1 WHERE `name` = ? \
         RETURNING `value`",
    )?
    .query_row((name,), from_single)
    .map_err(Into::into)
}

fn next_uid_validity(cxn: &rusqlite::Connection) -> Result<UidValidity, Error> {
    let raw = next_counter(cxn, "uid_validity")?;
    u32::try_from(raw)
        .ok()
        .and_then(UidValidity::of)
        .ok_or(Error::MailboxFull)
}

fn next_message_id(cxn: &rusqlite::Connection) -> Result<MessageId, Error> {
    next_counter(cxn, "message_id").map(MessageId)
}

impl UnitOfWork for SqliteMapper {
    fn begin(&self) -> Result<(), Error> {
        let depth = self.depth.get();
        if 0 == depth {
            self.cxn
                .execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| self.contention(e))?;
        } else {
            self.cxn.execute_batch(&format!("SAVEPOINT sp{depth}"))?;
        }
        self.depth.set(depth + 1);
        Ok(())
    }

    fn commit(&self) -> Result<(), Error> {
        let depth = self.depth.get();
        match depth {
            0 => return Err(Error::NoUnitOfWork),
            1 => self.cxn.execute_batch("COMMIT")?,
            _ => self
                .cxn
                .execute_batch(&format!("RELEASE sp{}", depth - 1))?,
        }
        self.depth.set(depth - 1);
        Ok(())
    }

    fn rollback(&self) -> Result<(), Error> {
        let depth = self.depth.get();
        if 0 == depth {
            return Err(Error::NoUnitOfWork);
        }

        // Whatever happens, this unit is over.
        self.depth.set(depth - 1);
        if 1 == depth {
            if self.cxn.is_autocommit() {
                // SQLite already rolled back on its own, e.g. after SQLITE_FULL.
                debug!("Transaction was already rolled back");
                return Ok(());
            }
            self.cxn.execute_batch("ROLLBACK")?;
        } else {
            let sp = depth - 1;
            self.cxn.execute_batch(&format!(
                "ROLLBACK TO sp{sp}; RELEASE sp{sp}"
            ))?;
        }
        Ok(())
    }
}

impl Drop for SqliteMapper {
    fn drop(&mut self) {
        if 0 != self.depth.get() {
            warn!("SQLite mapper dropped with a unit of work still open");
        }
    }
}

/// Mapper factory for the SQLite backend.
pub struct SqliteMapperProvider {
    path: PathBuf,
    config: StoreConfig,
    locker: Arc<PathLocker>,
}

impl SqliteMapperProvider {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: &Path, config: StoreConfig) -> Result<Self, Error> {
        let this = Self {
            path: path.to_owned(),
            locker: Arc::new(PathLocker::new(config.lock_timeout())),
            config,
        };
        // Fail early on a bad path and get migrations out of the way.
        this.connect()?;
        info!("Opened mailbox store {}", path.display());
        Ok(this)
    }

    /// Opens a new raw mapper on its own connection.
    pub fn connect(&self) -> Result<SqliteMapper, Error> {
        SqliteMapper::open(&self.path, &self.config, Arc::clone(&self.locker))
    }

    fn mapper(&self) -> Result<Transactional<SqliteMapper>, Error> {
        self.connect().map(Transactional::new)
    }
}

impl MapperProvider for SqliteMapperProvider {
    fn supported_capabilities(&self) -> Capabilities {
        Capabilities::MAILBOX | Capabilities::MESSAGE | Capabilities::ANNOTATION
    }

    fn create_mailbox_mapper(&self) -> Result<Box<dyn MailboxMapper>, Error> {
        self.require(Capabilities::MAILBOX, "create_mailbox_mapper")?;
        Ok(Box::new(self.mapper()?))
    }

    fn create_message_mapper(&self) -> Result<Box<dyn MessageMapper>, Error> {
        self.require(Capabilities::MESSAGE, "create_message_mapper")?;
        Ok(Box::new(self.mapper()?))
    }

    fn create_message_id_mapper(
        &self,
    ) -> Result<Box<dyn MessageIdMapper>, Error> {
        Err(Error::Unsupported {
            operation: "create_message_id_mapper",
        })
    }

    fn create_annotation_mapper(
        &self,
    ) -> Result<Box<dyn AnnotationMapper>, Error> {
        self.require(Capabilities::ANNOTATION, "create_annotation_mapper")?;
        Ok(Box::new(self.mapper()?))
    }

    fn create_attachment_mapper(
        &self,
    ) -> Result<Box<dyn AttachmentMapper>, Error> {
        Err(Error::Unsupported {
            operation: "create_attachment_mapper",
        })
    }

    fn uid_provider(&self) -> Result<Box<dyn UidProvider>, Error> {
        Ok(Box::new(self.connect()?))
    }

    fn modseq_provider(&self) -> Result<Box<dyn ModseqProvider>, Error> {
        Ok(Box::new(self.connect()?))
    }

    fn generate_message_id(&self) -> Result<MessageId, Error> {
        let mapper = self.connect()?;
        mapper.write_global("generate_message_id", next_message_id)
    }

    fn clear(&self) -> Result<(), Error> {
        warn!("Clearing mailbox store {}", self.path.display());
        let mapper = self.connect()?;
        mapper.write_global("clear", |cxn| {
            cxn.execute("DELETE FROM `mailbox`", ())?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn provider() -> (tempfile::TempDir, SqliteMapperProvider) {
        crate::init_test_log();
        let tmpdir = tempfile::TempDir::new().unwrap();
        let provider = SqliteMapperProvider::open(
            &tmpdir.path().join("store.sqlite"),
            StoreConfig::default(),
        )
        .unwrap();
        (tmpdir, provider)
    }

    fn mailbox_count(mapper: &SqliteMapper) -> i64 {
        mapper
            .cxn
            .query_row("SELECT COUNT(*) FROM `mailbox`", (), from_single)
            .unwrap()
    }

    #[test]
    fn nested_units_use_savepoints() {
        let (_tmpdir, provider) = provider();
        let mapper = provider.connect().unwrap();

        mapper.begin().unwrap();
        MailboxMapper::create(&mapper, &MailboxPath::inbox("alice").unwrap())
            .unwrap();
        mapper.begin().unwrap();
        MailboxMapper::create(
            &mapper,
            &MailboxPath::for_user("alice", "Sent").unwrap(),
        )
        .unwrap();
        assert_eq!(2, mailbox_count(&mapper));
        mapper.rollback().unwrap();
        assert_eq!(1, mailbox_count(&mapper));
        mapper.commit().unwrap();

        let other = provider.connect().unwrap();
        assert_eq!(1, mailbox_count(&other));
        assert_matches!(Err(Error::NoUnitOfWork), mapper.commit());
    }

    #[test]
    fn uncommitted_writes_are_invisible_to_other_connections() {
        let (_tmpdir, provider) = provider();
        let writer = provider.connect().unwrap();
        let reader = provider.connect().unwrap();

        writer.begin().unwrap();
        MailboxMapper::create(&writer, &MailboxPath::inbox("alice").unwrap())
            .unwrap();
        assert_eq!(0, mailbox_count(&reader));
        writer.commit().unwrap();
        assert_eq!(1, mailbox_count(&reader));
    }

    #[test]
    fn contended_writer_times_out() {
        crate::init_test_log();
        let tmpdir = tempfile::TempDir::new().unwrap();
        let provider = SqliteMapperProvider::open(
            &tmpdir.path().join("store.sqlite"),
            StoreConfig::from_toml("[sqlite]\nbusy_timeout_ms = 100\n")
                .unwrap(),
        )
        .unwrap();
        let mailbox = provider
            .create_mailbox_mapper()
            .unwrap()
            .create(&MailboxPath::inbox("alice").unwrap())
            .unwrap();

        let messages = provider.create_message_mapper().unwrap();
        let holder = provider.connect().unwrap();
        holder.begin().unwrap();

        let err = messages
            .append(
                &mailbox,
                NewMessage::new(b"hello".to_vec(), chrono::Utc::now()),
            )
            .unwrap_err();
        assert!(err.is_retryable());
        match err {
            Error::LockTimeout { path, timeout } => {
                assert!(path.ends_with("store.sqlite"));
                assert_eq!(Duration::from_millis(100), timeout);
            },
            unexpected => panic!("Expected LockTimeout, got {:?}", unexpected),
        }
        assert_eq!(None, messages.last_uid(&mailbox).unwrap());

        holder.rollback().unwrap();
        messages
            .append(
                &mailbox,
                NewMessage::new(b"hello".to_vec(), chrono::Utc::now()),
            )
            .unwrap();
        assert_eq!(Some(Uid::MIN), messages.last_uid(&mailbox).unwrap());
    }

    #[test]
    fn schema_survives_reopen() {
        let tmpdir = tempfile::TempDir::new().unwrap();
        let path = tmpdir.path().join("store.sqlite");
        let mailbox = {
            let provider =
                SqliteMapperProvider::open(&path, StoreConfig::default())
                    .unwrap();
            provider
                .create_mailbox_mapper()
                .unwrap()
                .create(&MailboxPath::inbox("alice").unwrap())
                .unwrap()
        };

        let provider =
            SqliteMapperProvider::open(&path, StoreConfig::default()).unwrap();
        assert_eq!(
            mailbox,
            provider
                .create_mailbox_mapper()
                .unwrap()
                .find_by_id(mailbox.id)
                .unwrap()
        );
        // Counters are durable too.
        let next = provider
            .create_mailbox_mapper()
            .unwrap()
            .create(&MailboxPath::for_user("alice", "Sent").unwrap())
            .unwrap();
        assert!(next.uid_validity > mailbox.uid_validity);
        assert!(next.id > mailbox.id);
    }

    #[test]
    fn unsupported_factories() {
        let (_tmpdir, provider) = provider();
        assert!(!provider
            .supported_capabilities()
            .contains(Capabilities::ATTACHMENT));
        assert!(!provider.supports_partial_attachment_fetch());
        assert_matches!(
            Err(Error::Unsupported {
                operation: "create_attachment_mapper"
            }),
            provider.create_attachment_mapper().map(|_| ()),
        );
        assert_matches!(
            Err(Error::Unsupported { .. }),
            provider.create_message_id_mapper().map(|_| ()),
        );
    }
}
