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

//! An in-process backend.
//!
//! All state lives in one `State` value. A unit of work takes the store's
//! single writer slot and works on a private copy of the state, which replaces
//! the committed state on commit. Nested units push a copy of the working
//! state so that rolling them back discards only their own changes.
//!
//! The writer slot is owned by a thread. Every mapper used on that thread
//! joins the same unit of work; other threads see only committed state and
//! wait for the slot (up to the lock timeout) if they want to write.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Instant;

use log::{debug, warn};

use crate::model::*;
use crate::store::*;
use crate::support::error::Error;
use crate::support::store_config::StoreConfig;

mod annotation;
mod attachment;
mod ids;
mod mailbox;
mod message;
mod message_id;
mod state;

use self::state::State;

/// The shared state behind every memory mapper of one provider.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    writer_released: Condvar,
    locker: PathLocker,
    config: StoreConfig,
}

struct Inner {
    committed: State,
    unit: Option<Unit>,
}

struct Unit {
    owner: ThreadId,
    working: State,
    savepoints: Vec<State>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                committed: State::default(),
                unit: None,
            }),
            writer_released: Condvar::new(),
            locker: PathLocker::new(config.lock_timeout()),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        // Mutations happen on the working copy, which a rollback discards, so
        // a panic cannot leave the committed state inconsistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` against the state this thread can see.
    ///
    /// Inside a unit of work, that is the unit's working copy. Otherwise, it
    /// is the last committed state.
    fn read<R>(
        &self,
        f: impl FnOnce(&State) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let me = thread::current().id();
        let inner = self.lock_inner();
        match inner.unit {
            Some(ref unit) if unit.owner == me => f(&unit.working),
            _ => f(&inner.committed),
        }
    }

    /// Runs `f` against the working copy of this thread's unit of work.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut State) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut inner = self.lock_inner();
        f(&mut inner.owned_unit()?.working)
    }

    /// Runs `f` as a mutation of the mailbox at `path`.
    ///
    /// This joins the thread's unit of work (opening one if there is none)
    /// and then takes the path lock, in that order.
    fn write<R>(
        &self,
        operation: &'static str,
        path: &MailboxPath,
        f: impl FnOnce(&mut State) -> Result<R, Error>,
    ) -> Result<R, Error> {
        in_unit_of_work(self, operation, || {
            self.locker.execute_with_lock(path, || self.mutate(f))
        })
    }

    /// Like `write`, for mutations not tied to one mailbox.
    fn write_global<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut State) -> Result<R, Error>,
    ) -> Result<R, Error> {
        in_unit_of_work(self, operation, || self.mutate(f))
    }
}

impl Inner {
    fn owned_unit(&mut self) -> Result<&mut Unit, Error> {
        let me = thread::current().id();
        self.unit
            .as_mut()
            .filter(|unit| unit.owner == me)
            .ok_or(Error::NoUnitOfWork)
    }
}

impl UnitOfWork for MemoryStore {
    fn begin(&self) -> Result<(), Error> {
        let me = thread::current().id();
        let timeout = self.locker.timeout();
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock_inner();

        loop {
            match inner.unit.as_ref().map(|unit| unit.owner == me) {
                Some(true) => {
                    let unit = inner.owned_unit()?;
                    let savepoint = unit.working.clone();
                    unit.savepoints.push(savepoint);
                    return Ok(());
                },
                None => {
                    let working = inner.committed.clone();
                    inner.unit = Some(Unit {
                        owner: me,
                        working,
                        savepoints: Vec::new(),
                    });
                    return Ok(());
                },
                Some(false) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::LockTimeout {
                            path: "memory store writer".to_owned(),
                            timeout,
                        });
                    }

                    inner = self
                        .writer_released
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                },
            }
        }
    }

    fn commit(&self) -> Result<(), Error> {
        let mut inner = self.lock_inner();
        if inner.owned_unit()?.savepoints.pop().is_some() {
            return Ok(());
        }

        if let Some(unit) = inner.unit.take() {
            inner.committed = unit.working;
        }
        drop(inner);
        self.writer_released.notify_all();
        Ok(())
    }

    fn rollback(&self) -> Result<(), Error> {
        let mut inner = self.lock_inner();
        let unit = inner.owned_unit()?;
        if let Some(savepoint) = unit.savepoints.pop() {
            unit.working = savepoint;
            return Ok(());
        }

        debug!("Rolling back outermost memory unit of work");
        inner.unit = None;
        drop(inner);
        self.writer_released.notify_all();
        Ok(())
    }
}

/// The raw mapper over a `MemoryStore`.
///
/// One type implements every mapper trait; the provider hands it out behind
/// whichever trait is asked for.
pub struct MemoryMapper {
    store: Arc<MemoryStore>,
}

impl MemoryMapper {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

impl UnitOfWork for MemoryMapper {
    fn begin(&self) -> Result<(), Error> {
        self.store.begin()
    }

    fn commit(&self) -> Result<(), Error> {
        self.store.commit()
    }

    fn rollback(&self) -> Result<(), Error> {
        self.store.rollback()
    }
}

/// Mapper factory for the memory backend.
pub struct MemoryMapperProvider {
    store: Arc<MemoryStore>,
}

impl MemoryMapperProvider {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            store: Arc::new(MemoryStore::new(config)),
        }
    }

    fn mapper(&self) -> Transactional<MemoryMapper> {
        Transactional::new(MemoryMapper::new(Arc::clone(&self.store)))
    }
}

impl Default for MemoryMapperProvider {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MapperProvider for MemoryMapperProvider {
    fn supported_capabilities(&self) -> Capabilities {
        Capabilities::MAILBOX
            | Capabilities::MESSAGE
            | Capabilities::UNIQUE_MESSAGE_ID
            | Capabilities::ANNOTATION
            | Capabilities::ATTACHMENT
    }

    fn create_mailbox_mapper(&self) -> Result<Box<dyn MailboxMapper>, Error> {
        self.require(Capabilities::MAILBOX, "create_mailbox_mapper")?;
        Ok(Box::new(self.mapper()))
    }

    fn create_message_mapper(&self) -> Result<Box<dyn MessageMapper>, Error> {
        self.require(Capabilities::MESSAGE, "create_message_mapper")?;
        Ok(Box::new(self.mapper()))
    }

    fn create_message_id_mapper(
        &self,
    ) -> Result<Box<dyn MessageIdMapper>, Error> {
        self.require(
            Capabilities::UNIQUE_MESSAGE_ID,
            "create_message_id_mapper",
        )?;
        Ok(Box::new(self.mapper()))
    }

    fn create_annotation_mapper(
        &self,
    ) -> Result<Box<dyn AnnotationMapper>, Error> {
        self.require(Capabilities::ANNOTATION, "create_annotation_mapper")?;
        Ok(Box::new(self.mapper()))
    }

    fn create_attachment_mapper(
        &self,
    ) -> Result<Box<dyn AttachmentMapper>, Error> {
        self.require(Capabilities::ATTACHMENT, "create_attachment_mapper")?;
        Ok(Box::new(self.mapper()))
    }

    fn uid_provider(&self) -> Result<Box<dyn UidProvider>, Error> {
        Ok(Box::new(MemoryMapper::new(Arc::clone(&self.store))))
    }

    fn modseq_provider(&self) -> Result<Box<dyn ModseqProvider>, Error> {
        Ok(Box::new(MemoryMapper::new(Arc::clone(&self.store))))
    }

    fn generate_message_id(&self) -> Result<MessageId, Error> {
        self.store
            .write_global("generate_message_id", |state| {
                Ok(state.next_message_id())
            })
    }

    fn clear(&self) -> Result<(), Error> {
        warn!("Clearing memory store");
        self.store.write_global("clear", |state| {
            state.clear();
            Ok(())
        })
    }
}
