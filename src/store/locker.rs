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

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use log::trace;

use crate::model::MailboxPath;
use crate::support::error::Error;

/// In-process lock manager keyed by mailbox path.
///
/// Each path has at most one holder. The holder may re-acquire the same path
/// any number of times (holders are identified by thread). Other threads
/// wait at most `timeout` and then fail with `LockTimeout`.
///
/// This only serialises callers within one process. Backends shared between
/// processes must additionally rely on their own write lock, which is always
/// taken before any path lock.
pub struct PathLocker {
    held: Mutex<HashMap<MailboxPath, Holder>>,
    released: Condvar,
    timeout: Duration,
}

struct Holder {
    owner: ThreadId,
    depth: u32,
}

impl PathLocker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `f` while holding the lock on `path`.
    ///
    /// The lock is released when `f` returns or unwinds.
    pub fn execute_with_lock<R>(
        &self,
        path: &MailboxPath,
        f: impl FnOnce() -> Result<R, Error>,
    ) -> Result<R, Error> {
        self.acquire(path)?;
        let _guard = Release { locker: self, path };
        f()
    }

    fn acquire(&self, path: &MailboxPath) -> Result<(), Error> {
        let me = thread::current().id();
        let deadline = Instant::now() + self.timeout;
        let mut held = self.lock_table();

        loop {
            match held.get(path).map(|holder| holder.owner == me) {
                None => {
                    held.insert(path.clone(), Holder { owner: me, depth: 1 });
                    trace!("Locked {}", path);
                    return Ok(());
                },
                Some(true) => {
                    if let Some(holder) = held.get_mut(path) {
                        holder.depth += 1;
                    }
                    return Ok(());
                },
                Some(false) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::LockTimeout {
                            path: path.to_string(),
                            timeout: self.timeout,
                        });
                    }

                    held = self
                        .released
                        .wait_timeout(held, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                },
            }
        }
    }

    fn release(&self, path: &MailboxPath) {
        let mut held = self.lock_table();
        let done = match held.get_mut(path) {
            Some(holder) => {
                holder.depth -= 1;
                0 == holder.depth
            },
            None => false,
        };

        if done {
            held.remove(path);
            trace!("Unlocked {}", path);
            self.released.notify_all();
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<MailboxPath, Holder>> {
        // The table is never left inconsistent by a panic, so poisoning is
        // irrelevant.
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct Release<'a> {
    locker: &'a PathLocker,
    path: &'a MailboxPath,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.locker.release(self.path);
    }
}
