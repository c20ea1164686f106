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

use std::collections::BTreeMap;

use log::{error, warn};

use super::*;

/// Wraps a raw mapper so that each mutating call runs as one unit of work.
///
/// Read-only calls go straight through to the inner mapper.
pub struct Transactional<M> {
    inner: M,
}

impl<M: UnitOfWork> Transactional<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Runs `f` against the inner mapper inside a unit of work.
    ///
    /// The unit commits if `f` succeeds. If `f` fails, the unit is rolled
    /// back and `f`'s error returned unchanged. If `f` succeeds but the commit
    /// fails, the unit is rolled back and the result is `TransactionFailed`.
    ///
    /// Calls to `execute` may nest, in which case the inner call only
    /// commits or rolls back its own part of the work.
    pub fn execute<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&M) -> Result<R, Error>,
    ) -> Result<R, Error> {
        in_unit_of_work(&self.inner, operation, || f(&self.inner))
    }
}

/// Runs `f` inside a unit of work on `unit`, with the semantics of
/// `Transactional::execute`.
pub fn in_unit_of_work<U: UnitOfWork + ?Sized, R>(
    unit: &U,
    operation: &'static str,
    f: impl FnOnce() -> Result<R, Error>,
) -> Result<R, Error> {
    unit.begin()?;
    let mut guard = RollbackOnUnwind {
        unit,
        operation,
        armed: true,
    };
    let result = f();
    guard.armed = false;

    match result {
        Ok(r) => match unit.commit() {
            Ok(()) => Ok(r),
            Err(e) => {
                warn!("Commit of {} failed: {}", operation, e);
                if let Err(e2) = unit.rollback() {
                    error!(
                        "Rollback after failed commit of {} also failed: {}",
                        operation, e2
                    );
                }
                Err(Error::transaction_failed(operation, e))
            },
        },
        Err(e) => {
            if let Err(e2) = unit.rollback() {
                error!("Rollback of {} failed: {}", operation, e2);
            }
            Err(e)
        },
    }
}

struct RollbackOnUnwind<'a, U: UnitOfWork + ?Sized> {
    unit: &'a U,
    operation: &'static str,
    armed: bool,
}

impl<U: UnitOfWork + ?Sized> Drop for RollbackOnUnwind<'_, U> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Abandoned unit of work for {}; rolling back", self.operation);
            if let Err(e) = self.unit.rollback() {
                error!("Rollback of {} failed: {}", self.operation, e);
            }
        }
    }
}

impl<M: UnitOfWork> UnitOfWork for Transactional<M> {
    fn begin(&self) -> Result<(), Error> {
        self.inner.begin()
    }

    fn commit(&self) -> Result<(), Error> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<(), Error> {
        self.inner.rollback()
    }
}

impl<M: MailboxMapper> MailboxMapper for Transactional<M> {
    fn create(&self, path: &MailboxPath) -> Result<Mailbox, Error> {
        self.execute("create_mailbox", |m| m.create(path))
    }

    fn find_by_path(&self, path: &MailboxPath) -> Result<Mailbox, Error> {
        self.inner.find_by_path(path)
    }

    fn find_by_id(&self, id: MailboxId) -> Result<Mailbox, Error> {
        self.inner.find_by_id(id)
    }

    fn find_with_path_like(
        &self,
        query: &MailboxQuery,
    ) -> Result<Vec<Mailbox>, Error> {
        self.inner.find_with_path_like(query)
    }

    fn has_children(
        &self,
        mailbox: &Mailbox,
        delimiter: char,
    ) -> Result<bool, Error> {
        self.inner.has_children(mailbox, delimiter)
    }

    fn list(&self) -> Result<Vec<Mailbox>, Error> {
        self.inner.list()
    }

    fn rename(
        &self,
        mailbox: &Mailbox,
        new_path: &MailboxPath,
        mode: RenameMode,
    ) -> Result<Mailbox, Error> {
        self.execute("rename_mailbox", |m| m.rename(mailbox, new_path, mode))
    }

    fn delete(&self, mailbox: &Mailbox) -> Result<(), Error> {
        self.execute("delete_mailbox", |m| m.delete(mailbox))
    }
}

impl<M: MessageMapper> MessageMapper for Transactional<M> {
    fn append(
        &self,
        mailbox: &Mailbox,
        message: NewMessage,
    ) -> Result<MessageMetadata, Error> {
        self.execute("append", |m| m.append(mailbox, message))
    }

    fn copy(
        &self,
        target: &Mailbox,
        original: &Message,
    ) -> Result<MessageMetadata, Error> {
        self.execute("copy", |m| m.copy(target, original))
    }

    fn move_to(
        &self,
        target: &Mailbox,
        original: &Message,
    ) -> Result<MessageMetadata, Error> {
        self.execute("move", |m| m.move_to(target, original))
    }

    fn find_in_mailbox(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
        group: FetchGroup,
        limit: Option<usize>,
    ) -> Result<MessageIter<'_>, Error> {
        self.inner.find_in_mailbox(mailbox, range, group, limit)
    }

    fn find_recent_uids(&self, mailbox: &Mailbox) -> Result<Vec<Uid>, Error> {
        self.inner.find_recent_uids(mailbox)
    }

    fn find_first_unseen_uid(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Option<Uid>, Error> {
        self.inner.find_first_unseen_uid(mailbox)
    }

    fn update_flags(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
        update: &FlagsUpdate,
    ) -> Result<Vec<UpdatedFlags>, Error> {
        self.execute("update_flags", |m| m.update_flags(mailbox, range, update))
    }

    fn expunge(
        &self,
        mailbox: &Mailbox,
        uids: &UidSet,
    ) -> Result<Vec<MessageMetadata>, Error> {
        self.execute("expunge", |m| m.expunge(mailbox, uids))
    }

    fn expunge_marked_for_deletion(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
    ) -> Result<Vec<MessageMetadata>, Error> {
        self.execute("expunge", |m| m.expunge_marked_for_deletion(mailbox, range))
    }

    fn delete(&self, mailbox: &Mailbox, message: &Message) -> Result<(), Error> {
        self.execute("delete_message", |m| {
            MessageMapper::delete(m, mailbox, message)
        })
    }

    fn count_messages(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.inner.count_messages(mailbox)
    }

    fn count_unseen(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.inner.count_unseen(mailbox)
    }

    fn count_recent(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.inner.count_recent(mailbox)
    }

    fn last_uid(&self, mailbox: &Mailbox) -> Result<Option<Uid>, Error> {
        MessageMapper::last_uid(&self.inner, mailbox)
    }

    fn highest_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error> {
        MessageMapper::highest_modseq(&self.inner, mailbox)
    }
}

impl<M: MessageIdMapper> MessageIdMapper for Transactional<M> {
    fn find(
        &self,
        ids: &[MessageId],
        group: FetchGroup,
    ) -> Result<Vec<Message>, Error> {
        self.inner.find(ids, group)
    }

    fn find_mailboxes(&self, id: MessageId) -> Result<Vec<MailboxId>, Error> {
        self.inner.find_mailboxes(id)
    }

    fn set_flags(
        &self,
        id: MessageId,
        mailboxes: &[MailboxId],
        update: &FlagsUpdate,
    ) -> Result<BTreeMap<MailboxId, Vec<UpdatedFlags>>, Error> {
        self.execute("set_flags", |m| m.set_flags(id, mailboxes, update))
    }

    fn delete(&self, id: MessageId) -> Result<(), Error> {
        self.execute("delete_message_id", |m| MessageIdMapper::delete(m, id))
    }

    fn delete_in(
        &self,
        id: MessageId,
        mailboxes: &[MailboxId],
    ) -> Result<(), Error> {
        self.execute("delete_message_id", |m| m.delete_in(id, mailboxes))
    }
}

impl<M: AnnotationMapper> AnnotationMapper for Transactional<M> {
    fn get_all(&self, mailbox: &Mailbox) -> Result<Vec<Annotation>, Error> {
        self.inner.get_all(mailbox)
    }

    fn get_by_keys(
        &self,
        mailbox: &Mailbox,
        keys: &[AnnotationKey],
    ) -> Result<Vec<Annotation>, Error> {
        self.inner.get_by_keys(mailbox, keys)
    }

    fn get_by_keys_with_one_depth(
        &self,
        mailbox: &Mailbox,
        keys: &[AnnotationKey],
    ) -> Result<Vec<Annotation>, Error> {
        self.inner.get_by_keys_with_one_depth(mailbox, keys)
    }

    fn get_by_keys_with_all_depth(
        &self,
        mailbox: &Mailbox,
        keys: &[AnnotationKey],
    ) -> Result<Vec<Annotation>, Error> {
        self.inner.get_by_keys_with_all_depth(mailbox, keys)
    }

    fn upsert(
        &self,
        mailbox: &Mailbox,
        annotation: &Annotation,
    ) -> Result<(), Error> {
        self.execute("upsert_annotation", |m| m.upsert(mailbox, annotation))
    }

    fn delete(
        &self,
        mailbox: &Mailbox,
        key: &AnnotationKey,
    ) -> Result<(), Error> {
        self.execute("delete_annotation", |m| {
            AnnotationMapper::delete(m, mailbox, key)
        })
    }

    fn exists(
        &self,
        mailbox: &Mailbox,
        key: &AnnotationKey,
    ) -> Result<bool, Error> {
        self.inner.exists(mailbox, key)
    }

    fn count(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.inner.count(mailbox)
    }
}

impl<M: AttachmentMapper> AttachmentMapper for Transactional<M> {
    fn store(&self, attachment: &Attachment) -> Result<(), Error> {
        self.execute("store_attachment", |m| m.store(attachment))
    }

    fn get(&self, id: &AttachmentId) -> Result<Attachment, Error> {
        self.inner.get(id)
    }

    fn get_many(&self, ids: &[AttachmentId]) -> Result<Vec<Attachment>, Error> {
        self.inner.get_many(ids)
    }
}
