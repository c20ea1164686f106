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

//! The mapper contracts every backend implements.
//!
//! The general guidelines are:
//!
//! 1. A raw mapper does not open units of work for its own mutations; it runs
//!    inside whatever unit its caller (normally `Transactional`) opened.
//! 2. Identifier providers always run their read-increment-write inside a
//!    unit of work, joining the caller's if there is one, and under the
//!    `PathLocker` for the mailbox.
//! 3. Lock order is: store writer slot, then mailbox path lock.
//! 4. Factories for capabilities a backend lacks fail immediately.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::model::*;
use crate::support::error::Error;

mod locker;
mod message_iter;
mod transactional;

pub use self::locker::PathLocker;
pub use self::message_iter::{MessageIter, MessageSource};
pub use self::transactional::Transactional;
pub use self::transactional::in_unit_of_work;

/// The begin/commit/rollback surface of a backing store.
///
/// Units nest: a `begin` while a unit is already open on the same session (or,
/// for the memory backend, the same thread) opens a nested unit whose
/// rollback only discards its own changes.
///
/// Every mapper is also a `UnitOfWork`, so callers holding only a boxed mapper
/// can still group several calls with `in_unit_of_work`.
pub trait UnitOfWork {
    fn begin(&self) -> Result<(), Error>;
    fn commit(&self) -> Result<(), Error>;
    fn rollback(&self) -> Result<(), Error>;
}

/// Issues message UIDs.
pub trait UidProvider {
    /// Allocates the next UID of `mailbox`.
    fn next_uid(&self, mailbox: &Mailbox) -> Result<Uid, Error>;
    /// The last allocated UID of `mailbox`, if any.
    fn last_uid(&self, mailbox: &Mailbox) -> Result<Option<Uid>, Error>;
}

/// Issues mailbox modification sequence numbers.
pub trait ModseqProvider {
    /// Allocates the next MODSEQ of `mailbox`.
    fn next_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error>;
    /// The greatest MODSEQ allocated so far for `mailbox`.
    fn highest_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error>;
}

pub trait MailboxMapper: UnitOfWork {
    /// Creates a mailbox at `path`.
    ///
    /// Fails with `MailboxExists` if something already lives there.
    fn create(&self, path: &MailboxPath) -> Result<Mailbox, Error>;
    fn find_by_path(&self, path: &MailboxPath) -> Result<Mailbox, Error>;
    fn find_by_id(&self, id: MailboxId) -> Result<Mailbox, Error>;
    fn find_with_path_like(
        &self,
        query: &MailboxQuery,
    ) -> Result<Vec<Mailbox>, Error>;
    fn has_children(
        &self,
        mailbox: &Mailbox,
        delimiter: char,
    ) -> Result<bool, Error>;
    /// Every mailbox in the store, ordered by ID.
    fn list(&self) -> Result<Vec<Mailbox>, Error>;
    /// Moves `mailbox` to `new_path`, keeping its identity.
    ///
    /// Returns the updated mailbox.
    fn rename(
        &self,
        mailbox: &Mailbox,
        new_path: &MailboxPath,
        mode: RenameMode,
    ) -> Result<Mailbox, Error>;
    /// Deletes `mailbox` along with its messages and annotations.
    ///
    /// Deleting a mailbox that no longer exists fails with `NxMailbox`.
    fn delete(&self, mailbox: &Mailbox) -> Result<(), Error>;
}

pub trait MessageMapper: UnitOfWork {
    fn append(
        &self,
        mailbox: &Mailbox,
        message: NewMessage,
    ) -> Result<MessageMetadata, Error>;
    /// Adds a copy of `original` to `target`, sharing its `MessageId`.
    fn copy(
        &self,
        target: &Mailbox,
        original: &Message,
    ) -> Result<MessageMetadata, Error>;
    /// Like `copy`, but also removes `original` from its mailbox.
    fn move_to(
        &self,
        target: &Mailbox,
        original: &Message,
    ) -> Result<MessageMetadata, Error>;
    /// Lazily iterates the messages in `range`, in ascending UID order.
    ///
    /// At most `limit` messages are produced if it is given.
    fn find_in_mailbox(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
        group: FetchGroup,
        limit: Option<usize>,
    ) -> Result<MessageIter<'_>, Error>;
    fn find_recent_uids(&self, mailbox: &Mailbox) -> Result<Vec<Uid>, Error>;
    fn find_first_unseen_uid(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Option<Uid>, Error>;
    /// Applies `update` to every message in `range`.
    ///
    /// All messages actually changed are stamped with one new MODSEQ; the
    /// result only lists those messages.
    fn update_flags(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
        update: &FlagsUpdate,
    ) -> Result<Vec<UpdatedFlags>, Error>;
    /// Removes the messages in `uids`. UIDs with no message are ignored.
    fn expunge(
        &self,
        mailbox: &Mailbox,
        uids: &UidSet,
    ) -> Result<Vec<MessageMetadata>, Error>;
    /// Removes the `\Deleted` messages in `range`.
    fn expunge_marked_for_deletion(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
    ) -> Result<Vec<MessageMetadata>, Error>;
    fn delete(&self, mailbox: &Mailbox, message: &Message) -> Result<(), Error>;
    fn count_messages(&self, mailbox: &Mailbox) -> Result<u64, Error>;
    fn count_unseen(&self, mailbox: &Mailbox) -> Result<u64, Error>;
    fn count_recent(&self, mailbox: &Mailbox) -> Result<u64, Error>;
    fn last_uid(&self, mailbox: &Mailbox) -> Result<Option<Uid>, Error>;
    fn highest_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error>;
}

pub trait MessageIdMapper: UnitOfWork {
    /// Every instance of the given messages, ordered by mailbox then UID.
    ///
    /// Fails with `NxMessage` if none of `ids` is known.
    fn find(
        &self,
        ids: &[MessageId],
        group: FetchGroup,
    ) -> Result<Vec<Message>, Error>;
    fn find_mailboxes(&self, id: MessageId) -> Result<Vec<MailboxId>, Error>;
    /// Changes the flags of every instance of `id` within `mailboxes`, or
    /// within every mailbox if `mailboxes` is empty.
    ///
    /// Each mailbox allocates one new MODSEQ for all of its instances, even
    /// when a copy left several instances in the same mailbox. Instances
    /// whose flags do not change are left out of the result, as are
    /// mailboxes where nothing changed.
    fn set_flags(
        &self,
        id: MessageId,
        mailboxes: &[MailboxId],
        update: &FlagsUpdate,
    ) -> Result<BTreeMap<MailboxId, Vec<UpdatedFlags>>, Error>;
    fn delete(&self, id: MessageId) -> Result<(), Error>;
    fn delete_in(
        &self,
        id: MessageId,
        mailboxes: &[MailboxId],
    ) -> Result<(), Error>;
}

/// Mailbox annotations.
///
/// Annotation changes are not change-tracked: they never advance the mailbox
/// MODSEQ.
pub trait AnnotationMapper: UnitOfWork {
    fn get_all(&self, mailbox: &Mailbox) -> Result<Vec<Annotation>, Error>;
    fn get_by_keys(
        &self,
        mailbox: &Mailbox,
        keys: &[AnnotationKey],
    ) -> Result<Vec<Annotation>, Error>;
    fn get_by_keys_with_one_depth(
        &self,
        mailbox: &Mailbox,
        keys: &[AnnotationKey],
    ) -> Result<Vec<Annotation>, Error>;
    fn get_by_keys_with_all_depth(
        &self,
        mailbox: &Mailbox,
        keys: &[AnnotationKey],
    ) -> Result<Vec<Annotation>, Error>;
    fn upsert(
        &self,
        mailbox: &Mailbox,
        annotation: &Annotation,
    ) -> Result<(), Error>;
    fn delete(&self, mailbox: &Mailbox, key: &AnnotationKey)
        -> Result<(), Error>;
    fn exists(&self, mailbox: &Mailbox, key: &AnnotationKey)
        -> Result<bool, Error>;
    fn count(&self, mailbox: &Mailbox) -> Result<u64, Error>;
}

pub trait AttachmentMapper: UnitOfWork {
    fn store(&self, attachment: &Attachment) -> Result<(), Error>;
    fn get(&self, id: &AttachmentId) -> Result<Attachment, Error>;
    /// Returns whichever of `ids` exist, in the order given.
    fn get_many(&self, ids: &[AttachmentId]) -> Result<Vec<Attachment>, Error>;
}

bitflags! {
    /// The optional features a backend implements.
    pub struct Capabilities: u32 {
        const MAILBOX = 1 << 0;
        const MESSAGE = 1 << 1;
        const UNIQUE_MESSAGE_ID = 1 << 2;
        const ANNOTATION = 1 << 3;
        const ATTACHMENT = 1 << 4;
        const PARTIAL_ATTACHMENT_FETCH = 1 << 5;
    }
}

/// The per-backend mapper factory.
///
/// Every mapper returned is wrapped in `Transactional`.
pub trait MapperProvider: Send + Sync {
    fn supported_capabilities(&self) -> Capabilities;

    fn supports_partial_attachment_fetch(&self) -> bool {
        self.supported_capabilities()
            .contains(Capabilities::PARTIAL_ATTACHMENT_FETCH)
    }

    /// Fails with `Unsupported` unless the backend has `capability`.
    fn require(
        &self,
        capability: Capabilities,
        operation: &'static str,
    ) -> Result<(), Error> {
        if self.supported_capabilities().contains(capability) {
            Ok(())
        } else {
            Err(Error::Unsupported { operation })
        }
    }

    fn create_mailbox_mapper(&self) -> Result<Box<dyn MailboxMapper>, Error>;
    fn create_message_mapper(&self) -> Result<Box<dyn MessageMapper>, Error>;
    fn create_message_id_mapper(
        &self,
    ) -> Result<Box<dyn MessageIdMapper>, Error>;
    fn create_annotation_mapper(
        &self,
    ) -> Result<Box<dyn AnnotationMapper>, Error>;
    fn create_attachment_mapper(
        &self,
    ) -> Result<Box<dyn AttachmentMapper>, Error>;

    /// A standalone UID provider for callers outside any mapper.
    fn uid_provider(&self) -> Result<Box<dyn UidProvider>, Error>;
    /// A standalone MODSEQ provider for callers outside any mapper.
    fn modseq_provider(&self) -> Result<Box<dyn ModseqProvider>, Error>;
    /// Allocates a fresh store-wide message identity.
    fn generate_message_id(&self) -> Result<MessageId, Error>;

    /// Removes every mailbox, message, annotation and attachment.
    fn clear(&self) -> Result<(), Error>;
}
