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
use std::ops::Bound;
use std::sync::Arc;

use chrono::prelude::*;

use crate::model::*;
use crate::support::error::Error;

/// Everything the memory store holds.
///
/// Units of work operate on a clone of this, so message content is shared
/// through `Arc` to keep the clone cheap.
#[derive(Clone, Default)]
pub(super) struct State {
    pub mailboxes: BTreeMap<MailboxId, MailboxRecord>,
    pub attachments: BTreeMap<AttachmentId, Attachment>,
    last_mailbox_id: i64,
    last_uid_validity: u32,
    last_message_id: i64,
}

#[derive(Clone)]
pub(super) struct MailboxRecord {
    pub path: MailboxPath,
    pub uid_validity: UidValidity,
    pub last_uid: Option<Uid>,
    pub highest_modseq: Modseq,
    pub messages: BTreeMap<Uid, StoredMessage>,
    pub annotations: BTreeMap<AnnotationKey, String>,
}

#[derive(Clone)]
pub(super) struct StoredMessage {
    pub message_id: MessageId,
    pub modseq: Modseq,
    pub flags: Flags,
    pub internal_date: DateTime<Utc>,
    pub content: Arc<[u8]>,
}

impl StoredMessage {
    pub fn to_message(
        &self,
        mailbox_id: MailboxId,
        uid: Uid,
        group: FetchGroup,
    ) -> Message {
        Message {
            mailbox_id,
            uid,
            message_id: self.message_id,
            modseq: self.modseq,
            flags: self.flags.clone(),
            internal_date: self.internal_date,
            size: self.content.len() as u64,
            content: match group {
                FetchGroup::Full => Some(self.content.to_vec()),
                FetchGroup::Metadata => None,
            },
        }
    }

    pub fn metadata(&self, uid: Uid) -> MessageMetadata {
        MessageMetadata {
            uid,
            message_id: self.message_id,
            modseq: self.modseq,
            flags: self.flags.clone(),
            size: self.content.len() as u64,
            internal_date: self.internal_date,
        }
    }
}

impl MailboxRecord {
    pub fn to_mailbox(&self, id: MailboxId) -> Mailbox {
        Mailbox {
            id,
            path: self.path.clone(),
            uid_validity: self.uid_validity,
            last_uid: self.last_uid,
            highest_modseq: self.highest_modseq,
        }
    }

    /// The messages within `start..end`, tolerating empty bounds.
    pub fn messages_in(
        &self,
        start: Bound<Uid>,
        end: Bound<Uid>,
    ) -> impl Iterator<Item = (Uid, &StoredMessage)> + '_ {
        let range = if MessageRange::is_satisfiable(start, end) {
            Some(self.messages.range((start, end)))
        } else {
            None
        };

        range.into_iter().flatten().map(|(&uid, m)| (uid, m))
    }
}

impl State {
    pub fn mailbox(&self, id: MailboxId) -> Result<&MailboxRecord, Error> {
        self.mailboxes
            .get(&id)
            .ok_or_else(|| Error::NxMailbox(id.to_string()))
    }

    pub fn mailbox_mut(
        &mut self,
        id: MailboxId,
    ) -> Result<&mut MailboxRecord, Error> {
        self.mailboxes
            .get_mut(&id)
            .ok_or_else(|| Error::NxMailbox(id.to_string()))
    }

    pub fn find_path(&self, path: &MailboxPath) -> Option<MailboxId> {
        self.mailboxes
            .iter()
            .find(|(_, record)| record.path == *path)
            .map(|(&id, _)| id)
    }

    fn next_uid_validity(&mut self) -> Result<UidValidity, Error> {
        let next = self
            .last_uid_validity
            .checked_add(1)
            .and_then(UidValidity::of)
            .ok_or(Error::MailboxFull)?;
        self.last_uid_validity = next.get();
        Ok(next)
    }

    pub fn next_message_id(&mut self) -> MessageId {
        self.last_message_id += 1;
        MessageId(self.last_message_id)
    }

    pub fn allocate_uid(&mut self, id: MailboxId) -> Result<Uid, Error> {
        let record = self.mailbox_mut(id)?;
        let uid = match record.last_uid {
            None => Uid::MIN,
            Some(last) => last.next().ok_or(Error::MailboxFull)?,
        };
        record.last_uid = Some(uid);
        Ok(uid)
    }

    pub fn allocate_modseq(&mut self, id: MailboxId) -> Result<Modseq, Error> {
        let record = self.mailbox_mut(id)?;
        let modseq = record.highest_modseq.next().ok_or(Error::MailboxFull)?;
        record.highest_modseq = modseq;
        Ok(modseq)
    }

    pub fn create_mailbox(
        &mut self,
        path: &MailboxPath,
    ) -> Result<Mailbox, Error> {
        if self.find_path(path).is_some() {
            return Err(Error::MailboxExists(path.to_string()));
        }

        let uid_validity = self.next_uid_validity()?;
        self.last_mailbox_id += 1;
        let id = MailboxId(self.last_mailbox_id);
        let record = MailboxRecord {
            path: path.clone(),
            uid_validity,
            last_uid: None,
            highest_modseq: Modseq::MIN,
            messages: BTreeMap::new(),
            annotations: BTreeMap::new(),
        };
        let mailbox = record.to_mailbox(id);
        self.mailboxes.insert(id, record);
        Ok(mailbox)
    }

    pub fn rename_mailbox(
        &mut self,
        id: MailboxId,
        new_path: &MailboxPath,
        mode: RenameMode,
    ) -> Result<Mailbox, Error> {
        self.mailbox(id)?;
        if self.find_path(new_path).map_or(false, |other| other != id) {
            return Err(Error::MailboxExists(new_path.to_string()));
        }

        let uid_validity = match mode {
            RenameMode::Preserve => None,
            RenameMode::ResetUidValidity => Some(self.next_uid_validity()?),
        };

        let record = self.mailbox_mut(id)?;
        record.path = new_path.clone();
        if let Some(uid_validity) = uid_validity {
            let old = std::mem::take(&mut record.messages);
            record.messages = old
                .into_values()
                .zip((1..=u32::MAX).filter_map(Uid::of))
                .map(|(message, uid)| (uid, message))
                .collect();
            record.last_uid = record.messages.keys().next_back().copied();
            record.uid_validity = uid_validity;
        }

        Ok(record.to_mailbox(id))
    }

    /// Adds a message to `id` under a fresh UID and MODSEQ.
    pub fn insert_message(
        &mut self,
        id: MailboxId,
        flags: Flags,
        message_id: MessageId,
        internal_date: DateTime<Utc>,
        content: Arc<[u8]>,
    ) -> Result<MessageMetadata, Error> {
        let uid = self.allocate_uid(id)?;
        let modseq = self.allocate_modseq(id)?;
        let stored = StoredMessage {
            message_id,
            modseq,
            flags,
            internal_date,
            content,
        };
        let metadata = stored.metadata(uid);
        self.mailbox_mut(id)?.messages.insert(uid, stored);
        Ok(metadata)
    }

    pub fn message(
        &self,
        mailbox_id: MailboxId,
        uid: Uid,
    ) -> Result<&StoredMessage, Error> {
        self.mailbox(mailbox_id)?
            .messages
            .get(&uid)
            .ok_or_else(|| Error::NxMessage(format!("{} uid {}", mailbox_id, uid)))
    }

    /// Applies `update` to every message of `id` within `range`.
    ///
    /// One MODSEQ is allocated if anything actually changes.
    pub fn update_flags(
        &mut self,
        id: MailboxId,
        range: MessageRange,
        update: &FlagsUpdate,
    ) -> Result<Vec<UpdatedFlags>, Error> {
        self.update_flags_where(id, range, update, |_| true)
    }

    /// Like `update_flags`, but only touches messages whose UID passes
    /// `filter`.
    pub fn update_flags_where(
        &mut self,
        id: MailboxId,
        range: MessageRange,
        update: &FlagsUpdate,
        mut filter: impl FnMut(Uid) -> bool,
    ) -> Result<Vec<UpdatedFlags>, Error> {
        let (start, end) = range.bounds();
        let changes = self
            .mailbox(id)?
            .messages_in(start, end)
            .filter(|&(uid, _)| filter(uid))
            .filter_map(|(uid, message)| {
                let new_flags = update.apply(&message.flags);
                if new_flags == message.flags {
                    None
                } else {
                    Some((uid, message.flags.clone(), new_flags))
                }
            })
            .collect::<Vec<_>>();

        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let modseq = self.allocate_modseq(id)?;
        let record = self.mailbox_mut(id)?;
        let mut updated = Vec::with_capacity(changes.len());
        for (uid, old_flags, new_flags) in changes {
            if let Some(message) = record.messages.get_mut(&uid) {
                message.flags = new_flags.clone();
                message.modseq = modseq;
            }
            updated.push(UpdatedFlags {
                uid,
                modseq,
                old_flags,
                new_flags,
            });
        }

        Ok(updated)
    }

    /// Removes every message of `id` accepted by `filter`.
    ///
    /// If anything was removed, the mailbox is stamped with a new MODSEQ.
    /// `last_uid` is untouched so the removed UIDs are never reissued.
    pub fn expunge(
        &mut self,
        id: MailboxId,
        mut filter: impl FnMut(Uid, &StoredMessage) -> bool,
    ) -> Result<Vec<MessageMetadata>, Error> {
        let record = self.mailbox_mut(id)?;
        let doomed = record
            .messages
            .iter()
            .filter(|&(&uid, message)| filter(uid, message))
            .map(|(&uid, _)| uid)
            .collect::<Vec<_>>();

        let expunged = doomed
            .into_iter()
            .filter_map(|uid| {
                record
                    .messages
                    .remove(&uid)
                    .map(|message| message.metadata(uid))
            })
            .collect::<Vec<_>>();

        if !expunged.is_empty() {
            self.allocate_modseq(id)?;
        }

        Ok(expunged)
    }

    /// Every instance of `message_id` as `(mailbox, path, uid)`, ordered by
    /// mailbox then UID.
    pub fn instances(
        &self,
        message_id: MessageId,
    ) -> Vec<(MailboxId, MailboxPath, Uid)> {
        self.mailboxes
            .iter()
            .flat_map(|(&id, record)| {
                record
                    .messages
                    .iter()
                    .filter(move |(_, m)| m.message_id == message_id)
                    .map(move |(&uid, _)| (id, record.path.clone(), uid))
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.mailboxes.clear();
        self.attachments.clear();
    }
}
