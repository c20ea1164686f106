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

use std::ops::Bound::{self, Included};

use chrono::prelude::*;
use log::debug;
use rusqlite::OptionalExtension as _;

use super::ids::{allocate_modseq, allocate_uid, counters};
use super::{next_message_id, types::*, SqliteMapper};
use crate::model::*;
use crate::store::*;
use crate::support::error::Error;

/// Adds a message to `mailbox` under a fresh UID and MODSEQ.
fn insert_message(
    cxn: &rusqlite::Connection,
    mailbox: MailboxId,
    flags: Flags,
    message_id: MessageId,
    internal_date: DateTime<Utc>,
    content: &[u8],
) -> Result<MessageMetadata, Error> {
    let uid = allocate_uid(cxn, mailbox)?;
    let modseq = allocate_modseq(cxn, mailbox)?;
    let size = content.len() as u64;
    cxn.prepare_cached(
        "INSERT INTO `message` (\
         `mailbox_id`, `uid`, `message_id`, `modseq`, `system_flags`, \
         `keywords`, `internal_date`, `size`, `content`\
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?
    .execute((
        mailbox,
        uid,
        message_id,
        modseq,
        flags.system.bits(),
        flags.keywords_to_string(),
        UnixMillis(internal_date),
        size as i64,
        content,
    ))?;

    Ok(MessageMetadata {
        uid,
        message_id,
        modseq,
        flags,
        size,
        internal_date,
    })
}

/// The metadata of every message of `mailbox` within the given bounds.
fn messages_between(
    cxn: &rusqlite::Connection,
    mailbox: MailboxId,
    start: Bound<Uid>,
    end: Bound<Uid>,
) -> Result<Vec<Message>, Error> {
    let (lo, hi) = uid_between(start, end);
    cxn.prepare_cached(&format!(
        "SELECT {} FROM `message` \
         WHERE `mailbox_id` = ? AND `uid` BETWEEN ? AND ? ORDER BY `uid`",
        message_columns(FetchGroup::Metadata),
    ))?
    .query_map((mailbox, lo, hi), from_row)?
    .collect::<Result<Vec<Message>, _>>()
    .map_err(Into::into)
}

/// Deletes `doomed` from `mailbox`, stamping the mailbox with a new MODSEQ
/// if anything was actually removed. `last_uid` is left alone.
fn remove_messages(
    cxn: &rusqlite::Connection,
    mailbox: MailboxId,
    doomed: Vec<Message>,
) -> Result<Vec<MessageMetadata>, Error> {
    let mut stmt = cxn.prepare_cached(
        "DELETE FROM `message` WHERE `mailbox_id` = ? AND `uid` = ?",
    )?;
    let mut expunged = Vec::with_capacity(doomed.len());
    for message in doomed {
        if 0 != stmt.execute((mailbox, message.uid))? {
            expunged.push(message.metadata());
        }
    }

    if !expunged.is_empty() {
        allocate_modseq(cxn, mailbox)?;
    }

    Ok(expunged)
}

impl SqliteMapper {
    fn count_where(
        &self,
        mailbox: &Mailbox,
        condition: &str,
    ) -> Result<u64, Error> {
        self.require_mailbox(mailbox.id)?;
        let count = self
            .cxn
            .prepare_cached(&format!(
                "SELECT COUNT(*) FROM `message` \
                 WHERE `mailbox_id` = ? AND {condition}",
            ))?
            .query_row((mailbox.id,), from_single::<i64>)?;
        Ok(count as u64)
    }
}

impl MessageSource for SqliteMapper {
    fn fetch_batch(
        &self,
        mailbox: MailboxId,
        start: Bound<Uid>,
        end: Bound<Uid>,
        group: FetchGroup,
        limit: usize,
    ) -> Result<Vec<Message>, Error> {
        let (lo, hi) = uid_between(start, end);
        self.cxn
            .prepare_cached(&format!(
                "SELECT {} FROM `message` \
                 WHERE `mailbox_id` = ? AND `uid` BETWEEN ? AND ? \
                 ORDER BY `uid` LIMIT ?",
                message_columns(group),
            ))?
            .query_map(
                (mailbox, lo, hi, i64::try_from(limit).unwrap_or(i64::MAX)),
                from_row,
            )?
            .collect::<Result<Vec<Message>, _>>()
            .map_err(Into::into)
    }
}

impl MessageMapper for SqliteMapper {
    fn append(
        &self,
        mailbox: &Mailbox,
        message: NewMessage,
    ) -> Result<MessageMetadata, Error> {
        message.flags.validate()?;
        let metadata = self.write("append", &mailbox.path, |cxn| {
            let message_id = match message.message_id {
                Some(id) => id,
                None => next_message_id(cxn)?,
            };
            insert_message(
                cxn,
                mailbox.id,
                message.flags,
                message_id,
                message.internal_date,
                &message.content,
            )
        })?;
        debug!(
            "Appended {} to {} as {}",
            metadata.message_id, mailbox.path, metadata.uid
        );
        Ok(metadata)
    }

    fn copy(
        &self,
        target: &Mailbox,
        original: &Message,
    ) -> Result<MessageMetadata, Error> {
        self.write("copy", &target.path, |cxn| {
            let source = cxn
                .prepare_cached(&format!(
                    "SELECT {} FROM `message` \
                     WHERE `mailbox_id` = ? AND `uid` = ?",
                    message_columns(FetchGroup::Full),
                ))?
                .query_row(
                    (original.mailbox_id, original.uid),
                    from_row::<Message>,
                )
                .optional()?
                .ok_or_else(|| {
                    Error::NxMessage(format!(
                        "{} uid {}",
                        original.mailbox_id, original.uid
                    ))
                })?;
            let Message {
                message_id,
                flags,
                internal_date,
                content,
                ..
            } = source;

            insert_message(
                cxn,
                target.id,
                flags.with(Flag::Recent),
                message_id,
                internal_date,
                content.as_deref().unwrap_or_default(),
            )
        })
    }

    fn move_to(
        &self,
        target: &Mailbox,
        original: &Message,
    ) -> Result<MessageMetadata, Error> {
        in_unit_of_work(self, "move", || {
            let metadata = self.copy(target, original)?;
            let source = MailboxMapper::find_by_id(self, original.mailbox_id)?;
            MessageMapper::delete(self, &source, original)?;
            Ok(metadata)
        })
    }

    fn find_in_mailbox(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
        group: FetchGroup,
        limit: Option<usize>,
    ) -> Result<MessageIter<'_>, Error> {
        self.require_mailbox(mailbox.id)?;
        Ok(MessageIter::new(
            self,
            mailbox.id,
            range,
            group,
            self.batch_size,
            limit,
        ))
    }

    fn find_recent_uids(&self, mailbox: &Mailbox) -> Result<Vec<Uid>, Error> {
        self.require_mailbox(mailbox.id)?;
        self.cxn
            .prepare_cached(
                "SELECT `uid` FROM `message` \
                 WHERE `mailbox_id` = ? AND `system_flags` & ? != 0 \
                 ORDER BY `uid`",
            )?
            .query_map((mailbox.id, SystemFlags::RECENT.bits()), from_single)?
            .collect::<Result<Vec<Uid>, _>>()
            .map_err(Into::into)
    }

    fn find_first_unseen_uid(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Option<Uid>, Error> {
        self.require_mailbox(mailbox.id)?;
        self.cxn
            .prepare_cached(
                "SELECT `uid` FROM `message` \
                 WHERE `mailbox_id` = ? AND `system_flags` & ? = 0 \
                 ORDER BY `uid` LIMIT 1",
            )?
            .query_row((mailbox.id, SystemFlags::SEEN.bits()), from_single)
            .optional()
            .map_err(Into::into)
    }

    fn update_flags(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
        update: &FlagsUpdate,
    ) -> Result<Vec<UpdatedFlags>, Error> {
        update.flags.validate()?;
        self.write("update_flags", &mailbox.path, |cxn| {
            self.require_mailbox(mailbox.id)?;
            let (start, end) = range.bounds();
            let changes = messages_between(cxn, mailbox.id, start, end)?
                .into_iter()
                .filter_map(|message| {
                    let new_flags = update.apply(&message.flags);
                    if new_flags == message.flags {
                        None
                    } else {
                        Some((message.uid, message.flags, new_flags))
                    }
                })
                .collect::<Vec<_>>();

            if changes.is_empty() {
                return Ok(Vec::new());
            }

            let modseq = allocate_modseq(cxn, mailbox.id)?;
            let mut stmt = cxn.prepare_cached(
                "UPDATE `message` \
                 SET `system_flags` = ?, `keywords` = ?, `modseq` = ? \
                 WHERE `mailbox_id` = ? AND `uid` = ?",
            )?;
            let mut updated = Vec::with_capacity(changes.len());
            for (uid, old_flags, new_flags) in changes {
                stmt.execute((
                    new_flags.system.bits(),
                    new_flags.keywords_to_string(),
                    modseq,
                    mailbox.id,
                    uid,
                ))?;
                updated.push(UpdatedFlags {
                    uid,
                    modseq,
                    old_flags,
                    new_flags,
                });
            }

            Ok(updated)
        })
    }

    fn expunge(
        &self,
        mailbox: &Mailbox,
        uids: &UidSet,
    ) -> Result<Vec<MessageMetadata>, Error> {
        self.write("expunge", &mailbox.path, |cxn| {
            self.require_mailbox(mailbox.id)?;
            let mut doomed = Vec::new();
            for (start, end) in uids.ranges() {
                doomed.extend(messages_between(
                    cxn,
                    mailbox.id,
                    Included(start),
                    Included(end),
                )?);
            }
            remove_messages(cxn, mailbox.id, doomed)
        })
    }

    fn expunge_marked_for_deletion(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
    ) -> Result<Vec<MessageMetadata>, Error> {
        self.write("expunge", &mailbox.path, |cxn| {
            self.require_mailbox(mailbox.id)?;
            let (start, end) = range.bounds();
            let mut doomed = messages_between(cxn, mailbox.id, start, end)?;
            doomed.retain(|message| message.flags.is_deleted());
            remove_messages(cxn, mailbox.id, doomed)
        })
    }

    fn delete(&self, mailbox: &Mailbox, message: &Message) -> Result<(), Error> {
        let expunged = self.write("delete_message", &mailbox.path, |cxn| {
            self.require_mailbox(mailbox.id)?;
            let doomed = messages_between(
                cxn,
                mailbox.id,
                Included(message.uid),
                Included(message.uid),
            )?;
            remove_messages(cxn, mailbox.id, doomed)
        })?;

        if expunged.is_empty() {
            Err(Error::NxMessage(format!(
                "{} uid {}",
                mailbox.path, message.uid
            )))
        } else {
            Ok(())
        }
    }

    fn count_messages(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.count_where(mailbox, "1")
    }

    fn count_unseen(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.count_where(mailbox, "`system_flags` & 32 = 0")
    }

    fn count_recent(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.count_where(mailbox, "`system_flags` & 16 != 0")
    }

    fn last_uid(&self, mailbox: &Mailbox) -> Result<Option<Uid>, Error> {
        counters(&self.cxn, mailbox.id).map(|c| c.0)
    }

    fn highest_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error> {
        counters(&self.cxn, mailbox.id).map(|c| c.1)
    }
}
