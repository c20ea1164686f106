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

use std::ops::Bound;
use std::sync::Arc;

use log::debug;

use super::MemoryMapper;
use crate::model::*;
use crate::store::*;
use crate::support::error::Error;

impl MessageSource for MemoryMapper {
    fn fetch_batch(
        &self,
        mailbox: MailboxId,
        start: Bound<Uid>,
        end: Bound<Uid>,
        group: FetchGroup,
        limit: usize,
    ) -> Result<Vec<Message>, Error> {
        self.store.read(|state| {
            Ok(state
                .mailbox(mailbox)?
                .messages_in(start, end)
                .take(limit)
                .map(|(uid, message)| message.to_message(mailbox, uid, group))
                .collect())
        })
    }
}

impl MessageMapper for MemoryMapper {
    fn append(
        &self,
        mailbox: &Mailbox,
        message: NewMessage,
    ) -> Result<MessageMetadata, Error> {
        message.flags.validate()?;
        let metadata = self.store.write("append", &mailbox.path, |state| {
            let message_id = match message.message_id {
                Some(id) => id,
                None => state.next_message_id(),
            };
            state.insert_message(
                mailbox.id,
                message.flags,
                message_id,
                message.internal_date,
                Arc::from(message.content),
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
        self.store.write("copy", &target.path, |state| {
            let source = state.message(original.mailbox_id, original.uid)?;
            let flags = source.flags.clone().with(Flag::Recent);
            let message_id = source.message_id;
            let internal_date = source.internal_date;
            let content = Arc::clone(&source.content);
            state.insert_message(
                target.id,
                flags,
                message_id,
                internal_date,
                content,
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
        self.store.read(|state| state.mailbox(mailbox.id).map(|_| ()))?;
        Ok(MessageIter::new(
            self,
            mailbox.id,
            range,
            group,
            self.store.config().batch_size(),
            limit,
        ))
    }

    fn find_recent_uids(&self, mailbox: &Mailbox) -> Result<Vec<Uid>, Error> {
        self.store.read(|state| {
            Ok(state
                .mailbox(mailbox.id)?
                .messages
                .iter()
                .filter(|(_, message)| message.flags.is_recent())
                .map(|(&uid, _)| uid)
                .collect())
        })
    }

    fn find_first_unseen_uid(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Option<Uid>, Error> {
        self.store.read(|state| {
            Ok(state
                .mailbox(mailbox.id)?
                .messages
                .iter()
                .find(|(_, message)| !message.flags.is_seen())
                .map(|(&uid, _)| uid))
        })
    }

    fn update_flags(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
        update: &FlagsUpdate,
    ) -> Result<Vec<UpdatedFlags>, Error> {
        update.flags.validate()?;
        self.store.write("update_flags", &mailbox.path, |state| {
            state.update_flags(mailbox.id, range, update)
        })
    }

    fn expunge(
        &self,
        mailbox: &Mailbox,
        uids: &UidSet,
    ) -> Result<Vec<MessageMetadata>, Error> {
        self.store.write("expunge", &mailbox.path, |state| {
            state.expunge(mailbox.id, |uid, _| uids.contains(uid))
        })
    }

    fn expunge_marked_for_deletion(
        &self,
        mailbox: &Mailbox,
        range: MessageRange,
    ) -> Result<Vec<MessageMetadata>, Error> {
        self.store.write("expunge", &mailbox.path, |state| {
            state.expunge(mailbox.id, |uid, message| {
                range.contains(uid) && message.flags.is_deleted()
            })
        })
    }

    fn delete(&self, mailbox: &Mailbox, message: &Message) -> Result<(), Error> {
        let expunged =
            self.store.write("delete_message", &mailbox.path, |state| {
                state.expunge(mailbox.id, |uid, _| uid == message.uid)
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
        self.store
            .read(|state| Ok(state.mailbox(mailbox.id)?.messages.len() as u64))
    }

    fn count_unseen(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.store.read(|state| {
            Ok(state
                .mailbox(mailbox.id)?
                .messages
                .values()
                .filter(|message| !message.flags.is_seen())
                .count() as u64)
        })
    }

    fn count_recent(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.store.read(|state| {
            Ok(state
                .mailbox(mailbox.id)?
                .messages
                .values()
                .filter(|message| message.flags.is_recent())
                .count() as u64)
        })
    }

    fn last_uid(&self, mailbox: &Mailbox) -> Result<Option<Uid>, Error> {
        UidProvider::last_uid(self, mailbox)
    }

    fn highest_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error> {
        ModseqProvider::highest_modseq(self, mailbox)
    }
}
