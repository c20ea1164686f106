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

use std::collections::{BTreeMap, BTreeSet};

use super::MemoryMapper;
use crate::model::*;
use crate::store::*;
use crate::support::error::Error;

/// The instances of one message within one mailbox.
struct Instances {
    path: MailboxPath,
    uids: BTreeSet<Uid>,
}

impl MemoryMapper {
    /// The instances of `id` within `mailboxes`, or within every mailbox if
    /// `mailboxes` is empty, grouped by mailbox.
    ///
    /// Fails with `NxMessage` if there are none.
    fn instances_in(
        &self,
        id: MessageId,
        mailboxes: &[MailboxId],
    ) -> Result<BTreeMap<MailboxId, Instances>, Error> {
        let all = self.store.read(|state| Ok(state.instances(id)))?;
        let mut grouped = BTreeMap::<MailboxId, Instances>::new();
        for (mailbox, path, uid) in all {
            if !mailboxes.is_empty() && !mailboxes.contains(&mailbox) {
                continue;
            }

            grouped
                .entry(mailbox)
                .or_insert_with(|| Instances {
                    path,
                    uids: BTreeSet::new(),
                })
                .uids
                .insert(uid);
        }

        if grouped.is_empty() {
            Err(Error::NxMessage(id.to_string()))
        } else {
            Ok(grouped)
        }
    }
}

impl MessageIdMapper for MemoryMapper {
    fn find(
        &self,
        ids: &[MessageId],
        group: FetchGroup,
    ) -> Result<Vec<Message>, Error> {
        let wanted = ids.iter().copied().collect::<BTreeSet<_>>();
        let wanted = &wanted;
        let found = self.store.read(|state| {
            Ok(state
                .mailboxes
                .iter()
                .flat_map(|(&mailbox_id, record)| {
                    record
                        .messages
                        .iter()
                        .filter(move |(_, message)| {
                            wanted.contains(&message.message_id)
                        })
                        .map(move |(&uid, message)| {
                            message.to_message(mailbox_id, uid, group)
                        })
                })
                .collect::<Vec<_>>())
        })?;

        if found.is_empty() && !ids.is_empty() {
            return Err(Error::NxMessage(
                ids.iter()
                    .map(MessageId::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ));
        }

        Ok(found)
    }

    fn find_mailboxes(&self, id: MessageId) -> Result<Vec<MailboxId>, Error> {
        Ok(self.instances_in(id, &[])?.into_keys().collect())
    }

    fn set_flags(
        &self,
        id: MessageId,
        mailboxes: &[MailboxId],
        update: &FlagsUpdate,
    ) -> Result<BTreeMap<MailboxId, Vec<UpdatedFlags>>, Error> {
        update.flags.validate()?;
        in_unit_of_work(self, "set_flags", || {
            let mut result = BTreeMap::new();
            for (mailbox, instances) in self.instances_in(id, mailboxes)? {
                let updated =
                    self.store.write("set_flags", &instances.path, |state| {
                        state.update_flags_where(
                            mailbox,
                            MessageRange::All,
                            update,
                            |uid| instances.uids.contains(&uid),
                        )
                    })?;
                if !updated.is_empty() {
                    result.insert(mailbox, updated);
                }
            }
            Ok(result)
        })
    }

    fn delete(&self, id: MessageId) -> Result<(), Error> {
        self.delete_in(id, &[])
    }

    fn delete_in(
        &self,
        id: MessageId,
        mailboxes: &[MailboxId],
    ) -> Result<(), Error> {
        in_unit_of_work(self, "delete_message_id", || {
            for (mailbox, instances) in self.instances_in(id, mailboxes)? {
                self.store.write(
                    "delete_message_id",
                    &instances.path,
                    |state| {
                        state.expunge(mailbox, |uid, _| {
                            instances.uids.contains(&uid)
                        })
                    },
                )?;
            }
            Ok(())
        })
    }
}
