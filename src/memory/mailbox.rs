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

use log::info;

use super::MemoryMapper;
use crate::model::*;
use crate::store::MailboxMapper;
use crate::support::error::Error;

impl MailboxMapper for MemoryMapper {
    fn create(&self, path: &MailboxPath) -> Result<Mailbox, Error> {
        let mailbox = self
            .store
            .write("create_mailbox", path, |state| state.create_mailbox(path))?;
        info!("Created mailbox {} as {}", path, mailbox.id);
        Ok(mailbox)
    }

    fn find_by_path(&self, path: &MailboxPath) -> Result<Mailbox, Error> {
        self.store.read(|state| {
            let id = state
                .find_path(path)
                .ok_or_else(|| Error::NxMailbox(path.to_string()))?;
            Ok(state.mailbox(id)?.to_mailbox(id))
        })
    }

    fn find_by_id(&self, id: MailboxId) -> Result<Mailbox, Error> {
        self.store
            .read(|state| Ok(state.mailbox(id)?.to_mailbox(id)))
    }

    fn find_with_path_like(
        &self,
        query: &MailboxQuery,
    ) -> Result<Vec<Mailbox>, Error> {
        self.store.read(|state| {
            Ok(state
                .mailboxes
                .iter()
                .filter(|(_, record)| query.matches(&record.path))
                .map(|(&id, record)| record.to_mailbox(id))
                .collect())
        })
    }

    fn has_children(
        &self,
        mailbox: &Mailbox,
        delimiter: char,
    ) -> Result<bool, Error> {
        self.store.read(|state| {
            let parent = &state.mailbox(mailbox.id)?.path;
            Ok(state
                .mailboxes
                .values()
                .any(|record| record.path.is_descendant_of(parent, delimiter)))
        })
    }

    fn list(&self) -> Result<Vec<Mailbox>, Error> {
        self.store.read(|state| {
            Ok(state
                .mailboxes
                .iter()
                .map(|(&id, record)| record.to_mailbox(id))
                .collect())
        })
    }

    fn rename(
        &self,
        mailbox: &Mailbox,
        new_path: &MailboxPath,
        mode: RenameMode,
    ) -> Result<Mailbox, Error> {
        let renamed =
            self.store.write("rename_mailbox", &mailbox.path, |state| {
                state.rename_mailbox(mailbox.id, new_path, mode)
            })?;
        info!("Renamed {} from {} to {}", mailbox.id, mailbox.path, new_path);
        Ok(renamed)
    }

    fn delete(&self, mailbox: &Mailbox) -> Result<(), Error> {
        self.store.write("delete_mailbox", &mailbox.path, |state| {
            state
                .mailboxes
                .remove(&mailbox.id)
                .map(|_| ())
                .ok_or_else(|| Error::NxMailbox(mailbox.path.to_string()))
        })?;
        info!("Deleted mailbox {} ({})", mailbox.path, mailbox.id);
        Ok(())
    }
}
