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
use rusqlite::OptionalExtension as _;

use super::{next_uid_validity, types::*, SqliteMapper};
use crate::model::*;
use crate::store::MailboxMapper;
use crate::support::error::Error;

fn user_column(path: &MailboxPath) -> &str {
    path.user.as_deref().unwrap_or("")
}

fn load_mailbox(
    cxn: &rusqlite::Connection,
    id: MailboxId,
) -> Result<Mailbox, Error> {
    cxn.prepare_cached("SELECT * FROM `mailbox` WHERE `id` = ?")?
        .query_row((id,), from_row)
        .optional()?
        .ok_or_else(|| Error::NxMailbox(id.to_string()))
}

fn id_at_path(
    cxn: &rusqlite::Connection,
    path: &MailboxPath,
) -> Result<Option<MailboxId>, Error> {
    cxn.prepare_cached(
        "SELECT `id` FROM `mailbox` \
         WHERE `namespace` = ? AND `user` = ? AND `name` = ?",
    )?
    .query_row(
        (&path.namespace, user_column(path), &path.name),
        from_single,
    )
    .optional()
    .map_err(Into::into)
}

/// Every mailbox sharing the namespace and user of `path`.
fn siblings_of(
    cxn: &rusqlite::Connection,
    path: &MailboxPath,
) -> Result<Vec<Mailbox>, Error> {
    cxn.prepare_cached(
        "SELECT * FROM `mailbox` WHERE `namespace` = ? AND `user` = ? \
         ORDER BY `id`",
    )?
    .query_map((&path.namespace, user_column(path)), from_row)?
    .collect::<Result<Vec<Mailbox>, _>>()
    .map_err(Into::into)
}

/// Gives the messages of `mailbox` the UIDs 1, 2, 3... in their current
/// order and returns the new last UID.
fn renumber(
    cxn: &rusqlite::Connection,
    mailbox: MailboxId,
) -> Result<Option<Uid>, Error> {
    let uids = cxn
        .prepare_cached(
            "SELECT `uid` FROM `message` WHERE `mailbox_id` = ? \
             ORDER BY `uid`",
        )?
        .query_map((mailbox,), from_single::<Uid>)?
        .collect::<Result<Vec<_>, _>>()?;

    // New UIDs never exceed old ones, so renumbering in ascending order never
    // collides with a row not yet visited.
    let mut stmt = cxn.prepare_cached(
        "UPDATE `message` SET `uid` = ? WHERE `mailbox_id` = ? AND `uid` = ?",
    )?;
    let mut last = None;
    for (old, new) in uids.into_iter().zip((1..=u32::MAX).filter_map(Uid::of))
    {
        if old != new {
            stmt.execute((new, mailbox, old))?;
        }
        last = Some(new);
    }

    Ok(last)
}

impl MailboxMapper for SqliteMapper {
    fn create(&self, path: &MailboxPath) -> Result<Mailbox, Error> {
        let mailbox = self.write("create_mailbox", path, |cxn| {
            if id_at_path(cxn, path)?.is_some() {
                return Err(Error::MailboxExists(path.to_string()));
            }

            let uid_validity = next_uid_validity(cxn)?;
            cxn.prepare_cached(
                "INSERT INTO `mailbox` \
                 (`namespace`, `user`, `name`, `uid_validity`) \
                 VALUES (?, ?, ?, ?)",
            )?
            .execute((
                &path.namespace,
                user_column(path),
                &path.name,
                uid_validity,
            ))?;
            load_mailbox(cxn, MailboxId(cxn.last_insert_rowid()))
        })?;
        info!("Created mailbox {} as {}", path, mailbox.id);
        Ok(mailbox)
    }

    fn find_by_path(&self, path: &MailboxPath) -> Result<Mailbox, Error> {
        let id = id_at_path(&self.cxn, path)?
            .ok_or_else(|| Error::NxMailbox(path.to_string()))?;
        load_mailbox(&self.cxn, id)
    }

    fn find_by_id(&self, id: MailboxId) -> Result<Mailbox, Error> {
        load_mailbox(&self.cxn, id)
    }

    fn find_with_path_like(
        &self,
        query: &MailboxQuery,
    ) -> Result<Vec<Mailbox>, Error> {
        let mut candidates = self
            .cxn
            .prepare_cached(
                "SELECT * FROM `mailbox` \
                 WHERE `namespace` = ? AND `user` = ? ORDER BY `id`",
            )?
            .query_map(
                (&query.namespace, query.user.as_deref().unwrap_or("")),
                from_row::<Mailbox>,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        candidates.retain(|mailbox| query.matches(&mailbox.path));
        Ok(candidates)
    }

    fn has_children(
        &self,
        mailbox: &Mailbox,
        delimiter: char,
    ) -> Result<bool, Error> {
        let parent = load_mailbox(&self.cxn, mailbox.id)?.path;
        Ok(siblings_of(&self.cxn, &parent)?
            .iter()
            .any(|other| other.path.is_descendant_of(&parent, delimiter)))
    }

    fn list(&self) -> Result<Vec<Mailbox>, Error> {
        self.cxn
            .prepare_cached("SELECT * FROM `mailbox` ORDER BY `id`")?
            .query_map((), from_row)?
            .collect::<Result<Vec<Mailbox>, _>>()
            .map_err(Into::into)
    }

    fn rename(
        &self,
        mailbox: &Mailbox,
        new_path: &MailboxPath,
        mode: RenameMode,
    ) -> Result<Mailbox, Error> {
        let renamed = self.write("rename_mailbox", &mailbox.path, |cxn| {
            load_mailbox(cxn, mailbox.id)?;
            if id_at_path(cxn, new_path)?.map_or(false, |id| id != mailbox.id)
            {
                return Err(Error::MailboxExists(new_path.to_string()));
            }

            cxn.prepare_cached(
                "UPDATE `mailbox` SET `namespace` = ?, `user` = ?, `name` = ? \
                 WHERE `id` = ?",
            )?
            .execute((
                &new_path.namespace,
                user_column(new_path),
                &new_path.name,
                mailbox.id,
            ))?;

            if RenameMode::ResetUidValidity == mode {
                let uid_validity = next_uid_validity(cxn)?;
                let last_uid = renumber(cxn, mailbox.id)?;
                cxn.prepare_cached(
                    "UPDATE `mailbox` SET `uid_validity` = ?, `last_uid` = ? \
                     WHERE `id` = ?",
                )?
                .execute((uid_validity, last_uid, mailbox.id))?;
            }

            load_mailbox(cxn, mailbox.id)
        })?;
        info!("Renamed {} from {} to {}", mailbox.id, mailbox.path, new_path);
        Ok(renamed)
    }

    fn delete(&self, mailbox: &Mailbox) -> Result<(), Error> {
        self.write("delete_mailbox", &mailbox.path, |cxn| {
            let deleted = cxn
                .prepare_cached("DELETE FROM `mailbox` WHERE `id` = ?")?
                .execute((mailbox.id,))?;
            if 0 == deleted {
                Err(Error::NxMailbox(mailbox.path.to_string()))
            } else {
                Ok(())
            }
        })?;
        info!("Deleted mailbox {} ({})", mailbox.path, mailbox.id);
        Ok(())
    }
}
