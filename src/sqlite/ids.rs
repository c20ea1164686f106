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

use rusqlite::OptionalExtension as _;

use super::{types::*, SqliteMapper};
use crate::model::*;
use crate::store::{ModseqProvider, UidProvider};
use crate::support::error::Error;

/// Reads `(last_uid, highest_modseq)` of `mailbox`.
pub(super) fn counters(
    cxn: &rusqlite::Connection,
    mailbox: MailboxId,
) -> Result<(Option<Uid>, Modseq), Error> {
    cxn.prepare_cached(
        "SELECT `last_uid`, `highest_modseq` FROM `mailbox` WHERE `id` = ?",
    )?
    .query_row((mailbox,), from_row)
    .optional()?
    .ok_or_else(|| Error::NxMailbox(mailbox.to_string()))
}

/// Allocates the next UID of `mailbox`. The caller must be inside a unit of
/// work and hold the path lock.
pub(super) fn allocate_uid(
    cxn: &rusqlite::Connection,
    mailbox: MailboxId,
) -> Result<Uid, Error> {
    let uid = match counters(cxn, mailbox)?.0 {
        None => Uid::MIN,
        Some(last) => last.next().ok_or(Error::MailboxFull)?,
    };
    cxn.prepare_cached("UPDATE `mailbox` SET `last_uid` = ? WHERE `id` = ?")?
        .execute((uid, mailbox))?;
    Ok(uid)
}

/// Allocates the next MODSEQ of `mailbox`. The caller must be inside a unit
/// of work and hold the path lock.
pub(super) fn allocate_modseq(
    cxn: &rusqlite::Connection,
    mailbox: MailboxId,
) -> Result<Modseq, Error> {
    let modseq = counters(cxn, mailbox)?
        .1
        .next()
        .ok_or(Error::MailboxFull)?;
    cxn.prepare_cached(
        "UPDATE `mailbox` SET `highest_modseq` = ? WHERE `id` = ?",
    )?
    .execute((modseq, mailbox))?;
    Ok(modseq)
}

impl UidProvider for SqliteMapper {
    fn next_uid(&self, mailbox: &Mailbox) -> Result<Uid, Error> {
        self.write("next_uid", &mailbox.path, |cxn| {
            allocate_uid(cxn, mailbox.id)
        })
    }

    fn last_uid(&self, mailbox: &Mailbox) -> Result<Option<Uid>, Error> {
        counters(&self.cxn, mailbox.id).map(|c| c.0)
    }
}

impl ModseqProvider for SqliteMapper {
    fn next_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error> {
        self.write("next_modseq", &mailbox.path, |cxn| {
            allocate_modseq(cxn, mailbox.id)
        })
    }

    fn highest_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error> {
        counters(&self.cxn, mailbox.id).map(|c| c.1)
    }
}
