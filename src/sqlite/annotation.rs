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
use crate::store::AnnotationMapper;
use crate::support::error::Error;

impl SqliteMapper {
    /// The annotations of `mailbox` whose key satisfies `pred`, in key order.
    fn annotations_where(
        &self,
        mailbox: &Mailbox,
        pred: impl Fn(&AnnotationKey) -> bool,
    ) -> Result<Vec<Annotation>, Error> {
        self.require_mailbox(mailbox.id)?;
        let mut annotations = self
            .cxn
            .prepare_cached(
                "SELECT `key`, `value` FROM `annotation` \
                 WHERE `mailbox_id` = ? ORDER BY `key`",
            )?
            .query_map((mailbox.id,), from_row::<Annotation>)?
            .collect::<Result<Vec<_>, _>>()?;
        annotations.retain(|annotation| pred(&annotation.key));
        Ok(annotations)
    }
}

impl AnnotationMapper for SqliteMapper {
    fn get_all(&self, mailbox: &Mailbox) -> Result<Vec<Annotation>, Error> {
        self.annotations_where(mailbox, |_| true)
    }

    fn get_by_keys(
        &self,
        mailbox: &Mailbox,
        keys: &[AnnotationKey],
    ) -> Result<Vec<Annotation>, Error> {
        self.annotations_where(mailbox, |key| keys.contains(key))
    }

    fn get_by_keys_with_one_depth(
        &self,
        mailbox: &Mailbox,
        keys: &[AnnotationKey],
    ) -> Result<Vec<Annotation>, Error> {
        self.annotations_where(mailbox, |key| {
            keys.iter().any(|parent| key.is_within_one_level(parent))
        })
    }

    fn get_by_keys_with_all_depth(
        &self,
        mailbox: &Mailbox,
        keys: &[AnnotationKey],
    ) -> Result<Vec<Annotation>, Error> {
        self.annotations_where(mailbox, |key| {
            keys.iter().any(|ancestor| key.is_within(ancestor))
        })
    }

    fn upsert(
        &self,
        mailbox: &Mailbox,
        annotation: &Annotation,
    ) -> Result<(), Error> {
        self.write("upsert_annotation", &mailbox.path, |cxn| {
            self.require_mailbox(mailbox.id)?;
            cxn.prepare_cached(
                "INSERT INTO `annotation` (`mailbox_id`, `key`, `value`) \
                 VALUES (?, ?, ?) \
                 ON CONFLICT (`mailbox_id`, `key`) \
                 DO UPDATE SET `value` = `excluded`.`value`",
            )?
            .execute((mailbox.id, &annotation.key, &annotation.value))?;
            Ok(())
        })
    }

    fn delete(
        &self,
        mailbox: &Mailbox,
        key: &AnnotationKey,
    ) -> Result<(), Error> {
        self.write("delete_annotation", &mailbox.path, |cxn| {
            self.require_mailbox(mailbox.id)?;
            cxn.prepare_cached(
                "DELETE FROM `annotation` WHERE `mailbox_id` = ? AND `key` = ?",
            )?
            .execute((mailbox.id, key))?;
            Ok(())
        })
    }

    fn exists(
        &self,
        mailbox: &Mailbox,
        key: &AnnotationKey,
    ) -> Result<bool, Error> {
        self.require_mailbox(mailbox.id)?;
        Ok(self
            .cxn
            .prepare_cached(
                "SELECT 1 FROM `annotation` \
                 WHERE `mailbox_id` = ? AND `key` = ?",
            )?
            .query_row((mailbox.id, key), |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn count(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.require_mailbox(mailbox.id)?;
        let count = self
            .cxn
            .prepare_cached(
                "SELECT COUNT(*) FROM `annotation` WHERE `mailbox_id` = ?",
            )?
            .query_row((mailbox.id,), from_single::<i64>)?;
        Ok(count as u64)
    }
}
