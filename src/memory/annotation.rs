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

use super::MemoryMapper;
use crate::model::*;
use crate::store::AnnotationMapper;
use crate::support::error::Error;

impl MemoryMapper {
    fn annotations_where(
        &self,
        mailbox: &Mailbox,
        pred: impl Fn(&AnnotationKey) -> bool,
    ) -> Result<Vec<Annotation>, Error> {
        self.store.read(|state| {
            Ok(state
                .mailbox(mailbox.id)?
                .annotations
                .iter()
                .filter(|(key, _)| pred(key))
                .map(|(key, value)| Annotation::new(key.clone(), value))
                .collect())
        })
    }
}

impl AnnotationMapper for MemoryMapper {
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
        self.store
            .write("upsert_annotation", &mailbox.path, |state| {
                state
                    .mailbox_mut(mailbox.id)?
                    .annotations
                    .insert(annotation.key.clone(), annotation.value.clone());
                Ok(())
            })
    }

    fn delete(
        &self,
        mailbox: &Mailbox,
        key: &AnnotationKey,
    ) -> Result<(), Error> {
        self.store
            .write("delete_annotation", &mailbox.path, |state| {
                state.mailbox_mut(mailbox.id)?.annotations.remove(key);
                Ok(())
            })
    }

    fn exists(
        &self,
        mailbox: &Mailbox,
        key: &AnnotationKey,
    ) -> Result<bool, Error> {
        self.store.read(|state| {
            Ok(state.mailbox(mailbox.id)?.annotations.contains_key(key))
        })
    }

    fn count(&self, mailbox: &Mailbox) -> Result<u64, Error> {
        self.store.read(|state| {
            Ok(state.mailbox(mailbox.id)?.annotations.len() as u64)
        })
    }
}
