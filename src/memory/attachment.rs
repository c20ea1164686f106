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
use crate::store::AttachmentMapper;
use crate::support::error::Error;

impl AttachmentMapper for MemoryMapper {
    fn store(&self, attachment: &Attachment) -> Result<(), Error> {
        self.store.write_global("store_attachment", |state| {
            state
                .attachments
                .insert(attachment.id.clone(), attachment.clone());
            Ok(())
        })
    }

    fn get(&self, id: &AttachmentId) -> Result<Attachment, Error> {
        self.store.read(|state| {
            state
                .attachments
                .get(id)
                .cloned()
                .ok_or_else(|| Error::NxAttachment(id.0.clone()))
        })
    }

    fn get_many(&self, ids: &[AttachmentId]) -> Result<Vec<Attachment>, Error> {
        self.store.read(|state| {
            Ok(ids
                .iter()
                .filter_map(|id| state.attachments.get(id).cloned())
                .collect())
        })
    }
}
