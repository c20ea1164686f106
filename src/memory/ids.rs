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
use crate::store::{ModseqProvider, UidProvider};
use crate::support::error::Error;

impl UidProvider for MemoryMapper {
    fn next_uid(&self, mailbox: &Mailbox) -> Result<Uid, Error> {
        self.store.write("next_uid", &mailbox.path, |state| {
            state.allocate_uid(mailbox.id)
        })
    }

    fn last_uid(&self, mailbox: &Mailbox) -> Result<Option<Uid>, Error> {
        self.store
            .read(|state| Ok(state.mailbox(mailbox.id)?.last_uid))
    }
}

impl ModseqProvider for MemoryMapper {
    fn next_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error> {
        self.store.write("next_modseq", &mailbox.path, |state| {
            state.allocate_modseq(mailbox.id)
        })
    }

    fn highest_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error> {
        self.store
            .read(|state| Ok(state.mailbox(mailbox.id)?.highest_modseq))
    }
}
