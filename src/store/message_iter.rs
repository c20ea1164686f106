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

use std::collections::VecDeque;
use std::ops::Bound::{self, Excluded};

use crate::model::*;
use crate::support::error::Error;

/// Something that can produce one page of a mailbox's messages.
pub trait MessageSource {
    /// Fetches up to `limit` messages of `mailbox` whose UIDs lie within
    /// `start..end`, in ascending UID order.
    fn fetch_batch(
        &self,
        mailbox: MailboxId,
        start: Bound<Uid>,
        end: Bound<Uid>,
        group: FetchGroup,
        limit: usize,
    ) -> Result<Vec<Message>, Error>;
}

/// A lazy, finite, UID-ordered walk over a range of messages.
///
/// Messages are pulled from the backend one batch at a time. Each batch
/// starts strictly after the last UID already produced, so the walk never
/// repeats or reorders messages even if the mailbox changes underneath it.
///
/// After the first error, the iterator is exhausted.
pub struct MessageIter<'a> {
    source: &'a dyn MessageSource,
    mailbox: MailboxId,
    start: Bound<Uid>,
    end: Bound<Uid>,
    group: FetchGroup,
    batch_size: usize,
    remaining: Option<usize>,
    buffer: VecDeque<Message>,
    exhausted: bool,
}

impl<'a> MessageIter<'a> {
    pub fn new(
        source: &'a dyn MessageSource,
        mailbox: MailboxId,
        range: MessageRange,
        group: FetchGroup,
        batch_size: usize,
        limit: Option<usize>,
    ) -> Self {
        let (start, end) = range.bounds();
        Self {
            source,
            mailbox,
            start,
            end,
            group,
            batch_size: batch_size.max(1),
            remaining: limit,
            buffer: VecDeque::new(),
            exhausted: !MessageRange::is_satisfiable(start, end)
                || Some(0) == limit,
        }
    }

    fn refill(&mut self) -> Result<(), Error> {
        let want = self
            .remaining
            .map_or(self.batch_size, |r| r.min(self.batch_size));
        let batch = self.source.fetch_batch(
            self.mailbox,
            self.start,
            self.end,
            self.group,
            want,
        )?;

        if batch.len() < want {
            self.exhausted = true;
        }

        match batch.last() {
            Some(last) => self.start = Excluded(last.uid),
            None => self.exhausted = true,
        }

        self.buffer.extend(batch);
        Ok(())
    }
}

impl Iterator for MessageIter<'_> {
    type Item = Result<Message, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.refill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }

        let message = self.buffer.pop_front()?;
        if let Some(ref mut remaining) = self.remaining {
            *remaining -= 1;
            if 0 == *remaining {
                self.exhausted = true;
                self.buffer.clear();
            }
        }

        Some(Ok(message))
    }
}
