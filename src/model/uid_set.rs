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

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound::{Excluded, Included, Unbounded};

use super::Uid;

/// A set of UIDs, as used for expunge requests.
///
/// Internally, this is maintained as a minimal sorted set of inclusive ranges.
/// The original fragmentation, ordering and duplication of the input is not
/// retained.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UidSet {
    parts: BTreeMap<u32, u32>,
}

impl UidSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn just(uid: Uid) -> Self {
        let mut this = Self::new();
        this.insert(uid, uid);
        this
    }

    /// Inserts the inclusive range `start..=end`, in either order.
    pub fn insert(&mut self, start: Uid, end: Uid) {
        let (start, end) = (start.min(end), end.max(start));
        self.insert_raw(start.into(), end.into());
    }

    fn insert_raw(&mut self, start_incl: u32, mut end_incl: u32) {
        // Absorb any following ranges this one overlaps or touches.
        while let Some((following_start, following_end)) = self
            .parts
            .range((Excluded(start_incl), Unbounded))
            .next()
            .map(|(&s, &e)| (s, e))
        {
            if following_start - 1 > end_incl {
                break;
            }

            end_incl = end_incl.max(following_end);
            self.parts.remove(&following_start);
        }

        let preceding = self
            .parts
            .range((Unbounded, Included(start_incl)))
            .next_back()
            .map(|(&s, &e)| (s, e));
        if let Some((preceding_start, preceding_end)) = preceding {
            if preceding_end.saturating_add(1) >= start_incl {
                self.parts
                    .insert(preceding_start, end_incl.max(preceding_end));
                return;
            }
        }

        self.parts.insert(start_incl, end_incl);
    }

    pub fn contains(&self, uid: Uid) -> bool {
        let v: u32 = uid.into();
        self.parts
            .range(..=v)
            .next_back()
            .map_or(false, |(_, &end)| end >= v)
    }

    /// The inclusive ranges making up this set, in ascending order.
    pub fn ranges(&self) -> impl Iterator<Item = (Uid, Uid)> + '_ {
        self.parts
            .iter()
            .filter_map(|(&s, &e)| Some((Uid::of(s)?, Uid::of(e)?)))
    }
}

impl fmt::Debug for UidSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries(self.parts.iter().map(|(s, e)| s..=e))
            .finish()
    }
}

impl std::iter::FromIterator<Uid> for UidSet {
    fn from_iter<I: IntoIterator<Item = Uid>>(it: I) -> Self {
        let mut this = Self::new();
        for uid in it {
            this.insert(uid, uid);
        }
        this
    }
}
