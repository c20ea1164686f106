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

use std::collections::BTreeSet;
use std::fmt;

use bitflags::bitflags;

use crate::support::error::Error;

bitflags! {
    /// The IMAP system flags, as stored.
    ///
    /// The bit values are part of the SQLite schema and must not change.
    #[derive(Default)]
    pub struct SystemFlags: u32 {
        const ANSWERED = 1 << 0;
        const DELETED = 1 << 1;
        const DRAFT = 1 << 2;
        const FLAGGED = 1 << 3;
        const RECENT = 1 << 4;
        const SEEN = 1 << 5;
    }
}

/// A single message flag.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Recent,
    Seen,
    Keyword(String),
}

impl Flag {
    fn system(&self) -> Option<SystemFlags> {
        match *self {
            Flag::Answered => Some(SystemFlags::ANSWERED),
            Flag::Deleted => Some(SystemFlags::DELETED),
            Flag::Draft => Some(SystemFlags::DRAFT),
            Flag::Flagged => Some(SystemFlags::FLAGGED),
            Flag::Recent => Some(SystemFlags::RECENT),
            Flag::Seen => Some(SystemFlags::SEEN),
            Flag::Keyword(_) => None,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Recent => write!(f, "\\Recent"),
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Keyword(ref kw) => write!(f, "{}", kw),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

/// Whether `s` may be used as a keyword.
fn is_atom(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b > b' '
                && b < 0x7F
                && !matches!(b, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b']')
        })
}

/// The full flag state of a message.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Flags {
    pub system: SystemFlags,
    pub keywords: BTreeSet<String>,
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, flag: &Flag) -> bool {
        match (flag.system(), flag) {
            (Some(sys), _) => self.system.contains(sys),
            (None, Flag::Keyword(kw)) => self.keywords.contains(kw),
            (None, _) => false,
        }
    }

    pub fn insert(&mut self, flag: Flag) {
        match (flag.system(), flag) {
            (Some(sys), _) => self.system.insert(sys),
            (None, Flag::Keyword(kw)) => {
                self.keywords.insert(kw);
            },
            (None, _) => (),
        }
    }

    pub fn remove(&mut self, flag: &Flag) {
        match (flag.system(), flag) {
            (Some(sys), _) => self.system.remove(sys),
            (None, Flag::Keyword(kw)) => {
                self.keywords.remove(kw);
            },
            (None, _) => (),
        }
    }

    pub fn with(mut self, flag: Flag) -> Self {
        self.insert(flag);
        self
    }

    pub fn is_seen(&self) -> bool {
        self.system.contains(SystemFlags::SEEN)
    }

    pub fn is_recent(&self) -> bool {
        self.system.contains(SystemFlags::RECENT)
    }

    pub fn is_deleted(&self) -> bool {
        self.system.contains(SystemFlags::DELETED)
    }

    /// Fails with `BadFlag` if any keyword is not a valid IMAP atom.
    ///
    /// Keywords are stored space-separated, so one containing whitespace
    /// would not survive a round trip.
    pub fn validate(&self) -> Result<(), Error> {
        match self.keywords.iter().find(|kw| !is_atom(kw.as_str())) {
            Some(kw) => Err(Error::BadFlag(kw.clone())),
            None => Ok(()),
        }
    }

    /// Iterates every flag that is set, system flags first.
    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        [
            Flag::Answered,
            Flag::Deleted,
            Flag::Draft,
            Flag::Flagged,
            Flag::Recent,
            Flag::Seen,
        ]
        .into_iter()
        .filter(move |f| self.contains(f))
        .chain(self.keywords.iter().cloned().map(Flag::Keyword))
    }

    /// Space-separated keyword list, as stored by the SQLite backend.
    pub(crate) fn keywords_to_string(&self) -> String {
        self.keywords
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn from_parts(system: u32, keywords: &str) -> Self {
        Self {
            system: SystemFlags::from_bits_truncate(system),
            keywords: keywords
                .split(' ')
                .filter(|kw| !kw.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl std::iter::FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(it: I) -> Self {
        let mut flags = Flags::new();
        for flag in it {
            flags.insert(flag);
        }
        flags
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagsUpdateMode {
    Add,
    Remove,
    Replace,
}

/// A request to change the flags of one or more messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagsUpdate {
    pub mode: FlagsUpdateMode,
    pub flags: Flags,
}

impl FlagsUpdate {
    pub fn add(flags: Flags) -> Self {
        Self {
            mode: FlagsUpdateMode::Add,
            flags,
        }
    }

    pub fn remove(flags: Flags) -> Self {
        Self {
            mode: FlagsUpdateMode::Remove,
            flags,
        }
    }

    pub fn replace(flags: Flags) -> Self {
        Self {
            mode: FlagsUpdateMode::Replace,
            flags,
        }
    }

    /// Computes the new flag state of a message currently flagged `old`.
    pub fn apply(&self, old: &Flags) -> Flags {
        match self.mode {
            FlagsUpdateMode::Replace => self.flags.clone(),
            FlagsUpdateMode::Add => Flags {
                system: old.system | self.flags.system,
                keywords: old
                    .keywords
                    .union(&self.flags.keywords)
                    .cloned()
                    .collect(),
            },
            FlagsUpdateMode::Remove => Flags {
                system: old.system - self.flags.system,
                keywords: old
                    .keywords
                    .difference(&self.flags.keywords)
                    .cloned()
                    .collect(),
            },
        }
    }
}
