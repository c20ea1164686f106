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

use std::fmt;

use crate::support::error::Error;

/// The hierarchical name of a mailbox annotation, such as `/private/comment`.
///
/// Keys are case-insensitive and are kept in lower case.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnnotationKey(String);

impl AnnotationKey {
    pub const SLASH: char = '/';
    pub const MAX_COMPONENTS: usize = 16;

    pub fn new(key: &str) -> Result<Self, Error> {
        let bad = || Error::BadAnnotationKey(key.to_owned());

        if !key.starts_with(Self::SLASH)
            || key.ends_with(Self::SLASH)
            || key.contains("//")
            || key.contains(['*', '%'])
            || !key.bytes().all(|b| (b' '..0x7F).contains(&b))
        {
            return Err(bad());
        }

        let this = Self(key.to_ascii_lowercase());
        if this.components() > Self::MAX_COMPONENTS {
            return Err(bad());
        }

        Ok(this)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn components(&self) -> usize {
        self.0.matches(Self::SLASH).count()
    }

    /// Whether `self` is `ancestor` or lies anywhere beneath it.
    pub fn is_within(&self, ancestor: &AnnotationKey) -> bool {
        self == ancestor
            || (self.0.starts_with(&ancestor.0)
                && self.0[ancestor.0.len()..].starts_with(Self::SLASH))
    }

    /// Whether `self` is `parent` or its immediate child.
    pub fn is_within_one_level(&self, parent: &AnnotationKey) -> bool {
        self.is_within(parent) && self.components() <= parent.components() + 1
    }
}

impl fmt::Display for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AnnotationKey({})", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub key: AnnotationKey,
    pub value: String,
}

impl Annotation {
    pub fn new(key: AnnotationKey, value: &str) -> Self {
        Self {
            key,
            value: value.to_owned(),
        }
    }
}
