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

//! Domain types shared by every mapper and backend.

use std::convert::TryFrom;
use std::fmt;
use std::num::{NonZeroU32, NonZeroU64};
use std::ops::Bound::{self, Excluded, Included, Unbounded};

use chrono::prelude::*;

mod annotation;
mod flags;
mod mailbox_path;
mod uid_set;

pub use self::annotation::*;
pub use self::flags::*;
pub use self::mailbox_path::*;
pub use self::uid_set::UidSet;

/// Store-assigned identity of a mailbox.
///
/// The identity survives renames. It is never reused by the store that
/// issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MailboxId(pub i64);

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "mailbox#{}", self.0)
    }
}

/// Store-wide identity of a logical message.
///
/// Copies of a message in several mailboxes share the same `MessageId`, each
/// under its own mailbox-scoped `Uid`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "message#{}", self.0)
    }
}

/// Uniquely identifies a message within a single mailbox.
///
/// UIDs start at 1 and increase monotonically as messages are added to the
/// mailbox. UIDs are never reused, not even after the message carrying one
/// has been expunged.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl Uid {
    pub const MIN: Self = match NonZeroU32::new(1) {
        Some(v) => Uid(v),
        None => unreachable!(),
    };
    pub const MAX: Self = match NonZeroU32::new(u32::MAX) {
        Some(v) => Uid(v),
        None => unreachable!(),
    };

    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid)
    }

    pub fn next(self) -> Option<Self> {
        self.0.get().checked_add(1).and_then(Uid::of)
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}

impl TryFrom<u32> for Uid {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl From<Uid> for u32 {
    fn from(uid: Uid) -> u32 {
        uid.0.get()
    }
}

/// A CONDSTORE "modifier sequence" number.
///
/// Each mailbox has its own sequence. A freshly created mailbox sits at
/// `Modseq::MIN`; the first change-tracked mutation is stamped with the next
/// value. The upper bound is `i64::MAX` so that every value fits in an SQL
/// integer column.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Modseq(NonZeroU64);

impl Modseq {
    pub const MIN: Self = match NonZeroU64::new(1) {
        Some(v) => Modseq(v),
        None => unreachable!(),
    };
    pub const MAX: Self = match NonZeroU64::new(i64::MAX as u64) {
        Some(v) => Modseq(v),
        None => unreachable!(),
    };

    pub fn of(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw)
            .map(Modseq)
            .filter(|&m| m <= Modseq::MAX)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }

    pub fn next(self) -> Option<Self> {
        Modseq::of(self.raw() + 1)
    }

    #[cfg(test)]
    pub fn u(raw: u64) -> Self {
        Modseq::of(raw).unwrap()
    }
}

impl fmt::Debug for Modseq {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Modseq({})", self.0.get())
    }
}

/// The UIDVALIDITY of a mailbox.
///
/// A new value is drawn from a durable store-wide counter whenever UID
/// numbering of a mailbox (re)starts, so the pair `(UidValidity, Uid)` never
/// refers to two different messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UidValidity(pub NonZeroU32);

impl UidValidity {
    pub fn of(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(UidValidity)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// All data pertaining to a particular mailbox.
///
/// `last_uid` and `highest_modseq` are the values known when this struct was
/// loaded; they go stale as soon as anything else touches the mailbox. Use
/// the identifier providers for current values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    pub id: MailboxId,
    pub path: MailboxPath,
    pub uid_validity: UidValidity,
    pub last_uid: Option<Uid>,
    pub highest_modseq: Modseq,
}

/// How `MailboxMapper::rename` treats UIDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenameMode {
    /// Keep UIDVALIDITY and every UID.
    Preserve,
    /// Draw a new UIDVALIDITY and renumber the remaining messages from 1 in
    /// their existing order.
    ResetUidValidity,
}

/// How much of a message to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchGroup {
    /// Everything except the content.
    Metadata,
    /// Everything.
    Full,
}

/// A selection of messages within a mailbox by UID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageRange {
    /// Exactly this UID.
    One(Uid),
    /// This UID and everything after it.
    From(Uid),
    /// Everything strictly after this UID.
    After(Uid),
    /// Both ends inclusive.
    Range(Uid, Uid),
    All,
}

impl MessageRange {
    pub fn bounds(self) -> (Bound<Uid>, Bound<Uid>) {
        match self {
            MessageRange::One(uid) => (Included(uid), Included(uid)),
            MessageRange::From(uid) => (Included(uid), Unbounded),
            MessageRange::After(uid) => (Excluded(uid), Unbounded),
            MessageRange::Range(start, end) => (Included(start), Included(end)),
            MessageRange::All => (Unbounded, Unbounded),
        }
    }

    pub fn contains(self, uid: Uid) -> bool {
        let (start, end) = self.bounds();
        let after_start = match start {
            Included(s) => uid >= s,
            Excluded(s) => uid > s,
            Unbounded => true,
        };
        let before_end = match end {
            Included(e) => uid <= e,
            Excluded(e) => uid < e,
            Unbounded => true,
        };
        after_start && before_end
    }

    /// Whether these bounds can select anything at all.
    ///
    /// `BTreeMap::range` panics on inverted bounds, so backends check this
    /// first.
    pub fn is_satisfiable(start: Bound<Uid>, end: Bound<Uid>) -> bool {
        match (start, end) {
            (Included(s), Included(e)) => s <= e,
            (Included(s), Excluded(e))
            | (Excluded(s), Included(e))
            | (Excluded(s), Excluded(e)) => s < e,
            _ => true,
        }
    }
}

/// A message as stored in a mailbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub mailbox_id: MailboxId,
    pub uid: Uid,
    pub message_id: MessageId,
    /// The mailbox MODSEQ at the time of the last change to this message.
    pub modseq: Modseq,
    pub flags: Flags,
    pub internal_date: DateTime<Utc>,
    pub size: u64,
    /// The raw message. `None` when loaded with `FetchGroup::Metadata`.
    pub content: Option<Vec<u8>>,
}

impl Message {
    pub fn metadata(&self) -> MessageMetadata {
        MessageMetadata {
            uid: self.uid,
            message_id: self.message_id,
            modseq: self.modseq,
            flags: self.flags.clone(),
            size: self.size,
            internal_date: self.internal_date,
        }
    }
}

/// A message that has not yet been given a place in a mailbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    /// If `None`, the store allocates a fresh identity.
    pub message_id: Option<MessageId>,
    pub flags: Flags,
    pub internal_date: DateTime<Utc>,
    pub content: Vec<u8>,
}

impl NewMessage {
    /// Creates a new message with no flags.
    ///
    /// `internal_date` is truncated to millisecond precision, which is the
    /// most any backend is required to retain.
    pub fn new(content: Vec<u8>, internal_date: DateTime<Utc>) -> Self {
        let internal_date = Utc
            .timestamp_millis_opt(internal_date.timestamp_millis())
            .single()
            .unwrap_or(internal_date);
        Self {
            message_id: None,
            flags: Flags::default(),
            internal_date,
            content,
        }
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// What a mutation reports about one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageMetadata {
    pub uid: Uid,
    pub message_id: MessageId,
    pub modseq: Modseq,
    pub flags: Flags,
    pub size: u64,
    pub internal_date: DateTime<Utc>,
}

/// The result of changing the flags on one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatedFlags {
    pub uid: Uid,
    pub modseq: Modseq,
    pub old_flags: Flags,
    pub new_flags: Flags,
}

/// A blob stored alongside messages.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttachmentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}
