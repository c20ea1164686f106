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

//! Bindings for the model types to `rusqlite`.

use std::ops::Bound::{self, Excluded, Included, Unbounded};

use chrono::prelude::*;
use rusqlite::types::{
    FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef,
};

use crate::model::*;

macro_rules! transparent_to_sql {
    ($t:ident) => {
        impl ToSql for $t {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }
    };
}

macro_rules! transparent_from_sql {
    ($t:ident) => {
        impl FromSql for $t {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                FromSql::column_result(value).map(Self)
            }
        }
    };
}

transparent_to_sql!(MailboxId);
transparent_from_sql!(MailboxId);
transparent_to_sql!(MessageId);
transparent_from_sql!(MessageId);

/// A `DateTime<Utc>` stored as milliseconds since the epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnixMillis(pub DateTime<Utc>);

impl ToSql for UnixMillis {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.timestamp_millis()))
    }
}

impl FromSql for UnixMillis {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let inner = i64::column_result(value)?;
        Utc.timestamp_millis_opt(inner)
            .single()
            .ok_or(FromSqlError::OutOfRange(inner))
            .map(Self)
    }
}

impl ToSql for Uid {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(u32::from(*self)))
    }
}

impl FromSql for Uid {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let inner = u32::column_result(value)?;
        Self::of(inner).ok_or(FromSqlError::OutOfRange(inner.into()))
    }
}

impl ToSql for Modseq {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        // Modseq::MAX is i64::MAX, so this never wraps.
        Ok(ToSqlOutput::from(self.raw() as i64))
    }
}

impl FromSql for Modseq {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let inner = i64::column_result(value)?;
        u64::try_from(inner)
            .ok()
            .and_then(Self::of)
            .ok_or(FromSqlError::OutOfRange(inner))
    }
}

impl ToSql for UidValidity {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.get()))
    }
}

impl FromSql for UidValidity {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let inner = u32::column_result(value)?;
        Self::of(inner).ok_or(FromSqlError::OutOfRange(inner.into()))
    }
}

impl ToSql for AnnotationKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.as_str().as_bytes())))
    }
}

impl FromSql for AnnotationKey {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let as_str = value.as_str()?;
        Self::new(as_str).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl FromRow for Mailbox {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let user = row.get::<_, String>("user")?;
        Ok(Self {
            id: row.get("id")?,
            path: MailboxPath {
                namespace: row.get("namespace")?,
                user: Some(user).filter(|u| !u.is_empty()),
                name: row.get("name")?,
            },
            uid_validity: row.get("uid_validity")?,
            last_uid: row.get("last_uid")?,
            highest_modseq: row.get("highest_modseq")?,
        })
    }
}

impl FromRow for Message {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            mailbox_id: row.get("mailbox_id")?,
            uid: row.get("uid")?,
            message_id: row.get("message_id")?,
            modseq: row.get("modseq")?,
            flags: Flags::from_parts(
                row.get("system_flags")?,
                &row.get::<_, String>("keywords")?,
            ),
            internal_date: row.get::<_, UnixMillis>("internal_date")?.0,
            size: row.get("size")?,
            content: row.get("content")?,
        })
    }
}

impl FromRow for Annotation {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get("key")?,
            value: row.get("value")?,
        })
    }
}

/// The columns for loading a `Message` under `group`.
///
/// `Metadata` leaves the content out but still yields a `content` column so
/// that `Message::from_row` works for both.
pub fn message_columns(group: FetchGroup) -> &'static str {
    match group {
        FetchGroup::Metadata => {
            "`mailbox_id`, `uid`, `message_id`, `modseq`, `system_flags`, \
             `keywords`, `internal_date`, `size`, NULL AS `content`"
        },
        FetchGroup::Full => {
            "`mailbox_id`, `uid`, `message_id`, `modseq`, `system_flags`, \
             `keywords`, `internal_date`, `size`, `content`"
        },
    }
}

/// Converts a pair of UID bounds into an inclusive range suitable for
/// `BETWEEN`. The result is empty (`lo > hi`) if the bounds select nothing.
pub fn uid_between(start: Bound<Uid>, end: Bound<Uid>) -> (i64, i64) {
    let lo = match start {
        Included(uid) => i64::from(u32::from(uid)),
        Excluded(uid) => i64::from(u32::from(uid)) + 1,
        Unbounded => 1,
    };
    let hi = match end {
        Included(uid) => i64::from(u32::from(uid)),
        Excluded(uid) => i64::from(u32::from(uid)) - 1,
        Unbounded => i64::from(u32::MAX),
    };
    (lo, hi)
}

pub fn from_row<T: FromRow>(row: &rusqlite::Row<'_>) -> rusqlite::Result<T> {
    T::from_row(row)
}

pub fn from_single<T: FromSql>(row: &rusqlite::Row<'_>) -> rusqlite::Result<T> {
    row.get(0)
}

pub trait FromRow: Sized {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

macro_rules! from_row_tuple {
    ($($ix:tt: $t:ident),*) => {
        impl<$($t: FromSql,)*> FromRow
        for ($($t,)*) {
            fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
                Ok(($(row.get($ix)?,)*))
            }
        }
    }
}

from_row_tuple!(0: A);
from_row_tuple!(0: A, 1: B);
from_row_tuple!(0: A, 1: B, 2: C);
from_row_tuple!(0: A, 1: B, 2: C, 3: D);
