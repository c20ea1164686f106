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

use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Mailbox not found: {0}")]
    NxMailbox(String),
    #[error("Mailbox already exists: {0}")]
    MailboxExists(String),
    #[error("Message not found: {0}")]
    NxMessage(String),
    #[error("Attachment not found: {0}")]
    NxAttachment(String),
    #[error("Operation not supported by this backend: {operation}")]
    Unsupported { operation: &'static str },
    #[error("Timed out after {timeout:?} waiting for lock on {path}")]
    LockTimeout { path: String, timeout: Duration },
    #[error("Transaction for {operation} failed: {source}")]
    TransactionFailed {
        operation: &'static str,
        #[source]
        source: Box<Error>,
    },
    #[error("No unit of work in progress")]
    NoUnitOfWork,
    #[error("UID or MODSEQ space of mailbox exhausted")]
    MailboxFull,
    #[error("Invalid mailbox path: {0}")]
    BadMailboxPath(String),
    #[error("Invalid annotation key: {0}")]
    BadAnnotationKey(String),
    #[error("Invalid flag: {0}")]
    BadFlag(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn transaction_failed(
        operation: &'static str,
        source: Error,
    ) -> Self {
        Error::TransactionFailed {
            operation,
            source: Box::new(source),
        }
    }

    /// Whether the failed call may succeed if the caller simply tries again.
    ///
    /// Structural failures (missing or duplicate entities, unsupported
    /// operations, bad input) are never retryable. Nothing in this crate
    /// retries internally; the policy belongs to the caller.
    pub fn is_retryable(&self) -> bool {
        match *self {
            Error::LockTimeout { .. } | Error::TransactionFailed { .. } => true,
            Error::Sqlite(rusqlite::Error::SqliteFailure(ref e, _)) => {
                matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                )
            },
            _ => false,
        }
    }
}
