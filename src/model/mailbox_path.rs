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

/// Hierarchical name of a mailbox.
///
/// The name is made of folder segments joined by `MailboxPath::DELIMITER`.
/// `user` is `None` for mailboxes in shared namespaces.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MailboxPath {
    pub namespace: String,
    pub user: Option<String>,
    pub name: String,
}

impl MailboxPath {
    pub const DELIMITER: char = '.';
    pub const PRIVATE_NAMESPACE: &'static str = "#private";

    pub fn new(
        namespace: &str,
        user: Option<&str>,
        name: &str,
    ) -> Result<Self, Error> {
        let path = Self {
            namespace: namespace.to_owned(),
            user: user.map(str::to_owned),
            name: name.to_owned(),
        };

        if namespace.is_empty()
            || name.is_empty()
            || user.map_or(false, str::is_empty)
            || name.split(Self::DELIMITER).any(str::is_empty)
            || [namespace, name, user.unwrap_or("")]
                .iter()
                .any(|part| part.chars().any(char::is_control))
        {
            return Err(Error::BadMailboxPath(path.to_string()));
        }

        Ok(path)
    }

    /// A mailbox in `user`'s private namespace.
    pub fn for_user(user: &str, name: &str) -> Result<Self, Error> {
        Self::new(Self::PRIVATE_NAMESPACE, Some(user), name)
    }

    pub fn inbox(user: &str) -> Result<Self, Error> {
        Self::for_user(user, "INBOX")
    }

    /// Whether `self` lies strictly beneath `parent` in the hierarchy.
    pub fn is_descendant_of(&self, parent: &MailboxPath, delimiter: char) -> bool {
        self.namespace == parent.namespace
            && self.user == parent.user
            && self.name.len() > parent.name.len() + 1
            && self.name.starts_with(&parent.name)
            && self.name[parent.name.len()..].starts_with(delimiter)
    }
}

impl fmt::Display for MailboxPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.namespace,
            self.user.as_deref().unwrap_or(""),
            self.name
        )
    }
}

/// A wildcard search over mailbox paths.
///
/// Namespace and user must match exactly. In `pattern`, `*` matches any run
/// of characters and `%` matches any run not containing the delimiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxQuery {
    pub namespace: String,
    pub user: Option<String>,
    pub pattern: String,
}

impl MailboxQuery {
    pub fn for_user(user: &str, pattern: &str) -> Self {
        Self {
            namespace: MailboxPath::PRIVATE_NAMESPACE.to_owned(),
            user: Some(user.to_owned()),
            pattern: pattern.to_owned(),
        }
    }

    pub fn matches(&self, path: &MailboxPath) -> bool {
        self.namespace == path.namespace
            && self.user == path.user
            && wildcard_match(
                self.pattern.as_bytes(),
                path.name.as_bytes(),
                MailboxPath::DELIMITER as u8,
            )
    }
}

/// `*` matches any run of bytes; `%` any run not containing `delimiter`.
fn wildcard_match(pattern: &[u8], name: &[u8], delimiter: u8) -> bool {
    // tail[j] holds whether the pattern suffix processed so far matches
    // name[j..]. Patterns are consumed back to front.
    let mut tail = vec![false; name.len() + 1];
    tail[name.len()] = true;

    for &p in pattern.iter().rev() {
        let mut next = vec![false; name.len() + 1];
        for j in (0..=name.len()).rev() {
            let byte = name.get(j).copied();
            next[j] = match p {
                b'*' => tail[j] || (byte.is_some() && next[j + 1]),
                b'%' => {
                    tail[j]
                        || (byte.map_or(false, |c| c != delimiter)
                            && next[j + 1])
                },
                c => byte == Some(c) && tail[j + 1],
            };
        }
        tail = next;
    }

    tail[0]
}
