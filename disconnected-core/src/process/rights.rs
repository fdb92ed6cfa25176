use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RightsError;

/// Read/write/execute triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rights {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Rights {
    pub const NONE: Rights = Rights { read: false, write: false, execute: false };
    pub const READ: Rights = Rights { read: true, write: false, execute: false };
    pub const EXECUTE: Rights = Rights { read: false, write: false, execute: true };
    pub const READ_EXECUTE: Rights = Rights { read: true, write: false, execute: true };
    pub const ALL: Rights = Rights { read: true, write: true, execute: true };

    pub fn contains(self, required: Rights) -> bool {
        self.missing(required) == Rights::NONE
    }

    /// Rights in `required` that `self` does not grant.
    pub fn missing(self, required: Rights) -> Rights {
        Rights {
            read: required.read && !self.read,
            write: required.write && !self.write,
            execute: required.execute && !self.execute,
        }
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(f, "{}{}{}", flag(self.read, 'r'), flag(self.write, 'w'), flag(self.execute, 'x'))
    }
}

/// Anything a user can hold rights on, typically a program file.
pub trait RightsSource {
    fn source_name(&self) -> &str;

    fn rights_for(&self, user: &str) -> Rights;

    fn check_rights(&self, user: &str, required: Rights) -> Result<(), RightsError> {
        let missing = self.rights_for(user).missing(required);
        if missing == Rights::NONE {
            Ok(())
        } else {
            Err(RightsError::Missing {
                user: user.to_string(),
                source_name: self.source_name().to_string(),
                missing,
            })
        }
    }
}

/// Owner/other rights of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRights {
    pub owner: String,
    pub owner_rights: Rights,
    pub other_rights: Rights,
}

impl FileRights {
    pub fn new(owner: impl Into<String>, owner_rights: Rights, other_rights: Rights) -> Self {
        Self { owner: owner.into(), owner_rights, other_rights }
    }

    /// Everyone may read and execute, the owner may also write.
    pub fn public(owner: impl Into<String>) -> Self {
        Self::new(owner, Rights::ALL, Rights::READ_EXECUTE)
    }

    pub fn rights_for(&self, user: &str) -> Rights {
        if user == self.owner {
            self.owner_rights
        } else {
            self.other_rights
        }
    }
}
