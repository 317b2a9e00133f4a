//! Access control grants.
//!
//! A [`Grant`] pairs a [`Grantee`] with a [`Permission`]. Grantees are
//! classified up front into a fixed [`GranteeKind`], and the two well-known
//! "everybody" groups into a [`PublicClass`], so that deciding whether an
//! object is publicly readable is a matter of comparing enums.

use crate::error::{Error, Result};

/// Who a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GranteeKind {
    /// A predefined group, identified by URI.
    Group,
    /// A user identified by email address.
    User,
    /// An account identified by canonical ID.
    Canonical,
    /// Anything the service invents later.
    Other(String),
}

/// The two groups that make an object public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicClass {
    /// Anyone, signed or anonymous.
    AllUsers,
    /// Anyone holding credentials for the service, whatever the account.
    AuthenticatedUsers,
}
impl PublicClass {
    /// Recognise a group URI such as
    /// `http://acs.amazonaws.com/groups/global/AllUsers`, or its bare final
    /// segment (`AllUsers`).
    pub fn from_uri(uri: &str) -> Option<Self> {
        let name = uri.trim_end_matches('/').rsplit('/').next().unwrap_or(uri);
        match name {
            "AllUsers" => Some(Self::AllUsers),
            "AuthenticatedUsers" => Some(Self::AuthenticatedUsers),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grantee {
    pub kind: GranteeKind,
    /// Canonical ID, for [`GranteeKind::Canonical`].
    pub id: Option<String>,
    /// Group URI, for [`GranteeKind::Group`].
    pub uri: Option<String>,
    pub display_name: Option<String>,
}
impl Grantee {
    pub fn group(uri: impl Into<String>) -> Self {
        Self {
            kind: GranteeKind::Group,
            id: None,
            uri: Some(uri.into()),
            display_name: None,
        }
    }

    pub fn canonical(id: impl Into<String>) -> Self {
        Self {
            kind: GranteeKind::Canonical,
            id: Some(id.into()),
            uri: None,
            display_name: None,
        }
    }

    /// Which public group this grantee is, if any. Only group grantees
    /// qualify; a user that happens to carry a group-looking URI does not.
    pub fn public_class(&self) -> Option<PublicClass> {
        match (&self.kind, &self.uri) {
            (GranteeKind::Group, Some(uri)) => PublicClass::from_uri(uri),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Permission {
    FullControl,
    Read,
    ReadAcp,
    Write,
    WriteAcp,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: Permission,
}
impl Grant {
    pub fn new(grantee: Grantee, permission: Permission) -> Self {
        Self { grantee, permission }
    }

    pub fn is_public(&self) -> bool {
        self.grantee.public_class().is_some()
    }
}

/// An object is public when any one of its grants goes to a public group.
pub fn is_public(grants: &[Grant]) -> bool {
    grants.iter().any(Grant::is_public)
}

/// Outcome of fetching an object's grants, with access denial split out from
/// every other failure.
#[derive(Debug)]
pub enum AclOutcome {
    Granted(Vec<Grant>),
    /// We were not allowed to read the ACL. Expected for some objects.
    Denied(Error),
    /// Anything else went wrong.
    Failed(Error),
}
impl From<Result<Vec<Grant>>> for AclOutcome {
    fn from(result: Result<Vec<Grant>>) -> Self {
        match result {
            Ok(grants) => Self::Granted(grants),
            Err(err) if err.is_access_denied() => Self::Denied(err),
            Err(err) => Self::Failed(err),
        }
    }
}
