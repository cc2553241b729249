use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use crate::UserId;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    ReadApplication,
    ManageApplication,
    CommentOnApplication,
    ReadThread,
    ManageThread,
    CommentOnThread,
    ReadComment,
    ManageComment,
}

impl Permission {
    /// Key under which this permission is stored in a serialized `PolicySet`
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadApplication => "read-application",
            Permission::ManageApplication => "manage-application",
            Permission::CommentOnApplication => "comment-on-application",
            Permission::ReadThread => "read-thread",
            Permission::ManageThread => "manage-thread",
            Permission::CommentOnThread => "comment-on-thread",
            Permission::ReadComment => "read-comment",
            Permission::ManageComment => "manage-comment",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ResourceKind {
    #[serde(rename = "application")]
    Application,
    #[serde(rename = "comment thread")]
    Thread,
    #[serde(rename = "comment")]
    Comment,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Application => "application",
            ResourceKind::Thread => "comment thread",
            ResourceKind::Comment => "comment",
        })
    }
}

/// Which permissions on a child resource a permission on its parent grants
fn inherited(parent: ResourceKind, child: ResourceKind, perm: Permission) -> &'static [Permission] {
    use Permission::*;
    use ResourceKind::*;
    match (parent, child, perm) {
        (Application, Thread, ReadApplication) => &[ReadThread],
        (Application, Thread, CommentOnApplication) => &[ReadThread, CommentOnThread],
        (Application, Thread, ManageApplication) => &[ReadThread, ManageThread],
        (Thread, Comment, ReadThread) => &[ReadComment],
        (Thread, Comment, CommentOnThread) => &[ReadComment],
        (Thread, Comment, ManageThread) => &[ReadComment, ManageComment],
        _ => &[],
    }
}

/// Who holds which permission on one resource
///
/// Serialized as a map from permission name to the list of user ids holding it.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct PolicySet(BTreeMap<Permission, BTreeSet<UserId>>);

impl PolicySet {
    pub fn new() -> PolicySet {
        PolicySet(BTreeMap::new())
    }

    pub fn grant(&mut self, perm: Permission, user: UserId) {
        self.0.entry(perm).or_insert_with(BTreeSet::new).insert(user);
    }

    pub fn with<I>(mut self, perm: Permission, users: I) -> PolicySet
    where
        I: IntoIterator<Item = UserId>,
    {
        for u in users {
            self.grant(perm, u);
        }
        self
    }

    pub fn allows(&self, user: UserId, perm: Permission) -> bool {
        self.0.get(&perm).map(|u| u.contains(&user)).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|u| u.is_empty())
    }

    /// Policy set to attach to a new `child`-kind resource created under a
    /// `parent`-kind resource holding `self`
    ///
    /// Only depends on its arguments. Kind pairs with no inheritance rules
    /// yield an empty set.
    pub fn child_policies(&self, parent: ResourceKind, child: ResourceKind) -> PolicySet {
        let mut res = PolicySet::new();
        for (perm, users) in &self.0 {
            for child_perm in inherited(parent, child, *perm) {
                for u in users {
                    res.grant(*child_perm, *u);
                }
            }
        }
        res
    }
}
