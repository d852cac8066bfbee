use crate::User;
use serde::Serialize;

/// Per-kind counts over a result set, shown next to the list of users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsersMetadata {
    pub regular_users: usize,
    pub organizations: usize,
    pub admins: usize,
}

impl UsersMetadata {
    #[must_use]
    pub fn from_users<'a>(users: impl IntoIterator<Item = &'a User>) -> Self {
        users.into_iter().fold(Self::default(), |acc, user| Self {
            regular_users: acc.regular_users + usize::from(user.is_regular_user()),
            organizations: acc.organizations + usize::from(user.is_organization()),
            admins: acc.admins + usize::from(user.site_admin),
        })
    }
}
