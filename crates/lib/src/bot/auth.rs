//! Username allow-list checked before any handler runs.

use std::collections::HashSet;

/// Authorized Telegram usernames. Built once at startup and never mutated.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    users: HashSet<String>,
}

/// Lowercase, trimmed, without a leading `@`.
fn normalize(username: &str) -> String {
    username.trim().trim_start_matches('@').to_lowercase()
}

impl AllowList {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let users = users
            .into_iter()
            .map(|u| normalize(u.as_ref()))
            .filter(|u| !u.is_empty())
            .collect();
        Self { users }
    }

    /// Empty usernames are never allowed.
    pub fn is_allowed(&self, username: &str) -> bool {
        let name = normalize(username);
        !name.is_empty() && self.users.contains(&name)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_ignores_case_and_at_prefix() {
        let list = AllowList::new(["Alice", "@bob"]);
        assert!(list.is_allowed("alice"));
        assert!(list.is_allowed("ALICE"));
        assert!(list.is_allowed("Bob"));
        assert!(list.is_allowed("@bob"));
        assert!(!list.is_allowed("carol"));
    }

    #[test]
    fn empty_username_is_denied() {
        let list = AllowList::new(["alice", ""]);
        assert_eq!(list.len(), 1);
        assert!(!list.is_allowed(""));
        assert!(!list.is_allowed("   "));
    }

    #[test]
    fn empty_list_denies_everyone() {
        let list = AllowList::default();
        assert!(list.is_empty());
        assert!(!list.is_allowed("alice"));
    }
}
