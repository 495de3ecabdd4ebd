//! Visibility policy
//!
//! Admins see every article; anonymous visitors and non-admin users see only
//! published ones. The same scope applies to listings and single fetches.

use crate::db::repositories::ArticleScope;
use crate::models::User;

pub struct VisibilityPolicy;

impl VisibilityPolicy {
    /// The article scope visible to `viewer`
    pub fn scope_for(viewer: Option<&User>) -> ArticleScope {
        match viewer {
            Some(user) if user.is_admin() => ArticleScope::All,
            _ => ArticleScope::PublishedOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_for() {
        let admin = User::new("admin@example.com", "hash".to_string(), true);
        let reader = User::new("reader@example.com", "hash".to_string(), false);

        assert_eq!(VisibilityPolicy::scope_for(Some(&admin)), ArticleScope::All);
        assert_eq!(VisibilityPolicy::scope_for(Some(&reader)), ArticleScope::PublishedOnly);
        assert_eq!(VisibilityPolicy::scope_for(None), ArticleScope::PublishedOnly);
    }
}
