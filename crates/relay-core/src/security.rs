use crate::domain::UserId;

// ============== Authorization ==============

/// Admin commands (listing, deleting, renaming, stop/restart) require the
/// sender to be in the configured admin list. Uploads are open to everyone.
pub fn is_admin(user_id: Option<UserId>, admin_ids: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    if admin_ids.is_empty() {
        return false;
    }
    admin_ids.contains(&user_id.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_check() {
        assert!(is_admin(Some(UserId(1)), &[1, 2]));
        assert!(!is_admin(Some(UserId(3)), &[1, 2]));
        assert!(!is_admin(None, &[1]));
        assert!(!is_admin(Some(UserId(1)), &[]));
    }
}
