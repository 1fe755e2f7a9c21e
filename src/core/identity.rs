use nix::unistd::{Uid, User, gethostname};
use tracing::debug;

/// Who produced a hash list and where.
#[derive(Debug, Clone, PartialEq)]
pub struct Creator {
    pub user: String,
    pub host: String,
}

/// Resolve the current user and host name.
///
/// Detection order for the user:
/// 1. `SUDO_USER` - the person who invoked sudo
/// 2. the passwd entry for the effective uid
/// 3. `USER`
pub fn current_creator() -> Creator {
    let user = user_from_sudo()
        .or_else(user_from_uid)
        .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
        .unwrap_or_else(|| "unknown".to_string());

    let host = gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    debug!(user = %user, host = %host, "Resolved creator identity");
    Creator { user, host }
}

fn user_from_sudo() -> Option<String> {
    std::env::var("SUDO_USER").ok().filter(|u| !u.is_empty())
}

fn user_from_uid() -> Option<String> {
    User::from_uid(Uid::effective()).ok()?.map(|u| u.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creator_fields_are_populated() {
        let creator = current_creator();
        assert!(!creator.user.is_empty());
        assert!(!creator.host.is_empty());
    }
}
