//! Permission and role names known to the panel.

pub const USER_VIEW: &str = "user.view";
pub const USER_CREATE: &str = "user.create";
pub const USER_EDIT: &str = "user.edit";
pub const USER_DELETE: &str = "user.delete";
pub const USER_ROLES_ASSIGN: &str = "user.roles.assign";

pub const AUTH_LOGIN: &str = "auth.login";
pub const AUTH_LOGOUT: &str = "auth.logout";
pub const AUTH_VERIFY: &str = "auth.verify";

pub const PM2_VIEW_BASIC: &str = "pm2.view.basic";
pub const PM2_VIEW_CWD: &str = "pm2.view.cwd";
pub const PM2_VIEW_FULL: &str = "pm2.view.full";
pub const PM2_CONTROL_START: &str = "pm2.control.start";
pub const PM2_CONTROL_STOP: &str = "pm2.control.stop";
pub const PM2_CONTROL_RESTART: &str = "pm2.control.restart";

pub const F2B_VIEW_STATUS: &str = "f2b.view.status";
pub const F2B_VIEW_JAIL: &str = "f2b.view.jail";
pub const F2B_CONTROL_UNBAN: &str = "f2b.control.unban";

/// Role seeded with every permission.
pub const ROLE_ADMIN: &str = "admin";

pub const ALL_PERMISSIONS: &[&str] = &[
    USER_VIEW,
    USER_CREATE,
    USER_EDIT,
    USER_DELETE,
    USER_ROLES_ASSIGN,
    AUTH_LOGIN,
    AUTH_LOGOUT,
    AUTH_VERIFY,
    PM2_VIEW_BASIC,
    PM2_VIEW_CWD,
    PM2_VIEW_FULL,
    PM2_CONTROL_START,
    PM2_CONTROL_STOP,
    PM2_CONTROL_RESTART,
    F2B_VIEW_STATUS,
    F2B_VIEW_JAIL,
    F2B_CONTROL_UNBAN,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn permission_names_are_unique() {
        let unique: HashSet<_> = ALL_PERMISSIONS.iter().collect();
        assert_eq!(unique.len(), ALL_PERMISSIONS.len());
    }
}
