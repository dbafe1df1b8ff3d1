//! Table names understood by the storage dispatcher.

pub const USERS: &str = "users";
/// Admins, super-admins and agents share one table, told apart by role.
pub const ADMINS: &str = "admins";
pub const DIALOGS: &str = "dialogs";
pub const MESSAGES: &str = "messages";
