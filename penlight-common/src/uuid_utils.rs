//! UUID helpers

use uuid::Uuid;

/// New random guid in the TEXT format stored in the database
pub fn new_guid() -> String {
    Uuid::new_v4().to_string()
}
