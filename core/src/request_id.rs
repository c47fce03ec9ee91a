//! Request identifiers carried on outbound calls.

use uuid::Uuid;

/// Header under which request identifiers are read and written.
pub const REQUEST_ID_HEADER: &str = "x-req-id";

/// A fresh random identifier: a v4 UUID in 32-character hex form.
pub fn random_id() -> String {
    Uuid::new_v4().simple().to_string()
}
