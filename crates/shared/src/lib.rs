//! Wire types, domain enums and input validation shared by the salon admin client.

pub mod domain;
pub mod error;
pub mod protocol;
pub mod recurrence;
pub mod validation;
