// Order lifecycle
pub mod identifiers;
pub mod orders;
pub mod pricing;

// Money
pub mod payments;

// People
pub mod customers;
pub mod notifications;

use uuid::Uuid;

/// Who performed a change, recorded on history rows and payments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub name: Option<String>,
}

impl Actor {
    pub fn user(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: Some(name.into()),
        }
    }

    /// An automated actor without a user account.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn system() -> Self {
        Self::named("system")
    }
}
