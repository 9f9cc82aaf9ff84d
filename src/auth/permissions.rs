/*!
 * # Permissions Module
 *
 * Permission strings are `resource:action`. A `resource:*` grant covers every
 * action on the resource and `*` covers everything.
 */

use crate::entities::UserRole;

/// Common permission string constants for compile-time safety
pub mod consts {
    // Orders
    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_CREATE: &str = "orders:create";
    pub const ORDERS_UPDATE: &str = "orders:update";
    /// Read orders linked to the caller's own customer profile
    pub const ORDERS_OWN: &str = "orders:own";

    // Payments
    pub const PAYMENTS_READ: &str = "payments:read";
    pub const PAYMENTS_CREATE: &str = "payments:create";

    // Customers
    pub const CUSTOMERS_READ: &str = "customers:read";
    pub const CUSTOMERS_CREATE: &str = "customers:create";
    pub const CUSTOMERS_UPDATE: &str = "customers:update";

    // Notifications
    pub const NOTIFICATIONS_READ: &str = "notifications:read";
    pub const NOTIFICATIONS_UPDATE: &str = "notifications:update";
    pub const NOTIFICATIONS_BROADCAST: &str = "notifications:broadcast";
}

/// Permissions granted to a role, embedded into issued tokens.
pub fn role_permissions(role: UserRole) -> Vec<String> {
    let grants: &[&str] = match role {
        UserRole::Admin => &["*"],
        UserRole::Staff => &[
            "orders:*",
            "payments:*",
            "customers:*",
            consts::NOTIFICATIONS_READ,
            consts::NOTIFICATIONS_UPDATE,
        ],
        UserRole::Customer => &[
            consts::ORDERS_OWN,
            consts::NOTIFICATIONS_READ,
            consts::NOTIFICATIONS_UPDATE,
        ],
    };
    grants.iter().map(|g| g.to_string()).collect()
}

/// Whether `grant` covers `required`.
pub fn grant_covers(grant: &str, required: &str) -> bool {
    if grant == "*" || grant == required {
        return true;
    }
    match (grant.split_once(':'), required.split_once(':')) {
        (Some((resource, "*")), Some((wanted, _))) => resource == wanted,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("*", "payments:create", true)]
    #[case("orders:*", "orders:update", true)]
    #[case("orders:*", "payments:read", false)]
    #[case("orders:read", "orders:read", true)]
    #[case("orders:read", "orders:update", false)]
    #[case("orders", "orders:read", false)]
    fn grant_matching(#[case] grant: &str, #[case] required: &str, #[case] expected: bool) {
        assert_eq!(grant_covers(grant, required), expected);
    }

    #[test]
    fn customers_cannot_touch_staff_resources() {
        let grants = role_permissions(UserRole::Customer);
        assert!(!grants.iter().any(|g| grant_covers(g, consts::ORDERS_READ)));
        assert!(!grants.iter().any(|g| grant_covers(g, consts::PAYMENTS_CREATE)));
        assert!(grants.iter().any(|g| grant_covers(g, consts::ORDERS_OWN)));
    }

    #[test]
    fn staff_cannot_broadcast() {
        let grants = role_permissions(UserRole::Staff);
        assert!(grants.iter().any(|g| grant_covers(g, consts::CUSTOMERS_UPDATE)));
        assert!(!grants
            .iter()
            .any(|g| grant_covers(g, consts::NOTIFICATIONS_BROADCAST)));
    }
}
