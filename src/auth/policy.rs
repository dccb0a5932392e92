/*!
 * # Capability Policy
 *
 * Every role check in the service goes through [`authorize`]. Handlers name
 * the capability an operation needs; the table below decides which roles
 * hold it.
 */

use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Role {
    User,
    Manager,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    PlaceOrder,
    ValidatePromo,
    ReadOwnWallet,
    ReadOwnOrders,
    SpendCoins,
    ManageOwnCart,
    ReadAnyOrder,
    ManualSettlement,
    LedgerAudit,
}

impl Capability {
    /// Lowest role holding this capability. Roles are ordered User < Manager < Admin.
    fn minimum_role(self) -> Role {
        match self {
            Self::PlaceOrder
            | Self::ValidatePromo
            | Self::ReadOwnWallet
            | Self::ReadOwnOrders
            | Self::SpendCoins
            | Self::ManageOwnCart => Role::User,
            Self::ReadAnyOrder | Self::ManualSettlement => Role::Manager,
            Self::LedgerAudit => Role::Admin,
        }
    }
}

impl Role {
    fn rank(self) -> u8 {
        match self {
            Role::User => 0,
            Role::Manager => 1,
            Role::Admin => 2,
        }
    }

    pub fn can(self, capability: Capability) -> bool {
        self.rank() >= capability.minimum_role().rank()
    }
}

/// Caller identity resolved upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user(user_id: Uuid) -> Self {
        Self::new(user_id, Role::User)
    }
}

pub fn authorize(principal: &Principal, capability: Capability) -> Result<(), ServiceError> {
    if principal.role.can(capability) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "role {} lacks capability {}",
            principal.role, capability
        )))
    }
}

/// Access to a resource owned by `owner`: the caller's own resources need
/// `own`, anyone else's need `any`.
pub fn authorize_owner(
    principal: &Principal,
    owner: Uuid,
    own: Capability,
    any: Capability,
) -> Result<(), ServiceError> {
    if principal.user_id == owner {
        authorize(principal, own)
    } else {
        authorize(principal, any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Role::User, Capability::PlaceOrder, true)]
    #[case(Role::User, Capability::SpendCoins, true)]
    #[case(Role::User, Capability::ReadAnyOrder, false)]
    #[case(Role::User, Capability::ManualSettlement, false)]
    #[case(Role::Manager, Capability::ManualSettlement, true)]
    #[case(Role::Manager, Capability::LedgerAudit, false)]
    #[case(Role::Admin, Capability::LedgerAudit, true)]
    #[case(Role::Admin, Capability::ManageOwnCart, true)]
    fn capability_table(#[case] role: Role, #[case] capability: Capability, #[case] allowed: bool) {
        let principal = Principal::new(Uuid::new_v4(), role);
        assert_eq!(authorize(&principal, capability).is_ok(), allowed);
    }

    #[test]
    fn owner_checks_fall_back_to_any_capability() {
        let owner = Uuid::new_v4();
        let user = Principal::user(Uuid::new_v4());
        let manager = Principal::new(Uuid::new_v4(), Role::Manager);

        assert!(authorize_owner(
            &Principal::user(owner),
            owner,
            Capability::ReadOwnOrders,
            Capability::ReadAnyOrder
        )
        .is_ok());
        assert!(matches!(
            authorize_owner(&user, owner, Capability::ReadOwnOrders, Capability::ReadAnyOrder),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(authorize_owner(
            &manager,
            owner,
            Capability::ReadOwnOrders,
            Capability::ReadAnyOrder
        )
        .is_ok());
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }
}
