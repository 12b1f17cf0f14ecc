//! `risknexus-auth`: authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: role permissions arrive through the
//! [`RoleLookup`] capability, which storage crates implement.

pub mod authorize;
pub mod checker;
pub mod claims;
pub mod jwt;
pub mod lookup;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthorizationExplanation, AuthzError, Principal, explain_authorization};
pub use checker::PermissionChecker;
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use lookup::{LookupError, RoleLookup};
pub use permissions::{Permission, PermissionDefinition, PermissionSet, catalog};
pub use roles::Role;
