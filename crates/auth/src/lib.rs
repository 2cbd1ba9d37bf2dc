//! `warden-auth`: OAuth2 identity-provider security core.
//!
//! Password hashing and policy, credentials, token/code issuance, stateless
//! validation of protocol entities, and RBAC resolution.
//!
//! This crate is intentionally decoupled from HTTP and storage: callers hand in
//! entity snapshots and an explicit `now`, and persist whatever results.

pub mod audit;
pub mod auth_code;
pub mod authorize;
pub mod client;
pub mod credentials;
pub mod email;
pub mod generator;
pub mod hasher;
pub mod permissions;
pub mod pkce;
pub mod policy;
pub mod random;
pub mod roles;
pub mod scope;
pub mod session;
pub mod token;
pub mod user;
pub mod validator;

pub use audit::{AuditEvent, AuditEventType, AuditSink, NoopAuditSink};
pub use auth_code::{AUTH_CODE_TTL_MINUTES, AuthCode, auth_code_ttl};
pub use authorize::{AccessDenied, AccessExplanation, PermissionResolver};
pub use client::{Client, GrantType};
pub use credentials::{Credentials, CredentialsError, Password};
pub use email::{Email, EmailError};
pub use generator::{TokenConfig, TokenGenerator, TokenPair};
pub use hasher::{
    Argon2Hasher, EncodedHash, HashError, HashFormatError, HasherConfig, PasswordHasher,
};
pub use permissions::{Action, Permission, PermissionKey, ResourceType};
pub use pkce::CodeChallengeMethod;
pub use policy::{PasswordPolicy, PolicyError};
pub use random::{CryptoError, OsRandom, SecureRandom};
pub use roles::Role;
pub use session::{Session, SessionStatus};
pub use token::{Token, TokenType};
pub use user::User;
pub use validator::{EntityKind, SessionPolicy, ValidationError, Validator};
