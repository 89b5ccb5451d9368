//! Clinic Auth: credentials, session tokens, the capability matrix and
//! the authorization kernel, plus the flows built on them.

pub mod capability;
pub mod config;
pub mod error;
pub mod kernel;
pub mod mailer;
pub mod password;
pub mod provisioning;
pub mod service;
pub mod token;

pub use capability::{Capability, CapabilitySet};
pub use config::AuthConfig;
pub use error::AuthError;
pub use kernel::{AuthContext, Authorizer};
pub use mailer::{LogMailer, MailMessage, Mailer};
pub use provisioning::{NewMember, Provisioning, SuperadminInput, SuperadminOutcome};
pub use service::{AuthService, ClientInfo, LoginInput, LoginOutput};
pub use token::SessionClaims;
