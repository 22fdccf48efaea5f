pub mod config;
pub mod credential;
pub mod error;
pub mod merit;
pub mod org;
pub mod token_cache;
pub mod types;

pub use config::{Environment, MeritConfig};
pub use credential::{AppCredentials, OrgAccessToken};
pub use error::{MeritError, Result};
pub use merit::Merit;
pub use org::Org;
pub use token_cache::{DEFAULT_AUTH_TIMEOUT, OrgTokenCache};
pub use types::{
    EnabledFieldSetting, Field, IssuedMerit, LinkAppUrl, MeritQuery, MeritStatus, MeritTemplate,
    OrgInfo, Recipient,
};
