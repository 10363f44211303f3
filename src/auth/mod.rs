mod claims;
pub mod credentials;
pub(crate) mod extractors;
pub mod jwt;
pub mod password;
pub mod tokens;
