pub mod authorization;
pub mod credential_offer;
pub mod error;
pub mod form;
pub mod issuance;
pub mod metadata;
pub mod proof;
pub mod transport;
pub mod util;
