//! Pronote client seam
//!
//! Models of the data a Pronote instance serves, the blocking
//! [`PronoteClient`] and [`Connector`] traits the integration is written
//! against, and a [`fixture`] implementation serving a JSON snapshot.

pub mod client;
pub mod error;
pub mod fixture;
pub mod models;

pub use client::{
    ClientCredentials, Connector, CredentialsLogin, DeviceLogin, PronoteClient, QrCodeLogin,
    SharedClient, TokenLogin,
};
pub use error::{ClientError, ClientResult};
pub use fixture::{FixtureClient, FixtureConnector, Snapshot};
pub use models::*;
