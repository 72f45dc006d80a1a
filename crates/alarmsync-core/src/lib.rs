pub mod classify;
pub mod client;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fixture;
pub mod migrate;
pub mod normalize;
pub mod options;
pub mod reconcile;
pub mod snapshot;

#[cfg(test)]
mod command_tests;
#[cfg(test)]
mod migrate_tests;
#[cfg(test)]
mod reconcile_tests;

pub use client::{
    AuthResult, ClientError, Credentials, EventStream, FailureKind, OneTimeCode, OtpMethod,
    PushEvent, RawDevice, RemoteClient,
};
pub use command::{Command, CommandArgs, CommandRequest};
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorState, SyncStats};
pub use error::SyncError;
pub use fixture::FixtureClient;
pub use migrate::{migrate, CURRENT_VERSION};
pub use normalize::{normalize, NormalizeOptions, Normalizer};
pub use options::{AccountOptions, ArmingOption, ArmingProfile, ConfigState};
pub use reconcile::{reconcile, RegistryState, Reconciliation};
pub use snapshot::{EntityKind, EntitySnapshot, EntityState, Published, SnapshotGeneration};
