use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

pub mod bonsai;
pub mod process;
pub mod state;

pub use bonsai::BonsaiCli;
pub use process::{ReconnectLoop, ReconnectSettings};

/// Action reported for sessions that are not bound to any training session.
pub const UNSET_ACTION: &str = "Unset";

/// Action used when binding sessions unless configured otherwise.
pub const DEFAULT_ACTION: &str = "Train";

/// A running simulator instance as reported by the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorSession {
    pub session_id: String,
    pub action: String,
}

impl SimulatorSession {
    pub fn is_unset(&self) -> bool {
        self.action == UNSET_ACTION
    }
}

/// Training session that simulators are bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindTarget {
    pub brain_name: String,
    pub brain_version: String,
    pub concept_name: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    Session(String),
    /// Every unmanaged session of the named simulator.
    Simulator(String),
}

impl Display for ConnectTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectTarget::Session(id) => write!(f, "session {id}"),
            ConnectTarget::Simulator(name) => write!(f, "simulator {name}"),
        }
    }
}

pub type RegistryFuture<'a, T> = Pin<Box<dyn Future<Output = crate::Result<T>> + 'a>>;

/// Registry of unmanaged simulator sessions.
///
/// The reconnection loop only reads sessions and binds them, it never creates or
/// removes them.
pub trait SessionRegistry {
    fn list_sessions<'a>(
        &'a self,
        simulator_name: &'a str,
    ) -> RegistryFuture<'a, Vec<SimulatorSession>>;

    /// Resolves to `InvalidSession` when the registry no longer knows the session.
    fn connect_session<'a>(
        &'a self,
        target: &'a ConnectTarget,
        bind: &'a BindTarget,
    ) -> RegistryFuture<'a, ()>;

    /// Starts recording episode logs of a session into the training session.
    fn start_logging<'a>(
        &'a self,
        session_id: &'a str,
        bind: &'a BindTarget,
    ) -> RegistryFuture<'a, ()>;
}
