//! High-level client API
//!
//! * [`ConnectionInfo`] resolves a `mongodb://` connection string into candidates
//! * [`Connector`] runs the candidate loop and yields one connection
//! * [`MongoClient`] wraps the selected connection

mod connection_string;
mod connector;
mod mongo_client;

pub use crate::auth::Credentials;
pub use connection_string::{
    Candidate, ConnectionInfo, ConnectionOptions, ConnectionOptionsBuilder, ReadPreference,
    SCHEME,
};
pub use connector::{select, Attempt, ConnectPolicy, Connector, ConnectorBuilder, Selection};
pub use mongo_client::MongoClient;
