//! Protocol message types

use super::constants::{commands, COMMAND_NAMESPACE_SUFFIX};
use bson::Bson;
use std::sync::atomic::{AtomicI32, Ordering};

/// A command or reply document (BSON, insertion-ordered)
pub type Document = bson::Document;

// Process-wide request id counter
static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// Allocate a fresh request id
pub fn next_request_id() -> i32 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Standard message header shared by every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total frame length, header included
    pub message_length: i32,
    /// Sender-assigned id
    pub request_id: i32,
    /// Id of the request this frame answers (0 for requests)
    pub response_to: i32,
    /// Operation code
    pub op_code: i32,
}

/// Command request against `<database>.$cmd`
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    /// Request id placed in the header
    pub request_id: i32,
    /// Target database
    pub database: String,
    /// Command document; the first key names the command
    pub command: Document,
}

impl CommandRequest {
    /// Create a command request with a fresh request id
    pub fn new(database: impl Into<String>, command: Document) -> Self {
        Self {
            request_id: next_request_id(),
            database: database.into(),
            command,
        }
    }

    /// The `isMaster` role probe
    pub fn is_master() -> Self {
        let mut command = Document::new();
        command.insert(commands::IS_MASTER, 1i32);
        Self::new(super::constants::ADMIN_DATABASE, command)
    }

    /// Full command namespace, e.g. `admin.$cmd`
    pub fn namespace(&self) -> String {
        format!("{}{}", self.database, COMMAND_NAMESPACE_SUFFIX)
    }

    /// Name of the command (first key of the document)
    pub fn command_name(&self) -> Option<&str> {
        self.command.keys().next().map(String::as_str)
    }
}

/// Reply to a command request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandReply {
    /// Header of the decoded frame (`None` until decoded)
    pub header: Option<MessageHeader>,
    /// Reply flags
    pub flags: i32,
    /// Returned documents, in wire order
    pub documents: Vec<Document>,
}

impl CommandReply {
    /// Build a reply carrying the given documents
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            header: None,
            flags: 0,
            documents,
        }
    }

    /// First returned document
    pub fn first(&self) -> Option<&Document> {
        self.documents.first()
    }

    /// Whether the first document reports `ok: 1`
    ///
    /// Servers send `ok` as a double, an integer or a boolean.
    pub fn is_ok(&self) -> bool {
        self.first()
            .and_then(|doc| doc.get(commands::OK_FIELD))
            .map(|ok| match ok {
                Bson::Boolean(b) => *b,
                Bson::Double(f) => *f == 1.0,
                Bson::Int32(i) => *i == 1,
                Bson::Int64(i) => *i == 1,
                _ => false,
            })
            .unwrap_or(false)
    }

    /// Server error message from the first document, if any
    pub fn error_message(&self) -> Option<&str> {
        self.first().and_then(|doc| doc.get_str("errmsg").ok())
    }
}
