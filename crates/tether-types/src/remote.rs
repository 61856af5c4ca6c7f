use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Blob name used for the session archive when none is configured.
pub const DEFAULT_BLOB_NAME: &str = "session.pack";

/// Identifier of a logical container in the remote blob store
/// (a folder id, bucket prefix, or directory name depending on the backend).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Create a container id, rejecting empty ids and path separators.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        validate_component("container", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single canonical session blob within a container.
///
/// At most one blob with this name may exist in the container at any time;
/// the remote session store enforces this on every write.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteBlobRef {
    pub container: ContainerId,
    pub name: String,
}

impl RemoteBlobRef {
    /// Create a reference to a named blob.
    pub fn new(container: ContainerId, name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_component("blob", &name)?;
        Ok(Self { container, name })
    }

    /// Reference to the default session blob in `container`.
    pub fn session(container: ContainerId) -> Self {
        Self {
            container,
            name: DEFAULT_BLOB_NAME.to_string(),
        }
    }
}

impl fmt::Display for RemoteBlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

fn validate_component(what: &'static str, name: &str) -> Result<(), TypeError> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("must not contain path separators")
    } else if name == "." || name == ".." {
        Some("must not be a relative path component")
    } else if name.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(TypeError::InvalidName {
            what,
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
