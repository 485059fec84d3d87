use std::sync::Arc;

/// A workload whose logs are tailed, as resolved from the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub url: String,
}

impl TargetRecord {
    pub fn pod(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        let namespace = namespace.into();
        let url = format!("/api/v1/namespaces/{}/pods/{}", namespace, name);
        Self {
            name,
            namespace,
            kind: "Pod".to_string(),
            url,
        }
    }
}

/// A batch of raw log bytes read from one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source: Arc<str>,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(source: Arc<str>, data: Vec<u8>) -> Self {
        Self { source, data }
    }
}

/// Parameters used when opening a log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub follow: bool,
    pub tail_lines: i64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            follow: true,
            tail_lines: 10,
        }
    }
}
