use std::collections::BTreeMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crate::core::TransferRequest;

/// `Upload-Metadata` header: comma separated `key base64(value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub filename: Option<String>,
    pub filetype: Option<String>,
    /// Destination key the storage service files the object under
    pub path: Option<String>,
    pub custom: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_request(request: &TransferRequest) -> Self {
        let info = request.file.info();
        Self {
            filename: Some(info.name.clone()),
            filetype: Some(info.content_type.clone()),
            path: Some(request.destination.clone()),
            custom: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    pub fn to_header(&self) -> String {
        let known = [
            ("filename", &self.filename),
            ("filetype", &self.filetype),
            ("path", &self.path),
        ];

        known
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|value| (key, value.as_str())))
            .chain(self.custom.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .map(|(key, value)| format!("{} {}", key, STANDARD.encode(value)))
            .collect::<Vec<_>>()
            .join(",")
    }
}
