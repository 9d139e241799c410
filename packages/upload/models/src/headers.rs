//! Splitting configured metadata into standard object headers and user
//! metadata.
//!
//! Deployment configuration carries one flat metadata map. Keys that name
//! a standard object header are sent as that header; everything else is
//! user metadata (`x-amz-meta-*`). The store lowercases user metadata
//! keys, so comparisons go through [`tracked_key`].

use std::collections::BTreeMap;

use strum_macros::{AsRefStr, Display, EnumString};

/// Standard object headers that may be set through metadata.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ObjectHeader {
    #[strum(serialize = "Content-Type")]
    ContentType,
    #[strum(serialize = "Cache-Control")]
    CacheControl,
    #[strum(serialize = "Content-Disposition")]
    ContentDisposition,
    #[strum(serialize = "Content-Encoding")]
    ContentEncoding,
    #[strum(serialize = "Content-Language")]
    ContentLanguage,
    #[strum(serialize = "Expires")]
    Expires,
    #[strum(serialize = "x-amz-website-redirect-location")]
    WebsiteRedirectLocation,
}

/// Metadata split into headers and user metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Standard headers.
    pub headers: BTreeMap<ObjectHeader, String>,
    /// User metadata, keys as configured.
    pub user: BTreeMap<String, String>,
}

impl ObjectMetadata {
    /// Partitions a flat metadata map.
    #[must_use]
    pub fn partition(metadata: &BTreeMap<String, String>) -> Self {
        let mut split = Self::default();
        for (key, value) in metadata {
            match key.trim().parse::<ObjectHeader>() {
                Ok(header) => {
                    split.headers.insert(header, value.clone());
                }
                Err(_) => {
                    split.user.insert(key.clone(), value.clone());
                }
            }
        }
        split
    }
}

/// Normalized key under which a metadata entry is compared with the
/// remote object: the canonical header name for standard headers, the
/// lowercased key for user metadata.
#[must_use]
pub fn tracked_key(key: &str) -> String {
    let key = key.trim();
    key.parse::<ObjectHeader>()
        .map_or_else(|_| key.to_lowercase(), |header| header.as_ref().to_string())
}
