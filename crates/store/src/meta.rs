//! Sidecar descriptors and the file-extension conventions of the tree.

use serde::{Deserialize, Serialize};

use refguard_core::{AssetId, AssetKind, AssetPath, DocumentCategory, Timestamp};

/// Suffix appended to an asset's file name to form its sidecar.
pub const SIDECAR_SUFFIX: &str = ".meta";

/// Suffix of in-flight writes. Never treated as an asset.
pub const TEMP_SUFFIX: &str = ".refguard-tmp";

/// File at the root listing pinned composites.
pub const PINNED_FILE: &str = "pinned.json";

/// Extension of class definition files.
pub const TYPE_EXTENSION: &str = "type";

/// Contents of `X.meta`, next to asset `X`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMeta {
    pub id: AssetId,
    #[serde(flatten)]
    pub kind: AssetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<Timestamp>,
}

/// Document category implied by a path's extension.
pub fn category_of(path: &AssetPath) -> Option<DocumentCategory> {
    DocumentCategory::from_str(path.extension()?).ok()
}

/// Kind a freshly imported file gets, from its extension.
pub fn kind_for(path: &AssetPath) -> AssetKind {
    match path.extension() {
        Some(TYPE_EXTENSION) => AssetKind::Type {
            class_name: path.stem().to_string(),
        },
        Some("composite") => AssetKind::Composite,
        _ => AssetKind::Instance,
    }
}

pub fn sidecar_of(path: &AssetPath) -> AssetPath {
    AssetPath::new(format!("{path}{SIDECAR_SUFFIX}"))
}
