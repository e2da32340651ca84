//! Module fixture builders
//!
//! `ModuleArchiveBuilder` produces gzipped module packages the way module
//! authors ship them (single root directory, manifest under `companion/`).
//! `write_module_dir` lays out an already extracted module on disk.

#![allow(dead_code)]

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::constants::{TEST_MODULE_ID, TEST_MODULE_VERSION};

/// Builder for gzipped module archives
pub struct ModuleArchiveBuilder {
    id: String,
    version: String,
    root: String,
    legacy_ids: Vec<String>,
    with_manifest: bool,
    help: Option<String>,
    files: Vec<(String, Vec<u8>)>,
}

impl Default for ModuleArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleArchiveBuilder {
    pub fn new() -> Self {
        Self {
            id: TEST_MODULE_ID.to_string(),
            version: TEST_MODULE_VERSION.to_string(),
            root: "pkg".to_string(),
            legacy_ids: Vec::new(),
            with_manifest: true,
            help: None,
            files: vec![("main.js".to_string(), b"module.exports = {}".to_vec())],
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_root(mut self, root: &str) -> Self {
        self.root = root.to_string();
        self
    }

    pub fn with_legacy_id(mut self, legacy_id: &str) -> Self {
        self.legacy_ids.push(legacy_id.to_string());
        self
    }

    pub fn with_help(mut self, markdown: &str) -> Self {
        self.help = Some(markdown.to_string());
        self
    }

    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        self.files.push((path.to_string(), content.to_vec()));
        self
    }

    pub fn without_manifest(mut self) -> Self {
        self.with_manifest = false;
        self
    }

    pub fn manifest_json(&self) -> String {
        serde_json::json!({
            "id": self.id,
            "version": self.version,
            "name": format!("Test {}", self.id),
            "manufacturer": "Acme",
            "products": ["Projector"],
            "legacyIds": self.legacy_ids,
        })
        .to_string()
    }

    /// Uncompressed tar stream
    pub fn build_tar(&self) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        dir.set_cksum();
        builder
            .append_data(&mut dir, format!("{}/", self.root), &[][..])
            .unwrap();

        let mut entries = self.files.clone();
        if self.with_manifest {
            entries.push((
                "companion/manifest.json".to_string(),
                self.manifest_json().into_bytes(),
            ));
        }
        if let Some(help) = &self.help {
            entries.push(("companion/HELP.md".to_string(), help.clone().into_bytes()));
        }

        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{}/{}", self.root, path), content.as_slice())
                .unwrap();
        }

        builder.into_inner().unwrap()
    }

    /// Gzipped tar stream
    pub fn build_tgz(&self) -> Vec<u8> {
        gzip(&self.build_tar())
    }

    pub fn build_bytes(&self) -> Bytes {
        Bytes::from(self.build_tgz())
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Write an extracted module into `{root}/{id}-{version}`
pub fn write_module_dir(root: &Path, id: &str, version: &str, legacy_ids: &[&str]) -> PathBuf {
    let dir = root.join(format!("{}-{}", id, version));
    std::fs::create_dir_all(dir.join("companion")).unwrap();
    let manifest = serde_json::json!({
        "id": id,
        "version": version,
        "name": format!("Test {}", id),
        "legacyIds": legacy_ids,
    });
    std::fs::write(dir.join("companion/manifest.json"), manifest.to_string()).unwrap();
    dir
}
