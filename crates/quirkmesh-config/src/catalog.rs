// ── Profile catalog files ──
//
// JSON files hold a bare array of profile descriptors; TOML files hold
// them under `[[profiles]]`. A malformed file fails the load; a bad
// descriptor inside a good file is skipped and reported.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use quirkmesh_core::{FingerprintRegistry, LoadReport, ProfileDescriptor, RegistryBuilder};

use crate::ConfigError;

#[derive(Deserialize)]
struct TomlCatalog {
    #[serde(default)]
    profiles: Vec<ProfileDescriptor>,
}

fn catalog_error(path: &Path, reason: impl ToString) -> ConfigError {
    ConfigError::Catalog {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_descriptors(path: &Path) -> Result<Vec<ProfileDescriptor>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        toml::from_str::<TomlCatalog>(&text)
            .map(|c| c.profiles)
            .map_err(|e| catalog_error(path, e))
    } else {
        serde_json::from_str(&text).map_err(|e| catalog_error(path, e))
    }
}

/// Load one catalog file into `builder`.
pub fn load_catalog(builder: &mut RegistryBuilder, path: &Path) -> Result<LoadReport, ConfigError> {
    let descriptors = read_descriptors(path)?;
    let report = builder.load(descriptors);
    if report.rejected.is_empty() {
        info!(path = %path.display(), loaded = report.loaded, "catalog loaded");
    } else {
        warn!(
            path = %path.display(),
            loaded = report.loaded,
            rejected = report.rejected.len(),
            "catalog loaded with rejected entries"
        );
    }
    Ok(report)
}

/// Build a registry from several catalog files, in order. A profile id
/// defined by an earlier file wins; later duplicates are rejected.
pub fn load_catalogs<P: AsRef<Path>>(
    paths: &[P],
) -> Result<(FingerprintRegistry, Vec<LoadReport>), ConfigError> {
    let mut builder = FingerprintRegistry::builder();
    let reports = paths
        .iter()
        .map(|p| load_catalog(&mut builder, p.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((builder.build(), reports))
}
