use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub mod secrets;

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
/// Later files override earlier files via deep-merge.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    scan_for_secrets(&merged, String::new())?;

    // Canonicalize (stable key order) by round-tripping through serde_json::to_string,
    // which orders keys deterministically for maps (BTreeMap) only if we ensure sorting.
    // So we implement a manual canonicalization step that sorts object keys.
    let canonical = canonicalize_json(&merged);

    // Hash canonical bytes
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Same as [`load_layered_yaml`] but reads YAML directly from in-memory
/// strings instead of file paths. Used by tests and anywhere config
/// fragments are assembled programmatically rather than loaded from disk.
pub fn load_layered_yaml_from_strings(docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for doc in docs {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(doc).context("parse yaml doc")?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    scan_for_secrets(&merged, String::new())?;

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

// ---------------------------------------------------------------------------
// Unused-key reporting
// ---------------------------------------------------------------------------

/// Run mode a config is being loaded for. Governs which JSON pointers are
/// considered "consumed" and therefore exempt from unused-key reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    Backtest,
    Paper,
    Live,
}

fn consumed_pointers(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        ConfigMode::Backtest => BACKTEST_CONSUMED,
        ConfigMode::Paper => PAPER_CONSUMED,
        ConfigMode::Live => LIVE_CONSUMED,
    }
}

static BACKTEST_CONSUMED: &[&str] = &[
    "/engine/engine_id",
    "/broker/keys_env",
    "/risk/max_gross_exposure",
];

static PAPER_CONSUMED: &[&str] = &[
    "/engine/engine_id",
    "/broker/keys_env",
    "/risk/max_gross_exposure",
];

static LIVE_CONSUMED: &[&str] = &[
    "/engine/engine_id",
    "/broker/keys_env",
    "/risk/max_gross_exposure",
    "/integrity",
    "/reconcile",
];

/// What to do when unused keys are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

/// Result of scanning a config for leaf keys not covered by the mode's
/// consumed-pointer registry.
#[derive(Debug, Clone)]
pub struct UnusedKeyReport {
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Walk every leaf in `config_json` and flag pointers not covered by any
/// prefix in `mode`'s consumed-pointer registry. A pointer is "covered" if it
/// equals, or is nested under, one of the registered prefixes — registering
/// `/risk/max_gross_exposure` covers that exact leaf but not its sibling
/// `/risk/max_gross_exposure_extra`.
///
/// Under [`UnusedKeyPolicy::Fail`], a non-empty report is turned into an
/// `Err` whose message contains `CONFIG_UNUSED_KEYS`.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed = consumed_pointers(mode);
    let mut unused = Vec::new();
    collect_unused_leaves(config_json, String::new(), consumed, &mut unused);
    unused.sort();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        anyhow::bail!(
            "CONFIG_UNUSED_KEYS: {} unused leaf key(s): {}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.join(", ")
        );
    }

    Ok(report)
}

fn is_covered(pointer: &str, consumed: &[&str]) -> bool {
    consumed
        .iter()
        .any(|c| pointer == *c || pointer.starts_with(&format!("{c}/")))
}

fn collect_unused_leaves(v: &Value, pointer: String, consumed: &[&str], out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                let child_pointer = format!("{pointer}/{k}");
                if is_covered(&child_pointer, consumed) {
                    continue;
                }
                collect_unused_leaves(child, child_pointer, consumed, out);
            }
        }
        _ => {
            if !pointer.is_empty() {
                out.push(pointer);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Secret-literal exclusion
// ---------------------------------------------------------------------------

/// Config YAML must hold only env var NAMES for credentials (see [`secrets`]),
/// never the credential values themselves. Reject any merged config that
/// contains a string matching a known secret-literal shape, wherever it
/// appears in the tree.
fn scan_for_secrets(v: &Value, pointer: String) -> Result<()> {
    match v {
        Value::String(s) => {
            if looks_like_secret(s) {
                anyhow::bail!("CONFIG_SECRET_DETECTED: literal secret value found at {pointer}");
            }
        }
        Value::Object(map) => {
            for (k, child) in map {
                scan_for_secrets(child, format!("{pointer}/{k}"))?;
            }
        }
        Value::Array(arr) => {
            for (i, child) in arr.iter().enumerate() {
                scan_for_secrets(child, format!("{pointer}/{i}"))?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    s.starts_with("sk-")
        || s.starts_with("sk_")
        || s.starts_with("AKIA")
        || s.starts_with("ASIA")
        || s.contains("-----BEGIN")
        || s.contains("PRIVATE KEY")
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting compact JSON.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}
