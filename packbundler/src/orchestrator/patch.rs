//! Manifest rewrite applied between install and pack.
//!
//! Lifecycle hooks are replaced with no-op echoes and every runtime
//! dependency is declared as bundled, so pack embeds the installed tree
//! instead of leaving it for the consumer's registry to resolve.

use serde_json::{Map, Value};
use std::path::Path;

use crate::errors::BundleError;

/// Script fields overwritten before packing.
pub const LIFECYCLE_HOOKS: [&str; 6] = [
    "preinstall",
    "install",
    "postinstall",
    "prepare",
    "prepack",
    "postpack",
];

/// Returns the patched manifest.
///
/// Non-hook scripts are kept. `bundleDependencies` becomes the list of
/// `dependencies` keys in manifest order (empty when there are none).
pub fn patch_manifest(mut manifest: Value, path: &Path) -> Result<Value, BundleError> {
    let Some(object) = manifest.as_object_mut() else {
        return Err(BundleError::ManifestError {
            path: path.to_path_buf(),
            reason: "package.json is not a JSON object".to_string(),
        });
    };

    let scripts = object
        .entry("scripts")
        .or_insert_with(|| Value::Object(Map::new()));
    if !scripts.is_object() {
        *scripts = Value::Object(Map::new());
    }
    if let Value::Object(scripts) = scripts {
        for hook in LIFECYCLE_HOOKS {
            scripts.insert(hook.to_string(), Value::String(format!("echo skip-{hook}")));
        }
    }

    let bundled: Vec<Value> = object
        .get("dependencies")
        .and_then(Value::as_object)
        .map(|deps| deps.keys().cloned().map(Value::String).collect())
        .unwrap_or_default();
    object.insert("bundleDependencies".to_string(), Value::Array(bundled));

    Ok(manifest)
}

/// Serializes a manifest the way npm writes it: two-space indent, trailing newline.
pub fn render_manifest(manifest: &Value, path: &Path) -> Result<Vec<u8>, BundleError> {
    let mut bytes = serde_json::to_vec_pretty(manifest).map_err(|e| BundleError::ManifestError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn path() -> &'static Path {
        Path::new("/packy/run/node_modules/foo/package.json")
    }

    #[test]
    fn test_hooks_replaced_other_scripts_kept() {
        let patched = patch_manifest(
            json!({
                "name": "foo",
                "scripts": { "test": "jest", "postinstall": "node-gyp rebuild" }
            }),
            path(),
        )
        .unwrap();

        let scripts = &patched["scripts"];
        assert_eq!(scripts["test"], "jest");
        assert_eq!(scripts["postinstall"], "echo skip-postinstall");
        for hook in LIFECYCLE_HOOKS {
            assert_eq!(scripts[hook], format!("echo skip-{hook}"));
        }
    }

    #[test]
    fn test_bundle_dependencies_lists_dependency_names() {
        let patched = patch_manifest(
            json!({
                "name": "foo",
                "dependencies": { "zeta": "^1", "alpha": "^2" },
                "devDependencies": { "jest": "^29" }
            }),
            path(),
        )
        .unwrap();
        assert_eq!(patched["bundleDependencies"], json!(["zeta", "alpha"]));
    }

    #[test]
    fn test_missing_or_odd_fields_are_normalized() {
        let patched = patch_manifest(json!({ "name": "foo", "scripts": "oops" }), path()).unwrap();
        assert!(patched["scripts"].is_object());
        assert_eq!(patched["bundleDependencies"], json!([]));
    }

    #[test]
    fn test_existing_bundle_dependencies_overwritten() {
        let patched = patch_manifest(
            json!({ "bundleDependencies": ["stale"], "dependencies": { "a": "1" } }),
            path(),
        )
        .unwrap();
        assert_eq!(patched["bundleDependencies"], json!(["a"]));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = patch_manifest(json!(["not", "a", "manifest"]), path()).unwrap_err();
        assert!(matches!(err, BundleError::ManifestError { .. }));
        assert_eq!(err.stage_hint(), Some(crate::core::StageId::Patch));
    }

    #[test]
    fn test_render_has_trailing_newline() {
        let bytes = render_manifest(&json!({ "name": "foo" }), path()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\n  \"name\": \"foo\"\n}\n");
    }
}
