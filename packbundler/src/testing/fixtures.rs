//! Canned npm behavior for driving a [`ScriptedRuntime`] through a full run.

use serde_json::{json, Value};

use super::mocks::{ScriptedResponse, ScriptedRuntime};
use crate::core::PackageRequest;

/// Archive filename npm pack produces for `name@version`.
///
/// Scoped names drop the `@` and join scope and name with `-`.
#[must_use]
pub fn tarball_name(name: &str, version: &str) -> String {
    let flat = name.trim_start_matches('@').replace('/', "-");
    format!("{flat}-{version}.tgz")
}

/// A representative installed manifest with lifecycle scripts and dependencies.
#[must_use]
pub fn sample_manifest(name: &str, version: &str) -> Value {
    json!({
        "name": name,
        "version": version,
        "main": "index.js",
        "scripts": {
            "test": "node test.js",
            "prepare": "node build.js",
            "postinstall": "node setup.js"
        },
        "dependencies": {
            "dep-a": "^1.0.0",
            "dep-b": "^2.0.0"
        }
    })
}

/// A lockfile for the workspace after installing `name@version`.
///
/// Four packages, three unique name@version pairs, nested two levels deep.
#[must_use]
pub fn sample_lockfile(name: &str, version: &str) -> Value {
    json!({
        "name": "workspace",
        "lockfileVersion": 3,
        "packages": {
            "": { "name": "workspace" },
            (format!("node_modules/{name}")): { "version": version },
            "node_modules/dep-a": { "version": "1.2.0" },
            "node_modules/dep-b": { "version": "2.0.1" },
            (format!("node_modules/{name}/node_modules/dep-a")): { "version": "1.2.0" }
        }
    })
}

/// Scripts every command of a successful run for `request`.
///
/// Install writes `manifest` as the installed package.json plus
/// [`sample_lockfile`]; pack writes `tarball` and prints npm's notice
/// followed by the bare filename. Returns the archive filename.
pub fn script_npm_success(
    runtime: &ScriptedRuntime,
    request: &PackageRequest,
    manifest: &Value,
    tarball: &[u8],
) -> String {
    let archive = tarball_name(&request.name, &request.version);
    let spec = request.install_spec();
    let package_dir = format!("node_modules/{}", request.name);

    runtime
        .script(
            ScriptedResponse::new("npm", &["init", "-y"])
                .stdout("Wrote to package.json")
                .writes("package.json", r#"{"name":"workspace","version":"1.0.0"}"#),
        )
        .script(
            ScriptedResponse::new("npm", &["install", spec.as_str()])
                .stdout("added 4 packages in 1s\n")
                .writes(format!("{package_dir}/package.json"), manifest.to_string())
                .writes(
                    "package-lock.json",
                    sample_lockfile(&request.name, &request.version).to_string(),
                ),
        )
        .script(ScriptedResponse::new("node", &["-v"]).stdout("v20.11.0\n"))
        .script(ScriptedResponse::new("npm", &["-v"]).stdout("10.2.4\n"))
        .script(
            ScriptedResponse::new("npm", &["pack"])
                .stdout(format!("npm notice filename: {archive}\n{archive}\n"))
                .writes(archive.clone(), tarball.to_vec()),
        );

    archive
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tarball_name_flattens_scope() {
        assert_eq!(tarball_name("left-pad", "1.3.0"), "left-pad-1.3.0.tgz");
        assert_eq!(tarball_name("@scope/pkg", "2.0.0"), "scope-pkg-2.0.0.tgz");
    }

    #[test]
    fn test_sample_lockfile_keys() {
        let lock = sample_lockfile("foo", "1.0.0");
        let packages = lock["packages"].as_object().unwrap();
        assert!(packages.contains_key("node_modules/foo"));
        assert!(packages.contains_key("node_modules/foo/node_modules/dep-a"));
    }
}
