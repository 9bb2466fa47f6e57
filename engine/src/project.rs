//! Project profiling: manifest parsing, framework inference, and a
//! breadth-1 directory structure scan.
//!
//! Results are cached by absolute root for the lifetime of the process
//! (mirroring `core/project.py`'s module-global cache), invalidated only
//! when [`clear_project_cache`] is called or the active [`crate::config::AnalyzerConfig`]
//! hash changes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use lazy_static::lazy_static;
use regex::Regex;
use walkdir::WalkDir;

use crate::types::ProjectProfile;

/// Directories never descended into during the structure scan.
const SKIP_DIRS: &[&str] = &[
    ".git", ".hg", ".svn", "node_modules", "__pycache__", ".venv", "venv",
    "target", "dist", "build", ".tox", ".mypy_cache", ".pytest_cache", ".next",
];

/// Conventional entry-point filenames, checked in order.
const ENTRY_POINTS: &[&str] = &[
    "main.py", "app.py", "__main__.py", "manage.py", "index.js", "index.ts",
    "main.go", "main.rs", "Main.java",
];

/// Files that mark configuration/build tooling, reported verbatim if present.
const CONFIG_FILES: &[&str] = &[
    "Dockerfile", "docker-compose.yml", ".github/workflows", "Makefile",
    "tsconfig.json", "pytest.ini", "pyproject.toml", ".env.example",
];

lazy_static! {
    static ref CARGO_DEP_RE: Regex = Regex::new(r#"(?m)^([A-Za-z0-9_-]+)\s*=\s*"([^"]+)""#).unwrap();
    static ref GO_REQUIRE_RE: Regex = Regex::new(r#"(?m)^\s*([^\s]+)\s+v([0-9][^\s]*)"#).unwrap();
    static ref PY_REQUIREMENT_RE: Regex =
        Regex::new(r#"(?m)^([A-Za-z0-9_.-]+)\s*(?:[=<>!~]+\s*([0-9][^\s,;]*))?"#).unwrap();

    static ref FRAMEWORK_MARKERS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("django", "Django");
        m.insert("flask", "Flask");
        m.insert("fastapi", "FastAPI");
        m.insert("react", "React");
        m.insert("next", "Next.js");
        m.insert("vue", "Vue");
        m.insert("express", "Express");
        m.insert("actix-web", "Actix Web");
        m.insert("axum", "Axum");
        m.insert("rocket", "Rocket");
        m.insert("gin-gonic/gin", "Gin");
        m.insert("spring-boot-starter", "Spring Boot");
        m.insert("hardhat", "Hardhat");
        m.insert("foundry", "Foundry");
        m
    };

    static ref PROJECT_CACHE: Mutex<HashMap<String, ProjectProfile>> = Mutex::new(HashMap::new());
}

/// Return the cached profile for `root`, scanning and caching it if absent.
pub fn get_project_profile(root: &Path) -> ProjectProfile {
    let key = root.to_string_lossy().into_owned();
    if let Some(cached) = PROJECT_CACHE.lock().unwrap().get(&key) {
        return cached.clone();
    }
    let profile = scan_project(root);
    PROJECT_CACHE.lock().unwrap().insert(key, profile.clone());
    profile
}

/// Drop all cached profiles, forcing the next lookup to rescan.
pub fn clear_project_cache() {
    PROJECT_CACHE.lock().unwrap().clear();
}

/// Scan `root` for manifests, frameworks, entry points, and structure.
///
/// Never caches on its own; callers needing the process-lifetime cache
/// should use [`get_project_profile`] instead.
pub fn scan_project(root: &Path) -> ProjectProfile {
    let mut profile = ProjectProfile {
        root: root.to_string_lossy().into_owned(),
        name: root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        ..Default::default()
    };

    let mut languages = Vec::new();
    let mut deps = HashMap::new();
    let mut dev_deps = HashMap::new();

    if let Some(reqs) = read(root, "requirements.txt") {
        languages.push("python".to_owned());
        profile.package_manager.get_or_insert("pip".to_owned());
        parse_requirements_txt(&reqs, &mut deps);
    }
    if let Some(pyproject) = read(root, "pyproject.toml") {
        languages.push("python".to_owned());
        if root.join("poetry.lock").is_file() {
            profile.package_manager = Some("poetry".to_owned());
        } else if root.join("Pipfile").is_file() {
            profile.package_manager = Some("pipenv".to_owned());
        } else {
            profile.package_manager.get_or_insert("pip".to_owned());
        }
        parse_pyproject_toml(&pyproject, &mut deps, &mut dev_deps);
    }
    if let Some(package_json) = read(root, "package.json") {
        languages.push(if root.join("tsconfig.json").is_file() { "typescript" } else { "javascript" }.to_owned());
        profile.package_manager = Some(detect_node_lockfile(root));
        parse_package_json(&package_json, &mut deps, &mut dev_deps);
    }
    if let Some(cargo_toml) = read(root, "Cargo.toml") {
        languages.push("rust".to_owned());
        profile.package_manager.get_or_insert("cargo".to_owned());
        parse_cargo_toml(&cargo_toml, &mut deps, &mut dev_deps);
    }
    if let Some(go_mod) = read(root, "go.mod") {
        languages.push("go".to_owned());
        profile.package_manager.get_or_insert("go modules".to_owned());
        parse_go_mod(&go_mod, &mut deps);
    }
    if root.join("pom.xml").is_file() {
        languages.push("jvm".to_owned());
        profile.package_manager.get_or_insert("maven".to_owned());
    } else if root.join("build.gradle").is_file() || root.join("build.gradle.kts").is_file() {
        languages.push("jvm".to_owned());
        profile.package_manager.get_or_insert("gradle".to_owned());
    }
    if has_solidity_file(root) {
        languages.push("solidity".to_owned());
        profile.package_manager = Some(detect_solidity_tooling(root));
    }

    let combined: Vec<&String> = deps.keys().chain(dev_deps.keys()).collect();
    profile.frameworks = combined
        .iter()
        .filter_map(|dep| FRAMEWORK_MARKERS.get(dep.to_lowercase().as_str()))
        .map(|s| (*s).to_owned())
        .collect();
    profile.frameworks.sort();
    profile.frameworks.dedup();

    profile.languages = languages;
    profile.deps = deps;
    profile.dev_deps = dev_deps;
    profile.entry_points = detect_entry_points(root);
    profile.config_files = detect_configs(root);
    profile.structure = scan_structure(root);

    profile
}

fn read(root: &Path, name: &str) -> Option<String> {
    fs::read_to_string(root.join(name)).ok()
}

fn parse_requirements_txt(content: &str, deps: &mut HashMap<String, String>) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        if let Some(c) = PY_REQUIREMENT_RE.captures(line) {
            deps.insert(c[1].to_owned(), c.get(2).map_or_else(String::new, |m| m.as_str().to_owned()));
        }
    }
}

fn parse_pyproject_toml(content: &str, deps: &mut HashMap<String, String>, dev_deps: &mut HashMap<String, String>) {
    if let Ok(value) = content.parse::<toml::Value>() {
        if let Some(table) = value.get("project").and_then(|p| p.get("dependencies")).and_then(|d| d.as_array()) {
            for dep in table.iter().filter_map(|v| v.as_str()) {
                if let Some(c) = PY_REQUIREMENT_RE.captures(dep) {
                    deps.insert(c[1].to_owned(), c.get(2).map_or_else(String::new, |m| m.as_str().to_owned()));
                }
            }
        }
        if let Some(table) = value
            .get("tool")
            .and_then(|t| t.get("poetry"))
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_table())
        {
            for (name, v) in table {
                if name == "python" {
                    continue;
                }
                let version = v.as_str().map(str::to_owned).unwrap_or_default();
                deps.insert(name.clone(), version);
            }
        }
        if let Some(table) = value
            .get("tool")
            .and_then(|t| t.get("poetry"))
            .and_then(|p| p.get("group"))
            .and_then(|g| g.get("dev"))
            .and_then(|d| d.get("dependencies"))
            .and_then(|d| d.as_table())
        {
            for (name, v) in table {
                dev_deps.insert(name.clone(), v.as_str().map(str::to_owned).unwrap_or_default());
            }
        }
    }
}

fn parse_package_json(content: &str, deps: &mut HashMap<String, String>, dev_deps: &mut HashMap<String, String>) {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(content) {
        extract_json_deps(&value, "dependencies", deps);
        extract_json_deps(&value, "devDependencies", dev_deps);
    }
}

fn extract_json_deps(value: &serde_json::Value, key: &str, out: &mut HashMap<String, String>) {
    if let Some(obj) = value.get(key).and_then(|d| d.as_object()) {
        for (name, version) in obj {
            out.insert(name.clone(), version.as_str().unwrap_or_default().to_owned());
        }
    }
}

fn parse_cargo_toml(content: &str, deps: &mut HashMap<String, String>, dev_deps: &mut HashMap<String, String>) {
    if let Ok(value) = content.parse::<toml::Value>() {
        if let Some(table) = value.get("dependencies").and_then(|d| d.as_table()) {
            for (name, v) in table {
                deps.insert(name.clone(), cargo_dep_version(v));
            }
        }
        if let Some(table) = value.get("dev-dependencies").and_then(|d| d.as_table()) {
            for (name, v) in table {
                dev_deps.insert(name.clone(), cargo_dep_version(v));
            }
        }
    }
}

fn cargo_dep_version(v: &toml::Value) -> String {
    v.as_str().map(str::to_owned).unwrap_or_else(|| {
        v.get("version").and_then(|s| s.as_str()).unwrap_or("*").to_owned()
    })
}

fn parse_go_mod(content: &str, deps: &mut HashMap<String, String>) {
    let mut in_require = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("require (") {
            in_require = true;
            continue;
        }
        if in_require && trimmed == ")" {
            in_require = false;
            continue;
        }
        let candidate = if in_require {
            trimmed
        } else if let Some(rest) = trimmed.strip_prefix("require ") {
            rest
        } else {
            continue;
        };
        if let Some(c) = GO_REQUIRE_RE.captures(candidate) {
            deps.insert(c[1].to_owned(), c[2].to_owned());
        }
    }
}

fn has_solidity_file(root: &Path) -> bool {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e.file_name().to_str().unwrap_or("")))
        .flatten()
        .any(|e| e.path().extension().is_some_and(|ext| ext == "sol"))
}

fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

fn detect_node_lockfile(root: &Path) -> String {
    if root.join("bun.lockb").is_file() {
        "bun".to_owned()
    } else if root.join("pnpm-lock.yaml").is_file() {
        "pnpm".to_owned()
    } else if root.join("yarn.lock").is_file() {
        "yarn".to_owned()
    } else {
        "npm".to_owned()
    }
}

fn detect_solidity_tooling(root: &Path) -> String {
    if root.join("hardhat.config.js").is_file() || root.join("hardhat.config.ts").is_file() {
        "hardhat".to_owned()
    } else if root.join("foundry.toml").is_file() {
        "foundry".to_owned()
    } else if root.join("truffle-config.js").is_file() {
        "truffle".to_owned()
    } else {
        "unknown".to_owned()
    }
}

fn detect_entry_points(root: &Path) -> Vec<String> {
    let mut found: Vec<String> = ENTRY_POINTS.iter().filter(|name| root.join(name).is_file()).map(|s| (*s).to_owned()).collect();

    if let Some(package_json) = read(root, "package.json") {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&package_json) {
            if let Some(main) = value.get("main").and_then(|m| m.as_str()) {
                found.push(main.to_owned());
            }
            if let Some(start) = value.get("scripts").and_then(|s| s.get("start")).and_then(|s| s.as_str()) {
                found.push(format!("npm start -> {start}"));
            }
        }
    }
    found
}

fn detect_configs(root: &Path) -> Vec<String> {
    CONFIG_FILES.iter().filter(|name| root.join(name).exists()).map(|s| (*s).to_owned()).collect()
}

/// Breadth-1 scan: for each top-level entry, report `"file"` or `"<n> files"`.
fn scan_structure(root: &Path) -> HashMap<String, String> {
    let mut structure = HashMap::new();
    let Ok(entries) = fs::read_dir(root) else {
        return structure;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_skipped_dir(&name) {
            continue;
        }
        let path = entry.path();
        if path.is_file() {
            structure.insert(name, "file".to_owned());
        } else if path.is_dir() {
            let count = WalkDir::new(&path)
                .into_iter()
                .filter_entry(|e| !is_skipped_dir(e.file_name().to_str().unwrap_or("")))
                .flatten()
                .filter(|e| e.file_type().is_file())
                .count();
            structure.insert(name, format!("{count} files"));
        }
    }
    structure
}
