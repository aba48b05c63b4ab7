//! End-to-end builds through the `pressroom` binary.
//!
//! Each test runs the binary with its working directory set to a fresh temp
//! dir, so the default `.pressroom-cache` lands there and parallel builds use
//! real `render-worker` child processes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const CACHE_DIR: &str = ".pressroom-cache";

fn pressroom(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pressroom"))
        .args(args)
        .current_dir(cwd)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn assert_success(out: &Output) {
    assert!(
        out.status.success(),
        "pressroom failed ({:?}):\nstdout: {}\nstderr: {}",
        out.status.code(),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
}

fn write(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

/// Three sources: two blog entries and a standalone page using a second
/// layout.
fn write_site(root: &Path) {
    let content = root.join("content");
    write(&content.join("config.yaml"), "title: Press Test\n");
    write(&content.join("blog/_collection.yaml"), "title: Blog\n");
    write(
        &content.join("blog/2024-01-10-first.md"),
        "---\ntitle: First Post\n---\nHello *world*.\n",
    );
    write(
        &content.join("blog/2024-02-20-second.md"),
        "---\ntitle: Second Post\ntags: [rust, web]\n---\n## Part\n\n```rust\nfn main() {}\n```\n",
    );
    write(
        &content.join("about.md"),
        "---\ntitle: About\nlayout: page\n---\nAbout this site.\n",
    );
    write(
        &content.join("templates/entry.html"),
        "<html><head><title>{{ title }}</title></head><body>{{ content }}</body></html>\n",
    );
    write(
        &content.join("templates/page.html"),
        "<html><body class=\"page\"><h1>{{ title }}</h1>{{ content }}</body></html>\n",
    );
}

/// Every file under `dir`, keyed by its path relative to `dir`.
fn read_tree(dir: &Path) -> BTreeMap<PathBuf, String> {
    let mut files = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for item in fs::read_dir(&current).unwrap() {
            let path = item.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let rel = path.strip_prefix(dir).unwrap().to_path_buf();
                files.insert(rel, fs::read_to_string(&path).unwrap());
            }
        }
    }
    files
}

/// The single manifest under the cache dir, parsed as a JSON object.
fn read_manifest(cache: &Path) -> serde_json::Map<String, serde_json::Value> {
    let manifests: Vec<PathBuf> = fs::read_dir(cache)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("build-manifest-"))
        })
        .collect();
    assert_eq!(manifests.len(), 1, "expected one manifest in {}", cache.display());
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&manifests[0]).unwrap()).unwrap();
    json.as_object().unwrap().clone()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

// =========================================================================
// Parallel builds
// =========================================================================

#[test]
fn three_sources_four_workers() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path());

    let out = pressroom(tmp.path(), &["build", "-c", "content", "-o", "output", "-w", "4"]);
    assert_success(&out);

    let tree = read_tree(&tmp.path().join("output"));
    let paths: Vec<&str> = tree.keys().map(|p| p.to_str().unwrap()).collect();
    assert_eq!(
        paths,
        vec!["about/index.html", "blog/first/index.html", "blog/second/index.html"]
    );
    assert!(tree[Path::new("about/index.html")].contains("class=\"page\""));
    assert!(tree[Path::new("blog/first/index.html")].contains("<em>world</em>"));

    assert!(tree[Path::new("blog/second/index.html")].contains("<pre style="));

    let manifest = read_manifest(&tmp.path().join(CACHE_DIR));
    assert_eq!(manifest.len(), 3);
    assert!(manifest.keys().all(|k| k.ends_with(".md")));

    let cached = fs::read_dir(tmp.path().join(CACHE_DIR).join("render"))
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().is_file())
        .count();
    assert_eq!(cached, 3);
}

#[test]
fn worker_count_does_not_change_output() {
    let mut trees = Vec::new();
    for workers in ["1", "2", "8"] {
        let tmp = TempDir::new().unwrap();
        write_site(tmp.path());
        let out = pressroom(tmp.path(), &["build", "-c", "content", "-o", "output", "-w", workers]);
        assert_success(&out);
        trees.push(read_tree(&tmp.path().join("output")));
    }
    assert_eq!(trees[0].len(), 3);
    assert_eq!(trees[0], trees[1]);
    assert_eq!(trees[0], trees[2]);
}

// =========================================================================
// Incremental rebuilds
// =========================================================================

#[test]
fn second_build_is_up_to_date() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path());
    assert_success(&pressroom(tmp.path(), &["build", "-c", "content", "-o", "output"]));

    let out = pressroom(tmp.path(), &["build", "-c", "content", "-o", "output"]);
    assert_success(&out);
    assert!(stdout(&out).contains("No changes detected (3 pages up to date)"), "{}", stdout(&out));
}

#[test]
fn edited_entry_rebuilds_alone() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path());
    assert_success(&pressroom(tmp.path(), &["build", "-c", "content", "-o", "output", "-w", "2"]));

    write(
        &tmp.path().join("content/blog/2024-01-10-first.md"),
        "---\ntitle: First Post\n---\nEdited.\n",
    );
    let out = pressroom(tmp.path(), &["build", "-c", "content", "-o", "output", "-w", "2"]);
    assert_success(&out);
    let text = stdout(&out);
    assert!(text.contains("Build (incremental)"), "{text}");
    assert!(text.contains("Written: 1 of 3 pages"), "{text}");

    let html = fs::read_to_string(tmp.path().join("output/blog/first/index.html")).unwrap();
    assert!(html.contains("Edited."));
}

#[test]
fn deleted_entry_removes_its_output() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path());
    assert_success(&pressroom(tmp.path(), &["build", "-c", "content", "-o", "output"]));

    fs::remove_file(tmp.path().join("content/blog/2024-02-20-second.md")).unwrap();
    let out = pressroom(tmp.path(), &["build", "-c", "content", "-o", "output"]);
    assert_success(&out);
    assert!(stdout(&out).contains("Removed: 1 stale output"), "{}", stdout(&out));
    assert!(!tmp.path().join("output/blog/second").exists());
    assert!(tmp.path().join("output/blog/first/index.html").exists());
}

#[test]
fn dry_run_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path());

    let out = pressroom(tmp.path(), &["build", "-c", "content", "-o", "output", "--dry-run"]);
    assert_success(&out);
    let text = stdout(&out);
    assert!(text.starts_with("Dry run (full)"), "{text}");
    assert!(text.contains("3 to write, 0 to remove"), "{text}");
    assert!(!tmp.path().join("output").exists());
}

// =========================================================================
// CLI surface
// =========================================================================

#[test]
fn missing_content_dir_exits_65() {
    let tmp = TempDir::new().unwrap();
    let out = pressroom(tmp.path(), &["build", "-c", "nowhere", "-o", "output"]);
    assert_eq!(out.status.code(), Some(65));
    assert!(String::from_utf8_lossy(&out.stderr).contains("content directory not found"));
}

#[test]
fn output_dir_over_content_is_refused() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path());
    let out = pressroom(tmp.path(), &["build", "--no-cache", "-c", "content", "-o", "."]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("would overwrite"));
    assert!(tmp.path().join("content/about.md").exists());
}

#[test]
fn clean_removes_output_and_cache() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path());
    assert_success(&pressroom(tmp.path(), &["build", "-c", "content", "-o", "output"]));
    assert!(tmp.path().join(CACHE_DIR).exists());

    let out = pressroom(tmp.path(), &["clean", "-o", "output"]);
    assert_success(&out);
    assert!(!tmp.path().join("output").exists());
    assert!(!tmp.path().join(CACHE_DIR).exists());
    assert!(tmp.path().join("content/about.md").exists());
}

#[test]
fn gen_config_prints_parseable_toml() {
    let tmp = TempDir::new().unwrap();
    let out = pressroom(tmp.path(), &["gen-config"]);
    assert_success(&out);
    let value: toml::Value = toml::from_str(&stdout(&out)).unwrap();
    assert_eq!(value["content_dir"].as_str(), Some("content"));
    assert_eq!(value["build"]["isolation"].as_str(), Some("process"));
}

#[test]
fn project_config_is_honoured() {
    let tmp = TempDir::new().unwrap();
    write_site(tmp.path());
    write(
        &tmp.path().join("pressroom.toml"),
        "output_dir = \"public\"\n\n[build]\nworkers = 2\ncache_dir = \"cache\"\n",
    );

    assert_success(&pressroom(tmp.path(), &["build"]));
    assert!(tmp.path().join("public/about/index.html").exists());
    assert_eq!(read_manifest(&tmp.path().join("cache")).len(), 3);
}
