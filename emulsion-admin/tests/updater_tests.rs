//! Offline integration test for the update pipeline
//!
//! Exercises archive verification, extraction, tree diffing, and the
//! staged apply together, without the network: the "release" is a local
//! zip built by the test.

use std::fs;
use std::io::Write;
use std::path::Path;

use emulsion_admin::updater::{
    plan_changes, sha256_file, unzip_to_dir, UpdateTransaction,
};

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn build_release_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

const PRESERVED: &[&str] = &[
    "media",
    "plugins",
    "backups",
    "emulsion.db",
    "emulsion.db-wal",
    "emulsion.db-shm",
    "config.toml",
    "update.lock",
];

#[test]
fn full_offline_update_round() {
    let tmp = tempfile::tempdir().unwrap();
    let install = tmp.path().join("install");

    // A v1 install with user data next to app files
    write_file(&install.join("emulsion-admin"), "binary-v1");
    write_file(&install.join("static/app.js"), "js-v1");
    write_file(&install.join("static/legacy.js"), "dead code");
    write_file(&install.join("media/album1/photo.jpg"), "precious photo");
    write_file(&install.join("emulsion.db"), "database");
    write_file(&install.join("config.toml"), "root_folder = '/srv'");

    // The v2 release archive
    let archive = tmp.path().join("release.zip");
    build_release_zip(
        &archive,
        &[
            ("emulsion-admin", "binary-v2"),
            ("static/app.js", "js-v2"),
            ("static/admin.css", "new styles"),
        ],
    );

    // Checksum is stable and verifiable
    let digest = sha256_file(&archive).unwrap();
    assert_eq!(digest.len(), 64);
    assert_eq!(sha256_file(&archive).unwrap(), digest);

    // Unpack and diff
    let unpack = tmp.path().join("unpacked");
    unzip_to_dir(&archive, &unpack).unwrap();

    let plan = plan_changes(&install, &unpack, PRESERVED).unwrap();
    assert_eq!(plan.copy.len(), 3); // binary + app.js changed, admin.css new
    assert_eq!(plan.remove, vec![std::path::PathBuf::from("static/legacy.js")]);

    // Staged apply
    let mut transaction = UpdateTransaction::new();
    for rel in &plan.copy {
        transaction
            .stage_file(&unpack.join(rel), &install.join(rel))
            .unwrap();
    }
    transaction.commit().unwrap();

    for rel in &plan.remove {
        fs::remove_file(install.join(rel)).unwrap();
    }

    // App files replaced
    assert_eq!(
        fs::read_to_string(install.join("emulsion-admin")).unwrap(),
        "binary-v2"
    );
    assert_eq!(
        fs::read_to_string(install.join("static/app.js")).unwrap(),
        "js-v2"
    );
    assert!(install.join("static/admin.css").is_file());
    assert!(!install.join("static/legacy.js").exists());

    // User data untouched
    assert_eq!(
        fs::read_to_string(install.join("media/album1/photo.jpg")).unwrap(),
        "precious photo"
    );
    assert_eq!(
        fs::read_to_string(install.join("emulsion.db")).unwrap(),
        "database"
    );
    assert_eq!(
        fs::read_to_string(install.join("config.toml")).unwrap(),
        "root_folder = '/srv'"
    );

    // No staging leftovers
    assert!(!install.join("emulsion-admin.new").exists());
    assert!(!install.join("emulsion-admin.old").exists());

    // Re-planning after the apply finds nothing to do
    let plan = plan_changes(&install, &unpack, PRESERVED).unwrap();
    assert!(plan.copy.is_empty());
    assert!(plan.remove.is_empty());
}
