use std::fs;
use std::path::PathBuf;

use pymutor::config::Config;
use pymutor::copy_tree::{build_mutated_tree, walk_all_files, walk_source_files};
use pymutor::records::SourceFileRecord;
use tempfile::TempDir;

fn project_config(root: &TempDir) -> Config {
    Config {
        root: root.path().to_path_buf(),
        paths_to_mutate: vec![PathBuf::from("src")],
        do_not_mutate: vec![],
        also_copy: vec![PathBuf::from("tests"), PathBuf::from("pyproject.toml")],
        max_children: 2,
        debug: false,
        python: "python3".into(),
        mutants_dir: root.path().join("mutants"),
    }
}

fn write_project(root: &TempDir) {
    let base = root.path();
    fs::create_dir_all(base.join("src/pkg")).unwrap();
    fs::write(
        base.join("src/pkg/rules.py"),
        "def check(x):\n    return x > 0\n",
    )
    .unwrap();
    fs::write(base.join("src/pkg/__init__.py"), "").unwrap();
    fs::write(base.join("src/pkg/data.json"), "{}\n").unwrap();
    fs::create_dir_all(base.join("tests")).unwrap();
    fs::write(
        base.join("tests/test_rules.py"),
        "def test_check():\n    assert check(1)\n",
    )
    .unwrap();
    fs::write(base.join("pyproject.toml"), "[project]\nname = \"demo\"\n").unwrap();
}

// --- tree building ---

#[test]
fn mutates_python_and_copies_the_rest_verbatim() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);
    let config = project_config(&dir);

    let summary = build_mutated_tree(&config).unwrap();

    assert_eq!(summary.files_mutated, 2);
    assert_eq!(summary.files_copied, 1);
    assert!(summary.mutants_generated > 0);

    let mutated = fs::read_to_string(config.mutants_dir.join("src/pkg/rules.py")).unwrap();
    assert!(mutated.contains("def x_check__orig(x):"));
    assert!(mutated.contains("_mutation_trampoline"));

    // Non-Python files arrive untouched.
    let data = fs::read_to_string(config.mutants_dir.join("src/pkg/data.json")).unwrap();
    assert_eq!(data, "{}\n");

    // The original tree is pristine.
    let original = fs::read_to_string(dir.path().join("src/pkg/rules.py")).unwrap();
    assert_eq!(original, "def check(x):\n    return x > 0\n");
}

#[test]
fn writes_a_record_per_mutated_file() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);
    let config = project_config(&dir);

    build_mutated_tree(&config).unwrap();

    let record =
        SourceFileRecord::load(std::path::Path::new("src/pkg/rules.py"), &config.mutants_dir)
            .unwrap();
    assert!(!record.exit_code_by_key.is_empty());
    assert!(record.exit_code_by_key.values().all(Option::is_none));
    assert!(
        record
            .exit_code_by_key
            .keys()
            .all(|k| k.starts_with("pkg.rules.x_check__mutant_"))
    );
}

#[test]
fn copies_also_copy_entries_and_support_modules() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);
    let config = project_config(&dir);

    build_mutated_tree(&config).unwrap();

    assert!(config.mutants_dir.join("tests/test_rules.py").exists());
    assert!(config.mutants_dir.join("pyproject.toml").exists());
    assert!(config.mutants_dir.join("_mutation_registry.py").exists());
    assert!(config.mutants_dir.join("_mutation_plugin.py").exists());

    let plugin = fs::read_to_string(config.mutants_dir.join("_mutation_plugin.py")).unwrap();
    assert!(plugin.contains("pytest_runtest_teardown"));
    assert!(plugin.contains("MUTATION_EVENTS_FILE"));
}

#[test]
fn regeneration_preserves_prior_results() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);
    let config = project_config(&dir);

    build_mutated_tree(&config).unwrap();
    let mut record =
        SourceFileRecord::load(std::path::Path::new("src/pkg/rules.py"), &config.mutants_dir)
            .unwrap();
    let key = record.exit_code_by_key.keys().next().unwrap().clone();
    record.register_result(&key, 1).unwrap();

    // Second pass over unchanged sources: identities line up, results stay.
    build_mutated_tree(&config).unwrap();
    let reloaded =
        SourceFileRecord::load(std::path::Path::new("src/pkg/rules.py"), &config.mutants_dir)
            .unwrap();
    assert_eq!(reloaded.exit_code_by_key[&key], Some(1));
}

#[test]
fn skips_caches_and_vcs_dirs() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);
    let base = dir.path();
    fs::create_dir_all(base.join("src/__pycache__")).unwrap();
    fs::write(base.join("src/__pycache__/junk.pyc"), "junk").unwrap();
    fs::create_dir_all(base.join("src/.git")).unwrap();
    fs::write(base.join("src/.git/HEAD"), "ref").unwrap();
    let config = project_config(&dir);

    build_mutated_tree(&config).unwrap();

    assert!(!config.mutants_dir.join("src/__pycache__").exists());
    assert!(!config.mutants_dir.join("src/.git").exists());
}

// --- walking ---

#[test]
fn walks_are_deterministic_and_relative() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);
    let config = project_config(&dir);

    let all = walk_all_files(&config).unwrap();
    assert_eq!(
        all,
        vec![
            PathBuf::from("src/pkg/__init__.py"),
            PathBuf::from("src/pkg/data.json"),
            PathBuf::from("src/pkg/rules.py"),
        ]
    );

    let sources = walk_source_files(&config).unwrap();
    assert_eq!(
        sources,
        vec![
            PathBuf::from("src/pkg/__init__.py"),
            PathBuf::from("src/pkg/rules.py"),
        ]
    );
}

#[test]
fn do_not_mutate_files_are_copied_verbatim() {
    let dir = TempDir::new().unwrap();
    write_project(&dir);
    let mut config = project_config(&dir);
    config.do_not_mutate = vec!["*rules*".to_string()];

    build_mutated_tree(&config).unwrap();

    let copied = fs::read_to_string(config.mutants_dir.join("src/pkg/rules.py")).unwrap();
    assert_eq!(copied, "def check(x):\n    return x > 0\n");
}
