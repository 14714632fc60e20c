use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use vesta_classfile::flags::{ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC, ACC_SUPER};
use vesta_classfile::{write_class, ClassFile};
use vesta_source::{SourceClassLoader, SourceError, PRELOAD_MANIFEST};

fn class(name: &str, super_class: &str, interfaces: &[&str]) -> ClassFile {
    ClassFile {
        minor_version: 0,
        major_version: 52,
        access_flags: ACC_PUBLIC | ACC_SUPER,
        this_class: name.to_string(),
        super_class: Some(super_class.to_string()),
        interfaces: interfaces.iter().map(|i| i.to_string()).collect(),
        fields: Vec::new(),
        methods: Vec::new(),
        source_file: None,
        inner_classes: Vec::new(),
        annotations: Vec::new(),
    }
}

fn interface(name: &str) -> ClassFile {
    let mut class = class(name, "java/lang/Object", &[]);
    class.access_flags = ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT;
    class
}

fn write_class_file(root: &Path, class: &ClassFile) {
    let path = root.join(format!("{}.class", class.this_class));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, write_class(class).unwrap()).unwrap();
}

fn write_jar(path: &Path, classes: &[&ClassFile], extra_entries: &[&str]) {
    let file = std::fs::File::create(path).unwrap();
    let mut jar = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for class in classes {
        jar.start_file(format!("{}.class", class.this_class), options)
            .unwrap();
        jar.write_all(&write_class(class).unwrap()).unwrap();
    }
    for entry in extra_entries {
        jar.start_file(entry.to_string(), options).unwrap();
        jar.write_all(b"").unwrap();
    }
    jar.finish().unwrap();
}

#[test]
fn loads_classes_from_directories_and_jars() {
    let dir = tempfile::tempdir().unwrap();
    write_class_file(dir.path(), &class("com/example/A", "java/lang/Object", &[]));

    let jar_path = dir.path().join("lib.jar");
    write_jar(
        &jar_path,
        &[&class("com/example/C", "java/lang/Object", &[])],
        &[],
    );

    let loader =
        SourceClassLoader::new([dir.path().to_path_buf(), jar_path]).unwrap();
    assert!(loader.load_class_bytes("com/example/A").is_ok());
    assert!(loader.load_class_bytes("com/example/C").is_ok());

    let missing = loader.load_class_bytes("com/example/Missing").unwrap_err();
    match missing {
        SourceError::ClassNotFound(name) => assert_eq!(name, "com.example.Missing"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn parent_sources_win() {
    let parent_dir = tempfile::tempdir().unwrap();
    let child_dir = tempfile::tempdir().unwrap();
    // Same class name, distinguishable by the declared super.
    write_class_file(
        parent_dir.path(),
        &class("com/example/A", "java/lang/Object", &[]),
    );
    write_class_file(
        child_dir.path(),
        &class("com/example/A", "com/example/Shadow", &[]),
    );

    let parent = Arc::new(SourceClassLoader::new([parent_dir.path().to_path_buf()]).unwrap());
    let loader =
        SourceClassLoader::with_parent(Some(parent), [child_dir.path().to_path_buf()]).unwrap();

    let header = loader.load_class_header("com/example/A").unwrap();
    assert_eq!(header.super_class.as_deref(), Some("java/lang/Object"));
}

#[test]
fn headers_support_assignability_walks() {
    let dir = tempfile::tempdir().unwrap();
    write_class_file(dir.path(), &interface("com/example/I"));
    write_class_file(dir.path(), &class("com/example/A", "java/lang/Object", &[]));
    write_class_file(
        dir.path(),
        &class("com/example/B", "com/example/A", &["com/example/I"]),
    );
    write_class_file(
        dir.path(),
        &class("com/example/Oops", "java/lang/Throwable", &[]),
    );

    let loader = SourceClassLoader::new([dir.path().to_path_buf()]).unwrap();
    assert!(loader
        .is_assignable_from("com/example/A", "com/example/B")
        .unwrap());
    assert!(loader
        .is_assignable_from("com/example/I", "com/example/B")
        .unwrap());
    assert!(!loader
        .is_assignable_from("com/example/B", "com/example/A")
        .unwrap());
    assert!(loader.is_throwable("com/example/Oops").unwrap());
    assert!(!loader.is_throwable("com/example/A").unwrap());
}

#[test]
fn preload_manifest_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let plain_jar = dir.path().join("plain.jar");
    let preload_jar = dir.path().join("preload.jar");
    write_jar(
        &plain_jar,
        &[&class("com/example/P", "java/lang/Object", &[])],
        &[],
    );
    write_jar(
        &preload_jar,
        &[&class("com/example/Q", "java/lang/Object", &[])],
        &[PRELOAD_MANIFEST],
    );

    let loader = SourceClassLoader::new([plain_jar, preload_jar.clone()]).unwrap();
    let marked = loader.preload_sources();
    assert_eq!(marked.len(), 1);
    assert_eq!(marked[0].path(), preload_jar);
    assert_eq!(marked[0].class_names().unwrap(), vec!["com/example/Q"]);
}

#[test]
fn closed_archives_reopen_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    let jar_path = dir.path().join("lib.jar");
    write_jar(
        &jar_path,
        &[&class("com/example/C", "java/lang/Object", &[])],
        &[],
    );

    let loader = SourceClassLoader::new([jar_path]).unwrap();
    assert!(loader.load_class_bytes("com/example/C").is_ok());
    loader.close();
    assert!(loader.load_class_bytes("com/example/C").is_ok());
}
