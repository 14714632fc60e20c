//! End-to-end loads through the sandbox configuration and loader, over
//! synthetic user classes and a synthetic deterministic-runtime bootstrap.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use vesta_cache::DirectoryCache;
use vesta_classfile::flags::{ACC_PUBLIC, ACC_STATIC, ACC_SUPER};
use vesta_classfile::{
    write_class, ClassFile, Code, Const, Insn, Method, Opcode,
};
use vesta_sandbox::{
    preload, SandboxClass, SandboxClassLoader, SandboxConfiguration, SandboxError,
};

fn simple_class(name: &str, super_class: &str, methods: Vec<Method>) -> ClassFile {
    ClassFile {
        minor_version: 0,
        major_version: 52,
        access_flags: ACC_PUBLIC | ACC_SUPER,
        this_class: name.to_string(),
        super_class: Some(super_class.to_string()),
        interfaces: Vec::new(),
        fields: Vec::new(),
        methods,
        source_file: None,
        inner_classes: Vec::new(),
        annotations: Vec::new(),
    }
}

fn void_method(name: &str, instructions: Vec<Insn>) -> Method {
    Method {
        access_flags: ACC_PUBLIC | ACC_STATIC,
        name: name.to_string(),
        descriptor: "()V".to_string(),
        exceptions: Vec::new(),
        code: Some(Code {
            max_stack: 4,
            max_locals: 4,
            instructions,
            handlers: Vec::new(),
        }),
        annotations: Vec::new(),
    }
}

fn write_class_file(root: &Path, class: &ClassFile) {
    let path = root.join(format!("{}.class", class.this_class));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, write_class(class).unwrap()).unwrap();
}

/// A minimal stand-in for the deterministic runtime: the templates every
/// rewritten class ends up referencing.
fn write_bootstrap(root: &Path) {
    for name in [
        "sandbox/java/lang/Object",
        "sandbox/java/lang/DJVM",
        "sandbox/java/lang/String",
        "sandbox/java/lang/Throwable",
        "sandbox/RuntimeCostAccounter",
    ] {
        write_class_file(root, &simple_class(name, "java/lang/Object", Vec::new()));
    }
}

fn hello_class() -> ClassFile {
    simple_class(
        "com/example/Hello",
        "java/lang/Object",
        vec![void_method(
            "greet",
            vec![
                Insn::Ldc(Const::String("hi".to_string())),
                Insn::Simple(Opcode::Pop),
                Insn::Simple(Opcode::Return),
            ],
        )],
    )
}

struct Fixture {
    _bootstrap: tempfile::TempDir,
    _user: tempfile::TempDir,
    config: Arc<SandboxConfiguration>,
}

fn fixture(classes: &[&ClassFile]) -> Fixture {
    let bootstrap = tempfile::tempdir().unwrap();
    write_bootstrap(bootstrap.path());
    let user = tempfile::tempdir().unwrap();
    for class in classes {
        write_class_file(user.path(), class);
    }
    let config = SandboxConfiguration::builder()
        .bootstrap_source(bootstrap.path())
        .user_source([user.path().to_path_buf()])
        .build()
        .unwrap();
    Fixture {
        _bootstrap: bootstrap,
        _user: user,
        config,
    }
}

fn expect_sandboxed(
    loader: &SandboxClassLoader,
    name: &str,
) -> Arc<vesta_sandbox::LoadedClass> {
    match loader.load_sandbox_class(name).unwrap() {
        SandboxClass::Sandboxed(loaded) => loaded,
        SandboxClass::Host(host) => panic!("{name} unexpectedly fell through to host {host}"),
    }
}

#[test]
fn loads_and_defines_a_rewritten_class() {
    let fixture = fixture(&[&hello_class()]);
    let loader = SandboxClassLoader::new(Arc::clone(&fixture.config));

    let loaded = expect_sandboxed(&loader, "sandbox.com.example.Hello");
    assert_eq!(loaded.name(), "sandbox/com/example/Hello");

    let entry = loaded.byte_code().expect("defined class has bytecode");
    let parsed = ClassFile::parse(&entry.bytes).unwrap();
    assert_eq!(parsed.this_class, "sandbox/com/example/Hello");
    assert_eq!(parsed.super_class.as_deref(), Some("sandbox/java/lang/Object"));
}

#[test]
fn classes_are_defined_at_most_once_per_loader() {
    let fixture = fixture(&[&hello_class()]);
    let loader = SandboxClassLoader::new(Arc::clone(&fixture.config));

    let first = expect_sandboxed(&loader, "sandbox.com.example.Hello");
    let second = expect_sandboxed(&loader, "sandbox.com.example.Hello");
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn reference_resolution_defines_the_transitive_closure() {
    let fixture = fixture(&[&hello_class()]);
    let loader = SandboxClassLoader::new(Arc::clone(&fixture.config));

    let loaded = expect_sandboxed(&loader, "sandbox.com.example.Hello");
    loader.resolve_references(&loaded).unwrap();

    // `greet` interns a string constant, so the helper must now be defined.
    let helper = expect_sandboxed(&loader, "sandbox.java.lang.DJVM");
    assert!(helper.byte_code().is_some());
}

#[test]
fn child_configurations_read_the_parent_cache() {
    let fixture = fixture(&[&hello_class()]);
    let parent_loader = SandboxClassLoader::new(Arc::clone(&fixture.config));
    let parent_entry = expect_sandboxed(&parent_loader, "sandbox.com.example.Hello")
        .byte_code()
        .cloned()
        .unwrap();

    let child_config = fixture.config.create_child([]).unwrap();
    let child_loader = SandboxClassLoader::new(child_config);
    let child_entry = expect_sandboxed(&child_loader, "sandbox.com.example.Hello")
        .byte_code()
        .cloned()
        .unwrap();

    assert!(Arc::ptr_eq(&parent_entry, &child_entry));
}

#[test]
fn non_sandbox_names_fall_through_or_fail() {
    let fixture = fixture(&[&hello_class()]);
    let loader = SandboxClassLoader::new(Arc::clone(&fixture.config));

    match loader.load_sandbox_class("java.lang.Object").unwrap() {
        SandboxClass::Host(name) => assert_eq!(name, "java/lang/Object"),
        other => panic!("expected host fallthrough, got {other:?}"),
    }
    assert!(matches!(
        loader.load_sandbox_class("com.example.Hello"),
        Err(SandboxError::ClassNotFound(_))
    ));
}

#[test]
fn loader_parents_are_sandbox_loaders_all_the_way_up() {
    let fixture = fixture(&[&hello_class()]);
    let root = SandboxClassLoader::new(Arc::clone(&fixture.config));
    let child_config = fixture.config.create_child([]).unwrap();
    let child = SandboxClassLoader::with_parent(child_config, Arc::clone(&root));

    // The walk stays inside sandbox loaders and terminates; the host
    // application loader is never reachable.
    let mut current = Some(&child);
    let mut depth = 0;
    while let Some(loader) = current {
        depth += 1;
        current = loader.parent();
    }
    assert_eq!(depth, 2);
}

#[test]
fn reserved_member_names_fail_the_load_terminally() {
    let bad = simple_class(
        "com/example/Reserved",
        "java/lang/Object",
        vec![void_method("toDJVMString", vec![Insn::Simple(Opcode::Return)])],
    );
    let fixture = fixture(&[&bad]);
    let loader = SandboxClassLoader::new(Arc::clone(&fixture.config));

    let err = loader
        .load_sandbox_class("sandbox.com.example.Reserved")
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Class is not allowed to implement toDJVMString()"));

    // The failure is cached; repeat requests see it without re-rewriting.
    let again = loader
        .load_sandbox_class("sandbox.com.example.Reserved")
        .unwrap_err();
    assert!(matches!(again, SandboxError::PreviousFailure(_)));
}

#[test]
fn external_cache_is_shared_across_configurations() {
    let external_dir = tempfile::tempdir().unwrap();
    let external = Arc::new(DirectoryCache::new(external_dir.path()));

    let bootstrap = tempfile::tempdir().unwrap();
    write_bootstrap(bootstrap.path());
    let user = tempfile::tempdir().unwrap();
    write_class_file(user.path(), &hello_class());

    let config = SandboxConfiguration::builder()
        .bootstrap_source(bootstrap.path())
        .user_source([user.path().to_path_buf()])
        .external_cache(external.clone())
        .build()
        .unwrap();
    let loader = SandboxClassLoader::new(config);
    expect_sandboxed(&loader, "sandbox.com.example.Hello");
    assert!(external_dir
        .path()
        .join("sandbox/com/example/Hello.class")
        .is_file());

    // A fresh configuration with no sources at all can still serve the class
    // from the shared external cache.
    let empty_config = SandboxConfiguration::builder()
        .external_cache(external)
        .build()
        .unwrap();
    let empty_loader = SandboxClassLoader::new(empty_config);
    let loaded = expect_sandboxed(&empty_loader, "sandbox.com.example.Hello");
    let parsed = ClassFile::parse(&loaded.byte_code().unwrap().bytes).unwrap();
    assert_eq!(parsed.this_class, "sandbox/com/example/Hello");
}

#[test]
fn preload_manifest_triggers_eager_rewriting() {
    let bootstrap = tempfile::tempdir().unwrap();
    write_bootstrap(bootstrap.path());

    let user = tempfile::tempdir().unwrap();
    let jar_path = user.path().join("app.jar");
    {
        let file = std::fs::File::create(&jar_path).unwrap();
        let mut jar = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        let pre = simple_class(
            "com/example/Pre",
            "java/lang/Object",
            vec![void_method("noop", vec![Insn::Simple(Opcode::Return)])],
        );
        jar.start_file("com/example/Pre.class", options).unwrap();
        jar.write_all(&write_class(&pre).unwrap()).unwrap();
        jar.start_file("META-INF/DJVM-preload", options).unwrap();
        jar.write_all(b"").unwrap();
        jar.finish().unwrap();
    }

    let config = SandboxConfiguration::builder()
        .bootstrap_source(bootstrap.path())
        .user_source([jar_path])
        .build()
        .unwrap();
    let loader = SandboxClassLoader::new(Arc::clone(&config));
    let defined = preload(&loader).unwrap();
    assert_eq!(defined, 1);

    // Already in the cache; this does not go back to the rewriter.
    assert!(config.cache().get("sandbox/com/example/Pre").is_some());
    expect_sandboxed(&loader, "sandbox.com.example.Pre");

    config.close();
}
