//! Retargeting of `ClassLoader`, `Class` and `Object` members onto the
//! deterministic helper.

use vesta_classfile::{Insn, InvokeKind, MemberRef};

use super::{Emitter, EmitterContext};
use crate::policy::{DJVM, SANDBOX_STRING_DESC};

pub struct RewriteClassLoaderMethods;

impl Emitter for RewriteClassLoaderMethods {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let Insn::Invoke { kind, member, .. } = insn else {
            return;
        };
        if member.owner != "java/lang/ClassLoader" {
            return;
        }
        match (*kind, member.name.as_str(), member.descriptor.as_str()) {
            (InvokeKind::Virtual, "loadClass", "(Ljava/lang/String;)Ljava/lang/Class;") => {
                // Receiver and argument fold into a static helper call.
                ctx.emit(Insn::invoke_static(
                    DJVM,
                    "loadClass",
                    &format!("(Ljava/lang/ClassLoader;{SANDBOX_STRING_DESC})Ljava/lang/Class;"),
                ));
                ctx.prevent_default();
            }
            (InvokeKind::Static, "getSystemClassLoader", "()Ljava/lang/ClassLoader;") => {
                ctx.emit(Insn::invoke_static(
                    DJVM,
                    "getSystemClassLoader",
                    "()Ljava/lang/ClassLoader;",
                ));
                ctx.prevent_default();
            }
            _ => {}
        }
    }
}

pub struct RewriteClassMethods;

impl Emitter for RewriteClassMethods {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let Insn::Invoke { kind, member, .. } = insn else {
            return;
        };
        if member.owner != "java/lang/Class" {
            return;
        }
        match (*kind, member.name.as_str(), member.descriptor.as_str()) {
            (InvokeKind::Virtual, "getName", "()Ljava/lang/String;") => {
                thunk_class_accessor(ctx, "getClassName");
            }
            (InvokeKind::Virtual, "getSimpleName", "()Ljava/lang/String;") => {
                thunk_class_accessor(ctx, "getClassSimpleName");
            }
            (InvokeKind::Virtual, "getCanonicalName", "()Ljava/lang/String;") => {
                thunk_class_accessor(ctx, "getClassCanonicalName");
            }
            (InvokeKind::Static, "forName", "(Ljava/lang/String;)Ljava/lang/Class;") => {
                ctx.emit(Insn::invoke_static(
                    DJVM,
                    "classForName",
                    &format!("({SANDBOX_STRING_DESC})Ljava/lang/Class;"),
                ));
                ctx.prevent_default();
            }
            _ => {}
        }
    }
}

fn thunk_class_accessor(ctx: &mut EmitterContext<'_, '_>, helper: &str) {
    ctx.emit(Insn::invoke_static(
        DJVM,
        helper,
        &format!("(Ljava/lang/Class;){SANDBOX_STRING_DESC}"),
    ));
    ctx.prevent_default();
}

pub struct RewriteObjectMethods;

impl Emitter for RewriteObjectMethods {
    fn emit(&self, ctx: &mut EmitterContext<'_, '_>, insn: &Insn) {
        let Insn::Invoke { kind, member, .. } = insn else {
            return;
        };
        if *kind != InvokeKind::Virtual || member.owner != "java/lang/Object" {
            return;
        }
        match (member.name.as_str(), member.descriptor.as_str()) {
            ("hashCode", "()I") => {
                ctx.emit(Insn::invoke_static(DJVM, "hashCode", "(Ljava/lang/Object;)I"));
                ctx.prevent_default();
            }
            // The sandbox counterpart returns a sandbox string; plain
            // `toString` cannot.
            ("toString", "()Ljava/lang/String;") => {
                ctx.emit(Insn::Invoke {
                    kind: InvokeKind::Virtual,
                    member: MemberRef::new(
                        "java/lang/Object",
                        "toDJVMString",
                        &format!("(){SANDBOX_STRING_DESC}"),
                    ),
                    is_interface: false,
                });
                ctx.prevent_default();
            }
            _ => {}
        }
    }
}
