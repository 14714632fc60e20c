//! Applies the class resolver to every symbolic name of a rewritten class:
//! constant pool entries, descriptors, catch types, method handles and
//! `invokedynamic` bootstrap arguments, and the inner-class table. Records
//! every sandbox name the class ends up referencing.

use std::collections::BTreeSet;

use vesta_classfile::{
    BootstrapMethod, ClassFile, Const, DynamicConst, HandleKind, Insn, MethodHandleConst,
};
use vesta_core::SANDBOX_PREFIX;

use crate::policy::handle_thunks;
use crate::resolver::ClassResolver;

pub struct Remapper<'a> {
    resolver: &'a ClassResolver,
    references: BTreeSet<String>,
}

impl<'a> Remapper<'a> {
    pub fn new(resolver: &'a ClassResolver) -> Self {
        Self {
            resolver,
            references: BTreeSet::new(),
        }
    }

    pub fn remap_class(
        mut self,
        mut class: ClassFile,
    ) -> vesta_classfile::Result<(ClassFile, BTreeSet<String>)> {
        class.this_class = self.map_type(&class.this_class);
        class.super_class = class.super_class.map(|s| self.map_type(&s));
        class.interfaces = class
            .interfaces
            .into_iter()
            .map(|i| self.map_type(&i))
            .collect();
        for inner in &mut class.inner_classes {
            inner.inner = self.map_type(&inner.inner);
            inner.outer = inner.outer.take().map(|o| self.map_type(&o));
        }

        for field in &mut class.fields {
            field.descriptor = self.map_descriptor(&field.descriptor)?;
            if let Some(value) = field.constant_value.take() {
                field.constant_value = Some(self.map_const(value)?);
            }
        }

        for method in &mut class.methods {
            method.descriptor = self.map_descriptor(&method.descriptor)?;
            let exceptions = std::mem::take(&mut method.exceptions);
            method.exceptions = exceptions.into_iter().map(|e| self.map_type(&e)).collect();
            if let Some(code) = method.code.as_mut() {
                for handler in &mut code.handlers {
                    handler.catch_type = handler.catch_type.take().map(|t| self.map_type(&t));
                }
                let instructions = std::mem::take(&mut code.instructions);
                code.instructions = instructions
                    .into_iter()
                    .map(|insn| self.map_insn(insn))
                    .collect::<vesta_classfile::Result<Vec<_>>>()?;
            }
        }

        Ok((class, self.references))
    }

    fn map_insn(&mut self, insn: Insn) -> vesta_classfile::Result<Insn> {
        Ok(match insn {
            Insn::Ldc(value) => Insn::Ldc(self.map_const(value)?),
            Insn::Field { op, mut member } => {
                member.owner = self.map_type(&member.owner);
                member.descriptor = self.map_descriptor(&member.descriptor)?;
                Insn::Field { op, member }
            }
            Insn::Invoke {
                kind,
                mut member,
                is_interface,
            } => {
                member.owner = self.map_type(&member.owner);
                member.descriptor = self.map_descriptor(&member.descriptor)?;
                Insn::Invoke {
                    kind,
                    member,
                    is_interface,
                }
            }
            Insn::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
            } => Insn::InvokeDynamic {
                name,
                descriptor: self.map_descriptor(&descriptor)?,
                bootstrap: self.map_bootstrap(bootstrap)?,
            },
            Insn::Type { op, name } => Insn::Type {
                op,
                name: self.map_type(&name),
            },
            Insn::MultiANewArray {
                descriptor,
                dimensions,
            } => Insn::MultiANewArray {
                descriptor: self.map_type(&descriptor),
                dimensions,
            },
            other => other,
        })
    }

    fn map_const(&mut self, value: Const) -> vesta_classfile::Result<Const> {
        Ok(match value {
            Const::Class(name) => Const::Class(self.map_type(&name)),
            Const::MethodType(descriptor) => {
                Const::MethodType(self.map_descriptor(&descriptor)?)
            }
            Const::MethodHandle(handle) => Const::MethodHandle(self.map_handle(handle)?),
            Const::Dynamic(dynamic) => {
                let DynamicConst {
                    name,
                    descriptor,
                    bootstrap,
                } = *dynamic;
                Const::Dynamic(Box::new(DynamicConst {
                    name,
                    descriptor: self.map_descriptor(&descriptor)?,
                    bootstrap: self.map_bootstrap(bootstrap)?,
                }))
            }
            other => other,
        })
    }

    /// Handles on thunked virtual members become static handles on the
    /// deterministic helper, with the receiver type prepended.
    fn map_handle(
        &mut self,
        mut handle: MethodHandleConst,
    ) -> vesta_classfile::Result<MethodHandleConst> {
        if handle.kind == HandleKind::InvokeVirtual {
            if let Some(thunk) = handle_thunks().iter().find(|t| {
                t.owner == handle.owner && t.name == handle.name && t.descriptor == handle.descriptor
            }) {
                let helper = MethodHandleConst {
                    kind: HandleKind::InvokeStatic,
                    owner: crate::policy::DJVM.to_string(),
                    name: thunk.helper_name.to_string(),
                    descriptor: thunk.helper_descriptor.to_string(),
                    is_interface: false,
                };
                self.note(&helper.owner);
                return Ok(helper);
            }
        }
        handle.owner = self.map_type(&handle.owner);
        handle.descriptor = self.map_descriptor(&handle.descriptor)?;
        Ok(handle)
    }

    fn map_bootstrap(
        &mut self,
        bootstrap: BootstrapMethod,
    ) -> vesta_classfile::Result<BootstrapMethod> {
        Ok(BootstrapMethod {
            handle: self.map_handle(bootstrap.handle)?,
            arguments: bootstrap
                .arguments
                .into_iter()
                .map(|arg| self.map_const(arg))
                .collect::<vesta_classfile::Result<Vec<_>>>()?,
        })
    }

    fn map_type(&mut self, name: &str) -> String {
        let mapped = self.resolver.resolve_type(name);
        self.note(&mapped);
        mapped
    }

    fn map_descriptor(&mut self, descriptor: &str) -> vesta_classfile::Result<String> {
        let resolver = self.resolver;
        let mut seen = Vec::new();
        let mapped = vesta_classfile::rewrite_descriptor(descriptor, &mut |name| {
            let mapped = resolver.resolve_type(name);
            seen.push(mapped.clone());
            mapped
        })?;
        for name in seen {
            self.note(&name);
        }
        Ok(mapped)
    }

    /// Record a sandbox-namespace reference (array spellings reduced to their
    /// element class).
    fn note(&mut self, mapped: &str) {
        let mut name = mapped;
        while let Some(rest) = name.strip_prefix('[') {
            name = rest;
        }
        if let Some(object) = name.strip_prefix('L').and_then(|n| n.strip_suffix(';')) {
            name = object;
        }
        if name.starts_with(SANDBOX_PREFIX) {
            self.references.insert(name.to_string());
        }
    }
}
