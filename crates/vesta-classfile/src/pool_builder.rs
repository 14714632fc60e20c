//! Constant pool construction for emitted classes.
//!
//! Entries are interned: requesting the same constant twice yields the same
//! index. Input pool ordering is not preserved; indices are assigned in first
//! use order.

use std::collections::HashMap;

use crate::constant::{BootstrapMethod, Const, HandleKind, MethodHandleConst};
use crate::error::{Error, Result};
use crate::mutf8;

#[derive(Debug, Clone)]
enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    Str(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    Str(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
}

#[derive(Debug, Default)]
pub struct PoolBuilder {
    // Slot 0 is implicit; `entries[i]` is pool index `i + 1`.
    entries: Vec<Option<PoolEntry>>,
    index: HashMap<PoolKey, u16>,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, key: PoolKey, entry: PoolEntry) -> Result<u16> {
        if let Some(&existing) = self.index.get(&key) {
            return Ok(existing);
        }
        let wide = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
        let index = self.entries.len() + 1;
        let last = index + usize::from(wide);
        // `constant_pool_count` itself must fit in a u16, so the highest
        // usable slot is 65534.
        if last + 1 > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow);
        }
        self.entries.push(Some(entry));
        if wide {
            self.entries.push(None);
        }
        self.index.insert(key, index as u16);
        Ok(index as u16)
    }

    pub fn utf8(&mut self, value: &str) -> Result<u16> {
        self.insert(
            PoolKey::Utf8(value.to_string()),
            PoolEntry::Utf8(value.to_string()),
        )
    }

    pub fn integer(&mut self, value: i32) -> Result<u16> {
        self.insert(PoolKey::Integer(value), PoolEntry::Integer(value))
    }

    pub fn float(&mut self, value: f32) -> Result<u16> {
        let bits = value.to_bits();
        self.insert(PoolKey::Float(bits), PoolEntry::Float(bits))
    }

    pub fn long(&mut self, value: i64) -> Result<u16> {
        self.insert(PoolKey::Long(value), PoolEntry::Long(value))
    }

    pub fn double(&mut self, value: f64) -> Result<u16> {
        let bits = value.to_bits();
        self.insert(PoolKey::Double(bits), PoolEntry::Double(bits))
    }

    pub fn class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.utf8(internal_name)?;
        self.insert(PoolKey::Class(name), PoolEntry::Class(name))
    }

    pub fn string(&mut self, value: &str) -> Result<u16> {
        let utf8 = self.utf8(value)?;
        self.insert(PoolKey::Str(utf8), PoolEntry::Str(utf8))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        self.insert(
            PoolKey::NameAndType(name, descriptor),
            PoolEntry::NameAndType(name, descriptor),
        )
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, descriptor)?;
        self.insert(
            PoolKey::FieldRef(class, nat),
            PoolEntry::FieldRef(class, nat),
        )
    }

    pub fn method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<u16> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, descriptor)?;
        if is_interface {
            self.insert(
                PoolKey::InterfaceMethodRef(class, nat),
                PoolEntry::InterfaceMethodRef(class, nat),
            )
        } else {
            self.insert(
                PoolKey::MethodRef(class, nat),
                PoolEntry::MethodRef(class, nat),
            )
        }
    }

    pub fn method_type(&mut self, descriptor: &str) -> Result<u16> {
        let descriptor = self.utf8(descriptor)?;
        self.insert(
            PoolKey::MethodType(descriptor),
            PoolEntry::MethodType(descriptor),
        )
    }

    pub fn method_handle(&mut self, handle: &MethodHandleConst) -> Result<u16> {
        let reference = if handle.kind.is_field_access() {
            self.field_ref(&handle.owner, &handle.name, &handle.descriptor)?
        } else {
            let is_interface =
                handle.is_interface || handle.kind == HandleKind::InvokeInterface;
            self.method_ref(&handle.owner, &handle.name, &handle.descriptor, is_interface)?
        };
        self.insert(
            PoolKey::MethodHandle(handle.kind.byte(), reference),
            PoolEntry::MethodHandle(handle.kind.byte(), reference),
        )
    }

    /// Intern a loadable constant (for `ldc` and `ConstantValue`).
    pub fn constant(&mut self, value: &Const, bootstraps: &mut BootstrapTable) -> Result<u16> {
        match value {
            Const::Integer(v) => self.integer(*v),
            Const::Float(v) => self.float(*v),
            Const::Long(v) => self.long(*v),
            Const::Double(v) => self.double(*v),
            Const::String(v) => self.string(v),
            Const::Class(v) => self.class(v),
            Const::MethodType(v) => self.method_type(v),
            Const::MethodHandle(handle) => self.method_handle(handle),
            Const::Dynamic(dynamic) => {
                let bootstrap = bootstraps.intern(&dynamic.bootstrap);
                let nat = self.name_and_type(&dynamic.name, &dynamic.descriptor)?;
                self.insert(
                    PoolKey::Dynamic(bootstrap, nat),
                    PoolEntry::Dynamic(bootstrap, nat),
                )
            }
        }
    }

    pub fn invoke_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &BootstrapMethod,
        bootstraps: &mut BootstrapTable,
    ) -> Result<u16> {
        let bootstrap = bootstraps.intern(bootstrap);
        let nat = self.name_and_type(name, descriptor)?;
        self.insert(
            PoolKey::InvokeDynamic(bootstrap, nat),
            PoolEntry::InvokeDynamic(bootstrap, nat),
        )
    }

    /// Serialize the pool (`constant_pool_count` included).
    pub fn serialize(&self, out: &mut Vec<u8>) {
        let count = (self.entries.len() + 1) as u16;
        out.extend_from_slice(&count.to_be_bytes());
        for entry in self.entries.iter().flatten() {
            match entry {
                PoolEntry::Utf8(value) => {
                    let encoded = mutf8::encode(value);
                    out.push(1);
                    out.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
                    out.extend_from_slice(&encoded);
                }
                PoolEntry::Integer(v) => {
                    out.push(3);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                PoolEntry::Float(bits) => {
                    out.push(4);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                PoolEntry::Long(v) => {
                    out.push(5);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                PoolEntry::Double(bits) => {
                    out.push(6);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                PoolEntry::Class(name) => {
                    out.push(7);
                    out.extend_from_slice(&name.to_be_bytes());
                }
                PoolEntry::Str(utf8) => {
                    out.push(8);
                    out.extend_from_slice(&utf8.to_be_bytes());
                }
                PoolEntry::FieldRef(class, nat) => {
                    out.push(9);
                    out.extend_from_slice(&class.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
                PoolEntry::MethodRef(class, nat) => {
                    out.push(10);
                    out.extend_from_slice(&class.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
                PoolEntry::InterfaceMethodRef(class, nat) => {
                    out.push(11);
                    out.extend_from_slice(&class.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
                PoolEntry::NameAndType(name, descriptor) => {
                    out.push(12);
                    out.extend_from_slice(&name.to_be_bytes());
                    out.extend_from_slice(&descriptor.to_be_bytes());
                }
                PoolEntry::MethodHandle(kind, reference) => {
                    out.push(15);
                    out.push(*kind);
                    out.extend_from_slice(&reference.to_be_bytes());
                }
                PoolEntry::MethodType(descriptor) => {
                    out.push(16);
                    out.extend_from_slice(&descriptor.to_be_bytes());
                }
                PoolEntry::Dynamic(bootstrap, nat) => {
                    out.push(17);
                    out.extend_from_slice(&bootstrap.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
                PoolEntry::InvokeDynamic(bootstrap, nat) => {
                    out.push(18);
                    out.extend_from_slice(&bootstrap.to_be_bytes());
                    out.extend_from_slice(&nat.to_be_bytes());
                }
            }
        }
    }
}

/// Collects the bootstrap specifiers referenced by `invokedynamic` and condy
/// constants; serialized as the `BootstrapMethods` attribute.
#[derive(Debug, Default)]
pub struct BootstrapTable {
    methods: Vec<BootstrapMethod>,
}

impl BootstrapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn intern(&mut self, method: &BootstrapMethod) -> u16 {
        if let Some(pos) = self.methods.iter().position(|m| m == method) {
            return pos as u16;
        }
        self.methods.push(method.clone());
        (self.methods.len() - 1) as u16
    }

    /// Serialize the attribute payload (`num_bootstrap_methods` onward).
    ///
    /// Interning bootstrap arguments may discover further bootstrap methods
    /// (condy arguments referencing other specifiers), so iteration is by
    /// index rather than by iterator.
    pub fn serialize(&mut self, pool: &mut PoolBuilder) -> Result<Vec<u8>> {
        let mut resolved: Vec<(u16, Vec<u16>)> = Vec::new();
        let mut i = 0usize;
        while i < self.methods.len() {
            let method = self.methods[i].clone();
            let handle = pool.method_handle(&method.handle)?;
            let mut args = Vec::with_capacity(method.arguments.len());
            for arg in &method.arguments {
                args.push(pool.constant(arg, self)?);
            }
            resolved.push((handle, args));
            i += 1;
        }

        let mut out = Vec::new();
        out.extend_from_slice(&(resolved.len() as u16).to_be_bytes());
        for (handle, args) in resolved {
            out.extend_from_slice(&handle.to_be_bytes());
            out.extend_from_slice(&(args.len() as u16).to_be_bytes());
            for arg in args {
                out.extend_from_slice(&arg.to_be_bytes());
            }
        }
        Ok(out)
    }
}
