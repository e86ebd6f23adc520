//! Canonical intermediate representation.
//!
//! Built once per compilation by the resolver, validated as a whole,
//! then handed read-only to all generators. Type references carry
//! typed indices into the owning [`Ir`] tables instead of names.

/// Built-in value types. Not user-declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Int32,
    Uint8,
    Double,
    Bool,
    Str,
    /// Caller-owned byte buffer (`bytes`), passed as a raw pointer in
    /// the C-ABI and copied at managed boundaries.
    Bytes,
}

impl Primitive {
    pub fn from_keyword(name: &str) -> Option<Primitive> {
        Some(match name {
            "int" => Primitive::Int32,
            "uint8" => Primitive::Uint8,
            "double" => Primitive::Double,
            "bool" => Primitive::Bool,
            "string" => Primitive::Str,
            "bytes" => Primitive::Bytes,
            _ => return None,
        })
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Primitive::Int32 => "int",
            Primitive::Uint8 => "uint8",
            Primitive::Double => "double",
            Primitive::Bool => "bool",
            Primitive::Str => "string",
            Primitive::Bytes => "bytes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub usize);

/// Fully resolved type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Void,
    Primitive(Primitive),
    Struct(StructId),
    Enum(EnumId),
    Callback(CallbackId),
    Interface(InterfaceId),
    /// Ordered sequence of the element type; return position only.
    Vector(Box<TypeRef>),
}

impl TypeRef {
    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Void)
    }

    pub fn vector_elem(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Vector(elem) => Some(elem),
            _ => None,
        }
    }
}

/// Parameter passing mode across the binding boundary.
///
/// Struct/interface parameters passed by `MutPtr` are "caller retains
/// ownership, callee may mutate in place".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    Value,
    ConstRef,
    MutPtr,
    ConstPtr,
    CallbackRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub mode: PassMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<EnumMember>,
}

/// A named function signature, not an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: String,
    pub return_ty: TypeRef,
    pub params: Vec<Param>,
    pub is_const: bool,
}

/// Compiles to an opaque, constructible/destructible object in every
/// target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDecl {
    pub name: String,
    pub ctor_params: Vec<Param>,
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ir {
    pub namespace: String,
    pub structs: Vec<StructDecl>,
    pub enums: Vec<EnumDecl>,
    pub callbacks: Vec<CallbackDecl>,
    pub interfaces: Vec<InterfaceDecl>,
}

impl Ir {
    pub fn struct_decl(&self, id: StructId) -> &StructDecl {
        &self.structs[id.0]
    }

    pub fn enum_decl(&self, id: EnumId) -> &EnumDecl {
        &self.enums[id.0]
    }

    pub fn callback_decl(&self, id: CallbackId) -> &CallbackDecl {
        &self.callbacks[id.0]
    }

    pub fn interface_decl(&self, id: InterfaceId) -> &InterfaceDecl {
        &self.interfaces[id.0]
    }

    /// Declared name of a type reference, for diagnostics.
    pub fn type_name(&self, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Void => "void".to_string(),
            TypeRef::Primitive(p) => p.keyword().to_string(),
            TypeRef::Struct(id) => self.struct_decl(*id).name.clone(),
            TypeRef::Enum(id) => self.enum_decl(*id).name.clone(),
            TypeRef::Callback(id) => self.callback_decl(*id).name.clone(),
            TypeRef::Interface(id) => self.interface_decl(*id).name.clone(),
            TypeRef::Vector(elem) => format!("vector<{}>", self.type_name(elem)),
        }
    }
}
