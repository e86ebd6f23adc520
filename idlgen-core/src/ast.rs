//! Surface AST produced by the parser.
//!
//! Type names are still textual at this stage; the resolver replaces
//! them with canonical references when building the IR.

/// Textual type expression as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Void,
    /// Primitive or declared-type name, resolved later.
    Name(String),
    /// `vector<T>`, legal only in return position.
    Vector(Box<TypeExpr>),
}

/// How a parameter is passed, as written (`*`, `&`, `const`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamMods {
    pub is_const: bool,
    pub is_pointer: bool,
    pub is_reference: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamAst {
    pub name: String,
    pub ty: TypeExpr,
    pub mods: ParamMods,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAst {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructAst {
    pub name: String,
    pub fields: Vec<FieldAst>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMemberAst {
    pub name: String,
    /// Explicit `= value`; members without one continue from the
    /// previous value + 1 (first member defaults to 0).
    pub value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumAst {
    pub name: String,
    pub members: Vec<EnumMemberAst>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackAst {
    pub name: String,
    pub params: Vec<ParamAst>,
    pub return_ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodAst {
    pub name: String,
    pub return_ty: TypeExpr,
    pub params: Vec<ParamAst>,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAst {
    pub name: String,
    /// Constructor parameters; empty when no constructor is declared.
    pub ctor_params: Vec<ParamAst>,
    pub methods: Vec<MethodAst>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    Struct(StructAst),
    Enum(EnumAst),
    Callback(CallbackAst),
    Interface(InterfaceAst),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Struct(d) => &d.name,
            Decl::Enum(d) => &d.name,
            Decl::Callback(d) => &d.name,
            Decl::Interface(d) => &d.name,
        }
    }
}

/// One parsed source file: the namespace directive plus its declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ast {
    pub namespace: String,
    pub decls: Vec<Decl>,
}
