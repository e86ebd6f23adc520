//! Name resolution and semantic validation.
//!
//! Two full passes over a single-owner symbol registry, so declaration
//! order in the source never affects the result and forward references
//! are legal: (a) collect every declared name, failing on the first
//! collision; (b) resolve every field/parameter/return type, failing on
//! the first unresolved or ill-placed reference. A depth-first cycle
//! check over struct fields runs last. The registry is discarded once
//! the IR is built.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Ast, CallbackAst, Decl, EnumAst, InterfaceAst, ParamAst, StructAst, TypeExpr};
use crate::error::Error;
use crate::ir::{
    CallbackDecl, CallbackId, EnumDecl, EnumId, EnumMember, Field, InterfaceDecl, InterfaceId, Ir,
    MethodDecl, Param, PassMode, Primitive, StructDecl, StructId, TypeRef,
};

/// Resolve a parsed file into the canonical IR.
pub fn resolve(ast: &Ast) -> Result<Ir, Error> {
    let registry = Registry::collect(ast)?;
    let resolver = Resolver {
        registry: &registry,
    };

    let mut structs = Vec::new();
    let mut enums = Vec::new();
    let mut callbacks = Vec::new();
    let mut interfaces = Vec::new();
    for decl in &ast.decls {
        match decl {
            Decl::Struct(d) => structs.push(resolver.resolve_struct(d)?),
            Decl::Enum(d) => enums.push(resolve_enum(d)?),
            Decl::Callback(d) => callbacks.push(resolver.resolve_callback(d)?),
            Decl::Interface(d) => interfaces.push(resolver.resolve_interface(d)?),
        }
    }

    let ir = Ir {
        namespace: ast.namespace.clone(),
        structs,
        enums,
        callbacks,
        interfaces,
    };
    check_struct_cycles(&ir)?;

    debug!(
        namespace = %ir.namespace,
        structs = ir.structs.len(),
        enums = ir.enums.len(),
        callbacks = ir.callbacks.len(),
        interfaces = ir.interfaces.len(),
        "resolved IR"
    );
    Ok(ir)
}

#[derive(Debug, Clone, Copy)]
enum Symbol {
    Struct(StructId),
    Enum(EnumId),
    Callback(CallbackId),
    Interface(InterfaceId),
}

/// Namespace-wide symbol table. Owned by the resolution passes only;
/// nothing outlives the [`resolve`] call.
struct Registry {
    symbols: HashMap<String, Symbol>,
}

impl Registry {
    fn collect(ast: &Ast) -> Result<Registry, Error> {
        let mut symbols = HashMap::new();
        let (mut structs, mut enums, mut callbacks, mut interfaces) = (0, 0, 0, 0);
        for decl in &ast.decls {
            let name = decl.name();
            if Primitive::from_keyword(name).is_some() {
                return Err(Error::semantic(
                    name,
                    format!("'{name}' is a built-in type name and cannot be redeclared"),
                ));
            }
            let symbol = match decl {
                Decl::Struct(_) => {
                    structs += 1;
                    Symbol::Struct(StructId(structs - 1))
                }
                Decl::Enum(_) => {
                    enums += 1;
                    Symbol::Enum(EnumId(enums - 1))
                }
                Decl::Callback(_) => {
                    callbacks += 1;
                    Symbol::Callback(CallbackId(callbacks - 1))
                }
                Decl::Interface(_) => {
                    interfaces += 1;
                    Symbol::Interface(InterfaceId(interfaces - 1))
                }
            };
            if symbols.insert(name.to_string(), symbol).is_some() {
                return Err(Error::semantic(
                    name,
                    format!("the name '{name}' is declared more than once"),
                ));
            }
        }
        Ok(Registry { symbols })
    }
}

struct Resolver<'reg> {
    registry: &'reg Registry,
}

impl Resolver<'_> {
    fn resolve_name(&self, decl: &str, name: &str) -> Result<TypeRef, Error> {
        if let Some(primitive) = Primitive::from_keyword(name) {
            return Ok(TypeRef::Primitive(primitive));
        }
        match self.registry.symbols.get(name) {
            Some(Symbol::Struct(id)) => Ok(TypeRef::Struct(*id)),
            Some(Symbol::Enum(id)) => Ok(TypeRef::Enum(*id)),
            Some(Symbol::Callback(id)) => Ok(TypeRef::Callback(*id)),
            Some(Symbol::Interface(id)) => Ok(TypeRef::Interface(*id)),
            None => Err(Error::semantic(
                decl,
                format!("unresolved type name '{name}'"),
            )),
        }
    }

    fn resolve_struct(&self, ast: &StructAst) -> Result<StructDecl, Error> {
        let mut fields = Vec::with_capacity(ast.fields.len());
        for field in &ast.fields {
            let TypeExpr::Name(type_name) = &field.ty else {
                return Err(Error::semantic(
                    &ast.name,
                    format!("field '{}' must have a named type", field.name),
                ));
            };
            let ty = self.resolve_name(&ast.name, type_name).map_err(|_| {
                Error::semantic(
                    &ast.name,
                    format!("field '{}' has unresolved type '{type_name}'", field.name),
                )
            })?;
            match ty {
                TypeRef::Primitive(Primitive::Str) | TypeRef::Primitive(Primitive::Bytes) => {
                    return Err(Error::semantic(
                        &ast.name,
                        format!(
                            "field '{}': '{type_name}' cannot be stored in a flat struct layout",
                            field.name
                        ),
                    ));
                }
                TypeRef::Callback(_) | TypeRef::Interface(_) => {
                    return Err(Error::semantic(
                        &ast.name,
                        format!(
                            "field '{}': struct fields may not reference '{type_name}'",
                            field.name
                        ),
                    ));
                }
                _ => {}
            }
            fields.push(Field {
                name: field.name.clone(),
                ty,
            });
        }
        Ok(StructDecl {
            name: ast.name.clone(),
            fields,
        })
    }

    fn resolve_callback(&self, ast: &CallbackAst) -> Result<CallbackDecl, Error> {
        let params = self.resolve_params(&ast.name, &ast.params)?;
        let return_ty = match &ast.return_ty {
            TypeExpr::Void => TypeRef::Void,
            TypeExpr::Name(name) => self.resolve_name(&ast.name, name)?,
            TypeExpr::Vector(_) => {
                return Err(Error::semantic(
                    &ast.name,
                    "callbacks cannot return a vector",
                ));
            }
        };
        if matches!(
            return_ty,
            TypeRef::Struct(_) | TypeRef::Callback(_) | TypeRef::Interface(_)
        ) {
            return Err(Error::semantic(
                &ast.name,
                format!(
                    "callback return type '{}' is not supported; return a primitive or void",
                    type_expr_name(&ast.return_ty)
                ),
            ));
        }
        Ok(CallbackDecl {
            name: ast.name.clone(),
            params,
            return_ty,
        })
    }

    fn resolve_interface(&self, ast: &InterfaceAst) -> Result<InterfaceDecl, Error> {
        let ctor_params = self.resolve_params(&ast.name, &ast.ctor_params)?;

        let mut seen = HashMap::new();
        let mut methods = Vec::with_capacity(ast.methods.len());
        for method in &ast.methods {
            if seen.insert(method.name.clone(), ()).is_some() {
                return Err(Error::semantic(
                    &ast.name,
                    format!(
                        "method '{}' is declared more than once (no overloading)",
                        method.name
                    ),
                ));
            }
            let return_ty = self.resolve_return(&ast.name, &method.name, &method.return_ty)?;
            let params = self.resolve_params(&ast.name, &method.params)?;
            methods.push(MethodDecl {
                name: method.name.clone(),
                return_ty,
                params,
                is_const: method.is_const,
            });
        }

        Ok(InterfaceDecl {
            name: ast.name.clone(),
            ctor_params,
            methods,
        })
    }

    fn resolve_return(
        &self,
        decl: &str,
        method: &str,
        ty: &TypeExpr,
    ) -> Result<TypeRef, Error> {
        match ty {
            TypeExpr::Void => Ok(TypeRef::Void),
            TypeExpr::Name(name) => {
                let resolved = self.resolve_name(decl, name)?;
                if matches!(resolved, TypeRef::Callback(_) | TypeRef::Interface(_)) {
                    return Err(Error::semantic(
                        decl,
                        format!("method '{method}' cannot return '{name}'"),
                    ));
                }
                Ok(resolved)
            }
            TypeExpr::Vector(elem) => {
                let TypeExpr::Name(elem_name) = elem.as_ref() else {
                    return Err(Error::semantic(
                        decl,
                        format!("method '{method}': nested vector element types are not supported"),
                    ));
                };
                let elem_ty = self.resolve_name(decl, elem_name)?;
                match elem_ty {
                    // No stable borrowed data pointer exists for these
                    // element types (std::vector<bool> is bit-packed).
                    TypeRef::Primitive(Primitive::Str)
                    | TypeRef::Primitive(Primitive::Bytes)
                    | TypeRef::Primitive(Primitive::Bool) => Err(Error::semantic(
                        decl,
                        format!("method '{method}': vector<{elem_name}> is not supported"),
                    )),
                    TypeRef::Primitive(_) | TypeRef::Struct(_) => {
                        Ok(TypeRef::Vector(Box::new(elem_ty)))
                    }
                    _ => Err(Error::semantic(
                        decl,
                        format!(
                            "method '{method}': vector elements must be primitives or structs, \
                             not '{elem_name}'"
                        ),
                    )),
                }
            }
        }
    }

    fn resolve_params(&self, decl: &str, params: &[ParamAst]) -> Result<Vec<Param>, Error> {
        let mut resolved = Vec::with_capacity(params.len());
        for param in params {
            let TypeExpr::Name(type_name) = &param.ty else {
                return Err(Error::semantic(
                    decl,
                    format!(
                        "parameter '{}': '{}' is only allowed as a return type",
                        param.name,
                        type_expr_name(&param.ty)
                    ),
                ));
            };
            let ty = self.resolve_name(decl, type_name)?;

            let mode = if matches!(ty, TypeRef::Callback(_)) {
                PassMode::CallbackRef
            } else if param.mods.is_pointer {
                if param.mods.is_const {
                    PassMode::ConstPtr
                } else {
                    PassMode::MutPtr
                }
            } else if param.mods.is_reference {
                if !param.mods.is_const {
                    return Err(Error::semantic(
                        decl,
                        format!(
                            "parameter '{}': mutable references are not supported, \
                             use a pointer for in-place mutation",
                            param.name
                        ),
                    ));
                }
                PassMode::ConstRef
            } else {
                PassMode::Value
            };

            resolved.push(Param {
                name: param.name.clone(),
                ty,
                mode,
            });
        }
        Ok(resolved)
    }
}

fn resolve_enum(ast: &EnumAst) -> Result<EnumDecl, Error> {
    let mut members = Vec::with_capacity(ast.members.len());
    let mut next_value: Option<i64> = Some(0);
    let mut seen = HashMap::new();
    for member in &ast.members {
        let value = match member.value {
            Some(explicit) => explicit,
            None => next_value.ok_or_else(|| {
                Error::semantic(
                    &ast.name,
                    format!(
                        "member '{}' has no representable implicit value",
                        member.name
                    ),
                )
            })?,
        };
        next_value = value.checked_add(1);
        if let Some(previous) = seen.insert(value, member.name.clone()) {
            return Err(Error::semantic(
                &ast.name,
                format!(
                    "members '{previous}' and '{}' share the value {value}",
                    member.name
                ),
            ));
        }
        members.push(EnumMember {
            name: member.name.clone(),
            value,
        });
    }
    Ok(EnumDecl {
        name: ast.name.clone(),
        members,
    })
}

/// Reject structs whose field graph contains a cycle (direct or
/// transitive); such a layout has no finite flat representation.
fn check_struct_cycles(ir: &Ir) -> Result<(), Error> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(ir: &Ir, id: StructId, marks: &mut [Mark]) -> Result<(), Error> {
        match marks[id.0] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let name = &ir.struct_decl(id).name;
                return Err(Error::semantic(
                    name,
                    format!("struct '{name}' contains itself, directly or through other structs"),
                ));
            }
            Mark::Unvisited => {}
        }
        marks[id.0] = Mark::InProgress;
        for field in &ir.struct_decl(id).fields {
            if let TypeRef::Struct(inner) = field.ty {
                visit(ir, inner, marks)?;
            }
        }
        marks[id.0] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; ir.structs.len()];
    for index in 0..ir.structs.len() {
        visit(ir, StructId(index), &mut marks)?;
    }
    Ok(())
}

fn type_expr_name(ty: &TypeExpr) -> String {
    match ty {
        TypeExpr::Void => "void".to_string(),
        TypeExpr::Name(name) => name.clone(),
        TypeExpr::Vector(elem) => format!("vector<{}>", type_expr_name(elem)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn resolve_source(source: &str) -> Result<Ir, Error> {
        resolve(&parse(source).expect("parse"))
    }

    #[test]
    fn resolves_forward_references() {
        let ir = resolve_source(
            "namespace demo;\n\
             interface Geo { vector<Point> line(int n); }\n\
             struct Point { int x; int y; }",
        )
        .expect("resolve");
        let method = &ir.interfaces[0].methods[0];
        assert_eq!(
            method.return_ty,
            TypeRef::Vector(Box::new(TypeRef::Struct(StructId(0))))
        );
    }

    #[test]
    fn declaration_order_is_irrelevant() {
        let forward = resolve_source(
            "namespace demo;\n\
             interface I { Mode mode() const; }\n\
             enum Mode { Off, On }",
        )
        .expect("resolve forward");
        let backward = resolve_source(
            "namespace demo;\n\
             enum Mode { Off, On }\n\
             interface I { Mode mode() const; }",
        )
        .expect("resolve backward");
        assert_eq!(forward.interfaces, backward.interfaces);
        assert_eq!(forward.enums, backward.enums);
    }

    #[test]
    fn rejects_duplicate_name_across_kinds() {
        let err = resolve_source("namespace demo; struct Foo { int x; } enum Foo { A }")
            .unwrap_err();
        let Error::Semantic { decl, message } = err else {
            panic!("expected semantic error");
        };
        assert_eq!(decl, "Foo");
        assert!(message.contains("more than once"));
    }

    #[test]
    fn rejects_unresolved_field_type_naming_the_field() {
        let err = resolve_source("namespace demo; struct Point { Missing z; }").unwrap_err();
        let Error::Semantic { decl, message } = err else {
            panic!("expected semantic error");
        };
        assert_eq!(decl, "Point");
        assert!(message.contains("'z'"));
        assert!(message.contains("Missing"));
    }

    #[test]
    fn rejects_direct_self_reference() {
        let err = resolve_source("namespace demo; struct Node { Node next; }").unwrap_err();
        assert!(matches!(err, Error::Semantic { decl, .. } if decl == "Node"));
    }

    #[test]
    fn rejects_transitive_struct_cycle() {
        let err = resolve_source(
            "namespace demo;\n\
             struct A { B b; }\n\
             struct B { A a; }",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn nested_structs_without_cycle_are_fine() {
        let ir = resolve_source(
            "namespace demo;\n\
             struct Inner { int v; }\n\
             struct Outer { Inner a; Inner b; }",
        )
        .expect("resolve");
        assert_eq!(ir.structs[1].fields.len(), 2);
    }

    #[test]
    fn rejects_duplicate_enum_value() {
        let err = resolve_source("namespace demo; enum E { A = 1, B = 1 }").unwrap_err();
        let Error::Semantic { decl, message } = err else {
            panic!("expected semantic error");
        };
        assert_eq!(decl, "E");
        assert!(message.contains("share the value 1"));
    }

    #[test]
    fn implicit_enum_values_continue_from_previous() {
        let ir = resolve_source("namespace demo; enum E { A = 5, B, C = 2, D }").expect("resolve");
        let values: Vec<i64> = ir.enums[0].members.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![5, 6, 2, 3]);
    }

    #[test]
    fn implicit_value_after_i64_max_is_rejected() {
        let err = resolve_source(
            "namespace demo; enum E { A = 9223372036854775807, B }",
        )
        .unwrap_err();
        let Error::Semantic { decl, message } = err else {
            panic!("expected semantic error");
        };
        assert_eq!(decl, "E");
        assert!(message.contains("'B'"));
    }

    #[test]
    fn explicit_i64_max_value_resolves() {
        let ir = resolve_source("namespace demo; enum E { A = 9223372036854775807 }")
            .expect("resolve");
        assert_eq!(ir.enums[0].members[0].value, i64::MAX);
    }

    #[test]
    fn rejects_duplicate_method_name() {
        let err = resolve_source(
            "namespace demo; interface I { int f(); double f(double x); }",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Semantic { decl, .. } if decl == "I"));
    }

    #[test]
    fn rejects_redeclared_builtin_name() {
        let err = resolve_source("namespace demo; struct int { int x; }");
        // 'int' fails at parse time only if lexed as keyword; it is an
        // identifier, so the resolver rejects it.
        assert!(matches!(err.unwrap_err(), Error::Semantic { .. }));
    }

    #[test]
    fn callback_parameters_resolve_to_callback_ref_mode() {
        let ir = resolve_source(
            "namespace demo;\n\
             callback OnTick(int n);\n\
             interface Clock { void watch(OnTick tick); }",
        )
        .expect("resolve");
        assert_eq!(ir.interfaces[0].methods[0].params[0].mode, PassMode::CallbackRef);
    }

    #[test]
    fn passing_modes_follow_qualifiers() {
        let ir = resolve_source(
            "namespace demo;\n\
             struct Point { int x; }\n\
             interface I { void f(Point a, const Point& b, Point* c, const Point* d); }",
        )
        .expect("resolve");
        let modes: Vec<PassMode> = ir.interfaces[0].methods[0]
            .params
            .iter()
            .map(|p| p.mode)
            .collect();
        assert_eq!(
            modes,
            vec![
                PassMode::Value,
                PassMode::ConstRef,
                PassMode::MutPtr,
                PassMode::ConstPtr
            ]
        );
    }

    #[test]
    fn rejects_mutable_reference() {
        let err = resolve_source(
            "namespace demo; struct P { int x; } interface I { void f(P& p); }",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Semantic { .. }));
    }

    #[test]
    fn rejects_string_struct_field() {
        let err = resolve_source("namespace demo; struct S { string name; }").unwrap_err();
        assert!(matches!(err, Error::Semantic { decl, .. } if decl == "S"));
    }

    #[test]
    fn rejects_vector_parameter() {
        let err = resolve_source(
            "namespace demo; interface I { void f(vector<int> xs); }",
        );
        // `vector` in parameter position does not parse as a plain name.
        assert!(err.is_err());
    }
}
