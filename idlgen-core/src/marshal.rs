//! Shared marshaling rule table.
//!
//! The single place that decides, for every (type kind, passing mode)
//! pair, how a value is represented on each side of a binding boundary
//! and how it converts across it. Every generator consults this module
//! instead of carrying its own copy of the ownership and lifetime
//! conventions:
//!
//! - interfaces are opaque handles with paired create/destroy;
//! - structs by value cross as flat aggregates;
//! - `vector<T>` returns become a caller-freed result wrapper;
//! - callbacks bridge through one call-scoped trampoline per target;
//! - enums keep their declared integral values;
//! - strings are copied, never borrowed.

use crate::ir::{CallbackDecl, Ir, Param, PassMode, Primitive, TypeRef};

// ---------------------------------------------------------------------
// C-ABI representation
// ---------------------------------------------------------------------

/// C spelling of a type in return or field position.
pub fn c_type(ir: &Ir, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Void => "void".to_string(),
        TypeRef::Primitive(p) => c_primitive(*p).to_string(),
        TypeRef::Struct(id) => ir.struct_decl(*id).name.clone(),
        TypeRef::Enum(id) => ir.enum_decl(*id).name.clone(),
        TypeRef::Callback(id) => ir.callback_decl(*id).name.clone(),
        TypeRef::Interface(id) => format!("{}Handle*", ir.interface_decl(*id).name),
        TypeRef::Vector(_) => unreachable!("vector returns use a result wrapper type"),
    }
}

fn c_primitive(p: Primitive) -> &'static str {
    match p {
        Primitive::Int32 => "int",
        Primitive::Uint8 => "uint8_t",
        Primitive::Double => "double",
        // C89 has no bool; the ABI uses int.
        Primitive::Bool => "int",
        Primitive::Str => "const char*",
        Primitive::Bytes => "const uint8_t*",
    }
}

/// C parameter declaration (`type name`) honoring the passing mode.
pub fn c_param(ir: &Ir, param: &Param) -> String {
    let name = &param.name;
    match (&param.ty, param.mode) {
        (TypeRef::Primitive(Primitive::Str), _) => format!("const char* {name}"),
        (TypeRef::Primitive(Primitive::Bytes), _) => format!("const uint8_t* {name}"),
        (TypeRef::Callback(id), _) => format!("{} {name}", ir.callback_decl(*id).name),
        (TypeRef::Interface(id), mode) => {
            let handle = format!("{}Handle", ir.interface_decl(*id).name);
            match mode {
                PassMode::ConstPtr => format!("const {handle}* {name}"),
                _ => format!("{handle}* {name}"),
            }
        }
        (TypeRef::Struct(id), mode) => {
            let s = &ir.struct_decl(*id).name;
            match mode {
                PassMode::Value => format!("{s} {name}"),
                PassMode::ConstRef | PassMode::ConstPtr => format!("const {s}* {name}"),
                PassMode::MutPtr => format!("{s}* {name}"),
                PassMode::CallbackRef => unreachable!("structs are never callback-refs"),
            }
        }
        // Const references to primitives and enums degrade to plain
        // values; there is nothing to alias.
        (ty, _) => format!("{} {name}", c_type(ir, ty)),
    }
}

/// C parameter spelling inside a callback function-pointer typedef.
pub fn c_callback_param(ir: &Ir, param: &Param) -> String {
    match (&param.ty, param.mode) {
        (TypeRef::Struct(id), PassMode::ConstRef | PassMode::ConstPtr) => {
            format!("const {}*", ir.struct_decl(*id).name)
        }
        (TypeRef::Struct(id), PassMode::MutPtr) => format!("{}*", ir.struct_decl(*id).name),
        (ty, _) => c_type(ir, ty),
    }
}

/// Error-path return value for a C function of the given return type.
pub fn c_default_return(ty: &TypeRef) -> &'static str {
    match ty {
        TypeRef::Void => "",
        TypeRef::Primitive(Primitive::Int32) => "-1",
        TypeRef::Primitive(Primitive::Str) | TypeRef::Primitive(Primitive::Bytes) => "nullptr",
        TypeRef::Primitive(_) | TypeRef::Enum(_) => "0",
        TypeRef::Interface(_) | TypeRef::Callback(_) => "nullptr",
        TypeRef::Struct(_) => "{}",
        TypeRef::Vector(_) => "nullptr",
    }
}

// ---------------------------------------------------------------------
// C++ representation (impl bridging and client wrapper)
// ---------------------------------------------------------------------

pub fn cpp_type(ir: &Ir, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Void => "void".to_string(),
        TypeRef::Primitive(p) => cpp_primitive(*p).to_string(),
        TypeRef::Struct(id) => ir.struct_decl(*id).name.clone(),
        TypeRef::Enum(id) => ir.enum_decl(*id).name.clone(),
        TypeRef::Callback(id) => ir.callback_decl(*id).name.clone(),
        TypeRef::Interface(id) => ir.interface_decl(*id).name.clone(),
        TypeRef::Vector(elem) => format!("std::vector<{}>", cpp_type(ir, elem)),
    }
}

fn cpp_primitive(p: Primitive) -> &'static str {
    match p {
        Primitive::Int32 => "int",
        Primitive::Uint8 => "uint8_t",
        Primitive::Double => "double",
        Primitive::Bool => "bool",
        Primitive::Str => "std::string",
        Primitive::Bytes => "const uint8_t*",
    }
}

/// C++ parameter declaration for the client wrapper's public methods.
pub fn cpp_param(ir: &Ir, param: &Param) -> String {
    let name = &param.name;
    match (&param.ty, param.mode) {
        (TypeRef::Primitive(Primitive::Str), _) => format!("const std::string& {name}"),
        (TypeRef::Callback(id), _) => {
            format!("const {}& {name}", ir.callback_decl(*id).name)
        }
        (TypeRef::Struct(id), mode) => {
            let s = &ir.struct_decl(*id).name;
            match mode {
                PassMode::Value => format!("{s} {name}"),
                PassMode::ConstRef => format!("const {s}& {name}"),
                PassMode::ConstPtr => format!("const {s}* {name}"),
                PassMode::MutPtr => format!("{s}* {name}"),
                PassMode::CallbackRef => unreachable!("structs are never callback-refs"),
            }
        }
        // The wrapper class is move-only, so interface parameters are
        // taken by reference or pointer, never by value.
        (TypeRef::Interface(id), mode) => {
            let iface = &ir.interface_decl(*id).name;
            match mode {
                PassMode::MutPtr | PassMode::ConstPtr => format!("{iface}* {name}"),
                _ => format!("const {iface}& {name}"),
            }
        }
        (ty, _) => format!("{} {name}", cpp_type(ir, ty)),
    }
}

// ---------------------------------------------------------------------
// Java / JNI representation
// ---------------------------------------------------------------------

/// Java spelling of a type in signatures of generated Java sources.
pub fn java_type(ir: &Ir, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Void => "void".to_string(),
        TypeRef::Primitive(Primitive::Int32) => "int".to_string(),
        TypeRef::Primitive(Primitive::Uint8) => "byte".to_string(),
        TypeRef::Primitive(Primitive::Double) => "double".to_string(),
        TypeRef::Primitive(Primitive::Bool) => "boolean".to_string(),
        TypeRef::Primitive(Primitive::Str) => "String".to_string(),
        TypeRef::Primitive(Primitive::Bytes) => "byte[]".to_string(),
        TypeRef::Struct(id) => ir.struct_decl(*id).name.clone(),
        // Enums travel as their integral value at the native boundary.
        TypeRef::Enum(_) => "int".to_string(),
        TypeRef::Callback(id) => ir.callback_decl(*id).name.clone(),
        TypeRef::Interface(_) => "long".to_string(),
        TypeRef::Vector(elem) => format!("java.util.List<{}>", java_boxed(ir, elem)),
    }
}

fn java_boxed(ir: &Ir, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Primitive(Primitive::Int32) => "Integer".to_string(),
        TypeRef::Primitive(Primitive::Uint8) => "Byte".to_string(),
        TypeRef::Primitive(Primitive::Double) => "Double".to_string(),
        TypeRef::Primitive(Primitive::Bool) => "Boolean".to_string(),
        _ => java_type(ir, ty),
    }
}

/// JNI-level C type for a parameter.
pub fn jni_type(ir: &Ir, param: &Param) -> &'static str {
    match &param.ty {
        TypeRef::Primitive(Primitive::Int32) => "jint",
        TypeRef::Primitive(Primitive::Uint8) => "jbyte",
        TypeRef::Primitive(Primitive::Double) => "jdouble",
        TypeRef::Primitive(Primitive::Bool) => "jboolean",
        TypeRef::Primitive(Primitive::Str) => "jstring",
        TypeRef::Primitive(Primitive::Bytes) => "jbyteArray",
        TypeRef::Struct(_) => "jobject",
        TypeRef::Enum(_) => "jint",
        TypeRef::Callback(_) => "jobject",
        TypeRef::Interface(_) => "jlong",
        TypeRef::Vector(_) => "jobject",
        TypeRef::Void => unreachable!("void parameter"),
    }
}

/// JNI-level C type for a return value.
pub fn jni_return_type(ty: &TypeRef) -> &'static str {
    match ty {
        TypeRef::Void => "void",
        TypeRef::Primitive(Primitive::Int32) => "jint",
        TypeRef::Primitive(Primitive::Uint8) => "jbyte",
        TypeRef::Primitive(Primitive::Double) => "jdouble",
        TypeRef::Primitive(Primitive::Bool) => "jboolean",
        TypeRef::Primitive(Primitive::Str) => "jstring",
        TypeRef::Primitive(Primitive::Bytes) => "jbyteArray",
        TypeRef::Struct(_) => "jobject",
        TypeRef::Enum(_) => "jint",
        TypeRef::Interface(_) => "jlong",
        TypeRef::Vector(_) => "jobject",
        TypeRef::Callback(_) => unreachable!("callback return"),
    }
}

/// JNI type-signature fragment for a Java-visible type.
pub fn jni_signature(ir: &Ir, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Void => "V".to_string(),
        TypeRef::Primitive(Primitive::Int32) => "I".to_string(),
        TypeRef::Primitive(Primitive::Uint8) => "B".to_string(),
        TypeRef::Primitive(Primitive::Double) => "D".to_string(),
        TypeRef::Primitive(Primitive::Bool) => "Z".to_string(),
        TypeRef::Primitive(Primitive::Str) => "Ljava/lang/String;".to_string(),
        TypeRef::Primitive(Primitive::Bytes) => "[B".to_string(),
        TypeRef::Enum(_) => "I".to_string(),
        TypeRef::Struct(id) => format!("L{};", ir.struct_decl(*id).name),
        _ => "J".to_string(),
    }
}

/// `CallXxxMethod` selector for invoking a Java callback.
pub fn jni_call_method(ty: &TypeRef) -> &'static str {
    match ty {
        TypeRef::Void => "CallVoidMethod",
        TypeRef::Primitive(Primitive::Bool) => "CallBooleanMethod",
        TypeRef::Primitive(Primitive::Double) => "CallDoubleMethod",
        TypeRef::Primitive(Primitive::Uint8) => "CallByteMethod",
        _ => "CallIntMethod",
    }
}

/// `GetXxxField` selector for reading a Java struct field.
pub fn jni_field_getter(ty: &TypeRef) -> &'static str {
    match ty {
        TypeRef::Primitive(Primitive::Bool) => "GetBooleanField",
        TypeRef::Primitive(Primitive::Double) => "GetDoubleField",
        TypeRef::Primitive(Primitive::Uint8) => "GetByteField",
        _ => "GetIntField",
    }
}

// ---------------------------------------------------------------------
// WASM / embind representation
// ---------------------------------------------------------------------

/// C++ parameter type on the embind wrapper's public surface.
pub fn wasm_param_type(ir: &Ir, param: &Param) -> String {
    match (&param.ty, param.mode) {
        // Byte buffers and callbacks arrive as JS values.
        (TypeRef::Primitive(Primitive::Bytes), _) => "val".to_string(),
        (TypeRef::Callback(_), _) => "val".to_string(),
        (TypeRef::Primitive(Primitive::Str), _) => "const std::string&".to_string(),
        (TypeRef::Struct(id), PassMode::ConstRef) => {
            format!("const {}&", ir.struct_decl(*id).name)
        }
        // Pointer-mode structs arrive by value; embind has no raw
        // pointers on the JS boundary.
        (TypeRef::Struct(id), _) => ir.struct_decl(*id).name.clone(),
        (ty, _) => cpp_type(ir, ty),
    }
}

pub fn wasm_return_type(ir: &Ir, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Vector(_) => "val".to_string(),
        _ => cpp_type(ir, ty),
    }
}

pub fn wasm_default(ir: &Ir, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Void => String::new(),
        TypeRef::Primitive(Primitive::Bool) => "false".to_string(),
        TypeRef::Primitive(Primitive::Str) => "std::string()".to_string(),
        TypeRef::Primitive(_) => "0".to_string(),
        TypeRef::Enum(id) => {
            let e = ir.enum_decl(*id);
            format!("{}_{}", e.name, e.members[0].name)
        }
        TypeRef::Struct(id) => format!("{}{{}}", ir.struct_decl(*id).name),
        TypeRef::Vector(_) => "val::array()".to_string(),
        _ => "0".to_string(),
    }
}

// ---------------------------------------------------------------------
// Callback bridging capability check
// ---------------------------------------------------------------------

/// Returns a description of the first callback parameter the target
/// cannot bridge, or `None` when the whole signature is bridgeable.
/// `bytes_ok` is false for targets that cannot re-materialize a raw
/// byte pointer inside a trampoline (WASM, JNI).
pub fn callback_bridge_violation(ir: &Ir, cb: &CallbackDecl, bytes_ok: bool) -> Option<String> {
    for param in &cb.params {
        match &param.ty {
            TypeRef::Interface(_) | TypeRef::Callback(_) => {
                return Some(format!(
                    "callback parameter '{}' of type '{}' cannot cross this boundary",
                    param.name,
                    ir.type_name(&param.ty)
                ));
            }
            TypeRef::Primitive(Primitive::Bytes) if !bytes_ok => {
                return Some(format!(
                    "callback parameter '{}' is a byte buffer, which this target \
                     cannot bridge inside a trampoline",
                    param.name
                ));
            }
            _ => {}
        }
    }
    None
}
