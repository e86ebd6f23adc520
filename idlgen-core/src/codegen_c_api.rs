//! C-ABI generator.
//!
//! Emits three artifacts per compilation: an export-macro header, the
//! `extern "C"` declaration header, and the implementation file that
//! bridges each flat C function onto the native C++ implementation
//! class. Interfaces become opaque `<Name>Handle` structs owning the
//! implementation through `unique_ptr`; `vector<T>` returns become
//! heap-allocated result wrappers freed by the caller.

use std::collections::BTreeSet;

use crate::compiler::{ArtifactSet, Options};
use crate::error::Error;
use crate::ir::{
    CallbackDecl, InterfaceDecl, Ir, MethodDecl, Param, PassMode, Primitive, TypeRef,
};
use crate::marshal;

const TARGET: &str = "c-abi";

pub fn generate(ir: &Ir, options: &Options) -> Result<ArtifactSet, Error> {
    for cb in &ir.callbacks {
        if let Some(problem) = marshal::callback_bridge_violation(ir, cb, true) {
            return Err(Error::generation(TARGET, &cb.name, problem));
        }
    }

    let ns = options.resolved_namespace(ir);
    let mut artifacts = ArtifactSet::new();
    artifacts.insert(format!("{ns}_export.h"), export_header(ns));
    artifacts.insert(format!("{ns}_c_api.h"), api_header(ir, ns));
    artifacts.insert(
        format!("{ns}_c_api.cpp"),
        api_impl(ir, ns, &options.resolved_impl_header(ns)),
    );
    Ok(artifacts)
}

fn export_header(ns: &str) -> String {
    let upper = ns.to_uppercase();
    let lines = vec![
        "// AUTO-GENERATED - DO NOT EDIT".to_string(),
        format!("#ifndef {upper}_EXPORT_H"),
        format!("#define {upper}_EXPORT_H"),
        String::new(),
        "#ifdef _WIN32".to_string(),
        format!("    #ifdef {upper}_EXPORTS"),
        format!("        #define {upper}_API __declspec(dllexport)"),
        "    #else".to_string(),
        format!("        #define {upper}_API __declspec(dllimport)"),
        "    #endif".to_string(),
        "#else".to_string(),
        format!("    #define {upper}_API __attribute__((visibility(\"default\")))"),
        "#endif".to_string(),
        String::new(),
        format!("#endif // {upper}_EXPORT_H"),
    ];
    lines.join("\n")
}

fn api_header(ir: &Ir, ns: &str) -> String {
    let upper = ns.to_uppercase();
    let api = format!("{upper}_API");
    let mut lines = vec![
        "// AUTO-GENERATED - DO NOT EDIT".to_string(),
        format!("#ifndef {upper}_C_API_H"),
        format!("#define {upper}_C_API_H"),
        String::new(),
        "#include <stdint.h>".to_string(),
        format!("#include \"{ns}_export.h\""),
        String::new(),
        "#ifdef __cplusplus".to_string(),
        "extern \"C\" {".to_string(),
        "#endif".to_string(),
        String::new(),
    ];

    for e in &ir.enums {
        lines.push(format!("typedef enum {} {{", e.name));
        for (i, member) in e.members.iter().enumerate() {
            let comma = if i + 1 < e.members.len() { "," } else { "" };
            lines.push(format!("    {}_{} = {}{comma}", e.name, member.name, member.value));
        }
        lines.push(format!("}} {};", e.name));
        lines.push(String::new());
    }

    for s in &ir.structs {
        lines.push(format!("typedef struct {} {{", s.name));
        for field in &s.fields {
            lines.push(format!("    {} {};", marshal::c_type(ir, &field.ty), field.name));
        }
        lines.push(format!("}} {};", s.name));
        lines.push(String::new());
    }

    for cb in &ir.callbacks {
        let params = if cb.params.is_empty() {
            "void".to_string()
        } else {
            cb.params
                .iter()
                .map(|p| marshal::c_callback_param(ir, p))
                .collect::<Vec<_>>()
                .join(", ")
        };
        lines.push(format!(
            "typedef {} (*{})({params});",
            marshal::c_type(ir, &cb.return_ty),
            cb.name
        ));
    }
    if !ir.callbacks.is_empty() {
        lines.push(String::new());
    }

    for iface in &ir.interfaces {
        let handle = format!("{}Handle", iface.name);
        lines.push(format!("typedef struct {handle} {handle};"));
        for elem in vector_elem_names(ir, iface) {
            let result = result_struct_name(&iface.name, &elem);
            lines.push(format!("typedef struct {result} {result};"));
        }
        lines.push(String::new());

        lines.push(format!(
            "{api} {handle}* {}_create({});",
            iface.name,
            c_params(ir, &iface.ctor_params)
        ));
        // Destroying the same handle twice is undefined.
        lines.push(format!("{api} void {}_destroy({handle}* handle);", iface.name));

        for method in &iface.methods {
            let ret = c_return_type(ir, &iface.name, &method.return_ty);
            let mut params = vec![format!("{handle}* handle")];
            params.extend(method.params.iter().map(|p| marshal::c_param(ir, p)));
            lines.push(format!(
                "{api} {ret} {}_{}({});",
                iface.name,
                method.name,
                params.join(", ")
            ));
        }

        for elem in vector_elem_names(ir, iface) {
            let result = result_struct_name(&iface.name, &elem);
            let data = elem_c_type(ir, iface, &elem);
            lines.push(format!(
                "{api} int {result}_getCount(const {result}* result);"
            ));
            lines.push(format!(
                "{api} const {data}* {result}_getData(const {result}* result);"
            ));
            lines.push(format!("{api} void {result}_free({result}* result);"));
        }
        lines.push(String::new());
    }

    lines.push("#ifdef __cplusplus".to_string());
    lines.push("}".to_string());
    lines.push("#endif".to_string());
    lines.push(String::new());
    lines.push(format!("#endif // {upper}_C_API_H"));
    lines.join("\n")
}

fn api_impl(ir: &Ir, ns: &str, impl_header: &str) -> String {
    let mut lines = vec![
        "// AUTO-GENERATED - DO NOT EDIT".to_string(),
        format!("#include \"{impl_header}\""),
        format!("#include \"{ns}_c_api.h\""),
        String::new(),
        "#include <memory>".to_string(),
        String::new(),
    ];

    for iface in &ir.interfaces {
        lines.extend(interface_impl(ir, ns, iface));
    }
    lines.join("\n")
}

fn interface_impl(ir: &Ir, ns: &str, iface: &InterfaceDecl) -> Vec<String> {
    let handle = format!("{}Handle", iface.name);
    let cpp_class = format!("{ns}::{}", iface.name);
    let mut lines = Vec::new();

    let caches_string = iface
        .methods
        .iter()
        .any(|m| m.return_ty == TypeRef::Primitive(Primitive::Str));

    lines.push(format!("struct {handle} {{"));
    lines.push(format!("    std::unique_ptr<{cpp_class}> impl;"));
    if caches_string {
        // Keeps the most recent string return alive until the next call.
        lines.push("    std::string last_string;".to_string());
    }
    lines.push("};".to_string());
    lines.push(String::new());

    for elem in vector_elem_names(ir, iface) {
        let result = result_struct_name(&iface.name, &elem);
        lines.push(format!("struct {result} {{"));
        lines.push(format!(
            "    std::vector<{}> data;",
            elem_cpp_type(ir, iface, &elem)
        ));
        lines.push("};".to_string());
        lines.push(String::new());
    }

    lines.push("extern \"C\" {".to_string());
    lines.push(String::new());

    lines.extend(ctor_impl(ir, iface, &handle, &cpp_class));

    for method in &iface.methods {
        lines.extend(method_impl(ir, iface, method, &handle));
    }

    for elem in vector_elem_names(ir, iface) {
        let result = result_struct_name(&iface.name, &elem);
        let data = elem_c_type(ir, iface, &elem);
        lines.extend([
            format!("int {result}_getCount(const {result}* result) {{"),
            "    return result ? static_cast<int>(result->data.size()) : -1;".to_string(),
            "}".to_string(),
            String::new(),
            format!("const {data}* {result}_getData(const {result}* result) {{"),
            "    return (result && !result->data.empty()) ? result->data.data() : nullptr;"
                .to_string(),
            "}".to_string(),
            String::new(),
            format!("void {result}_free({result}* result) {{"),
            "    delete result;".to_string(),
            "}".to_string(),
            String::new(),
        ]);
    }

    lines.push("} // extern \"C\"".to_string());
    lines.push(String::new());
    lines
}

fn ctor_impl(ir: &Ir, iface: &InterfaceDecl, handle: &str, cpp_class: &str) -> Vec<String> {
    let mut lines = vec![format!(
        "{handle}* {}_create({}) {{",
        iface.name,
        c_params(ir, &iface.ctor_params)
    )];
    for p in &iface.ctor_params {
        if dereferences_handle(&p.ty, p.mode) {
            lines.push(format!(
                "    if (!{n} || !{n}->impl) return nullptr;",
                n = p.name
            ));
        } else if needs_null_check(&p.ty, p.mode) {
            lines.push(format!("    if (!{}) return nullptr;", p.name));
        }
    }
    lines.push("    try {".to_string());
    lines.push(format!("        auto handle = new {handle}();"));
    lines.push(format!(
        "        handle->impl = std::make_unique<{cpp_class}>({});",
        cpp_args(ir, &iface.ctor_params)
    ));
    lines.push("        return handle;".to_string());
    lines.push("    } catch (...) { return nullptr; }".to_string());
    lines.push("}".to_string());
    lines.push(String::new());

    lines.push(format!("void {}_destroy({handle}* handle) {{", iface.name));
    lines.push("    delete handle;".to_string());
    lines.push("}".to_string());
    lines.push(String::new());
    lines
}

fn method_impl(ir: &Ir, iface: &InterfaceDecl, method: &MethodDecl, handle: &str) -> Vec<String> {
    let ret = c_return_type(ir, &iface.name, &method.return_ty);
    let mut params = vec![format!("{handle}* handle")];
    params.extend(method.params.iter().map(|p| marshal::c_param(ir, p)));

    let mut lines = vec![format!(
        "{ret} {}_{}({}) {{",
        iface.name,
        method.name,
        params.join(", ")
    )];

    let mut checks = vec!["!handle".to_string(), "!handle->impl".to_string()];
    for p in &method.params {
        if dereferences_handle(&p.ty, p.mode) {
            checks.push(format!("!{}", p.name));
            checks.push(format!("!{}->impl", p.name));
        } else if needs_null_check(&p.ty, p.mode) {
            checks.push(format!("!{}", p.name));
        }
    }
    let fail = marshal::c_default_return(&method.return_ty);
    if fail.is_empty() {
        lines.push(format!("    if ({}) return;", checks.join(" || ")));
    } else {
        lines.push(format!("    if ({}) return {fail};", checks.join(" || ")));
    }

    let args = cpp_args(ir, &method.params);
    match &method.return_ty {
        TypeRef::Vector(elem) => {
            let result = result_struct_name(&iface.name, &elem_name(ir, elem));
            lines.push(format!("    auto result = new {result}();"));
            lines.push(format!(
                "    result->data = handle->impl->{}({args});",
                method.name
            ));
            lines.push("    return result;".to_string());
        }
        TypeRef::Primitive(Primitive::Str) => {
            lines.push(format!(
                "    handle->last_string = handle->impl->{}({args});",
                method.name
            ));
            lines.push("    return handle->last_string.c_str();".to_string());
        }
        TypeRef::Void => {
            lines.push(format!("    handle->impl->{}({args});", method.name));
        }
        _ => {
            lines.push(format!("    return handle->impl->{}({args});", method.name));
        }
    }
    lines.push("}".to_string());
    lines.push(String::new());
    lines
}

/// Arguments forwarded from the C entry point to the C++ call.
fn cpp_args(ir: &Ir, params: &[Param]) -> String {
    params
        .iter()
        .map(|p| match (&p.ty, p.mode) {
            (TypeRef::Callback(id), _) => {
                let cb = ir.callback_decl(*id);
                if callback_needs_wrapper(cb) {
                    callback_wrapper(ir, &p.name, cb)
                } else {
                    p.name.clone()
                }
            }
            (TypeRef::Interface(_), PassMode::MutPtr | PassMode::ConstPtr) => format!(
                "({n} && {n}->impl) ? {n}->impl.get() : nullptr",
                n = p.name
            ),
            (TypeRef::Interface(_), _) => format!("*{}->impl", p.name),
            // The C surface takes const-ref structs as const pointers;
            // the implementation method takes a reference.
            (TypeRef::Struct(_), PassMode::ConstRef) => format!("*{}", p.name),
            _ => p.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Wrappers are needed when the C function-pointer signature and the
/// implementation's expected signature diverge (struct refs become
/// const pointers on the C side).
fn callback_needs_wrapper(cb: &CallbackDecl) -> bool {
    cb.params
        .iter()
        .any(|p| matches!(&p.ty, TypeRef::Struct(_)) && p.mode == PassMode::ConstRef)
}

fn callback_wrapper(ir: &Ir, name: &str, cb: &CallbackDecl) -> String {
    let mut cpp_params = Vec::new();
    let mut call_args = Vec::new();
    for p in &cb.params {
        if matches!(&p.ty, TypeRef::Struct(_)) && p.mode == PassMode::ConstRef {
            cpp_params.push(format!("const ::{}& {}", marshal::cpp_type(ir, &p.ty), p.name));
            call_args.push(format!("&{}", p.name));
        } else {
            cpp_params.push(format!("{} {}", marshal::cpp_type(ir, &p.ty), p.name));
            call_args.push(p.name.clone());
        }
    }
    let params = cpp_params.join(", ");
    let args = call_args.join(", ");
    match &cb.return_ty {
        TypeRef::Void => format!("[{name}]({params}) {{ {name}({args}); }}"),
        TypeRef::Primitive(Primitive::Bool) => {
            format!("[{name}]({params}) {{ return {name}({args}) != 0; }}")
        }
        _ => format!("[{name}]({params}) {{ return {name}({args}); }}"),
    }
}

fn needs_null_check(ty: &TypeRef, mode: PassMode) -> bool {
    match ty {
        TypeRef::Primitive(Primitive::Str) | TypeRef::Primitive(Primitive::Bytes) => true,
        TypeRef::Struct(_) => mode == PassMode::ConstRef,
        _ => false,
    }
}

/// Interface parameters the bridge dereferences as `*{name}->impl`;
/// pointer-mode interfaces forward null instead.
fn dereferences_handle(ty: &TypeRef, mode: PassMode) -> bool {
    matches!(ty, TypeRef::Interface(_))
        && matches!(mode, PassMode::Value | PassMode::ConstRef)
}

fn c_params(ir: &Ir, params: &[Param]) -> String {
    if params.is_empty() {
        "void".to_string()
    } else {
        params
            .iter()
            .map(|p| marshal::c_param(ir, p))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn c_return_type(ir: &Ir, iface_name: &str, ty: &TypeRef) -> String {
    match ty.vector_elem() {
        Some(elem) => format!("{}*", result_struct_name(iface_name, &elem_name(ir, elem))),
        None => marshal::c_type(ir, ty),
    }
}

/// Result wrappers are keyed by interface and element name so distinct
/// interfaces returning the same element type never collide.
pub(crate) fn result_struct_name(iface_name: &str, elem_name: &str) -> String {
    format!("{iface_name}_{elem_name}_CResult")
}

pub(crate) fn elem_name(ir: &Ir, elem: &TypeRef) -> String {
    match elem {
        TypeRef::Primitive(p) => p.keyword().to_string(),
        _ => ir.type_name(elem),
    }
}

/// Sorted element-type names of every `vector<T>` return in the
/// interface, deduplicated.
pub(crate) fn vector_elem_names(ir: &Ir, iface: &InterfaceDecl) -> Vec<String> {
    let names: BTreeSet<String> = iface
        .methods
        .iter()
        .filter_map(|m| m.return_ty.vector_elem())
        .map(|elem| elem_name(ir, elem))
        .collect();
    names.into_iter().collect()
}

fn elem_type_ref(ir: &Ir, iface: &InterfaceDecl, elem: &str) -> TypeRef {
    iface
        .methods
        .iter()
        .filter_map(|m| m.return_ty.vector_elem())
        .find(|ty| elem_name(ir, ty) == elem)
        .cloned()
        .unwrap_or(TypeRef::Void)
}

fn elem_c_type(ir: &Ir, iface: &InterfaceDecl, elem: &str) -> String {
    marshal::c_type(ir, &elem_type_ref(ir, iface, elem))
}

fn elem_cpp_type(ir: &Ir, iface: &InterfaceDecl, elem: &str) -> String {
    marshal::cpp_type(ir, &elem_type_ref(ir, iface, elem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    fn artifacts(source: &str) -> ArtifactSet {
        let ir = compile(source).expect("compile");
        generate(&ir, &Options::new("out")).expect("generate")
    }

    #[test]
    fn emits_handle_and_lifecycle_functions() {
        let set = artifacts(
            "namespace calc;\n\
             interface Calculator {\n\
                 Calculator(int precision);\n\
                 int add(int a, int b);\n\
             }\n",
        );
        let header = &set["calc_c_api.h"];
        assert!(header.contains("typedef struct CalculatorHandle CalculatorHandle;"));
        assert!(header.contains(
            "CALC_API CalculatorHandle* Calculator_create(int precision);"
        ));
        assert!(header.contains("CALC_API void Calculator_destroy(CalculatorHandle* handle);"));
        assert!(header.contains(
            "CALC_API int Calculator_add(CalculatorHandle* handle, int a, int b);"
        ));

        let body = &set["calc_c_api.cpp"];
        assert!(body.contains("std::unique_ptr<calc::Calculator> impl;"));
        assert!(body.contains("handle->impl = std::make_unique<calc::Calculator>(precision);"));
        assert!(body.contains("if (!handle || !handle->impl) return -1;"));
    }

    #[test]
    fn vector_return_uses_result_wrapper() {
        let set = artifacts(
            "namespace geo;\n\
             struct Point { int x; int y; }\n\
             interface Store {\n\
                 vector<Point> all();\n\
                 vector<Point> filtered(int min);\n\
             }\n",
        );
        let header = &set["geo_c_api.h"];
        assert!(header.contains("typedef struct Store_Point_CResult Store_Point_CResult;"));
        assert!(header.contains(
            "GEO_API Store_Point_CResult* Store_all(StoreHandle* handle);"
        ));
        assert!(header.contains(
            "GEO_API int Store_Point_CResult_getCount(const Store_Point_CResult* result);"
        ));
        assert!(header.contains(
            "GEO_API const Point* Store_Point_CResult_getData(const Store_Point_CResult* result);"
        ));
        assert!(header.contains(
            "GEO_API void Store_Point_CResult_free(Store_Point_CResult* result);"
        ));

        // Two vector<Point> methods share one wrapper definition.
        let body = &set["geo_c_api.cpp"];
        assert_eq!(body.matches("struct Store_Point_CResult {").count(), 1);
        assert!(body.contains("result->data = handle->impl->all();"));
    }

    #[test]
    fn string_return_is_cached_in_handle() {
        let set = artifacts(
            "namespace app;\n\
             interface Greeter { string greet(string name); }\n",
        );
        let body = &set["app_c_api.cpp"];
        assert!(body.contains("std::string last_string;"));
        assert!(body.contains("if (!handle || !handle->impl || !name) return nullptr;"));
        assert!(body.contains("handle->last_string = handle->impl->greet(name);"));
        assert!(body.contains("return handle->last_string.c_str();"));
    }

    #[test]
    fn struct_ref_callback_gets_inline_wrapper() {
        let set = artifacts(
            "namespace app;\n\
             struct Hit { int id; double score; }\n\
             callback OnHit(const Hit& hit, int index);\n\
             interface Scanner { void scan(OnHit handler); }\n",
        );
        let header = &set["app_c_api.h"];
        assert!(header.contains("typedef void (*OnHit)(const Hit*, int);"));
        let body = &set["app_c_api.cpp"];
        assert!(body.contains("[handler](const ::Hit& hit, int index) { handler(&hit, index); }"));
    }

    #[test]
    fn enums_keep_declared_values() {
        let set = artifacts(
            "namespace app;\n\
             enum Mode { Off = -1, On = 1, Auto }\n",
        );
        let header = &set["app_c_api.h"];
        assert!(header.contains("    Mode_Off = -1,"));
        assert!(header.contains("    Mode_On = 1,"));
        assert!(header.contains("    Mode_Auto = 2"));
    }

    #[test]
    fn interface_param_forwards_inner_pointer() {
        let set = artifacts(
            "namespace app;\n\
             interface Engine { void run(); }\n\
             interface Driver { void attach(Engine* engine); }\n",
        );
        let header = &set["app_c_api.h"];
        assert!(header.contains(
            "APP_API void Driver_attach(DriverHandle* handle, EngineHandle* engine);"
        ));
        let body = &set["app_c_api.cpp"];
        assert!(body.contains(
            "handle->impl->attach((engine && engine->impl) ? engine->impl.get() : nullptr);"
        ));
    }

    #[test]
    fn by_reference_interface_param_is_null_checked() {
        let set = artifacts(
            "namespace app;\n\
             interface Engine { void run(); }\n\
             interface Driver { void bind(const Engine& engine); }\n",
        );
        let body = &set["app_c_api.cpp"];
        assert!(body.contains(
            "if (!handle || !handle->impl || !engine || !engine->impl) return;"
        ));
        assert!(body.contains("handle->impl->bind(*engine->impl);"));
    }

    #[test]
    fn unbridgeable_callback_fails_generation() {
        let ir = compile(
            "namespace app;\n\
             interface Engine { void run(); }\n\
             callback OnEngine(Engine* engine);\n",
        )
        .expect("compile");
        let err = generate(&ir, &Options::new("out")).unwrap_err();
        assert!(err.to_string().contains("c-abi"));
    }
}
