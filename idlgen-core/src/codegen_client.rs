//! Dynamically-loading client generator.
//!
//! Emits a C++ wrapper over the C-ABI surface that resolves every
//! exported function through `dlopen`/`LoadLibrary` at runtime. Each
//! interface becomes a move-only class owning its handle through a
//! `unique_ptr` with a custom deleter; `vector<T>` returns become RAII
//! result classes that free the C wrapper on destruction. Callbacks
//! bridge through a call-scoped thread-local pointer that is cleared
//! before the wrapper method returns, so no closure outlives the call
//! that received it.

use crate::codegen_c_api::{elem_name, result_struct_name, vector_elem_names};
use crate::compiler::{ArtifactSet, Options};
use crate::error::Error;
use crate::ir::{CallbackDecl, InterfaceDecl, Ir, MethodDecl, Param, PassMode, Primitive, TypeRef};
use crate::marshal;

const TARGET: &str = "client";

pub fn generate(ir: &Ir, options: &Options) -> Result<ArtifactSet, Error> {
    for cb in &ir.callbacks {
        if let Some(problem) = marshal::callback_bridge_violation(ir, cb, true) {
            return Err(Error::generation(TARGET, &cb.name, problem));
        }
    }

    let ns = options.resolved_namespace(ir);
    let mut artifacts = ArtifactSet::new();
    artifacts.insert("idl_client.hpp".to_string(), loader_header());
    artifacts.insert(format!("{ns}_client.hpp"), client_header(ir, ns));
    artifacts.insert(format!("{ns}_client.cpp"), client_impl(ir, ns));
    Ok(artifacts)
}

/// Shared loader utilities; namespace-agnostic so several generated
/// namespaces can share one library handle.
fn loader_header() -> String {
    let lines = [
        "// AUTO-GENERATED - DO NOT EDIT",
        "#ifndef IDL_CLIENT_HPP",
        "#define IDL_CLIENT_HPP",
        "",
        "#ifdef _WIN32",
        "#include <windows.h>",
        "#else",
        "#include <dlfcn.h>",
        "#endif",
        "",
        "#include <string>",
        "",
        "namespace idl_client {",
        "",
        "namespace detail {",
        "",
        "inline void*& libraryHandle() {",
        "    static void* handle = nullptr;",
        "    return handle;",
        "}",
        "",
        "inline void* loadSymbol(const char* name) {",
        "#ifdef _WIN32",
        "    return reinterpret_cast<void*>(GetProcAddress(static_cast<HMODULE>(libraryHandle()), name));",
        "#else",
        "    return dlsym(libraryHandle(), name);",
        "#endif",
        "}",
        "",
        "inline bool loadLibrary(const std::string& path) {",
        "    if (libraryHandle()) return true;",
        "#ifdef _WIN32",
        "    libraryHandle() = LoadLibraryA(path.c_str());",
        "#else",
        "    libraryHandle() = dlopen(path.c_str(), RTLD_NOW);",
        "#endif",
        "    return libraryHandle() != nullptr;",
        "}",
        "",
        "} // namespace detail",
        "",
        "inline bool initialize(const std::string& libraryPath) {",
        "    return detail::loadLibrary(libraryPath);",
        "}",
        "",
        "inline bool isInitialized() {",
        "    return detail::libraryHandle() != nullptr;",
        "}",
        "",
        "} // namespace idl_client",
        "",
        "#endif // IDL_CLIENT_HPP",
    ];
    lines.join("\n")
}

fn client_header(ir: &Ir, ns: &str) -> String {
    let mut lines = vec![
        "// AUTO-GENERATED - DO NOT EDIT".to_string(),
        "#pragma once".to_string(),
        String::new(),
        "#include <string>".to_string(),
        "#include <vector>".to_string(),
        "#include <memory>".to_string(),
        "#include <functional>".to_string(),
        format!("#include \"{ns}_c_api.h\""),
        "#include \"idl_client.hpp\"".to_string(),
        String::new(),
        format!("namespace {ns}_client {{"),
        String::new(),
    ];

    for e in &ir.enums {
        lines.push(format!("using {} = ::{};", e.name, e.name));
    }
    if !ir.enums.is_empty() {
        lines.push(String::new());
    }
    for s in &ir.structs {
        lines.push(format!("using {} = ::{};", s.name, s.name));
    }
    if !ir.structs.is_empty() {
        lines.push(String::new());
    }

    for cb in &ir.callbacks {
        let params = cb
            .params
            .iter()
            .map(|p| closure_param_type(ir, p))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "using {} = std::function<{}({params})>;",
            cb.name,
            marshal::cpp_type(ir, &cb.return_ty)
        ));
    }
    if !ir.callbacks.is_empty() {
        lines.push(String::new());
    }

    for iface in &ir.interfaces {
        lines.extend(interface_header(ir, iface));
    }

    lines.push(format!("}} // namespace {ns}_client"));
    lines.join("\n")
}

fn interface_header(ir: &Ir, iface: &InterfaceDecl) -> Vec<String> {
    let mut lines = Vec::new();
    let handle = format!("{}Handle", iface.name);

    for elem in vector_elem_names(ir, iface) {
        let c_result = format!("::{}", result_struct_name(&iface.name, &elem));
        let client_result = client_result_name(iface, &elem);
        let data = elem_c_type(ir, iface, &elem);
        lines.extend([
            format!("class {client_result} {{"),
            "public:".to_string(),
            format!("    {client_result}();"),
            format!("    explicit {client_result}({c_result}* result);"),
            format!("    ~{client_result}() = default;"),
            format!("    {client_result}({client_result}&&) noexcept = default;"),
            format!("    {client_result}& operator=({client_result}&&) noexcept = default;"),
            String::new(),
            "    [[nodiscard]] int count() const;".to_string(),
            format!("    [[nodiscard]] const {data}* data() const;"),
            format!("    [[nodiscard]] std::vector<{data}> toVector() const;"),
            String::new(),
            "private:".to_string(),
            format!(
                "    std::unique_ptr<{c_result}, std::function<void({c_result}*)>> result_;"
            ),
            "};".to_string(),
            String::new(),
        ]);
    }

    lines.push(format!("class {} {{", iface.name));
    lines.push("public:".to_string());
    lines.push(format!(
        "    explicit {}({});",
        iface.name,
        cpp_params(ir, &iface.ctor_params)
    ));
    lines.extend([
        format!("    ~{}() = default;", iface.name),
        String::new(),
        format!("    {0}(const {0}&) = delete;", iface.name),
        format!("    {0}& operator=(const {0}&) = delete;", iface.name),
        format!("    {0}({0}&&) noexcept = default;", iface.name),
        format!("    {0}& operator=({0}&&) noexcept = default;", iface.name),
        String::new(),
        // Other wrappers unwrap through this when an interface is
        // passed back across the C surface.
        format!("    [[nodiscard]] ::{handle}* nativeHandle() const;"),
        String::new(),
    ]);

    for method in &iface.methods {
        let ret = cpp_return_type(ir, iface, &method.return_ty);
        let const_q = if method.is_const { " const" } else { "" };
        let nodiscard = if method.return_ty.is_void() {
            ""
        } else {
            "[[nodiscard]] "
        };
        lines.push(format!(
            "    {nodiscard}{ret} {}({}){const_q};",
            method.name,
            cpp_params(ir, &method.params)
        ));
    }

    lines.extend([
        String::new(),
        "private:".to_string(),
        format!(
            "    std::unique_ptr<::{handle}, std::function<void(::{handle}*)>> handle_;"
        ),
        "};".to_string(),
        String::new(),
    ]);
    lines
}

fn client_impl(ir: &Ir, ns: &str) -> String {
    let mut lines = vec![
        "// AUTO-GENERATED - DO NOT EDIT".to_string(),
        format!("#include \"{ns}_client.hpp\""),
        String::new(),
        "#include <stdexcept>".to_string(),
        String::new(),
        format!("namespace {ns}_client {{"),
        String::new(),
        "namespace {".to_string(),
        String::new(),
    ];

    for iface in &ir.interfaces {
        lines.extend(fn_pointer_types(ir, iface));
    }
    lines.push(String::new());
    for iface in &ir.interfaces {
        lines.extend(fn_pointer_vars(ir, iface));
    }
    lines.extend([
        String::new(),
        "} // namespace".to_string(),
        String::new(),
    ]);

    lines.extend(symbol_loading(ir));

    for iface in &ir.interfaces {
        lines.extend(interface_impl(ir, iface));
    }

    lines.push(format!("}} // namespace {ns}_client"));
    lines.join("\n")
}

fn fn_pointer_types(ir: &Ir, iface: &InterfaceDecl) -> Vec<String> {
    let name = &iface.name;
    let handle = format!("::{name}Handle");
    let mut lines = Vec::new();

    let ctor_params = if iface.ctor_params.is_empty() {
        "void".to_string()
    } else {
        iface
            .ctor_params
            .iter()
            .map(|p| c_param_type(ir, p))
            .collect::<Vec<_>>()
            .join(", ")
    };
    lines.push(format!("using {name}CreateFn = {handle}*(*)({ctor_params});"));
    lines.push(format!("using {name}DestroyFn = void(*)({handle}*);"));

    for method in &iface.methods {
        let ret = c_return_type(ir, iface, &method.return_ty);
        let mut params = vec![format!("{handle}*")];
        params.extend(method.params.iter().map(|p| c_param_type(ir, p)));
        lines.push(format!(
            "using {name}{}Fn = {ret}(*)({});",
            capitalize(&method.name),
            params.join(", ")
        ));
    }

    for elem in vector_elem_names(ir, iface) {
        let result = result_struct_name(name, &elem);
        let data = elem_c_type(ir, iface, &elem);
        lines.push(format!(
            "using {result}GetCountFn = int(*)(const ::{result}*);"
        ));
        lines.push(format!(
            "using {result}GetDataFn = const {data}*(*)(const ::{result}*);"
        ));
        lines.push(format!("using {result}FreeFn = void(*)(::{result}*);"));
    }
    lines
}

fn fn_pointer_vars(ir: &Ir, iface: &InterfaceDecl) -> Vec<String> {
    let name = &iface.name;
    let mut lines = vec![
        format!("{name}CreateFn g_{name}_create = nullptr;"),
        format!("{name}DestroyFn g_{name}_destroy = nullptr;"),
    ];
    for method in &iface.methods {
        lines.push(format!(
            "{name}{}Fn g_{name}_{} = nullptr;",
            capitalize(&method.name),
            method.name
        ));
    }
    for elem in vector_elem_names(ir, iface) {
        let result = result_struct_name(name, &elem);
        lines.push(format!("{result}GetCountFn g_{result}_getCount = nullptr;"));
        lines.push(format!("{result}GetDataFn g_{result}_getData = nullptr;"));
        lines.push(format!("{result}FreeFn g_{result}_free = nullptr;"));
    }
    lines
}

fn symbol_loading(ir: &Ir) -> Vec<String> {
    let mut lines = vec!["void loadSymbols() {".to_string()];
    for iface in &ir.interfaces {
        let name = &iface.name;
        lines.push(format!(
            "    g_{name}_create = reinterpret_cast<{name}CreateFn>(idl_client::detail::loadSymbol(\"{name}_create\"));"
        ));
        lines.push(format!(
            "    g_{name}_destroy = reinterpret_cast<{name}DestroyFn>(idl_client::detail::loadSymbol(\"{name}_destroy\"));"
        ));
        for method in &iface.methods {
            lines.push(format!(
                "    g_{name}_{m} = reinterpret_cast<{name}{M}Fn>(idl_client::detail::loadSymbol(\"{name}_{m}\"));",
                m = method.name,
                M = capitalize(&method.name)
            ));
        }
        for elem in vector_elem_names(ir, iface) {
            let result = result_struct_name(name, &elem);
            for accessor in ["getCount", "getData", "free"] {
                lines.push(format!(
                    "    g_{result}_{accessor} = reinterpret_cast<{result}{A}Fn>(idl_client::detail::loadSymbol(\"{result}_{accessor}\"));",
                    A = capitalize(accessor)
                ));
            }
        }
    }
    lines.extend([
        "}".to_string(),
        String::new(),
        "bool g_symbolsLoaded = false;".to_string(),
        String::new(),
        "void ensureSymbolsLoaded() {".to_string(),
        "    if (!g_symbolsLoaded && idl_client::isInitialized()) {".to_string(),
        "        loadSymbols();".to_string(),
        "        g_symbolsLoaded = true;".to_string(),
        "    }".to_string(),
        "}".to_string(),
        String::new(),
    ]);
    lines
}

fn interface_impl(ir: &Ir, iface: &InterfaceDecl) -> Vec<String> {
    let name = &iface.name;
    let handle = format!("::{name}Handle");
    let mut lines = Vec::new();

    for elem in vector_elem_names(ir, iface) {
        let result = result_struct_name(name, &elem);
        let c_result = format!("::{result}");
        let client_result = client_result_name(iface, &elem);
        let data = elem_c_type(ir, iface, &elem);
        lines.extend([
            format!("{client_result}::{client_result}() : result_(nullptr, nullptr) {{}}"),
            String::new(),
            format!("{client_result}::{client_result}({c_result}* result)"),
            format!(
                "    : result_(result, []({c_result}* r) {{ if (r && g_{result}_free) g_{result}_free(r); }}) {{}}"
            ),
            String::new(),
            format!("int {client_result}::count() const {{"),
            format!("    return result_ ? g_{result}_getCount(result_.get()) : 0;"),
            "}".to_string(),
            String::new(),
            format!("const {data}* {client_result}::data() const {{"),
            format!("    return result_ ? g_{result}_getData(result_.get()) : nullptr;"),
            "}".to_string(),
            String::new(),
            format!("std::vector<{data}> {client_result}::toVector() const {{"),
            format!("    std::vector<{data}> vec;"),
            "    int n = count();".to_string(),
            "    auto* d = data();".to_string(),
            "    if (n > 0 && d) vec.assign(d, d + n);".to_string(),
            "    return vec;".to_string(),
            "}".to_string(),
            String::new(),
        ]);
    }

    lines.extend([
        format!("{name}::{name}({})", cpp_params(ir, &iface.ctor_params)),
        "    : handle_(nullptr, nullptr) {".to_string(),
        "    if (!idl_client::isInitialized()) throw std::runtime_error(\"Library not initialized\");"
            .to_string(),
        "    ensureSymbolsLoaded();".to_string(),
    ]);
    for p in &iface.ctor_params {
        if let TypeRef::Callback(id) = &p.ty {
            lines.extend(callback_bridge(ir, &p.name, ir.callback_decl(*id)));
        }
    }
    lines.extend([
        format!(
            "    auto* h = g_{name}_create({});",
            iface
                .ctor_params
                .iter()
                .map(|p| c_arg(p))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        format!("    handle_ = std::unique_ptr<{handle}, std::function<void({handle}*)>>(h,"),
        format!("        []({handle}* p) {{ if (p && g_{name}_destroy) g_{name}_destroy(p); }});"),
    ]);
    lines.extend(clear_callback_slots(&iface.ctor_params));
    lines.extend(["}".to_string(), String::new()]);

    lines.extend([
        format!("{handle}* {name}::nativeHandle() const {{"),
        "    return handle_.get();".to_string(),
        "}".to_string(),
        String::new(),
    ]);

    for method in &iface.methods {
        lines.extend(method_impl(ir, iface, method));
    }
    lines
}

fn method_impl(ir: &Ir, iface: &InterfaceDecl, method: &MethodDecl) -> Vec<String> {
    let name = &iface.name;
    let ret = cpp_return_type(ir, iface, &method.return_ty);
    let const_q = if method.is_const { " const" } else { "" };
    let mut lines = vec![format!(
        "{ret} {name}::{}({}){const_q} {{",
        method.name,
        cpp_params(ir, &method.params)
    )];

    let guard_ret = if method.return_ty.is_void() {
        "return;".to_string()
    } else {
        "return {};".to_string()
    };
    lines.push(format!(
        "    if (!handle_ || !g_{name}_{}) {guard_ret}",
        method.name
    ));

    let has_callbacks = method
        .params
        .iter()
        .any(|p| matches!(&p.ty, TypeRef::Callback(_)));
    for p in &method.params {
        if let TypeRef::Callback(id) = &p.ty {
            lines.extend(callback_bridge(ir, &p.name, ir.callback_decl(*id)));
        }
    }

    let call = format!(
        "g_{name}_{}({})",
        method.name,
        std::iter::once("handle_.get()".to_string())
            .chain(method.params.iter().map(|p| c_arg(p)))
            .collect::<Vec<_>>()
            .join(", ")
    );

    match &method.return_ty {
        TypeRef::Void => {
            lines.push(format!("    {call};"));
            if has_callbacks {
                lines.extend(clear_callback_slots(&method.params));
            }
        }
        TypeRef::Vector(elem) => {
            let client_result = client_result_name(iface, &elem_name(ir, elem));
            lines.push(format!("    auto* raw = {call};"));
            if has_callbacks {
                lines.extend(clear_callback_slots(&method.params));
            }
            lines.push(format!("    return {client_result}(raw);"));
        }
        TypeRef::Primitive(Primitive::Str) => {
            lines.push(format!("    const char* value = {call};"));
            if has_callbacks {
                lines.extend(clear_callback_slots(&method.params));
            }
            lines.push("    return value ? std::string(value) : std::string();".to_string());
        }
        TypeRef::Primitive(Primitive::Bool) => {
            lines.push(format!("    auto value = {call};"));
            if has_callbacks {
                lines.extend(clear_callback_slots(&method.params));
            }
            lines.push("    return value != 0;".to_string());
        }
        _ => {
            lines.push(format!("    auto value = {call};"));
            if has_callbacks {
                lines.extend(clear_callback_slots(&method.params));
            }
            lines.push("    return value;".to_string());
        }
    }
    lines.push("}".to_string());
    lines.push(String::new());
    lines
}

/// The C-ABI takes a plain function pointer, which cannot capture the
/// `std::function`. The closure is parked in a thread-local slot for
/// the duration of the call and cleared before the wrapper returns.
fn callback_bridge(ir: &Ir, name: &str, cb: &CallbackDecl) -> Vec<String> {
    let mut c_params = Vec::new();
    let mut forward_args = Vec::new();
    for p in &cb.params {
        c_params.push(format!("{} {}", marshal::c_callback_param(ir, p), p.name));
        forward_args.push(match (&p.ty, p.mode) {
            (TypeRef::Struct(_), PassMode::ConstRef) => format!("*{}", p.name),
            (TypeRef::Primitive(Primitive::Bool), _) => format!("{} != 0", p.name),
            (TypeRef::Primitive(Primitive::Str), _) => {
                format!("{n} ? std::string({n}) : std::string()", n = p.name)
            }
            _ => p.name.clone(),
        });
    }
    let c_ret = marshal::c_type(ir, &cb.return_ty);
    let invoke = format!("(*t_{name})({})", forward_args.join(", "));
    let body = match &cb.return_ty {
        TypeRef::Void => format!("{invoke};"),
        TypeRef::Primitive(Primitive::Bool) => format!("return {invoke} ? 1 : 0;"),
        _ => format!("return {invoke};"),
    };
    vec![
        format!(
            "    static thread_local const {}* t_{name} = nullptr;",
            cb.name
        ),
        format!("    t_{name} = &{name};"),
        format!(
            "    auto bridge_{name} = []({}) -> {c_ret} {{ {body} }};",
            c_params.join(", ")
        ),
    ]
}

fn clear_callback_slots(params: &[Param]) -> Vec<String> {
    params
        .iter()
        .filter(|p| matches!(&p.ty, TypeRef::Callback(_)))
        .map(|p| format!("    t_{} = nullptr;", p.name))
        .collect()
}

fn cpp_params(ir: &Ir, params: &[Param]) -> String {
    params
        .iter()
        .map(|p| marshal::cpp_param(ir, p))
        .collect::<Vec<_>>()
        .join(", ")
}

fn closure_param_type(ir: &Ir, p: &Param) -> String {
    match (&p.ty, p.mode) {
        (TypeRef::Struct(id), PassMode::ConstRef) => {
            format!("const {}&", ir.struct_decl(*id).name)
        }
        (TypeRef::Struct(id), PassMode::MutPtr | PassMode::ConstPtr) => {
            format!("{}*", ir.struct_decl(*id).name)
        }
        (TypeRef::Primitive(Primitive::Str), _) => "const std::string&".to_string(),
        (ty, _) => marshal::cpp_type(ir, ty),
    }
}

/// C type of a parameter as spelled in a function-pointer alias.
fn c_param_type(ir: &Ir, p: &Param) -> String {
    match (&p.ty, p.mode) {
        (TypeRef::Callback(id), _) => format!("::{}", ir.callback_decl(*id).name),
        (TypeRef::Interface(id), mode) => {
            let handle = format!("::{}Handle", ir.interface_decl(*id).name);
            match mode {
                PassMode::ConstPtr => format!("const {handle}*"),
                _ => format!("{handle}*"),
            }
        }
        (TypeRef::Struct(id), mode) => {
            let s = &ir.struct_decl(*id).name;
            match mode {
                PassMode::Value => s.clone(),
                PassMode::ConstRef | PassMode::ConstPtr => format!("const {s}*"),
                PassMode::MutPtr => format!("{s}*"),
                PassMode::CallbackRef => unreachable!("structs are never callback-refs"),
            }
        }
        (ty, _) => marshal::c_type(ir, ty),
    }
}

fn c_return_type(ir: &Ir, iface: &InterfaceDecl, ty: &TypeRef) -> String {
    match ty.vector_elem() {
        Some(elem) => format!(
            "::{}*",
            result_struct_name(&iface.name, &elem_name(ir, elem))
        ),
        None => marshal::c_type(ir, ty),
    }
}

fn cpp_return_type(ir: &Ir, iface: &InterfaceDecl, ty: &TypeRef) -> String {
    match ty.vector_elem() {
        Some(elem) => client_result_name(iface, &elem_name(ir, elem)),
        None => marshal::cpp_type(ir, ty),
    }
}

fn c_arg(p: &Param) -> String {
    match (&p.ty, p.mode) {
        (TypeRef::Primitive(Primitive::Str), _) => format!("{}.c_str()", p.name),
        (TypeRef::Callback(_), _) => format!("bridge_{}", p.name),
        (TypeRef::Struct(_), PassMode::ConstRef) => format!("&{}", p.name),
        (TypeRef::Interface(_), PassMode::MutPtr | PassMode::ConstPtr) => {
            format!("{n} ? {n}->nativeHandle() : nullptr", n = p.name)
        }
        (TypeRef::Interface(_), _) => format!("{}.nativeHandle()", p.name),
        _ => p.name.clone(),
    }
}

/// `Store` + `Point` -> `StorePointResult`; element keyword spellings
/// are capitalized so primitive elements read naturally.
fn client_result_name(iface: &InterfaceDecl, elem: &str) -> String {
    format!("{}{}Result", iface.name, capitalize(elem))
}

fn elem_c_type(ir: &Ir, iface: &InterfaceDecl, elem: &str) -> String {
    let ty = iface
        .methods
        .iter()
        .filter_map(|m| m.return_ty.vector_elem())
        .find(|t| elem_name(ir, t) == elem)
        .cloned()
        .unwrap_or(TypeRef::Void);
    marshal::c_type(ir, &ty)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
