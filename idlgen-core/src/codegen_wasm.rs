//! WebAssembly embind generator.
//!
//! Emits one Emscripten glue file per compilation. Each interface is
//! wrapped by a `Wasm<Name>` class registered through `class_`, structs
//! become `value_object` registrations, enums become `enum_`
//! registrations, and callbacks arrive as `emscripten::val` function
//! values invoked synchronously from a capturing lambda. Byte buffers
//! cross the boundary by copying the JS typed array through
//! `typed_memory_view`.

use crate::compiler::{ArtifactSet, Options};
use crate::error::Error;
use crate::ir::{CallbackId, InterfaceDecl, Ir, MethodDecl, Param, PassMode, Primitive, TypeRef};
use crate::marshal;

const TARGET: &str = "wasm";

pub fn generate(ir: &Ir, options: &Options) -> Result<ArtifactSet, Error> {
    for cb in &ir.callbacks {
        if let Some(problem) = marshal::callback_bridge_violation(ir, cb, false) {
            return Err(Error::generation(TARGET, &cb.name, problem));
        }
    }
    for iface in &ir.interfaces {
        check_interface(ir, iface)?;
    }

    let ns = options.resolved_namespace(ir);
    let mut artifacts = ArtifactSet::new();
    artifacts.insert(
        format!("{ns}_wasm_bindings.cpp"),
        bindings(ir, ns, &options.resolved_impl_header(ns)),
    );
    Ok(artifacts)
}

/// Embind has no stable way to pass one wrapped object into another
/// wrapper's method, so interface-typed parameters are rejected here
/// rather than silently miscompiled.
fn check_interface(ir: &Ir, iface: &InterfaceDecl) -> Result<(), Error> {
    let params = iface
        .ctor_params
        .iter()
        .chain(iface.methods.iter().flat_map(|m| m.params.iter()));
    for param in params {
        if let TypeRef::Interface(_) = &param.ty {
            return Err(Error::generation(
                TARGET,
                &iface.name,
                format!(
                    "parameter '{}' of type '{}' cannot cross the embind boundary",
                    param.name,
                    ir.type_name(&param.ty)
                ),
            ));
        }
    }
    for method in &iface.methods {
        if method.return_ty == TypeRef::Primitive(Primitive::Bytes) {
            return Err(Error::generation(
                TARGET,
                &iface.name,
                format!(
                    "method '{}' returns a byte buffer, which carries no length \
                     across the embind boundary",
                    method.name
                ),
            ));
        }
    }
    Ok(())
}

fn bindings(ir: &Ir, ns: &str, impl_header: &str) -> String {
    let mut lines = vec![
        "// AUTO-GENERATED - DO NOT EDIT".to_string(),
        "#include <emscripten/bind.h>".to_string(),
        "#include <emscripten/val.h>".to_string(),
        format!("#include \"{impl_header}\""),
        "#include <vector>".to_string(),
        "#include <memory>".to_string(),
        "#include <string>".to_string(),
        "#include <cstdint>".to_string(),
        String::new(),
        "using namespace emscripten;".to_string(),
        String::new(),
    ];

    for iface in &ir.interfaces {
        lines.extend(wrapper_class(ir, ns, iface));
        lines.extend(class_bindings(ns, iface));
    }
    if !ir.enums.is_empty() {
        lines.extend(enum_bindings(ir, ns));
    }
    if !ir.structs.is_empty() {
        lines.extend(struct_bindings(ir, ns));
    }
    lines.join("\n")
}

fn wrapper_class(ir: &Ir, ns: &str, iface: &InterfaceDecl) -> Vec<String> {
    let cpp_class = format!("{ns}::{}", iface.name);
    let wasm_class = format!("Wasm{}", iface.name);
    let mut lines = vec![
        format!("class {wasm_class} {{"),
        "public:".to_string(),
        format!("    {wasm_class}() = default;"),
        String::new(),
    ];

    lines.extend(create_method(ir, iface, &cpp_class));

    for method in &iface.methods {
        lines.extend(wrapper_method(ir, method));
    }

    lines.extend([
        "private:".to_string(),
        format!("    std::unique_ptr<{cpp_class}> impl_;"),
        "};".to_string(),
        String::new(),
    ]);
    lines
}

fn create_method(ir: &Ir, iface: &InterfaceDecl, cpp_class: &str) -> Vec<String> {
    let params = iface
        .ctor_params
        .iter()
        .map(|p| format!("{} {}", marshal::wasm_param_type(ir, p), p.name))
        .collect::<Vec<_>>()
        .join(", ");
    let args = iface
        .ctor_params
        .iter()
        .map(|p| p.name.clone())
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        format!("    bool create({params}) {{"),
        "        try {".to_string(),
        format!("            impl_ = std::make_unique<{cpp_class}>({args});"),
        "            return impl_ != nullptr;".to_string(),
        "        } catch (...) {".to_string(),
        "            return false;".to_string(),
        "        }".to_string(),
        "    }".to_string(),
        String::new(),
    ]
}

fn wrapper_method(ir: &Ir, method: &MethodDecl) -> Vec<String> {
    let ret = marshal::wasm_return_type(ir, &method.return_ty);
    let params = method
        .params
        .iter()
        .map(|p| format!("{} {}", marshal::wasm_param_type(ir, p), p.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut lines = vec![format!("    {ret} {}({params}) {{", method.name)];

    for p in &method.params {
        if p.ty == TypeRef::Primitive(Primitive::Bytes) {
            lines.extend(bytes_conversion(&p.name));
        }
    }
    for p in &method.params {
        if let TypeRef::Callback(id) = &p.ty {
            lines.extend(callback_wrapper(ir, &p.name, *id));
        }
    }

    let args = method
        .params
        .iter()
        .map(|p| call_arg(p))
        .collect::<Vec<_>>()
        .join(", ");

    match &method.return_ty {
        TypeRef::Vector(elem) => {
            lines.push("        val result = val::array();".to_string());
            lines.push("        if (!impl_) return result;".to_string());
            lines.push(format!("        auto items = impl_->{}({args});", method.name));
            lines.push("        for (const auto& item : items) {".to_string());
            if let TypeRef::Struct(id) = elem.as_ref() {
                let s = ir.struct_decl(*id);
                lines.push("            val obj = val::object();".to_string());
                for field in &s.fields {
                    lines.push(format!(
                        "            obj.set(\"{0}\", item.{0});",
                        field.name
                    ));
                }
                lines.push("            result.call<void>(\"push\", obj);".to_string());
            } else {
                lines.push("            result.call<void>(\"push\", item);".to_string());
            }
            lines.push("        }".to_string());
            lines.push("        return result;".to_string());
        }
        TypeRef::Void => {
            lines.push("        if (!impl_) return;".to_string());
            lines.push(format!("        impl_->{}({args});", method.name));
        }
        ty => {
            lines.push(format!(
                "        if (!impl_) return {};",
                marshal::wasm_default(ir, ty)
            ));
            lines.push(format!("        return impl_->{}({args});", method.name));
        }
    }
    lines.push("    }".to_string());
    lines.push(String::new());
    lines
}

/// Copies a JS typed array into a local vector through a memory view,
/// yielding a stable `uint8_t*` for the native call.
fn bytes_conversion(name: &str) -> Vec<String> {
    vec![
        format!("        unsigned int {name}Len = {name}[\"length\"].as<unsigned int>();"),
        format!("        std::vector<uint8_t> {name}Vec({name}Len);"),
        format!(
            "        val {name}MemView = val(typed_memory_view({name}Len, {name}Vec.data()));"
        ),
        format!("        {name}MemView.call<void>(\"set\", {name});"),
    ]
}

/// The JS function value is captured by the lambda for exactly the
/// duration of the native call.
fn callback_wrapper(ir: &Ir, name: &str, id: CallbackId) -> Vec<String> {
    let cb = ir.callback_decl(id);
    let params = cb
        .params
        .iter()
        .map(|p| format!("{} {}", cb_param_type(ir, p), p.name))
        .collect::<Vec<_>>()
        .join(", ");
    let args = cb
        .params
        .iter()
        .map(|p| p.name.clone())
        .collect::<Vec<_>>()
        .join(", ");

    match &cb.return_ty {
        TypeRef::Void => vec![
            format!("        auto {name}Wrapper = [{name}]({params}) {{"),
            format!("            {name}({args});"),
            "        };".to_string(),
        ],
        TypeRef::Enum(eid) => {
            let e = &ir.enum_decl(*eid).name;
            vec![
                format!("        auto {name}Wrapper = [{name}]({params}) -> {e} {{"),
                format!("            return static_cast<{e}>({name}({args}).as<int>());"),
                "        };".to_string(),
            ]
        }
        ty => {
            let ret = marshal::cpp_type(ir, ty);
            vec![
                format!("        auto {name}Wrapper = [{name}]({params}) -> {ret} {{"),
                format!("            return {name}({args}).as<{ret}>();"),
                "        };".to_string(),
            ]
        }
    }
}

fn cb_param_type(ir: &Ir, p: &Param) -> String {
    match (&p.ty, p.mode) {
        (TypeRef::Struct(id), PassMode::ConstRef) => {
            format!("const {}&", ir.struct_decl(*id).name)
        }
        (TypeRef::Struct(id), _) => ir.struct_decl(*id).name.clone(),
        (TypeRef::Primitive(Primitive::Str), _) => "const std::string&".to_string(),
        (ty, _) => marshal::cpp_type(ir, ty),
    }
}

fn call_arg(p: &Param) -> String {
    match (&p.ty, p.mode) {
        (TypeRef::Primitive(Primitive::Bytes), _) => format!("{}Vec.data()", p.name),
        (TypeRef::Callback(_), _) => format!("{}Wrapper", p.name),
        // Pointer-mode structs arrived by value; the native call wants
        // an address.
        (TypeRef::Struct(_), PassMode::MutPtr | PassMode::ConstPtr) => format!("&{}", p.name),
        _ => p.name.clone(),
    }
}

fn class_bindings(ns: &str, iface: &InterfaceDecl) -> Vec<String> {
    let wasm_class = format!("Wasm{}", iface.name);
    let mut lines = vec![
        format!(
            "EMSCRIPTEN_BINDINGS({ns}_{}) {{",
            iface.name.to_lowercase()
        ),
        format!("    class_<{wasm_class}>(\"{}\")", iface.name),
        "        .constructor<>()".to_string(),
        format!("        .function(\"create\", &{wasm_class}::create)"),
    ];
    for method in &iface.methods {
        lines.push(format!(
            "        .function(\"{0}\", &{wasm_class}::{0})",
            method.name
        ));
    }
    lines.push("    ;".to_string());
    lines.push("}".to_string());
    lines.push(String::new());
    lines
}

fn enum_bindings(ir: &Ir, ns: &str) -> Vec<String> {
    let mut lines = vec![format!("EMSCRIPTEN_BINDINGS({ns}_enums) {{")];
    for e in &ir.enums {
        lines.push(format!("    enum_<{0}>(\"{0}\")", e.name));
        for member in &e.members {
            lines.push(format!(
                "        .value(\"{}\", {}_{})",
                member.name, e.name, member.name
            ));
        }
        lines.push("    ;".to_string());
        lines.push(String::new());
    }
    lines.push("}".to_string());
    lines.push(String::new());
    lines
}

fn struct_bindings(ir: &Ir, ns: &str) -> Vec<String> {
    let mut lines = vec![format!("EMSCRIPTEN_BINDINGS({ns}_structs) {{")];
    for s in &ir.structs {
        lines.push(format!("    value_object<{0}>(\"{0}\")", s.name));
        for field in &s.fields {
            lines.push(format!(
                "        .field(\"{0}\", &{1}::{0})",
                field.name, s.name
            ));
        }
        lines.push("    ;".to_string());
        lines.push(String::new());
    }
    lines.push("}".to_string());
    lines.push(String::new());
    lines
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
    fn wraps_interface_in_embind_class() {
        let set = artifacts(
            "namespace calc;\n\
             interface Calculator { Calculator(int precision); int add(int a, int b); }\n",
        );
        let glue = &set["calc_wasm_bindings.cpp"];
        assert!(glue.contains("class WasmCalculator {"));
        assert!(glue.contains("bool create(int precision) {"));
        assert!(glue.contains("impl_ = std::make_unique<calc::Calculator>(precision);"));
        assert!(glue.contains("EMSCRIPTEN_BINDINGS(calc_calculator) {"));
        assert!(glue.contains("class_<WasmCalculator>(\"Calculator\")"));
        assert!(glue.contains(".function(\"add\", &WasmCalculator::add)"));
    }

    #[test]
    fn structs_and_enums_register_value_objects() {
        let set = artifacts(
            "namespace geo;\n\
             struct Point { int x; int y; }\n\
             enum Mode { Off = 0, On = 1 }\n",
        );
        let glue = &set["geo_wasm_bindings.cpp"];
        assert!(glue.contains("value_object<Point>(\"Point\")"));
        assert!(glue.contains(".field(\"x\", &Point::x)"));
        assert!(glue.contains("enum_<Mode>(\"Mode\")"));
        assert!(glue.contains(".value(\"On\", Mode_On)"));
    }

    #[test]
    fn bytes_param_copies_through_memory_view() {
        let set = artifacts(
            "namespace app;\n\
             interface Decoder { int feed(bytes data, int length); }\n",
        );
        let glue = &set["app_wasm_bindings.cpp"];
        assert!(glue.contains("int feed(val data, int length) {"));
        assert!(glue.contains("std::vector<uint8_t> dataVec(dataLen);"));
        assert!(glue.contains("dataMemView.call<void>(\"set\", data);"));
        assert!(glue.contains("return impl_->feed(dataVec.data(), length);"));
    }

    #[test]
    fn vector_of_structs_returns_js_array() {
        let set = artifacts(
            "namespace geo;\n\
             struct Point { int x; int y; }\n\
             interface Store { vector<Point> all(); }\n",
        );
        let glue = &set["geo_wasm_bindings.cpp"];
        assert!(glue.contains("val all() {"));
        assert!(glue.contains("auto items = impl_->all();"));
        assert!(glue.contains("obj.set(\"x\", item.x);"));
        assert!(glue.contains("result.call<void>(\"push\", obj);"));
    }

    #[test]
    fn callback_arrives_as_val_and_is_wrapped() {
        let set = artifacts(
            "namespace app;\n\
             struct Hit { int id; }\n\
             callback OnHit(const Hit& hit, int index);\n\
             interface Scanner { void scan(OnHit handler); }\n",
        );
        let glue = &set["app_wasm_bindings.cpp"];
        assert!(glue.contains("void scan(val handler) {"));
        assert!(glue.contains(
            "auto handlerWrapper = [handler](const Hit& hit, int index) {"
        ));
        assert!(glue.contains("impl_->scan(handlerWrapper);"));
    }

    #[test]
    fn bytes_callback_param_fails_generation() {
        let ir = compile(
            "namespace app;\n\
             callback OnData(bytes chunk, int len);\n",
        )
        .expect("compile");
        let err = generate(&ir, &Options::new("out")).unwrap_err();
        assert!(err.to_string().contains("wasm"));
    }

    #[test]
    fn interface_param_fails_generation() {
        let ir = compile(
            "namespace app;\n\
             interface Engine { void run(); }\n\
             interface Driver { void attach(Engine* engine); }\n",
        )
        .expect("compile");
        let err = generate(&ir, &Options::new("out")).unwrap_err();
        assert!(err.to_string().contains("Driver"));
    }
}
