//! JNI generator.
//!
//! Emits the native side (`<ns>_jni.h`, `<ns>_jni.cpp`) and the Java
//! side (a shared `Types.java` plus one `AutoCloseable` class per
//! interface). Interfaces travel as `jlong` handles; structs cross as
//! Java value classes rebuilt field by field; callbacks bridge through
//! a capturing lambda that holds the env, object, and method id only
//! for the duration of the native call. No global reference outlives
//! the call that received the callback.

use crate::compiler::{ArtifactSet, Options};
use crate::error::Error;
use crate::ir::{
    CallbackDecl, EnumDecl, InterfaceDecl, Ir, MethodDecl, Param, PassMode, Primitive, StructDecl,
    StructId, TypeRef,
};
use crate::marshal;

const TARGET: &str = "jni";

pub fn generate(ir: &Ir, options: &Options) -> Result<ArtifactSet, Error> {
    for cb in &ir.callbacks {
        if let Some(problem) = marshal::callback_bridge_violation(ir, cb, false) {
            return Err(Error::generation(TARGET, &cb.name, problem));
        }
    }
    check_boundary_structs(ir)?;
    for iface in &ir.interfaces {
        for method in &iface.methods {
            if method.return_ty == TypeRef::Primitive(Primitive::Bytes) {
                return Err(Error::generation(
                    TARGET,
                    &iface.name,
                    format!(
                        "method '{}' returns a byte buffer, which carries no length \
                         across the JNI boundary",
                        method.name
                    ),
                ));
            }
        }
    }

    let ns = options.resolved_namespace(ir);
    let package = options.resolved_java_package(ns);
    let pkg_path = package.replace('.', "/");
    let java_dir = options.resolved_java_dir();

    let mut artifacts = ArtifactSet::new();
    artifacts.insert(format!("{ns}_jni.h"), jni_header(ir, ns, &package));
    artifacts.insert(
        format!("{ns}_jni.cpp"),
        jni_impl(ir, ns, &package, &pkg_path, &options.resolved_impl_header(ns)),
    );
    artifacts.insert(
        format!("{java_dir}/{pkg_path}/Types.java"),
        java_types(ir, &package),
    );
    for iface in &ir.interfaces {
        artifacts.insert(
            format!("{java_dir}/{pkg_path}/{}.java", iface.name),
            java_interface_class(ir, ns, &package, iface),
        );
    }
    Ok(artifacts)
}

/// Structs crossing the JNI boundary are rebuilt field by field from a
/// single Java constructor call, which only works for flat layouts.
fn check_boundary_structs(ir: &Ir) -> Result<(), Error> {
    let check = |id: StructId, decl: &str| -> Result<(), Error> {
        let s = ir.struct_decl(id);
        for field in &s.fields {
            if matches!(&field.ty, TypeRef::Struct(_)) {
                return Err(Error::generation(
                    TARGET,
                    decl,
                    format!(
                        "struct '{}' has a struct-typed field '{}' and cannot cross \
                         the JNI boundary",
                        s.name, field.name
                    ),
                ));
            }
        }
        Ok(())
    };
    for cb in &ir.callbacks {
        for p in &cb.params {
            if let TypeRef::Struct(id) = &p.ty {
                check(*id, &cb.name)?;
            }
        }
    }
    for iface in &ir.interfaces {
        let params = iface
            .ctor_params
            .iter()
            .chain(iface.methods.iter().flat_map(|m| m.params.iter()));
        for p in params {
            if let TypeRef::Struct(id) = &p.ty {
                check(*id, &iface.name)?;
            }
        }
        for method in &iface.methods {
            match &method.return_ty {
                TypeRef::Struct(id) => check(*id, &iface.name)?,
                TypeRef::Vector(elem) => {
                    if let TypeRef::Struct(id) = elem.as_ref() {
                        check(*id, &iface.name)?;
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Native side
// ---------------------------------------------------------------------

fn jni_header(ir: &Ir, ns: &str, package: &str) -> String {
    let upper = ns.to_uppercase();
    let mut lines = vec![
        "// AUTO-GENERATED - DO NOT EDIT".to_string(),
        format!("#ifndef {upper}_JNI_H"),
        format!("#define {upper}_JNI_H"),
        String::new(),
        "#include <jni.h>".to_string(),
        String::new(),
        "#ifdef __cplusplus".to_string(),
        "extern \"C\" {".to_string(),
        "#endif".to_string(),
        String::new(),
    ];

    for iface in &ir.interfaces {
        let jni_class = jni_class_name(package, &iface.name);
        let mut create_params = vec!["JNIEnv*".to_string(), "jclass".to_string()];
        create_params.extend(
            iface
                .ctor_params
                .iter()
                .map(|p| marshal::jni_type(ir, p).to_string()),
        );
        lines.push(format!(
            "JNIEXPORT jlong JNICALL {jni_class}_nativeCreate({});",
            create_params.join(", ")
        ));
        lines.push(format!(
            "JNIEXPORT void JNICALL {jni_class}_nativeDestroy(JNIEnv*, jclass, jlong);"
        ));

        for method in &iface.methods {
            let ret = marshal::jni_return_type(&method.return_ty);
            let mut params = vec![
                "JNIEnv*".to_string(),
                "jclass".to_string(),
                "jlong".to_string(),
            ];
            params.extend(method.params.iter().map(|p| marshal::jni_type(ir, p).to_string()));
            lines.push(format!(
                "JNIEXPORT {ret} JNICALL {jni_class}_{}({});",
                native_name(&method.name),
                params.join(", ")
            ));
        }
        lines.push(String::new());
    }

    lines.extend([
        "#ifdef __cplusplus".to_string(),
        "}".to_string(),
        "#endif".to_string(),
        String::new(),
        format!("#endif // {upper}_JNI_H"),
    ]);
    lines.join("\n")
}

fn jni_impl(ir: &Ir, ns: &str, package: &str, pkg_path: &str, impl_header: &str) -> String {
    let mut lines = vec![
        "// AUTO-GENERATED - DO NOT EDIT".to_string(),
        format!("#include \"{ns}_jni.h\""),
        format!("#include \"{impl_header}\""),
        String::new(),
        "#include <memory>".to_string(),
        "#include <string>".to_string(),
        "#include <vector>".to_string(),
        String::new(),
        "namespace {".to_string(),
        String::new(),
        "std::string jstringToString(JNIEnv* env, jstring jstr) {".to_string(),
        "    if (!jstr) return {};".to_string(),
        "    const char* chars = env->GetStringUTFChars(jstr, nullptr);".to_string(),
        "    std::string result(chars);".to_string(),
        "    env->ReleaseStringUTFChars(jstr, chars);".to_string(),
        "    return result;".to_string(),
        "}".to_string(),
        String::new(),
        "jlong ptrToJlong(void* ptr) {".to_string(),
        "    return reinterpret_cast<jlong>(ptr);".to_string(),
        "}".to_string(),
        String::new(),
        "template<typename T>".to_string(),
        "T* jlongToPtr(jlong handle) {".to_string(),
        "    return reinterpret_cast<T*>(handle);".to_string(),
        "}".to_string(),
        String::new(),
        "} // namespace".to_string(),
        String::new(),
    ];

    for iface in &ir.interfaces {
        lines.extend(interface_impl(ir, ns, package, pkg_path, iface));
    }
    lines.join("\n")
}

fn interface_impl(
    ir: &Ir,
    ns: &str,
    package: &str,
    pkg_path: &str,
    iface: &InterfaceDecl,
) -> Vec<String> {
    let jni_class = jni_class_name(package, &iface.name);
    let cpp_class = format!("{ns}::{}", iface.name);
    let mut lines = Vec::new();

    let mut create_params = vec!["JNIEnv* env".to_string(), "jclass".to_string()];
    create_params.extend(
        iface
            .ctor_params
            .iter()
            .map(|p| format!("{} {}", marshal::jni_type(ir, p), p.name)),
    );
    lines.push(format!(
        "JNIEXPORT jlong JNICALL {jni_class}_nativeCreate({}) {{",
        create_params.join(", ")
    ));
    lines.push("    try {".to_string());
    let mut args = Vec::new();
    for p in &iface.ctor_params {
        lines.extend(param_conversion(ir, ns, pkg_path, p, &mut args, "        "));
    }
    lines.push(format!(
        "        auto* obj = new {cpp_class}({});",
        args.join(", ")
    ));
    lines.push("        return ptrToJlong(obj);".to_string());
    lines.push("    } catch (...) {".to_string());
    lines.push("        return 0;".to_string());
    lines.push("    }".to_string());
    lines.push("}".to_string());
    lines.push(String::new());

    lines.push(format!(
        "JNIEXPORT void JNICALL {jni_class}_nativeDestroy(JNIEnv*, jclass, jlong handle) {{"
    ));
    lines.push(format!("    delete jlongToPtr<{cpp_class}>(handle);"));
    lines.push("}".to_string());
    lines.push(String::new());

    for method in &iface.methods {
        lines.extend(method_impl(ir, ns, pkg_path, &jni_class, &cpp_class, method));
    }
    lines
}

fn method_impl(
    ir: &Ir,
    ns: &str,
    pkg_path: &str,
    jni_class: &str,
    cpp_class: &str,
    method: &MethodDecl,
) -> Vec<String> {
    let ret = marshal::jni_return_type(&method.return_ty);
    let mut jni_params = vec![
        "JNIEnv* env".to_string(),
        "jclass".to_string(),
        "jlong handle".to_string(),
    ];
    jni_params.extend(
        method
            .params
            .iter()
            .map(|p| format!("{} {}", marshal::jni_type(ir, p), p.name)),
    );

    let mut lines = vec![format!(
        "JNIEXPORT {ret} JNICALL {jni_class}_{}({}) {{",
        native_name(&method.name),
        jni_params.join(", ")
    )];

    lines.push(format!("    auto* obj = jlongToPtr<{cpp_class}>(handle);"));
    let miss = match &method.return_ty {
        TypeRef::Void => "return;",
        TypeRef::Vector(_) | TypeRef::Struct(_) => "return nullptr;",
        TypeRef::Primitive(Primitive::Str) => "return nullptr;",
        TypeRef::Primitive(Primitive::Bool) => "return JNI_FALSE;",
        _ => "return 0;",
    };
    lines.push(format!("    if (!obj) {miss}"));

    let mut args = Vec::new();
    for p in &method.params {
        lines.extend(param_conversion(ir, ns, pkg_path, p, &mut args, "    "));
    }
    let call = format!("obj->{}({})", method.name, args.join(", "));

    let release_bytes: Vec<String> = method
        .params
        .iter()
        .filter(|p| p.ty == TypeRef::Primitive(Primitive::Bytes))
        .map(|p| {
            format!(
                "    env->ReleaseByteArrayElements({0}, cpp_{0}_ptr, JNI_ABORT);",
                p.name
            )
        })
        .collect();

    match &method.return_ty {
        TypeRef::Void => {
            lines.push(format!("    {call};"));
            lines.extend(release_bytes);
        }
        TypeRef::Vector(elem) => {
            lines.push(format!("    auto result = {call};"));
            lines.extend(release_bytes);
            lines.push(String::new());
            lines.push(
                "    jclass listClass = env->FindClass(\"java/util/ArrayList\");".to_string(),
            );
            lines.push(
                "    jmethodID listCtor = env->GetMethodID(listClass, \"<init>\", \"()V\");"
                    .to_string(),
            );
            lines.push(
                "    jmethodID listAdd = env->GetMethodID(listClass, \"add\", \"(Ljava/lang/Object;)Z\");"
                    .to_string(),
            );
            lines.push("    jobject list = env->NewObject(listClass, listCtor);".to_string());
            lines.push(String::new());
            match elem.as_ref() {
                TypeRef::Struct(id) => {
                    let s = ir.struct_decl(*id);
                    lines.push(format!(
                        "    jclass itemClass = env->FindClass(\"{pkg_path}/{}\");",
                        s.name
                    ));
                    lines.push(format!(
                        "    jmethodID itemCtor = env->GetMethodID(itemClass, \"<init>\", \"{}\");",
                        struct_ctor_sig(ir, s)
                    ));
                    lines.push("    for (const auto& item : result) {".to_string());
                    lines.push(format!(
                        "        jobject jitem = env->NewObject(itemClass, itemCtor, {});",
                        struct_ctor_args(ir, s, "item")
                    ));
                    lines.push(
                        "        env->CallBooleanMethod(list, listAdd, jitem);".to_string(),
                    );
                    lines.push("    }".to_string());
                }
                TypeRef::Primitive(p) => {
                    let (class, sig) = boxed_value_of(*p);
                    lines.push(format!("    jclass boxClass = env->FindClass(\"{class}\");"));
                    lines.push(format!(
                        "    jmethodID boxValueOf = env->GetStaticMethodID(boxClass, \"valueOf\", \"{sig}\");"
                    ));
                    lines.push("    for (const auto& item : result) {".to_string());
                    lines.push(
                        "        jobject jitem = env->CallStaticObjectMethod(boxClass, boxValueOf, item);"
                            .to_string(),
                    );
                    lines.push(
                        "        env->CallBooleanMethod(list, listAdd, jitem);".to_string(),
                    );
                    lines.push("    }".to_string());
                }
                _ => {}
            }
            lines.push("    return list;".to_string());
        }
        TypeRef::Struct(id) => {
            let s = ir.struct_decl(*id);
            lines.push(format!("    auto ret = {call};"));
            lines.extend(release_bytes);
            lines.push(format!(
                "    jclass retClass = env->FindClass(\"{pkg_path}/{}\");",
                s.name
            ));
            lines.push(format!(
                "    jmethodID retCtor = env->GetMethodID(retClass, \"<init>\", \"{}\");",
                struct_ctor_sig(ir, s)
            ));
            lines.push(format!(
                "    return env->NewObject(retClass, retCtor, {});",
                struct_ctor_args(ir, s, "ret")
            ));
        }
        TypeRef::Primitive(Primitive::Bool) => {
            lines.push(format!("    auto ret = {call};"));
            lines.extend(release_bytes);
            lines.push("    return ret ? JNI_TRUE : JNI_FALSE;".to_string());
        }
        TypeRef::Primitive(Primitive::Str) => {
            lines.push(format!("    auto ret = {call};"));
            lines.extend(release_bytes);
            lines.push("    return env->NewStringUTF(ret.c_str());".to_string());
        }
        TypeRef::Enum(_) => {
            lines.push(format!("    auto ret = {call};"));
            lines.extend(release_bytes);
            lines.push("    return static_cast<jint>(ret);".to_string());
        }
        _ => {
            lines.push(format!("    auto ret = {call};"));
            lines.extend(release_bytes);
            lines.push("    return ret;".to_string());
        }
    }
    lines.push("}".to_string());
    lines.push(String::new());
    lines
}

/// Emits the conversion lines for one parameter and pushes the C++
/// argument expression.
fn param_conversion(
    ir: &Ir,
    ns: &str,
    pkg_path: &str,
    p: &Param,
    args: &mut Vec<String>,
    indent: &str,
) -> Vec<String> {
    let mut lines = Vec::new();
    let name = &p.name;
    match (&p.ty, p.mode) {
        (TypeRef::Primitive(Primitive::Str), _) => {
            lines.push(format!(
                "{indent}std::string cpp_{name} = jstringToString(env, {name});"
            ));
            args.push(format!("cpp_{name}"));
        }
        (TypeRef::Primitive(Primitive::Bytes), _) => {
            lines.push(format!(
                "{indent}jbyte* cpp_{name}_ptr = env->GetByteArrayElements({name}, nullptr);"
            ));
            lines.push(format!(
                "{indent}const uint8_t* cpp_{name} = reinterpret_cast<const uint8_t*>(cpp_{name}_ptr);"
            ));
            args.push(format!("cpp_{name}"));
        }
        (TypeRef::Primitive(Primitive::Bool), _) => {
            args.push(format!("{name} == JNI_TRUE"));
        }
        (TypeRef::Enum(id), _) => {
            args.push(format!(
                "static_cast<::{}>({name})",
                ir.enum_decl(*id).name
            ));
        }
        (TypeRef::Callback(id), _) => {
            lines.extend(callback_bridge(ir, pkg_path, name, ir.callback_decl(*id), indent));
            args.push(format!("cpp_{name}"));
        }
        (TypeRef::Interface(id), mode) => {
            let target = format!("{ns}::{}", ir.interface_decl(*id).name);
            lines.push(format!(
                "{indent}auto* cpp_{name} = jlongToPtr<{target}>({name});"
            ));
            match mode {
                PassMode::MutPtr | PassMode::ConstPtr => args.push(format!("cpp_{name}")),
                _ => args.push(format!("*cpp_{name}")),
            }
        }
        (TypeRef::Struct(id), mode) => {
            let s = ir.struct_decl(*id);
            lines.push(format!(
                "{indent}jclass {name}Class = env->GetObjectClass({name});"
            ));
            lines.push(format!("{indent}::{} cpp_{name};", s.name));
            for field in &s.fields {
                let fid = format!("{name}_{}_fid", field.name);
                lines.push(format!(
                    "{indent}jfieldID {fid} = env->GetFieldID({name}Class, \"{}\", \"{}\");",
                    field.name,
                    marshal::jni_signature(ir, &field.ty)
                ));
                let read = format!(
                    "env->{}({name}, {fid})",
                    marshal::jni_field_getter(&field.ty)
                );
                let value = match &field.ty {
                    TypeRef::Enum(eid) => {
                        format!("static_cast<::{}>({read})", ir.enum_decl(*eid).name)
                    }
                    _ => read,
                };
                lines.push(format!("{indent}cpp_{name}.{} = {value};", field.name));
            }
            match mode {
                PassMode::MutPtr | PassMode::ConstPtr => args.push(format!("&cpp_{name}")),
                _ => args.push(format!("cpp_{name}")),
            }
        }
        _ => args.push(name.clone()),
    }
    lines
}

/// Bridges a Java functional-interface object into a C++ closure. The
/// env pointer, callback object, and method id are captured by value
/// and live only as long as the enclosing native call.
fn callback_bridge(
    ir: &Ir,
    pkg_path: &str,
    name: &str,
    cb: &CallbackDecl,
    indent: &str,
) -> Vec<String> {
    let mut lines = vec![
        format!("{indent}jclass {name}Class = env->GetObjectClass({name});"),
        format!(
            "{indent}jmethodID {name}Method = env->GetMethodID({name}Class, \"invoke\", \"{}\");",
            callback_sig(ir, pkg_path, cb)
        ),
    ];

    let params = cb
        .params
        .iter()
        .map(|p| format!("{} {}", cpp_cb_param(ir, p), p.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut body = Vec::new();
    let mut call_args = vec![name.to_string(), format!("{name}Method")];
    for p in &cb.params {
        match &p.ty {
            TypeRef::Struct(id) => {
                let s = ir.struct_decl(*id);
                body.push(format!(
                    "jclass jcls_{} = env->FindClass(\"{pkg_path}/{}\");",
                    p.name, s.name
                ));
                body.push(format!(
                    "jmethodID jctor_{0} = env->GetMethodID(jcls_{0}, \"<init>\", \"{1}\");",
                    p.name,
                    struct_ctor_sig(ir, s)
                ));
                body.push(format!(
                    "jobject jarg_{0} = env->NewObject(jcls_{0}, jctor_{0}, {1});",
                    p.name,
                    struct_ctor_args(ir, s, &p.name)
                ));
                call_args.push(format!("jarg_{}", p.name));
            }
            TypeRef::Primitive(Primitive::Str) => {
                body.push(format!(
                    "jstring jarg_{0} = env->NewStringUTF({0}.c_str());",
                    p.name
                ));
                call_args.push(format!("jarg_{}", p.name));
            }
            TypeRef::Primitive(Primitive::Bool) => {
                call_args.push(format!("{} ? JNI_TRUE : JNI_FALSE", p.name));
            }
            TypeRef::Enum(_) => {
                call_args.push(format!("static_cast<jint>({})", p.name));
            }
            _ => call_args.push(p.name.clone()),
        }
    }

    let invoke = format!(
        "env->{}({})",
        marshal::jni_call_method(&cb.return_ty),
        call_args.join(", ")
    );
    lines.push(format!(
        "{indent}auto cpp_{name} = [env, {name}, {name}Method]({params}) {{"
    ));
    for line in body {
        lines.push(format!("{indent}    {line}"));
    }
    match &cb.return_ty {
        TypeRef::Void => lines.push(format!("{indent}    {invoke};")),
        TypeRef::Primitive(Primitive::Bool) => {
            lines.push(format!("{indent}    return {invoke} == JNI_TRUE;"))
        }
        TypeRef::Enum(id) => lines.push(format!(
            "{indent}    return static_cast<::{}>({invoke});",
            ir.enum_decl(*id).name
        )),
        _ => lines.push(format!("{indent}    return {invoke};")),
    }
    lines.push(format!("{indent}}};"));
    lines
}

fn cpp_cb_param(ir: &Ir, p: &Param) -> String {
    match (&p.ty, p.mode) {
        (TypeRef::Struct(id), PassMode::ConstRef) => {
            format!("const ::{}&", ir.struct_decl(*id).name)
        }
        (TypeRef::Struct(id), _) => format!("::{}", ir.struct_decl(*id).name),
        (TypeRef::Primitive(Primitive::Str), _) => "const std::string&".to_string(),
        (ty, _) => marshal::cpp_type(ir, ty),
    }
}

fn callback_sig(ir: &Ir, pkg_path: &str, cb: &CallbackDecl) -> String {
    let params: String = cb
        .params
        .iter()
        .map(|p| match &p.ty {
            TypeRef::Struct(id) => format!("L{pkg_path}/{};", ir.struct_decl(*id).name),
            ty => marshal::jni_signature(ir, ty),
        })
        .collect();
    format!("({params}){}", marshal::jni_signature(ir, &cb.return_ty))
}

fn struct_ctor_sig(ir: &Ir, s: &StructDecl) -> String {
    let params: String = s
        .fields
        .iter()
        .map(|f| marshal::jni_signature(ir, &f.ty))
        .collect();
    format!("({params})V")
}

fn struct_ctor_args(ir: &Ir, s: &StructDecl, base: &str) -> String {
    s.fields
        .iter()
        .map(|f| match &f.ty {
            TypeRef::Primitive(Primitive::Bool) => {
                format!("{base}.{} ? JNI_TRUE : JNI_FALSE", f.name)
            }
            TypeRef::Primitive(Primitive::Uint8) => {
                format!("static_cast<jbyte>({base}.{})", f.name)
            }
            TypeRef::Enum(_) => format!("static_cast<jint>({base}.{})", f.name),
            _ => format!("{base}.{}", f.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn boxed_value_of(p: Primitive) -> (&'static str, &'static str) {
    match p {
        Primitive::Int32 => ("java/lang/Integer", "(I)Ljava/lang/Integer;"),
        Primitive::Uint8 => ("java/lang/Byte", "(B)Ljava/lang/Byte;"),
        Primitive::Double => ("java/lang/Double", "(D)Ljava/lang/Double;"),
        _ => ("java/lang/Integer", "(I)Ljava/lang/Integer;"),
    }
}

/// `Java_<escaped package>_<escaped class>`; underscores in Java
/// identifiers are escaped as `_1` before dots become separators.
fn jni_class_name(package: &str, class_name: &str) -> String {
    let pkg = package.replace('_', "_1").replace('.', "_");
    let class = class_name.replace('_', "_1");
    format!("Java_{pkg}_{class}")
}

fn native_name(method: &str) -> String {
    let mut chars = method.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    format!("native{}", capitalized.replace('_', "_1"))
}

// ---------------------------------------------------------------------
// Java side
// ---------------------------------------------------------------------

fn java_types(ir: &Ir, package: &str) -> String {
    let mut lines = vec![
        "// AUTO-GENERATED - DO NOT EDIT".to_string(),
        format!("package {package};"),
        String::new(),
    ];
    for e in &ir.enums {
        lines.extend(java_enum(e));
    }
    for cb in &ir.callbacks {
        lines.extend(java_callback(ir, cb));
    }
    for s in &ir.structs {
        lines.extend(java_struct(ir, s));
    }
    lines.join("\n")
}

fn java_enum(e: &EnumDecl) -> Vec<String> {
    let mut lines = vec![format!("enum {} {{", e.name)];
    for (i, member) in e.members.iter().enumerate() {
        let sep = if i + 1 < e.members.len() { "," } else { ";" };
        lines.push(format!("    {}({}){sep}", member.name, member.value));
    }
    lines.extend([
        String::new(),
        "    private final int value;".to_string(),
        String::new(),
        format!("    {}(int value) {{", e.name),
        "        this.value = value;".to_string(),
        "    }".to_string(),
        String::new(),
        "    public int getValue() {".to_string(),
        "        return value;".to_string(),
        "    }".to_string(),
        String::new(),
        "    /** Unrecognized codes decode to the first declared member. */".to_string(),
        format!("    public static {} fromValue(int value) {{", e.name),
        format!("        for ({} e : values()) {{", e.name),
        "            if (e.value == value) return e;".to_string(),
        "        }".to_string(),
        "        return values()[0];".to_string(),
        "    }".to_string(),
        "}".to_string(),
        String::new(),
    ]);
    lines
}

fn java_callback(ir: &Ir, cb: &CallbackDecl) -> Vec<String> {
    let params = cb
        .params
        .iter()
        .map(|p| format!("{} {}", marshal::java_type(ir, &p.ty), p.name))
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        "@FunctionalInterface".to_string(),
        format!("interface {} {{", cb.name),
        format!(
            "    {} invoke({params});",
            marshal::java_type(ir, &cb.return_ty)
        ),
        "}".to_string(),
        String::new(),
    ]
}

fn java_struct(ir: &Ir, s: &StructDecl) -> Vec<String> {
    let mut lines = vec![format!("class {} {{", s.name)];
    for field in &s.fields {
        lines.push(format!(
            "    public {} {};",
            marshal::java_type(ir, &field.ty),
            field.name
        ));
    }
    let params = s
        .fields
        .iter()
        .map(|f| format!("{} {}", marshal::java_type(ir, &f.ty), f.name))
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(String::new());
    lines.push(format!("    public {}({params}) {{", s.name));
    for field in &s.fields {
        lines.push(format!("        this.{0} = {0};", field.name));
    }
    lines.push("    }".to_string());
    lines.push("}".to_string());
    lines.push(String::new());
    lines
}

fn java_interface_class(ir: &Ir, ns: &str, package: &str, iface: &InterfaceDecl) -> String {
    let name = &iface.name;
    let mut lines = vec![
        "// AUTO-GENERATED - DO NOT EDIT".to_string(),
        format!("package {package};"),
        String::new(),
        format!("public class {name} implements AutoCloseable {{"),
        String::new(),
        "    static {".to_string(),
        format!("        System.loadLibrary(\"{ns}_jni\");"),
        "    }".to_string(),
        String::new(),
        "    private long nativeHandle;".to_string(),
        String::new(),
    ];

    let ctor_params = java_params(ir, &iface.ctor_params);
    let ctor_args = iface
        .ctor_params
        .iter()
        .map(|p| p.name.clone())
        .collect::<Vec<_>>()
        .join(", ");
    lines.extend([
        format!("    public {name}({ctor_params}) {{"),
        format!("        this.nativeHandle = nativeCreate({ctor_args});"),
        "        if (this.nativeHandle == 0) {".to_string(),
        format!("            throw new RuntimeException(\"Failed to create {name}\");"),
        "        }".to_string(),
        "    }".to_string(),
        String::new(),
        "    @Override".to_string(),
        "    public void close() {".to_string(),
        "        if (nativeHandle != 0) {".to_string(),
        "            nativeDestroy(nativeHandle);".to_string(),
        "            nativeHandle = 0;".to_string(),
        "        }".to_string(),
        "    }".to_string(),
        String::new(),
    ]);

    for method in &iface.methods {
        let ret = marshal::java_type(ir, &method.return_ty);
        let params = java_params(ir, &method.params);
        let mut call_args = vec!["nativeHandle".to_string()];
        call_args.extend(method.params.iter().map(|p| p.name.clone()));
        let call = format!("{}({})", java_native_name(&method.name), call_args.join(", "));
        lines.push(format!("    public {ret} {}({params}) {{", method.name));
        if method.return_ty.is_void() {
            lines.push(format!("        {call};"));
        } else {
            lines.push(format!("        return {call};"));
        }
        lines.push("    }".to_string());
        lines.push(String::new());
    }

    lines.push("    // Native methods".to_string());
    lines.push(format!(
        "    private static native long nativeCreate({ctor_params});"
    ));
    lines.push("    private static native void nativeDestroy(long handle);".to_string());
    for method in &iface.methods {
        let ret = marshal::java_type(ir, &method.return_ty);
        let mut params = vec!["long handle".to_string()];
        if !method.params.is_empty() {
            params.push(java_params(ir, &method.params));
        }
        lines.push(format!(
            "    private static native {ret} {}({});",
            java_native_name(&method.name),
            params.join(", ")
        ));
    }
    lines.push("}".to_string());
    lines.join("\n")
}

fn java_params(ir: &Ir, params: &[Param]) -> String {
    params
        .iter()
        .map(|p| format!("{} {}", marshal::java_type(ir, &p.ty), p.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn java_native_name(method: &str) -> String {
    let mut chars = method.chars();
    match chars.next() {
        Some(first) => format!("native{}{}", first.to_uppercase(), chars.as_str()),
        None => "native".to_string(),
    }
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
    fn emits_native_and_java_artifacts() {
        let set = artifacts(
            "namespace calc;\n\
             interface Calculator { Calculator(int precision); int add(int a, int b); }\n",
        );
        assert!(set.contains_key("calc_jni.h"));
        assert!(set.contains_key("calc_jni.cpp"));
        assert!(set.contains_key("java/calc/Types.java"));
        assert!(set.contains_key("java/calc/Calculator.java"));
    }

    #[test]
    fn exported_names_follow_jni_mangling() {
        let set = artifacts(
            "namespace calc;\n\
             interface Engine { void run(); }\n",
        );
        let header = &set["calc_jni.h"];
        assert!(header.contains(
            "JNIEXPORT jlong JNICALL Java_calc_Engine_nativeCreate(JNIEnv*, jclass);"
        ));
        assert!(header.contains(
            "JNIEXPORT void JNICALL Java_calc_Engine_nativeRun(JNIEnv*, jclass, jlong);"
        ));
    }

    #[test]
    fn underscored_package_escapes_in_exported_names() {
        let ir = compile(
            "namespace app;\n\
             interface Engine { void run(); }\n",
        )
        .expect("compile");
        let mut options = Options::new("out");
        options.java_package = Some("com.my_app".to_string());
        let set = generate(&ir, &options).expect("generate");
        let header = &set["app_jni.h"];
        // Underscores in Java identifiers escape as _1 before dots
        // become separators.
        assert!(header.contains("Java_com_my_1app_Engine_nativeCreate"));
        assert!(set.contains_key("java/com/my_app/Engine.java"));
    }

    #[test]
    fn java_class_is_auto_closeable() {
        let set = artifacts(
            "namespace calc;\n\
             interface Calculator { int add(int a, int b); }\n",
        );
        let java = &set["java/calc/Calculator.java"];
        assert!(java.contains("public class Calculator implements AutoCloseable {"));
        assert!(java.contains("System.loadLibrary(\"calc_jni\");"));
        assert!(java.contains("nativeDestroy(nativeHandle);"));
        assert!(java.contains("private static native int nativeAdd(long handle, int a, int b);"));
    }

    #[test]
    fn enum_decodes_unknown_codes_to_first_member() {
        let set = artifacts(
            "namespace app;\n\
             enum Mode { Off = 0, On = 1 }\n",
        );
        let types = &set["java/app/Types.java"];
        assert!(types.contains("enum Mode {"));
        assert!(types.contains("    Off(0),"));
        assert!(types.contains("    On(1);"));
        assert!(types.contains("return values()[0];"));
        assert!(!types.contains("IllegalArgumentException"));
    }

    #[test]
    fn callback_bridge_is_call_scoped() {
        let set = artifacts(
            "namespace app;\n\
             struct Hit { int id; double score; }\n\
             callback OnHit(const Hit& hit, int index);\n\
             interface Scanner { void scan(OnHit handler); }\n",
        );
        let body = &set["app_jni.cpp"];
        assert!(body.contains(
            "jmethodID handlerMethod = env->GetMethodID(handlerClass, \"invoke\", \"(Lapp/Hit;I)V\");"
        ));
        assert!(body.contains(
            "auto cpp_handler = [env, handler, handlerMethod](const ::Hit& hit, int index) {"
        ));
        assert!(!body.contains("NewGlobalRef"));
        assert!(!body.contains("thread_local"));
    }

    #[test]
    fn struct_params_rebuild_field_by_field() {
        let set = artifacts(
            "namespace geo;\n\
             struct Point { int x; int y; }\n\
             interface Store { void put(const Point& p); }\n",
        );
        let body = &set["geo_jni.cpp"];
        assert!(body.contains("::Point cpp_p;"));
        assert!(body.contains(
            "jfieldID p_x_fid = env->GetFieldID(pClass, \"x\", \"I\");"
        ));
        assert!(body.contains("cpp_p.x = env->GetIntField(p, p_x_fid);"));
        assert!(body.contains("obj->put(cpp_p);"));
    }

    #[test]
    fn vector_of_structs_returns_array_list() {
        let set = artifacts(
            "namespace geo;\n\
             struct Point { int x; int y; }\n\
             interface Store { vector<Point> all(); }\n",
        );
        let body = &set["geo_jni.cpp"];
        assert!(body.contains("jclass itemClass = env->FindClass(\"geo/Point\");"));
        assert!(body.contains(
            "jmethodID itemCtor = env->GetMethodID(itemClass, \"<init>\", \"(II)V\");"
        ));
        assert!(body.contains("env->NewObject(itemClass, itemCtor, item.x, item.y);"));
        let java = &set["java/geo/Store.java"];
        assert!(java.contains("public java.util.List<Point> all() {"));
    }

    #[test]
    fn vector_of_ints_boxes_elements() {
        let set = artifacts(
            "namespace app;\n\
             interface Counter { vector<int> counts(); }\n",
        );
        let body = &set["app_jni.cpp"];
        assert!(body.contains("jclass boxClass = env->FindClass(\"java/lang/Integer\");"));
        assert!(body.contains("env->CallStaticObjectMethod(boxClass, boxValueOf, item);"));
    }

    #[test]
    fn bytes_param_releases_array_after_call() {
        let set = artifacts(
            "namespace app;\n\
             interface Decoder { int feed(bytes data, int length); }\n",
        );
        let body = &set["app_jni.cpp"];
        assert!(body.contains(
            "jbyte* cpp_data_ptr = env->GetByteArrayElements(data, nullptr);"
        ));
        assert!(body.contains(
            "env->ReleaseByteArrayElements(data, cpp_data_ptr, JNI_ABORT);"
        ));
    }

    #[test]
    fn nested_struct_field_fails_generation() {
        let ir = compile(
            "namespace app;\n\
             struct Inner { int a; }\n\
             struct Outer { Inner inner; int b; }\n\
             interface Store { void put(Outer o); }\n",
        )
        .expect("compile");
        let err = generate(&ir, &Options::new("out")).unwrap_err();
        assert!(err.to_string().contains("jni"));
        assert!(err.to_string().contains("Outer"));
    }

    #[test]
    fn bytes_return_fails_generation() {
        let ir = compile(
            "namespace app;\n\
             interface Source { bytes raw(); }\n",
        )
        .expect("compile");
        let err = generate(&ir, &Options::new("out")).unwrap_err();
        assert!(err.to_string().contains("byte buffer"));
    }
}
