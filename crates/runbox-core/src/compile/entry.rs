//! Entry point discovery and FFI shim generation.
//!
//! Guest programs are ordinary Rust `main` programs. To load them as a
//! library, the entry file gets a small shim appended that exports
//! [`ENTRY_SYMBOL`] and [`FREE_SYMBOL`]. The shim is appended, never
//! prepended, so line numbers in diagnostics match the submitted file.

use std::collections::BTreeSet;

use syn::{FnArg, Item, ReturnType, Type};

/// Symbol exported by the shim that runs the guest `main`.
pub const ENTRY_SYMBOL: &str = "runbox_entry";

/// Symbol exported by the shim that frees a returned message buffer.
pub const FREE_SYMBOL: &str = "runbox_free";

/// How the guest `main` is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryShape {
    /// `fn main()`, with any return type std accepts from `main`.
    NoArgs,
    /// `fn main(args: Vec<String>)`: receives an empty argument vector.
    ArgVector,
    /// `fn main(args: &[String])`: receives an empty slice.
    ArgSlice,
}

/// What the entry file declares, as far as the shim cares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryScan {
    /// Shape of `main`, if there is one.
    pub entry: Option<EntryShape>,
    /// Out-of-line modules already declared (`mod foo;`).
    pub declared_modules: BTreeSet<String>,
    /// `main` is declared `-> !`.
    pub diverges: bool,
}

/// Scan the entry file.
///
/// Uses `syn`; source that does not parse falls back to a textual scan so
/// that rustc, not the scanner, reports the syntax error.
pub fn scan_entry_file(source: &str) -> EntryScan {
    match syn::parse_file(source) {
        Ok(file) => {
            let mut scan = EntryScan::default();
            for item in &file.items {
                match item {
                    Item::Fn(func) if func.sig.ident == "main" => {
                        scan.entry = Some(shape_of(&func.sig));
                        scan.diverges = matches!(
                            &func.sig.output,
                            ReturnType::Type(_, ty) if matches!(**ty, Type::Never(_))
                        );
                    }
                    Item::Mod(module) if module.content.is_none() => {
                        scan.declared_modules.insert(module.ident.to_string());
                    }
                    _ => {}
                }
            }
            scan
        }
        Err(e) => {
            tracing::debug!("Entry file did not parse ({}); using textual scan", e);
            textual_scan(source)
        }
    }
}

fn shape_of(sig: &syn::Signature) -> EntryShape {
    match sig.inputs.first() {
        None => EntryShape::NoArgs,
        Some(FnArg::Typed(arg)) if matches!(*arg.ty, Type::Reference(_)) => EntryShape::ArgSlice,
        Some(_) => EntryShape::ArgVector,
    }
}

fn textual_scan(source: &str) -> EntryScan {
    let mut scan = EntryScan::default();
    if source.contains("fn main()") {
        scan.entry = Some(EntryShape::NoArgs);
    } else if source.contains("fn main(") {
        scan.entry = Some(if source.contains("&[String]") {
            EntryShape::ArgSlice
        } else {
            EntryShape::ArgVector
        });
    }
    for line in source.lines() {
        let line = line.trim();
        let rest = line
            .strip_prefix("pub mod ")
            .or_else(|| line.strip_prefix("mod "));
        if let Some(name) = rest.and_then(|r| r.strip_suffix(';')) {
            scan.declared_modules.insert(name.trim().to_string());
        }
    }
    scan
}

/// Generate the code appended to the entry file.
///
/// `extra_modules` are module names of the other submitted files; those not
/// already declared in the entry file are declared here. Without an entry
/// point only the module declarations are emitted, so the library has no
/// [`ENTRY_SYMBOL`] and the runner reports a missing entry point.
pub fn generate_shim(scan: &EntryScan, extra_modules: &[String]) -> String {
    let mut code = String::new();

    code.push_str("\n\n// ---- runbox entry shim (generated) ----\n");

    for module in extra_modules {
        if !scan.declared_modules.contains(module) {
            code.push_str(&format!("mod {};\n", module));
        }
    }

    let Some(shape) = scan.entry else {
        return code;
    };
    let diverges = scan.diverges;

    let call = match shape {
        EntryShape::NoArgs => "main()",
        EntryShape::ArgVector => "main(::std::vec::Vec::new())",
        EntryShape::ArgSlice => "main(&[])",
    };

    // Mirrors the std `Termination` impls, which cannot be called directly.
    code.push_str(
        r#"
#[doc(hidden)]
trait __RunboxOutcome {
    fn __runbox_outcome(self) -> ::std::result::Result<i32, ::std::string::String>;
}

impl __RunboxOutcome for () {
    fn __runbox_outcome(self) -> ::std::result::Result<i32, ::std::string::String> {
        Ok(0)
    }
}

impl __RunboxOutcome for ::std::process::ExitCode {
    fn __runbox_outcome(self) -> ::std::result::Result<i32, ::std::string::String> {
        Ok((0u8..=255)
            .find(|n| ::std::process::ExitCode::from(*n) == self)
            .map_or(1, i32::from))
    }
}

impl __RunboxOutcome for ::std::convert::Infallible {
    fn __runbox_outcome(self) -> ::std::result::Result<i32, ::std::string::String> {
        match self {}
    }
}

impl<T: __RunboxOutcome, E: ::std::fmt::Debug> __RunboxOutcome for ::std::result::Result<T, E> {
    fn __runbox_outcome(self) -> ::std::result::Result<i32, ::std::string::String> {
        match self {
            Ok(value) => value.__runbox_outcome(),
            Err(e) => Err(format!("Error: {:?}", e)),
        }
    }
}
"#,
    );

    code.push_str(&format!(
        r#"
#[doc(hidden)]
#[allow(unreachable_code)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn {entry}(out_ptr: *mut *mut u8, out_len: *mut usize) -> i32 {{
    let result = ::std::panic::catch_unwind(|| {outcome}({call}));
    let _ = ::std::io::Write::flush(&mut ::std::io::stdout());
    let _ = ::std::io::Write::flush(&mut ::std::io::stderr());
    let (code, message) = match result {{
        Ok(Ok(code)) => return code,
        Ok(Err(message)) => (-2, message),
        Err(payload) => {{
            let message = if let Some(s) = payload.downcast_ref::<&str>() {{
                s.to_string()
            }} else if let Some(s) = payload.downcast_ref::<::std::string::String>() {{
                s.clone()
            }} else {{
                "Box<dyn Any>".to_string()
            }};
            (-4, message)
        }}
    }};
    let mut bytes = message.into_bytes().into_boxed_slice();
    unsafe {{
        *out_len = bytes.len();
        *out_ptr = bytes.as_mut_ptr();
    }}
    ::std::mem::forget(bytes);
    code
}}

#[doc(hidden)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn {free}(ptr: *mut u8, len: usize) {{
    if !ptr.is_null() {{
        unsafe {{
            drop(::std::boxed::Box::from_raw(::std::ptr::slice_from_raw_parts_mut(ptr, len)));
        }}
    }}
}}
"#,
        entry = ENTRY_SYMBOL,
        free = FREE_SYMBOL,
        call = call,
        outcome = if diverges {
            "<() as __RunboxOutcome>::__runbox_outcome"
        } else {
            "__RunboxOutcome::__runbox_outcome"
        },
    ));

    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_plain_main() {
        let scan = scan_entry_file("fn main() { println!(\"hi\"); }");
        assert_eq!(scan.entry, Some(EntryShape::NoArgs));
    }

    #[test]
    fn test_scan_result_main() {
        let scan = scan_entry_file("fn main() -> Result<(), String> { Ok(()) }");
        assert_eq!(scan.entry, Some(EntryShape::NoArgs));
    }

    #[test]
    fn test_scan_arg_vector_main() {
        let scan = scan_entry_file("fn main(args: Vec<String>) { let _ = args; }");
        assert_eq!(scan.entry, Some(EntryShape::ArgVector));

        let scan = scan_entry_file("fn main(args: &[String]) { let _ = args; }");
        assert_eq!(scan.entry, Some(EntryShape::ArgSlice));
    }

    #[test]
    fn test_scan_missing_main() {
        let scan = scan_entry_file("pub fn helper() -> i32 { 1 }");
        assert_eq!(scan.entry, None);
    }

    #[test]
    fn test_scan_nested_main_is_not_entry() {
        let scan = scan_entry_file("mod inner { pub fn main() {} }");
        assert_eq!(scan.entry, None);
    }

    #[test]
    fn test_scan_declared_modules() {
        let scan = scan_entry_file("mod utils;\npub mod math;\nmod inline { }\nfn main() {}");
        assert!(scan.declared_modules.contains("utils"));
        assert!(scan.declared_modules.contains("math"));
        assert!(!scan.declared_modules.contains("inline"));
    }

    #[test]
    fn test_textual_fallback_on_syntax_error() {
        let scan = scan_entry_file("mod utils;\nfn main() { let x = ; }");
        assert_eq!(scan.entry, Some(EntryShape::NoArgs));
        assert!(scan.declared_modules.contains("utils"));
    }

    #[test]
    fn test_shim_declares_missing_modules_only() {
        let scan = scan_entry_file("mod utils;\nfn main() {}");
        let shim = generate_shim(&scan, &["utils".to_string(), "math".to_string()]);
        assert!(shim.contains("mod math;"));
        assert!(!shim.contains("mod utils;"));
    }

    #[test]
    fn test_shim_exports_entry() {
        let scan = scan_entry_file("fn main(args: Vec<String>) {}");
        let shim = generate_shim(&scan, &[]);
        assert!(shim.contains("pub unsafe extern \"C\" fn runbox_entry"));
        assert!(shim.contains("pub unsafe extern \"C\" fn runbox_free"));
        assert!(shim.contains("main(::std::vec::Vec::new())"));
        assert!(shim.contains("catch_unwind"));
    }

    #[test]
    fn test_shim_without_entry_exports_nothing() {
        let scan = scan_entry_file("pub fn helper() {}");
        let shim = generate_shim(&scan, &[]);
        assert!(!shim.contains(ENTRY_SYMBOL));
    }

    #[test]
    fn test_scan_diverging_main() {
        let scan = scan_entry_file("fn main() -> ! { std::process::exit(0) }");
        assert_eq!(scan.entry, Some(EntryShape::NoArgs));
        assert!(scan.diverges);

        let shim = generate_shim(&scan, &[]);
        assert!(shim.contains("<() as __RunboxOutcome>::__runbox_outcome(main())"));
        assert!(!scan_entry_file("fn main() {}").diverges);
    }

    #[test]
    fn test_shim_covers_termination_types() {
        let scan = scan_entry_file("fn main() -> std::process::ExitCode { 0.into() }");
        let shim = generate_shim(&scan, &[]);
        assert!(shim.contains("impl __RunboxOutcome for ::std::process::ExitCode"));
        assert!(shim.contains("impl __RunboxOutcome for ::std::convert::Infallible"));
        assert!(shim.contains("for ::std::result::Result<T, E>"));
        assert!(shim.contains("Ok(Ok(code)) => return code"));
    }

    #[test]
    fn test_shim_parses() {
        let source = "fn main() {}";
        let scan = scan_entry_file(source);
        let full = format!("{}{}", source, generate_shim(&scan, &[]));
        assert!(syn::parse_file(&full).is_ok());
    }
}
