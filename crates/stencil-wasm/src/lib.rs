//! WASM bindings for the Stencil compiler.
//!
//! Exposes `compile()`, `render()` and `tokenize()` to JavaScript via
//! wasm-bindgen. Comments are always lexed; errors are thrown as JS errors.

use wasm_bindgen::prelude::*;

use stencil_engine::{CommentExtension, EngineError, Environment, EnvironmentOptions};
use stencil_lexer::{Source, Token};

fn environment(debug: bool) -> Result<Environment, EngineError> {
    let mut env = Environment::new(EnvironmentOptions {
        debug,
        ..EnvironmentOptions::default()
    })?;
    CommentExtension::set_lexer(&mut env)?;
    env.add_extension(&CommentExtension);
    Ok(env)
}

/// Compiled module plus the number of comments found.
fn compile_native(source: &str, debug: bool) -> Result<(String, usize), EngineError> {
    let env = environment(debug)?;
    let doc = env.parse_source(&Source::anonymous(source))?;
    let js = env.compile(&doc)?;
    Ok((js, doc.comments().len()))
}

fn render_native(source: &str, context_json: &str) -> Result<String, String> {
    let context: serde_json::Value = if context_json.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(context_json).map_err(|e| format!("Invalid context: {e}"))?
    };
    let env = environment(false).map_err(|e| e.to_string())?;
    env.render(&Source::anonymous(source), &context)
        .map_err(|e| e.to_string())
}

fn tokenize_native(source: &str) -> Result<Vec<Token>, EngineError> {
    let env = environment(false)?;
    Ok(env.tokenize(&Source::anonymous(source))?.into_tokens())
}

/// Compile a template to a JavaScript module.
///
/// Returns a JS object with `{ js: string, comments: number }`.
/// Throws a JS error if lexing, parsing or code generation fails.
#[wasm_bindgen]
pub fn compile(source: &str, debug: bool) -> Result<JsValue, JsError> {
    let (js, comments) = compile_native(source, debug).map_err(|e| JsError::new(&e.to_string()))?;

    let js_obj = js_sys::Object::new();
    js_sys::Reflect::set(&js_obj, &"js".into(), &js.into())
        .map_err(|_| JsError::new("Failed to set js property"))?;
    js_sys::Reflect::set(&js_obj, &"comments".into(), &(comments as u32).into())
        .map_err(|_| JsError::new("Failed to set comments property"))?;

    Ok(js_obj.into())
}

/// Render a template against a JSON context string.
#[wasm_bindgen]
pub fn render(source: &str, context_json: &str) -> Result<String, JsError> {
    render_native(source, context_json).map_err(|e| JsError::new(&e))
}

/// Tokenize a template into an array of `{ kind, value, line }` objects.
#[wasm_bindgen]
pub fn tokenize(source: &str) -> Result<JsValue, JsError> {
    let tokens = tokenize_native(source).map_err(|e| JsError::new(&e.to_string()))?;
    serde_wasm_bindgen::to_value(&tokens).map_err(|e| JsError::new(&e.to_string()))
}

/// Get the compiler version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
