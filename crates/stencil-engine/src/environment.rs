use serde::Deserialize;
use serde_json::Value;

use stencil_codegen::{Compiler, RenderOptions};
use stencil_lexer::{Lexer, LexerOptions, Source, TokenStream, Tokenize};
use stencil_parser::{Document, Parser, TagRegistry, TokenParser};

use crate::{EngineError, Extension};

/// Environment settings, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EnvironmentOptions {
    /// Keep exposed comments in compiled output.
    pub debug: bool,
    pub autoescape: bool,
    pub strict_variables: bool,
    pub lexer: LexerOptions,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            debug: false,
            autoescape: true,
            strict_variables: false,
            lexer: LexerOptions::default(),
        }
    }
}

/// The active lexer, tags and settings templates are processed with.
pub struct Environment {
    options: EnvironmentOptions,
    lexer: Box<dyn Tokenize>,
    tags: TagRegistry,
    extensions: Vec<&'static str>,
}

impl Environment {
    /// An environment with the base lexer and the built-in tags.
    pub fn new(options: EnvironmentOptions) -> Result<Self, EngineError> {
        let lexer = Lexer::new(options.lexer.clone())?;
        Ok(Self {
            options,
            lexer: Box::new(lexer),
            tags: TagRegistry::with_builtins(),
            extensions: Vec::new(),
        })
    }

    pub fn options(&self) -> &EnvironmentOptions {
        &self.options
    }

    pub fn is_debug(&self) -> bool {
        self.options.debug
    }

    pub fn set_lexer(&mut self, lexer: Box<dyn Tokenize>) {
        self.lexer = lexer;
    }

    /// Register every tag of `extension`; later tags replace earlier ones
    /// with the same name.
    pub fn add_extension(&mut self, extension: &dyn Extension) {
        for parser in extension.token_parsers() {
            self.add_token_parser(parser);
        }
        tracing::debug!(extension = extension.name(), "extension added");
        self.extensions.push(extension.name());
    }

    pub fn add_token_parser(&mut self, parser: Box<dyn TokenParser>) {
        self.tags.register(parser);
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(&name)
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    pub fn tokenize(&self, source: &Source) -> Result<TokenStream, EngineError> {
        Ok(self.lexer.tokenize(source)?)
    }

    pub fn parse(&self, stream: TokenStream) -> Result<Document, EngineError> {
        Ok(Parser::parse(stream, &self.tags)?)
    }

    pub fn parse_source(&self, source: &Source) -> Result<Document, EngineError> {
        self.parse(self.tokenize(source)?)
    }

    pub fn compile(&self, doc: &Document) -> Result<String, EngineError> {
        let compiler = Compiler::new(self.is_debug()).with_autoescape(self.options.autoescape);
        Ok(compiler.compile(doc)?)
    }

    /// Tokenize, parse and compile a template into a JavaScript module.
    #[tracing::instrument(level = "debug", skip_all, fields(source = %source.name))]
    pub fn compile_source(&self, source: &Source) -> Result<String, EngineError> {
        let doc = self.parse_source(source)?;
        let js = self.compile(&doc)?;
        tracing::debug!(bytes = js.len(), "compiled");
        Ok(js)
    }

    /// Tokenize, parse and render a template against `context`.
    #[tracing::instrument(level = "debug", skip_all, fields(source = %source.name))]
    pub fn render(&self, source: &Source, context: &Value) -> Result<String, EngineError> {
        let doc = self.parse_source(source)?;
        let options = RenderOptions {
            autoescape: self.options.autoescape,
            strict_variables: self.options.strict_variables,
        };
        Ok(stencil_codegen::render(&doc, context, &options)?)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("options", &self.options)
            .field("tags", &self.tags)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}
