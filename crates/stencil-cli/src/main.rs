use clap::{Parser, Subcommand};
use std::path::Path;

use stencil_engine::{CommentExtension, Environment, EnvironmentOptions};
use stencil_lexer::Source;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stencil")]
#[command(about = "Stencil template compiler")]
#[command(version)]
struct Cli {
    /// Environment options as a JSON file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Use the base lexer, which drops `{# #}` comments
    #[arg(long, global = true)]
    no_comments: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the token stream of a template
    Tokenize {
        /// Input template
        path: String,

        /// Print tokens as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile a template to a JavaScript module
    Compile {
        /// Input template
        path: String,

        /// Keep exposed comments in the output
        #[arg(long)]
        debug: bool,
    },

    /// Render a template against a JSON context
    Render {
        /// Input template
        path: String,

        /// Context as a JSON file
        #[arg(long)]
        context: Option<String>,
    },

    /// Check a template for errors without generating output
    Check {
        /// Input template
        path: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut options = load_options(cli.config.as_deref());
    if let Command::Compile { debug: true, .. } = cli.command {
        options.debug = true;
    }
    let env = environment(options, !cli.no_comments);

    match &cli.command {
        Command::Tokenize { path, json } => cmd_tokenize(&env, path, *json),
        Command::Compile { path, .. } => cmd_compile(&env, path),
        Command::Render { path, context } => cmd_render(&env, path, context.as_deref()),
        Command::Check { path } => cmd_check(&env, path),
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn read_file(path: &str) -> String {
    let p = Path::new(path);
    if !p.exists() {
        fail(format!("file not found: {path}"));
    }
    std::fs::read_to_string(p).unwrap_or_else(|e| fail(format!("reading {path}: {e}")))
}

fn read_source(path: &str) -> Source {
    Source::new(path, read_file(path))
}

fn load_options(config: Option<&str>) -> EnvironmentOptions {
    let Some(path) = config else {
        return EnvironmentOptions::default();
    };
    serde_json::from_str(&read_file(path)).unwrap_or_else(|e| fail(format!("invalid config {path}: {e}")))
}

fn environment(options: EnvironmentOptions, comments: bool) -> Environment {
    let mut env = Environment::new(options).unwrap_or_else(|e| fail(e));
    if comments {
        CommentExtension::set_lexer(&mut env).unwrap_or_else(|e| fail(e));
        env.add_extension(&CommentExtension);
    }
    tracing::debug!(tags = ?env.tags().tags(), comments, "environment ready");
    env
}

fn cmd_tokenize(env: &Environment, path: &str, json: bool) {
    let stream = env.tokenize(&read_source(path)).unwrap_or_else(|e| fail(e));

    if json {
        match serde_json::to_string_pretty(stream.tokens()) {
            Ok(out) => println!("{out}"),
            Err(e) => fail(e),
        }
        return;
    }

    for token in stream.tokens() {
        println!("{:>4}  {:<20} {:?}", token.line, format!("{:?}", token.kind), token.value);
    }
}

fn cmd_compile(env: &Environment, path: &str) {
    let js = env.compile_source(&read_source(path)).unwrap_or_else(|e| fail(e));
    print!("{js}");
}

fn cmd_render(env: &Environment, path: &str, context: Option<&str>) {
    let context = match context {
        Some(file) => serde_json::from_str(&read_file(file))
            .unwrap_or_else(|e| fail(format!("invalid context {file}: {e}"))),
        None => serde_json::Value::Object(serde_json::Map::new()),
    };
    let out = env
        .render(&read_source(path), &context)
        .unwrap_or_else(|e| fail(e));
    print!("{out}");
}

fn cmd_check(env: &Environment, path: &str) {
    let source = read_source(path);
    let doc = env.parse_source(&source).unwrap_or_else(|e| fail(e));

    // Also compile to catch codegen errors
    if let Err(e) = env.compile(&doc) {
        fail(e);
    }

    eprintln!("OK: {path} ({} comments)", doc.comments().len());
}
