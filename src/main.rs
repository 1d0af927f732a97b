use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use reactive_expr::compiler::{self, disasm};
use reactive_expr::diagnostic::{self, Diagnostic};
use reactive_expr::vm::builtins;
use reactive_expr::{Engine, EngineConfig, Expr, Stmt, Store, Value, ast, parser};

#[derive(Parser, Debug)]
#[command(name = "rexpr", version)]
#[command(about = "Compile, inspect and evaluate reactive expressions")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Report errors as one-line JSON on stderr
    #[arg(long, global = true)]
    json_errors: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate an expression and print its value
    Eval {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        options: EvalOptions,
        /// Evaluate N times through the cache
        #[arg(long, default_value_t = 1)]
        repeat: usize,
        /// Print cache statistics to stderr
        #[arg(long)]
        stats: bool,
    },
    /// Run a statement block and print the value it returns
    Run {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        options: EvalOptions,
    },
    /// Print the syntax tree as JSON
    Ast {
        #[command(flatten)]
        input: Input,
        /// Treat the input as a statement block
        #[arg(long)]
        block: bool,
    },
    /// Print the input in canonical source form
    Fmt {
        #[command(flatten)]
        input: Input,
        /// Treat the input as a statement block
        #[arg(long)]
        block: bool,
    },
    /// Print the compiled bytecode
    Disasm {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        options: EvalOptions,
        /// Treat the input as a statement block
        #[arg(long)]
        block: bool,
    },
    /// List the builtin functions with their arity
    Builtins,
}

#[derive(Args, Debug)]
struct Input {
    /// Source text
    source: Option<String>,

    /// Read a JSON syntax tree instead of source text
    #[arg(long, value_name = "PATH", conflicts_with = "source")]
    ast_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EvalOptions {
    /// Bind a variable: NAME=JSON (plain text when not valid JSON).
    /// Use Scope::name for scoped variables.
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// Engine configuration JSON file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable constant folding
    #[arg(long)]
    no_fold: bool,

    /// Disable dead-code elimination
    #[arg(long)]
    no_dce: bool,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(d) => {
            if cli.json_errors {
                eprintln!("{}", diagnostic::json::render(&d));
            } else {
                eprint!("{}", diagnostic::text::render(&d, std::io::stderr().is_terminal()));
            }
            ExitCode::FAILURE
        }
    }
}

// Silent unless RUST_LOG is set.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn run(command: Command) -> Result<(), Diagnostic> {
    match command {
        Command::Eval { input, options, repeat, stats } => {
            let source = input.load()?;
            let expr = source.expr()?;
            let engine = Engine::new(options.config()?);
            let mut store = options.store(&engine)?;
            let mut value = Value::Null;
            for _ in 0..repeat.max(1) {
                value = engine.evaluate(&expr, &mut store).map_err(|e| source.diagnose(&e))?;
            }
            println!("{value}");
            if stats {
                if let Some(s) = engine.stats() {
                    eprintln!("{s}");
                }
            }
        }
        Command::Run { input, options } => {
            let source = input.load()?;
            let stmts = source.block()?;
            let engine = Engine::new(options.config()?);
            let mut store = options.store(&engine)?;
            let value = engine.run(&stmts, &mut store).map_err(|e| source.diagnose(&e))?;
            println!("{value}");
        }
        Command::Ast { input, block } => {
            let source = input.load()?;
            let json = if block {
                serde_json::to_string_pretty(&source.block()?)
            } else {
                serde_json::to_string_pretty(&source.expr()?)
            };
            println!("{}", json.map_err(|e| Diagnostic::error(e.to_string()))?);
        }
        Command::Fmt { input, block } => {
            let source = input.load()?;
            if block {
                println!("{}", ast::print::format_block(&source.block()?));
            } else {
                println!("{}", source.expr()?);
            }
        }
        Command::Disasm { input, options, block } => {
            let source = input.load()?;
            let config = options.config()?;
            let program = if block {
                compiler::compile_block(&source.block()?, &config.compile)
            } else {
                compiler::compile_with(&source.expr()?, &config.compile)
            };
            let program = program.map_err(|e| source.diagnose(&e.into()))?;
            print!("{}", disasm::disassemble(&program));
        }
        Command::Builtins => {
            for b in builtins::all() {
                let purity = if b.pure { "" } else { "  (impure)" };
                println!("{:<18}{}{purity}", b.name, b.arity());
            }
        }
    }
    Ok(())
}

enum Source {
    Text(String),
    Json(String),
}

impl Input {
    fn load(&self) -> Result<Source, Diagnostic> {
        match (&self.source, &self.ast_file) {
            (Some(text), _) => Ok(Source::Text(text.clone())),
            (None, Some(path)) => std::fs::read_to_string(path)
                .map(Source::Json)
                .map_err(|e| Diagnostic::error(format!("cannot read {}: {e}", path.display()))),
            (None, None) => Err(Diagnostic::error("no input").with_suggestion("pass SOURCE or --ast-file <PATH>")),
        }
    }
}

impl Source {
    fn expr(&self) -> Result<Expr, Diagnostic> {
        match self {
            Source::Text(text) => parser::expression(text).map_err(|e| self.diagnose(&e)),
            Source::Json(json) => serde_json::from_str(json).map_err(|e| self.diagnose(&e.into())),
        }
    }

    fn block(&self) -> Result<Vec<Stmt>, Diagnostic> {
        match self {
            Source::Text(text) => parser::statements(text).map_err(|e| self.diagnose(&e)),
            Source::Json(json) => serde_json::from_str(json).map_err(|e| self.diagnose(&e.into())),
        }
    }

    fn diagnose(&self, e: &reactive_expr::Error) -> Diagnostic {
        let d = Diagnostic::from(e);
        match self {
            Source::Text(text) => d.with_source(text.clone()),
            Source::Json(_) => d,
        }
    }
}

impl EvalOptions {
    fn config(&self) -> Result<EngineConfig, Diagnostic> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| Diagnostic::error(format!("cannot read {}: {e}", path.display())))?;
                EngineConfig::from_json(&text)
                    .map_err(|e| Diagnostic::error(format!("invalid config {}: {e}", path.display())))?
            }
            None => EngineConfig::default(),
        };
        if self.no_fold {
            config.compile.fold_constants = false;
        }
        if self.no_dce {
            config.compile.eliminate_dead_code = false;
        }
        Ok(config)
    }

    fn store(&self, engine: &Engine) -> Result<Store, Diagnostic> {
        let mut store = Store::new();
        if let Some(cache) = engine.cache() {
            store.attach_cache(cache.clone());
        }
        for binding in &self.vars {
            let Some((name, raw)) = binding.split_once('=') else {
                return Err(Diagnostic::error(format!("invalid --var '{binding}'"))
                    .with_suggestion("use NAME=VALUE, e.g. --var qty=4"));
            };
            let value = serde_json::from_str::<serde_json::Value>(raw)
                .map(Value::from)
                .unwrap_or_else(|_| Value::from(raw));
            match name.split_once("::") {
                Some((scope, name)) => store.set_scoped(scope, name, value),
                None => store.set(name, value),
            }
        }
        Ok(store)
    }
}
