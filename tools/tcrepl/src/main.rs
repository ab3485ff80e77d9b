use std::{
    io::{stdin, stdout, Write},
    path::{Path, PathBuf},
};

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use tcforth::{Forth, ForthParams};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::Targets, prelude::*};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// a TOML file with VM sizes. fields that are left out keep their
    /// defaults.
    #[arg(short, long, env = "TCFORTH_CONFIG")]
    config: Option<PathBuf>,

    /// heap size in bytes. overrides the config file.
    #[arg(long)]
    heap_bytes: Option<usize>,

    /// data stack depth. overrides the config file.
    #[arg(long)]
    data_stack_elems: Option<usize>,

    /// return stack depth. overrides the config file.
    #[arg(long)]
    return_stack_elems: Option<usize>,

    /// a comma-separated list of `tracing` targets and levels to enable.
    ///
    /// for example, `warn,tcforth::vm=trace` logs every dispatch in the
    /// inner interpreter, and only warnings everywhere else.
    ///
    /// see <https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/targets/struct.Targets.html#filtering-with-targets>
    /// for more details on this syntax.
    #[arg(
        short,
        long = "trace",
        env = "TCFORTH_TRACE",
        default_value_t = Targets::new().with_default(LevelFilter::WARN),
    )]
    trace_filter: Targets,
}

fn main() -> miette::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(args.trace_filter.clone()),
        )
        .init();

    let params = params(&args)?;
    tracing::debug!(?params, "starting");
    let mut forth = Forth::new(params, (), Forth::FULL_BUILTINS)
        .into_diagnostic()
        .context("failed to start the forth VM")?;

    let mut inp = String::new();
    loop {
        print!("> ");
        stdout().flush().into_diagnostic()?;
        inp.clear();
        if stdin().read_line(&mut inp).into_diagnostic()? == 0 {
            // EOF
            println!();
            return Ok(());
        }

        if let Err(e) = forth.input.fill(&inp) {
            println!("{}", tcforth::Error::from(e));
            continue;
        }
        let res = forth.process_line();
        print!("{}", forth.output.as_str());
        forth.output.clear();

        match res {
            Ok(()) if forth.is_terminated() => return Ok(()),
            Ok(()) => {}
            Err(e) => {
                println!();
                print!("Unprocessed tokens:");
                while let Some(tok) = forth.input.cur_word() {
                    print!(" '{}'", String::from_utf8_lossy(tok));
                    forth.input.advance();
                }
                println!();
                return Err(e).into_diagnostic().context("the forth VM faulted");
            }
        }
    }
}

fn params(args: &Args) -> miette::Result<ForthParams> {
    let mut params = match args.config.as_deref() {
        Some(path) => load_config(path)?,
        None => ForthParams::default(),
    };
    if let Some(heap_bytes) = args.heap_bytes {
        params.heap_bytes = heap_bytes;
    }
    if let Some(elems) = args.data_stack_elems {
        params.data_stack_elems = elems;
    }
    if let Some(elems) = args.return_stack_elems {
        params.return_stack_elems = elems;
    }
    Ok(params)
}

fn load_config(path: &Path) -> miette::Result<ForthParams> {
    let s = std::fs::read_to_string(path)
        .into_diagnostic()
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&s)
        .into_diagnostic()
        .with_context(|| format!("failed to parse {}", path.display()))
}
