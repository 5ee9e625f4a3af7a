#![deny(unused_must_use)]

use std::io;
use std::process;
use std::path::PathBuf;
use std::str::FromStr;

use termcolor::ColorChoice;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use typeflow::{
    SpewChannels,
    diagnostics::Diagnostics,
    infer::InferOptions,
    trace,
};

/// A command line argument that configures the coloring of the output
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColorArg(pub ColorChoice);

impl Default for ColorArg {
    fn default() -> Self {
        ColorArg(ColorChoice::Auto)
    }
}

impl ColorArg {
    /// Allowed values the argument
    pub const VARIANTS: &'static [&'static str] = &["auto", "always", "ansi", "never"];
}

impl FromStr for ColorArg {
    type Err = &'static str;

    fn from_str(src: &str) -> Result<ColorArg, &'static str> {
        match src {
            _ if src.eq_ignore_ascii_case("auto") => Ok(ColorArg(ColorChoice::Auto)),
            _ if src.eq_ignore_ascii_case("always") => Ok(ColorArg(ColorChoice::Always)),
            _ if src.eq_ignore_ascii_case("ansi") => Ok(ColorArg(ColorChoice::AlwaysAnsi)),
            _ if src.eq_ignore_ascii_case("never") => Ok(ColorArg(ColorChoice::Never)),
            _ => Err("valid values: auto, always, ansi, never"),
        }
    }
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        arg.0
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "typeflow", about)]
struct Options {
    /// The trace script to replay
    #[structopt(name = "input", parse(from_os_str))]
    trace_path: PathBuf,

    /// Comma separated spew channels to enable: dynamic, ops, result or full
    ///
    /// Defaults to the value of the TYPEFLOW_SPEW environment variable.
    #[structopt(long = "spew")]
    spew: Option<SpewChannels>,

    /// Print solver statistics after the trace finishes
    #[structopt(long = "stats")]
    stats: bool,

    /// Configure coloring of output
    #[structopt(long = "color", parse(try_from_str), default_value = "auto",
        possible_values = ColorArg::VARIANTS, case_insensitive = true)]
    color: ColorArg,
}

macro_rules! quit {
    ($diag:expr, $($args:tt)*) => {
        {
            $diag.error(format!($($args)*)).emit();
            process::exit(1);
        }
    };
}

fn main() {
    let Options {trace_path, spew, stats, color} = Options::from_args();
    let diag = Diagnostics::new(color.into());

    let spew = spew.unwrap_or_else(SpewChannels::from_env);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(spew.filter_directive()))
        .with_writer(io::stderr)
        .without_time()
        .init();

    let options = InferOptions {
        spew,
        record_timing: stats,
        ..InferOptions::default()
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut comp = match trace::run_path(&trace_path, options, &mut out, &diag) {
        Ok(comp) => comp,
        Err(err) => quit!(&diag, "{}", err),
    };

    let result = comp.finish();
    if stats {
        eprintln!("analysis time: {:?}", result.analysis_time);
        eprintln!("recompilations: {}", result.recompilations);
        eprintln!("pushed set sizes: {:?} (over: {})", result.type_counts, result.type_count_over);
        eprintln!("max solver depth: {}", result.max_solver_depth);
        eprintln!("failures: {}", result.failures);
    }
}
