use anyhow::Context;
use argh::FromArgs;
use pipesh::config::{HISTORY_SIZE, MAX_ARGS, MAX_LINE_LEN, MAX_STAGES};
use pipesh::{Limits, Shell};

#[derive(FromArgs)]
/// Interactive shell with line editing, history recall, pipes and redirection.
struct Options {
    #[argh(option, default = "String::from(\"$ \")")]
    /// text printed before every command line.
    prompt: String,

    #[argh(option, default = "HISTORY_SIZE")]
    /// how many command lines to remember.
    history_size: usize,

    #[argh(option, default = "MAX_LINE_LEN")]
    /// longest accepted command line, in bytes.
    max_line: usize,

    #[argh(option, default = "MAX_STAGES")]
    /// pipeline stages beyond this count are dropped.
    max_stages: usize,

    #[argh(option, default = "MAX_ARGS")]
    /// words per stage beyond this count are dropped.
    max_args: usize,

    #[argh(switch, short = 'q')]
    /// do not print the banner.
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let options: Options = argh::from_env();
    let limits = Limits {
        history_size: options.history_size,
        max_line_len: options.max_line,
        max_stages: options.max_stages,
        max_args: options.max_args,
    };
    limits.validate()?;

    pipesh::shell::install_interrupt_handler().context("failed to install SIGINT handler")?;

    if !options.quiet {
        println!("{} (Type 'exit' to leave)", env!("CARGO_PKG_NAME"));
    }
    Shell::interactive(options.prompt, limits).run()
}
