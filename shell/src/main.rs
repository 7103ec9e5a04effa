use argh::FromArgs;
use log::LevelFilter;
use pshell::{BANNER, Interpreter};
use rustyline::DefaultEditor;

#[derive(FromArgs)]
/// interactive shell with a few filesystem built-ins that runs other programs
/// from /bin/, /usr/bin/, /usr/local/bin/ and ./
struct Args {
    #[argh(switch, short = 'v')]
    /// log resolution and process activity to stderr
    verbose: bool,

    #[argh(switch)]
    /// do not print the start-up banner
    no_banner: bool,
}

fn main() {
    let args: Args = argh::from_env();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(err) = run(&args) {
        eprintln!("pshell: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    if !args.no_banner {
        println!("{BANNER}");
    }
    let mut editor = DefaultEditor::new()?;
    Interpreter::default().repl(&mut editor, &mut std::io::stdout())
}
