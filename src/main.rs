use std::error::Error;
use structopt::StructOpt;

fn main() {
    if let Err(ref e) = run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    use std::fs;

    let opt = Opt::from_args();
    let source = fs::read_to_string(&opt.file)?;

    let units = alanc::driver::compile(&source);
    let reports = alanc::driver::reports(&units);

    match opt.sink.as_deref() {
        None => {
            println!("==== Lexer ====");
            print!("{}", reports.lexer);
            println!("==== Parser ====");
            print!("{}", reports.parser);
            println!("==== Semantic Analysis ====");
            print!("{}", reports.semantic);
            println!("==== Code Generation ====");
            print!("{}", reports.codegen);
        }
        Some("lexer") => print!("{}", reports.lexer),
        Some("parser") => print!("{}", reports.parser),
        Some("semantic") => print!("{}", reports.semantic),
        Some("codegen") => print!("{}", reports.codegen),
        Some(other) => {
            return Err(format!(
                "unknown sink {:?}, expected lexer, parser, semantic or codegen",
                other
            )
            .into())
        }
    }

    Ok(())
}

#[derive(Debug, StructOpt)]
struct Opt {
    /// The file to compile
    #[structopt(parse(from_os_str))]
    file: std::path::PathBuf,
    /// Print only one report: lexer, parser, semantic or codegen
    #[structopt(short = "s", long = "sink")]
    sink: Option<String>,
}
