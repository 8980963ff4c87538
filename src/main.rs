// bfc - Brainfuck to i386 ELF compiler
// Driver: read source, lex, parse, optimize, emit, write executable.

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use bfc::backend::codegen::CodeGenerator;
use bfc::backend::elf::ElfImage;
use bfc::frontend::lexer::Lexer;
use bfc::frontend::parser::Parser;
use bfc::optimizer::RunLengthMerger;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: bfc <program.bf>");
        process::exit(1);
    }

    let input_path = Path::new(&args[1]);
    let source = match fs::read(input_path) {
        Ok(source) => source,
        Err(_) => {
            eprintln!("err: could not read input file");
            process::exit(1);
        }
    };

    let tokens = Lexer::new(&source).tokenize();
    log::debug!("lexed {} tokens from {} source bytes", tokens.len(), source.len());

    let program = match Parser::new(tokens).parse() {
        Ok(program) => program,
        Err(err) => {
            eprintln!("err: {err}");
            process::exit(1);
        }
    };

    let program = RunLengthMerger::new().optimize(&program);
    log::debug!("optimized tree has {} top-level nodes", program.nodes.len());

    let code = match CodeGenerator::new().generate(&program) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("err: {err}");
            process::exit(1);
        }
    };

    // The executable lands next to the source, extension stripped.
    let output_path = input_path.with_extension("");
    if let Err(err) = ElfImage::new(code).write_to(&output_path) {
        log::debug!("image write failed: {err}");
        eprintln!("err: could not write output file");
        process::exit(1);
    }

    log::info!("wrote {}", output_path.display());
}
