extern crate clap;
#[macro_use] extern crate log;
extern crate fern;
extern crate chrono;
extern crate term_grid;
extern crate mcasm;

use clap::{Arg, ArgMatches, App};
use term_grid::{Grid, GridOptions, Direction, Filling, Cell};

use mcasm::assembler::config::{Config, EchoFlags};
use mcasm::assembler::driver::{Assembler, Assembly};
use mcasm::assembler::lexer;
use mcasm::assembler::rom::RomImage;

use std::convert::TryFrom;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

fn main() {
    let args = process_arguments();
    initialize_logging(args.occurrences_of("verbose"));

    let input = match args.value_of("INPUT") {
        Some(i) => i,
        None => fatal("no input file given"),
    };
    let echo = match args.value_of("echo") {
        Some(mask) => parse_echo_mask(mask),
        None => EchoFlags::default(),
    };

    debug!("Arguments:\n\tVerbosity: {}\n\tEcho mask: {:#010b}\n\tOutput prefix: {}\n\tSource root: {}\n\tInfile: {}",
        match args.occurrences_of("verbose") {
            0 => log::LevelFilter::Error.to_string(),
            1 => log::LevelFilter::Warn.to_string(),
            2 => log::LevelFilter::Info.to_string(),
            3 => log::LevelFilter::Debug.to_string(),
            _ => log::LevelFilter::Trace.to_string(),
        },
        echo.mask(),
        args.value_of("output").unwrap_or("None"),
        args.value_of("root").unwrap_or("None"),
        input
    );

    // Without an explicit root, includes resolve next to the input file.
    let ipath = Path::new(input);
    let (source_root, start_file) = match args.value_of("root") {
        Some(root) => (PathBuf::from(root), input.to_owned()),
        None => {
            let root = ipath.parent().map(Path::to_path_buf).unwrap_or_default();
            let name = match ipath.file_name() {
                Some(n) => n.to_string_lossy().into_owned(),
                None => fatal(&format!("`{}` is not a file", input)),
            };
            (root, name)
        }
    };

    let config = Config { source_root, echo };
    let assembly = match Assembler::from_config(&start_file, &config).assemble() {
        Ok(a) => a,
        Err(err) => fatal(&err.to_string()),
    };

    if echo.major_tasks() {
        info!("assembled {} opcodes, {} aliases", assembly.arch.opcodes().count(), assembly.arch.aliases().count());
    }

    if args.is_present("print-debug") {
        print_dump(&assembly);
    }

    let prefix = match args.value_of("output") {
        Some(p) => p.to_owned(),
        None => match ipath.file_stem() {
            Some(stem) => stem.to_string_lossy().into_owned(),
            None => fatal(&format!("cannot derive an output name from `{}`", input)),
        },
    };

    write_rom(&assembly.decoder.image, &format!("{}.decoder.bin", prefix));
    write_rom(&assembly.program.image, &format!("{}.program.bin", prefix));
}

fn fatal(message: &str) -> ! {
    error!("fatal: {}", message);
    std::process::exit(1);
}

fn parse_echo_mask(mask: &str) -> EchoFlags {
    let value = match lexer::parse_literal(mask) {
        Ok(v) => v,
        Err(err) => fatal(&format!("invalid echo mask `{}`: {}", mask, err)),
    };
    match u8::try_from(value) {
        Ok(m) => EchoFlags::new(m),
        Err(_) => fatal(&format!("echo mask `{}` does not fit in a byte", mask)),
    }
}

/// Writes `image` to `filename` if its shape is marked for writing.
fn write_rom(image: &RomImage, filename: &str) {
    if !image.shape.write {
        debug!("not writing `{}`: rom is not marked for writing", filename);
        return;
    }

    let opath = Path::new(filename);
    let mut ofile = match File::create(&opath) {
        Err(err) => fatal(&format!("unable to open output file `{}`: {}", opath.display(), err)),
        Ok(file) => file,
    };

    if let Err(err) = ofile.write_all(&image.data) {
        fatal(&format!("unable to write to output file `{}`: {}", opath.display(), err));
    }
    info!("wrote {} bytes to `{}`", image.data.len(), opath.display());
}

fn print_dump(assembly: &Assembly) {
    let mut grid = Grid::new(GridOptions {
        filling:     Filling::Spaces(1),
        direction:   Direction::LeftToRight,
    });

    for op in assembly.arch.opcodes() {
        grid.add(Cell::from(format!("0x{:02X}:", op.value)));
        grid.add(Cell::from(op.mnemonic.clone()));
        grid.add(Cell::from("=>".to_string()));
        grid.add(Cell::from(format!("{} cycles", op.num_cycles())));
    }
    println!("Opcodes:\n{}", grid.fit_into_columns(4));

    println!("Decoder ROM ({}):\n{}", assembly.decoder.image.shape, hex_grid(&assembly.decoder.image.data));

    println!("Program ROM ({}):\n{}", assembly.program.image.shape, hex_grid(assembly.program.used_bytes()));
}

fn hex_grid(data: &[u8]) -> String {
    let mut grid = Grid::new(GridOptions {
        filling:     Filling::Spaces(1),
        direction:   Direction::LeftToRight,
    });

    for (idx, row) in data.chunks(8).enumerate() {
        grid.add(Cell::from(format!("0x{:04X}:", idx * 8)));
        let bytes: Vec<String> = row.iter().map(|b| format!("{:02X}", b)).collect();
        grid.add(Cell::from(bytes.join(" ")));
    }

    grid.fit_into_columns(2).to_string()
}

fn process_arguments() -> ArgMatches<'static> {
    App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(Arg::with_name("INPUT")
            .help("Sets the root source file to assemble")
            .required(true)
            .multiple(false)
            .index(1))
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .takes_value(false)
            .help("Sets the level of verbosity"))
        .arg(Arg::with_name("output")
            .short("o")
            .takes_value(true)
            .help("output prefix; roms are written to <prefix>.decoder.bin and <prefix>.program.bin"))
        .arg(Arg::with_name("root")
            .short("r")
            .takes_value(true)
            .help("directory includes are resolved against (default: the input file's directory)"))
        .arg(Arg::with_name("echo")
            .short("e")
            .takes_value(true)
            .help("echo mask, e.g. $C8 or %11001000: architecture, major tasks, minor tasks, warnings, parsed major, parsed minor, source, rom data"))
        .arg(Arg::with_name("print-debug")
            .short("d")
            .alias("show")
            .alias("s")
            .takes_value(false)
            .help("prints both rom images as a hex dump to STDOUT"))
        .get_matches()
}

fn initialize_logging(verbosity: u64) {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(match verbosity {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .chain(std::io::stdout())
        .apply().ok();
}
