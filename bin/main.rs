use clap::Parser;
use efi_platform::loader::{json, BinaryView};
use efi_platform::{EfiFamily, EfiPlugin, Error, Host, OptionsBuilder, Platform};
use log::{error, LevelFilter, Metadata, Record};
use std::path::{Path, PathBuf};

/// Recognize the EFI platform of PE images.
#[derive(Debug, Parser)]
#[command(name = "efi-platform", version)]
struct Args {
    /// PE images, or JSON image descriptions ending in `.json`
    files: Vec<PathBuf>,

    /// List the registered EFI platforms and their calling conventions
    #[arg(short, long)]
    list: bool,

    /// Brand to register platforms under
    #[arg(long, default_value = "efi")]
    brand: String,

    /// Only register these families (x86, x86_64, armv7, aarch64)
    #[arg(long, value_delimiter = ',')]
    families: Vec<EfiFamily>,

    /// Increase logging, may be repeated
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct StdoutLogger;

static LOGGER: StdoutLogger = StdoutLogger;

impl log::Log for StdoutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{} - {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn level_filter(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn init_logging(verbose: u8) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_filter(verbose));
    }
}

fn print_platform(platform: &Platform) {
    println!("{}", platform);
    for architecture in platform.related_architectures() {
        println!("  related: {}", architecture);
    }
}

fn load(host: &Host, path: &Path) -> Result<BinaryView, Error> {
    let view = if path.extension().map(|e| e == "json").unwrap_or(false) {
        json::from_file(path)?
    } else {
        let bytes = std::fs::read(path)?;
        return host.open_pe(path.display().to_string(), bytes);
    };
    host.open_view(view)
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut builder = OptionsBuilder::new().brand(args.brand.clone());
    if !args.families.is_empty() {
        builder = builder.families(args.families.clone());
    }

    let mut host = Host::with_defaults();
    host.load_plugin(&EfiPlugin::with_options(builder.build()));

    if args.list {
        for platform in host.platforms().platforms(&args.brand) {
            print_platform(platform);
        }
    }

    let mut failed = false;
    for path in &args.files {
        match load(&host, path) {
            Ok(view) => match view.platform() {
                Some(platform) => {
                    print!("{}: ", view.name());
                    print_platform(platform);
                }
                None => println!("{}: no EFI platform", view.name()),
            },
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log};

    #[test]
    fn verbosity() {
        assert_eq!(level_filter(0), LevelFilter::Warn);
        assert_eq!(level_filter(1), LevelFilter::Info);
        assert_eq!(level_filter(2), LevelFilter::Debug);
        assert_eq!(level_filter(3), LevelFilter::Trace);
        assert_eq!(level_filter(u8::MAX), LevelFilter::Trace);
    }

    #[test]
    fn logger_follows_max_level() {
        init_logging(1);
        let info = Metadata::builder().level(Level::Info).build();
        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(LOGGER.enabled(&info));
        assert!(!LOGGER.enabled(&debug));
    }

    #[test]
    fn arguments() {
        let args = Args::parse_from(["efi-platform", "--families", "x86,aarch64", "-vv", "app.efi"]);
        assert_eq!(args.families, vec![EfiFamily::X86, EfiFamily::Aarch64]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.brand, "efi");
        assert_eq!(args.files, vec![PathBuf::from("app.efi")]);
    }
}
