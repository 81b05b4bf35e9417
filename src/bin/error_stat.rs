use std::path::PathBuf;
use std::time::Duration;

use clap::{App, Arg};

use baton::{cnc::CncFile, context::default_aeron_dir, errorlog::read_error_log, DriverError};

fn main() {
    env_logger::init();

    let matches = App::new("error-stat")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reads the distinct error log of a running media driver")
        .arg(
            Arg::with_name("directory")
                .short("d")
                .long("directory")
                .value_name("BASE_PATH")
                .help("Base path to the driver's shared memory directory")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("timeout")
                .short("t")
                .long("timeout")
                .value_name("TIMEOUT_MS")
                .help("Milliseconds to wait for the driver metadata to appear")
                .default_value("1000")
                .takes_value(true),
        )
        .get_matches_safe()
        .unwrap_or_else(|e| {
            use clap::ErrorKind;
            if matches!(e.kind, ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed) {
                println!("{}", e.message);
                std::process::exit(0);
            }
            eprintln!("{}", e.message);
            std::process::exit(2);
        });

    let directory = matches
        .value_of("directory")
        .map(PathBuf::from)
        .unwrap_or_else(default_aeron_dir);

    let timeout_ms: i64 = match matches.value_of("timeout").unwrap().parse() {
        Ok(timeout) => timeout,
        Err(_) => {
            eprintln!("Invalid timeout");
            std::process::exit(2);
        }
    };

    let cnc = match attach(&directory, timeout_ms) {
        Ok(cnc) => cnc,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let buffer = cnc.error_log_buffer();
    let distinct = read_error_log(&buffer, |count, first_ms, last_ms, description| {
        println!(
            "***\n{} observations from {} to {} for:\n {}",
            count,
            format_timestamp(first_ms),
            format_timestamp(last_ms),
            description
        );
    });

    println!("\n{} distinct errors observed.", distinct);
}

/// Poll for the CnC file until it appears or the timeout elapses. A version
/// mismatch is terminal; anything else may just mean the driver is still
/// starting.
fn attach(directory: &std::path::Path, timeout_ms: i64) -> Result<CncFile, String> {
    let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms.max(0) as u64);

    loop {
        match CncFile::map_existing(directory) {
            Ok(cnc) => return Ok(cnc),
            Err(DriverError::VersionMismatch { expected, actual }) => {
                return Err(format!(
                    "CnC version mismatch: expected {}, got {}",
                    expected, actual
                ));
            }
            Err(e) => {
                if std::time::Instant::now() >= deadline {
                    return Err(format!(
                        "Timed out waiting for driver CnC metadata in {}: {}",
                        directory.display(),
                        e
                    ));
                }
                std::thread::sleep(Duration::from_millis(16));
            }
        }
    }
}

fn format_timestamp(epoch_ms: i64) -> String {
    let seconds = epoch_ms / 1000;
    let millis = epoch_ms % 1000;
    format!("{}.{:03}", seconds, millis)
}
