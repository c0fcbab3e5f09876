#![forbid(unsafe_code)]

use fv_api::{ApiServer, run_stdio};
use std::path::PathBuf;

const SERVER_NAME: &str = "fv_api";
const SERVER_VERSION: &str = "0.1.0";

fn usage() -> &'static str {
    "fv_api — FloralVault API server (Rust, stdio JSON-RPC)\n\n\
USAGE:\n\
  fv_api [--storage-dir DIR]\n\
\n\
FLAGS:\n\
  -h, --help       Print this help and exit\n\
  -V, --version    Print version and exit\n\
\n\
NOTES:\n\
  - Storage dir default: ./.floralvault/ (override with FV_STORAGE_DIR)\n"
}

fn version_line() -> String {
    format!("{SERVER_NAME} {SERVER_VERSION}")
}

fn parse_storage_dir(args: &[String]) -> PathBuf {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--storage-dir"
            && let Some(value) = iter.next()
        {
            return PathBuf::from(value);
        }
        if let Some(value) = arg.strip_prefix("--storage-dir=") {
            return PathBuf::from(value);
        }
    }
    if let Ok(value) = std::env::var("FV_STORAGE_DIR")
        && !value.trim().is_empty()
    {
        return PathBuf::from(value);
    }
    PathBuf::from(".floralvault")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = std::env::args().collect::<Vec<_>>();
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print!("{}", usage());
        return Ok(());
    }
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
    {
        println!("{}", version_line());
        return Ok(());
    }

    let storage_dir = parse_storage_dir(&args);
    let mut server = ApiServer::new(&storage_dir)?;
    run_stdio(&mut server)?;
    Ok(())
}
