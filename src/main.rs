use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let config_file = std::env::args_os().nth(1).map(PathBuf::from);
    if let Err(err) = goldrec_lib::run_reaper(config_file.as_deref()).await {
        eprintln!("goldrec-reaper: {err}");
        std::process::exit(1);
    }
}
