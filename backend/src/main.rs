//! `contact-backend` binary. Without arguments it serves HTTP; the other
//! commands are operator tools that work directly on the data directory.

use std::env;
use std::process::ExitCode;

use contact_backend::config::Config;
use contact_backend::crypto::envelope::EnvelopeCipher;
use contact_backend::crypto::passwords::hash_password;
use contact_backend::start_server;
use contact_backend::store::{StoreError, SubmissionStore};
use tracing_subscriber::{fmt, EnvFilter};

fn print_usage() {
    eprintln!(
        "Commands:\n  serve (default)\n  hash-password <plaintext>\n  cleanup\n  export <email>\n  erase <email>"
    );
}

fn open_store() -> Result<SubmissionStore, String> {
    let config = Config::from_env().map_err(|e| format!("{e}"))?;
    let cipher = EnvelopeCipher::from_secret(&config.encryption_secret).map_err(|e| format!("{e}"))?;
    SubmissionStore::open(&config.data_dir, cipher, config.retention_days).map_err(|e| format!("{e}"))
}

fn with_store<T>(run: impl FnOnce(&SubmissionStore) -> Result<T, StoreError>) -> Result<T, String> {
    let store = open_store()?;
    run(&store).map_err(|e| format!("{e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("serve");

    let outcome = match command {
        "serve" => match Config::from_env() {
            Ok(config) => start_server(config).await.map_err(|e| format!("{e}")),
            Err(e) => Err(format!("{e}")),
        },
        "hash-password" => {
            if args.len() != 3 {
                print_usage();
                return ExitCode::FAILURE;
            }
            hash_password(&args[2])
                .map(|hash| println!("{hash}"))
                .map_err(|e| format!("hashing failed: {e}"))
        }
        "cleanup" => with_store(|store| store.cleanup_expired())
            .map(|removed| println!("removed {removed} expired submission(s)")),
        "export" => {
            if args.len() != 3 {
                print_usage();
                return ExitCode::FAILURE;
            }
            with_store(|store| store.export_by_email(&args[2])).and_then(|exported| {
                serde_json::to_string_pretty(&exported)
                    .map(|json| println!("{json}"))
                    .map_err(|e| format!("{e}"))
            })
        }
        "erase" => {
            if args.len() != 3 {
                print_usage();
                return ExitCode::FAILURE;
            }
            with_store(|store| store.delete_by_email(&args[2]))
                .map(|deleted| println!("deleted {deleted} submission(s)"))
        }
        _ => {
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{command} failed: {e}");
            ExitCode::FAILURE
        }
    }
}
