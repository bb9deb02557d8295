//! `dekstore` admin CLI.
//!
//! ```text
//! dekstore init-schema
//! dekstore get <id>
//! dekstore put <id> <name>=<ciphertext>...
//! ```
//!
//! Connection and cache settings come from `DEKSTORE_*` environment
//! variables. Exit status is 2 when `put` hits an existing record and 1 on
//! any other failure.

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;

use dekstore_core::{CacheConfig, ConfigError, EncryptedKeys, KeyStoreError};
use dekstore_postgres::{init_tracing, PgConfig, PgDurableStore, TelemetryConfig};
use dekstore_storage::CachingKeyStore;
use thiserror::Error;

const USAGE: &str = "usage:
  dekstore init-schema
  dekstore get <id>
  dekstore put <id> <name>=<ciphertext>...";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Help,
    InitSchema,
    Get { id: String },
    Put { id: String, keys: EncryptedKeys },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Store(#[from] KeyStoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    fn exit_status(&self) -> u8 {
        match self {
            CliError::Store(err) if err.is_already_exists() => 2,
            _ => 1,
        }
    }
}

fn parse_args<I>(args: I) -> Result<Command, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let usage = |msg: &str| CliError::Usage(msg.to_string());

    let command = match args.next().as_deref() {
        None | Some("help" | "-h" | "--help") => Command::Help,
        Some("init-schema") => Command::InitSchema,
        Some("get") => {
            let id = args.next().ok_or_else(|| usage("get needs an id"))?;
            Command::Get { id }
        }
        Some("put") => {
            let id = args.next().ok_or_else(|| usage("put needs an id"))?;
            let mut keys = EncryptedKeys::new();
            for pair in args.by_ref() {
                let (name, ciphertext) = pair.split_once('=').ok_or_else(|| {
                    CliError::Usage(format!("expected <name>=<ciphertext>, got {pair}"))
                })?;
                if keys.insert(name.to_string(), ciphertext.to_string()).is_some() {
                    return Err(CliError::Usage(format!("key {name} given twice")));
                }
            }
            if keys.is_empty() {
                return Err(usage("put needs at least one <name>=<ciphertext>"));
            }
            Command::Put { id, keys }
        }
        Some(other) => return Err(CliError::Usage(format!("unknown command {other}"))),
    };

    if let Some(extra) = args.next() {
        return Err(CliError::Usage(format!("unexpected argument {extra}")));
    }
    Ok(command)
}

fn render_keys(keys: Option<EncryptedKeys>) -> Result<String, serde_json::Error> {
    // Sorted so output is stable across runs.
    let sorted: Option<BTreeMap<String, String>> = keys.map(|k| k.into_iter().collect());
    serde_json::to_string_pretty(&sorted)
}

async fn run(command: Command) -> Result<(), CliError> {
    if command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let pg_config = PgConfig::from_env()?;
    let durable = Arc::new(PgDurableStore::from_config(&pg_config)?);

    match command {
        Command::Help => Ok(()),
        Command::InitSchema => {
            durable
                .ensure_schema()
                .await
                .map_err(KeyStoreError::from)?;
            println!("table {} ready", durable.table());
            Ok(())
        }
        Command::Get { id } => {
            let store = CachingKeyStore::new(durable, CacheConfig::from_env()?)?;
            let keys = store.get(&id).await?;
            println!("{}", render_keys(keys)?);
            Ok(())
        }
        Command::Put { id, keys } => {
            let store = CachingKeyStore::new(durable, CacheConfig::from_env()?)?;
            store.set_conditionally(&id, keys).await?;
            tracing::info!(%id, "record created");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing(&TelemetryConfig::from_env()) {
        eprintln!("{e}");
    }

    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            return ExitCode::from(e.exit_status());
        }
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_status())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dekstore_core::BackendError;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_args(args(&[])).unwrap(), Command::Help);
        assert_eq!(parse_args(args(&["init-schema"])).unwrap(), Command::InitSchema);
        assert_eq!(
            parse_args(args(&["get", "tenant-42"])).unwrap(),
            Command::Get {
                id: "tenant-42".to_string()
            }
        );
    }

    #[test]
    fn test_parse_put_keeps_padding_in_ciphertext() {
        let command =
            parse_args(args(&["put", "tenant-42", "dek=YWJjZA==", "dek-v2=eHl6"])).unwrap();
        let Command::Put { id, keys } = command else {
            panic!("expected put");
        };
        assert_eq!(id, "tenant-42");
        assert_eq!(keys.get("dek").map(String::as_str), Some("YWJjZA=="));
        assert_eq!(keys.get("dek-v2").map(String::as_str), Some("eHl6"));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for bad in [
            vec!["get"],
            vec!["get", "a", "b"],
            vec!["put", "tenant-42"],
            vec!["put", "tenant-42", "no-equals"],
            vec!["put", "tenant-42", "dek=a", "dek=b"],
            vec!["drop"],
        ] {
            assert!(
                matches!(parse_args(args(&bad)), Err(CliError::Usage(_))),
                "{bad:?} should be a usage error"
            );
        }
    }

    #[test]
    fn test_exit_status() {
        let conflict = CliError::Store(KeyStoreError::AlreadyExists {
            id: "tenant-42".to_string(),
        });
        assert_eq!(conflict.exit_status(), 2);
        assert_eq!(CliError::Usage("x".to_string()).exit_status(), 1);

        let backend = CliError::Store(KeyStoreError::Backend(BackendError::Connection {
            reason: "refused".to_string(),
        }));
        assert_eq!(backend.exit_status(), 1);
    }

    #[test]
    fn test_render_keys_is_sorted_json() {
        let mut keys = EncryptedKeys::new();
        keys.insert("b".to_string(), "2".to_string());
        keys.insert("a".to_string(), "1".to_string());
        let rendered = render_keys(Some(keys)).unwrap();
        assert!(rendered.find("\"a\"").unwrap() < rendered.find("\"b\"").unwrap());
        assert_eq!(render_keys(None).unwrap(), "null");
    }
}
