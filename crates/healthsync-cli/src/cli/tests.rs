use super::*;
use clap::Parser;
use healthsync_core::models::MutationAction;

#[test]
fn enqueue_parses_type_action_and_payload() {
    let cli = Cli::try_parse_from([
        "healthsync",
        "enqueue",
        "--type",
        "appointment",
        "--action",
        "update",
        "--payload",
        r#"{"slot":"10:00"}"#,
    ])
    .expect("parse");
    match cli.command {
        Commands::Enqueue(EnqueueArgs {
            entry_type,
            action,
            payload,
        }) => {
            assert_eq!(entry_type, "appointment");
            assert_eq!(action, MutationAction::Update);
            assert_eq!(payload, r#"{"slot":"10:00"}"#);
        }
        _ => panic!("expected enqueue command"),
    }
}

#[test]
fn enqueue_rejects_unknown_actions() {
    let parsed = Cli::try_parse_from([
        "healthsync",
        "enqueue",
        "--type",
        "note",
        "--action",
        "merge",
    ]);
    assert!(parsed.is_err(), "merge is not a mutation action");
}

#[test]
fn global_options_default_to_local_root() {
    let cli = Cli::try_parse_from(["healthsync", "pending"]).expect("parse");
    assert_eq!(cli.root, std::path::PathBuf::from(".healthsync"));
    assert!(cli.config.is_none());
    assert!(cli.token.is_none());
    assert!(matches!(cli.command, Commands::Pending));
}

#[test]
fn cache_put_parses_key_field_override() {
    let cli = Cli::try_parse_from([
        "healthsync",
        "cache",
        "put",
        "products",
        r#"[{"sku":"vit-d"}]"#,
        "--key-field",
        "sku",
    ])
    .expect("parse");
    match cli.command {
        Commands::Cache(CacheArgs {
            command:
                CacheCommand::Put {
                    partition,
                    key_field,
                    ..
                },
        }) => {
            assert_eq!(partition, "products");
            assert_eq!(key_field, "sku");
        }
        _ => panic!("expected cache put command"),
    }
}

#[test]
fn run_parses_probe_interval_and_deadline() {
    let cli = Cli::try_parse_from([
        "healthsync",
        "--token",
        "t",
        "run",
        "--probe-interval-ms",
        "250",
        "--max-seconds",
        "3",
    ])
    .expect("parse");
    match cli.command {
        Commands::Run(RunArgs {
            probe_interval_ms,
            max_seconds,
        }) => {
            assert_eq!(probe_interval_ms, 250);
            assert_eq!(max_seconds, Some(3));
        }
        _ => panic!("expected run command"),
    }
    assert_eq!(cli.token.as_deref(), Some("t"));
}

#[test]
fn sync_defaults_to_probing() {
    let cli = Cli::try_parse_from(["healthsync", "sync"]).expect("parse");
    assert!(matches!(
        cli.command,
        Commands::Sync(SyncArgs {
            assume_online: false
        })
    ));
}
