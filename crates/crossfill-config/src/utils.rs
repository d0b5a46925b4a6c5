use config::{Config, File};
use std::path::{Path, PathBuf};

use super::*;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> crossfill_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(crossfill_utils::Error::from))
        .collect()
}

/// Try to parse the [`CrossfillConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> crossfill_utils::Result<CrossfillConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        // get file extension
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of CROSSFILL).
    let builder = builder.add_source(
        config::Environment::with_prefix("CROSSFILL").separator("_"),
    );
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        CrossfillConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files.
///
/// Returns `Ok(CrossfillConfig)` on success, or `Err(Error)` on failure.
///
/// # Arguments
///
/// * `path` - The path to the configuration directory
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> crossfill_utils::Result<CrossfillConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: CrossfillConfig,
) -> crossfill_utils::Result<CrossfillConfig> {
    tracing::trace!("Checking configuration sanity ...");

    // re-key chains by chain id
    // 1. drain everything, and take enabled chains.
    let old_evm = config
        .evm
        .drain()
        .filter(|(_, chain)| chain.enabled)
        .collect::<HashMap<_, _>>();
    // 2. insert them again, keyed by chain id.
    for (_, v) in old_evm {
        config.evm.insert(v.chain_id.to_string(), v);
    }

    for chain in config.evm.values() {
        // chains we poll need an explorer API to read outbox logs from.
        if chain.contracts.outbox.is_some() && chain.explorer.is_none() {
            tracing::warn!(
                "!!WARNING!!: chain {} has an outbox configured but no
                explorer API; its requests cannot be indexed",
                chain.chain_id
            );
        }
        // state proofs for non-devnet chains anchor to a beacon root.
        let needs_beacon = !chain.devnet
            && chain.exposes_l1_state
            && !matches!(chain.prover_family, ProverFamily::HashOracle);
        if needs_beacon && chain.beacon_api_url.is_none() {
            tracing::warn!(
                "!!WARNING!!: chain {} needs a beacon-api-url to build
                state proofs",
                chain.chain_id
            );
        }
        // settled rollups need the oracle contract and its storage key.
        if !matches!(chain.prover_family, ProverFamily::HashOracle)
            && (chain.contracts.l2_oracle.is_none()
                || chain.l2_oracle_storage_key.is_none())
        {
            tracing::warn!(
                "!!WARNING!!: chain {} uses a settled prover family but
                has no l2-oracle contract or storage key configured",
                chain.chain_id
            );
        }
    }

    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    const SAMPLE: &str = r#"
        [evm.localA]
        name = "localA"
        chain-id = 31337
        http-endpoint = "http://localhost:8545"
        private-key = "0x000000000000000000000000000000000000000000000000000000000000dead"
        devnet = true
        [evm.localA.prover-family]
        family = "output-root"
        [evm.localA.contracts]
        outbox = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        [evm.localA.explorer]
        api-url = "http://localhost:4000/api"
        api-key = "unused"

        [evm.disabledB]
        name = "disabledB"
        chain-id = 31338
        enabled = false
        http-endpoint = "http://localhost:8546"
        [evm.disabledB.prover-family]
        family = "hash-oracle"
    "#;

    #[test]
    fn loads_and_rekeys_by_chain_id() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "main.toml", SAMPLE);
        let config = load(dir.path()).unwrap();
        // enabled chains are re-keyed by chain id, disabled ones dropped.
        assert!(config.evm.contains_key("31337"));
        assert!(!config.evm.contains_key("31338"));
        assert!(!config.evm.contains_key("localA"));
        let chain = config.chain(31337).unwrap();
        assert_eq!(chain.name, "localA");
        assert_eq!(chain.indexer.poll_interval_ms, 3_000);
        assert!(chain.devnet);
        assert_eq!(chain.prover_family, ProverFamily::OutputRoot);
    }

    #[test]
    fn missing_chain_lookup_fails() {
        let config = CrossfillConfig::default();
        assert!(matches!(
            config.chain(1),
            Err(crossfill_utils::Error::ChainNotFound { .. })
        ));
    }

    #[test]
    fn verify_requires_private_keys() {
        let dir = tempfile::tempdir().unwrap();
        let without_key = SAMPLE.replace(
            "private-key = \"0x000000000000000000000000000000000000000000000000000000000000dead\"\n",
            "",
        );
        write_config(dir.path(), "main.toml", &without_key);
        let config = load(dir.path()).unwrap();
        assert!(matches!(
            config.verify(),
            Err(crossfill_utils::Error::MissingSecrets)
        ));
    }
}
