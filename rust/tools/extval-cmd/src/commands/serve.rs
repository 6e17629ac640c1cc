//! Serve command implementation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use extval_store::{ExternalFileService, ExternalFileServiceParams, FileSettings};

/// Config of the serve command.
///
/// ```json
/// {
///   "data_dir": "/var/lib/extval",
///   "maps": { "prices": { "url": "http://feeds/prices.txt", "scaling_factor": 100 } },
///   "fields": [ { "index": "products", "field": "price", "map": "prices" } ]
/// }
/// ```
///
/// Without `fields`, every map is registered once under its own name.
#[derive(Debug, Deserialize)]
struct ServeConfig {
    #[serde(default)]
    data_dir: Option<PathBuf>,
    maps: HashMap<String, FileSettings>,
    #[serde(default)]
    fields: Vec<FieldConfig>,
}

#[derive(Debug, Deserialize)]
struct FieldConfig {
    index: String,
    field: String,
    map: String,
    #[serde(default)]
    sharding: bool,
    #[serde(default)]
    num_shards: u32,
}

pub fn run(config: String, data_dir: Option<String>) -> Result<()> {
    let text = std::fs::read_to_string(&config)
        .with_context(|| format!("Failed to read config {config}"))?;
    let serve_config = parse_config(&text).with_context(|| format!("Invalid config {config}"))?;

    let data_dir = data_dir
        .map(PathBuf::from)
        .or(serve_config.data_dir.clone())
        .context("No data dir: pass --data-dir or set data_dir in the config")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the runtime")?;
    runtime.block_on(serve(serve_config, data_dir))
}

fn parse_config(text: &str) -> Result<ServeConfig> {
    let mut config: ServeConfig = serde_json::from_str(text)?;
    if config.fields.is_empty() {
        config.fields = config
            .maps
            .keys()
            .map(|map| FieldConfig {
                index: map.clone(),
                field: map.clone(),
                map: map.clone(),
                sharding: false,
                num_shards: 0,
            })
            .collect();
    }
    Ok(config)
}

async fn serve(config: ServeConfig, data_dir: PathBuf) -> Result<()> {
    let service = ExternalFileService::new(ExternalFileServiceParams {
        data_dir,
        maps: config.maps,
    })?;
    for field in &config.fields {
        service
            .add_file(
                &field.index,
                &field.field,
                &field.map,
                field.sharding,
                field.num_shards,
            )
            .with_context(|| format!("Failed to register {}/{}", field.index, field.field))?;
    }

    log::info!(
        "Serving {} external files from {}",
        service.file_keys().len(),
        service.data_dir().display()
    );
    service.start();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    log::info!("Shutting down");
    service.shutdown();
    Ok(())
}
